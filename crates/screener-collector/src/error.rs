//! 錯誤型別定義。

use std::fmt;

/// 同步引擎錯誤型別。
#[derive(Debug)]
pub enum CollectorError {
    /// 資料庫錯誤
    Database(sqlx::Error),
    /// 設定錯誤
    Config(String),
    /// 資料來源錯誤 (FinMind、TWSE、TPEx、cnyes)
    DataSource(String),
    /// 一般錯誤
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::DataSource(msg) => write!(f, "Data source error: {}", msg),
            Self::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for CollectorError {}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<std::env::VarError> for CollectorError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<screener_data::DataError> for CollectorError {
    fn from(err: screener_data::DataError) -> Self {
        Self::DataSource(err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CollectorError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err)
    }
}

/// 判斷是否為外鍵違反 (來源回傳了 `stocks` 表沒有的代號)。
/// 這類單筆寫入失敗記錄後跳過,不中斷批次。
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23503"))
}

/// Result 型別別名。
pub type Result<T> = std::result::Result<T, CollectorError>;
