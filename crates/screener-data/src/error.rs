//! 資料來源錯誤型別。

use thiserror::Error;

/// 遠端資料來源錯誤。
///
/// FinMind 用戶端不使用這個型別 (可預期的 HTTP 狀況以
/// [`crate::provider::finmind::FetchOutcome`] 分類呈現);
/// 交易所與新聞端點的失敗則以此傳回,由呼叫端決定跳過或中止。
#[derive(Debug, Error)]
pub enum DataError {
    /// HTTP 請求失敗
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// 非預期的 HTTP 狀態碼
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// 回應解析失敗
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result 型別別名。
pub type Result<T> = std::result::Result<T, DataError>;
