//! FinMind API 用戶端。
//!
//! FinMind (<https://finmindtrade.com>) 提供台股的技術面、基本面、
//! 籌碼面與新聞資料。單一 token 每小時約 600 次呼叫;本用戶端
//! 搭配 [`TokenPool`] 在 429/402 時輪替 token,整池耗盡時冷卻
//! 後重置再試。
//!
//! ## 結果分類
//!
//! 可預期的 HTTP 狀況不以 `Err` 呈現,而是分類為 [`FetchOutcome`]:
//! 2xx 有資料 → `Success`;2xx 無資料 → `Empty`;429 → `RateLimited`;
//! 402 → `QuotaExhausted`;其餘 (網路、非預期狀態碼、解析失敗) →
//! `TransientError`。
//!
//! ## 使用例
//!
//! ```rust,ignore
//! let tokens = Arc::new(TokenPool::new(vec!["t1".into(), "t2".into()]));
//! let client = FinMindClient::new(tokens);
//! let request = DatasetRequest::per_stock(Dataset::MonthRevenue, "2330", Some(start));
//! match client.fetch(&request).await {
//!     FetchOutcome::Success(rows) => { /* 正規化後寫入 */ }
//!     FetchOutcome::Empty => { /* 確認為空 */ }
//!     other => tracing::warn!(?other, "抓取失敗"),
//! }
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::dataset::Dataset;
use crate::token::TokenPool;

/// FinMind v4 資料端點。
const BASE_URL: &str = "https://api.finmindtrade.com/api/v4/data";

/// 一次邏輯抓取的描述。建構後不再變動。
#[derive(Debug, Clone)]
pub struct DatasetRequest<'a> {
    /// 目標資料集
    pub dataset: Dataset,
    /// 逐股資料集的股票代號
    pub data_id: Option<&'a str>,
    /// 起始日期 (含)
    pub start_date: Option<NaiveDate>,
}

impl<'a> DatasetRequest<'a> {
    /// 全量資料集請求 (不帶 `data_id`)。
    pub fn market(dataset: Dataset, start_date: Option<NaiveDate>) -> Self {
        Self {
            dataset,
            data_id: None,
            start_date,
        }
    }

    /// 逐股資料集請求。
    pub fn per_stock(dataset: Dataset, data_id: &'a str, start_date: Option<NaiveDate>) -> Self {
        Self {
            dataset,
            data_id: Some(data_id),
            start_date,
        }
    }
}

/// 單次邏輯抓取的分類結果。
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx 且有資料
    Success(Vec<Value>),
    /// 2xx 但資料為空
    Empty,
    /// HTTP 429,目前 token 已超出流量限制
    RateLimited,
    /// HTTP 402,目前 token 額度耗盡
    QuotaExhausted,
    /// 暫時性失敗 (網路、非預期狀態碼、解析失敗)
    TransientError(String),
}

/// FinMind 回應外層。
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// FinMind API 用戶端。
///
/// 輪替池以 `Arc` 注入而非全域狀態,測試可建立獨立的池與
/// 指向本機 mock 伺服器的用戶端。
#[derive(Clone)]
pub struct FinMindClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenPool>,
    cooldown: Duration,
}

impl FinMindClient {
    /// 建立用戶端。大型資料集 (如全量報酬指數) 回應可達數十 MB,
    /// 逾時放寬到 180 秒。
    pub fn new(tokens: Arc<TokenPool>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(180))
                .build()
                .expect("HTTP 用戶端建立失敗"),
            base_url: BASE_URL.to_string(),
            tokens,
            cooldown: Duration::from_secs(60),
        }
    }

    /// 指定端點位址 (測試用)。
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 指定整池耗盡後的冷卻時間 (測試用;正式環境維持預設 60 秒)。
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// 共用的輪替池。
    pub fn token_pool(&self) -> &TokenPool {
        &self.tokens
    }

    /// 執行一次邏輯抓取,內部處理 token 輪替與冷卻。
    ///
    /// 限額狀況 (429/402) 以明確的有界迴圈處理:輪替成功就立即以
    /// 新 token 重試;無可輪替時冷卻、重置整池、再試,單次呼叫
    /// 最多一輪冷卻。嘗試次數上限為 token 數的兩倍加一,保證終止;
    /// 達到上限時把最後的限額狀況交還呼叫端。
    pub async fn fetch(&self, request: &DatasetRequest<'_>) -> FetchOutcome {
        let max_attempts = self.tokens.len().max(1) * 2 + 1;
        let mut did_reset = false;
        let mut last = FetchOutcome::TransientError("尚未嘗試".to_string());

        for _ in 0..max_attempts {
            let outcome = self.fetch_once(request).await;
            match outcome {
                FetchOutcome::RateLimited | FetchOutcome::QuotaExhausted => {
                    let reason = if matches!(outcome, FetchOutcome::RateLimited) {
                        "HTTP 429"
                    } else {
                        "HTTP 402"
                    };
                    tracing::warn!(
                        dataset = %request.dataset,
                        data_id = request.data_id.unwrap_or(""),
                        token = self.tokens.current_index() + 1,
                        reason = reason,
                        "Token 受限,嘗試輪替"
                    );
                    if self.tokens.rotate(reason) {
                        last = outcome;
                        continue;
                    }
                    if did_reset {
                        // 冷卻重置後仍受限,交還呼叫端留待下次排程
                        return outcome;
                    }
                    tracing::warn!(
                        cooldown_secs = self.cooldown.as_secs(),
                        "所有 Token 皆受限,冷卻後重置整池"
                    );
                    tokio::time::sleep(self.cooldown).await;
                    self.tokens.reset_all();
                    did_reset = true;
                    last = outcome;
                }
                other => return other,
            }
        }
        last
    }

    /// 單次 HTTP 呼叫與狀態分類,不做重試、不輪替。
    async fn fetch_once(&self, request: &DatasetRequest<'_>) -> FetchOutcome {
        let mut params: Vec<(&str, String)> =
            vec![("dataset", request.dataset.api_name().to_string())];
        if let Some(id) = request.data_id {
            params.push(("data_id", id.to_string()));
        }
        if let Some(date) = request.start_date {
            params.push(("start_date", date.format("%Y-%m-%d").to_string()));
        }
        if let Some(token) = self.tokens.current() {
            params.push(("token", token));
        }

        let response = match self.client.get(&self.base_url).query(&params).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::TransientError(e.to_string()),
        };

        let status = response.status();
        match status.as_u16() {
            429 => return FetchOutcome::RateLimited,
            402 => return FetchOutcome::QuotaExhausted,
            _ if !status.is_success() => {
                return FetchOutcome::TransientError(format!("HTTP {}", status));
            }
            _ => {}
        }

        match response.json::<ApiResponse>().await {
            Ok(body) if body.data.is_empty() => FetchOutcome::Empty,
            Ok(body) => {
                tracing::debug!(
                    dataset = %request.dataset,
                    data_id = request.data_id.unwrap_or(""),
                    records = body.data.len(),
                    "抓取完成"
                );
                FetchOutcome::Success(body.data)
            }
            Err(e) => FetchOutcome::TransientError(format!("回應解析失敗: {}", e)),
        }
    }
}

/// 從 FinMind 紀錄取出數值欄位。
///
/// 來源欄位可能是數字或字串 (偶有千分位逗號與缺值標記),
/// 一律正規化為 `Decimal`;缺值回傳 `None` 而非 0。
pub fn field_decimal(row: &Value, key: &str) -> Option<Decimal> {
    match row.get(key)? {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => super::parse_decimal(s),
        _ => None,
    }
}

/// 從 FinMind 紀錄取出整數欄位。
pub fn field_i64(row: &Value, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => super::parse_decimal(s).and_then(|d| d.trunc().to_i64()),
        _ => None,
    }
}

/// 從 FinMind 紀錄取出非空字串欄位。
pub fn field_str<'a>(row: &'a Value, key: &str) -> Option<&'a str> {
    match row.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// 從 FinMind 紀錄取出 `YYYY-MM-DD` 日期欄位。
pub fn field_date(row: &Value, key: &str) -> Option<NaiveDate> {
    field_str(row, key).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_decimal_number_and_string() {
        let row = json!({"revenue": 1234.5, "pe": "15.2", "pb": "--"});
        assert_eq!(field_decimal(&row, "revenue"), Some(Decimal::new(12345, 1)));
        assert_eq!(field_decimal(&row, "pe"), Some(Decimal::new(152, 1)));
        assert_eq!(field_decimal(&row, "pb"), None);
        assert_eq!(field_decimal(&row, "missing"), None);
    }

    #[test]
    fn test_field_i64_accepts_float_and_comma_string() {
        let row = json!({"volume": 100.0, "shares": "1,000"});
        assert_eq!(field_i64(&row, "volume"), Some(100));
        assert_eq!(field_i64(&row, "shares"), Some(1000));
    }

    #[test]
    fn test_field_date() {
        let row = json!({"date": "2021-01-10", "bad": "2021/01/10"});
        assert_eq!(
            field_date(&row, "date"),
            NaiveDate::from_ymd_opt(2021, 1, 10)
        );
        assert_eq!(field_date(&row, "bad"), None);
    }

    #[test]
    fn test_field_str_rejects_empty() {
        let row = json!({"name": "", "source": "中央社"});
        assert_eq!(field_str(&row, "name"), None);
        assert_eq!(field_str(&row, "source"), Some("中央社"));
    }
}
