//! 櫃買中心 (TPEx) 公開端點。
//!
//! 上櫃股票的行情、估值與法人買賣超。與 TWSE 不同,
//! 這些端點的日期參數使用民國紀年 (`113/02/19`),
//! 且回應有 `aaData` 與 `tables` 兩種包裝並存,需同時容忍。

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use super::twse::{DailyQuote, DailyValuation, InstitutionalFlow};
use super::{is_listed_symbol, parse_decimal, BROWSER_USER_AGENT};
use crate::error::{DataError, Result};

const BASE_URL: &str = "https://www.tpex.org.tw";

/// 西元轉民國紀年 (`2024-02-19` → `113/02/19`)。
pub fn to_roc_date(date: NaiveDate) -> String {
    format!(
        "{}/{:02}/{:02}",
        date.year() - 1911,
        date.month(),
        date.day()
    )
}

/// TPEx 公開端點用戶端。
#[derive(Clone)]
pub struct TpexClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for TpexClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TpexClient {
    /// 建立用戶端。
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(BROWSER_USER_AGENT)
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("HTTP 用戶端建立失敗"),
            base_url: BASE_URL.to_string(),
        }
    }

    /// 指定端點位址 (測試用)。
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 抓取指定日期的上櫃收盤行情。
    pub async fn fetch_daily_quotes(&self, date: NaiveDate) -> Result<Vec<DailyQuote>> {
        let url = format!(
            "{}/web/stock/aftertrading/daily_close_quotes/stk_quote_result.php?l=zh-tw&o=json&d={}",
            self.base_url,
            to_roc_date(date)
        );
        let json = self.get_json(&url).await?;
        Ok(parse_daily_quotes(&json, date))
    }

    /// 抓取指定日期的上櫃估值指標。
    pub async fn fetch_valuations(&self, date: NaiveDate) -> Result<Vec<DailyValuation>> {
        let url = format!(
            "{}/web/stock/aftertrading/peratio_analysis/pera_result.php?l=zh-tw&o=json&d={}",
            self.base_url,
            to_roc_date(date)
        );
        let json = self.get_json(&url).await?;
        Ok(parse_valuations(&json, date))
    }

    /// 抓取指定日期的上櫃三大法人買賣超。
    pub async fn fetch_institutional(&self, date: NaiveDate) -> Result<Vec<InstitutionalFlow>> {
        let url = format!(
            "{}/web/stock/3insti/daily_trade/3itrade_hedge_result.php?l=zh-tw&o=json&se=EW&t=D&d={}",
            self.base_url,
            to_roc_date(date)
        );
        let json = self.get_json(&url).await?;
        Ok(parse_institutional(&json, date))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        // 來源偶爾以 text/html 回傳 JSON 本文,不吃 content-type
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| DataError::Parse(format!("TPEx 回應解析失敗: {}", e)))
    }
}

fn cell<'a>(row: &'a Value, idx: usize) -> Option<&'a str> {
    row.get(idx).and_then(Value::as_str)
}

fn cell_decimal(row: &Value, idx: usize) -> Option<Decimal> {
    cell(row, idx).and_then(parse_decimal)
}

/// 取出資料列:新版包在 `tables[0].data`,舊版在 `aaData`。
fn data_rows(json: &Value) -> &[Value] {
    json.get("tables")
        .and_then(Value::as_array)
        .and_then(|tables| tables.first())
        .and_then(|t| t.get("data"))
        .or_else(|| json.get("aaData"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn change_percent(close: Option<Decimal>, change: Option<Decimal>) -> Option<Decimal> {
    let (close, change) = (close?, change?);
    let prev_close = close - change;
    if prev_close.is_zero() {
        return None;
    }
    Some((change / prev_close * Decimal::new(100, 0)).round_dp(4))
}

/// 解析上櫃收盤行情。無資料日回傳空集合。
fn parse_daily_quotes(json: &Value, date: NaiveDate) -> Vec<DailyQuote> {
    let mut quotes = Vec::new();
    for row in data_rows(json) {
        let Some(symbol) = cell(row, 0) else { continue };
        if !is_listed_symbol(symbol) {
            continue;
        }
        let close = cell_decimal(row, 2);
        let change = cell_decimal(row, 3);
        quotes.push(DailyQuote {
            symbol: symbol.to_string(),
            name: cell(row, 1).unwrap_or_default().to_string(),
            date,
            open: cell_decimal(row, 4),
            high: cell_decimal(row, 5),
            low: cell_decimal(row, 6),
            close,
            change,
            change_percent: change_percent(close, change),
            volume: cell_decimal(row, 7).and_then(|d| d.to_i64()),
            trade_value: cell_decimal(row, 8),
            transactions: cell_decimal(row, 9).and_then(|d| d.to_i64()),
            market: "tpex",
        });
    }
    quotes
}

/// 解析上櫃估值指標。欄位位置以表頭名稱為準。
fn parse_valuations(json: &Value, date: NaiveDate) -> Vec<DailyValuation> {
    let fields: Vec<&str> = json
        .get("tables")
        .and_then(Value::as_array)
        .and_then(|tables| tables.first())
        .and_then(|t| t.get("fields"))
        .and_then(Value::as_array)
        .map(|f| f.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let index_of = |name: &str, fallback: usize| {
        fields.iter().position(|f| *f == name).unwrap_or(fallback)
    };
    let pe_idx = index_of("本益比", 2);
    let dy_idx = index_of("殖利率(%)", 5);
    let pb_idx = index_of("股價淨值比", 6);

    let mut valuations = Vec::new();
    for row in data_rows(json) {
        let Some(symbol) = cell(row, 0) else { continue };
        if !is_listed_symbol(symbol) {
            continue;
        }
        valuations.push(DailyValuation {
            symbol: symbol.to_string(),
            date,
            pe_ratio: cell_decimal(row, pe_idx),
            dividend_yield: cell_decimal(row, dy_idx),
            pb_ratio: cell_decimal(row, pb_idx),
        });
    }
    valuations
}

/// 解析上櫃三大法人。長格式 (≥24 欄) 與短格式的自營商欄位
/// 位置不同,依列長度分流。
fn parse_institutional(json: &Value, date: NaiveDate) -> Vec<InstitutionalFlow> {
    let mut flows = Vec::new();
    for row in data_rows(json) {
        let Some(symbol) = cell(row, 0) else { continue };
        let symbol = symbol.trim();
        if !is_listed_symbol(symbol) {
            continue;
        }
        let wide = row.as_array().map(Vec::len).unwrap_or(0) >= 24;
        let (db, ds, dn, total) = if wide {
            (20, 21, 22, 23)
        } else {
            (14, 15, 16, 19)
        };
        flows.push(InstitutionalFlow {
            symbol: symbol.to_string(),
            date,
            foreign_buy: cell_decimal(row, 8),
            foreign_sell: cell_decimal(row, 9),
            foreign_net: cell_decimal(row, 10),
            trust_buy: cell_decimal(row, 11),
            trust_sell: cell_decimal(row, 12),
            trust_net: cell_decimal(row, 13),
            dealer_buy: cell_decimal(row, db),
            dealer_sell: cell_decimal(row, ds),
            dealer_net: cell_decimal(row, dn),
            total_net: cell_decimal(row, total),
        });
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_roc_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 19).unwrap();
        assert_eq!(to_roc_date(date), "113/02/19");
        let date = NaiveDate::from_ymd_opt(2021, 12, 1).unwrap();
        assert_eq!(to_roc_date(date), "110/12/01");
    }

    #[test]
    fn test_parse_daily_quotes_aa_data() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 19).unwrap();
        let json = json!({
            "aaData": [
                ["5483", "中美晶", "185.50", "-2.00", "188.00", "189.00", "184.50",
                 "3,210,000", "596,000,000", "2,500"],
                ["指數", "櫃買指數", "", "", "", "", "", "", "", ""]
            ]
        });
        let quotes = parse_daily_quotes(&json, date);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "5483");
        assert_eq!(quotes[0].market, "tpex");
        assert_eq!(quotes[0].change, Some(Decimal::new(-200, 2)));
        assert_eq!(quotes[0].volume, Some(3_210_000));
    }

    #[test]
    fn test_parse_daily_quotes_tables_wrapper() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 19).unwrap();
        let json = json!({
            "tables": [{"data": [
                ["5483", "中美晶", "185.50", "2.00", "188.00", "189.00", "184.50",
                 "100", "200", "3"]
            ]}]
        });
        assert_eq!(parse_daily_quotes(&json, date).len(), 1);
    }

    #[test]
    fn test_parse_institutional_short_and_wide_rows() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 19).unwrap();
        let short: Vec<Value> = (0..20)
            .map(|i| json!(format!("{}", i * 10)))
            .collect();
        let mut short = short;
        short[0] = json!("5483");
        let wide: Vec<Value> = (0..24).map(|i| json!(format!("{}", i))).collect();
        let mut wide = wide;
        wide[0] = json!("6488");
        let json = json!({"aaData": [short, wide]});

        let flows = parse_institutional(&json, date);
        assert_eq!(flows.len(), 2);
        // 短格式:自營商在 14-16,合計在 19
        assert_eq!(flows[0].dealer_buy, Some(Decimal::new(140, 0)));
        assert_eq!(flows[0].total_net, Some(Decimal::new(190, 0)));
        // 長格式:自營商在 20-22,合計在 23
        assert_eq!(flows[1].dealer_buy, Some(Decimal::new(20, 0)));
        assert_eq!(flows[1].total_net, Some(Decimal::new(23, 0)));
    }
}
