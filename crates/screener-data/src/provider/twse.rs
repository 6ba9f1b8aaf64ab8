//! 台灣證券交易所 (TWSE) 公開端點。
//!
//! 無需認證,但需帶瀏覽器 User-Agent 避免被來源端擋下。
//!
//! - `MI_INDEX`: 每日收盤行情 (全部上市股票)
//! - `BWIBBU_d`: 個股本益比、殖利率、股價淨值比
//! - `T86`: 三大法人買賣超
//!
//! 休市日這些端點回傳 `stat != "OK"`,視為確認無資料而非錯誤。

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use super::{is_listed_symbol, parse_decimal, BROWSER_USER_AGENT};
use crate::error::{DataError, Result};

const BASE_URL: &str = "https://www.twse.com.tw";

/// 每日收盤行情一筆。
#[derive(Debug, Clone)]
pub struct DailyQuote {
    pub symbol: String,
    pub name: String,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    /// 漲跌價差 (含正負號)
    pub change: Option<Decimal>,
    /// 漲跌幅 (%)
    pub change_percent: Option<Decimal>,
    pub volume: Option<i64>,
    pub trade_value: Option<Decimal>,
    pub transactions: Option<i64>,
    /// 市場別 (twse / tpex)
    pub market: &'static str,
}

/// 每日估值指標一筆 (本益比、殖利率、股價淨值比)。
#[derive(Debug, Clone)]
pub struct DailyValuation {
    pub symbol: String,
    pub date: NaiveDate,
    pub pe_ratio: Option<Decimal>,
    pub dividend_yield: Option<Decimal>,
    pub pb_ratio: Option<Decimal>,
}

/// 三大法人買賣超一筆。
#[derive(Debug, Clone)]
pub struct InstitutionalFlow {
    pub symbol: String,
    pub date: NaiveDate,
    pub foreign_buy: Option<Decimal>,
    pub foreign_sell: Option<Decimal>,
    pub foreign_net: Option<Decimal>,
    pub trust_buy: Option<Decimal>,
    pub trust_sell: Option<Decimal>,
    pub trust_net: Option<Decimal>,
    pub dealer_buy: Option<Decimal>,
    pub dealer_sell: Option<Decimal>,
    pub dealer_net: Option<Decimal>,
    pub total_net: Option<Decimal>,
}

/// TWSE 公開端點用戶端。
#[derive(Clone)]
pub struct TwseClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for TwseClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TwseClient {
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

    /// 抓取指定日期的每日收盤行情。
    pub async fn fetch_daily_quotes(&self, date: NaiveDate) -> Result<Vec<DailyQuote>> {
        let url = format!(
            "{}/exchangeReport/MI_INDEX?response=json&type=ALLBUT0999&date={}",
            self.base_url,
            date.format("%Y%m%d")
        );
        let json = self.get_json(&url).await?;
        Ok(parse_daily_quotes(&json, date))
    }

    /// 抓取指定日期的估值指標 (本益比、殖利率、股價淨值比)。
    pub async fn fetch_valuations(&self, date: NaiveDate) -> Result<Vec<DailyValuation>> {
        let url = format!(
            "{}/rwd/zh/afterTrading/BWIBBU_d?response=json&date={}",
            self.base_url,
            date.format("%Y%m%d")
        );
        let json = self.get_json(&url).await?;
        Ok(parse_valuations(&json, date))
    }

    /// 抓取指定日期的三大法人買賣超。
    pub async fn fetch_institutional(&self, date: NaiveDate) -> Result<Vec<InstitutionalFlow>> {
        let url = format!(
            "{}/rwd/zh/fund/T86?response=json&selectType=ALL&date={}",
            self.base_url,
            date.format("%Y%m%d")
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
        Ok(response.json::<Value>().await?)
    }
}

/// 取出 JSON 陣列列中的字串欄位。
fn cell<'a>(row: &'a Value, idx: usize) -> Option<&'a str> {
    row.get(idx).and_then(Value::as_str)
}

fn cell_decimal(row: &Value, idx: usize) -> Option<Decimal> {
    cell(row, idx).and_then(parse_decimal)
}

/// 漲跌幅 (%) = 漲跌 / 前一日收盤 * 100。
fn change_percent(close: Option<Decimal>, change: Option<Decimal>) -> Option<Decimal> {
    let (close, change) = (close?, change?);
    let prev_close = close - change;
    if prev_close.is_zero() {
        return None;
    }
    (change / prev_close * Decimal::new(100, 0)).round_dp(4).into()
}

/// 解析 `MI_INDEX` 回應。休市日 (`stat != "OK"`) 回傳空集合。
fn parse_daily_quotes(json: &Value, date: NaiveDate) -> Vec<DailyQuote> {
    if json.get("stat").and_then(Value::as_str) != Some("OK") {
        return Vec::new();
    }
    // 回應含多張表,收盤行情那張的標題帶有「每日收盤行情」
    let Some(table) = json
        .get("tables")
        .and_then(Value::as_array)
        .and_then(|tables| {
            tables.iter().find(|t| {
                t.get("title")
                    .and_then(Value::as_str)
                    .is_some_and(|title| title.contains("每日收盤行情"))
            })
        })
    else {
        return Vec::new();
    };

    let rows = table
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut quotes = Vec::new();
    for row in rows {
        let Some(symbol) = cell(row, 0) else { continue };
        if !is_listed_symbol(symbol) {
            continue;
        }
        let close = cell_decimal(row, 8);
        // 第 9 欄是帶 HTML 的漲跌符號,含 '-' 表示下跌
        let mut change = cell_decimal(row, 10);
        if cell(row, 9).is_some_and(|dir| dir.contains('-')) {
            change = change.map(|c| -c);
        }
        quotes.push(DailyQuote {
            symbol: symbol.to_string(),
            name: cell(row, 1).unwrap_or_default().to_string(),
            date,
            open: cell_decimal(row, 5),
            high: cell_decimal(row, 6),
            low: cell_decimal(row, 7),
            close,
            change,
            change_percent: change_percent(close, change),
            volume: cell_decimal(row, 2).and_then(|d| d.to_i64()),
            trade_value: cell_decimal(row, 4),
            transactions: cell_decimal(row, 3).and_then(|d| d.to_i64()),
            market: "twse",
        });
    }
    quotes
}

/// 解析 `BWIBBU_d` 回應。欄位位置以表頭名稱為準,找不到時退回
/// 既知的固定位置。
fn parse_valuations(json: &Value, date: NaiveDate) -> Vec<DailyValuation> {
    if json.get("stat").and_then(Value::as_str) != Some("OK") {
        return Vec::new();
    }
    let fields: Vec<&str> = json
        .get("fields")
        .and_then(Value::as_array)
        .map(|f| f.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let index_of = |name: &str, fallback: usize| {
        fields.iter().position(|f| *f == name).unwrap_or(fallback)
    };
    let dy_idx = index_of("殖利率(%)", 2);
    let pe_idx = index_of("本益比", 4);
    let pb_idx = index_of("股價淨值比", 5);

    let rows = json
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut valuations = Vec::new();
    for row in rows {
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

/// 解析 `T86` 回應。外資含外資自營 (第 4+7 欄),自營商合併
/// 自行買賣與避險 (第 12+15、13+16 欄)。
fn parse_institutional(json: &Value, date: NaiveDate) -> Vec<InstitutionalFlow> {
    if json.get("stat").and_then(Value::as_str) != Some("OK") {
        return Vec::new();
    }
    let rows = json
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let sum = |a: Option<Decimal>, b: Option<Decimal>| match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or_default() + b.unwrap_or_default()),
    };

    let mut flows = Vec::new();
    for row in rows {
        let Some(symbol) = cell(row, 0) else { continue };
        let symbol = symbol.trim();
        if !is_listed_symbol(symbol) {
            continue;
        }
        flows.push(InstitutionalFlow {
            symbol: symbol.to_string(),
            date,
            foreign_buy: cell_decimal(row, 2),
            foreign_sell: cell_decimal(row, 3),
            foreign_net: sum(cell_decimal(row, 4), cell_decimal(row, 7)),
            trust_buy: cell_decimal(row, 8),
            trust_sell: cell_decimal(row, 9),
            trust_net: cell_decimal(row, 10),
            dealer_buy: sum(cell_decimal(row, 12), cell_decimal(row, 15)),
            dealer_sell: sum(cell_decimal(row, 13), cell_decimal(row, 16)),
            dealer_net: cell_decimal(row, 11),
            total_net: cell_decimal(row, 18),
        });
    }
    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 19).unwrap()
    }

    #[test]
    fn test_parse_daily_quotes_closed_day() {
        let json = json!({"stat": "很抱歉,沒有符合條件的資料!"});
        assert!(parse_daily_quotes(&json, date()).is_empty());
    }

    #[test]
    fn test_parse_daily_quotes() {
        let json = json!({
            "stat": "OK",
            "tables": [
                {"title": "價格指數", "data": []},
                {"title": "113年02月19日每日收盤行情", "data": [
                    ["2330", "台積電", "25,551,607", "35,669", "17,388,417,446",
                     "688.00", "689.00", "681.00", "683.00",
                     "<p style='color:green'>-</p>", "5.00", "684.00", "685.00", "22.61"],
                    ["0050", "元大台灣50", "1,000", "10", "100",
                     "130.00", "131.00", "129.00", "130.50",
                     "<p>+</p>", "0.50", "", "", ""],
                    ["IX0001", "發行量加權股價指數", "", "", "", "", "", "", "", "", "", "", "", ""]
                ]}
            ]
        });
        let quotes = parse_daily_quotes(&json, date());
        assert_eq!(quotes.len(), 2);

        let tsmc = &quotes[0];
        assert_eq!(tsmc.symbol, "2330");
        assert_eq!(tsmc.close, Some(Decimal::new(68300, 2)));
        // 第 9 欄含 '-',漲跌取負值
        assert_eq!(tsmc.change, Some(Decimal::new(-500, 2)));
        assert_eq!(tsmc.volume, Some(25_551_607));
        assert_eq!(tsmc.transactions, Some(35_669));

        let etf = &quotes[1];
        assert_eq!(etf.change, Some(Decimal::new(50, 2)));
    }

    #[test]
    fn test_parse_valuations_uses_header_positions() {
        let json = json!({
            "stat": "OK",
            "fields": ["證券代號", "證券名稱", "本益比", "殖利率(%)", "股價淨值比"],
            "data": [
                ["2330", "台積電", "22.61", "1.97", "5.43"],
                ["2882", "國泰金", "--", "--", "1.10"]
            ]
        });
        let valuations = parse_valuations(&json, date());
        assert_eq!(valuations.len(), 2);
        assert_eq!(valuations[0].pe_ratio, Some(Decimal::new(2261, 2)));
        assert_eq!(valuations[0].dividend_yield, Some(Decimal::new(197, 2)));
        // 缺值標記正規化為 None 而非 0
        assert_eq!(valuations[1].pe_ratio, None);
        assert_eq!(valuations[1].dividend_yield, None);
        assert_eq!(valuations[1].pb_ratio, Some(Decimal::new(110, 2)));
    }

    #[test]
    fn test_parse_institutional_combines_dealer_columns() {
        let mut row = vec![json!("2330"), json!("台積電")];
        // 欄位 2..19
        for v in [
            "1,000", "400", "500", "0", "0", "100", // 2-7: 外資買/賣/淨 + 外資自營
            "300", "100", "200", // 8-10: 投信
            "50", // 11: 自營淨
            "30", "10", "0", "40", "10", "0", // 12-17: 自營買賣 (自行+避險)
            "850", // 18: 合計
        ] {
            row.push(json!(v));
        }
        let json = json!({"stat": "OK", "data": [row]});
        let flows = parse_institutional(&json, date());
        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        assert_eq!(flow.foreign_net, Some(Decimal::new(600, 0)));
        assert_eq!(flow.dealer_buy, Some(Decimal::new(70, 0)));
        assert_eq!(flow.dealer_sell, Some(Decimal::new(20, 0)));
        assert_eq!(flow.total_net, Some(Decimal::new(850, 0)));
    }

    #[test]
    fn test_change_percent() {
        // 683 收盤、跌 5:前收 688,-5/688*100 ≈ -0.7267%
        let pct = change_percent(
            Some(Decimal::new(68300, 2)),
            Some(Decimal::new(-500, 2)),
        )
        .unwrap();
        assert_eq!(pct, Decimal::new(-7267, 4).round_dp(4));
    }
}
