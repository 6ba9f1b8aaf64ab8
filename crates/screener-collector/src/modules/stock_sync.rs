//! 逐股 FinMind 資料集同步模組 (Entity Dataset Syncer)。
//!
//! 對單一股票依固定優先順序抓取各資料集:
//! 月營收 → 損益表 → 資產負債表 → 現金流量表 → 股利 → 估值 →
//! 價量 → 法人買賣超 → 融資融券 → 新聞。
//!
//! 每個 (資料集, 股票) 配對在寫入成功後標記進度;單一資料集
//! 失敗只記錄並繼續,不中斷該檔股票或整體批次。所有寫入都是
//! 以自然鍵為準的 upsert,重複執行不會產生重複列。

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, warn};

use screener_data::provider::finmind::{
    field_date, field_decimal, field_i64, field_str, DatasetRequest, FetchOutcome, FinMindClient,
};
use screener_data::Dataset;

use super::progress;
use crate::config::FinMindSyncConfig;
use crate::error::is_foreign_key_violation;
use crate::{Result, SyncStats};

/// 逐股同步選項。
#[derive(Debug, Clone)]
pub struct StockSyncOptions {
    /// 無水位線時的歷史回補起日
    pub start_date: NaiveDate,
    /// 已完成配對的重新整理門檻 (小時)
    pub stale_hours: i64,
    /// 增量抓取時往前重疊的天數
    pub refresh_overlap_days: i64,
}

impl From<&FinMindSyncConfig> for StockSyncOptions {
    fn from(config: &FinMindSyncConfig) -> Self {
        Self {
            start_date: config.start_date,
            stale_hours: config.stale_hours,
            refresh_overlap_days: config.refresh_overlap_days,
        }
    }
}

/// 同步單一股票的所有逐股資料集 (盡力而為)。
pub async fn sync_stock(
    pool: &PgPool,
    client: &FinMindClient,
    opts: &StockSyncOptions,
    symbol: &str,
) -> Result<SyncStats> {
    let mut stats = SyncStats::new();

    for dataset in Dataset::PER_STOCK_ORDER {
        stats.total += 1;

        if progress::is_fresh(pool, dataset.api_name(), symbol, opts.stale_hours).await? {
            stats.skipped += 1;
            continue;
        }

        let start_date = fetch_start(pool, dataset, symbol, opts).await?;
        let request = DatasetRequest::per_stock(dataset, symbol, Some(start_date));

        match client.fetch(&request).await {
            FetchOutcome::Success(rows) => {
                let written = persist_rows(pool, dataset, symbol, &rows).await;
                if written == 0 {
                    // 抓到資料卻一筆都沒寫入:不標記進度,留待下次重試
                    stats.errors += 1;
                    warn!(symbol, dataset = %dataset, records = rows.len(), "全數寫入失敗");
                } else {
                    stats.success += 1;
                    stats.total_records += written;
                    progress::mark_complete(pool, dataset.api_name(), symbol).await?;
                    debug!(symbol, dataset = %dataset, written, "同步完成");
                }
            }
            FetchOutcome::Empty => {
                // 確認為空也標記完成,避免每輪重抓無資料的配對
                stats.empty += 1;
                progress::mark_complete(pool, dataset.api_name(), symbol).await?;
            }
            FetchOutcome::RateLimited | FetchOutcome::QuotaExhausted => {
                stats.errors += 1;
                warn!(symbol, dataset = %dataset, "冷卻重試後仍受限,留待下次排程");
            }
            FetchOutcome::TransientError(detail) => {
                stats.errors += 1;
                warn!(symbol, dataset = %dataset, error = %detail, "抓取失敗,跳過");
            }
        }
    }

    Ok(stats)
}

/// 抓取起日:已有水位線時從水位線往前重疊一段 (涵蓋月營收與
/// 財報的回溯修正),否則用設定的歷史起日。
async fn fetch_start(
    pool: &PgPool,
    dataset: Dataset,
    symbol: &str,
    opts: &StockSyncOptions,
) -> Result<NaiveDate> {
    match progress::last_sync(pool, dataset.api_name(), symbol).await? {
        Some(watermark) => {
            Ok((watermark - chrono::Duration::days(opts.refresh_overlap_days)).date_naive())
        }
        None => Ok(opts.start_date),
    }
}

/// 將抓回的紀錄寫入對應資料表,回傳成功筆數。
///
/// 單筆失敗 (含外鍵違反) 記錄後繼續;不適用的紀錄 (缺鍵欄位)
/// 靜默跳過。
async fn persist_rows(pool: &PgPool, dataset: Dataset, symbol: &str, rows: &[Value]) -> usize {
    let mut written = 0;
    for row in rows {
        let result = match dataset {
            Dataset::MonthRevenue => upsert_month_revenue(pool, symbol, row).await,
            Dataset::FinancialStatements => upsert_financial_statement(pool, symbol, row).await,
            Dataset::BalanceSheet => upsert_balance_sheet(pool, symbol, row).await,
            Dataset::CashFlows => upsert_cash_flow(pool, symbol, row).await,
            Dataset::Dividend => upsert_dividend(pool, symbol, row).await,
            Dataset::Per => upsert_per(pool, symbol, row).await,
            Dataset::Price => upsert_price(pool, symbol, row).await,
            Dataset::Institutional => upsert_institutional(pool, symbol, row).await,
            Dataset::MarginTrading => upsert_margin_trading(pool, symbol, row).await,
            Dataset::News => upsert_stock_news(pool, symbol, row).await,
            // 全量資料集不會走到這裡 (market_sync 負責)
            other => {
                debug!(dataset = %other, "非逐股資料集,略過");
                break;
            }
        };
        match result {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                debug!(symbol, dataset = %dataset, error = %e, "外鍵違反,跳過單筆");
            }
            Err(e) => {
                debug!(symbol, dataset = %dataset, error = %e, "單筆寫入失敗");
            }
        }
    }
    written
}

// ==================== 月營收 ====================

/// 月營收列。自然鍵是 (代號, 年, 月):營收會因自結數修正而
/// 重送,同一期間以最新值覆寫。
#[derive(Debug, PartialEq)]
struct MonthRevenueRow {
    date: NaiveDate,
    revenue_year: i32,
    revenue_month: i32,
    country: String,
    revenue: Option<Decimal>,
}

impl MonthRevenueRow {
    fn from_value(row: &Value) -> Option<Self> {
        Some(Self {
            date: field_date(row, "date")?,
            revenue_year: field_i64(row, "revenue_year").and_then(|y| i32::try_from(y).ok())?,
            revenue_month: field_i64(row, "revenue_month").and_then(|m| i32::try_from(m).ok())?,
            country: field_str(row, "country").unwrap_or("TW").to_string(),
            revenue: field_decimal(row, "revenue"),
        })
    }
}

async fn upsert_month_revenue(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(row) = MonthRevenueRow::from_value(raw) else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_month_revenue (stock_id, revenue_year, revenue_month, date, country, revenue)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (stock_id, revenue_year, revenue_month)
        DO UPDATE SET
            date = EXCLUDED.date,
            country = EXCLUDED.country,
            revenue = EXCLUDED.revenue
        "#,
    )
    .bind(symbol)
    .bind(row.revenue_year)
    .bind(row.revenue_month)
    .bind(row.date)
    .bind(&row.country)
    .bind(row.revenue)
    .execute(pool)
    .await?;
    Ok(true)
}

// ==================== 三大財務報表 ====================

/// 報表明細列 (損益表、資產負債表、現金流量表共用的形狀)。
#[derive(Debug, PartialEq)]
struct StatementRow {
    date: NaiveDate,
    kind: String,
    value: Option<Decimal>,
    origin_name: String,
}

impl StatementRow {
    fn from_value(row: &Value) -> Option<Self> {
        let kind = field_str(row, "type")?.to_string();
        Some(Self {
            date: field_date(row, "date")?,
            origin_name: field_str(row, "origin_name")
                .unwrap_or(&kind)
                .to_string(),
            value: field_decimal(row, "value"),
            kind,
        })
    }
}

async fn upsert_financial_statement(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(row) = StatementRow::from_value(raw) else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_financial_statements (stock_id, date, type, value, origin_name)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (stock_id, date, type)
        DO UPDATE SET value = EXCLUDED.value, origin_name = EXCLUDED.origin_name
        "#,
    )
    .bind(symbol)
    .bind(row.date)
    .bind(&row.kind)
    .bind(row.value)
    .bind(&row.origin_name)
    .execute(pool)
    .await?;
    Ok(true)
}

async fn upsert_balance_sheet(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(row) = StatementRow::from_value(raw) else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_balance_sheet (stock_id, date, type, value, origin_name)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (stock_id, date, type)
        DO UPDATE SET value = EXCLUDED.value, origin_name = EXCLUDED.origin_name
        "#,
    )
    .bind(symbol)
    .bind(row.date)
    .bind(&row.kind)
    .bind(row.value)
    .bind(&row.origin_name)
    .execute(pool)
    .await?;
    Ok(true)
}

async fn upsert_cash_flow(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(row) = StatementRow::from_value(raw) else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_cash_flows (stock_id, date, type, value, origin_name)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (stock_id, date, type)
        DO UPDATE SET value = EXCLUDED.value, origin_name = EXCLUDED.origin_name
        "#,
    )
    .bind(symbol)
    .bind(row.date)
    .bind(&row.kind)
    .bind(row.value)
    .bind(&row.origin_name)
    .execute(pool)
    .await?;
    Ok(true)
}

// ==================== 股利政策 ====================

#[derive(Debug, PartialEq)]
struct DividendRow {
    date: NaiveDate,
    year: Option<i32>,
    stock_earnings: Option<Decimal>,
    stock_statutory: Option<Decimal>,
    cash_earnings: Option<Decimal>,
    cash_statutory: Option<Decimal>,
    /// 現金股利合計 (盈餘 + 法定盈餘公積)
    cash_dividend: Decimal,
    /// 股票股利合計
    stock_dividend: Decimal,
    /// 現金 + 股票合計
    total_dividend: Decimal,
}

impl DividendRow {
    fn from_value(row: &Value) -> Option<Self> {
        let date = field_date(row, "date")?;
        let year = field_i64(row, "year")
            .or_else(|| field_i64(row, "Year"))
            .and_then(|y| i32::try_from(y).ok())
            .filter(|y| *y > 0);
        let stock_earnings = field_decimal(row, "StockEarningsDistribution");
        let stock_statutory = field_decimal(row, "StockStatutorySurplusDistribution");
        let cash_earnings = field_decimal(row, "CashEarningsDistribution");
        let cash_statutory = field_decimal(row, "CashStatutorySurplusDistribution");
        // 合計欄位把缺的成分視為 0 (成分欄位本身保留缺值)
        let cash_dividend =
            cash_earnings.unwrap_or_default() + cash_statutory.unwrap_or_default();
        let stock_dividend =
            stock_earnings.unwrap_or_default() + stock_statutory.unwrap_or_default();
        Some(Self {
            date,
            year,
            stock_earnings,
            stock_statutory,
            cash_earnings,
            cash_statutory,
            cash_dividend,
            stock_dividend,
            total_dividend: cash_dividend + stock_dividend,
        })
    }
}

async fn upsert_dividend(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(row) = DividendRow::from_value(raw) else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_dividend (
            stock_id, date, year,
            stock_earnings_distribution, stock_statutory_surplus_distribution,
            cash_earnings_distribution, cash_statutory_surplus_distribution,
            cash_dividend, stock_dividend, total_dividend
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (stock_id, date)
        DO UPDATE SET
            year = EXCLUDED.year,
            stock_earnings_distribution = EXCLUDED.stock_earnings_distribution,
            stock_statutory_surplus_distribution = EXCLUDED.stock_statutory_surplus_distribution,
            cash_earnings_distribution = EXCLUDED.cash_earnings_distribution,
            cash_statutory_surplus_distribution = EXCLUDED.cash_statutory_surplus_distribution,
            cash_dividend = EXCLUDED.cash_dividend,
            stock_dividend = EXCLUDED.stock_dividend,
            total_dividend = EXCLUDED.total_dividend
        "#,
    )
    .bind(symbol)
    .bind(row.date)
    .bind(row.year)
    .bind(row.stock_earnings)
    .bind(row.stock_statutory)
    .bind(row.cash_earnings)
    .bind(row.cash_statutory)
    .bind(row.cash_dividend)
    .bind(row.stock_dividend)
    .bind(row.total_dividend)
    .execute(pool)
    .await?;
    Ok(true)
}

// ==================== 估值 (PER/PBR/殖利率) ====================

async fn upsert_per(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(date) = field_date(raw, "date") else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_stock_per (stock_id, date, pe_ratio, pb_ratio, dividend_yield)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (stock_id, date)
        DO UPDATE SET
            pe_ratio = EXCLUDED.pe_ratio,
            pb_ratio = EXCLUDED.pb_ratio,
            dividend_yield = EXCLUDED.dividend_yield
        "#,
    )
    .bind(symbol)
    .bind(date)
    .bind(field_decimal(raw, "PER"))
    .bind(field_decimal(raw, "PBR"))
    .bind(field_decimal(raw, "dividend_yield"))
    .execute(pool)
    .await?;
    Ok(true)
}

// ==================== 日成交價量 ====================

#[derive(Debug, PartialEq)]
struct PriceRow {
    date: NaiveDate,
    open: Option<Decimal>,
    high: Option<Decimal>,
    low: Option<Decimal>,
    close: Option<Decimal>,
    spread: Option<Decimal>,
    volume: Option<i64>,
    trading_value: Option<Decimal>,
    trading_turnover: Option<i64>,
}

impl PriceRow {
    fn from_value(row: &Value) -> Option<Self> {
        Some(Self {
            date: field_date(row, "date")?,
            open: field_decimal(row, "open"),
            // FinMind 的最高/最低欄位名是 max/min
            high: field_decimal(row, "max"),
            low: field_decimal(row, "min"),
            close: field_decimal(row, "close"),
            spread: field_decimal(row, "spread"),
            volume: field_i64(row, "Trading_Volume"),
            trading_value: field_decimal(row, "Trading_money"),
            trading_turnover: field_i64(row, "Trading_turnover"),
        })
    }
}

async fn upsert_price(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(row) = PriceRow::from_value(raw) else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_stock_price (
            stock_id, date, open, high, low, close, spread,
            volume, trading_value, trading_turnover
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (stock_id, date)
        DO UPDATE SET
            open = EXCLUDED.open,
            high = EXCLUDED.high,
            low = EXCLUDED.low,
            close = EXCLUDED.close,
            spread = EXCLUDED.spread,
            volume = EXCLUDED.volume,
            trading_value = EXCLUDED.trading_value,
            trading_turnover = EXCLUDED.trading_turnover
        "#,
    )
    .bind(symbol)
    .bind(row.date)
    .bind(row.open)
    .bind(row.high)
    .bind(row.low)
    .bind(row.close)
    .bind(row.spread)
    .bind(row.volume)
    .bind(row.trading_value)
    .bind(row.trading_turnover)
    .execute(pool)
    .await?;
    Ok(true)
}

// ==================== 個股三大法人 ====================

async fn upsert_institutional(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(date) = field_date(raw, "date") else {
        return Ok(false);
    };
    let Some(name) = field_str(raw, "name") else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_institutional (stock_id, date, name, buy, sell)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (stock_id, date, name)
        DO UPDATE SET buy = EXCLUDED.buy, sell = EXCLUDED.sell
        "#,
    )
    .bind(symbol)
    .bind(date)
    .bind(name)
    .bind(field_i64(raw, "buy"))
    .bind(field_i64(raw, "sell"))
    .execute(pool)
    .await?;
    Ok(true)
}

// ==================== 融資融券 ====================

async fn upsert_margin_trading(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(date) = field_date(raw, "date") else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_margin_trading (
            stock_id, date,
            margin_purchase_buy, margin_purchase_sell, margin_purchase_cash_repayment,
            margin_purchase_yesterday_balance, margin_purchase_today_balance, margin_purchase_limit,
            short_sale_buy, short_sale_sell, short_sale_cash_repayment,
            short_sale_yesterday_balance, short_sale_today_balance, short_sale_limit,
            offsetting_margin_short
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (stock_id, date)
        DO UPDATE SET
            margin_purchase_buy = EXCLUDED.margin_purchase_buy,
            margin_purchase_sell = EXCLUDED.margin_purchase_sell,
            margin_purchase_cash_repayment = EXCLUDED.margin_purchase_cash_repayment,
            margin_purchase_yesterday_balance = EXCLUDED.margin_purchase_yesterday_balance,
            margin_purchase_today_balance = EXCLUDED.margin_purchase_today_balance,
            margin_purchase_limit = EXCLUDED.margin_purchase_limit,
            short_sale_buy = EXCLUDED.short_sale_buy,
            short_sale_sell = EXCLUDED.short_sale_sell,
            short_sale_cash_repayment = EXCLUDED.short_sale_cash_repayment,
            short_sale_yesterday_balance = EXCLUDED.short_sale_yesterday_balance,
            short_sale_today_balance = EXCLUDED.short_sale_today_balance,
            short_sale_limit = EXCLUDED.short_sale_limit,
            offsetting_margin_short = EXCLUDED.offsetting_margin_short
        "#,
    )
    .bind(symbol)
    .bind(date)
    .bind(field_i64(raw, "MarginPurchaseBuy"))
    .bind(field_i64(raw, "MarginPurchaseSell"))
    .bind(field_i64(raw, "MarginPurchaseCashRepayment"))
    .bind(field_i64(raw, "MarginPurchaseYesterdayBalance"))
    .bind(field_i64(raw, "MarginPurchaseTodayBalance"))
    .bind(field_i64(raw, "MarginPurchaseLimit"))
    .bind(field_i64(raw, "ShortSaleBuy"))
    .bind(field_i64(raw, "ShortSaleSell"))
    .bind(field_i64(raw, "ShortSaleCashRepayment"))
    .bind(field_i64(raw, "ShortSaleYesterdayBalance"))
    .bind(field_i64(raw, "ShortSaleTodayBalance"))
    .bind(field_i64(raw, "ShortSaleLimit"))
    .bind(field_i64(raw, "OffsetLoanAndShort"))
    .execute(pool)
    .await?;
    Ok(true)
}

// ==================== 個股新聞 ====================

async fn upsert_stock_news(
    pool: &PgPool,
    symbol: &str,
    raw: &Value,
) -> std::result::Result<bool, sqlx::Error> {
    let Some(date) = news_date(raw) else {
        return Ok(false);
    };
    let Some(title) = field_str(raw, "title") else {
        return Ok(false);
    };
    // 新聞不可變,重複抓取直接忽略
    sqlx::query(
        r#"
        INSERT INTO fm_stock_news (stock_id, date, title, source, description)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (stock_id, date, title) DO NOTHING
        "#,
    )
    .bind(symbol)
    .bind(date)
    .bind(title)
    .bind(field_str(raw, "source").unwrap_or(""))
    .bind(field_str(raw, "description").unwrap_or(""))
    .execute(pool)
    .await?;
    Ok(true)
}

/// 新聞的 date 欄位偶爾帶時間 (`2021-10-01 16:45:17`),只取日期部分。
fn news_date(raw: &Value) -> Option<NaiveDate> {
    let s = field_str(raw, "date")?;
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_month_revenue_row_mapping() {
        let raw = json!({
            "date": "2021-01-10",
            "stock_id": "2330",
            "country": "TW",
            "revenue": 205188000000i64,
            "revenue_month": 1,
            "revenue_year": 2021
        });
        let row = MonthRevenueRow::from_value(&raw).unwrap();
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2021, 1, 10).unwrap());
        assert_eq!(row.revenue_year, 2021);
        assert_eq!(row.revenue_month, 1);
        assert_eq!(row.revenue, Some(Decimal::from(205_188_000_000i64)));
    }

    #[test]
    fn test_month_revenue_row_requires_key_fields() {
        // 沒有日期或沒有年月的列不適用,跳過而非寫入壞鍵
        let raw = json!({"stock_id": "2330", "revenue": 1});
        assert!(MonthRevenueRow::from_value(&raw).is_none());
        let raw = json!({"date": "2021-01-10", "revenue": 1, "revenue_year": 2021});
        assert!(MonthRevenueRow::from_value(&raw).is_none());
    }

    #[test]
    fn test_statement_row_defaults_origin_name_to_type() {
        let raw = json!({"date": "2021-03-31", "type": "EPS", "value": 5.39});
        let row = StatementRow::from_value(&raw).unwrap();
        assert_eq!(row.kind, "EPS");
        assert_eq!(row.origin_name, "EPS");
        assert_eq!(row.value, Some(Decimal::new(539, 2)));
    }

    #[test]
    fn test_dividend_row_aggregates() {
        let raw = json!({
            "date": "2021-06-15",
            "year": 2020,
            "CashEarningsDistribution": 10.0,
            "CashStatutorySurplusDistribution": 0.5,
            "StockEarningsDistribution": 1.0
        });
        let row = DividendRow::from_value(&raw).unwrap();
        assert_eq!(row.year, Some(2020));
        assert_eq!(row.cash_dividend, Decimal::new(105, 1));
        // 缺的法定盈餘公積股票股利視為 0
        assert_eq!(row.stock_dividend, Decimal::new(10, 1));
        assert_eq!(row.total_dividend, Decimal::new(115, 1));
        // 成分欄位本身保留缺值
        assert_eq!(row.stock_statutory, None);
    }

    #[test]
    fn test_dividend_row_year_zero_is_missing() {
        let raw = json!({"date": "2021-06-15", "year": 0});
        let row = DividendRow::from_value(&raw).unwrap();
        assert_eq!(row.year, None);
    }

    #[test]
    fn test_price_row_maps_max_min() {
        let raw = json!({
            "date": "2021-01-05",
            "open": 580.0, "max": 584.0, "min": 578.0, "close": 580.0,
            "spread": 5.0,
            "Trading_Volume": 35447555i64,
            "Trading_money": 20607722395i64,
            "Trading_turnover": 32317
        });
        let row = PriceRow::from_value(&raw).unwrap();
        assert_eq!(row.high, Some(Decimal::new(584, 0)));
        assert_eq!(row.low, Some(Decimal::new(578, 0)));
        assert_eq!(row.volume, Some(35_447_555));
        assert_eq!(row.trading_turnover, Some(32_317));
    }

    #[test]
    fn test_news_date_strips_time_part() {
        let raw = json!({"date": "2021-10-01 16:45:17", "title": "t"});
        assert_eq!(
            news_date(&raw),
            NaiveDate::from_ymd_opt(2021, 10, 1)
        );
        let raw = json!({"date": "2021-10-01", "title": "t"});
        assert_eq!(news_date(&raw), NaiveDate::from_ymd_opt(2021, 10, 1));
    }
}
