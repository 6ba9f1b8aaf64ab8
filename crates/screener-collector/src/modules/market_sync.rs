//! 全量 FinMind 資料集同步模組 (不需逐股)。
//!
//! 台股總覽必須最先同步:逐股階段的選股來自 `stocks` 資料表。
//! 其餘為交易日曆與市場層級的法人/融資融券彙總,各自寫入
//! 獨立的資料表,與逐股資料集互不重疊。

use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use screener_data::provider::finmind::{
    field_date, field_decimal, field_str, DatasetRequest, FetchOutcome, FinMindClient,
};
use screener_data::Dataset;

use super::progress;
use super::stock_sync::StockSyncOptions;
use crate::{Result, SyncStats};

/// 依固定順序同步全量資料集。
pub async fn sync_market_datasets(
    pool: &PgPool,
    client: &FinMindClient,
    opts: &StockSyncOptions,
) -> Result<SyncStats> {
    let mut stats = SyncStats::new();

    for dataset in Dataset::MARKET_ORDER {
        stats.total += 1;

        if progress::is_fresh(pool, dataset.api_name(), "", opts.stale_hours).await? {
            stats.skipped += 1;
            continue;
        }

        info!(dataset = %dataset, "全量資料集同步開始");
        let request = DatasetRequest::market(dataset, Some(opts.start_date));
        match client.fetch(&request).await {
            FetchOutcome::Success(rows) => {
                let written = persist_rows(pool, dataset, &rows).await;
                if written == 0 {
                    stats.errors += 1;
                    warn!(dataset = %dataset, records = rows.len(), "全數寫入失敗");
                } else {
                    stats.success += 1;
                    stats.total_records += written;
                    progress::mark_complete(pool, dataset.api_name(), "").await?;
                    info!(dataset = %dataset, written, total = rows.len(), "全量資料集同步完成");
                }
            }
            FetchOutcome::Empty => {
                stats.empty += 1;
                progress::mark_complete(pool, dataset.api_name(), "").await?;
            }
            FetchOutcome::RateLimited | FetchOutcome::QuotaExhausted => {
                stats.errors += 1;
                warn!(dataset = %dataset, "冷卻重試後仍受限,留待下次排程");
            }
            FetchOutcome::TransientError(detail) => {
                stats.errors += 1;
                warn!(dataset = %dataset, error = %detail, "抓取失敗,跳過");
            }
        }
    }

    Ok(stats)
}

async fn persist_rows(pool: &PgPool, dataset: Dataset, rows: &[Value]) -> usize {
    let mut written = 0;
    for row in rows {
        let result = match dataset {
            Dataset::StockInfo => upsert_stock_info(pool, row).await,
            Dataset::TradingDate => upsert_trading_date(pool, row).await,
            Dataset::TotalInstitutional => upsert_total_institutional(pool, row).await,
            Dataset::TotalMargin => upsert_total_margin(pool, row).await,
            other => {
                debug!(dataset = %other, "非全量資料集,略過");
                break;
            }
        };
        match result {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(e) => {
                debug!(dataset = %dataset, error = %e, "單筆寫入失敗");
            }
        }
    }
    written
}

/// 台股總覽 → `stocks`。代號與名稱截長,符合欄位寬度。
async fn upsert_stock_info(pool: &PgPool, raw: &Value) -> std::result::Result<bool, sqlx::Error> {
    let Some(symbol) = field_str(raw, "stock_id") else {
        return Ok(false);
    };
    let symbol: String = symbol.chars().take(20).collect();
    let name: String = field_str(raw, "stock_name")
        .unwrap_or(&symbol)
        .chars()
        .take(200)
        .collect();
    let industry: String = field_str(raw, "industry_category")
        .unwrap_or("")
        .chars()
        .take(200)
        .collect();
    let market: String = field_str(raw, "type").unwrap_or("").chars().take(200).collect();

    sqlx::query(
        r#"
        INSERT INTO stocks (symbol, name, industry, market)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (symbol)
        DO UPDATE SET name = EXCLUDED.name, industry = EXCLUDED.industry
        "#,
    )
    .bind(&symbol)
    .bind(&name)
    .bind(&industry)
    .bind(&market)
    .execute(pool)
    .await?;
    Ok(true)
}

/// 交易日曆 → `trading_dates`。
async fn upsert_trading_date(pool: &PgPool, raw: &Value) -> std::result::Result<bool, sqlx::Error> {
    let Some(date) = field_date(raw, "date") else {
        return Ok(false);
    };
    let description: String = field_str(raw, "description")
        .unwrap_or("")
        .chars()
        .take(100)
        .collect();
    sqlx::query(
        r#"
        INSERT INTO trading_dates (date, description)
        VALUES ($1, $2)
        ON CONFLICT (date) DO UPDATE SET description = EXCLUDED.description
        "#,
    )
    .bind(date)
    .bind(&description)
    .execute(pool)
    .await?;
    Ok(true)
}

/// 整體法人買賣金額 → `fm_total_institutional`。
async fn upsert_total_institutional(
    pool: &PgPool,
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
        INSERT INTO fm_total_institutional (date, name, buy, sell)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (date, name)
        DO UPDATE SET buy = EXCLUDED.buy, sell = EXCLUDED.sell
        "#,
    )
    .bind(date)
    .bind(name)
    .bind(field_decimal(raw, "buy"))
    .bind(field_decimal(raw, "sell"))
    .execute(pool)
    .await?;
    Ok(true)
}

/// 整體融資融券餘額 → `fm_total_margin`。
async fn upsert_total_margin(pool: &PgPool, raw: &Value) -> std::result::Result<bool, sqlx::Error> {
    let Some(date) = field_date(raw, "date") else {
        return Ok(false);
    };
    let Some(name) = field_str(raw, "name").or_else(|| field_str(raw, "Name")) else {
        return Ok(false);
    };
    sqlx::query(
        r#"
        INSERT INTO fm_total_margin (
            date, name,
            margin_purchase_buy, margin_purchase_sell, margin_purchase_cash_repayment,
            margin_purchase_yesterday_balance, margin_purchase_today_balance,
            short_sale_buy, short_sale_sell, short_sale_cash_repayment,
            short_sale_yesterday_balance, short_sale_today_balance
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (date, name)
        DO UPDATE SET
            margin_purchase_buy = EXCLUDED.margin_purchase_buy,
            margin_purchase_sell = EXCLUDED.margin_purchase_sell,
            margin_purchase_cash_repayment = EXCLUDED.margin_purchase_cash_repayment,
            margin_purchase_yesterday_balance = EXCLUDED.margin_purchase_yesterday_balance,
            margin_purchase_today_balance = EXCLUDED.margin_purchase_today_balance,
            short_sale_buy = EXCLUDED.short_sale_buy,
            short_sale_sell = EXCLUDED.short_sale_sell,
            short_sale_cash_repayment = EXCLUDED.short_sale_cash_repayment,
            short_sale_yesterday_balance = EXCLUDED.short_sale_yesterday_balance,
            short_sale_today_balance = EXCLUDED.short_sale_today_balance
        "#,
    )
    .bind(date)
    .bind(name)
    .bind(field_decimal(raw, "MarginPurchaseBuy"))
    .bind(field_decimal(raw, "MarginPurchaseSell"))
    .bind(field_decimal(raw, "MarginPurchaseCashRepayment"))
    .bind(field_decimal(raw, "MarginPurchaseYesterdayBalance"))
    .bind(field_decimal(raw, "MarginPurchaseTodayBalance"))
    .bind(field_decimal(raw, "ShortSaleBuy"))
    .bind(field_decimal(raw, "ShortSaleSell"))
    .bind(field_decimal(raw, "ShortSaleCashRepayment"))
    .bind(field_decimal(raw, "ShortSaleYesterdayBalance"))
    .bind(field_decimal(raw, "ShortSaleTodayBalance"))
    .execute(pool)
    .await?;
    Ok(true)
}
