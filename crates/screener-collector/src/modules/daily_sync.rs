//! 交易所日線回補模組 (TWSE/TPEx)。
//!
//! 逐交易日抓取上市/上櫃的收盤行情、估值指標與三大法人,
//! 寫入 `daily_prices`、`fundamentals`、`institutional`。
//! [`catch_up`] 從 `daily_prices` 現有的日期範圍推導缺口,
//! 自動補齊;[`run_range`] 供手動指定區間回補。
//!
//! 單一來源或單一日期失敗只記錄並繼續,整體回補不中斷。

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use screener_data::provider::tpex::TpexClient;
use screener_data::provider::twse::{DailyQuote, DailyValuation, InstitutionalFlow, TwseClient};

use crate::config::DailySyncConfig;
use crate::error::is_foreign_key_violation;
use crate::{Result, SyncStats};

/// 回補區間內的平日 (週末必休市,直接跳過;平日遇休市日
/// 由來源端回覆無資料)。
fn weekdays_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(current);
        }
        current += ChronoDuration::days(1);
    }
    days
}

/// 指定區間的日線回補。
pub async fn run_range(
    pool: &PgPool,
    config: &DailySyncConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SyncStats> {
    let started = std::time::Instant::now();
    let mut stats = SyncStats::new();
    let twse = TwseClient::new();
    let tpex = TpexClient::new();

    let days = weekdays_between(start, end);
    info!(start = %start, end = %end, days = days.len(), "日線區間回補開始");

    for (idx, date) in days.iter().copied().enumerate() {
        sync_one_day(pool, &twse, &tpex, config, date, &mut stats).await;

        if (idx + 1) % 10 == 0 || idx + 1 == days.len() {
            info!(
                progress = format!("{}/{}", idx + 1, days.len()),
                records = stats.total_records,
                errors = stats.errors,
                "日線回補進度"
            );
        }
        if idx + 1 < days.len() {
            tokio::time::sleep(config.day_pause()).await;
        }
    }

    stats.elapsed = started.elapsed();
    Ok(stats)
}

/// 單一交易日的六個來源呼叫,彼此之間固定停頓。
async fn sync_one_day(
    pool: &PgPool,
    twse: &TwseClient,
    tpex: &TpexClient,
    config: &DailySyncConfig,
    date: NaiveDate,
    stats: &mut SyncStats,
) {
    let delay = config.request_delay();

    stats.total += 1;
    match twse.fetch_daily_quotes(date).await {
        Ok(quotes) if quotes.is_empty() => {
            stats.empty += 1;
            debug!(date = %date, "TWSE 無資料或休市");
        }
        Ok(quotes) => {
            stats.success += 1;
            stats.total_records += persist_quotes(pool, &quotes, true).await;
        }
        Err(e) => {
            stats.errors += 1;
            warn!(date = %date, error = %e, "TWSE 行情抓取失敗");
        }
    }
    tokio::time::sleep(delay).await;

    stats.total += 1;
    match tpex.fetch_daily_quotes(date).await {
        Ok(quotes) if quotes.is_empty() => stats.empty += 1,
        Ok(quotes) => {
            stats.success += 1;
            stats.total_records += persist_quotes(pool, &quotes, false).await;
        }
        Err(e) => {
            stats.errors += 1;
            warn!(date = %date, error = %e, "TPEx 行情抓取失敗");
        }
    }
    tokio::time::sleep(delay).await;

    stats.total += 1;
    match twse.fetch_valuations(date).await {
        Ok(rows) if rows.is_empty() => stats.empty += 1,
        Ok(rows) => {
            stats.success += 1;
            stats.total_records += persist_valuations(pool, &rows).await;
        }
        Err(e) => {
            stats.errors += 1;
            warn!(date = %date, error = %e, "TWSE 估值抓取失敗");
        }
    }
    tokio::time::sleep(delay).await;

    stats.total += 1;
    match tpex.fetch_valuations(date).await {
        Ok(rows) if rows.is_empty() => stats.empty += 1,
        Ok(rows) => {
            stats.success += 1;
            stats.total_records += persist_valuations(pool, &rows).await;
        }
        Err(e) => {
            stats.errors += 1;
            warn!(date = %date, error = %e, "TPEx 估值抓取失敗");
        }
    }
    tokio::time::sleep(delay).await;

    stats.total += 1;
    match twse.fetch_institutional(date).await {
        Ok(rows) if rows.is_empty() => stats.empty += 1,
        Ok(rows) => {
            stats.success += 1;
            stats.total_records += persist_institutional(pool, &rows).await;
        }
        Err(e) => {
            stats.errors += 1;
            warn!(date = %date, error = %e, "TWSE 法人買賣超抓取失敗");
        }
    }
    tokio::time::sleep(delay).await;

    stats.total += 1;
    match tpex.fetch_institutional(date).await {
        Ok(rows) if rows.is_empty() => stats.empty += 1,
        Ok(rows) => {
            stats.success += 1;
            stats.total_records += persist_institutional(pool, &rows).await;
        }
        Err(e) => {
            stats.errors += 1;
            warn!(date = %date, error = %e, "TPEx 法人買賣超抓取失敗");
        }
    }
}

/// 確保 `stocks` 有這個代號,避免日線寫入撞外鍵。
async fn ensure_stock(
    pool: &PgPool,
    symbol: &str,
    name: &str,
    market: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stocks (symbol, name, market) VALUES ($1, $2, $3) ON CONFLICT (symbol) DO NOTHING",
    )
    .bind(symbol)
    .bind(if name.is_empty() { symbol } else { name })
    .bind(market)
    .execute(pool)
    .await?;
    Ok(())
}

/// 行情寫入 `daily_prices`。上市資料源權威性較高,覆寫既有列;
/// 上櫃端點偶有重送,僅補缺。
async fn persist_quotes(pool: &PgPool, quotes: &[DailyQuote], overwrite: bool) -> usize {
    let mut written = 0;
    for quote in quotes {
        if let Err(e) = ensure_stock(pool, &quote.symbol, &quote.name, quote.market).await {
            debug!(symbol = %quote.symbol, error = %e, "stocks 寫入失敗");
            continue;
        }
        let sql = if overwrite {
            r#"
            INSERT INTO daily_prices (
                symbol, trade_date, open_price, high_price, low_price, close_price,
                change_amount, change_percent, volume, trade_value, transactions
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (symbol, trade_date)
            DO UPDATE SET
                open_price = EXCLUDED.open_price,
                high_price = EXCLUDED.high_price,
                low_price = EXCLUDED.low_price,
                close_price = EXCLUDED.close_price,
                change_amount = EXCLUDED.change_amount,
                change_percent = EXCLUDED.change_percent,
                volume = EXCLUDED.volume,
                trade_value = EXCLUDED.trade_value,
                transactions = EXCLUDED.transactions
            "#
        } else {
            r#"
            INSERT INTO daily_prices (
                symbol, trade_date, open_price, high_price, low_price, close_price,
                change_amount, change_percent, volume, trade_value, transactions
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (symbol, trade_date) DO NOTHING
            "#
        };
        let result = sqlx::query(sql)
            .bind(&quote.symbol)
            .bind(quote.date)
            .bind(quote.open)
            .bind(quote.high)
            .bind(quote.low)
            .bind(quote.close)
            .bind(quote.change)
            .bind(quote.change_percent)
            .bind(quote.volume)
            .bind(quote.trade_value)
            .bind(quote.transactions)
            .execute(pool)
            .await;
        match result {
            Ok(_) => written += 1,
            Err(e) if is_foreign_key_violation(&e) => {
                debug!(symbol = %quote.symbol, error = %e, "外鍵違反,跳過單筆");
            }
            Err(e) => {
                debug!(symbol = %quote.symbol, error = %e, "daily_prices 寫入失敗");
            }
        }
    }
    written
}

/// 估值寫入 `fundamentals` (本益比、殖利率、股價淨值比)。
async fn persist_valuations(pool: &PgPool, rows: &[DailyValuation]) -> usize {
    let mut written = 0;
    for row in rows {
        if let Err(e) = ensure_stock(pool, &row.symbol, "", "").await {
            debug!(symbol = %row.symbol, error = %e, "stocks 寫入失敗");
            continue;
        }
        let result = sqlx::query(
            r#"
            INSERT INTO fundamentals (symbol, trade_date, pe_ratio, dividend_yield, pb_ratio)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (symbol, trade_date)
            DO UPDATE SET
                pe_ratio = EXCLUDED.pe_ratio,
                dividend_yield = EXCLUDED.dividend_yield,
                pb_ratio = EXCLUDED.pb_ratio
            "#,
        )
        .bind(&row.symbol)
        .bind(row.date)
        .bind(row.pe_ratio)
        .bind(row.dividend_yield)
        .bind(row.pb_ratio)
        .execute(pool)
        .await;
        match result {
            Ok(_) => written += 1,
            Err(e) => {
                debug!(symbol = %row.symbol, error = %e, "fundamentals 寫入失敗");
            }
        }
    }
    written
}

/// 法人買賣超寫入 `institutional`。盤後數字不會改,僅補缺。
async fn persist_institutional(pool: &PgPool, rows: &[InstitutionalFlow]) -> usize {
    let mut written = 0;
    for row in rows {
        if let Err(e) = ensure_stock(pool, &row.symbol, "", "").await {
            debug!(symbol = %row.symbol, error = %e, "stocks 寫入失敗");
            continue;
        }
        let result = sqlx::query(
            r#"
            INSERT INTO institutional (
                symbol, trade_date,
                foreign_buy, foreign_sell, foreign_net,
                trust_buy, trust_sell, trust_net,
                dealer_buy, dealer_sell, dealer_net, total_net
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (symbol, trade_date) DO NOTHING
            "#,
        )
        .bind(&row.symbol)
        .bind(row.date)
        .bind(row.foreign_buy)
        .bind(row.foreign_sell)
        .bind(row.foreign_net)
        .bind(row.trust_buy)
        .bind(row.trust_sell)
        .bind(row.trust_net)
        .bind(row.dealer_buy)
        .bind(row.dealer_sell)
        .bind(row.dealer_net)
        .bind(row.total_net)
        .execute(pool)
        .await;
        match result {
            Ok(_) => written += 1,
            Err(e) => {
                debug!(symbol = %row.symbol, error = %e, "institutional 寫入失敗");
            }
        }
    }
    written
}

/// 自動補齊:從 `daily_prices` 的日期範圍推導缺口。
///
/// - 資料庫為空 → 回補近 N 年 (預設 3 年)
/// - 最舊資料晚於回補視窗 → 往前回補舊資料
/// - 最新資料落後今天 → 往後補齊新資料
/// - 價格已是最新 → 檢查法人資料是否落後,單獨補齊
pub async fn catch_up(pool: &PgPool, config: &DailySyncConfig) -> Result<SyncStats> {
    let today = Utc::now().date_naive();
    let horizon = today - ChronoDuration::days(365 * config.backfill_years as i64);

    let (db_min, db_max): (Option<NaiveDate>, Option<NaiveDate>) =
        sqlx::query_as("SELECT MIN(trade_date), MAX(trade_date) FROM daily_prices")
            .fetch_one(pool)
            .await?;

    let mut stats = SyncStats::new();

    let (Some(db_min), Some(db_max)) = (db_min, db_max) else {
        info!(horizon = %horizon, "資料庫為空,開始完整回補");
        return run_range(pool, config, horizon, today).await;
    };

    // 回補舊資料
    if db_min > horizon {
        let end_backfill = db_min - ChronoDuration::days(1);
        if end_backfill >= horizon {
            info!(db_min = %db_min, horizon = %horizon, "發現舊資料缺漏,開始回補");
            stats.merge(&run_range(pool, config, horizon, end_backfill).await?);
        }
    }

    if db_max < today {
        // 補齊新資料
        let start = db_max + ChronoDuration::days(1);
        info!(db_max = %db_max, "發現新資料缺漏,開始補齊");
        stats.merge(&run_range(pool, config, start, today).await?);
    } else {
        // 價格已是最新,檢查法人資料是否落後
        let (inst_max,): (Option<NaiveDate>,) =
            sqlx::query_as("SELECT MAX(trade_date) FROM institutional")
                .fetch_one(pool)
                .await?;
        match inst_max {
            Some(inst_max) if inst_max >= db_max => {
                info!(db_max = %db_max, "價格與法人資料皆已最新");
            }
            inst_max => {
                let start = inst_max
                    .map(|d| d + ChronoDuration::days(1))
                    .unwrap_or(horizon);
                info!(inst_max = ?inst_max, db_max = %db_max, "法人資料落後,開始回補");
                stats.merge(&run_range(pool, config, start, db_max).await?);
            }
        }
    }

    info!("補齊檢查完成");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekdays_between_skips_weekend() {
        // 2024-02-16 (五) 到 2024-02-20 (二):跳過 17 (六)、18 (日)
        let start = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
        let days = weekdays_between(start, end);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 19).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 20).unwrap(),
            ]
        );
    }

    #[test]
    fn test_weekdays_between_empty_when_reversed() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
        assert!(weekdays_between(start, end).is_empty());
    }

    #[test]
    fn test_weekdays_between_single_weekend_day() {
        let saturday = NaiveDate::from_ymd_opt(2024, 2, 17).unwrap();
        assert!(weekdays_between(saturday, saturday).is_empty());
    }
}
