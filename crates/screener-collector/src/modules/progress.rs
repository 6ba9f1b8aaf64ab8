//! 同步進度追蹤模組。
//!
//! 以 (dataset, stock_id) 為鍵的耐久進度表,讓長時間批次可以
//! 中斷再開:重啟後查詢未標記的配對即得剩餘工作,已完成的
//! 配對不會重抓。全量資料集以空字串作為 `stock_id`。
//!
//! 進度列只在該配對的紀錄確實寫入 (或確認為空) 之後更新;
//! 正常運作中不刪除,重複標記僅更新時間戳。

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::Result;

/// 配對是否已標記完成。
pub async fn is_complete(pool: &PgPool, dataset: &str, stock_id: &str) -> Result<bool> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM fm_sync_progress WHERE dataset = $1 AND stock_id = $2",
    )
    .bind(dataset)
    .bind(stock_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// 標記配對完成。重複標記只更新 `last_sync_date`。
pub async fn mark_complete(pool: &PgPool, dataset: &str, stock_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO fm_sync_progress (dataset, stock_id, last_sync_date)
        VALUES ($1, $2, NOW())
        ON CONFLICT (dataset, stock_id)
        DO UPDATE SET last_sync_date = NOW()
        "#,
    )
    .bind(dataset)
    .bind(stock_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// 配對的最後同步時間 (增量抓取的水位線)。未標記時回傳 `None`。
pub async fn last_sync(
    pool: &PgPool,
    dataset: &str,
    stock_id: &str,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        "SELECT last_sync_date FROM fm_sync_progress WHERE dataset = $1 AND stock_id = $2",
    )
    .bind(dataset)
    .bind(stock_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(t,)| t))
}

/// 配對已完成且最後同步在 `stale_hours` 之內時回傳 true。
/// 逾期的配對視同未完成,會以水位線做增量重抓。
pub async fn is_fresh(
    pool: &PgPool,
    dataset: &str,
    stock_id: &str,
    stale_hours: i64,
) -> Result<bool> {
    match last_sync(pool, dataset, stock_id).await? {
        Some(t) => Ok(Utc::now() - t < chrono::Duration::hours(stale_hours)),
        None => Ok(false),
    }
}

/// 單一資料集的進度摘要。
#[derive(Debug)]
pub struct ProgressSummary {
    pub dataset: String,
    /// 已完成的配對數
    pub count: i64,
    /// 最近一次同步時間
    pub last_sync: Option<DateTime<Utc>>,
}

/// 各資料集的進度摘要 (觀測用)。
pub async fn summarize(pool: &PgPool) -> Result<Vec<ProgressSummary>> {
    let rows: Vec<(String, i64, Option<DateTime<Utc>>)> = sqlx::query_as(
        r#"
        SELECT dataset, COUNT(*), MAX(last_sync_date)
        FROM fm_sync_progress
        GROUP BY dataset
        ORDER BY dataset
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(dataset, count, last_sync)| ProgressSummary {
            dataset,
            count,
            last_sync,
        })
        .collect())
}
