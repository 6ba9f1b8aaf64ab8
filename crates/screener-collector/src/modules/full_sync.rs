//! FinMind 全量同步批次 (Batch Orchestrator)。
//!
//! 先同步全量資料集,再以升冪、確定性的順序逐股驅動
//! [`super::stock_sync`]。逐股之間固定停頓,讓
//! 股票數 × 資料集數的呼叫量穩定落在供應商限額之下
//! (保守抓慢,額度與正確性優先於吞吐)。
//!
//! 中斷後重跑只處理進度表未標記 (或已逾期) 的配對,
//! 最終狀態與一次跑完相同。

use std::time::Instant;

use sqlx::PgPool;
use tracing::{error, info};

use screener_data::FinMindClient;

use super::{market_sync, stock_sync};
use crate::config::FinMindSyncConfig;
use crate::{Result, SyncStats};

/// 全量同步選項 (CLI 覆寫)。
#[derive(Debug, Clone, Default)]
pub struct FullSyncOptions {
    /// 從這個代號 (含) 開始,用於手動續跑
    pub start: Option<String>,
    /// 最多處理的股票數
    pub limit: Option<usize>,
}

/// 股票母體:4 碼數字代號 (排除權證與特別股),升冪排序
/// 讓重跑之間可以比較。
async fn stock_universe(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT symbol FROM stocks WHERE symbol ~ '^[0-9]{4}$' ORDER BY symbol ASC")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

/// 執行 FinMind 全量同步。
pub async fn run_full_sync(
    pool: &PgPool,
    client: &FinMindClient,
    config: &FinMindSyncConfig,
    opts: &FullSyncOptions,
) -> Result<SyncStats> {
    let started = Instant::now();
    let mut stats = SyncStats::new();
    let sync_opts = stock_sync::StockSyncOptions::from(config);

    info!(
        start_date = %config.start_date,
        tokens = config.tokens.len(),
        "FinMind 全量同步開始"
    );

    // Phase 1: 全量資料集 (總覽先行,逐股選股依賴 stocks 表)
    match market_sync::sync_market_datasets(pool, client, &sync_opts).await {
        Ok(market_stats) => stats.merge(&market_stats),
        Err(e) => {
            stats.errors += 1;
            error!(error = %e, "全量資料集階段失敗,仍繼續逐股階段");
        }
    }

    // Phase 2: 逐股資料集
    let mut symbols = stock_universe(pool).await?;
    if let Some(start) = &opts.start {
        symbols.retain(|s| s.as_str() >= start.as_str());
        info!(start = %start, remaining = symbols.len(), "從指定代號續跑");
    }
    if let Some(limit) = opts.limit {
        symbols.truncate(limit);
    }
    info!(count = symbols.len(), "逐股同步開始");

    let total = symbols.len();
    for (idx, symbol) in symbols.iter().enumerate() {
        match stock_sync::sync_stock(pool, client, &sync_opts, symbol).await {
            Ok(stock_stats) => stats.merge(&stock_stats),
            Err(e) => {
                // 單檔失敗 (通常是 DB 層) 不中斷批次
                stats.errors += 1;
                error!(symbol, error = %e, "個股同步失敗,繼續下一檔");
            }
        }

        if (idx + 1) % 10 == 0 || idx + 1 == total {
            info!(
                progress = format!("{}/{}", idx + 1, total),
                records = stats.total_records,
                errors = stats.errors,
                token_status = %client.token_pool().status_line(),
                "逐股同步進度"
            );
        }

        if idx + 1 < total {
            tokio::time::sleep(config.pacing()).await;
        }
    }

    stats.elapsed = started.elapsed();
    Ok(stats)
}
