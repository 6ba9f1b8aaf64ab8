//! Standalone data synchronization CLI.

use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screener_collector::modules::{self, full_sync, progress, stock_sync};
use screener_collector::CollectorConfig;
use screener_data::provider::cnyes::CnyesClient;
use screener_data::{FinMindClient, TokenPool};

#[derive(Parser)]
#[command(name = "screener-collector")]
#[command(about = "Taiwan Stock Screener Data Collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 記錄層級 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// FinMind 全量同步 (全量資料集 + 逐股,可中斷續跑)
    FullSync {
        /// 從這個代號 (含) 開始,手動續跑用
        #[arg(long)]
        start: Option<String>,

        /// 最多處理的股票數
        #[arg(long)]
        limit: Option<usize>,
    },

    /// 交易所日線區間回補 (TWSE/TPEx)
    RunRange {
        /// 起日 (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// 迄日 (YYYY-MM-DD)
        #[arg(long)]
        end: String,
    },

    /// 自動補齊缺漏的交易日資料
    CatchUp,

    /// 新聞同步 (鉅亨網各分類)
    SyncNews,

    /// 同步單一股票的 FinMind 資料集
    SyncStock {
        /// 股票代號 (例: 2330)
        symbol: String,
    },

    /// 顯示各資料集的同步進度
    Progress,

    /// 常駐模式:排程器 + 啟動補齊
    Daemon,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 記錄初始化
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "screener_collector={level},screener_data={level}",
                    level = cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("台股篩選器資料同步引擎啟動");

    // 設定載入
    let config = CollectorConfig::from_env()?;
    tracing::debug!(database_url = %config.database_url, "設定載入完成");

    // DB 連線
    let pool = sqlx::PgPool::connect(&config.database_url).await?;
    tracing::info!("資料庫連線成功");

    // Token 池與 FinMind 用戶端 (池為程序內單例,注入各批次共用)
    let tokens = Arc::new(TokenPool::new(config.finmind.tokens.clone()));
    if tokens.is_empty() {
        tracing::warn!("未設定 FINMIND_TOKENS,以匿名額度呼叫 FinMind");
    } else {
        tracing::info!(count = tokens.len(), "FinMind token 載入完成");
    }
    let client = FinMindClient::new(Arc::clone(&tokens)).with_cooldown(config.finmind.cooldown());

    match cli.command {
        Commands::FullSync { start, limit } => {
            let opts = full_sync::FullSyncOptions { start, limit };
            let stats = modules::run_full_sync(&pool, &client, &config.finmind, &opts).await?;
            stats.log_summary("FinMind 全量同步");
        }
        Commands::RunRange { start, end } => {
            let start = parse_date(&start)?;
            let end = parse_date(&end)?;
            let stats = modules::run_range(&pool, &config.daily, start, end).await?;
            stats.log_summary("日線區間回補");
        }
        Commands::CatchUp => {
            let stats = modules::catch_up(&pool, &config.daily).await?;
            stats.log_summary("日線補齊");
        }
        Commands::SyncNews => {
            let news_client = CnyesClient::new();
            let stats = modules::sync_news(&pool, &news_client, config.news.limit).await?;
            stats.log_summary("新聞同步");
        }
        Commands::SyncStock { symbol } => {
            let opts = stock_sync::StockSyncOptions::from(&config.finmind);
            let stats = modules::sync_stock(&pool, &client, &opts, &symbol).await?;
            stats.log_summary(&format!("個股同步 {}", symbol));
        }
        Commands::Progress => {
            let summaries = progress::summarize(&pool).await?;
            if summaries.is_empty() {
                tracing::info!("進度表為空,尚未執行過同步");
            }
            for summary in summaries {
                tracing::info!(
                    dataset = %summary.dataset,
                    completed = summary.count,
                    last_sync = ?summary.last_sync,
                    "同步進度"
                );
            }
        }
        Commands::Daemon => {
            tracing::info!("=== 常駐模式啟動 ===");
            let shutdown = CancellationToken::new();
            modules::start_scheduler(pool.clone(), client, config, shutdown.clone());

            tokio::signal::ctrl_c().await?;
            tracing::info!("收到終止訊號,排程器關閉中...");
            shutdown.cancel();
        }
    }

    pool.close().await;
    tracing::info!("資料同步引擎結束");

    Ok(())
}

/// CLI 日期參數解析。
fn parse_date(raw: &str) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("日期格式錯誤 (需 YYYY-MM-DD): {} ({})", raw, e).into())
}
