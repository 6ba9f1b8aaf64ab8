//! 排程模組。
//!
//! 以台北時區計算觸發時點,註冊三個週期性觸發與一組啟動任務:
//!
//! - 每交易日 15:30:收盤後行情補齊 ([`super::daily_sync::catch_up`])
//! - 每小時整點:新聞更新
//! - 每週六 04:00:FinMind 基本面全量批次
//! - 程序啟動時:補齊缺漏交易日、新聞同步、基本面批次,
//!   各自為獨立背景任務,不阻塞啟動流程
//!
//! 每次觸發各自捕捉並記錄失敗;單次失敗不會取消排程本身。
//! 所有任務監聽同一個 [`CancellationToken`],讓常駐模式可以
//! 乾淨收掉長時間批次。

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Asia::Taipei;
use chrono_tz::Tz;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use screener_data::provider::cnyes::CnyesClient;
use screener_data::FinMindClient;

use super::{daily_sync, full_sync, news_sync};
use crate::config::CollectorConfig;

/// 台股交易日 (週一到週五;國定假日由來源端回覆無資料)。
const TRADING_WEEKDAYS: &[Weekday] = &[
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// 基本面批次排在週六清晨,避開交易時段與收盤補齊。
const FUNDAMENTALS_WEEKDAYS: &[Weekday] = &[Weekday::Sat];

/// 啟動排程器。所有任務都是 fire-and-forget,立即回傳。
pub fn start_scheduler(
    pool: PgPool,
    client: FinMindClient,
    config: CollectorConfig,
    shutdown: CancellationToken,
) {
    if config.scheduler.startup_tasks {
        spawn_startup_tasks(&pool, &client, &config, &shutdown);
    }

    spawn_daily_catch_up(&pool, &config, &shutdown);
    spawn_hourly_news(&pool, &config, &shutdown);
    spawn_weekly_fundamentals(&pool, &client, &config, &shutdown);

    info!("排程系統已啟動 (時區: Asia/Taipei)");
}

/// 啟動時的一次性任務:行情補齊、新聞、基本面批次。
/// 三者各自獨立,任何一個失敗不影響其他兩個。
fn spawn_startup_tasks(
    pool: &PgPool,
    client: &FinMindClient,
    config: &CollectorConfig,
    shutdown: &CancellationToken,
) {
    {
        let pool = pool.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = daily_sync::catch_up(&pool, &config.daily) => match result {
                    Ok(stats) => stats.log_summary("啟動補齊"),
                    Err(e) => error!(error = %e, "啟動補齊失敗"),
                },
                _ = shutdown.cancelled() => {}
            }
        });
    }
    {
        let pool = pool.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let news_client = CnyesClient::new();
            tokio::select! {
                result = news_sync::sync_news(&pool, &news_client, config.news.limit) => match result {
                    Ok(stats) => stats.log_summary("啟動新聞同步"),
                    Err(e) => error!(error = %e, "啟動新聞同步失敗"),
                },
                _ = shutdown.cancelled() => {}
            }
        });
    }
    {
        let pool = pool.clone();
        let client = client.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let opts = full_sync::FullSyncOptions::default();
            tokio::select! {
                result = full_sync::run_full_sync(&pool, &client, &config.finmind, &opts) => match result {
                    Ok(stats) => stats.log_summary("啟動基本面批次"),
                    Err(e) => error!(error = %e, "啟動基本面批次失敗"),
                },
                _ = shutdown.cancelled() => {}
            }
        });
    }
}

/// 每交易日 15:30 (台股收盤後) 補齊當日行情。
fn spawn_daily_catch_up(pool: &PgPool, config: &CollectorConfig, shutdown: &CancellationToken) {
    let pool = pool.clone();
    let config = config.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            let now = Utc::now().with_timezone(&Taipei);
            let next = next_occurrence(now, 15, 30, Some(TRADING_WEEKDAYS));
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!("定時排程開始:抓取今日行情");
                    match daily_sync::catch_up(&pool, &config.daily).await {
                        Ok(stats) => stats.log_summary("收盤行情補齊"),
                        Err(e) => error!(error = %e, "行情補齊失敗"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

/// 每小時整點更新新聞。
fn spawn_hourly_news(pool: &PgPool, config: &CollectorConfig, shutdown: &CancellationToken) {
    let pool = pool.clone();
    let config = config.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let news_client = CnyesClient::new();
        loop {
            let now = Utc::now().with_timezone(&Taipei);
            let wait = std::time::Duration::from_secs(
                seconds_until_next_hour(now.minute(), now.second()) as u64,
            );
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!("定時排程開始:更新新聞");
                    match news_sync::sync_news(&pool, &news_client, config.news.limit).await {
                        Ok(stats) => stats.log_summary("新聞更新"),
                        Err(e) => error!(error = %e, "新聞更新失敗"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

/// 每週六 04:00 重跑 FinMind 基本面批次 (逾期的配對會增量重抓)。
fn spawn_weekly_fundamentals(
    pool: &PgPool,
    client: &FinMindClient,
    config: &CollectorConfig,
    shutdown: &CancellationToken,
) {
    let pool = pool.clone();
    let client = client.clone();
    let config = config.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            let now = Utc::now().with_timezone(&Taipei);
            let next = next_occurrence(now, 4, 0, Some(FUNDAMENTALS_WEEKDAYS));
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!("定時排程開始:更新基本面資料");
                    let opts = full_sync::FullSyncOptions::default();
                    match full_sync::run_full_sync(&pool, &client, &config.finmind, &opts).await {
                        Ok(stats) => stats.log_summary("基本面批次"),
                        Err(e) => error!(error = %e, "基本面批次失敗"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

/// 下一個符合 (時, 分, 星期) 的觸發時點,一定晚於 `now`。
///
/// 台北時區沒有日光節約,本地時間不會有歧義;保守起見仍以
/// 兩週為搜尋上限,萬一無解就退回隔天同一時刻。
fn next_occurrence(
    now: DateTime<Tz>,
    hour: u32,
    minute: u32,
    weekdays: Option<&[Weekday]>,
) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    for _ in 0..14 {
        if weekdays.map_or(true, |w| w.contains(&day.weekday())) {
            if let Some(naive) = day.and_hms_opt(hour, minute, 0) {
                if let Some(candidate) = tz.from_local_datetime(&naive).single() {
                    if candidate > now {
                        return candidate;
                    }
                }
            }
        }
        day += ChronoDuration::days(1);
    }
    now + ChronoDuration::days(1)
}

/// 距離下一個整點的秒數 (整點當下回傳一小時)。
fn seconds_until_next_hour(minute: u32, second: u32) -> i64 {
    let into_hour = (minute * 60 + second) as i64;
    if into_hour == 0 {
        3600
    } else {
        3600 - into_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taipei(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Tz> {
        Taipei
            .with_ymd_and_hms(y, m, d, hh, mm, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_next_occurrence_same_day_before_trigger() {
        // 週三 10:00 → 當天 15:30
        let now = taipei(2024, 2, 21, 10, 0);
        let next = next_occurrence(now, 15, 30, Some(TRADING_WEEKDAYS));
        assert_eq!(next, taipei(2024, 2, 21, 15, 30));
    }

    #[test]
    fn test_next_occurrence_after_trigger_moves_to_next_day() {
        // 週三 16:00 → 週四 15:30
        let now = taipei(2024, 2, 21, 16, 0);
        let next = next_occurrence(now, 15, 30, Some(TRADING_WEEKDAYS));
        assert_eq!(next, taipei(2024, 2, 22, 15, 30));
    }

    #[test]
    fn test_next_occurrence_skips_weekend() {
        // 週五 16:00 → 下週一 15:30
        let now = taipei(2024, 2, 23, 16, 0);
        let next = next_occurrence(now, 15, 30, Some(TRADING_WEEKDAYS));
        assert_eq!(next, taipei(2024, 2, 26, 15, 30));
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_next_occurrence_weekly_saturday() {
        // 週日 10:00 → 下週六 04:00
        let now = taipei(2024, 2, 18, 10, 0);
        let next = next_occurrence(now, 4, 0, Some(FUNDAMENTALS_WEEKDAYS));
        assert_eq!(next, taipei(2024, 2, 24, 4, 0));
    }

    #[test]
    fn test_next_occurrence_exact_trigger_time_advances() {
        // 正好在觸發時刻:取下一次,不立即觸發
        let now = taipei(2024, 2, 21, 15, 30);
        let next = next_occurrence(now, 15, 30, Some(TRADING_WEEKDAYS));
        assert_eq!(next, taipei(2024, 2, 22, 15, 30));
    }

    #[test]
    fn test_seconds_until_next_hour() {
        assert_eq!(seconds_until_next_hour(59, 0), 60);
        assert_eq!(seconds_until_next_hour(0, 1), 3599);
        assert_eq!(seconds_until_next_hour(0, 0), 3600);
    }
}
