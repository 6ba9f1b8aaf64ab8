//! 環境變數設定模組。

use crate::Result;
use chrono::NaiveDate;
use std::time::Duration;

/// 同步引擎整體設定。
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 資料庫連線字串
    pub database_url: String,
    /// FinMind 同步設定
    pub finmind: FinMindSyncConfig,
    /// 交易所日線回補設定
    pub daily: DailySyncConfig,
    /// 新聞同步設定
    pub news: NewsSyncConfig,
    /// 排程器設定
    pub scheduler: SchedulerConfig,
}

/// FinMind 同步設定。
#[derive(Debug, Clone)]
pub struct FinMindSyncConfig {
    /// Token 清單 (`FINMIND_TOKENS=t1,t2`;空清單表示匿名呼叫)
    pub tokens: Vec<String>,
    /// 歷史回補起日
    pub start_date: NaiveDate,
    /// 逐股之間的固定間隔 (毫秒)。保守抓慢:額度與正確性優先於速度。
    pub pacing_ms: u64,
    /// 已完成配對的重新整理門檻 (小時)
    pub stale_hours: i64,
    /// 增量抓取時往前重疊的天數 (涵蓋回溯修正)
    pub refresh_overlap_days: i64,
    /// 整池耗盡後的冷卻秒數
    pub cooldown_secs: u64,
}

/// 交易所日線回補設定。
#[derive(Debug, Clone)]
pub struct DailySyncConfig {
    /// 資料庫為空時的回補年數
    pub backfill_years: i32,
    /// 同一天各來源呼叫之間的間隔 (毫秒)
    pub request_delay_ms: u64,
    /// 每個交易日之間的間隔 (毫秒)
    pub day_pause_ms: u64,
}

/// 新聞同步設定。
#[derive(Debug, Clone)]
pub struct NewsSyncConfig {
    /// 每個分類抓取的則數
    pub limit: usize,
}

/// 排程器設定。
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 程序啟動時是否跑補齊/新聞/基本面的一次性任務
    pub startup_tasks: bool,
}

impl CollectorConfig {
    /// 從環境變數載入設定。
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            crate::error::CollectorError::Config("DATABASE_URL 環境變數未設定".to_string())
        })?;

        let tokens = std::env::var("FINMIND_TOKENS")
            .or_else(|_| std::env::var("FINMIND_TOKEN"))
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let start_date = std::env::var("FINMIND_START_DATE")
            .ok()
            .and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
            .unwrap_or_else(default_start_date);

        Ok(Self {
            database_url,
            finmind: FinMindSyncConfig {
                tokens,
                start_date,
                pacing_ms: env_var_parse("FINMIND_PACING_MS", 6000),
                stale_hours: env_var_parse("FINMIND_STALE_HOURS", 168),
                refresh_overlap_days: env_var_parse("FINMIND_REFRESH_OVERLAP_DAYS", 30),
                cooldown_secs: env_var_parse("FINMIND_COOLDOWN_SECS", 60),
            },
            daily: DailySyncConfig {
                backfill_years: env_var_parse("DAILY_BACKFILL_YEARS", 3),
                request_delay_ms: env_var_parse("DAILY_REQUEST_DELAY_MS", 1000),
                day_pause_ms: env_var_parse("DAILY_DAY_PAUSE_MS", 3000),
            },
            news: NewsSyncConfig {
                limit: env_var_parse("NEWS_LIMIT", 20),
            },
            scheduler: SchedulerConfig {
                startup_tasks: env_var_bool("SCHEDULER_STARTUP_TASKS", true),
            },
        })
    }
}

impl FinMindSyncConfig {
    /// 逐股之間的間隔。
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// 整池冷卻時間。
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl DailySyncConfig {
    /// 來源呼叫間隔。
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// 交易日之間的間隔。
    pub fn day_pause(&self) -> Duration {
        Duration::from_millis(self.day_pause_ms)
    }
}

/// 預設回補起日 (近五年涵蓋月營收與財報的完整比較基期)。
fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).expect("valid default date")
}

/// 環境變數解析 (失敗時用預設值)。
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 環境變數 bool 解析。
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_parse_falls_back() {
        assert_eq!(env_var_parse("NO_SUCH_VAR_FOR_TEST", 42u64), 42);
    }

    #[test]
    fn test_default_start_date() {
        assert_eq!(
            default_start_date(),
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
        );
    }
}
