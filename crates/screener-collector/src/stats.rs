//! 同步統計結構。

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 同步作業統計。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// 總嘗試數 (配對或來源呼叫)
    pub total: usize,
    /// 成功數
    pub success: usize,
    /// 錯誤數
    pub errors: usize,
    /// 跳過數 (進度表已標記完成且未逾期)
    pub skipped: usize,
    /// 空回應數 (抓取成功但無資料)
    pub empty: usize,
    /// 寫入的總筆數
    pub total_records: usize,
    /// 耗時
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SyncStats {
    /// 新統計物件。
    pub fn new() -> Self {
        Self::default()
    }

    /// 成功率 (%)。
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 併入另一份統計 (子階段彙總用,不動 elapsed)。
    pub fn merge(&mut self, other: &SyncStats) {
        self.total += other.total;
        self.success += other.success;
        self.errors += other.errors;
        self.skipped += other.skipped;
        self.empty += other.empty;
        self.total_records += other.total_records;
    }

    /// 統計摘要記錄。
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            skipped = self.skipped,
            empty = self.empty,
            total_records = self.total_records,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "同步完成"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut stats = SyncStats::new();
        assert_eq!(stats.success_rate(), 0.0);
        stats.total = 4;
        stats.success = 3;
        assert_eq!(stats.success_rate(), 75.0);
    }

    #[test]
    fn test_merge() {
        let mut a = SyncStats {
            total: 2,
            success: 1,
            errors: 1,
            ..Default::default()
        };
        let b = SyncStats {
            total: 3,
            success: 3,
            total_records: 10,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.total, 5);
        assert_eq!(a.success, 4);
        assert_eq!(a.errors, 1);
        assert_eq!(a.total_records, 10);
    }
}
