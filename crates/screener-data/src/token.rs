//! FinMind API token 輪替管理。
//!
//! FinMind 的每組 token 各自有獨立的流量額度 (免費方案約每小時
//! 600 次呼叫)。長時間批次靠輪替讓同步不必停等;整池耗盡時
//! 由呼叫端先冷卻等待,再呼叫 [`TokenPool::reset_all`] 重置,
//! 因為供應商端的額度重置時間無法精準掌握。

use std::collections::HashSet;
use std::sync::Mutex;

/// Token 輪替池。
///
/// 以 `Arc<TokenPool>` 注入使用,測試可建立獨立的池。
/// 狀態以 `Mutex` 保護;批次設計上同一時間只有一個遠端呼叫在進行,
/// 鎖不會競爭,但排程器的背景任務共享同一個池,仍需互斥。
pub struct TokenPool {
    tokens: Vec<String>,
    state: Mutex<PoolState>,
}

struct PoolState {
    current: usize,
    exhausted: HashSet<usize>,
}

impl TokenPool {
    /// 以 token 清單建立池。空清單表示不帶認證呼叫。
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            state: Mutex::new(PoolState {
                current: 0,
                exhausted: HashSet::new(),
            }),
        }
    }

    /// 池中 token 總數。
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// 池是否為空 (來源允許匿名呼叫時可為空)。
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 目前使用中的 token。池為空時回傳 `None`。
    pub fn current(&self) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }
        let state = self.lock();
        Some(self.tokens[state.current].clone())
    }

    /// 目前 token 的索引 (記錄用,0-based)。
    pub fn current_index(&self) -> usize {
        self.lock().current
    }

    /// 尚未標記耗盡的 token 數。
    pub fn available(&self) -> usize {
        let state = self.lock();
        self.tokens.len() - state.exhausted.len()
    }

    /// 將目前 token 標記為耗盡,並往後掃描 (循環) 切換到下一個
    /// 可用的 token。
    ///
    /// 池中僅有一組或零組 token 時不改變狀態並回傳 `false`,
    /// 由呼叫端改走冷卻路徑;掃完一圈找不到可用 token 也回傳 `false`。
    pub fn rotate(&self, reason: &str) -> bool {
        if self.tokens.len() <= 1 {
            return false;
        }
        let mut state = self.lock();
        let from = state.current;
        state.exhausted.insert(from);
        for i in 1..self.tokens.len() {
            let next = (from + i) % self.tokens.len();
            if !state.exhausted.contains(&next) {
                state.current = next;
                tracing::info!(
                    from = from + 1,
                    to = next + 1,
                    total = self.tokens.len(),
                    reason = reason,
                    "切換 Token"
                );
                return true;
            }
        }
        tracing::error!(total = self.tokens.len(), "所有 Token 額度皆已耗盡");
        false
    }

    /// 清除所有耗盡標記。
    ///
    /// 只在整池冷卻等待之後呼叫;不做定時自動重置。
    pub fn reset_all(&self) {
        let mut state = self.lock();
        state.exhausted.clear();
        tracing::info!(total = self.tokens.len(), "Token 池已重置");
    }

    /// 狀態摘要 (記錄用)。
    pub fn status_line(&self) -> String {
        format!(
            "Token 共 {} 組,可用 {} 組,目前使用 #{}",
            self.len(),
            self.available(),
            self.current_index() + 1
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().expect("token pool mutex poisoned")
    }
}
