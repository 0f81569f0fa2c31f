//! 跨步记忆存储：按会话隔离的只追加日志
//!
//! load 返回按插入顺序排列的条目（受 RetentionPolicy 限制只取最新 N 条），save 追加一条。
//! 条目格式固定为 `Action: <kind> → <result>`，由 format_entry 生成。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::session::SessionId;

/// 默认保留的最新条目数
pub const DEFAULT_MAX_ENTRIES: usize = 100;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "async-sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 记忆存储 trait
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 读取会话的全部（保留窗口内）条目，最旧在前
    async fn load(&self, session: &SessionId) -> Result<Vec<String>, MemoryError>;

    /// 追加一条
    async fn save(&self, session: &SessionId, entry: &str) -> Result<(), MemoryError>;
}

/// 生成一条记忆条目
pub fn format_entry(kind: &str, result: &str) -> String {
    format!("Action: {} → {}", kind, result)
}

/// 保留策略：按条数截断；None 表示不限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_entries: Option<usize>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self { max_entries: None }
    }

    pub fn max_entries(n: usize) -> Self {
        Self {
            max_entries: Some(n),
        }
    }

    /// 配置值 0 表示不限
    pub fn from_config(max_entries: usize) -> Self {
        if max_entries == 0 {
            Self::unbounded()
        } else {
            Self::max_entries(max_entries)
        }
    }

    /// 只保留最新的 max_entries 条，顺序不变
    pub fn window(&self, mut entries: Vec<String>) -> Vec<String> {
        if let Some(max) = self.max_entries {
            if entries.len() > max {
                entries.drain(..entries.len() - max);
            }
        }
        entries
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::max_entries(DEFAULT_MAX_ENTRIES)
    }
}

/// 内存实现：超出保留上限时丢弃最旧条目（无其它读者，无需保留完整日志）
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    store: Arc<RwLock<HashMap<SessionId, Vec<String>>>>,
    retention: RetentionPolicy,
}

impl InMemoryStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// 当前登记的会话数
    pub async fn session_count(&self) -> usize {
        self.store.read().await.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, session: &SessionId) -> Result<Vec<String>, MemoryError> {
        let store = self.store.read().await;
        Ok(store.get(session).cloned().unwrap_or_default())
    }

    async fn save(&self, session: &SessionId, entry: &str) -> Result<(), MemoryError> {
        let mut store = self.store.write().await;
        let entries = store.entry(session.clone()).or_default();
        entries.push(entry.to_string());
        if let Some(max) = self.retention.max_entries {
            let n = entries.len();
            if n > max {
                entries.drain(0..n - max);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_entry() {
        assert_eq!(
            format_entry("toggle_light", "light is on"),
            "Action: toggle_light → light is on"
        );
    }

    #[test]
    fn test_retention_window_keeps_newest_in_order() {
        let entries: Vec<String> = (1..=5).map(|i| i.to_string()).collect();
        let kept = RetentionPolicy::max_entries(2).window(entries.clone());
        assert_eq!(kept, vec!["4".to_string(), "5".to_string()]);
        assert_eq!(RetentionPolicy::unbounded().window(entries.clone()), entries);
        assert_eq!(RetentionPolicy::from_config(0), RetentionPolicy::unbounded());
    }

    #[tokio::test]
    async fn test_in_memory_preserves_order_and_isolates_sessions() {
        let store = InMemoryStore::default();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        store.save(&a, "first").await.unwrap();
        store.save(&b, "other").await.unwrap();
        store.save(&a, "second").await.unwrap();
        assert_eq!(store.load(&a).await.unwrap(), vec!["first", "second"]);
        assert_eq!(store.load(&b).await.unwrap(), vec!["other"]);
        assert!(store.load(&SessionId::from("c")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_evicts_oldest_beyond_cap() {
        let store = InMemoryStore::new(RetentionPolicy::max_entries(2));
        let s = SessionId::from("s");
        for e in ["1", "2", "3"] {
            store.save(&s, e).await.unwrap();
        }
        assert_eq!(store.load(&s).await.unwrap(), vec!["2", "3"]);
    }
}
