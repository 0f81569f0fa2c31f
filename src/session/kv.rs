//! 键值存储能力（会话级）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CapabilityError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CapabilityError>;

    /// 写入并返回旧值
    async fn set(&self, key: &str, value: &str) -> Result<Option<String>, CapabilityError>;
}

/// 内存实现，clone 后共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct InMemoryKv {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CapabilityError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<Option<String>, CapabilityError> {
        Ok(self
            .inner
            .write()
            .await
            .insert(key.to_string(), value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_returns_previous() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.set("light", "off").await.unwrap(), None);
        assert_eq!(kv.set("light", "on").await.unwrap(), Some("off".to_string()));
        assert_eq!(kv.get("light").await.unwrap(), Some("on".to_string()));
        assert_eq!(kv.get("missing").await.unwrap(), None);
    }
}
