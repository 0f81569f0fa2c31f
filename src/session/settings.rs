//! 配置读取能力：只读键值（来自 [settings] 配置段）

use std::collections::HashMap;

pub trait Settings: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// 所有键（排序后），用于提示模型可查询的项
    fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl Settings for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }
}
