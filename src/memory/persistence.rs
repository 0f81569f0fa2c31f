//! 记忆持久化：每个会话一个 JSONL 文件
//!
//! `<dir>/<session_id>.jsonl`，每行一条 `{"entry": "...", "created_at": "RFC3339"}`，只追加不改写；
//! 文件不存在时视为空历史。跨进程重启后可恢复同一会话的记忆。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::memory::{MemoryError, MemoryStore, RetentionPolicy};
use crate::session::SessionId;

#[derive(Serialize, Deserialize)]
struct EntryRecord {
    entry: String,
    created_at: String,
}

/// JSONL 文件存储
#[derive(Debug, Clone)]
pub struct JsonlMemoryStore {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl JsonlMemoryStore {
    pub fn new(dir: impl AsRef<Path>, retention: RetentionPolicy) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            retention,
        }
    }

    fn session_path(&self, session: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", session.as_str()))
    }
}

#[async_trait]
impl MemoryStore for JsonlMemoryStore {
    async fn load(&self, session: &SessionId) -> Result<Vec<String>, MemoryError> {
        let path = self.session_path(session);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (idx, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EntryRecord>(line) {
                Ok(record) => entries.push(record.entry),
                // 写入中断留下的半行
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping malformed memory record"
                ),
            }
        }
        Ok(self.retention.window(entries))
    }

    async fn save(&self, session: &SessionId, entry: &str) -> Result<(), MemoryError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let record = EntryRecord {
            entry: entry.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
