//! 异步 SQLite 记忆存储
//!
//! 使用 sqlx 提供完全异步的数据库操作，避免在 async 上下文中阻塞。
//! 需要启用 `async-sqlite` feature。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::memory::{MemoryError, MemoryStore, RetentionPolicy};
    use crate::session::SessionId;

    /// SQLite 记忆存储：全部条目保留在表中，load 时按保留策略取最新 N 条
    pub struct SqliteMemoryStore {
        pool: SqlitePool,
        retention: RetentionPolicy,
    }

    impl SqliteMemoryStore {
        pub async fn new(
            db_path: impl AsRef<Path>,
            retention: RetentionPolicy,
        ) -> Result<Self, MemoryError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            Self::from_pool(pool, retention).await
        }

        /// 从连接池创建（建表）
        pub async fn from_pool(
            pool: SqlitePool,
            retention: RetentionPolicy,
        ) -> Result<Self, MemoryError> {
            let store = Self { pool, retention };
            store.init_tables().await?;
            Ok(store)
        }

        async fn init_tables(&self) -> Result<(), sqlx::Error> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS memory_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    entry TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_memory_session ON memory_entries(session_id, id)",
            )
            .execute(&self.pool)
            .await?;

            Ok(())
        }
    }

    #[async_trait]
    impl MemoryStore for SqliteMemoryStore {
        async fn load(&self, session: &SessionId) -> Result<Vec<String>, MemoryError> {
            // SQLite 中 LIMIT -1 表示不限
            let limit = self
                .retention
                .max_entries
                .map(|n| n as i64)
                .unwrap_or(-1);
            let rows = sqlx::query(
                "SELECT entry FROM (
                    SELECT id, entry FROM memory_entries
                    WHERE session_id = ? ORDER BY id DESC LIMIT ?
                 ) ORDER BY id ASC",
            )
            .bind(session.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows.into_iter().map(|row| row.get::<String, _>("entry")).collect())
        }

        async fn save(&self, session: &SessionId, entry: &str) -> Result<(), MemoryError> {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO memory_entries (session_id, entry, created_at) VALUES (?, ?, ?)",
            )
            .bind(session.as_str())
            .bind(entry)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteMemoryStore;

#[cfg(all(test, feature = "async-sqlite"))]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, RetentionPolicy};
    use crate::session::SessionId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_order_and_isolation() {
        let dir = TempDir::new().unwrap();
        let store = SqliteMemoryStore::new(dir.path().join("memory.db"), RetentionPolicy::unbounded())
            .await
            .unwrap();
        let a = SessionId::from("a");
        store.save(&a, "one").await.unwrap();
        store.save(&SessionId::from("b"), "other").await.unwrap();
        store.save(&a, "two").await.unwrap();
        assert_eq!(store.load(&a).await.unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_sqlite_retention_window() {
        let dir = TempDir::new().unwrap();
        let store = SqliteMemoryStore::new(dir.path().join("memory.db"), RetentionPolicy::max_entries(2))
            .await
            .unwrap();
        let s = SessionId::from("s");
        for e in ["1", "2", "3"] {
            store.save(&s, e).await.unwrap();
        }
        assert_eq!(store.load(&s).await.unwrap(), vec!["2", "3"]);
    }
}
