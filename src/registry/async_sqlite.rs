//! 异步 SQLite 注册表（sqlx）
//!
//! 使用 sqlx 提供完全异步的数据库操作，避免在 async 上下文中阻塞。
//! 需要启用 `async-registry` feature。

#[cfg(feature = "async-registry")]
mod sqlx_impl {
    use std::path::Path;

    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::anchor::AnchorId;
    use crate::registry::RegistryError;

    /// 异步注册表后端，与同步 SqliteRegistry 同一表结构
    pub struct AsyncSqliteRegistry {
        pool: SqlitePool,
    }

    impl AsyncSqliteRegistry {
        pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, RegistryError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            let registry = Self { pool };
            registry.init_tables().await?;

            Ok(registry)
        }

        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }

        async fn init_tables(&self) -> Result<(), RegistryError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS anchors (
                    uuid TEXT PRIMARY KEY,
                    seq INTEGER NOT NULL,
                    saved_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            Ok(())
        }

        pub async fn append(&self, id: &AnchorId) -> Result<(), RegistryError> {
            sqlx::query(
                "INSERT OR IGNORE INTO anchors (uuid, seq, saved_at)
                 VALUES (?, (SELECT IFNULL(MAX(seq), 0) + 1 FROM anchors), ?)",
            )
            .bind(id.to_string())
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

            Ok(())
        }

        pub async fn read_all(&self) -> Result<Vec<AnchorId>, RegistryError> {
            let rows = sqlx::query("SELECT uuid FROM anchors ORDER BY seq ASC")
                .fetch_all(&self.pool)
                .await?;

            let mut ids = Vec::new();
            for row in rows {
                let text: String = row.get("uuid");
                let id = AnchorId::parse(&text)
                    .map_err(|e| RegistryError::Corrupt(format!("bad uuid row {text}: {e}")))?;
                ids.push(id);
            }
            Ok(ids)
        }

        pub async fn remove(&self, id: &AnchorId) -> Result<bool, RegistryError> {
            let result = sqlx::query("DELETE FROM anchors WHERE uuid = ?")
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        }

        pub async fn clear(&self) -> Result<(), RegistryError> {
            sqlx::query("DELETE FROM anchors")
                .execute(&self.pool)
                .await?;

            Ok(())
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }
    }
}

#[cfg(feature = "async-registry")]
pub use sqlx_impl::AsyncSqliteRegistry;

#[cfg(all(test, feature = "async-registry"))]
mod tests {
    use super::*;
    use crate::anchor::AnchorId;
    use tempfile::TempDir;

    fn fresh_id() -> AnchorId {
        AnchorId::new(uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_async_append_and_read_all() {
        let dir = TempDir::new().unwrap();
        let reg = AsyncSqliteRegistry::open(dir.path().join("anchors.db"))
            .await
            .unwrap();

        let a = fresh_id();
        let b = fresh_id();
        reg.append(&a).await.unwrap();
        reg.append(&b).await.unwrap();
        reg.append(&a).await.unwrap();

        assert_eq!(reg.read_all().await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_async_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let reg = AsyncSqliteRegistry::open(dir.path().join("anchors.db"))
            .await
            .unwrap();

        let a = fresh_id();
        let b = fresh_id();
        reg.append(&a).await.unwrap();
        reg.append(&b).await.unwrap();

        assert!(reg.remove(&a).await.unwrap());
        assert!(!reg.remove(&a).await.unwrap());
        assert_eq!(reg.read_all().await.unwrap(), vec![b]);

        reg.clear().await.unwrap();
        assert!(reg.read_all().await.unwrap().is_empty());
    }
}
