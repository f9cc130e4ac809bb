//! SQLite 注册表：默认后端
//!
//! 每个标识一行，seq 保持插入序；单条语句自带事务，clear 观察到的永远是
//! 写前或写后的完整状态。

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::anchor::AnchorId;
use crate::registry::{RegistryError, RegistryStore};

/// rusqlite 注册表后端
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    /// 打开数据库并确保表结构存在
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// 内存库，测试用
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS anchors (
                uuid TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                saved_at TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("registry connection lock poisoned")
    }
}

impl RegistryStore for SqliteRegistry {
    fn append(&self, id: &AnchorId) -> Result<(), RegistryError> {
        let conn = self.conn();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT seq FROM anchors WHERE uuid = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(());
        }
        conn.execute(
            "INSERT INTO anchors (uuid, seq, saved_at)
             VALUES (?1, (SELECT IFNULL(MAX(seq), 0) + 1 FROM anchors), ?2)",
            params![id.to_string(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<AnchorId>, RegistryError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT uuid FROM anchors ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            let text = row?;
            let id = AnchorId::parse(&text)
                .map_err(|e| RegistryError::Corrupt(format!("bad uuid row {text}: {e}")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn remove(&self, id: &AnchorId) -> Result<bool, RegistryError> {
        let affected = self.conn().execute(
            "DELETE FROM anchors WHERE uuid = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    fn clear(&self) -> Result<(), RegistryError> {
        self.conn().execute("DELETE FROM anchors", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_id() -> AnchorId {
        AnchorId::new(uuid::Uuid::new_v4())
    }

    #[test]
    fn test_append_dedup_and_order() {
        let reg = SqliteRegistry::in_memory().unwrap();
        let a = fresh_id();
        let b = fresh_id();
        let c = fresh_id();

        reg.append(&a).unwrap();
        reg.append(&b).unwrap();
        reg.append(&a).unwrap();
        reg.append(&c).unwrap();

        assert_eq!(reg.read_all().unwrap(), vec![a, b, c]);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anchors.db");
        let a = fresh_id();
        let b = fresh_id();

        {
            let reg = SqliteRegistry::open(&path).unwrap();
            reg.append(&a).unwrap();
            reg.append(&b).unwrap();
        }

        let reopened = SqliteRegistry::open(&path).unwrap();
        assert_eq!(reopened.read_all().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_remove_keeps_order_of_rest() {
        let reg = SqliteRegistry::in_memory().unwrap();
        let a = fresh_id();
        let b = fresh_id();
        let c = fresh_id();
        reg.append(&a).unwrap();
        reg.append(&b).unwrap();
        reg.append(&c).unwrap();

        assert!(reg.remove(&b).unwrap());
        assert!(!reg.remove(&b).unwrap());
        assert_eq!(reg.read_all().unwrap(), vec![a, c]);
    }

    #[test]
    fn test_clear() {
        let reg = SqliteRegistry::in_memory().unwrap();
        for _ in 0..5 {
            reg.append(&fresh_id()).unwrap();
        }
        reg.clear().unwrap();
        assert!(reg.read_all().unwrap().is_empty());
    }
}
