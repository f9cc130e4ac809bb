//! 标识注册表：哪些锚点标识当前处于「已保存」状态的持久记录
//!
//! 键控集合：追加幂等、按标识单条删除、整表清空三种变更；
//! 后端为文件（JSON）或 SQLite，显式 open 读取既有落盘状态，不做隐式懒创建。

pub mod file;
pub mod sqlite;

#[cfg(feature = "async-registry")]
pub mod async_sqlite;

pub use file::FileRegistry;
pub use sqlite::SqliteRegistry;

#[cfg(feature = "async-registry")]
pub use async_sqlite::AsyncSqliteRegistry;

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::anchor::AnchorId;
use crate::config::StorageSection;

/// 注册表存储层错误；计数与内容永远配对，出错时不会留下不一致的中间态
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry io: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "async-registry")]
    #[error("registry sqlite (async): {0}")]
    AsyncSqlite(#[from] sqlx::Error),

    #[error("registry content corrupt: {0}")]
    Corrupt(String),
}

/// 注册表存储后端：append 幂等且写穿，read_all 按插入序，clear 原子
pub trait RegistryStore: Send + Sync {
    fn append(&self, id: &AnchorId) -> Result<(), RegistryError>;

    fn read_all(&self) -> Result<Vec<AnchorId>, RegistryError>;

    /// 键控单条删除，返回标识此前是否在表中
    fn remove(&self, id: &AnchorId) -> Result<bool, RegistryError>;

    fn clear(&self) -> Result<(), RegistryError>;
}

/// 注册表句柄：全部写操作互斥串行，读可与「无在途写」并发
pub struct Registry {
    store: RwLock<Box<dyn RegistryStore>>,
}

impl Registry {
    pub fn new(store: impl RegistryStore + 'static) -> Self {
        Self {
            store: RwLock::new(Box::new(store)),
        }
    }

    pub async fn append(&self, id: &AnchorId) -> Result<(), RegistryError> {
        self.store.write().await.append(id)
    }

    pub async fn read_all(&self) -> Result<Vec<AnchorId>, RegistryError> {
        self.store.read().await.read_all()
    }

    pub async fn remove(&self, id: &AnchorId) -> Result<bool, RegistryError> {
        self.store.write().await.remove(id)
    }

    pub async fn clear(&self) -> Result<(), RegistryError> {
        self.store.write().await.clear()
    }
}

/// 按配置打开注册表后端；open 即读取既有状态，格式损坏立即报错
pub fn open_registry(storage: &StorageSection) -> Result<Registry, RegistryError> {
    match storage.backend.as_str() {
        "file" => {
            let path = storage
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from("anchors.json"));
            Ok(Registry::new(FileRegistry::open(path)?))
        }
        _ => {
            let path = storage
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from("anchors.db"));
            Ok(Registry::new(SqliteRegistry::open(path)?))
        }
    }
}
