//! 文件注册表：单文件 JSON，每个标识一条结构化记录
//!
//! 写穿语义：每次变更先写临时文件并落盘，再原子改名覆盖，append 返回后进程
//! 崩溃也不丢条目；整文档一次写入，计数与内容不会出现不配对的中间态。

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anchor::AnchorId;
use crate::registry::{RegistryError, RegistryStore};

#[derive(Serialize, Deserialize, Default)]
struct RegistryDoc {
    uuids: Vec<String>,
}

/// 单文件 JSON 注册表后端
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    /// 打开即回读校验既有内容；文件不存在视为空表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let registry = Self {
            path: path.as_ref().to_path_buf(),
        };
        registry.load()?;
        Ok(registry)
    }

    fn load(&self) -> Result<RegistryDoc, RegistryError> {
        if !self.path.exists() {
            return Ok(RegistryDoc::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data)
            .map_err(|e| RegistryError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    fn store(&self, doc: &RegistryDoc) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(doc)
            .map_err(|e| RegistryError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RegistryStore for FileRegistry {
    fn append(&self, id: &AnchorId) -> Result<(), RegistryError> {
        let mut doc = self.load()?;
        let text = id.to_string();
        if doc.uuids.iter().any(|u| *u == text) {
            return Ok(());
        }
        doc.uuids.push(text);
        self.store(&doc)
    }

    fn read_all(&self) -> Result<Vec<AnchorId>, RegistryError> {
        let doc = self.load()?;
        doc.uuids
            .iter()
            .map(|u| {
                AnchorId::parse(u)
                    .map_err(|e| RegistryError::Corrupt(format!("bad uuid entry {u}: {e}")))
            })
            .collect()
    }

    fn remove(&self, id: &AnchorId) -> Result<bool, RegistryError> {
        let mut doc = self.load()?;
        let text = id.to_string();
        let before = doc.uuids.len();
        doc.uuids.retain(|u| *u != text);
        if doc.uuids.len() == before {
            return Ok(false);
        }
        self.store(&doc)?;
        Ok(true)
    }

    fn clear(&self) -> Result<(), RegistryError> {
        self.store(&RegistryDoc::default())
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
        let dir = TempDir::new().unwrap();
        let reg = FileRegistry::open(dir.path().join("anchors.json")).unwrap();

        let a = fresh_id();
        let b = fresh_id();
        reg.append(&a).unwrap();
        reg.append(&b).unwrap();
        // 重复追加是幂等的
        reg.append(&a).unwrap();

        assert_eq!(reg.read_all().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anchors.json");
        let a = fresh_id();

        {
            let reg = FileRegistry::open(&path).unwrap();
            reg.append(&a).unwrap();
        }

        let reopened = FileRegistry::open(&path).unwrap();
        assert_eq!(reopened.read_all().unwrap(), vec![a]);
    }

    #[test]
    fn test_remove_single_entry() {
        let dir = TempDir::new().unwrap();
        let reg = FileRegistry::open(dir.path().join("anchors.json")).unwrap();
        let a = fresh_id();
        let b = fresh_id();
        reg.append(&a).unwrap();
        reg.append(&b).unwrap();

        assert!(reg.remove(&a).unwrap());
        assert!(!reg.remove(&a).unwrap());
        assert_eq!(reg.read_all().unwrap(), vec![b]);
    }

    #[test]
    fn test_clear_empties_any_size() {
        let dir = TempDir::new().unwrap();
        let reg = FileRegistry::open(dir.path().join("anchors.json")).unwrap();
        for _ in 0..10 {
            reg.append(&fresh_id()).unwrap();
        }

        reg.clear().unwrap();
        assert!(reg.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anchors.json");
        std::fs::write(&path, "not json at all").unwrap();

        match FileRegistry::open(&path) {
            Err(RegistryError::Corrupt(_)) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }
}
