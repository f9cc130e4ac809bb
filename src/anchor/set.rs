//! 活动工作集：按标识键控的锚点集合
//!
//! 保存/擦除按标识寻址，多个锚点可独立操作；「最近创建」指针只是
//! SaveLast/UnsaveLast 的 UI 便利，不承载任何一致性语义。

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::anchor::{AnchorId, AnchorRecord, AnchorStatus};

#[derive(Default)]
struct Inner {
    records: HashMap<AnchorId, AnchorRecord>,
    last_created: Option<AnchorId>,
}

/// 本会话内的锚点工作集；擦除成功或整体 unsave 后记录被移出
#[derive(Default)]
pub struct AnchorSet {
    inner: RwLock<Inner>,
}

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入已确认的记录（无标识的记录不进入工作集，只存在于创建路径内）
    pub async fn insert(&self, record: AnchorRecord) {
        let Some(id) = record.id else {
            tracing::warn!("record without id cannot join the working set");
            return;
        };
        self.inner.write().await.records.insert(id, record);
    }

    /// 每次创建确认成功后更新的最近指针
    pub async fn mark_last_created(&self, id: AnchorId) {
        self.inner.write().await.last_created = Some(id);
    }

    pub async fn last_created(&self) -> Option<AnchorId> {
        self.inner.read().await.last_created
    }

    pub async fn get(&self, id: AnchorId) -> Option<AnchorRecord> {
        self.inner.read().await.records.get(&id).cloned()
    }

    pub async fn contains(&self, id: AnchorId) -> bool {
        self.inner.read().await.records.contains_key(&id)
    }

    /// 状态只能前进；回退请求记日志后忽略，返回是否生效
    pub async fn set_status(&self, id: AnchorId, status: AnchorStatus) -> bool {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&id) {
            Some(record) => {
                if status.rank() < record.status.rank() {
                    tracing::warn!(%id, from = ?record.status, to = ?status, "status rollback ignored");
                    return false;
                }
                record.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn set_durable(&self, id: AnchorId, durable: bool) -> bool {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&id) {
            Some(record) => {
                record.durable = durable;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: AnchorId) -> Option<AnchorRecord> {
        let mut inner = self.inner.write().await;
        if inner.last_created == Some(id) {
            inner.last_created = None;
        }
        inner.records.remove(&id)
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.last_created = None;
    }

    pub async fn ids(&self) -> Vec<AnchorId> {
        self.inner.read().await.records.keys().copied().collect()
    }

    /// 全量快照，供 UiState 投影
    pub async fn snapshot(&self) -> Vec<AnchorRecord> {
        self.inner.read().await.records.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}
