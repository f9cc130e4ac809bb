//! 持久化服务：保存 / 擦除 / 整体擦除
//!
//! 保存的两个子效果（子系统保存、注册表追加）之间没有跨崩溃的全局原子性，
//! 这是已知的一致性窗口；追加失败时以落盘内容为准回读对账，内存镜像不得
//! 声称比实际持久化的更多。

use std::sync::Arc;

use crate::anchor::{AnchorId, AnchorSet};
use crate::core::AnchorError;
use crate::registry::Registry;
use crate::tracking::TrackingSubsystem;

pub struct PersistenceService {
    tracking: Arc<dyn TrackingSubsystem>,
    registry: Arc<Registry>,
    anchors: Arc<AnchorSet>,
}

/// 整体擦除的逐项结果；部分失败不是 bug，而是尽力而为语义的输出
#[derive(Debug, Default)]
pub struct BulkUnsaveOutcome {
    pub erased: Vec<AnchorId>,
    pub failures: Vec<(AnchorId, AnchorError)>,
}

impl BulkUnsaveOutcome {
    pub fn fully_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

impl PersistenceService {
    pub fn new(
        tracking: Arc<dyn TrackingSubsystem>,
        registry: Arc<Registry>,
        anchors: Arc<AnchorSet>,
    ) -> Self {
        Self {
            tracking,
            registry,
            anchors,
        }
    }

    /// 保存：子系统确认成功后才追加注册表并置 durable
    pub async fn save(&self, id: AnchorId) -> Result<(), AnchorError> {
        let record = self
            .anchors
            .get(id)
            .await
            .ok_or(AnchorError::UnknownAnchor(id))?;
        if !record.persistable() {
            return Err(AnchorError::NotPersistable(id));
        }

        // 子系统拒绝：注册表保持原状
        self.tracking
            .save(id)
            .await
            .map_err(|_| AnchorError::SaveFailed(id))?;

        if let Err(e) = self.registry.append(&id).await {
            // 子系统已保存但注册表落盘失败：回读对账后再上报
            self.reconcile_durable(id).await;
            return Err(e.into());
        }

        self.anchors.set_durable(id, true).await;
        tracing::info!(%id, "anchor saved");
        Ok(())
    }

    /// 擦除单个锚点的持久性；键控删除注册表条目
    pub async fn unsave(&self, id: AnchorId) -> Result<(), AnchorError> {
        if self.anchors.get(id).await.is_none() {
            return Err(AnchorError::UnknownAnchor(id));
        }

        self.tracking
            .erase(id)
            .await
            .map_err(|_| AnchorError::EraseFailed(id))?;

        self.anchors.set_durable(id, false).await;
        self.registry.remove(&id).await?;
        tracing::info!(%id, "anchor unsaved");
        Ok(())
    }

    /// 对工作集内全部锚点逐个擦除（单个失败不终止），然后无条件整表清空，
    /// 最后清空工作集
    pub async fn unsave_all(&self) -> Result<BulkUnsaveOutcome, AnchorError> {
        let ids = self.anchors.ids().await;
        let erasures = ids.iter().map(|id| {
            let id = *id;
            let tracking = self.tracking.clone();
            async move { (id, tracking.erase(id).await) }
        });
        let results = futures_util::future::join_all(erasures).await;

        let mut outcome = BulkUnsaveOutcome::default();
        for (id, result) in results {
            match result {
                Ok(()) => {
                    self.anchors.set_durable(id, false).await;
                    outcome.erased.push(id);
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "erase rejected during bulk unsave");
                    outcome.failures.push((id, AnchorError::EraseFailed(id)));
                }
            }
        }

        self.registry.clear().await?;
        self.anchors.clear().await;
        tracing::info!(
            erased = outcome.erased.len(),
            failed = outcome.failures.len(),
            "bulk unsave finished"
        );
        Ok(outcome)
    }

    async fn reconcile_durable(&self, id: AnchorId) {
        match self.registry.read_all().await {
            Ok(ids) => {
                let durable = ids.contains(&id);
                self.anchors.set_durable(id, durable).await;
            }
            Err(e) => tracing::warn!(%id, error = %e, "registry reconcile read failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{AnchorRecord, Pose};
    use crate::registry::SqliteRegistry;
    use crate::tracking::MockTracking;

    struct Fixture {
        tracking: Arc<MockTracking>,
        registry: Arc<Registry>,
        anchors: Arc<AnchorSet>,
        service: PersistenceService,
    }

    fn fixture() -> Fixture {
        let tracking = Arc::new(MockTracking::new());
        let registry = Arc::new(Registry::new(SqliteRegistry::in_memory().unwrap()));
        let anchors = Arc::new(AnchorSet::new());
        let service = PersistenceService::new(tracking.clone(), registry.clone(), anchors.clone());
        Fixture {
            tracking,
            registry,
            anchors,
            service,
        }
    }

    async fn confirmed_anchor(f: &Fixture) -> AnchorId {
        let id = crate::anchor::AnchorId::new(uuid::Uuid::new_v4());
        f.anchors
            .insert(AnchorRecord::confirmed(id, Pose::default()))
            .await;
        id
    }

    #[tokio::test]
    async fn test_save_appends_and_marks_durable() {
        let f = fixture();
        let id = confirmed_anchor(&f).await;

        f.service.save(id).await.unwrap();

        assert_eq!(f.registry.read_all().await.unwrap(), vec![id]);
        assert!(f.anchors.get(id).await.unwrap().durable);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_registry_unchanged() {
        let f = fixture();
        let existing = confirmed_anchor(&f).await;
        f.service.save(existing).await.unwrap();
        let before = f.registry.read_all().await.unwrap();

        let id = confirmed_anchor(&f).await;
        f.tracking.fail_save(id);

        let err = f.service.save(id).await.unwrap_err();
        assert!(matches!(err, AnchorError::SaveFailed(_)));
        // 保存失败前后注册表内容一致
        assert_eq!(f.registry.read_all().await.unwrap(), before);
        assert!(!f.anchors.get(id).await.unwrap().durable);
    }

    #[tokio::test]
    async fn test_save_precondition_rejects_unpersistable_status() {
        let f = fixture();
        let id = crate::anchor::AnchorId::new(uuid::Uuid::new_v4());
        let mut record = AnchorRecord::confirmed(id, Pose::default());
        record.status = crate::anchor::AnchorStatus::LocalizationFailed;
        f.anchors.insert(record).await;

        let err = f.service.save(id).await.unwrap_err();
        assert!(matches!(err, AnchorError::NotPersistable(_)));
        assert!(f.registry.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsave_removes_single_registry_entry() {
        let f = fixture();
        let a = confirmed_anchor(&f).await;
        let b = confirmed_anchor(&f).await;
        f.service.save(a).await.unwrap();
        f.service.save(b).await.unwrap();

        f.service.unsave(a).await.unwrap();

        assert_eq!(f.registry.read_all().await.unwrap(), vec![b]);
        assert!(!f.anchors.get(a).await.unwrap().durable);
        // 记录仍在工作集中，只是不再持久
        assert!(f.anchors.contains(a).await);
    }

    #[tokio::test]
    async fn test_unsave_erase_failure_keeps_durable() {
        let f = fixture();
        let id = confirmed_anchor(&f).await;
        f.service.save(id).await.unwrap();
        f.tracking.fail_erase(id);

        let err = f.service.unsave(id).await.unwrap_err();
        assert!(matches!(err, AnchorError::EraseFailed(_)));
        assert!(f.anchors.get(id).await.unwrap().durable);
        assert_eq!(f.registry.read_all().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_unsave_all_partial_failure_still_clears_registry() {
        let f = fixture();
        let a = confirmed_anchor(&f).await;
        let b = confirmed_anchor(&f).await;
        f.service.save(a).await.unwrap();
        f.service.save(b).await.unwrap();
        f.tracking.fail_erase(b);

        let outcome = f.service.unsave_all().await.unwrap();

        // 两次擦除都已发起，第二个的失败被逐项上报
        assert_eq!(f.tracking.erase_calls(), 2);
        assert_eq!(outcome.erased, vec![a]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, b);
        assert!(!outcome.fully_succeeded());
        // 整表清空无条件执行
        assert!(f.registry.read_all().await.unwrap().is_empty());
        assert!(f.anchors.is_empty().await);
    }
}
