//! 重载/重定位协调器
//!
//! 会话启动路径：读回注册表全部标识 → 一次批量解析 → 逐句柄推进状态机，
//! 绑定结果按完成序进入流。单个标识失败是本会话终态，不影响其余标识，
//! 也不会把该标识从注册表中剪除。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};

use crate::anchor::{AnchorId, AnchorRecord, AnchorSet};
use crate::core::AnchorError;
use crate::lifecycle::AnchorEvent;
use crate::registry::Registry;
use crate::tracking::{TrackingSubsystem, UnboundAnchor};

/// 每个标识的解析进度；显式标签使「至多一次在途重定位」成为可检查的约束
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveState {
    /// 已向子系统请求解析
    Requested,
    /// 句柄返回时已完成重定位
    Localized,
    /// 重定位在途（本层发起的，或子系统侧既有的）
    Localizing,
    /// 重定位失败，本会话终态
    Failed,
    /// 已绑定并产出记录
    Bound,
}

/// 重载协调器；clone 共享同一组依赖
#[derive(Clone)]
pub struct AnchorLoader {
    tracking: Arc<dyn TrackingSubsystem>,
    registry: Arc<Registry>,
    anchors: Arc<AnchorSet>,
    events: broadcast::Sender<AnchorEvent>,
    max_concurrent: usize,
}

impl AnchorLoader {
    pub fn new(
        tracking: Arc<dyn TrackingSubsystem>,
        registry: Arc<Registry>,
        anchors: Arc<AnchorSet>,
        events: broadcast::Sender<AnchorEvent>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            tracking,
            registry,
            anchors,
            events,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 读回注册表并解析重绑；返回按完成序产出 Bound 记录的流。
    /// 注册表为空不是错误，返回立即结束的空流。
    pub async fn load_and_bind(&self) -> Result<mpsc::Receiver<AnchorRecord>, AnchorError> {
        let ids = self.registry.read_all().await?;
        if ids.is_empty() {
            let (_tx, rx) = mpsc::channel(1);
            return Ok(rx);
        }

        tracing::info!(count = ids.len(), "loading saved anchors");

        // 单次批量解析；子系统未返回句柄时本次无可恢复锚点，记日志后给出空流
        let handles = match self.tracking.resolve_unbound(&ids).await {
            Ok(handles) => handles,
            Err(e) => {
                tracing::warn!(error = %e, "no anchors resolved");
                let (_tx, rx) = mpsc::channel(1);
                return Ok(rx);
            }
        };

        let (tx, rx) = mpsc::channel(ids.len());
        let states: Arc<Mutex<HashMap<AnchorId, ResolveState>>> = Arc::new(Mutex::new(
            ids.iter().map(|id| (*id, ResolveState::Requested)).collect(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        for handle in handles {
            let id = handle.id();
            {
                let mut states = states.lock().await;
                match states.get(&id) {
                    None => {
                        states.insert(id, ResolveState::Requested);
                    }
                    Some(ResolveState::Requested) => {}
                    Some(state) => {
                        // 同一标识至多产出一条记录
                        tracing::debug!(%id, ?state, "duplicate handle ignored");
                        continue;
                    }
                }
            }

            if handle.localized() {
                states.lock().await.insert(id, ResolveState::Localized);
                self.bind(id, handle.as_ref(), &tx).await;
                states.lock().await.insert(id, ResolveState::Bound);
            } else if !handle.localizing() {
                states.lock().await.insert(id, ResolveState::Localizing);
                let loader = self.clone();
                let states = states.clone();
                let tx = tx.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore closed");
                    match handle.localize().await {
                        Ok(()) => {
                            loader.bind(id, handle.as_ref(), &tx).await;
                            states.lock().await.insert(id, ResolveState::Bound);
                        }
                        Err(e) => {
                            states.lock().await.insert(id, ResolveState::Failed);
                            tracing::warn!(%id, error = %e, "failed to localize anchor");
                            let _ = loader.events.send(AnchorEvent::LocalizationFailed { id });
                            // 标识留在注册表中，下次会话仍是解析候选
                        }
                    }
                });
            } else {
                // 子系统侧已有在途重定位：不重复发起
                states.lock().await.insert(id, ResolveState::Localizing);
                tracing::debug!(%id, "localization already in flight, leaving handle alone");
            }
        }

        Ok(rx)
    }

    /// 绑定：按解析位姿落成活动记录，交给协作方
    async fn bind(
        &self,
        id: AnchorId,
        handle: &dyn UnboundAnchor,
        tx: &mpsc::Sender<AnchorRecord>,
    ) {
        let Some(pose) = handle.pose() else {
            tracing::warn!(%id, "localized handle reported no pose");
            return;
        };
        let record = AnchorRecord::bound(id, pose);
        self.anchors.insert(record.clone()).await;
        let _ = tx.send(record).await;
        let _ = self.events.send(AnchorEvent::Bound { id, pose });
        tracing::info!(%id, "anchor bound");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Pose;
    use crate::registry::SqliteRegistry;
    use crate::tracking::{MockTracking, ResolveBehavior};

    struct Fixture {
        tracking: Arc<MockTracking>,
        registry: Arc<Registry>,
        anchors: Arc<AnchorSet>,
        events: broadcast::Sender<AnchorEvent>,
        loader: AnchorLoader,
    }

    fn fixture() -> Fixture {
        let tracking = Arc::new(MockTracking::new());
        let registry = Arc::new(Registry::new(SqliteRegistry::in_memory().unwrap()));
        let anchors = Arc::new(AnchorSet::new());
        let (events, _) = broadcast::channel(32);
        let loader = AnchorLoader::new(
            tracking.clone(),
            registry.clone(),
            anchors.clone(),
            events.clone(),
            8,
        );
        Fixture {
            tracking,
            registry,
            anchors,
            events,
            loader,
        }
    }

    async fn saved_anchor(f: &Fixture) -> AnchorId {
        let id = f.tracking.create_anchor(Pose::default()).await.unwrap();
        f.registry.append(&id).await.unwrap();
        id
    }

    async fn drain(mut rx: mpsc::Receiver<AnchorRecord>) -> Vec<AnchorId> {
        let mut bound = Vec::new();
        while let Some(record) = rx.recv().await {
            bound.push(record.id.unwrap());
        }
        bound
    }

    #[tokio::test]
    async fn test_empty_registry_yields_empty_stream() {
        let f = fixture();
        let rx = f.loader.load_and_bind().await.unwrap();
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_batch_binds_in_completion_order() {
        let f = fixture();
        let a = saved_anchor(&f).await;
        let b = saved_anchor(&f).await;
        let c = saved_anchor(&f).await;
        f.tracking.script_resolve(a, ResolveBehavior::Localized);
        f.tracking.script_resolve(b, ResolveBehavior::LocalizeOk);
        f.tracking.script_resolve(c, ResolveBehavior::LocalizeFail);
        let mut event_rx = f.events.subscribe();

        let rx = f.loader.load_and_bind().await.unwrap();
        let bound = drain(rx).await;

        // 已重定位的 A 立即绑定；B 在其延续完成后绑定；C 永不出现
        assert_eq!(bound, vec![a, b]);
        // 失败不剪除注册表
        assert_eq!(f.registry.read_all().await.unwrap(), vec![a, b, c]);
        // C 以事件形式上报失败
        let mut saw_failure = false;
        while let Ok(event) = event_rx.try_recv() {
            if let AnchorEvent::LocalizationFailed { id } = event {
                assert_eq!(id, c);
                saw_failure = true;
            }
        }
        assert!(saw_failure);
        // A 不需要重定位调用，B/C 各恰好一次
        assert_eq!(f.tracking.localize_calls(a), 0);
        assert_eq!(f.tracking.localize_calls(b), 1);
        assert_eq!(f.tracking.localize_calls(c), 1);
    }

    #[tokio::test]
    async fn test_bound_records_join_working_set_with_resolved_pose() {
        let f = fixture();
        let pose = Pose {
            position: crate::anchor::Vec3::new(0.5, 1.5, -2.0),
            ..Pose::default()
        };
        let id = f.tracking.create_anchor(pose).await.unwrap();
        f.registry.append(&id).await.unwrap();

        let rx = f.loader.load_and_bind().await.unwrap();
        assert_eq!(drain(rx).await, vec![id]);

        let record = f.anchors.get(id).await.unwrap();
        assert_eq!(record.pose, pose);
        assert!(record.durable);
        assert_eq!(record.status, crate::anchor::AnchorStatus::Localized);
    }

    #[tokio::test]
    async fn test_in_flight_localization_is_left_alone() {
        let f = fixture();
        let id = saved_anchor(&f).await;
        f.tracking
            .script_resolve(id, ResolveBehavior::AlreadyLocalizing);

        let rx = f.loader.load_and_bind().await.unwrap();

        // 本层不重复发起，也不产出记录
        assert!(drain(rx).await.is_empty());
        assert_eq!(f.tracking.localize_calls(id), 0);
    }

    #[tokio::test]
    async fn test_resolve_failure_is_not_an_error() {
        let f = fixture();
        saved_anchor(&f).await;
        f.tracking.fail_resolve();

        let rx = f.loader.load_and_bind().await.unwrap();
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_identifier_binds_twice() {
        let f = fixture();
        let mut ids = Vec::new();
        for _ in 0..6 {
            let id = saved_anchor(&f).await;
            f.tracking.script_resolve(id, ResolveBehavior::LocalizeOk);
            ids.push(id);
        }

        let rx = f.loader.load_and_bind().await.unwrap();
        let mut bound = drain(rx).await;
        bound.sort_by_key(|id| id.to_string());

        let mut expected = ids.clone();
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(bound, expected);
        for id in ids {
            assert_eq!(f.tracking.localize_calls(id), 1);
        }
    }
}
