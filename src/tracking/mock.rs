//! 可编排的追踪子系统 Mock
//!
//! 无真实 XR 运行时的环境与测试都用它：默认全部成功，按标识可脚本化
//! 保存/擦除失败与解析行为，并统计各类调用次数。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::anchor::{AnchorId, Pose};
use crate::tracking::{TrackingError, TrackingSubsystem, UnboundAnchor};

/// 解析出的句柄在 Mock 中的行为脚本
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveBehavior {
    /// 解析返回时已完成重定位
    Localized,
    /// 需要异步重定位，且会成功
    LocalizeOk,
    /// 需要异步重定位，且会失败
    LocalizeFail,
    /// 子系统侧已有在途重定位，句柄应被跳过
    AlreadyLocalizing,
}

#[derive(Default)]
struct MockState {
    fail_creation: bool,
    fail_resolve: bool,
    fail_save: HashSet<AnchorId>,
    fail_erase: HashSet<AnchorId>,
    resolve: HashMap<AnchorId, ResolveBehavior>,
    poses: HashMap<AnchorId, Pose>,
    save_calls: usize,
    erase_calls: usize,
    localize_calls: HashMap<AnchorId, usize>,
}

/// Mock 子系统；clone 共享同一份脚本与统计
#[derive(Clone)]
pub struct MockTracking {
    state: Arc<Mutex<MockState>>,
    latency: Duration,
}

impl Default for MockTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTracking {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            latency: Duration::from_millis(1),
        }
    }

    /// 每次异步确认前模拟的延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock poisoned")
    }

    pub fn fail_creation(&self) {
        self.state().fail_creation = true;
    }

    pub fn fail_resolve(&self) {
        self.state().fail_resolve = true;
    }

    pub fn fail_save(&self, id: AnchorId) {
        self.state().fail_save.insert(id);
    }

    pub fn fail_erase(&self, id: AnchorId) {
        self.state().fail_erase.insert(id);
    }

    /// 脚本化某个标识的解析行为；未脚本化的标识默认 Localized
    pub fn script_resolve(&self, id: AnchorId, behavior: ResolveBehavior) {
        self.state().resolve.insert(id, behavior);
    }

    pub fn save_calls(&self) -> usize {
        self.state().save_calls
    }

    pub fn erase_calls(&self) -> usize {
        self.state().erase_calls
    }

    pub fn localize_calls(&self, id: AnchorId) -> usize {
        self.state().localize_calls.get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TrackingSubsystem for MockTracking {
    async fn create_anchor(&self, pose: Pose) -> Result<AnchorId, TrackingError> {
        tokio::time::sleep(self.latency).await;
        if self.state().fail_creation {
            return Err(TrackingError::CreateRejected("scripted".to_string()));
        }
        let id = AnchorId::new(uuid::Uuid::new_v4());
        // 记住创建位姿，后续解析按它还原
        self.state().poses.insert(id, pose);
        Ok(id)
    }

    async fn save(&self, id: AnchorId) -> Result<(), TrackingError> {
        tokio::time::sleep(self.latency).await;
        let mut state = self.state();
        state.save_calls += 1;
        if state.fail_save.contains(&id) {
            return Err(TrackingError::SaveRejected);
        }
        Ok(())
    }

    async fn erase(&self, id: AnchorId) -> Result<(), TrackingError> {
        tokio::time::sleep(self.latency).await;
        let mut state = self.state();
        state.erase_calls += 1;
        if state.fail_erase.contains(&id) {
            return Err(TrackingError::EraseRejected);
        }
        Ok(())
    }

    async fn resolve_unbound(
        &self,
        ids: &[AnchorId],
    ) -> Result<Vec<Arc<dyn UnboundAnchor>>, TrackingError> {
        tokio::time::sleep(self.latency).await;
        let state = self.state();
        if state.fail_resolve {
            return Err(TrackingError::ResolveFailed("scripted".to_string()));
        }
        let handles = ids
            .iter()
            .map(|id| {
                let behavior = state
                    .resolve
                    .get(id)
                    .copied()
                    .unwrap_or(ResolveBehavior::Localized);
                let pose = state.poses.get(id).copied().unwrap_or_default();
                Arc::new(MockUnboundAnchor {
                    id: *id,
                    behavior,
                    pose,
                    latency: self.latency,
                    now_localized: AtomicBool::new(matches!(
                        behavior,
                        ResolveBehavior::Localized
                    )),
                    shared: self.state.clone(),
                }) as Arc<dyn UnboundAnchor>
            })
            .collect();
        Ok(handles)
    }
}

struct MockUnboundAnchor {
    id: AnchorId,
    behavior: ResolveBehavior,
    pose: Pose,
    latency: Duration,
    now_localized: AtomicBool,
    shared: Arc<Mutex<MockState>>,
}

#[async_trait]
impl UnboundAnchor for MockUnboundAnchor {
    fn id(&self) -> AnchorId {
        self.id
    }

    fn localized(&self) -> bool {
        self.now_localized.load(Ordering::SeqCst)
    }

    fn localizing(&self) -> bool {
        self.behavior == ResolveBehavior::AlreadyLocalizing && !self.localized()
    }

    async fn localize(&self) -> Result<(), TrackingError> {
        {
            let mut state = self.shared.lock().expect("mock state lock poisoned");
            *state.localize_calls.entry(self.id).or_insert(0) += 1;
        }
        tokio::time::sleep(self.latency).await;
        match self.behavior {
            ResolveBehavior::LocalizeFail => Err(TrackingError::LocalizeFailed),
            ResolveBehavior::AlreadyLocalizing => Err(TrackingError::LocalizeFailed),
            _ => {
                self.now_localized.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn pose(&self) -> Option<Pose> {
        if self.localized() {
            Some(self.pose)
        } else {
            None
        }
    }
}
