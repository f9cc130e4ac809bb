//! 生命周期服务：创建、持久化、重载三条路径
//!
//! 创建服务产出锚点实体 → 持久化服务在注册表中记录/擦除其标识 →
//! 重载协调器在下次会话读回注册表、解析并重新绑定。

pub mod creation;
pub mod loader;
pub mod saving;

pub use creation::CreationService;
pub use loader::{AnchorLoader, ResolveState};
pub use saving::{BulkUnsaveOutcome, PersistenceService};

use crate::anchor::{AnchorId, Pose};

/// 推送给渲染/UI 协作方的生命周期事件；核心从不等待协作方响应
#[derive(Clone, Debug)]
pub enum AnchorEvent {
    Created { id: AnchorId },
    Saved { id: AnchorId },
    SaveFailed { id: AnchorId },
    Erased { id: AnchorId },
    EraseFailed { id: AnchorId },
    Bound { id: AnchorId, pose: Pose },
    LocalizationFailed { id: AnchorId },
}
