//! 追踪子系统接口：创建 / 保存 / 擦除 / 批量解析 / 重定位
//!
//! 生命周期服务只依赖这里的 trait；真实 XR 运行时与 Mock 都在这个缝隙后面。
//! 所有确认都是异步完成（await 挂起，不阻塞其他生命周期操作）。

pub mod mock;

pub use mock::{MockTracking, ResolveBehavior};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::anchor::{AnchorId, Pose};

/// 子系统侧失败
#[derive(Error, Debug, Clone)]
pub enum TrackingError {
    #[error("create rejected: {0}")]
    CreateRejected(String),

    #[error("save rejected")]
    SaveRejected,

    #[error("erase rejected")]
    EraseRejected,

    #[error("resolve failed: {0}")]
    ResolveFailed(String),

    #[error("localize failed")]
    LocalizeFailed,
}

/// 追踪子系统：锚点的创建确认、持久化确认与批量解析
#[async_trait]
pub trait TrackingSubsystem: Send + Sync {
    /// 发起创建请求并等待确认；成功时返回子系统分配的标识
    async fn create_anchor(&self, pose: Pose) -> Result<AnchorId, TrackingError>;

    /// 持久保存确认
    async fn save(&self, id: AnchorId) -> Result<(), TrackingError>;

    /// 持久擦除确认
    async fn erase(&self, id: AnchorId) -> Result<(), TrackingError>;

    /// 对整批标识发起一次解析调用（单次调用，不是逐个），返回未绑定句柄
    async fn resolve_unbound(
        &self,
        ids: &[AnchorId],
    ) -> Result<Vec<Arc<dyn UnboundAnchor>>, TrackingError>;
}

/// 解析返回的未绑定句柄；同一句柄的重定位至多一次在途
#[async_trait]
pub trait UnboundAnchor: Send + Sync {
    fn id(&self) -> AnchorId;

    /// 是否已完成重定位（可直接绑定）
    fn localized(&self) -> bool;

    /// 是否已有进行中的重定位；为 true 时调用方不得再次发起
    fn localizing(&self) -> bool;

    /// 发起异步重定位并等待其完成
    async fn localize(&self) -> Result<(), TrackingError>;

    /// 重定位完成后的解析位姿
    fn pose(&self) -> Option<Pose>;
}
