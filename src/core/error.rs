//! 锚点生命周期错误分类
//!
//! 逐记录/逐标识的失败彼此隔离、单独上报；批量操作（UnsaveAll、LoadAndBind）
//! 尽力而为，单项失败后继续处理其余项。没有任何失败是进程级致命的。

use thiserror::Error;

use crate::anchor::AnchorId;
use crate::registry::RegistryError;
use crate::tracking::TrackingError;

#[derive(Error, Debug)]
pub enum AnchorError {
    /// 子系统确认创建失败
    #[error("anchor creation failed: {0}")]
    CreationFailed(TrackingError),

    /// 配置了有界超时且确认未在限内到达
    #[error("anchor creation timed out after {0:?}")]
    CreationTimeout(std::time::Duration),

    /// 子系统拒绝保存；注册表保持原状，记录保持非持久
    #[error("save rejected by tracking subsystem for {0}")]
    SaveFailed(AnchorId),

    /// 子系统拒绝擦除；记录保持持久，调用方可重试或呈现给用户
    #[error("erase rejected by tracking subsystem for {0}")]
    EraseFailed(AnchorId),

    /// 底层存储不可用；内存状态已按实际落盘内容对账
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 重载路径中单个标识的终态失败
    #[error("localization failed for {0}")]
    LocalizationFailed(AnchorId),

    /// 工作集中没有这个标识
    #[error("unknown anchor: {0}")]
    UnknownAnchor(AnchorId),

    /// 持久化前置条件不满足（无标识或状态不对）
    #[error("anchor {0} is not in a persistable state")]
    NotPersistable(AnchorId),

    /// 本会话尚未创建任何锚点，SaveLast/UnsaveLast 无目标
    #[error("no anchor has been created in this session")]
    NoLastAnchor,
}
