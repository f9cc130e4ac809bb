//! Tether - 空间锚点生命周期系统
//!
//! 管理持久空间锚点的三个易错阶段：创建（位姿捕获 + 临时登记）、持久化
//! （标识的持久保存/擦除）、重载（下次会话的批量异步重定位与重绑定）。
//!
//! 模块划分：
//! - **anchor**: 锚点实体模型与按标识键控的活动工作集
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、UiState 投影、命令主循环
//! - **lifecycle**: 创建 / 持久化 / 重载三个生命周期服务
//! - **registry**: 标识注册表（SQLite / JSON 文件后端）
//! - **tracking**: 追踪子系统接口与可编排 Mock
//! - **observability**: tracing 初始化

pub mod anchor;
pub mod config;
pub mod core;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod tracking;

pub use anchor::{AnchorId, AnchorRecord, AnchorSet, AnchorStatus, Pose, Quat, Vec3};
pub use config::{load_config, AppConfig};
pub use core::{create_manager, AnchorError, Command, UiState};
pub use lifecycle::{
    AnchorEvent, AnchorLoader, BulkUnsaveOutcome, CreationService, PersistenceService,
};
pub use registry::{open_registry, FileRegistry, Registry, RegistryError, RegistryStore, SqliteRegistry};
pub use tracking::{MockTracking, ResolveBehavior, TrackingError, TrackingSubsystem, UnboundAnchor};
