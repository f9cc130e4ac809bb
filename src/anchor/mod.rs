//! 锚点实体模型：标识、位姿、生命周期状态与记录
//!
//! AnchorId 由追踪子系统在创建确认时分配，之后不可变；AnchorRecord 是内存中的
//! 实体表示，durable 镜像标识是否已写入注册表。

pub mod set;

pub use set::AnchorSet;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 锚点标识：128 位，跨会话全局唯一，规范文本形式即 UUID 字符串
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct AnchorId(Uuid);

impl AnchorId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// 从规范文本形式解析（注册表落盘内容回读用）
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 世界坐标系中的位置
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// 朝向四元数
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    /// 单位四元数（无旋转）
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// 位姿：创建时捕获，重定位成功后以解析结果为准
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

/// 锚点生命周期状态，只能前进不能回退（擦除不是状态，而是将记录移出工作集）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AnchorStatus {
    /// 已发起创建，等待子系统确认（此时尚无标识）
    Pending,
    /// 子系统确认创建，标识已分配
    Created,
    /// 重载路径：重定位进行中
    Localizing,
    /// 重载路径：重定位完成，位姿可用
    Localized,
    /// 重载路径：重定位失败（本会话内终态）
    LocalizationFailed,
}

impl AnchorStatus {
    /// 状态序，用于单调前进检查；Localized 与 LocalizationFailed 是并列终态
    pub fn rank(&self) -> u8 {
        match self {
            AnchorStatus::Pending => 0,
            AnchorStatus::Created => 1,
            AnchorStatus::Localizing => 2,
            AnchorStatus::Localized => 3,
            AnchorStatus::LocalizationFailed => 3,
        }
    }
}

/// 内存中的锚点实体
#[derive(Clone, Debug)]
pub struct AnchorRecord {
    /// 创建确认后分配；Pending 阶段为 None
    pub id: Option<AnchorId>,
    pub pose: Pose,
    pub status: AnchorStatus,
    /// 标识当前是否已写入注册表（durable = true 当且仅当 append 成功）
    pub durable: bool,
    pub created_at: DateTime<Utc>,
}

impl AnchorRecord {
    /// 创建确认前的记录：无标识，Pending
    pub fn pending(pose: Pose) -> Self {
        Self {
            id: None,
            pose,
            status: AnchorStatus::Pending,
            durable: false,
            created_at: Utc::now(),
        }
    }

    /// 创建确认后的记录：标识已分配，Created
    pub fn confirmed(id: AnchorId, pose: Pose) -> Self {
        Self {
            id: Some(id),
            pose,
            status: AnchorStatus::Created,
            durable: false,
            created_at: Utc::now(),
        }
    }

    /// 重载路径绑定出的记录：位姿来自重定位结果，标识仍在注册表中
    pub fn bound(id: AnchorId, pose: Pose) -> Self {
        Self {
            id: Some(id),
            pose,
            status: AnchorStatus::Localized,
            durable: true,
            created_at: Utc::now(),
        }
    }

    /// 是否满足持久化前置条件：有标识，且状态为 Created 或 Localized
    pub fn persistable(&self) -> bool {
        self.id.is_some()
            && matches!(
                self.status,
                AnchorStatus::Created | AnchorStatus::Localized
            )
    }
}
