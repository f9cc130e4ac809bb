//! 状态投影：渲染/UI 协作方看到的轻量视图
//!
//! 协作方只消费 watch 通道里的 UiState 快照；uuid 文本与保存状态文本即
//! 锚点画布上的两行显示内容。

use serde::Serialize;

use crate::anchor::{AnchorId, AnchorStatus};

/// 渲染协作方可直接显示的投影状态
#[derive(Clone, Debug, Default, Serialize)]
pub struct UiState {
    pub anchors: Vec<AnchorSummary>,
    /// 最近操作对象的标识文本（"Uuid: ..."）
    pub last_uuid_text: Option<String>,
    /// 最近操作对象的持久化状态文本（"Saved" / "Not saved" / "Loaded from Device"）
    pub last_saved_text: Option<String>,
    pub error_message: Option<String>,
}

/// 单个锚点的显示摘要
#[derive(Clone, Debug, Serialize)]
pub struct AnchorSummary {
    pub id: AnchorId,
    pub status: AnchorStatus,
    pub durable: bool,
}
