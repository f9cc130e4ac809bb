//! 创建服务：位姿捕获 → 子系统确认 → 工作集登记
//!
//! 确认前记录无标识、状态 Pending；等待是挂起而非轮询，期间其他生命周期
//! 操作照常进行。默认不设超时，可选的有界确认超时按配置开启。

use std::sync::Arc;
use std::time::Duration;

use crate::anchor::{AnchorRecord, AnchorSet, Pose};
use crate::core::AnchorError;
use crate::tracking::TrackingSubsystem;

pub struct CreationService {
    tracking: Arc<dyn TrackingSubsystem>,
    anchors: Arc<AnchorSet>,
    /// None = 跟随子系统默认（不设上界）
    creation_timeout: Option<Duration>,
}

impl CreationService {
    pub fn new(tracking: Arc<dyn TrackingSubsystem>, anchors: Arc<AnchorSet>) -> Self {
        Self {
            tracking,
            anchors,
            creation_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.creation_timeout = Some(timeout);
        self
    }

    /// 捕获位姿并创建锚点；成功时记录已入工作集且成为「最近创建」
    pub async fn create_anchor(&self, pose: Pose) -> Result<AnchorRecord, AnchorError> {
        let provisional = AnchorRecord::pending(pose);
        tracing::debug!(status = ?provisional.status, "anchor creation requested");

        let confirmation = self.tracking.create_anchor(pose);
        let confirmed = match self.creation_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, confirmation).await {
                Ok(result) => result,
                Err(_) => return Err(AnchorError::CreationTimeout(timeout)),
            },
            None => confirmation.await,
        };

        let id = confirmed.map_err(AnchorError::CreationFailed)?;

        let mut record = provisional;
        record.id = Some(id);
        record.status = crate::anchor::AnchorStatus::Created;

        self.anchors.insert(record.clone()).await;
        self.anchors.mark_last_created(id).await;
        tracing::info!(%id, "anchor created");
        Ok(record)
    }
}
