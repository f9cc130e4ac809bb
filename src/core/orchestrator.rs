//! 锚点管理编排器：主控循环
//!
//! 负责：装配注册表/追踪子系统/三个生命周期服务，建立 cmd/state/event 三通道，
//! 并在后台任务中消费用户命令（Create/SaveLast/UnsaveLast/UnsaveAll/Reload/Quit）。
//! 每条命令派生独立任务执行，创建、保存与重载可同时在途、互不阻塞。

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::anchor::{AnchorSet, Pose};
use crate::config::AppConfig;
use crate::core::state::{AnchorSummary, UiState};
use crate::core::AnchorError;
use crate::lifecycle::{
    AnchorEvent, AnchorLoader, CreationService, PersistenceService,
};
use crate::registry::Registry;
use crate::tracking::TrackingSubsystem;

/// 从前端（手柄按键、调试界面等）发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 以给定位姿创建新锚点
    Create(Pose),
    /// 保存最近创建的锚点
    SaveLast,
    /// 擦除最近创建锚点的持久性
    UnsaveLast,
    /// 擦除全部锚点并清空注册表
    UnsaveAll,
    /// 读回注册表并重新绑定已保存的锚点
    Reload,
    /// 退出主循环
    Quit,
}

struct ManagerInner {
    anchors: Arc<AnchorSet>,
    creation: CreationService,
    saving: PersistenceService,
    loader: AnchorLoader,
    event_tx: broadcast::Sender<AnchorEvent>,
    state_tx: watch::Sender<UiState>,
    shutdown: CancellationToken,
}

/// 创建锚点管理器：返回命令发送端、状态接收端、事件接收端；
/// 注册表与追踪子系统由调用方显式构造传入（启动时 open，不做隐式懒创建）。
pub async fn create_manager(
    cfg: &AppConfig,
    registry: Arc<Registry>,
    tracking: Arc<dyn TrackingSubsystem>,
) -> anyhow::Result<(
    mpsc::UnboundedSender<Command>,
    watch::Receiver<UiState>,
    broadcast::Receiver<AnchorEvent>,
)> {
    let anchors = Arc::new(AnchorSet::new());
    let (event_tx, event_rx) = broadcast::channel::<AnchorEvent>(32);
    let (state_tx, state_rx) = watch::channel(UiState::default());
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();

    let mut creation = CreationService::new(tracking.clone(), anchors.clone());
    if let Some(secs) = cfg.tracking.creation_timeout_secs {
        creation = creation.with_timeout(std::time::Duration::from_secs(secs));
    }
    let saving = PersistenceService::new(tracking.clone(), registry.clone(), anchors.clone());
    let loader = AnchorLoader::new(
        tracking,
        registry,
        anchors.clone(),
        event_tx.clone(),
        cfg.lifecycle.max_concurrent_localizations,
    );

    let inner = Arc::new(ManagerInner {
        anchors,
        creation,
        saving,
        loader,
        event_tx,
        state_tx,
        shutdown: CancellationToken::new(),
    });

    tokio::spawn({
        let inner = inner.clone();
        async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        match cmd {
                            Command::Create(pose) => {
                                let inner = inner.clone();
                                tokio::spawn(async move { inner.handle_create(pose).await });
                            }
                            Command::SaveLast => {
                                let inner = inner.clone();
                                tokio::spawn(async move { inner.handle_save_last().await });
                            }
                            Command::UnsaveLast => {
                                let inner = inner.clone();
                                tokio::spawn(async move { inner.handle_unsave_last().await });
                            }
                            Command::UnsaveAll => {
                                let inner = inner.clone();
                                tokio::spawn(async move { inner.handle_unsave_all().await });
                            }
                            Command::Reload => {
                                let inner = inner.clone();
                                tokio::spawn(async move { inner.handle_reload().await });
                            }
                            Command::Quit => {
                                inner.shutdown.cancel();
                                break;
                            }
                        }
                    }
                    else => break,  // cmd_tx 已关闭，退出循环
                }
            }
        }
    });

    Ok((cmd_tx, state_rx, event_rx))
}

impl ManagerInner {
    async fn handle_create(&self, pose: Pose) {
        match self.creation.create_anchor(pose).await {
            Ok(record) => {
                if let Some(id) = record.id {
                    let _ = self.event_tx.send(AnchorEvent::Created { id });
                    self.publish(
                        Some(format!("Uuid: {id}")),
                        Some("Not saved".to_string()),
                        None,
                    )
                    .await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "anchor creation failed");
                self.publish(None, None, Some(e.to_string())).await;
            }
        }
    }

    async fn handle_save_last(&self) {
        let Some(id) = self.anchors.last_created().await else {
            self.publish(None, None, Some(AnchorError::NoLastAnchor.to_string()))
                .await;
            return;
        };
        match self.saving.save(id).await {
            Ok(()) => {
                let _ = self.event_tx.send(AnchorEvent::Saved { id });
                self.publish(None, Some("Saved".to_string()), None).await;
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "save failed");
                let _ = self.event_tx.send(AnchorEvent::SaveFailed { id });
                self.publish(None, None, Some(e.to_string())).await;
            }
        }
    }

    async fn handle_unsave_last(&self) {
        let Some(id) = self.anchors.last_created().await else {
            self.publish(None, None, Some(AnchorError::NoLastAnchor.to_string()))
                .await;
            return;
        };
        match self.saving.unsave(id).await {
            Ok(()) => {
                let _ = self.event_tx.send(AnchorEvent::Erased { id });
                self.publish(None, Some("Not saved".to_string()), None).await;
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "unsave failed");
                let _ = self.event_tx.send(AnchorEvent::EraseFailed { id });
                self.publish(None, None, Some(e.to_string())).await;
            }
        }
    }

    async fn handle_unsave_all(&self) {
        match self.saving.unsave_all().await {
            Ok(outcome) => {
                for id in &outcome.erased {
                    let _ = self.event_tx.send(AnchorEvent::Erased { id: *id });
                }
                for (id, e) in &outcome.failures {
                    tracing::warn!(id = %id, error = %e, "erase failed during bulk unsave");
                    let _ = self.event_tx.send(AnchorEvent::EraseFailed { id: *id });
                }
                let error = if outcome.fully_succeeded() {
                    None
                } else {
                    Some(format!("{} anchors failed to erase", outcome.failures.len()))
                };
                self.publish(None, Some("Not saved".to_string()), error).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "bulk unsave failed");
                self.publish(None, None, Some(e.to_string())).await;
            }
        }
    }

    async fn handle_reload(&self) {
        match self.loader.load_and_bind().await {
            Ok(mut stream) => loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    record = stream.recv() => {
                        let Some(record) = record else { break };
                        if let Some(id) = record.id {
                            self.publish(
                                Some(format!("Uuid: {id}")),
                                Some("Loaded from Device".to_string()),
                                None,
                            )
                            .await;
                        }
                    }
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "reload failed");
                self.publish(None, None, Some(e.to_string())).await;
            }
        }
    }

    /// 重建并推送 UiState 快照；未提供的文本沿用上一次的值
    async fn publish(
        &self,
        last_uuid_text: Option<String>,
        last_saved_text: Option<String>,
        error_message: Option<String>,
    ) {
        let snapshot = self.anchors.snapshot().await;
        let anchors = snapshot
            .iter()
            .filter_map(|r| {
                r.id.map(|id| AnchorSummary {
                    id,
                    status: r.status,
                    durable: r.durable,
                })
            })
            .collect();
        let prev = self.state_tx.borrow().clone();
        let _ = self.state_tx.send(UiState {
            anchors,
            last_uuid_text: last_uuid_text.or(prev.last_uuid_text),
            last_saved_text: last_saved_text.or(prev.last_saved_text),
            error_message,
        });
    }
}
