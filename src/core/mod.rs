//! 核心层：错误分类、状态投影、命令主循环

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::AnchorError;
pub use orchestrator::{create_manager, Command};
pub use state::{AnchorSummary, UiState};
