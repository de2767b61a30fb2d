// 导出模块
pub mod aggregate;
pub mod common;
pub mod feed;
pub mod scheduler;
pub mod storage;

// Re-export error types
pub use common::error::{AppError, Result};
pub use scheduler::{SchedulerSettings, SchedulerState, SyncScheduler};
