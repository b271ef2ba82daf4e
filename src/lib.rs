// Event Photo Uploader
// 活动照片批量上传核心库

// 后端接口模块
pub mod api;

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 任务事件
pub mod events;

// 日志系统
pub mod logging;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use api::{ApiClient, StorageClient};
pub use config::{AppConfig, StrategyKind};
pub use error::{TransferError, UploadError, UploadErrorKind};
pub use events::{EventChannelObserver, TaskObserver, UploadEvent};
pub use uploader::{
    build_strategy, BatchResult, FolderScanner, SourceFile, UploadPipeline, UploadQueue,
    UploadTask, UploadTaskStatus,
};
