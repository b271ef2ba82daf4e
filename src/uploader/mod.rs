// 上传模块
//
// - task: 任务与源文件模型
// - queue: 任务队列，按索引合并执行器上报的更新
// - pool: 固定数量 worker 共享游标领取任务
// - engine / strategy: 单个文件的传输（中转 / 预签名直传）
// - pipeline: 一个批次的完整流程，batch: 结果汇总
// - folder: 本地照片扫描

pub mod batch;
pub mod engine;
pub mod folder;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod strategy;
pub mod task;

pub use batch::BatchResult;
pub use engine::{UploadEngine, DEFAULT_MAX_RETRIES};
pub use folder::{format_bytes, FolderScanner, ScanOptions, ScannedFile};
pub use pipeline::UploadPipeline;
pub use pool::{IndexProcessor, PoolOutcome, WorkerPool, DEFAULT_CONCURRENCY_LIMIT};
pub use progress::{calculate_percent, ProgressReporter, ProgressSink};
pub use queue::{TaskUpdate, UploadQueue};
pub use strategy::{build_strategy, CompositeTransfer, DirectTransfer, TransferStrategy, TransferTarget};
pub use task::{guess_mime_type, FileContent, SourceFile, TaskPatch, UploadTask, UploadTaskStatus};
