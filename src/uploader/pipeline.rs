// 批量上传流程
//
// 一次批次：
// 1. 选出等待中和失败的任务（批次开始后新加入的任务不参与）
// 2. 由传输策略准备目标（直传需要申请上传地址，失败则整批中止）
// 3. 工作池并发执行，执行器通过通道发送 TaskUpdate
// 4. 当前任务按顺序把更新合并到队列，直到所有 worker 退出
// 5. 汇总为 BatchResult

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::uploader::{
    BatchResult, IndexProcessor, ProgressReporter, SourceFile, TaskPatch, TaskUpdate,
    TransferStrategy, TransferTarget, UploadEngine, UploadQueue, UploadTaskStatus, WorkerPool,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 一个待处理任务
struct Job {
    file: SourceFile,
    target: TransferTarget,
}

/// 批次内的索引处理器
struct BatchProcessor {
    engine: UploadEngine,
    jobs: HashMap<usize, Job>,
    updates: mpsc::UnboundedSender<TaskUpdate>,
    cancel: CancellationToken,
}

#[async_trait]
impl IndexProcessor for BatchProcessor {
    async fn process(&self, index: usize) {
        let Some(job) = self.jobs.get(&index) else {
            warn!("批次中没有任务 #{}", index);
            return;
        };
        let reporter = Arc::new(ProgressReporter::new(index, self.updates.clone()));
        self.engine
            .process(&job.file, &job.target, reporter, &self.cancel)
            .await;
    }

    fn on_panic(&self, index: usize, message: String) {
        let update = TaskUpdate {
            index,
            patch: TaskPatch::failed(format!("上传任务异常: {}", message)),
        };
        let _ = self.updates.send(update);
    }
}

/// 批量上传流程
#[derive(Clone)]
pub struct UploadPipeline {
    engine: UploadEngine,
    pool: WorkerPool,
}

impl UploadPipeline {
    /// 从配置创建
    pub fn new(strategy: Arc<dyn TransferStrategy>, config: &UploadConfig) -> Self {
        Self::with_options(
            strategy,
            config.concurrency_limit,
            config.task_timeout(),
            config.max_retries,
        )
    }

    pub fn with_options(
        strategy: Arc<dyn TransferStrategy>,
        concurrency_limit: usize,
        task_timeout: Option<Duration>,
        max_retries: u32,
    ) -> Self {
        Self {
            engine: UploadEngine::with_options(strategy, task_timeout, max_retries),
            pool: WorkerPool::new(concurrency_limit),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.pool.concurrency_limit()
    }

    /// 运行一个批次
    ///
    /// 只有准备阶段（申请上传地址）的失败会返回错误；
    /// 单个文件的失败体现在任务状态和 BatchResult 中
    pub async fn run_batch(
        &self,
        queue: &mut UploadQueue,
        cancel: CancellationToken,
    ) -> Result<BatchResult, UploadError> {
        let eligible = queue.select_pending_indices();
        if eligible.is_empty() {
            info!("没有待上传的任务");
            return Ok(BatchResult::default());
        }
        if cancel.is_cancelled() {
            // 已取消时不再申请上传地址
            return Ok(BatchResult {
                cancelled: true,
                ..Default::default()
            });
        }

        let files: Vec<SourceFile> = eligible
            .iter()
            .filter_map(|&i| queue.get(i).map(|t| t.source.clone()))
            .collect();

        info!(
            "开始批量上传: {} 个文件, 方式={}, 并发={}",
            files.len(),
            self.engine.strategy().name(),
            self.pool.concurrency_limit()
        );

        let targets = self.engine.strategy().prepare(&files).await?;
        if targets.len() != files.len() {
            return Err(UploadError::Acquisition(format!(
                "传输目标数量 {} 与文件数量 {} 不一致",
                targets.len(),
                files.len()
            )));
        }

        let jobs: HashMap<usize, Job> = eligible
            .iter()
            .copied()
            .zip(files.into_iter().zip(targets))
            .map(|(index, (file, target))| (index, Job { file, target }))
            .collect();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let processor = Arc::new(BatchProcessor {
            engine: self.engine.clone(),
            jobs,
            updates: tx,
            cancel: cancel.clone(),
        });

        // processor 持有唯一的发送端，工作池结束后释放，接收循环随之结束
        let run_pool = self.pool.run(eligible.clone(), processor, cancel);

        let mut completion_order = Vec::new();
        let apply_updates = async {
            while let Some(update) = rx.recv().await {
                let index = update.index;
                let succeeded = update.patch.status == Some(UploadTaskStatus::Success);
                if queue.apply_update(update) && succeeded {
                    completion_order.push(index);
                }
            }
        };

        let (outcome, ()) = tokio::join!(run_pool, apply_updates);

        let attempted = &eligible[..outcome.claimed];
        let result =
            BatchResult::aggregate(queue.tasks(), attempted, &completion_order, outcome.cancelled);

        info!(
            "批量上传结束: 成功 {}, 失败 {}, 未开始 {}",
            result.success_count,
            result.error_count,
            eligible.len() - outcome.claimed
        );

        Ok(result)
    }
}
