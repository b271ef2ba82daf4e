// 有界并发工作池
//
// 调度方式：
// - 所有 worker 共享一个原子游标，fetch_add 领取下一个索引
// - 启动 min(并发上限, 索引数) 个 worker，由 JoinSet 统一等待
// - 每个 worker 处理完当前索引后才领取下一个，同时在途数量不超过并发上限
// - 单个索引的 panic 在 worker 内捕获，转成该任务的失败，不影响其他 worker

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 默认并发上限
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;

/// 单个索引的处理逻辑
#[async_trait]
pub trait IndexProcessor: Send + Sync + 'static {
    /// 处理一个索引，结果由实现者自行记录
    async fn process(&self, index: usize);

    /// `process` 发生 panic 时调用
    fn on_panic(&self, index: usize, message: String);
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOutcome {
    /// 被领取的索引数量（输入序列的前缀长度）
    pub claimed: usize,
    /// 运行期间是否收到取消（未领取的索引被跳过，或在途任务被中断）
    pub cancelled: bool,
}

/// 有界并发工作池
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency_limit: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY_LIMIT)
    }
}

impl WorkerPool {
    /// 并发上限最小为 1
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// 处理所有索引，全部 worker 退出后返回
    ///
    /// 取消后 worker 不再领取新索引，已领取的索引照常交给 processor
    pub async fn run<P>(
        &self,
        indices: Vec<usize>,
        processor: Arc<P>,
        cancel: CancellationToken,
    ) -> PoolOutcome
    where
        P: IndexProcessor,
    {
        let total = indices.len();
        if total == 0 {
            debug!("没有需要处理的任务");
            return PoolOutcome {
                claimed: 0,
                cancelled: false,
            };
        }

        let worker_count = self.concurrency_limit.min(total);
        info!("[工作池] 启动 {} 个 worker，共 {} 个任务", worker_count, total);

        let indices = Arc::new(indices);
        let cursor = Arc::new(AtomicUsize::new(0));
        let mut join_set = JoinSet::new();

        for worker_id in 0..worker_count {
            let indices = indices.clone();
            let cursor = cursor.clone();
            let processor = processor.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let mut processed = 0usize;
                loop {
                    if cancel.is_cancelled() {
                        debug!("[worker#{}] 已取消，停止领取任务", worker_id);
                        break;
                    }

                    let position = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(&index) = indices.get(position) else {
                        break;
                    };

                    let result = AssertUnwindSafe(processor.process(index))
                        .catch_unwind()
                        .await;
                    if let Err(panic) = result {
                        let message = panic_message(panic.as_ref());
                        error!("[worker#{}] 任务 #{} 异常: {}", worker_id, index, message);
                        processor.on_panic(index, message);
                    }
                    processed += 1;
                }
                debug!("[worker#{}] 退出，共处理 {} 个任务", worker_id, processed);
                processed
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!("[工作池] worker 异常退出: {}", e);
            }
        }

        let claimed = cursor.load(Ordering::SeqCst).min(total);
        let cancelled = claimed < total || cancel.is_cancelled();
        if cancelled {
            info!("[工作池] 已取消，{}/{} 个任务被领取", claimed, total);
        }

        PoolOutcome { claimed, cancelled }
    }
}

/// 提取 panic 信息
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知异常".to_string()
    }
}
