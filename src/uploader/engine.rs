// 上传引擎
//
// 负责单个文件的完整传输过程：
// 1. 标记上传中（进度归零、清除错误）
// 2. 调用传输策略，进度通过 ProgressReporter 上报
// 3. 可重试错误按指数退避重试
// 4. 超时或取消时强制失败
// 5. 上报成功（进度 100 + 标识）或失败（保留进度 + 错误信息）

use crate::error::{TransferError, UploadErrorKind};
use crate::uploader::{ProgressReporter, ProgressSink, SourceFile, TransferStrategy, TransferTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// =====================================================
// 重试配置
// =====================================================

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// 初始退避延迟（毫秒）
const INITIAL_BACKOFF_MS: u64 = 100;

/// 最大退避延迟（毫秒）
const MAX_BACKOFF_MS: u64 = 5000;

/// 限流时的额外等待时间（毫秒）
const RATE_LIMIT_BACKOFF_MS: u64 = 10000;

/// 计算指数退避延迟
///
/// # 延迟序列
/// - retry_count=0: 100ms
/// - retry_count=1: 200ms
/// - retry_count=2: 400ms
/// - 最大: 5000ms
fn calculate_backoff_delay(retry_count: u32, error_kind: &UploadErrorKind) -> u64 {
    let base_delay = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay = base_delay.min(MAX_BACKOFF_MS);

    // 限流时使用更长的等待时间
    if matches!(error_kind, UploadErrorKind::RateLimited) {
        delay.max(RATE_LIMIT_BACKOFF_MS)
    } else {
        delay
    }
}

// =====================================================
// 上传引擎
// =====================================================

/// 上传引擎
#[derive(Clone)]
pub struct UploadEngine {
    /// 传输策略
    strategy: Arc<dyn TransferStrategy>,
    /// 单个文件超时（包含重试）
    task_timeout: Option<Duration>,
    /// 最大重试次数
    max_retries: u32,
}

impl UploadEngine {
    /// 创建新的上传引擎（使用默认重试次数，不限时）
    pub fn new(strategy: Arc<dyn TransferStrategy>) -> Self {
        Self::with_options(strategy, None, DEFAULT_MAX_RETRIES)
    }

    pub fn with_options(
        strategy: Arc<dyn TransferStrategy>,
        task_timeout: Option<Duration>,
        max_retries: u32,
    ) -> Self {
        Self {
            strategy,
            task_timeout,
            max_retries,
        }
    }

    pub fn strategy(&self) -> &Arc<dyn TransferStrategy> {
        &self.strategy
    }

    /// 处理一个任务
    ///
    /// 所有结果都以任务状态的形式上报，不会返回错误
    pub async fn process(
        &self,
        file: &SourceFile,
        target: &TransferTarget,
        reporter: Arc<ProgressReporter>,
        cancel: &CancellationToken,
    ) {
        let index = reporter.index();
        info!(
            "[任务#{}] 开始上传: {} ({} bytes, {})",
            index,
            file.name,
            file.size,
            self.strategy.name()
        );
        reporter.start();

        let transfer = self.transfer_with_retry(file, target, reporter.clone(), cancel);
        let result = match self.task_timeout {
            Some(limit) => tokio::time::timeout(limit, transfer)
                .await
                .unwrap_or_else(|_| Err(TransferError::timeout(limit))),
            None => transfer.await,
        };

        match result {
            Ok(result_id) => {
                info!("[任务#{}] ✓ 上传成功: {} -> {}", index, file.name, result_id);
                reporter.succeed(result_id);
            }
            Err(e) => {
                error!(
                    "[任务#{}] 上传失败: {} ({:?}, 进度 {}%): {}",
                    index,
                    file.name,
                    e.kind,
                    reporter.last_percent(),
                    e
                );
                reporter.fail(e.message);
            }
        }
    }

    /// 传输（带重试）
    async fn transfer_with_retry(
        &self,
        file: &SourceFile,
        target: &TransferTarget,
        reporter: Arc<ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<String, TransferError> {
        let mut retry = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(TransferError::cancelled());
            }

            let progress: Arc<dyn ProgressSink> = reporter.clone();
            let attempt = tokio::select! {
                _ = cancel.cancelled() => Err(TransferError::cancelled()),
                result = self.strategy.transfer(file, target, progress) => result,
            };

            let err = match attempt {
                Ok(result_id) => return Ok(result_id),
                Err(e) => e,
            };

            // 不可重试的错误立即失败
            if !err.kind.is_retriable() || retry >= self.max_retries {
                return Err(err);
            }

            let backoff_ms = calculate_backoff_delay(retry, &err.kind);
            warn!(
                "[任务#{}] 上传失败，等待 {}ms 后重试 ({}/{}): {}",
                reporter.index(),
                backoff_ms,
                retry + 1,
                self.max_retries,
                err
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::cancelled()),
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
            }
            retry += 1;
        }
    }
}
