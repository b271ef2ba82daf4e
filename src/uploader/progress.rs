// 进度上报
//
// 传输层只上报字节数，由 ProgressReporter 换算成百分比并发送 TaskUpdate

use crate::uploader::{TaskPatch, TaskUpdate};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// 字节进度回调
pub trait ProgressSink: Send + Sync {
    /// `sent` 已发送字节数，`total` 总字节数（未知时为 0）
    fn report(&self, sent: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn report(&self, sent: u64, total: u64) {
        self(sent, total)
    }
}

/// 计算进度百分比（四舍五入）
///
/// 总大小未知（0）时返回 0
pub fn calculate_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let sent = sent.min(total) as u128;
    let total = total as u128;
    ((sent * 100 + total / 2) / total) as u8
}

/// 单个任务的状态上报器
///
/// 上传中的进度最高只到 99，100 只随成功状态一起发送
#[derive(Debug)]
pub struct ProgressReporter {
    index: usize,
    updates: mpsc::UnboundedSender<TaskUpdate>,
    last_percent: AtomicU8,
}

impl ProgressReporter {
    pub fn new(index: usize, updates: mpsc::UnboundedSender<TaskUpdate>) -> Self {
        Self {
            index,
            updates,
            last_percent: AtomicU8::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 当前已上报的进度
    pub fn last_percent(&self) -> u8 {
        self.last_percent.load(Ordering::SeqCst)
    }

    /// 开始上传
    pub fn start(&self) {
        self.last_percent.store(0, Ordering::SeqCst);
        self.send(TaskPatch::started());
    }

    /// 上传成功
    pub fn succeed(&self, result_id: String) {
        self.last_percent.store(100, Ordering::SeqCst);
        self.send(TaskPatch::succeeded(result_id));
    }

    /// 上传失败，进度保持不变
    pub fn fail(&self, error: String) {
        self.send(TaskPatch::failed(error));
    }

    fn send(&self, patch: TaskPatch) {
        let update = TaskUpdate {
            index: self.index,
            patch,
        };
        if self.updates.send(update).is_err() {
            debug!("任务更新通道已关闭: index={}", self.index);
        }
    }
}

impl ProgressSink for ProgressReporter {
    fn report(&self, sent: u64, total: u64) {
        let percent = calculate_percent(sent, total).min(99);
        // 只在进度增长时发送（重试时字节数会从 0 重新开始）
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.send(TaskPatch::progress(percent));
        }
    }
}
