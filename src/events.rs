//! 任务事件
//!
//! 队列每次合并任务更新后同步通知观察者。
//! `EventChannelObserver` 把更新转换成可序列化的 `UploadEvent` 并通过广播通道发布。

use crate::uploader::{UploadTask, UploadTaskStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// 任务更新观察者
pub trait TaskObserver: Send + Sync {
    /// 任务被更新后调用（在处理下一条更新之前）
    fn on_task_updated(&self, index: usize, task: &UploadTask);
}

impl<F> TaskObserver for F
where
    F: Fn(usize, &UploadTask) + Send + Sync,
{
    fn on_task_updated(&self, index: usize, task: &UploadTask) {
        self(index, task)
    }
}

/// 上传事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 开始上传
    Started {
        index: usize,
        task_id: String,
        file_name: String,
        total_size: u64,
    },
    /// 进度更新
    Progress {
        index: usize,
        task_id: String,
        progress: u8,
    },
    /// 上传成功
    Completed {
        index: usize,
        task_id: String,
        result_id: String,
    },
    /// 上传失败
    Failed {
        index: usize,
        task_id: String,
        error: String,
        progress: u8,
    },
}

impl UploadEvent {
    /// 根据任务快照生成事件，等待中的任务不产生事件
    pub fn from_task(index: usize, task: &UploadTask) -> Option<Self> {
        let task_id = task.id.clone();
        match task.status {
            UploadTaskStatus::Pending => None,
            UploadTaskStatus::Uploading if task.progress == 0 => Some(UploadEvent::Started {
                index,
                task_id,
                file_name: task.source.name.clone(),
                total_size: task.source.size,
            }),
            UploadTaskStatus::Uploading => Some(UploadEvent::Progress {
                index,
                task_id,
                progress: task.progress,
            }),
            UploadTaskStatus::Success => Some(UploadEvent::Completed {
                index,
                task_id,
                result_id: task.result_id.clone().unwrap_or_default(),
            }),
            UploadTaskStatus::Error => Some(UploadEvent::Failed {
                index,
                task_id,
                error: task.error.clone().unwrap_or_default(),
                progress: task.progress,
            }),
        }
    }

    /// 获取任务 ID
    pub fn task_id(&self) -> &str {
        match self {
            UploadEvent::Started { task_id, .. } => task_id,
            UploadEvent::Progress { task_id, .. } => task_id,
            UploadEvent::Completed { task_id, .. } => task_id,
            UploadEvent::Failed { task_id, .. } => task_id,
        }
    }

    /// 获取事件类型名称
    pub fn event_type_name(&self) -> &'static str {
        match self {
            UploadEvent::Started { .. } => "started",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::Completed { .. } => "completed",
            UploadEvent::Failed { .. } => "failed",
        }
    }
}

/// 广播通道观察者
#[derive(Debug, Clone)]
pub struct EventChannelObserver {
    sender: broadcast::Sender<UploadEvent>,
}

impl EventChannelObserver {
    /// 创建观察者和第一个订阅者
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<UploadEvent>) {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }
}

impl TaskObserver for EventChannelObserver {
    fn on_task_updated(&self, index: usize, task: &UploadTask) {
        if let Some(event) = UploadEvent::from_task(index, task) {
            // 没有订阅者时发送失败，忽略即可
            if self.sender.send(event).is_err() {
                debug!("没有事件订阅者: index={}", index);
            }
        }
    }
}
