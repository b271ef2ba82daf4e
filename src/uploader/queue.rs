// 上传任务队列
//
// 队列是任务状态的唯一所有者：
// - 传输执行器不直接修改任务，而是发送 TaskUpdate 消息
// - 批次循环按接收顺序依次合并到队列，并同步通知观察者

use crate::events::TaskObserver;
use crate::uploader::{SourceFile, TaskPatch, UploadTask, UploadTaskStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 任务更新消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    /// 任务在队列中的索引
    pub index: usize,
    /// 更新内容
    pub patch: TaskPatch,
}

/// 上传任务队列
#[derive(Default)]
pub struct UploadQueue {
    /// 所有任务（按加入顺序）
    tasks: Vec<UploadTask>,
    /// 任务更新观察者
    observer: Option<Arc<dyn TaskObserver>>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带观察者的队列
    pub fn with_observer(observer: Arc<dyn TaskObserver>) -> Self {
        Self {
            tasks: Vec::new(),
            observer: Some(observer),
        }
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn TaskObserver>>) {
        self.observer = observer;
    }

    /// 加入单个文件，返回任务索引
    pub fn add_file(&mut self, source: SourceFile) -> usize {
        debug!("加入上传队列: {} ({} bytes)", source.name, source.size);
        self.tasks.push(UploadTask::new(source));
        self.tasks.len() - 1
    }

    /// 批量加入文件
    pub fn add_files<I>(&mut self, files: I) -> Vec<usize>
    where
        I: IntoIterator<Item = SourceFile>,
    {
        files.into_iter().map(|f| self.add_file(f)).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn get(&self, index: usize) -> Option<&UploadTask> {
        self.tasks.get(index)
    }

    /// 选出本批次需要处理的任务索引（等待中或失败），按队列顺序
    pub fn select_pending_indices(&self) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_eligible())
            .map(|(i, _)| i)
            .collect()
    }

    /// 合并部分更新并通知观察者
    ///
    /// 返回 false 表示索引不存在
    pub fn update_task(&mut self, index: usize, patch: TaskPatch) -> bool {
        let Some(task) = self.tasks.get_mut(index) else {
            warn!("忽略不存在的任务更新: index={}", index);
            return false;
        };

        task.apply(patch);

        if let Some(observer) = &self.observer {
            observer.on_task_updated(index, task);
        }
        true
    }

    /// 应用一条更新消息
    pub fn apply_update(&mut self, update: TaskUpdate) -> bool {
        self.update_task(update.index, update.patch)
    }

    /// 当前上传中的任务数
    pub fn uploading_count(&self) -> usize {
        self.count_by_status(UploadTaskStatus::Uploading)
    }

    pub fn count_by_status(&self, status: UploadTaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// 清除已完成的任务
    ///
    /// 注意：剩余任务的索引会重新编号
    pub fn clear_completed(&mut self) -> usize {
        let removed = self.remove_where(UploadTaskStatus::Success);
        info!("清除了 {} 个已完成的上传任务", removed);
        removed
    }

    /// 清除失败的任务
    pub fn clear_failed(&mut self) -> usize {
        let removed = self.remove_where(UploadTaskStatus::Error);
        info!("清除了 {} 个失败的上传任务", removed);
        removed
    }

    fn remove_where(&mut self, status: UploadTaskStatus) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.status != status);
        before - self.tasks.len()
    }
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("tasks", &self.tasks.len())
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn queue_with(n: usize) -> UploadQueue {
        let mut queue = UploadQueue::new();
        queue.add_files((0..n).map(|i| SourceFile::from_bytes(format!("{i}.jpg"), vec![0; 10])));
        queue
    }

    #[test]
    fn test_select_pending_indices() {
        let mut queue = queue_with(4);
        queue.update_task(0, TaskPatch::started());
        queue.update_task(0, TaskPatch::succeeded("a".to_string()));
        queue.update_task(1, TaskPatch::started());
        queue.update_task(2, TaskPatch::started());
        queue.update_task(2, TaskPatch::failed("boom".to_string()));

        assert_eq!(queue.select_pending_indices(), vec![2, 3]);
        assert_eq!(queue.uploading_count(), 1);
    }

    #[test]
    fn test_update_notifies_observer() {
        let seen: Arc<Mutex<Vec<(usize, UploadTaskStatus, u8)>>> = Arc::default();
        let sink = seen.clone();
        let mut queue = UploadQueue::with_observer(Arc::new(move |i: usize, t: &UploadTask| {
            sink.lock().unwrap().push((i, t.status, t.progress));
        }));
        queue.add_file(SourceFile::from_bytes("a.jpg", vec![0; 4]));

        queue.update_task(0, TaskPatch::started());
        queue.update_task(0, TaskPatch::progress(50));
        queue.update_task(0, TaskPatch::succeeded("k".to_string()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (0, UploadTaskStatus::Uploading, 0),
                (0, UploadTaskStatus::Uploading, 50),
                (0, UploadTaskStatus::Success, 100),
            ]
        );
    }

    #[test]
    fn test_update_out_of_range_is_ignored() {
        let mut queue = queue_with(1);
        assert!(!queue.update_task(5, TaskPatch::started()));
        assert_eq!(queue.get(0).unwrap().status, UploadTaskStatus::Pending);
    }

    #[test]
    fn test_clear_completed_and_failed() {
        let mut queue = queue_with(3);
        queue.update_task(0, TaskPatch::succeeded("a".to_string()));
        queue.update_task(1, TaskPatch::failed("x".to_string()));

        assert_eq!(queue.clear_completed(), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear_failed(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.tasks()[0].source.name, "2.jpg");
    }
}
