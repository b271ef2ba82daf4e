// 上传任务定义
//
// 每个文件对应一个 UploadTask，状态机：
// Pending -> Uploading -> Success | Error
// 失败的任务在下一个批次中可以重新进入 Uploading

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// 上传任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadTaskStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 上传成功
    Success,
    /// 失败
    Error,
}

impl UploadTaskStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadTaskStatus::Success | UploadTaskStatus::Error)
    }
}

/// 文件内容来源
#[derive(Debug, Clone)]
pub enum FileContent {
    /// 本地文件
    Path(PathBuf),
    /// 内存数据
    Memory(Arc<Vec<u8>>),
}

/// 待上传的源文件
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    /// 文件名
    pub name: String,
    /// 文件大小（字节）
    pub size: u64,
    /// MIME 类型
    pub mime_type: String,
    #[serde(skip_serializing)]
    pub content: FileContent,
}

impl SourceFile {
    /// 从本地路径创建
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            mime_type: guess_mime_type(&name).to_string(),
            name,
            size: metadata.len(),
            content: FileContent::Path(path.to_path_buf()),
        })
    }

    /// 从内存数据创建
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            mime_type: guess_mime_type(&name).to_string(),
            size: data.len() as u64,
            name,
            content: FileContent::Memory(Arc::new(data)),
        }
    }

    /// 读取完整文件内容
    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        match &self.content {
            FileContent::Path(path) => tokio::fs::read(path).await,
            FileContent::Memory(data) => Ok(data.as_ref().clone()),
        }
    }
}

/// 根据扩展名推断 MIME 类型
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// 任务的部分更新
///
/// 由传输执行器产生，按索引合并到队列中的任务上
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub status: Option<UploadTaskStatus>,
    pub progress: Option<u8>,
    pub result_id: Option<String>,
    pub error: Option<String>,
}

impl TaskPatch {
    /// 开始上传：进度归零，清除上次的错误
    pub fn started() -> Self {
        Self {
            status: Some(UploadTaskStatus::Uploading),
            progress: Some(0),
            ..Default::default()
        }
    }

    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
            ..Default::default()
        }
    }

    pub fn succeeded(result_id: String) -> Self {
        Self {
            status: Some(UploadTaskStatus::Success),
            progress: Some(100),
            result_id: Some(result_id),
            ..Default::default()
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: Some(UploadTaskStatus::Error),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// 上传任务
#[derive(Debug, Clone, Serialize)]
pub struct UploadTask {
    /// 任务ID
    pub id: String,
    /// 源文件
    pub source: SourceFile,
    /// 任务状态
    pub status: UploadTaskStatus,
    /// 进度百分比 (0-100)
    pub progress: u8,
    /// 上传成功后的标识（存储 key 或服务端记录 ID）
    pub result_id: Option<String>,
    /// 错误信息
    pub error: Option<String>,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
}

impl UploadTask {
    /// 创建新的上传任务
    pub fn new(source: SourceFile) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            status: UploadTaskStatus::Pending,
            progress: 0,
            result_id: None,
            error: None,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 是否可以进入下一批次（等待中或失败）
    pub fn is_eligible(&self) -> bool {
        matches!(
            self.status,
            UploadTaskStatus::Pending | UploadTaskStatus::Error
        )
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) {
        self.status = UploadTaskStatus::Uploading;
        self.progress = 0;
        self.error = None;
        self.result_id = None;
        self.completed_at = None;
        self.started_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为成功
    pub fn mark_success(&mut self, result_id: String) {
        self.status = UploadTaskStatus::Success;
        self.progress = 100;
        self.result_id = Some(result_id);
        self.completed_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为失败（保留最后的进度）
    pub fn mark_failed(&mut self, error: String) {
        self.status = UploadTaskStatus::Error;
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now().timestamp());
    }

    /// 合并部分更新
    pub fn apply(&mut self, patch: TaskPatch) {
        match patch.status {
            Some(UploadTaskStatus::Uploading) => self.mark_uploading(),
            Some(UploadTaskStatus::Success) => {
                self.mark_success(patch.result_id.clone().unwrap_or_default())
            }
            Some(UploadTaskStatus::Error) => {
                self.mark_failed(patch.error.clone().unwrap_or_else(|| "未知错误".to_string()))
            }
            Some(UploadTaskStatus::Pending) => self.status = UploadTaskStatus::Pending,
            None => {}
        }

        // 上传中进度只增不减
        if let Some(progress) = patch.progress {
            let progress = progress.min(100);
            if self.status != UploadTaskStatus::Uploading || progress > self.progress {
                self.progress = progress;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> UploadTask {
        UploadTask::new(SourceFile::from_bytes("IMG_0001.JPG", vec![0u8; 1000]))
    }

    #[test]
    fn test_task_creation() {
        let task = sample_task();

        assert_eq!(task.status, UploadTaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.source.size, 1000);
        assert_eq!(task.source.mime_type, "image/jpeg");
        assert!(task.result_id.is_none());
        assert!(task.is_eligible());
    }

    #[test]
    fn test_status_transitions() {
        let mut task = sample_task();

        task.apply(TaskPatch::started());
        assert_eq!(task.status, UploadTaskStatus::Uploading);
        assert!(task.started_at.is_some());

        task.apply(TaskPatch::progress(40));
        assert_eq!(task.progress, 40);

        task.apply(TaskPatch::failed("Network error".to_string()));
        assert_eq!(task.status, UploadTaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("Network error"));
        // 失败时保留最后的进度
        assert_eq!(task.progress, 40);
        assert!(task.is_eligible());

        // 重试：进度归零，错误清除
        task.apply(TaskPatch::started());
        assert_eq!(task.progress, 0);
        assert!(task.error.is_none());

        task.apply(TaskPatch::succeeded("events/e1/a.jpg".to_string()));
        assert_eq!(task.status, UploadTaskStatus::Success);
        assert_eq!(task.progress, 100);
        assert_eq!(task.result_id.as_deref(), Some("events/e1/a.jpg"));
        assert!(task.completed_at.is_some());
        assert!(!task.is_eligible());
    }

    #[test]
    fn test_progress_never_regresses_while_uploading() {
        let mut task = sample_task();
        task.apply(TaskPatch::started());

        task.apply(TaskPatch::progress(60));
        task.apply(TaskPatch::progress(30));
        assert_eq!(task.progress, 60);

        task.apply(TaskPatch::progress(250));
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("a.JPEG"), "image/jpeg");
        assert_eq!(guess_mime_type("b.png"), "image/png");
        assert_eq!(guess_mime_type("c.HEIC"), "image/heic");
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_read_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.webp");
        std::fs::write(&path, b"webp-bytes").unwrap();

        let file = SourceFile::from_path(&path).unwrap();
        assert_eq!(file.name, "photo.webp");
        assert_eq!(file.size, 10);
        assert_eq!(file.mime_type, "image/webp");
        assert_eq!(file.read_all().await.unwrap(), b"webp-bytes");
    }
}
