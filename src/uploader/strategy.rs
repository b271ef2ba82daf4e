// 传输策略
//
// 两种上传方式实现同一个接口，调度器和汇总逻辑不关心具体方式：
// - CompositeTransfer: 文件 + 活动 ID 一起提交给后端，由后端转存，返回照片 ID
// - DirectTransfer: 批次开始前申请预签名地址，直接 PUT 到存储，标识为预先确定的 key

use crate::api::{ApiClient, ByteSink, FileDescriptor, PhotoApi, SlotProvider, StorageClient, UploadSlot};
use crate::config::StrategyKind;
use crate::error::{TransferError, UploadError, UploadErrorKind};
use crate::uploader::{ProgressSink, SourceFile};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 单个文件的传输目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    /// 中转上传，携带活动 ID
    Composite { event_id: String },
    /// 直传到预签名地址
    Direct(UploadSlot),
}

/// 传输策略
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    /// 策略名称（用于日志）
    fn name(&self) -> &'static str;

    /// 批次开始前为每个文件准备传输目标，返回顺序与输入一致
    ///
    /// 返回错误时整个批次不会开始
    async fn prepare(&self, files: &[SourceFile]) -> Result<Vec<TransferTarget>, UploadError>;

    /// 传输单个文件，返回上传后的标识
    async fn transfer(
        &self,
        file: &SourceFile,
        target: &TransferTarget,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<String, TransferError>;
}

/// 中转上传
pub struct CompositeTransfer {
    api: Arc<dyn PhotoApi>,
    event_id: String,
}

impl CompositeTransfer {
    pub fn new(api: Arc<dyn PhotoApi>, event_id: impl Into<String>) -> Self {
        Self {
            api,
            event_id: event_id.into(),
        }
    }
}

#[async_trait]
impl TransferStrategy for CompositeTransfer {
    fn name(&self) -> &'static str {
        "composite"
    }

    async fn prepare(&self, files: &[SourceFile]) -> Result<Vec<TransferTarget>, UploadError> {
        Ok(vec![
            TransferTarget::Composite {
                event_id: self.event_id.clone(),
            };
            files.len()
        ])
    }

    async fn transfer(
        &self,
        file: &SourceFile,
        target: &TransferTarget,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<String, TransferError> {
        let TransferTarget::Composite { event_id } = target else {
            return Err(mismatched_target(self.name()));
        };

        let data = file.read_all().await.map_err(TransferError::io)?;
        self.api.upload_photo(event_id, file, data, progress).await
    }
}

/// 预签名直传
pub struct DirectTransfer {
    slots: Arc<dyn SlotProvider>,
    sink: Arc<dyn ByteSink>,
    event_id: String,
}

impl DirectTransfer {
    pub fn new(
        slots: Arc<dyn SlotProvider>,
        sink: Arc<dyn ByteSink>,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            slots,
            sink,
            event_id: event_id.into(),
        }
    }
}

#[async_trait]
impl TransferStrategy for DirectTransfer {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn prepare(&self, files: &[SourceFile]) -> Result<Vec<TransferTarget>, UploadError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let descriptors: Vec<FileDescriptor> = files
            .iter()
            .map(|f| FileDescriptor {
                file_name: f.name.clone(),
                file_type: f.mime_type.clone(),
            })
            .collect();

        let slots = self
            .slots
            .acquire_slots(&self.event_id, &descriptors)
            .await
            .map_err(|e| UploadError::Acquisition(e.to_string()))?;

        // 必须每个文件对应一个地址，否则无法继续
        if slots.len() != files.len() {
            warn!(
                "上传地址数量不匹配: 请求 {} 个，返回 {} 个",
                files.len(),
                slots.len()
            );
            return Err(UploadError::Acquisition(format!(
                "返回的上传地址数量 {} 与文件数量 {} 不一致",
                slots.len(),
                files.len()
            )));
        }

        info!("已获取 {} 个上传地址: event={}", slots.len(), self.event_id);
        Ok(slots.into_iter().map(TransferTarget::Direct).collect())
    }

    async fn transfer(
        &self,
        file: &SourceFile,
        target: &TransferTarget,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<String, TransferError> {
        let TransferTarget::Direct(slot) = target else {
            return Err(mismatched_target(self.name()));
        };

        let data = file.read_all().await.map_err(TransferError::io)?;
        self.sink
            .put(&slot.upload_url, &file.mime_type, data, progress)
            .await?;
        Ok(slot.key.clone())
    }
}

fn mismatched_target(strategy: &str) -> TransferError {
    TransferError::new(
        UploadErrorKind::Unknown,
        format!("传输目标与策略 {} 不匹配", strategy),
    )
}

/// 根据配置创建传输策略
pub fn build_strategy(
    kind: StrategyKind,
    event_id: &str,
    api: Arc<ApiClient>,
    storage: Arc<StorageClient>,
) -> Arc<dyn TransferStrategy> {
    match kind {
        StrategyKind::Composite => Arc::new(CompositeTransfer::new(api, event_id)),
        StrategyKind::Direct => Arc::new(DirectTransfer::new(api, storage, event_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 按请求数量返回地址，可以故意少给
    struct FakeSlots {
        drop_last: bool,
        fail: bool,
    }

    #[async_trait]
    impl SlotProvider for FakeSlots {
        async fn acquire_slots(
            &self,
            event_id: &str,
            files: &[FileDescriptor],
        ) -> Result<Vec<UploadSlot>, TransferError> {
            if self.fail {
                return Err(TransferError::from_status(500, Some("签名服务不可用".to_string())));
            }
            let mut slots: Vec<UploadSlot> = files
                .iter()
                .map(|f| UploadSlot {
                    upload_url: format!("http://s3/{}/{}", event_id, f.file_name),
                    key: format!("events/{}/{}", event_id, f.file_name),
                })
                .collect();
            if self.drop_last {
                slots.pop();
            }
            Ok(slots)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        puts: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait]
    impl ByteSink for RecordingSink {
        async fn put(
            &self,
            url: &str,
            content_type: &str,
            data: Vec<u8>,
            progress: Arc<dyn ProgressSink>,
        ) -> Result<(), TransferError> {
            progress.report(data.len() as u64, data.len() as u64);
            self.puts
                .lock()
                .unwrap()
                .push((url.to_string(), content_type.to_string(), data.len()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PhotoApi for RecordingApi {
        async fn upload_photo(
            &self,
            event_id: &str,
            file: &SourceFile,
            _data: Vec<u8>,
            _progress: Arc<dyn ProgressSink>,
        ) -> Result<String, TransferError> {
            self.calls
                .lock()
                .unwrap()
                .push((event_id.to_string(), file.name.clone()));
            Ok(format!("photo-{}", file.name))
        }
    }

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::from_bytes("a.jpg", vec![1; 10]),
            SourceFile::from_bytes("b.png", vec![2; 20]),
        ]
    }

    fn noop() -> Arc<dyn ProgressSink> {
        Arc::new(|_: u64, _: u64| {})
    }

    #[tokio::test]
    async fn test_direct_transfer_uses_slot_key() {
        let sink = Arc::new(RecordingSink::default());
        let strategy = DirectTransfer::new(
            Arc::new(FakeSlots {
                drop_last: false,
                fail: false,
            }),
            sink.clone(),
            "ev1",
        );
        let files = files();

        let targets = strategy.prepare(&files).await.unwrap();
        assert_eq!(targets.len(), 2);

        let id = strategy.transfer(&files[1], &targets[1], noop()).await.unwrap();
        assert_eq!(id, "events/ev1/b.png");
        assert_eq!(
            *sink.puts.lock().unwrap(),
            vec![("http://s3/ev1/b.png".to_string(), "image/png".to_string(), 20)]
        );
    }

    #[tokio::test]
    async fn test_direct_prepare_count_mismatch_is_acquisition_error() {
        let strategy = DirectTransfer::new(
            Arc::new(FakeSlots {
                drop_last: true,
                fail: false,
            }),
            Arc::new(RecordingSink::default()),
            "ev1",
        );

        let err = strategy.prepare(&files()).await.unwrap_err();
        assert!(matches!(err, UploadError::Acquisition(_)));
    }

    #[tokio::test]
    async fn test_direct_prepare_request_failure() {
        let strategy = DirectTransfer::new(
            Arc::new(FakeSlots {
                drop_last: false,
                fail: true,
            }),
            Arc::new(RecordingSink::default()),
            "ev1",
        );

        match strategy.prepare(&files()).await {
            Err(UploadError::Acquisition(msg)) => assert!(msg.contains("签名服务不可用")),
            other => panic!("unexpected: {:?}", other.map(|t| t.len())),
        }
    }

    #[tokio::test]
    async fn test_composite_transfer_passes_event_id() {
        let api = Arc::new(RecordingApi::default());
        let strategy = CompositeTransfer::new(api.clone(), "ev9");
        let files = files();

        let targets = strategy.prepare(&files).await.unwrap();
        assert_eq!(
            targets[0],
            TransferTarget::Composite {
                event_id: "ev9".to_string()
            }
        );

        let id = strategy.transfer(&files[0], &targets[0], noop()).await.unwrap();
        assert_eq!(id, "photo-a.jpg");
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![("ev9".to_string(), "a.jpg".to_string())]
        );
    }

    #[tokio::test]
    async fn test_target_mismatch_is_error() {
        let strategy = CompositeTransfer::new(Arc::new(RecordingApi::default()), "ev1");
        let target = TransferTarget::Direct(UploadSlot {
            upload_url: "u".to_string(),
            key: "k".to_string(),
        });

        let err = strategy.transfer(&files()[0], &target, noop()).await.unwrap_err();
        assert_eq!(err.kind, UploadErrorKind::Unknown);
    }
}
