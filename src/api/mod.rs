// 后端接口模块
//
// 上传核心只通过下面三个接口访问外部服务，
// ApiClient / StorageClient 是基于 reqwest 的默认实现

pub mod client;
pub mod storage;
pub mod types;

pub use client::ApiClient;
pub use storage::StorageClient;
pub use types::{FileDescriptor, UploadSlot};

use crate::error::TransferError;
use crate::uploader::{ProgressSink, SourceFile};
use async_trait::async_trait;
use std::sync::Arc;

/// 上传地址申请
#[async_trait]
pub trait SlotProvider: Send + Sync {
    /// 为一批文件申请上传地址，返回顺序与输入一致
    async fn acquire_slots(
        &self,
        event_id: &str,
        files: &[FileDescriptor],
    ) -> Result<Vec<UploadSlot>, TransferError>;
}

/// 字节直传目标（预签名 PUT）
#[async_trait]
pub trait ByteSink: Send + Sync {
    async fn put(
        &self,
        url: &str,
        content_type: &str,
        data: Vec<u8>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(), TransferError>;
}

/// 中转上传接口（文件 + 活动 ID 一次提交，服务端转存）
#[async_trait]
pub trait PhotoApi: Send + Sync {
    /// 返回服务端分配的照片 ID
    async fn upload_photo(
        &self,
        event_id: &str,
        file: &SourceFile,
        data: Vec<u8>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<String, TransferError>;
}
