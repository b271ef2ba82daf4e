// 存储直传客户端
//
// 把文件字节 PUT 到预签名地址，请求体按 64KB 分块流式发送，
// 每个分块被传输层取走时上报一次进度

use crate::api::types::extract_error_message;
use crate::api::ByteSink;
use crate::error::{TransferError, UploadError};
use crate::uploader::ProgressSink;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 流式请求体分块大小
pub const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// 按分块切片文件内容，每个分块被取走时上报进度
///
/// 分块共享同一块缓冲区，不复制数据
fn progress_chunks(
    data: Vec<u8>,
    progress: Arc<dyn ProgressSink>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let data = Bytes::from(data);
    let len = data.len();
    let total = len as u64;

    stream::iter((0..len).step_by(BODY_CHUNK_SIZE)).map(move |start| {
        let end = (start + BODY_CHUNK_SIZE).min(len);
        progress.report(end as u64, total);
        Ok::<Bytes, std::io::Error>(data.slice(start..end))
    })
}

/// 构建带进度上报的请求体
pub(crate) fn progress_body(data: Vec<u8>, progress: Arc<dyn ProgressSink>) -> Body {
    Body::wrap_stream(progress_chunks(data, progress))
}

/// 对象存储直传客户端
#[derive(Debug, Clone)]
pub struct StorageClient {
    client: Client,
}

impl StorageClient {
    /// 创建直传客户端
    ///
    /// 预签名地址自带鉴权，这里不附加任何认证头
    pub fn new(request_timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ByteSink for StorageClient {
    async fn put(
        &self,
        url: &str,
        content_type: &str,
        data: Vec<u8>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(), TransferError> {
        let total = data.len() as u64;
        debug!("直传到存储: size={}, type={}", total, content_type);

        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(progress_body(data, progress.clone()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("存储拒绝上传: status={}, body={}", status, body);
            return Err(TransferError::from_status(
                status.as_u16(),
                extract_error_message(&body),
            ));
        }

        progress.report(total, total);
        Ok(())
    }
}
