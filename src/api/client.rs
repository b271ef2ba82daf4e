// 后端 API 客户端
//
// 提供两个上传相关接口：
// - POST {base}/photos/upload-urls  批量申请预签名上传地址
// - POST {base}/photos/upload       multipart 中转上传（photo + eventId）

use crate::api::storage::progress_body;
use crate::api::types::{
    extract_error_message, FileDescriptor, PhotoUploadResponse, UploadSlot, UploadUrlsRequest,
    UploadUrlsResponse,
};
use crate::api::{PhotoApi, SlotProvider};
use crate::config::ApiConfig;
use crate::error::{TransferError, UploadError};
use crate::uploader::{ProgressSink, SourceFile};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{multipart, Client, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 后端 API 客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP客户端
    client: Client,
    /// 接口根地址，如 http://localhost:3000/api
    base_url: String,
    /// Bearer 令牌
    token: Option<String>,
}

impl ApiClient {
    /// 创建新的 API 客户端
    pub fn new(config: &ApiConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;

        info!(
            "初始化 API 客户端: base_url={}, 令牌={}",
            config.base_url,
            if config.token.is_some() {
                "已设置"
            } else {
                "未设置"
            }
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// 读取响应体，非 2xx 时转换为 TransferError
    async fn read_success_body(response: Response) -> Result<String, TransferError> {
        let status = response.status();
        let body = response.text().await?;
        debug!("接口响应: status={}, body={}", status, body);

        if !status.is_success() {
            return Err(TransferError::from_status(
                status.as_u16(),
                extract_error_message(&body),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl SlotProvider for ApiClient {
    async fn acquire_slots(
        &self,
        event_id: &str,
        files: &[FileDescriptor],
    ) -> Result<Vec<UploadSlot>, TransferError> {
        info!("申请上传地址: event={}, 文件数={}", event_id, files.len());

        let response = self
            .authorize(self.client.post(self.endpoint("photos/upload-urls")))
            .json(&UploadUrlsRequest { event_id, files })
            .send()
            .await?;

        let body = Self::read_success_body(response).await?;
        let parsed: UploadUrlsResponse =
            serde_json::from_str(&body).map_err(TransferError::invalid_response)?;

        Ok(parsed.uploads)
    }
}

#[async_trait]
impl PhotoApi for ApiClient {
    async fn upload_photo(
        &self,
        event_id: &str,
        file: &SourceFile,
        data: Vec<u8>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<String, TransferError> {
        let total = data.len() as u64;
        debug!("中转上传: event={}, file={}, size={}", event_id, file.name, total);

        let part = multipart::Part::stream_with_length(progress_body(data, progress.clone()), total)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = multipart::Form::new()
            .text("eventId", event_id.to_string())
            .part("photo", part);

        let response = self
            .authorize(self.client.post(self.endpoint("photos/upload")))
            .multipart(form)
            .send()
            .await?;

        let body = Self::read_success_body(response).await?;
        let parsed: PhotoUploadResponse =
            serde_json::from_str(&body).map_err(TransferError::invalid_response)?;

        match parsed.photo_id() {
            Some(id) => {
                progress.report(total, total);
                Ok(id)
            }
            None => {
                error!("中转上传响应缺少照片 ID: {}", body);
                Err(TransferError::invalid_response("缺少照片 ID"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadErrorKind;
    use axum::{
        body::Bytes,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn spawn_api() -> String {
        let app = Router::new()
            .route(
                "/api/photos/upload-urls",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    if headers.get("authorization").and_then(|v| v.to_str().ok())
                        != Some("Bearer secret")
                    {
                        return (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"message": "请先登录"})),
                        );
                    }
                    let event = body["eventId"].as_str().unwrap_or_default().to_string();
                    let uploads: Vec<Value> = body["files"]
                        .as_array()
                        .cloned()
                        .unwrap_or_default()
                        .iter()
                        .map(|f| {
                            let key = format!("events/{}/{}", event, f["fileName"].as_str().unwrap());
                            json!({"uploadUrl": format!("http://storage/{}", key), "key": key})
                        })
                        .collect();
                    (StatusCode::OK, Json(json!({ "uploads": uploads })))
                }),
            )
            .route(
                "/api/photos/upload",
                post(|headers: HeaderMap, body: Bytes| async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    let text = String::from_utf8_lossy(&body);
                    if !content_type.starts_with("multipart/form-data") {
                        return (StatusCode::BAD_REQUEST, Json(json!({"message": "需要 multipart"})));
                    }
                    if text.contains("closed-event") {
                        return (StatusCode::FORBIDDEN, Json(json!({"message": "活动已关闭"})));
                    }
                    if !text.contains("name=\"photo\"") || !text.contains("name=\"eventId\"") {
                        return (StatusCode::BAD_REQUEST, Json(json!({"error": "缺少字段"})));
                    }
                    (StatusCode::CREATED, Json(json!({"photo": {"id": 101}})))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/", addr)
    }

    fn config(base_url: String, token: Option<&str>) -> ApiConfig {
        ApiConfig {
            base_url,
            token: token.map(str::to_string),
            ..Default::default()
        }
    }

    fn noop_progress() -> Arc<dyn ProgressSink> {
        Arc::new(|_: u64, _: u64| {})
    }

    #[tokio::test]
    async fn test_acquire_slots_preserves_order() {
        let base = spawn_api().await;
        let client = ApiClient::new(&config(base, Some("secret"))).unwrap();
        let files = vec![
            FileDescriptor {
                file_name: "b.jpg".to_string(),
                file_type: "image/jpeg".to_string(),
            },
            FileDescriptor {
                file_name: "a.png".to_string(),
                file_type: "image/png".to_string(),
            },
        ];

        let slots = client.acquire_slots("ev1", &files).await.unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].key, "events/ev1/b.jpg");
        assert_eq!(slots[1].key, "events/ev1/a.png");
    }

    #[tokio::test]
    async fn test_acquire_slots_surfaces_server_message() {
        let base = spawn_api().await;
        let client = ApiClient::new(&config(base, None)).unwrap();

        let err = client.acquire_slots("ev1", &[]).await.unwrap_err();
        assert_eq!(err.kind, UploadErrorKind::Unauthorized);
        assert_eq!(err.message, "请先登录");
    }

    #[tokio::test]
    async fn test_upload_photo_returns_server_id() {
        let base = spawn_api().await;
        let client = ApiClient::new(&config(base, Some("secret"))).unwrap();
        let file = SourceFile::from_bytes("IMG_1.jpg", vec![9u8; 2048]);

        let id = client
            .upload_photo("ev1", &file, file.read_all().await.unwrap(), noop_progress())
            .await
            .unwrap();
        assert_eq!(id, "101");
    }

    #[tokio::test]
    async fn test_upload_photo_error_message() {
        let base = spawn_api().await;
        let client = ApiClient::new(&config(base, Some("secret"))).unwrap();
        let file = SourceFile::from_bytes("IMG_2.jpg", vec![1u8; 16]);

        let err = client
            .upload_photo("closed-event", &file, vec![1u8; 16], noop_progress())
            .await
            .unwrap_err();
        assert_eq!(err.kind, UploadErrorKind::Forbidden);
        assert_eq!(err.to_string(), "活动已关闭");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // 绑定后立即释放端口，保证没有服务监听
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&config(format!("http://{}/api", addr), None)).unwrap();
        let err = client.acquire_slots("ev1", &[]).await.unwrap_err();
        assert_eq!(err.kind, UploadErrorKind::Network);
        assert!(err.kind.is_retriable());
    }
}
