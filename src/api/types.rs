// 接口数据类型

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 申请上传地址时的文件描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_name: String,
    pub file_type: String,
}

/// 预签名上传地址
///
/// `key` 是存储中的对象 key，上传前就已确定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    pub upload_url: String,
    pub key: String,
}

/// 申请上传地址请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlsRequest<'a> {
    pub event_id: &'a str,
    pub files: &'a [FileDescriptor],
}

/// 申请上传地址响应
#[derive(Debug, Deserialize)]
pub struct UploadUrlsResponse {
    #[serde(default)]
    pub uploads: Vec<UploadSlot>,
}

/// 中转上传响应
///
/// 兼容 `{"photo": {"id": ...}}` 和 `{"id": ...}` 两种格式，id 可能是数字
#[derive(Debug, Deserialize)]
pub struct PhotoUploadResponse {
    #[serde(default)]
    pub photo: Option<PhotoRecord>,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoRecord {
    #[serde(default)]
    pub id: Option<Value>,
    /// Mongo 风格的主键，可能与 id 同时出现
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<Value>,
}

impl PhotoRecord {
    fn id(&self) -> Option<String> {
        self.id
            .as_ref()
            .and_then(value_to_id)
            .or_else(|| self.mongo_id.as_ref().and_then(value_to_id))
    }
}

impl PhotoUploadResponse {
    /// 服务端分配的照片 ID
    pub fn photo_id(&self) -> Option<String> {
        self.photo
            .as_ref()
            .and_then(PhotoRecord::id)
            .or_else(|| self.id.as_ref().and_then(value_to_id))
    }
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 错误响应体
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 从错误响应体中提取提示信息
pub fn extract_error_message(body: &str) -> Option<String> {
    let parsed: ApiErrorBody = serde_json::from_str(body).ok()?;
    parsed.message.or(parsed.error)
}
