// 错误类型定义
//
// 两层错误：
// - UploadError: 批次级错误（获取上传地址失败、配置错误），会中止整个批次
// - TransferError: 单文件传输错误，只会把对应任务标记为失败

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// 上传错误类型（用于判断是否可重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadErrorKind {
    /// 网络错误（可重试）
    Network,
    /// 超时（可重试）
    Timeout,
    /// 服务器错误（可重试）
    ServerError,
    /// 限流（可重试，需要更长等待时间）
    RateLimited,
    /// 未登录或令牌失效（不可重试）
    Unauthorized,
    /// 权限不足 / 上传地址已过期（不可重试）
    Forbidden,
    /// 目标不存在（不可重试）
    NotFound,
    /// 参数错误（不可重试）
    BadRequest,
    /// 文件过大（不可重试）
    PayloadTooLarge,
    /// 读取本地文件失败（不可重试）
    Io,
    /// 响应无法解析（不可重试）
    InvalidResponse,
    /// 已取消
    Cancelled,
    /// 未知错误
    Unknown,
}

impl UploadErrorKind {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UploadErrorKind::Network
                | UploadErrorKind::Timeout
                | UploadErrorKind::ServerError
                | UploadErrorKind::RateLimited
        )
    }

    /// 从 HTTP 状态码转换
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => UploadErrorKind::Unauthorized,
            403 => UploadErrorKind::Forbidden,
            404 => UploadErrorKind::NotFound,
            408 => UploadErrorKind::Timeout,
            413 => UploadErrorKind::PayloadTooLarge,
            429 => UploadErrorKind::RateLimited,
            400..=499 => UploadErrorKind::BadRequest,
            500..=599 => UploadErrorKind::ServerError,
            _ => UploadErrorKind::Unknown,
        }
    }
}

/// 单个文件的传输错误
///
/// `message` 直接展示给用户，放在失败条目旁边
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransferError {
    pub kind: UploadErrorKind,
    pub message: String,
}

impl TransferError {
    pub fn new(kind: UploadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 非 2xx 响应
    ///
    /// 服务端返回了结构化的错误信息时优先使用，否则使用 `HTTP <status>`
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status));
        Self::new(UploadErrorKind::from_status(status), message)
    }

    pub fn cancelled() -> Self {
        Self::new(UploadErrorKind::Cancelled, "上传已取消")
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            UploadErrorKind::Timeout,
            format!("上传超时（超过 {} 秒）", limit.as_secs()),
        )
    }

    pub fn io(err: std::io::Error) -> Self {
        Self::new(UploadErrorKind::Io, format!("读取文件失败: {}", err))
    }

    pub fn invalid_response(detail: impl std::fmt::Display) -> Self {
        Self::new(
            UploadErrorKind::InvalidResponse,
            format!("响应解析失败: {}", detail),
        )
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            UploadErrorKind::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            UploadErrorKind::Network
        } else if let Some(status) = err.status() {
            UploadErrorKind::from_status(status.as_u16())
        } else if err.is_decode() {
            UploadErrorKind::InvalidResponse
        } else {
            UploadErrorKind::Unknown
        };
        Self::new(kind, format!("网络请求失败: {}", err))
    }
}

/// 批次级错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 无法为批次获取上传地址，整批不会开始
    #[error("获取上传地址失败: {0}")]
    Acquisition(String),

    /// 配置不合法
    #[error("配置无效: {0}")]
    InvalidConfig(String),

    /// HTTP 客户端初始化失败
    #[error("HTTP 客户端初始化失败: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
