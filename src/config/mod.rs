// 配置管理模块

use crate::error::UploadError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 后端接口配置
    #[serde(default)]
    pub api: ApiConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 后端接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 接口根地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer 令牌
    #[serde(default)]
    pub token: Option<String>,
    /// 单个请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// 经后端中转（multipart 上传）
    Composite,
    /// 预签名地址直传存储
    Direct,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "composite" => Ok(StrategyKind::Composite),
            "direct" => Ok(StrategyKind::Direct),
            other => Err(format!("未知的传输方式: {}（可选 composite / direct）", other)),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Composite => write!(f, "composite"),
            StrategyKind::Direct => write!(f, "direct"),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 最大同时上传文件数
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// 传输方式
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// 单个文件超时（秒），0 表示不限制
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// 可重试错误的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 扫描文件夹时是否跳过隐藏文件
    #[serde(default = "default_skip_hidden_files")]
    pub skip_hidden_files: bool,
    /// 单个文件最大大小 (MB)，0 表示不限制
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// 允许上传的扩展名（小写，不带点）
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_concurrency_limit() -> usize {
    crate::uploader::DEFAULT_CONCURRENCY_LIMIT
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Direct
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    2
}

fn default_skip_hidden_files() -> bool {
    true
}

fn default_max_file_size_mb() -> u64 {
    50
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp", "heic", "heif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            strategy: default_strategy(),
            task_timeout_secs: default_task_timeout_secs(),
            max_retries: default_max_retries(),
            skip_hidden_files: default_skip_hidden_files(),
            max_file_size_mb: default_max_file_size_mb(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl UploadConfig {
    /// 单个文件超时
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }

    /// 单个文件最大字节数
    pub fn max_file_size(&self) -> Option<u64> {
        (self.max_file_size_mb > 0).then(|| self.max_file_size_mb * 1024 * 1024)
    }

    pub fn validate(&self) -> std::result::Result<(), UploadError> {
        if self.concurrency_limit == 0 {
            return Err(UploadError::InvalidConfig(
                "concurrency_limit 必须大于 0".to_string(),
            ));
        }
        if self.max_retries > 10 {
            return Err(UploadError::InvalidConfig(format!(
                "max_retries 过大: {}（最大 10）",
                self.max_retries
            )));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .validate()
            .context("配置文件中的上传参数验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载配置，文件不存在或无效时使用默认配置
    ///
    /// 同时返回加载错误，由调用方在日志初始化后报告
    pub async fn load_or_default(path: &str) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_file(path).await {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), UploadError> {
        if self.api.base_url.trim().is_empty() {
            return Err(UploadError::InvalidConfig("api.base_url 不能为空".to_string()));
        }
        self.upload.validate()
    }
}
