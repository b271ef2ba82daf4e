//! photo-upload - 活动照片批量上传命令行工具

use anyhow::{bail, Context};
use clap::Parser;
use event_photo_uploader::{
    build_strategy,
    config::{AppConfig, StrategyKind, DEFAULT_CONFIG_PATH},
    logging,
    uploader::{format_bytes, ScanOptions},
    ApiClient, BatchResult, EventChannelObserver, FolderScanner, StorageClient, UploadPipeline,
    UploadQueue, UploadTaskStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 批量上传活动照片
#[derive(Parser, Debug)]
#[command(name = "photo-upload")]
#[command(version)]
#[command(about = "Upload event photos concurrently")]
struct Args {
    /// 活动 ID
    #[arg(long, value_name = "ID")]
    event: String,

    /// 配置文件路径
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// 传输方式: composite 或 direct（覆盖配置文件）
    #[arg(long, value_name = "STRATEGY")]
    strategy: Option<StrategyKind>,

    /// 最大同时上传数（覆盖配置文件）
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// 接口根地址（覆盖配置文件）
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// 失败文件的额外重试轮数
    #[arg(long, value_name = "N", default_value_t = 0)]
    retry_rounds: u32,

    /// 以 JSON 行的形式输出任务事件到 stdout
    #[arg(long)]
    json_events: bool,

    /// 要上传的文件或文件夹
    #[arg(required = true, value_name = "PATHS")]
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 配置加载失败时使用默认值，日志初始化后再报告
    let (mut config, load_error) = AppConfig::load_or_default(&args.config).await;

    let _log_guard = logging::init_logging(&config.log);
    match load_error {
        Some(e) => warn!("配置文件加载失败，使用默认配置: {:#}", e),
        None => info!("配置文件加载成功: {}", args.config),
    }

    if let Some(strategy) = args.strategy {
        config.upload.strategy = strategy;
    }
    if let Some(limit) = args.concurrency {
        config.upload.concurrency_limit = limit;
    }
    if let Some(base_url) = args.base_url.clone() {
        config.api.base_url = base_url;
    }
    config.validate().context("参数无效")?;

    let mut queue = build_queue(&args.paths, &config)?;
    if queue.is_empty() {
        bail!("没有找到可上传的照片");
    }

    // JSON 事件输出
    let printer = if args.json_events {
        let (observer, mut rx) = EventChannelObserver::new(1024);
        queue.set_observer(Some(Arc::new(observer)));
        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("事件序列化失败: {}", e),
                    },
                    Err(RecvError::Lagged(n)) => warn!("事件输出滞后，丢弃 {} 条", n),
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    } else {
        None
    };

    let api = Arc::new(ApiClient::new(&config.api)?);
    let storage = Arc::new(StorageClient::new(Duration::from_secs(
        config.api.request_timeout_secs,
    ))?);
    let strategy = build_strategy(config.upload.strategy, &args.event, api, storage);
    let pipeline = UploadPipeline::new(strategy, &config.upload);

    // Ctrl+C 取消：未开始的文件保持等待状态，进行中的文件标记失败
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到 Ctrl+C，取消上传...");
            trigger.cancel();
        }
    });

    let started = Instant::now();
    let mut result = pipeline.run_batch(&mut queue, cancel.clone()).await?;
    log_batch(&result);

    for round in 1..=args.retry_rounds {
        if !result.has_failures() || cancel.is_cancelled() {
            break;
        }
        info!("第 {}/{} 轮重试: {} 个失败文件", round, args.retry_rounds, result.error_count);
        result = pipeline.run_batch(&mut queue, cancel.clone()).await?;
        log_batch(&result);
    }

    // 释放事件发送端，等待输出任务结束
    queue.set_observer(None);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let succeeded = queue.count_by_status(UploadTaskStatus::Success);
    let failed = queue.count_by_status(UploadTaskStatus::Error);
    let pending = queue.count_by_status(UploadTaskStatus::Pending);

    for task in queue.tasks().iter().filter(|t| t.status == UploadTaskStatus::Error) {
        error!(
            "上传失败: {} ({}%): {}",
            task.source.name,
            task.progress,
            task.error.as_deref().unwrap_or("未知错误")
        );
    }

    info!(
        "上传结束: 成功 {}, 失败 {}, 未开始 {}, 耗时 {:.1}s",
        succeeded,
        failed,
        pending,
        started.elapsed().as_secs_f64()
    );

    if failed > 0 || pending > 0 {
        bail!("{} 个文件未能上传", failed + pending);
    }
    Ok(())
}

/// 扫描所有输入路径并生成上传队列
fn build_queue(paths: &[PathBuf], config: &AppConfig) -> anyhow::Result<UploadQueue> {
    let scanner = FolderScanner::with_options(ScanOptions::from_config(&config.upload));
    let mut queue = UploadQueue::new();
    let mut total_bytes = 0u64;

    for path in paths {
        for scanned in scanner.scan(path)? {
            let local_path = scanned.local_path.clone();
            match scanned.into_source() {
                Ok(source) => {
                    total_bytes += source.size;
                    queue.add_file(source);
                }
                Err(e) => warn!("跳过无法读取的文件: {} ({})", local_path.display(), e),
            }
        }
    }

    info!("待上传: {} 个文件, 共 {}", queue.len(), format_bytes(total_bytes));
    Ok(queue)
}

fn log_batch(result: &BatchResult) {
    if result.cancelled {
        warn!("批次已取消: 已处理 {} 个文件", result.total());
    }
    info!(
        "✓ 批次完成: 成功 {}, 失败 {}",
        result.success_count, result.error_count
    );
}
