//! 本地照片扫描
//!
//! 输入可以是单个文件或文件夹，文件夹递归扫描，
//! 按扩展名、大小、隐藏文件规则过滤后生成待上传的 SourceFile

use crate::config::UploadConfig;
use crate::uploader::SourceFile;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 扫描到的文件
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 相对于扫描根目录的路径
    pub relative_path: PathBuf,
    /// 文件大小（字节）
    pub size: u64,
}

impl ScannedFile {
    /// 转为上传源文件（只记录路径，上传时再读取内容）
    pub fn into_source(self) -> std::io::Result<SourceFile> {
        SourceFile::from_path(&self.local_path)
    }
}

/// 扫描配置
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 最大文件大小（字节），超过的文件跳过
    pub max_file_size: Option<u64>,
    /// 最大文件数量，达到后停止扫描
    pub max_files: Option<usize>,
    /// 跳过隐藏文件和隐藏文件夹
    pub skip_hidden: bool,
    /// 允许的扩展名（小写），为空表示不限制
    pub allowed_extensions: Vec<String>,
}

impl ScanOptions {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            follow_symlinks: false,
            max_file_size: config.max_file_size(),
            max_files: None,
            skip_hidden: config.skip_hidden_files,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let ext = e.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            })
            .unwrap_or(false)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    // 根目录本身不按隐藏处理
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// 文件扫描器
#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    options: ScanOptions,
}

impl FolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 扫描文件或文件夹
    ///
    /// 文件夹结果按相对路径排序；单个文件只检查大小，
    /// 扩展名和隐藏规则只用于文件夹扫描
    pub fn scan<P: AsRef<Path>>(&self, root_path: P) -> Result<Vec<ScannedFile>> {
        let root_path = root_path.as_ref();

        let metadata = std::fs::metadata(root_path)
            .with_context(|| format!("扫描路径不存在: {}", root_path.display()))?;

        if metadata.is_file() {
            return Ok(self.scan_single(root_path, metadata.len()));
        }

        info!("开始扫描文件夹: {}", root_path.display());

        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(root_path)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| !(skip_hidden && is_hidden(e)));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("读取目录条目失败: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.options.extension_allowed(path) {
                debug!("跳过非图片文件: {}", path.display());
                continue;
            }

            let size = entry
                .metadata()
                .with_context(|| format!("读取文件元数据失败: {}", path.display()))?
                .len();
            if self.too_large(path, size) {
                continue;
            }

            let relative_path = path
                .strip_prefix(root_path)
                .with_context(|| {
                    format!(
                        "计算相对路径失败: {} (root: {})",
                        path.display(),
                        root_path.display()
                    )
                })?
                .to_path_buf();

            debug!("扫描到文件: {} ({})", relative_path.display(), format_bytes(size));
            files.push(ScannedFile {
                local_path: entry.into_path(),
                relative_path,
                size,
            });

            if let Some(max_files) = self.options.max_files {
                if files.len() >= max_files {
                    warn!("已达到最大文件数量限制 ({}), 停止扫描", max_files);
                    break;
                }
            }
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        info!(
            "文件夹扫描完成: {} 个文件，总大小 {}",
            files.len(),
            format_bytes(files.iter().map(|f| f.size).sum())
        );

        Ok(files)
    }

    fn scan_single(&self, path: &Path, size: u64) -> Vec<ScannedFile> {
        if self.too_large(path, size) {
            return Vec::new();
        }
        let relative_path = path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf());
        vec![ScannedFile {
            local_path: path.to_path_buf(),
            relative_path,
            size,
        }]
    }

    fn too_large(&self, path: &Path, size: u64) -> bool {
        match self.options.max_file_size {
            Some(max_size) if size > max_size => {
                warn!("跳过超大文件: {} ({})", path.display(), format_bytes(size));
                true
            }
            _ => false,
        }
    }
}

/// 格式化字节大小
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // root/
    // ├── a.jpg
    // ├── notes.txt
    // ├── .thumbs/
    // │   └── a_small.jpg
    // └── day2/
    //     ├── B.PNG
    //     └── .hidden.jpg
    fn create_album() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("a.jpg"), "aaaa").unwrap();
        fs::write(root.join("notes.txt"), "text").unwrap();
        fs::create_dir(root.join(".thumbs")).unwrap();
        fs::write(root.join(".thumbs/a_small.jpg"), "a").unwrap();
        fs::create_dir(root.join("day2")).unwrap();
        fs::write(root.join("day2/B.PNG"), "bbbbbbbb").unwrap();
        fs::write(root.join("day2/.hidden.jpg"), "h").unwrap();

        temp_dir
    }

    fn photo_options() -> ScanOptions {
        ScanOptions::from_config(&UploadConfig::default())
    }

    fn relative(files: &[ScannedFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_scan_photos_only() {
        let album = create_album();
        let files = FolderScanner::with_options(photo_options())
            .scan(album.path())
            .unwrap();

        assert_eq!(relative(&files), vec!["a.jpg", "day2/B.PNG"]);
        assert_eq!(files[1].size, 8);
    }

    #[test]
    fn test_scan_without_filters() {
        let album = create_album();
        let files = FolderScanner::new().scan(album.path()).unwrap();
        assert_eq!(files.len(), 5);
    }

    #[test]
    fn test_scan_single_file() {
        let album = create_album();
        let files = FolderScanner::with_options(photo_options())
            .scan(album.path().join("notes.txt"))
            .unwrap();

        // 显式指定的文件不做扩展名过滤
        assert_eq!(relative(&files), vec!["notes.txt"]);
        assert_eq!(files[0].local_path, album.path().join("notes.txt"));
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let result = FolderScanner::new().scan("/nonexistent/path");
        assert!(result.unwrap_err().to_string().contains("扫描路径不存在"));
    }

    #[test]
    fn test_scan_with_max_file_size() {
        let album = create_album();
        let options = ScanOptions {
            max_file_size: Some(5),
            ..photo_options()
        };

        let files = FolderScanner::with_options(options).scan(album.path()).unwrap();
        assert_eq!(relative(&files), vec!["a.jpg"]);
    }

    #[test]
    fn test_scan_with_max_files_limit() {
        let album = create_album();
        let options = ScanOptions {
            max_files: Some(1),
            ..photo_options()
        };

        let files = FolderScanner::with_options(options).scan(album.path()).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_into_source() {
        let album = create_album();
        let files = FolderScanner::with_options(photo_options())
            .scan(album.path())
            .unwrap();

        let source = files[1].clone().into_source().unwrap();
        assert_eq!(source.name, "B.PNG");
        assert_eq!(source.size, 8);
        assert_eq!(source.mime_type, "image/png");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1536 * 1024 * 1024), "1.50 GB");
    }
}
