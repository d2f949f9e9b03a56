//! 日志模块 - 文件日志与大小轮转

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// 日志配置，存在 config.json 的 log 一节里
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志文件大小上限（MB），超出后轮转
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        if config_file.exists() {
            if let Ok(content) = fs::read_to_string(&config_file) {
                if let Ok(config) = serde_json::from_str::<serde_json::Value>(&content) {
                    if let Some(log_config) = config.get("log") {
                        if let Ok(log) = serde_json::from_value::<LogConfig>(log_config.clone()) {
                            return log;
                        }
                    }
                }
            }
        }
        Self::default()
    }

    /// 配置的日志级别对应的 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 带大小轮转的日志文件写入器
///
/// 轮转检查放在 make_writer 里做：每条日志拿写入器之前看一眼
/// 文件大小，超限就把当前文件挪成 .old 再重开，写入路径本身
/// 只管写和刷。
pub struct LogFileWriter {
    file_path: PathBuf,
    max_size: u64,
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogFileWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join("mapsync.log");
        let max_size = (max_size_mb as u64) * 1024 * 1024;
        let file = Self::open_appending(&file_path)?;

        Ok(Self {
            file_path,
            max_size,
            inner: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    fn open_appending(file_path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(file_path)
    }

    /// 当前文件挪成 .old（旧备份直接顶掉），再重开新文件
    fn rotate_if_needed(&self) -> io::Result<()> {
        let size = match fs::metadata(&self.file_path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(()),
        };
        if size <= self.max_size {
            return Ok(());
        }

        let mut writer = self.inner.lock().unwrap();
        writer.flush()?;

        let backup = self.file_path.with_extension("log.old");
        let _ = fs::remove_file(&backup);
        fs::rename(&self.file_path, &backup)?;

        *writer = BufWriter::new(Self::open_appending(&self.file_path)?);
        Ok(())
    }
}

/// make_writer 返回的轻量句柄
pub struct LogWriterHandle {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl Write for LogWriterHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self.inner.lock().unwrap();
        let written = writer.write(buf)?;
        writer.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogWriterHandle;

    fn make_writer(&'a self) -> Self::Writer {
        let _ = self.rotate_if_needed();
        LogWriterHandle {
            inner: self.inner.clone(),
        }
    }
}

/// 日志目录跟配置目录放一起
pub fn get_log_dir() -> PathBuf {
    crate::dirs::config_dir()
        .map(|p| p.join("mapsync"))
        .unwrap_or_else(|| PathBuf::from(".mapsync"))
}
