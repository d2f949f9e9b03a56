//! 传输管线 —— 流式下载、解压、原子替换
//!
//! 新旧判断完全依赖落盘文件的 mtime/大小，半成品文件一旦带着新
//! 时间戳出现在最终路径上就会被永远当成最新版。所以下载和解压都
//! 在临时文件上进行，只有解压完整成功才用一次 rename 替换目标，
//! 任何失败或取消都只丢弃临时产物。

use crate::core::diff::MapAction;
use crate::core::inventory::{MapExt, MapRecord};
use futures::{Stream, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

// ============ 公共常量 ============

/// 非流式请求超时（秒）- 建连、响应头
pub const OP_TIMEOUT_SECS: u64 = 30;
/// 流式读取单块超时（秒）
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 速度平滑系数，指数滑动平均里新样本的权重
const SPEED_ALPHA: f64 = 0.7;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("请求超时")]
    Timeout,
    #[error("响应缺少 Content-Length")]
    MissingLength,
    #[error("下载不完整: {got}/{expected} 字节")]
    Truncated { got: u64, expected: u64 },
    #[error("操作已取消")]
    Cancelled,
    #[error("解压失败: {0}")]
    Decompress(#[source] std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 进度回调接口，下载循环每收一块调用一次
///
/// 回调在传输线程上同步执行，实现方不能在里面做耗时操作。
pub trait ProgressSink: Send + Sync {
    fn report(&self, bytes_so_far: u64, total: u64, speed: f64, eta_secs: f64);
}

/// 指数滑动平均速度估计，用第一块的瞬时速度做种子
struct SpeedEstimator {
    avg: Option<f64>,
}

impl SpeedEstimator {
    fn new() -> Self {
        Self { avg: None }
    }

    fn update(&mut self, bytes: usize, elapsed_secs: f64) -> f64 {
        if elapsed_secs > 0.0 {
            let instant = bytes as f64 / elapsed_secs;
            let avg = match self.avg {
                Some(prev) => SPEED_ALPHA * instant + (1.0 - SPEED_ALPHA) * prev,
                None => instant,
            };
            self.avg = Some(avg);
        }
        self.avg.unwrap_or(0.0)
    }

    fn eta_secs(&self, remaining: u64) -> f64 {
        match self.avg {
            Some(speed) if speed > 0.0 => remaining as f64 / speed,
            _ => 0.0,
        }
    }
}

/// 下载一条升级并落盘，返回下载的字节数（压缩大小）
///
/// 服务器只提供压缩格式，所以远端文件名固定用压缩后缀拼。
pub async fn fetch_and_install(
    client: &reqwest::Client,
    action: &MapAction,
    base_url: &str,
    maps_dir: &Path,
    sink: &dyn ProgressSink,
    cancel: &AtomicBool,
) -> Result<u64, TransferError> {
    let stem = action.new.filename(false);
    let remote_name = format!("{}{}", stem, MapExt::Compressed.as_str());
    let url = format!("{}{}", base_url, urlencoding::encode(&remote_name));

    debug!("开始下载: {}", url);

    let response = tokio::time::timeout(
        Duration::from_secs(OP_TIMEOUT_SECS),
        client.get(&url).send(),
    )
    .await
    .map_err(|_| TransferError::Timeout)??
    .error_for_status()?;

    let total = response
        .content_length()
        .ok_or(TransferError::MissingLength)?;

    let stream = Box::pin(response.bytes_stream().map(|c| c.map_err(TransferError::Http)));
    install_from_stream(stream, total, &stem, maps_dir, sink, cancel).await?;
    Ok(total)
}

/// 把压缩字节流装进 maps 目录：暂存 → 解压 → 原子替换
///
/// 和网络层拆开，测试可以直接喂内存字节流验证原子性。
pub async fn install_from_stream<S, B>(
    stream: S,
    total: u64,
    stem: &str,
    maps_dir: &Path,
    sink: &dyn ProgressSink,
    cancel: &AtomicBool,
) -> Result<PathBuf, TransferError>
where
    S: Stream<Item = Result<B, TransferError>> + Unpin,
    B: AsRef<[u8]>,
{
    let final_path = maps_dir.join(format!("{}{}", stem, MapExt::Raw.as_str()));
    let staging_path = maps_dir.join(format!("{}{}.part", stem, MapExt::Compressed.as_str()));
    let extracted_path = maps_dir.join(format!("{}{}.part", stem, MapExt::Raw.as_str()));

    // 无论哪条路径退出都清掉临时文件；成功时 extracted 已被
    // rename 走，删除是无害的空操作
    let staging_cleanup = staging_path.clone();
    let extracted_cleanup = extracted_path.clone();
    scopeguard::defer! {
        let _ = std::fs::remove_file(&staging_cleanup);
        let _ = std::fs::remove_file(&extracted_cleanup);
    }

    download_to_staging(stream, total, &staging_path, sink, cancel).await?;
    decompress(&staging_path, &extracted_path).await?;
    tokio::fs::rename(&extracted_path, &final_path).await?;

    debug!("安装完成: {}", final_path.display());
    Ok(final_path)
}

/// 分块写入暂存文件，每块之后上报一次进度
async fn download_to_staging<S, B>(
    mut stream: S,
    total: u64,
    staging_path: &Path,
    sink: &dyn ProgressSink,
    cancel: &AtomicBool,
) -> Result<(), TransferError>
where
    S: Stream<Item = Result<B, TransferError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut out = tokio::fs::File::create(staging_path).await?;
    let mut bytes_so_far = 0u64;
    let mut speed = SpeedEstimator::new();
    let mut last_chunk_at = Instant::now();

    loop {
        let next = tokio::time::timeout(Duration::from_secs(IO_TIMEOUT_SECS), stream.next())
            .await
            .map_err(|_| TransferError::Timeout)?;

        let Some(chunk) = next else {
            break;
        };

        if cancel.load(Ordering::SeqCst) {
            return Err(TransferError::Cancelled);
        }

        let chunk = chunk?;
        let data = chunk.as_ref();
        out.write_all(data).await?;

        bytes_so_far += data.len() as u64;
        let elapsed = last_chunk_at.elapsed().as_secs_f64();
        last_chunk_at = Instant::now();

        let avg = speed.update(data.len(), elapsed);
        let eta = speed.eta_secs(total.saturating_sub(bytes_so_far));
        sink.report(bytes_so_far, total, avg, eta);
    }

    out.flush().await?;

    if bytes_so_far != total {
        return Err(TransferError::Truncated {
            got: bytes_so_far,
            expected: total,
        });
    }
    Ok(())
}

/// bz2 解压是纯 CPU + 阻塞 IO，丢到阻塞线程池里跑
async fn decompress(src: &Path, dst: &Path) -> Result<(), TransferError> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), TransferError> {
        let input = std::fs::File::open(&src)?;
        let mut decoder = bzip2::read::BzDecoder::new(std::io::BufReader::new(input));
        let mut output = std::io::BufWriter::new(std::fs::File::create(&dst)?);
        std::io::copy(&mut decoder, &mut output).map_err(TransferError::Decompress)?;
        output.flush()?;
        Ok(())
    })
    .await
    .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
}

/// 解压一个已存在的本地压缩包（补救之前没做完的解压）
///
/// 走同样的临时文件 + rename 纪律，压缩包本身保留，之后会被
/// 当成冗余压缩包清理。
pub async fn extract_local(record: &MapRecord, maps_dir: &Path) -> Result<PathBuf, TransferError> {
    let stem = record.filename(false);
    let source_path = maps_dir.join(format!("{}{}", stem, MapExt::Compressed.as_str()));
    let final_path = maps_dir.join(format!("{}{}", stem, MapExt::Raw.as_str()));
    let extracted_path = maps_dir.join(format!("{}{}.part", stem, MapExt::Raw.as_str()));

    let extracted_cleanup = extracted_path.clone();
    scopeguard::defer! {
        let _ = std::fs::remove_file(&extracted_cleanup);
    }

    decompress(&source_path, &extracted_path).await?;
    tokio::fs::rename(&extracted_path, &final_path).await?;
    Ok(final_path)
}
