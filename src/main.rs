use anyhow::{Context, Result};
use clap::Parser;
use mapsync_lib::cli::{self, Args, ConsoleFrontend};
use mapsync_lib::logging::{get_log_dir, LogConfig, LogFileWriter};
use mapsync_lib::remote::{parse_human_size, HttpListing};
use mapsync_lib::{steam, SyncConfig, SyncDefaults, SyncEngine};
use tracing_subscriber::prelude::*;

/// 初始化日志系统
fn init_logging() {
    let log_dir = get_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let config = LogConfig::load(&log_dir);

    if !config.enabled {
        let subscriber = tracing_subscriber::registry();
        let _ = tracing::subscriber::set_global_default(subscriber);
        return;
    }

    let level = config.tracing_level();
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if let Ok(file_writer) = LogFileWriter::new(&log_dir, config.max_size_mb) {
        // 文件始终写，终端输出交给前端自己打印
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let defaults = SyncDefaults::load(&get_log_dir());

    // 命令行 > 配置文件 > 内置默认
    let url = args.url.unwrap_or(defaults.url);
    let min_date = cli::read_date(args.mindate.as_deref().unwrap_or(&defaults.min_date))?;
    let min_size_str = args.minsize.as_deref().unwrap_or(&defaults.min_size);
    let min_size = parse_human_size(min_size_str)
        .with_context(|| format!("大小格式不对: {}（期望 10M 这样的格式）", min_size_str))?;

    let maps_dir = args
        .maps
        .or_else(|| defaults.maps_dir.as_ref().map(Into::into))
        .or_else(steam::find_maps_dir)
        .context("没找到 Garry's Mod 的 maps 目录，请用 --maps 手动指定")?;

    let operations = cli::parse_operations(&args.operations)?;

    tracing::info!(
        "参数: url={}, maps={}, mindate={}, minsize={}",
        url,
        maps_dir.display(),
        min_date,
        min_size
    );

    let listing = HttpListing::new(&url)?;
    let engine = SyncEngine::new(SyncConfig {
        url: listing.url().to_string(),
        maps_dir,
        min_date,
        min_size,
    })?;

    // Ctrl-C 置取消标志，传输管线看到后丢弃半成品退出
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n收到中断信号，正在取消...");
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let frontend = ConsoleFrontend::new();
    let report = engine.run(&operations, &listing, &frontend).await?;

    for error in &report.errors {
        eprintln!("出错: {}", error);
    }

    if !report.did_work() {
        println!("没有要做的事!");
    } else {
        println!(
            "完成! 升级 {} 张, 删除 {} 个文件, 解压 {} 个, 下载 {}",
            report.maps_upgraded,
            report.maps_removed,
            report.maps_extracted,
            cli::mb_fmt(report.bytes_downloaded)
        );
    }

    if report.errors.is_empty() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
