//! 参数解析与交互式输入输出
//!
//! 引擎只产出数据，所有打印、确认、进度条都在这一层。

use crate::core::diff::MapAction;
use crate::core::engine::{Operation, RemovalKind, SyncFrontend};
use crate::core::inventory::MapRecord;
use crate::core::transfer::ProgressSink;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use clap::Parser;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// 同步 download/maps 目录与服务器的地图列表
#[derive(Debug, Parser)]
#[command(name = "mapsync", version)]
pub struct Args {
    /// 服务器 maps 目录的 URL
    #[arg(short, long)]
    pub url: Option<String>,

    /// 升级阶段忽略早于该日期的远端地图（ISO 8601，例如 2018-10-23）
    #[arg(short = 'd', long)]
    pub mindate: Option<String>,

    /// 升级阶段忽略小于该大小的远端地图，例如 10M
    #[arg(short = 's', long)]
    pub minsize: Option<String>,

    /// maps 目录路径，缺省时自动查找 Garry's Mod
    #[arg(short = 'm', long)]
    pub maps: Option<PathBuf>,

    /// 要执行的操作: all, upgrade, clean_orphans, clean_superseded,
    /// clean_compressed, extract
    #[arg(default_value = "all")]
    pub operations: Vec<String>,
}

/// 把操作名列表翻译成操作集，`all` 展开成默认集
pub fn parse_operations(names: &[String]) -> Result<Vec<Operation>> {
    if names.is_empty() || names == ["all"] {
        return Ok(Operation::DEFAULT_SET.to_vec());
    }

    names
        .iter()
        .map(|name| {
            Operation::parse(name).with_context(|| format!("不认识的操作: {}", name))
        })
        .collect()
}

/// 解析 ISO 8601 日期成当天零点（UTC）的时间戳
pub fn read_date(s: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("日期格式不对: {}（期望 2018-10-23 这样的格式）", s))?;
    let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
        bail!("日期无效: {}", s);
    };
    Ok(midnight.and_utc().timestamp())
}

/// 字节数显示成 MB
pub fn mb_fmt(bytes: u64) -> String {
    let factor = 1024 * 1024;
    format!("{}M", (bytes + factor / 2) / factor)
}

pub fn date_fmt(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "????-??-??".to_string())
}

const MAX_NAME_LEN: usize = 30;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() < max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 3).collect();
        format!("{}...", cut)
    }
}

/// 终端 y/n 询问，回车取默认值
pub fn query_yes_no(question: &str, default_yes: bool) -> bool {
    let prompt = if default_yes { " [Y/n] " } else { " [y/N] " };

    loop {
        print!("{}{}", question, prompt);
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }

        match line.trim().to_lowercase().as_str() {
            "" => return default_yes,
            "y" | "ye" | "yes" => return true,
            "n" | "no" => return false,
            _ => println!("请回答 yes 或 no（或 y / n）。"),
        }
    }
}

fn version_or_unknown(version: Option<&str>) -> &str {
    version.unwrap_or("???")
}

/// 命令行前端：表格汇总 + y/n 确认 + 进度条
pub struct ConsoleFrontend {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleFrontend {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn print_record_line(record: &MapRecord) {
        println!(
            "{:<width$} {:<10} {:<12} ({})",
            truncate(&record.base_name, MAX_NAME_LEN),
            version_or_unknown(record.version.as_deref()),
            date_fmt(record.modified),
            mb_fmt(record.size),
            width = MAX_NAME_LEN + 2
        );
    }

    fn print_removal_summary(records: &[MapRecord]) {
        for record in records {
            Self::print_record_line(record);
        }
        let total: u64 = records.iter().map(|r| r.size).sum();
        println!();
        println!("总计可释放空间: {}", mb_fmt(total));
    }
}

impl Default for ConsoleFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleFrontend {
    fn report(&self, bytes_so_far: u64, total: u64, speed: f64, eta_secs: f64) {
        let guard = self.bar.lock().unwrap();
        if let Some(bar) = guard.as_ref() {
            if bar.length() != Some(total) {
                bar.set_length(total);
            }
            bar.set_position(bytes_so_far);
            bar.set_message(format!(
                "{}/s 预计 {:.0}s",
                HumanBytes(speed as u64),
                eta_secs
            ));
        }
    }
}

impl SyncFrontend for ConsoleFrontend {
    fn review_upgrades(&self, upgrades: &[MapAction]) -> bool {
        println!("可用升级:");
        for upgrade in upgrades {
            let new = &upgrade.new;
            let name = truncate(&new.base_name, MAX_NAME_LEN);
            let date = date_fmt(new.modified);
            let size = mb_fmt(new.size);

            match &upgrade.old {
                Some(old) => {
                    let transition = format!(
                        "{} -> {}",
                        version_or_unknown(old.version.as_deref()),
                        version_or_unknown(new.version.as_deref())
                    );
                    println!(
                        "{:<width$} {:<10} {:<12} ({})",
                        name,
                        transition,
                        date,
                        size,
                        width = MAX_NAME_LEN + 2
                    );
                }
                None => {
                    println!(
                        "{:<width$} {:<10} {:<12} ({}) 新地图",
                        name,
                        version_or_unknown(new.version.as_deref()),
                        date,
                        size,
                        width = MAX_NAME_LEN + 2
                    );
                }
            }
        }
        println!();
        let total: u64 = upgrades.iter().map(|u| u.new.size).sum();
        println!("总下载大小: {}", mb_fmt(total));

        let go = query_yes_no("继续升级?", true);
        if !go {
            println!("升级已取消!");
        }
        go
    }

    fn review_removals(&self, kind: RemovalKind, records: &[MapRecord]) -> bool {
        let (header, prompt, cancel_msg) = match kind {
            RemovalKind::Orphan => (
                "发现孤儿地图（上游已下架）:",
                "删除所有孤儿地图?",
                "没有删除孤儿地图。",
            ),
            RemovalKind::Superseded => (
                "发现过期的旧版本:",
                "删除所有旧版本?",
                "没有删除旧版本。",
            ),
            RemovalKind::Redundant => (
                "发现冗余的 .bz2 文件（已经解压过）!",
                "删除所有冗余文件?",
                "没有删除 .bz2 文件。",
            ),
        };

        println!("{}", header);
        Self::print_removal_summary(records);

        let go = query_yes_no(prompt, true);
        if !go {
            println!("{}", cancel_msg);
        }
        go
    }

    fn review_extractions(&self, records: &[MapRecord]) -> bool {
        println!("发现未解压的 .bz2 文件!");
        for record in records {
            Self::print_record_line(record);
        }

        let go = query_yes_no("全部解压?", true);
        if !go {
            println!("没有解压任何文件。");
        }
        go
    }

    fn transfer_started(&self, record: &MapRecord) {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .expect("进度条模板无效")
            .progress_chars("#>-"),
        );
        println!("下载 {}", record.filename(false));
        *self.bar.lock().unwrap() = Some(bar);
    }

    fn transfer_finished(&self, _record: &MapRecord) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}
