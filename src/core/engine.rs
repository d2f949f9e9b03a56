//! 同步引擎 —— 对一份本地清单快照按顺序执行选定的操作
//!
//! 引擎只算差异和执行动作，所有展示、确认都走注入的 SyncFrontend。
//! 执行是严格串行的：一次差异计算，然后每个确认过的批次逐个执行，
//! 没有并行下载，也没有跨运行的共享状态。

use crate::core::diff::{
    list_local_superseded, list_orphans, list_redundant_archives, list_unextracted_archives,
    list_upgrades, MapAction,
};
use crate::core::inventory::{self, MapRecord};
use crate::core::transfer::{self, ProgressSink, TransferError, OP_TIMEOUT_SECS};
use crate::remote::RemoteListing;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 可执行的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// 下载远端更新的地图
    Upgrade,
    /// 删除上游已下架的地图
    CleanOrphans,
    /// 删除升级后留下的旧版本
    CleanSuperseded,
    /// 删除已解压过的压缩包
    CleanCompressed,
    /// 补解压没解压完的压缩包
    Extract,
}

impl Operation {
    /// `all` 对应的默认操作集
    pub const DEFAULT_SET: &'static [Operation] = &[
        Operation::Upgrade,
        Operation::CleanOrphans,
        Operation::CleanCompressed,
    ];

    pub fn parse(name: &str) -> Option<Operation> {
        match name {
            "upgrade" => Some(Operation::Upgrade),
            "clean_orphans" => Some(Operation::CleanOrphans),
            "clean_superseded" => Some(Operation::CleanSuperseded),
            "clean_compressed" => Some(Operation::CleanCompressed),
            "extract" => Some(Operation::Extract),
            _ => None,
        }
    }
}

/// 待删除批次的类别，前端用它挑提示文案
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    Orphan,
    Superseded,
    Redundant,
}

/// 展示与确认接口
///
/// 引擎把算好的清单交给前端展示，前端返回是否执行该批次。
/// 引擎自己从不打印任何东西。
pub trait SyncFrontend: ProgressSink {
    fn review_upgrades(&self, upgrades: &[MapAction]) -> bool;
    fn review_removals(&self, kind: RemovalKind, records: &[MapRecord]) -> bool;
    fn review_extractions(&self, records: &[MapRecord]) -> bool;
    fn transfer_started(&self, record: &MapRecord);
    fn transfer_finished(&self, record: &MapRecord);
}

/// 引擎参数，全部由外层（CLI/配置）显式传入
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 远端 maps 目录 URL（带末尾斜杠）
    pub url: String,
    /// 本地 maps 目录
    pub maps_dir: PathBuf,
    /// 升级时忽略早于该时间戳的远端地图
    pub min_date: i64,
    /// 升级时忽略小于该字节数的远端地图
    pub min_size: u64,
}

/// 一次运行的结果汇总
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub maps_upgraded: u32,
    pub maps_removed: u32,
    pub maps_extracted: u32,
    pub bytes_downloaded: u64,
    /// 单项失败不中止批次，错误收集在这里
    pub errors: Vec<String>,
    /// 实际执行了的批次数（确认过且非空）
    pub batches_run: u32,
}

impl SyncReport {
    pub fn did_work(&self) -> bool {
        self.batches_run > 0
    }
}

/// 同步引擎
pub struct SyncEngine {
    config: SyncConfig,
    client: reqwest::Client,
    cancelled: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .build()
            .context("创建 HTTP 客户端失败")?;

        Ok(Self {
            config,
            client,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 取消标志，交给信号处理等外部代码置位
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 执行一轮同步
    ///
    /// 本地清单在开头扫一次做快照，删除类操作不回写快照，
    /// 各操作看到的都是运行开始时的目录状态。
    pub async fn run<F: SyncFrontend>(
        &self,
        operations: &[Operation],
        listing: &dyn RemoteListing,
        frontend: &F,
    ) -> Result<SyncReport> {
        let local = inventory::scan_local(&self.config.maps_dir)?;

        let needs_remote = operations
            .iter()
            .any(|op| matches!(op, Operation::Upgrade | Operation::CleanOrphans));
        let remote = if needs_remote {
            let entries = listing
                .fetch_entries()
                .await
                .with_context(|| format!("抓取远端列表失败: {}", listing.name()))?;
            inventory::build_remote(&entries)
        } else {
            Vec::new()
        };

        info!(
            "清单就绪: 本地 {} 条, 远端 {} 条",
            local.len(),
            remote.len()
        );

        let mut report = SyncReport::default();

        for op in operations {
            if self.is_cancelled() {
                warn!("同步被取消，剩余操作跳过");
                break;
            }

            match op {
                Operation::Upgrade => {
                    self.run_upgrades(&local, &remote, frontend, &mut report)
                        .await;
                }
                Operation::CleanOrphans => {
                    let orphans = list_orphans(&local, &remote);
                    self.run_removals(RemovalKind::Orphan, orphans, frontend, &mut report)
                        .await;
                }
                Operation::CleanSuperseded => {
                    let superseded = list_local_superseded(&local);
                    self.run_removals(RemovalKind::Superseded, superseded, frontend, &mut report)
                        .await;
                }
                Operation::CleanCompressed => {
                    let redundant = list_redundant_archives(&local);
                    self.run_removals(RemovalKind::Redundant, redundant, frontend, &mut report)
                        .await;
                }
                Operation::Extract => {
                    let unextracted = list_unextracted_archives(&local);
                    self.run_extractions(unextracted, frontend, &mut report).await;
                }
            }
        }

        info!(
            "同步结束: 升级 {}, 删除 {}, 解压 {}, 失败 {}",
            report.maps_upgraded,
            report.maps_removed,
            report.maps_extracted,
            report.errors.len()
        );
        Ok(report)
    }

    async fn run_upgrades<F: SyncFrontend>(
        &self,
        local: &[MapRecord],
        remote: &[MapRecord],
        frontend: &F,
        report: &mut SyncReport,
    ) {
        let upgrades = list_upgrades(local, remote, self.config.min_date, self.config.min_size);
        if upgrades.is_empty() {
            debug!("没有可用升级");
            return;
        }
        if !frontend.review_upgrades(&upgrades) {
            info!("升级批次被放弃");
            return;
        }
        report.batches_run += 1;

        for action in &upgrades {
            if self.is_cancelled() {
                warn!("升级队列被取消");
                break;
            }

            frontend.transfer_started(&action.new);
            let result = transfer::fetch_and_install(
                &self.client,
                action,
                &self.config.url,
                &self.config.maps_dir,
                frontend,
                &self.cancelled,
            )
            .await;
            frontend.transfer_finished(&action.new);

            match result {
                Ok(bytes) => {
                    report.maps_upgraded += 1;
                    report.bytes_downloaded += bytes;
                }
                Err(TransferError::Cancelled) => {
                    warn!("传输被取消: {}", action.new.filename(false));
                    break;
                }
                // 单张地图失败不影响队列里剩下的
                Err(e) => {
                    error!("升级失败 {}: {}", action.new.filename(false), e);
                    report
                        .errors
                        .push(format!("{}: {}", action.new.filename(false), e));
                }
            }
        }
    }

    async fn run_removals<F: SyncFrontend>(
        &self,
        kind: RemovalKind,
        records: Vec<MapRecord>,
        frontend: &F,
        report: &mut SyncReport,
    ) {
        if records.is_empty() {
            debug!("没有要删除的文件 ({:?})", kind);
            return;
        }
        if !frontend.review_removals(kind, &records) {
            info!("删除批次被放弃 ({:?})", kind);
            return;
        }
        report.batches_run += 1;

        for record in &records {
            let path = self.config.maps_dir.join(record.filename(true));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("已删除: {}", path.display());
                    report.maps_removed += 1;
                }
                // 文件已经没了就当删过了
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.maps_removed += 1;
                }
                Err(e) => {
                    warn!("删除失败 {}: {}", path.display(), e);
                    report.errors.push(format!("{}: {}", path.display(), e));
                }
            }
        }
    }

    async fn run_extractions<F: SyncFrontend>(
        &self,
        records: Vec<MapRecord>,
        frontend: &F,
        report: &mut SyncReport,
    ) {
        if records.is_empty() {
            debug!("没有要补解压的压缩包");
            return;
        }
        if !frontend.review_extractions(&records) {
            info!("解压批次被放弃");
            return;
        }
        report.batches_run += 1;

        for record in &records {
            if self.is_cancelled() {
                warn!("解压队列被取消");
                break;
            }
            match transfer::extract_local(record, &self.config.maps_dir).await {
                Ok(path) => {
                    debug!("已解压: {}", path.display());
                    report.maps_extracted += 1;
                }
                Err(e) => {
                    warn!("解压失败 {}: {}", record.filename(true), e);
                    report.errors.push(format!("{}: {}", record.filename(true), e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ListingEntry;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    struct FixedListing {
        entries: Vec<ListingEntry>,
    }

    #[async_trait]
    impl RemoteListing for FixedListing {
        async fn fetch_entries(&self) -> Result<Vec<ListingEntry>> {
            Ok(self.entries.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// 全部确认或全部拒绝的测试前端
    struct AutoFrontend {
        approve: bool,
        reviews: AtomicU32,
    }

    impl AutoFrontend {
        fn new(approve: bool) -> Self {
            Self {
                approve,
                reviews: AtomicU32::new(0),
            }
        }
    }

    impl ProgressSink for AutoFrontend {
        fn report(&self, _: u64, _: u64, _: f64, _: f64) {}
    }

    impl SyncFrontend for AutoFrontend {
        fn review_upgrades(&self, _: &[MapAction]) -> bool {
            self.reviews.fetch_add(1, Ordering::Relaxed);
            self.approve
        }
        fn review_removals(&self, _: RemovalKind, _: &[MapRecord]) -> bool {
            self.reviews.fetch_add(1, Ordering::Relaxed);
            self.approve
        }
        fn review_extractions(&self, _: &[MapRecord]) -> bool {
            self.reviews.fetch_add(1, Ordering::Relaxed);
            self.approve
        }
        fn transfer_started(&self, _: &MapRecord) {}
        fn transfer_finished(&self, _: &MapRecord) {}
    }

    fn engine_for(dir: &TempDir) -> SyncEngine {
        SyncEngine::new(SyncConfig {
            url: "http://localhost/maps/".to_string(),
            maps_dir: dir.path().to_path_buf(),
            min_date: 0,
            min_size: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_clean_orphans_removes_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zs_gone_v1.bsp"), b"x").unwrap();
        fs::write(dir.path().join("zs_kept_v1.bsp"), b"x").unwrap();

        let listing = FixedListing {
            entries: vec![ListingEntry {
                name: "zs_kept_v1.bsp.bz2".to_string(),
                modified: 100,
                size: 1,
            }],
        };
        let frontend = AutoFrontend::new(true);

        let report = engine_for(&dir)
            .run(&[Operation::CleanOrphans], &listing, &frontend)
            .await
            .unwrap();

        assert_eq!(report.maps_removed, 1);
        assert!(report.did_work());
        assert!(!dir.path().join("zs_gone_v1.bsp").exists());
        assert!(dir.path().join("zs_kept_v1.bsp").exists());
    }

    #[tokio::test]
    async fn test_declined_batch_leaves_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zs_gone_v1.bsp"), b"x").unwrap();

        let listing = FixedListing { entries: vec![] };
        let frontend = AutoFrontend::new(false);

        let report = engine_for(&dir)
            .run(&[Operation::CleanOrphans], &listing, &frontend)
            .await
            .unwrap();

        assert_eq!(report.maps_removed, 0);
        assert!(!report.did_work());
        assert!(dir.path().join("zs_gone_v1.bsp").exists());
    }

    #[tokio::test]
    async fn test_clean_compressed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zs_done_v1.bsp"), b"x").unwrap();
        fs::write(dir.path().join("zs_done_v1.bsp.bz2"), b"x").unwrap();
        fs::write(dir.path().join("zs_pending_v1.bsp.bz2"), b"x").unwrap();

        let listing = FixedListing { entries: vec![] };
        let frontend = AutoFrontend::new(true);

        let report = engine_for(&dir)
            .run(&[Operation::CleanCompressed], &listing, &frontend)
            .await
            .unwrap();

        // 只删已解压的那个压缩包
        assert_eq!(report.maps_removed, 1);
        assert!(!dir.path().join("zs_done_v1.bsp.bz2").exists());
        assert!(dir.path().join("zs_done_v1.bsp").exists());
        assert!(dir.path().join("zs_pending_v1.bsp.bz2").exists());
    }

    #[tokio::test]
    async fn test_extract_operation() {
        let dir = TempDir::new().unwrap();
        let payload = b"decompressed map".to_vec();
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        std::io::Write::write_all(&mut encoder, &payload).unwrap();
        fs::write(dir.path().join("zs_pending_v1.bsp.bz2"), encoder.finish().unwrap()).unwrap();

        let listing = FixedListing { entries: vec![] };
        let frontend = AutoFrontend::new(true);

        let report = engine_for(&dir)
            .run(&[Operation::Extract], &listing, &frontend)
            .await
            .unwrap();

        assert_eq!(report.maps_extracted, 1);
        assert_eq!(
            fs::read(dir.path().join("zs_pending_v1.bsp")).unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn test_empty_lists_skip_review() {
        let dir = TempDir::new().unwrap();
        let listing = FixedListing { entries: vec![] };
        let frontend = AutoFrontend::new(true);

        let report = engine_for(&dir)
            .run(
                &[
                    Operation::CleanOrphans,
                    Operation::CleanCompressed,
                    Operation::Extract,
                ],
                &listing,
                &frontend,
            )
            .await
            .unwrap();

        // 空清单不该打扰用户
        assert_eq!(frontend.reviews.load(Ordering::Relaxed), 0);
        assert!(!report.did_work());
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!(Operation::parse("upgrade"), Some(Operation::Upgrade));
        assert_eq!(Operation::parse("clean_orphans"), Some(Operation::CleanOrphans));
        assert_eq!(Operation::parse("bogus"), None);
    }
}
