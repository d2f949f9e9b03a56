//! 差异计算 —— 升级、孤儿、本地过期副本、冗余与未解压压缩包

use crate::core::inventory::{MapExt, MapRecord};
use crate::core::resolver::newest_per_name;
use std::collections::HashMap;

/// 参与升级/孤儿处理的地图名前缀
///
/// 这是业务过滤而不是解析规则，和清单构建分开放，以后支持别的
/// 游戏模式只需要改这里。
pub const ELIGIBLE_PREFIXES: &[&str] = &["zs_", "ze_"];

pub fn is_eligible(record: &MapRecord) -> bool {
    ELIGIBLE_PREFIXES
        .iter()
        .any(|p| record.base_name.starts_with(p))
}

/// 一次待执行的升级：old 是本地现状（新地图则为 None），new 是要下载的远端记录
#[derive(Debug, Clone)]
pub struct MapAction {
    pub old: Option<MapRecord>,
    pub new: MapRecord,
}

/// 计算可用升级
///
/// 远端先按前缀、大小、日期过滤，本地不过滤；两边各自归并到
/// 每名一条后，远端比本地严格新（或本地没有）的就是升级。
/// 输出按远端修改时间降序排，时间相同再按地图名排，保证可复现。
pub fn list_upgrades(
    local: &[MapRecord],
    remote: &[MapRecord],
    min_date: i64,
    min_size: u64,
) -> Vec<MapAction> {
    let filtered: Vec<MapRecord> = remote
        .iter()
        .filter(|r| is_eligible(r) && r.size >= min_size && r.modified >= min_date)
        .cloned()
        .collect();

    let fresh_remote = newest_per_name(&filtered);
    let fresh_local = newest_per_name(local);

    let mut actions: Vec<MapAction> = fresh_remote
        .values()
        .filter(|r| match fresh_local.get(&r.base_name) {
            Some(l) => l.modified < r.modified,
            None => true,
        })
        .map(|r| MapAction {
            old: fresh_local.get(&r.base_name).cloned(),
            new: r.clone(),
        })
        .collect();

    actions.sort_by(|a, b| {
        b.new
            .modified
            .cmp(&a.new.modified)
            .then_with(|| a.new.base_name.cmp(&b.new.base_name))
    });

    actions
}

/// 上游已经下架的本地地图：远端任何一条记录都和它不弱相等
pub fn list_orphans(local: &[MapRecord], remote: &[MapRecord]) -> Vec<MapRecord> {
    local
        .iter()
        .filter(|l| is_eligible(l))
        .filter(|l| !remote.iter().any(|r| l.weak_eq(r)))
        .cloned()
        .collect()
}

/// 升级后留下的旧版本地副本：不弱相等于本名下归并出的最新记录
///
/// 用弱相等而不是记录相等，这样最新版本的另一个后缀变体不会被
/// 误报成过期副本（那是冗余压缩包的问题，单独处理）。
pub fn list_local_superseded(local: &[MapRecord]) -> Vec<MapRecord> {
    let fresh = newest_per_name(local);
    local
        .iter()
        .filter(|r| match fresh.get(&r.base_name) {
            Some(newest) => !r.weak_eq(newest),
            None => false,
        })
        .cloned()
        .collect()
}

/// 按（地图名，版本）分的一组后缀变体
#[derive(Debug, Default, Clone)]
struct ExtGroup {
    raw: bool,
    compressed: Option<MapRecord>,
}

fn group_by_logical(local: &[MapRecord]) -> HashMap<String, ExtGroup> {
    let mut groups: HashMap<String, ExtGroup> = HashMap::new();
    for record in local {
        let group = groups.entry(record.filename(false)).or_default();
        match record.ext {
            MapExt::Raw => group.raw = true,
            MapExt::Compressed => group.compressed = Some(record.clone()),
        }
    }
    groups
}

/// 已经解压过、可以安全删除的压缩包：同组里两种后缀都在
pub fn list_redundant_archives(local: &[MapRecord]) -> Vec<MapRecord> {
    let mut redundant: Vec<MapRecord> = group_by_logical(local)
        .into_values()
        .filter(|g| g.raw)
        .filter_map(|g| g.compressed)
        .collect();
    redundant.sort_by(|a, b| a.filename(false).cmp(&b.filename(false)));
    redundant
}

/// 解压没做完、需要重试的压缩包：同组里只有压缩后缀
pub fn list_unextracted_archives(local: &[MapRecord]) -> Vec<MapRecord> {
    let mut unextracted: Vec<MapRecord> = group_by_logical(local)
        .into_values()
        .filter(|g| !g.raw)
        .filter_map(|g| g.compressed)
        .collect();
    unextracted.sort_by(|a, b| a.filename(false).cmp(&b.filename(false)));
    unextracted
}
