//! 地图清单 —— 把本地文件元数据和远端列表条目统一成 MapRecord

use crate::core::version::parse_version;
use crate::remote::ListingEntry;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// 地图文件的两种后缀形式
///
/// `.bsp.bz2` 是 `.bsp` 的超串，判断后缀时必须先试压缩格式，
/// 否则压缩文件会被错认成未压缩文件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapExt {
    Compressed,
    Raw,
}

impl MapExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapExt::Compressed => ".bsp.bz2",
            MapExt::Raw => ".bsp",
        }
    }
}

/// 按最长后缀优先拆出（主干，后缀），两种后缀都不匹配时返回 None
pub fn split_extension(filename: &str) -> Option<(&str, MapExt)> {
    for ext in [MapExt::Compressed, MapExt::Raw] {
        if let Some(stem) = filename.strip_suffix(ext.as_str()) {
            return Some((stem, ext));
        }
    }
    None
}

/// 一个物理地图文件（本地或远端、压缩或未压缩）
///
/// 每次运行都从头构建，运行结束即丢弃，不落任何持久化索引。
#[derive(Debug, Clone, PartialEq)]
pub struct MapRecord {
    /// 地图标识，跨版本不变
    pub base_name: String,
    /// 版本后缀，文件名不带版本标记时为 None
    pub version: Option<String>,
    /// 修改时间（本地取 mtime，远端取列表时间），新旧判断只看这个
    pub modified: i64,
    /// 字节大小，远端来自列表页因此只是近似值
    pub size: u64,
    pub ext: MapExt,
}

impl MapRecord {
    /// 从 MapRecord 还原文件名，解析的精确逆运算
    pub fn filename(&self, with_ext: bool) -> String {
        let mut name = self.base_name.clone();
        if let Some(version) = &self.version {
            name.push('_');
            name.push_str(version);
        }
        if with_ext {
            name.push_str(self.ext.as_str());
        }
        name
    }

    /// 弱相等：只比较（地图名，版本），跨本地/远端、跨后缀识别同一张逻辑地图
    pub fn weak_eq(&self, other: &MapRecord) -> bool {
        self.base_name == other.base_name && self.version == other.version
    }
}

/// 从本地文件元数据构建记录，未知后缀返回 None（目录里混着别的文件很正常）
pub fn from_local(file_name: &str, size: u64, modified: i64) -> Option<MapRecord> {
    let (stem, ext) = split_extension(file_name)?;
    let (base_name, version) = parse_version(stem);
    Some(MapRecord {
        base_name,
        version,
        modified,
        size,
        ext,
    })
}

/// 从远端列表条目构建记录，未知后缀返回 None
pub fn from_remote(entry: &ListingEntry) -> Option<MapRecord> {
    let (stem, ext) = split_extension(&entry.name)?;
    let (base_name, version) = parse_version(stem);
    Some(MapRecord {
        base_name,
        version,
        modified: entry.modified,
        size: entry.size,
        ext,
    })
}

/// 扫描 maps 目录（平坦目录，不递归），读不到元数据的条目跳过
pub fn scan_local(maps_dir: &Path) -> Result<Vec<MapRecord>> {
    if !maps_dir.is_dir() {
        anyhow::bail!("maps 目录不存在: {}", maps_dir.display());
    }

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(maps_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let Some(file_name) = entry.file_name().to_str() else {
            skipped += 1;
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                debug!("读取元数据失败，跳过 {}: {}", file_name, e);
                skipped += 1;
                continue;
            }
        };

        let modified = metadata
            .modified()
            .with_context(|| format!("读取修改时间失败: {}", file_name))?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        match from_local(file_name, metadata.len(), modified) {
            Some(record) => records.push(record),
            None => {
                debug!("跳过非地图文件: {}", file_name);
                skipped += 1;
            }
        }
    }

    info!(
        "本地扫描完成: {} 个地图文件, {} 个被跳过",
        records.len(),
        skipped
    );
    Ok(records)
}

/// 把列表条目批量转成记录，未知后缀的条目静默丢弃
pub fn build_remote(entries: &[ListingEntry]) -> Vec<MapRecord> {
    entries.iter().filter_map(from_remote).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    pub(crate) fn record(
        base: &str,
        version: Option<&str>,
        modified: i64,
        size: u64,
        ext: MapExt,
    ) -> MapRecord {
        MapRecord {
            base_name: base.to_string(),
            version: version.map(|v| v.to_string()),
            modified,
            size,
            ext,
        }
    }

    #[test]
    fn test_split_extension_longest_first() {
        assert_eq!(
            split_extension("zs_foo_v2.bsp.bz2"),
            Some(("zs_foo_v2", MapExt::Compressed))
        );
        assert_eq!(
            split_extension("zs_foo_v2.bsp"),
            Some(("zs_foo_v2", MapExt::Raw))
        );
        assert_eq!(split_extension("readme.txt"), None);
        assert_eq!(split_extension("archive.bz2"), None);
    }

    #[test]
    fn test_from_local_parses_version() {
        let r = from_local("zs_obj_filth_v4.bsp", 123, 456).unwrap();
        assert_eq!(r.base_name, "zs_obj_filth");
        assert_eq!(r.version.as_deref(), Some("v4"));
        assert_eq!(r.modified, 456);
        assert_eq!(r.size, 123);
        assert_eq!(r.ext, MapExt::Raw);

        assert!(from_local("thumbs.db", 1, 1).is_none());
    }

    #[test]
    fn test_filename_roundtrip() {
        let r = record("zs_fortress", Some("a2"), 0, 0, MapExt::Compressed);
        assert_eq!(r.filename(true), "zs_fortress_a2.bsp.bz2");
        assert_eq!(r.filename(false), "zs_fortress_a2");

        let reparsed = from_local(&r.filename(true), 0, 0).unwrap();
        assert!(reparsed.weak_eq(&r));

        let no_version = record("zs_infirmary", None, 0, 0, MapExt::Raw);
        assert_eq!(no_version.filename(true), "zs_infirmary.bsp");
    }

    #[test]
    fn test_weak_eq_ignores_metadata() {
        let a = record("zs_foo", Some("v2"), 1, 100, MapExt::Raw);
        let b = record("zs_foo", Some("v2"), 999, 5, MapExt::Compressed);
        let c = record("zs_foo", Some("v3"), 1, 100, MapExt::Raw);
        assert!(a.weak_eq(&b));
        assert!(!a.weak_eq(&c));
    }

    #[test]
    fn test_scan_local_filters_non_maps() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("zs_foo_v2.bsp"), b"data").unwrap();
        fs::write(dir.path().join("zs_bar.bsp.bz2"), b"data").unwrap();
        fs::write(dir.path().join("notes.txt"), b"data").unwrap();
        fs::create_dir(dir.path().join("zs_sub.bsp")).unwrap();

        let mut records = scan_local(dir.path()).unwrap();
        records.sort_by(|a, b| a.base_name.cmp(&b.base_name));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].base_name, "zs_bar");
        assert_eq!(records[0].ext, MapExt::Compressed);
        assert_eq!(records[1].base_name, "zs_foo");
        assert_eq!(records[1].size, 4);
    }

    #[test]
    fn test_scan_local_missing_dir() {
        assert!(scan_local(Path::new("/nonexistent/maps")).is_err());
    }

    mod roundtrip_property {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // 地图名全字母段不可能命中版本语法，任意版本拼上去都能原样解析回来
            #[test]
            fn parse_inverts_build(
                base in proptest::string::string_regex("zs_[a-z]{3,8}(_[a-z]{3,8}){0,2}").unwrap(),
                version in proptest::option::of(proptest::string::string_regex(
                    "v[0-9]{1,3}[a-z]?|[0-9]{1,2}|20[0-9]{2}|20[0-9]{2}_[a-z][0-9]|[a-z][0-9]|[a-z][0-9]_[0-9]"
                ).unwrap()),
            ) {
                let record = MapRecord {
                    base_name: base.clone(),
                    version: version.clone(),
                    modified: 0,
                    size: 0,
                    ext: MapExt::Raw,
                };
                let parsed = from_local(&record.filename(true), 0, 0).unwrap();
                prop_assert_eq!(parsed.base_name, base);
                prop_assert_eq!(parsed.version, version);
            }
        }
    }
}
