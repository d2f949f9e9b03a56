//! Steam 游戏库自动发现
//!
//! 没给 `--maps` 参数时从默认 Steam 库和 libraryfolders.vdf 里
//! 找 Garry's Mod 的安装目录。找不到不算错误，由调用方决定报错文案。

use std::path::{Path, PathBuf};
use tracing::debug;

const GMOD_DIR: &str = "steamapps/common/GarrysMod";
const MAPS_SUBDIR: &str = "garrysmod/download/maps";

/// 找到 download/maps 目录，找不到返回 None
pub fn find_maps_dir() -> Option<PathBuf> {
    let main_library = default_library()?;

    if let Some(gmod) = gmod_in(&main_library) {
        return Some(gmod.join(MAPS_SUBDIR));
    }

    // 主库没有就翻 libraryfolders.vdf 里登记的其他库
    let vdf_path = main_library.join("steamapps/libraryfolders.vdf");
    let content = match std::fs::read_to_string(&vdf_path) {
        Ok(c) => c,
        Err(e) => {
            debug!("读取 libraryfolders.vdf 失败: {}", e);
            return None;
        }
    };

    for library in parse_library_folders(&content) {
        if let Some(gmod) = gmod_in(Path::new(&library)) {
            return Some(gmod.join(MAPS_SUBDIR));
        }
    }

    None
}

fn default_library() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        Some(PathBuf::from(r"C:\Program Files (x86)\Steam"))
    } else {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".steam/steam"))
    }
}

fn gmod_in(library: &Path) -> Option<PathBuf> {
    let gmod = library.join(GMOD_DIR);
    gmod.is_dir().then_some(gmod)
}

/// 从 libraryfolders.vdf 里抽出库路径
///
/// 兼容两种格式：新格式每个库是一个带 `"path"` 键的块，
/// 旧格式直接是 `"1" "D:\\Games"` 这样的数字键。不做完整的
/// KeyValues 解析，逐行抽带引号的键值对就够了。
pub(crate) fn parse_library_folders(content: &str) -> Vec<String> {
    let mut libraries = Vec::new();

    for line in content.lines() {
        let Some((key, value)) = quoted_pair(line) else {
            continue;
        };

        let is_path_key = key == "path" || key.bytes().all(|b| b.is_ascii_digit());
        if is_path_key && !key.is_empty() && !value.is_empty() {
            libraries.push(value.replace("\\\\", "\\"));
        }
    }

    libraries
}

/// 从一行里取出 `"key"  "value"` 两个引号串
fn quoted_pair(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split('"');
    parts.next()?;
    let key = parts.next()?;
    parts.next()?;
    let value = parts.next()?;
    Some((key, value))
}
