//! 应用配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// 默认的 sunrust fastdl 地址，文件名直接拼接，末尾斜杠必须保留
fn default_url() -> String {
    "http://142.44.142.152/fastdl/garrysmod/maps/".to_string()
}

fn default_min_date() -> String {
    "2018-10-01".to_string()
}

fn default_min_size() -> String {
    "10M".to_string()
}

/// 同步默认参数，命令行参数优先于这里的值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDefaults {
    /// 远端 maps 目录 URL
    #[serde(default = "default_url")]
    pub url: String,
    /// 升级阶段忽略早于该日期的远端地图（ISO 8601 日期）
    #[serde(default = "default_min_date")]
    pub min_date: String,
    /// 升级阶段忽略小于该大小的远端地图，例如 10M
    #[serde(default = "default_min_size")]
    pub min_size: String,
    /// maps 目录路径，缺省时自动查找 Garry's Mod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maps_dir: Option<String>,
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            url: default_url(),
            min_date: default_min_date(),
            min_size: default_min_size(),
            maps_dir: None,
        }
    }
}

impl SyncDefaults {
    /// 从配置文件加载，文件缺失或损坏时用默认值
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        if config_file.exists() {
            if let Ok(content) = fs::read_to_string(&config_file) {
                if let Ok(config) = serde_json::from_str::<serde_json::Value>(&content) {
                    if let Some(sync_config) = config.get("sync") {
                        if let Ok(sync) =
                            serde_json::from_value::<SyncDefaults>(sync_config.clone())
                        {
                            return sync;
                        }
                    }
                }
            }
        }
        Self::default()
    }

    /// 保存到配置文件，只覆盖 sync 一节，其他节保持原样
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let config_file = config_dir.join("config.json");

        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        config["sync"] = serde_json::to_value(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        fs::write(
            &config_file,
            serde_json::to_string_pretty(&config)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let defaults = SyncDefaults::load(dir.path());
        assert_eq!(defaults.min_size, "10M");
        assert!(defaults.maps_dir.is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut defaults = SyncDefaults::default();
        defaults.url = "http://example.com/maps/".to_string();
        defaults.maps_dir = Some("/srv/maps".to_string());
        defaults.save(dir.path()).unwrap();

        let loaded = SyncDefaults::load(dir.path());
        assert_eq!(loaded.url, "http://example.com/maps/");
        assert_eq!(loaded.maps_dir.as_deref(), Some("/srv/maps"));
    }

    #[test]
    fn test_save_preserves_other_sections() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"log": {"enabled": false}}"#,
        )
        .unwrap();

        SyncDefaults::default().save(dir.path()).unwrap();

        let content = fs::read_to_string(dir.path().join("config.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["log"]["enabled"], serde_json::json!(false));
        assert!(value.get("sync").is_some());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let defaults = SyncDefaults::load(dir.path());
        assert_eq!(defaults.url, default_url());
    }
}
