pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
pub mod remote;
pub mod steam;

pub use crate::core::{Operation, SyncConfig, SyncEngine, SyncFrontend, SyncReport};
pub use config::SyncDefaults;
pub use remote::{HttpListing, ListingEntry, RemoteListing};

/// 平台相关目录
pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        }
    }
}
