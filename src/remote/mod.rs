pub mod http;

use anyhow::Result;
use async_trait::async_trait;

pub use http::HttpListing;

// ============ 公共常量 ============

/// 列表抓取超时（秒）
pub const LISTING_TIMEOUT_SECS: u64 = 30;

/// 远端目录列表里的一条记录
///
/// 大小来自列表页，只有 MB 级精度；压缩文件的大小和解压后的
/// 本地文件天然对不上，所以下游只拿它做阈值过滤和展示。
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub name: String,
    pub modified: i64,
    pub size: u64,
}

/// 远端列表抓取接口
#[async_trait]
pub trait RemoteListing: Send + Sync {
    /// 抓取目录下所有条目
    async fn fetch_entries(&self) -> Result<Vec<ListingEntry>>;

    /// 获取来源名称（用于日志）
    fn name(&self) -> &str;
}

/// 解析 `10M`、`402K`、`1234` 这类人类可读大小，`-` 返回 None
pub fn parse_human_size(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return None;
    }

    let (number, factor) = match s.as_bytes()[s.len() - 1].to_ascii_uppercase() {
        b'K' => (&s[..s.len() - 1], 1024u64),
        b'M' => (&s[..s.len() - 1], 1024 * 1024),
        b'G' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };

    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some((value * factor as f64) as u64)
}
