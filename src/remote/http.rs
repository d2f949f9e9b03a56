use super::{ListingEntry, RemoteListing, LISTING_TIMEOUT_SECS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::time::Duration;
use tracing::debug;

/// 基于 HTTP 目录索引页（Apache 风格）的远端列表
pub struct HttpListing {
    client: reqwest::Client,
    url: String,
    name: String,
}

impl HttpListing {
    pub fn new(url: &str) -> Result<Self> {
        // 末尾斜杠必须有，文件名是直接拼接上去的
        let url = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{}/", url)
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LISTING_TIMEOUT_SECS))
            .build()
            .context("创建 HTTP 客户端失败")?;

        let name = format!("http:{}", url);
        Ok(Self { client, url, name })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteListing for HttpListing {
    async fn fetch_entries(&self) -> Result<Vec<ListingEntry>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("请求列表失败: {}", self.url))?
            .error_for_status()
            .with_context(|| format!("列表请求被拒绝: {}", self.url))?;

        let body = response.text().await.context("读取列表响应失败")?;
        let entries = parse_index(&body);
        debug!("列表解析完成: {} 个条目", entries.len());
        Ok(entries)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 解析目录索引 HTML，每行形如
/// `<a href="zs_foo_v2.bsp.bz2">zs_foo_v2.bsp.bz2</a>  23-Oct-2018 14:01  4.2M`
///
/// 解析不了的行直接跳过，索引页里混着排序链接和上级目录链接是常态。
pub(crate) fn parse_index(html: &str) -> Vec<ListingEntry> {
    let mut entries = Vec::new();

    for line in html.lines() {
        let Some(href_start) = line.find("<a href=\"") else {
            continue;
        };
        let rest = &line[href_start + "<a href=\"".len()..];
        let Some(href_end) = rest.find('"') else {
            continue;
        };
        let href = &rest[..href_end];

        // 排序链接、绝对路径、上级目录和子目录都不是文件
        if href.is_empty()
            || href.starts_with('?')
            || href.starts_with('/')
            || href.starts_with("..")
            || href.ends_with('/')
        {
            continue;
        }

        let name = match urlencoding::decode(href) {
            Ok(n) => n.into_owned(),
            Err(_) => {
                debug!("跳过无法解码的链接: {}", href);
                continue;
            }
        };

        // 时间和大小在 </a> 之后的自由文本里
        let Some(tail_start) = rest.find("</a>") else {
            continue;
        };
        let tail = &rest[tail_start + "</a>".len()..];
        let fields: Vec<&str> = tail.split_whitespace().collect();
        if fields.len() < 3 {
            debug!("跳过缺少时间或大小的行: {}", name);
            continue;
        }

        let Some(modified) = parse_listing_date(fields[0], fields[1]) else {
            debug!("跳过时间无法解析的行: {} {} {}", name, fields[0], fields[1]);
            continue;
        };
        let Some(size) = super::parse_human_size(fields[2]) else {
            continue;
        };

        entries.push(ListingEntry {
            name,
            modified,
            size,
        });
    }

    entries
}

/// Apache 默认是 `23-Oct-2018 14:01`，fancyindex 常用 `2018-10-23 14:01`
fn parse_listing_date(date: &str, time: &str) -> Option<i64> {
    let joined = format!("{} {}", date, time);
    for fmt in ["%d-%b-%Y %H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&joined, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    None
}
