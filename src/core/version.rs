//! 地图文件名的版本后缀解析
//!
//! 同一张地图的不同修订版靠文件名末尾的版本后缀区分，例如
//! `zs_obj_filth_v4` 和 `zs_obj_filth_v5`。后缀语法用手写解析器实现，
//! 不依赖任何正则引擎的回溯语义，保证各平台行为一致。

/// 游戏模式标记。下划线紧跟在该标记之后时不作为版本分隔符，
/// `zs_18` 这类名字中 `_18` 是地图名的一部分而不是版本号
const MODE_MARKER: &str = "zs";

/// 把候选名拆成（地图名，可选版本号）
///
/// 版本后缀锚定在字符串末尾，由一个下划线引入，且该下划线前面
/// 两个字符不能是模式标记。后缀本体是下列三种形式之一：
///   1. 可选 `v` + 若干数字 + 可选一个小写字母（`v2b`、`3`）
///   2. 2000 年代的四位年份，可再接 `_` + 小写字母 + 数字（`2018`、`2018_a2`）
///   3. 小写字母 + 数字，可再接 `_` + 数字（`a2`、`a2_3`）
/// 从左往右扫描下划线，第一个后缀能匹配的位置生效。
pub fn parse_version(candidate: &str) -> (String, Option<String>) {
    let bytes = candidate.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if b != b'_' {
            continue;
        }
        // 模式标记排除：下划线前两个字符恰好是标记时跳过
        if i >= MODE_MARKER.len() && &candidate[i - MODE_MARKER.len()..i] == MODE_MARKER {
            continue;
        }
        let suffix = &bytes[i + 1..];
        if is_version_suffix(suffix) {
            return (
                candidate[..i].to_string(),
                Some(candidate[i + 1..].to_string()),
            );
        }
    }

    (candidate.to_string(), None)
}

fn is_version_suffix(s: &[u8]) -> bool {
    !s.is_empty() && (matches_plain(s) || matches_year(s) || matches_letter_digit(s))
}

/// 形式 1：`v`? 数字+ 小写字母?
fn matches_plain(s: &[u8]) -> bool {
    let mut i = 0;
    if s[0] == b'v' {
        i = 1;
    }
    let digits_start = i;
    while i < s.len() && s[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return false;
    }
    if i < s.len() && s[i].is_ascii_lowercase() {
        i += 1;
    }
    i == s.len()
}

/// 形式 2：`20` 数字 数字 (`_` 小写字母 数字)?
fn matches_year(s: &[u8]) -> bool {
    if s.len() < 4 || &s[..2] != b"20" || !s[2].is_ascii_digit() || !s[3].is_ascii_digit() {
        return false;
    }
    match &s[4..] {
        [] => true,
        [b'_', l, d] => l.is_ascii_lowercase() && d.is_ascii_digit(),
        _ => false,
    }
}

/// 形式 3：小写字母 数字 (`_` 数字)?
fn matches_letter_digit(s: &[u8]) -> bool {
    if s.len() < 2 || !s[0].is_ascii_lowercase() || !s[1].is_ascii_digit() {
        return false;
    }
    match &s[2..] {
        [] => true,
        [b'_', d] => d.is_ascii_digit(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(name: &str) -> (String, Option<String>) {
        parse_version(name)
    }

    #[test]
    fn test_plain_suffix() {
        assert_eq!(parsed("zs_obj_filth_v4"), ("zs_obj_filth".into(), Some("v4".into())));
        assert_eq!(parsed("zs_abandoned_mall_v2b"), ("zs_abandoned_mall".into(), Some("v2b".into())));
        assert_eq!(parsed("ze_minecraft_3"), ("ze_minecraft".into(), Some("3".into())));
    }

    #[test]
    fn test_year_suffix() {
        assert_eq!(parsed("zs_breakfloor_2018"), ("zs_breakfloor".into(), Some("2018".into())));
        assert_eq!(parsed("zs_breakfloor_2018_a2"), ("zs_breakfloor".into(), Some("2018_a2".into())));
        // 2100 年代不算年份
        assert_eq!(parsed("zs_map_2118"), ("zs_map".into(), Some("2118".into()))); // 形式 1 仍然命中
        assert_eq!(parsed("zs_map_2118_a2"), ("zs_map_2118".into(), Some("a2".into())));
    }

    #[test]
    fn test_letter_digit_suffix() {
        assert_eq!(parsed("zs_fortress_a2"), ("zs_fortress".into(), Some("a2".into())));
        assert_eq!(parsed("zs_fortress_a2_3"), ("zs_fortress".into(), Some("a2_3".into())));
    }

    #[test]
    fn test_no_suffix() {
        assert_eq!(parsed("zs_infirmary"), ("zs_infirmary".into(), None));
        assert_eq!(parsed("ze_map"), ("ze_map".into(), None));
        assert_eq!(parsed("plain"), ("plain".into(), None));
    }

    #[test]
    fn test_mode_marker_exclusion() {
        // zs 后面的 _数字 属于地图名本身
        assert_eq!(parsed("zs_18"), ("zs_18".into(), None));
        assert_eq!(parsed("zs_2018"), ("zs_2018".into(), None));
        // 标记出现在中间的下划线前同样被跳过
        assert_eq!(parsed("zs_map_zs_2"), ("zs_map_zs_2".into(), None));
        // ze 不是标记，照常解析
        assert_eq!(parsed("ze_18"), ("ze".into(), Some("18".into())));
    }

    #[test]
    fn test_leftmost_match_wins() {
        // 第一个能构成后缀的下划线生效，而不是最后一个
        assert_eq!(parsed("zs_map_2_3"), ("zs_map_2".into(), Some("3".into())));
        assert_eq!(parsed("zs_map_a2_3"), ("zs_map".into(), Some("a2_3".into())));
    }

    #[test]
    fn test_partial_suffix_rejected() {
        // 后缀必须吃到字符串末尾
        assert_eq!(parsed("zs_v2_final"), ("zs_v2_final".into(), None));
        assert_eq!(parsed("zs_map_12ab"), ("zs_map_12ab".into(), None));
    }

    #[test]
    fn test_leading_underscore() {
        // 下划线在开头时前面不足两个字符，不可能是标记
        assert_eq!(parsed("_2018"), ("".into(), Some("2018".into())));
    }
}
