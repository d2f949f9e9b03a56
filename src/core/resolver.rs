//! 版本归并 —— 每个地图名只保留最新的一条记录

use crate::core::inventory::MapRecord;
use std::collections::HashMap;

/// 按地图名分组并取每组最新的记录
///
/// 新旧只看 `modified`。修改时间完全相同时比较版本号字符串，
/// 无版本号视为最小，保证结果是确定的。
pub fn newest_per_name(records: &[MapRecord]) -> HashMap<String, MapRecord> {
    let mut newest: HashMap<String, MapRecord> = HashMap::new();

    for record in records {
        match newest.get_mut(&record.base_name) {
            Some(current) => {
                if is_newer(record, current) {
                    *current = record.clone();
                }
            }
            None => {
                newest.insert(record.base_name.clone(), record.clone());
            }
        }
    }

    newest
}

fn is_newer(a: &MapRecord, b: &MapRecord) -> bool {
    (a.modified, a.version.as_deref()) > (b.modified, b.version.as_deref())
}
