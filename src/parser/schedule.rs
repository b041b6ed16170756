//! `status schedule` formatter

use super::{parse_line, Record};
use serde_json::Value;

/// Group `status schedule` lines into one record per scheduled run.
///
/// The caller removes the header line first. `key=value` lines accumulate
/// and a blank line closes a non-empty record. A trailing record without a
/// closing blank line is dropped.
pub fn schedule_status<S: AsRef<str>>(lines: &[S]) -> Vec<Record> {
    let mut items = Vec::new();
    let mut item = Record::new();

    for line in lines {
        let line = line.as_ref();
        if let Some((key, value)) = parse_line(line) {
            item.insert(key.to_string(), Value::String(value.to_string()));
        } else if line.is_empty() && !item.is_empty() {
            items.push(std::mem::take(&mut item));
        }
    }

    items
}
