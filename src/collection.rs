//! Collection model and the list discipline behind every endpoint.
//!
//! A collection is one JSON array under one Redis key, newest record first.
//! Everything here is pure so the rules (dedupe, retention, targeted
//! deletes) can be tested without a store.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Newest-first retention cap on the uploads collection.
pub const RETENTION_CAP: usize = 100;

/// Ceiling on serialized image content, applied after recompression.
pub const IMAGE_CONTENT_LIMIT: usize = 500 * 1024;

/// Ceiling on serialized text content.
pub const TEXT_CONTENT_LIMIT: usize = 4 * 1024 * 1024;

/// Images above this serialized size are eligible for `clear-large-images`.
pub const LARGE_IMAGE_THRESHOLD: usize = 1024 * 1024;

/// The logical feeds this service fronts. Each maps to one fixed store key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    Uploads,
    WeeklyContent,
}

impl Collection {
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Uploads => "quiet-archive:uploads",
            Collection::WeeklyContent => "weekly-wonder:content",
        }
    }

    /// Only the uploads feed is capped; weekly content is curated by hand
    /// and stays small on its own.
    pub fn retention_cap(&self) -> Option<usize> {
        match self {
            Collection::Uploads => Some(RETENTION_CAP),
            Collection::WeeklyContent => None,
        }
    }
}

/// One submitted item. Stored records predate this service and may lack
/// fields, so decoding is lenient; POST validation is strict instead.
/// Unknown fields (weekly-content rows carry `title`, `link`, `notes`...)
/// round-trip through `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Size of the content as it will sit inside the stored JSON array,
    /// quotes and escapes included.
    pub fn content_size(&self) -> usize {
        serialized_size(&self.content)
    }
}

pub fn serialized_size(content: &str) -> usize {
    serde_json::to_string(content)
        .map(|s| s.len())
        .unwrap_or(content.len() + 2)
}

/// Remove records sharing a timestamp with an earlier record, first
/// occurrence wins. Records without a timestamp share one identity, so
/// only the first survives, matching how the feeds always behaved.
pub fn dedupe_by_timestamp(records: Vec<Record>) -> (Vec<Record>, usize) {
    let before = records.len();
    let mut seen: HashSet<Option<i64>> = HashSet::new();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| seen.insert(record.timestamp))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Timestamp for a freshly appended record. Timestamps identify records
/// within a collection, and rapid appends can land in the same millisecond;
/// the dedupe-on-read pass would then eat the newer record. Bump past the
/// newest stored timestamp when the clock has not moved.
pub fn next_timestamp(records: &[Record], now: i64) -> i64 {
    match records.iter().filter_map(|r| r.timestamp).max() {
        Some(newest) => now.max(newest.saturating_add(1)),
        None => now,
    }
}

/// Byte-equality duplicate check on the submission tuple; timestamps are
/// ignored so a retried POST is a no-op.
pub fn is_duplicate(records: &[Record], candidate: &Record) -> bool {
    records.iter().any(|existing| {
        existing.kind == candidate.kind
            && existing.content == candidate.content
            && existing.name == candidate.name
            && existing.city == candidate.city
    })
}

/// Prepend and enforce the retention cap, dropping the oldest records.
pub fn insert_newest(records: &mut Vec<Record>, record: Record, cap: Option<usize>) {
    records.insert(0, record);
    if let Some(cap) = cap {
        records.truncate(cap);
    }
}

/// Remove every record whose timestamp matches exactly. Records without
/// a timestamp never match.
pub fn remove_by_timestamp(records: Vec<Record>, timestamp: i64) -> (Vec<Record>, usize) {
    let before = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| record.timestamp != Some(timestamp))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Remove image records whose serialized content exceeds the threshold.
/// Non-image records are never touched.
pub fn remove_large_images(records: Vec<Record>, threshold: usize) -> (Vec<Record>, usize) {
    let before = records.len();
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|record| record.kind != "image" || record.content_size() <= threshold)
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str, content: &str, timestamp: Option<i64>) -> Record {
        Record {
            kind: kind.to_string(),
            content: content.to_string(),
            name: "ada".to_string(),
            city: "turin".to_string(),
            timestamp,
            extra: Map::new(),
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let records = vec![
            record("text", "a", Some(1)),
            record("text", "b", Some(2)),
            record("text", "a-again", Some(2)),
        ];

        let (kept, removed) = dedupe_by_timestamp(records);

        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].content, "a");
        assert_eq!(kept[1].content, "b");
    }

    #[test]
    fn dedupe_collapses_missing_timestamps() {
        let records = vec![
            record("text", "first", None),
            record("text", "second", None),
            record("text", "third", Some(3)),
        ];

        let (kept, removed) = dedupe_by_timestamp(records);

        assert_eq!(removed, 1);
        assert_eq!(kept[0].content, "first");
        assert_eq!(kept[1].content, "third");
    }

    #[test]
    fn insert_newest_prepends_and_truncates() {
        let mut records: Vec<Record> = (0..RETENTION_CAP as i64)
            .map(|i| record("text", &format!("r{i}"), Some(i)))
            .collect();
        records.reverse();

        insert_newest(&mut records, record("text", "newest", Some(999)), Some(RETENTION_CAP));

        assert_eq!(records.len(), RETENTION_CAP);
        assert_eq!(records[0].content, "newest");
        // r0 was the oldest, it falls off the end
        assert_eq!(records.last().unwrap().content, "r1");
    }

    #[test]
    fn insert_newest_without_cap_grows() {
        let mut records: Vec<Record> = (0..150)
            .map(|i| record("text", &format!("r{i}"), Some(i)))
            .collect();

        insert_newest(&mut records, record("text", "newest", Some(999)), None);

        assert_eq!(records.len(), 151);
    }

    #[test]
    fn next_timestamp_uses_clock_when_free() {
        let records = vec![record("text", "a", Some(100))];
        assert_eq!(next_timestamp(&records, 200), 200);
        assert_eq!(next_timestamp(&[], 200), 200);
    }

    #[test]
    fn next_timestamp_bumps_past_collisions() {
        let records = vec![
            record("text", "a", Some(200)),
            record("text", "b", Some(150)),
            record("text", "c", None),
        ];
        // same-millisecond append: the stored 200 would collide
        assert_eq!(next_timestamp(&records, 200), 201);
        assert_eq!(next_timestamp(&records, 180), 201);
    }

    #[test]
    fn duplicate_check_ignores_timestamp() {
        let records = vec![record("text", "hello", Some(1))];

        assert!(is_duplicate(&records, &record("text", "hello", Some(2))));
        assert!(!is_duplicate(&records, &record("text", "hello!", Some(2))));
        assert!(!is_duplicate(&records, &record("image", "hello", Some(2))));
    }

    #[test]
    fn remove_by_timestamp_targets_exact_match() {
        let records = vec![
            record("text", "a", Some(10)),
            record("image", "b", Some(20)),
            record("text", "c", None),
        ];

        let (kept, removed) = remove_by_timestamp(records, 20);

        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.timestamp != Some(20)));
    }

    #[test]
    fn remove_large_images_keeps_text() {
        let big = "x".repeat(LARGE_IMAGE_THRESHOLD + 1);
        let records = vec![
            record("image", &big, Some(1)),
            record("text", &big, Some(2)),
            record("image", "tiny", Some(3)),
        ];

        let (kept, removed) = remove_large_images(records, LARGE_IMAGE_THRESHOLD);

        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].kind, "text");
        assert_eq!(kept[1].content, "tiny");
    }

    #[test]
    fn record_round_trips_extra_fields() {
        let json = r#"{"type":"text","title":"a link","link":"https://x","timestamp":5}"#;

        let parsed: Record = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kind, "text");
        assert_eq!(parsed.extra.get("title").unwrap(), "a link");
        assert!(parsed.name.is_empty());

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back.get("link").unwrap(), "https://x");
        // empty fields stay absent instead of serializing as ""
        assert!(back.get("name").is_none());
    }

    #[test]
    fn serialized_size_counts_quotes_and_escapes() {
        assert_eq!(serialized_size("abc"), 5);
        assert_eq!(serialized_size("a\"b"), 6);
    }
}
