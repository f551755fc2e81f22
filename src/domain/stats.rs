//! Full-scan aggregate statistics for dashboard panels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use super::record::Record;

pub const STATUS_FIELD: &str = "status";
pub const TYPE_FIELD: &str = "type";

/// Trailing window counted by `recent_count`.
pub const RECENT_WINDOW: Duration = Duration::days(7);

/// Derived collection summary; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    pub recent_count: u64,
}

impl AggregateStats {
    /// Fold every record of a collection scan taken at `scanned_at`.
    pub fn from_records<'a, I>(records: I, scanned_at: OffsetDateTime) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let recent_after = scanned_at - RECENT_WINDOW;
        let mut stats = Self::default();

        for record in records {
            stats.total += 1;

            if let Some(status) = record.field(STATUS_FIELD).and_then(bucket_key) {
                *stats.by_status.entry(status).or_insert(0) += 1;
            }
            if let Some(kind) = record.field(TYPE_FIELD).and_then(bucket_key) {
                *stats.by_type.entry(kind).or_insert(0) += 1;
            }
            if record
                .created_at_time()
                .is_some_and(|created_at| created_at > recent_after)
            {
                stats.recent_count += 1;
            }
        }

        stats
    }

    pub fn status_count(&self, status: &str) -> u64 {
        self.by_status.get(status).copied().unwrap_or(0)
    }
}

// Strings bucket verbatim; other scalars by their JSON text, so `0` and
// `false` get their own buckets rather than being skipped as falsy.
fn bucket_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::domain::record::{Document, Fields};

    fn record(id: &str, data: Value) -> Record {
        let data: Fields = match data {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        };
        Record::from_document(Document::new(id, data))
    }

    #[test]
    fn empty_scan_yields_zeroed_stats() {
        let records: Vec<Record> = Vec::new();
        let stats = AggregateStats::from_records(&records, OffsetDateTime::now_utc());
        assert_eq!(stats, AggregateStats::default());
        assert_eq!(
            serde_json::to_value(&stats).expect("serialize stats"),
            json!({ "total": 0, "byStatus": {}, "byType": {}, "recentCount": 0 })
        );
    }

    #[test]
    fn buckets_status_and_type_and_skips_missing() {
        let now = datetime!(2024-06-10 12:00 UTC);
        let records = vec![
            record("a", json!({ "status": "new", "type": "spill" })),
            record("b", json!({ "status": "new" })),
            record("c", json!({ "status": "resolved", "type": "debris" })),
            record("d", json!({ "status": null, "type": "" })),
            record("e", json!({ "priority": 3, "status": 2 })),
        ];

        let stats = AggregateStats::from_records(&records, now);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.status_count("new"), 2);
        assert_eq!(stats.status_count("resolved"), 1);
        assert_eq!(stats.status_count("2"), 1);
        assert_eq!(stats.by_status.len(), 3);
        assert_eq!(stats.by_type.get("spill"), Some(&1));
        assert_eq!(stats.by_type.get("debris"), Some(&1));
        assert_eq!(stats.by_type.len(), 2);
    }

    #[test]
    fn recent_count_uses_strict_seven_day_window() {
        let now = datetime!(2024-06-10 12:00 UTC);
        let records = vec![
            record("fresh", json!({ "createdAt": "2024-06-09T12:00:00.000Z" })),
            record("edge", json!({ "createdAt": "2024-06-03T12:00:00.000Z" })),
            record("old", json!({ "createdAt": "2024-05-01T00:00:00.000Z" })),
            record("garbled", json!({ "createdAt": "yesterday" })),
            record("missing", json!({})),
        ];

        let stats = AggregateStats::from_records(&records, now);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.recent_count, 1);
    }
}
