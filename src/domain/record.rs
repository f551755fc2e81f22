//! Structured document records.
//!
//! Documents travel through the store as an identifier plus a JSON field map.
//! Callers see them as [`Record`]s: the reserved fields are lifted into typed
//! struct members and every other field stays in an ordered map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

/// Free-form document fields keyed by field name.
pub type Fields = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const INDEXED_AT_FIELD: &str = "indexedAt";

/// Field names owned by the access layer; caller payloads never set them.
pub const RESERVED_FIELDS: [&str; 4] = [
    ID_FIELD,
    CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
    INDEXED_AT_FIELD,
];

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// A stored document as returned by the backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// One entity instance with its server-assigned stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<i64>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    pub fn from_document(document: Document) -> Self {
        let Document { id, mut data } = document;
        data.remove(ID_FIELD);
        let created_at = take_string(&mut data, CREATED_AT_FIELD);
        let updated_at = take_string(&mut data, UPDATED_AT_FIELD);
        let indexed_at = data.remove(INDEXED_AT_FIELD).and_then(|value| value.as_i64());

        Self {
            id,
            created_at,
            updated_at,
            indexed_at,
            fields: data,
        }
    }

    /// Look up a non-reserved field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Value a store would sort this record by when ordering on `field`.
    pub fn sort_value(&self, field: &str) -> Option<Value> {
        match field {
            ID_FIELD => Some(Value::String(self.id.clone())),
            CREATED_AT_FIELD => self.created_at.clone().map(Value::String),
            UPDATED_AT_FIELD => self.updated_at.clone().map(Value::String),
            INDEXED_AT_FIELD => self.indexed_at.map(Value::from),
            other => self.fields.get(other).cloned(),
        }
    }

    pub fn created_at_time(&self) -> Option<OffsetDateTime> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

fn take_string(data: &mut Fields, key: &str) -> Option<String> {
    match data.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

/// Drop reserved fields from a caller-supplied payload.
pub fn strip_reserved(mut fields: Fields) -> Fields {
    for name in RESERVED_FIELDS {
        fields.remove(name);
    }
    fields
}

/// Server-assigned write stamp shared by every document of one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub timestamp: String,
    pub epoch_millis: i64,
}

impl Stamp {
    pub fn now() -> Self {
        Self::at(OffsetDateTime::now_utc())
    }

    pub fn at(instant: OffsetDateTime) -> Self {
        let utc = instant.to_offset(time::UtcOffset::UTC);
        let timestamp = utc
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| utc.unix_timestamp().to_string());
        let epoch_millis = i64::try_from(utc.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX);
        Self {
            timestamp,
            epoch_millis,
        }
    }

    /// Stamp a payload for insertion: `createdAt` and `updatedAt` share one value.
    pub fn apply_create(&self, mut fields: Fields) -> Fields {
        fields.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(self.timestamp.clone()),
        );
        self.apply_update_in_place(&mut fields);
        fields
    }

    /// Stamp a payload for a merge update; `createdAt` is left untouched.
    pub fn apply_update(&self, mut fields: Fields) -> Fields {
        self.apply_update_in_place(&mut fields);
        fields
    }

    fn apply_update_in_place(&self, fields: &mut Fields) {
        fields.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(self.timestamp.clone()),
        );
        fields.insert(INDEXED_AT_FIELD.to_string(), Value::from(self.epoch_millis));
    }
}

/// Parse an ISO-8601 timestamp as written by [`Stamp`] or any RFC 3339 producer.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}
