//! List parameters and cursor pagination helpers.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::application::store::{DocumentQuery, OrderDirection, StartAfter};
use crate::domain::record::{CREATED_AT_FIELD, ID_FIELD, INDEXED_AT_FIELD};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;
pub const DEFAULT_ORDER_BY: &str = CREATED_AT_FIELD;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListCursorPayload {
    order_by: String,
    value: Value,
    id: String,
}

/// Position after the last record of a list page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListCursor {
    order_by: String,
    value: Value,
    id: String,
}

impl ListCursor {
    pub fn new(order_by: impl Into<String>, value: Value, id: impl Into<String>) -> Self {
        Self {
            order_by: order_by.into(),
            value,
            id: id.into(),
        }
    }

    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn encode(&self) -> Result<String, PaginationError> {
        let payload = ListCursorPayload {
            order_by: self.order_by.clone(),
            value: self.value.clone(),
            id: self.id.clone(),
        };
        let serialized = serde_json::to_vec(&payload)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(serialized))
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: ListCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            order_by: payload.order_by,
            value: payload.value,
            id: payload.id,
        })
    }

    fn into_start_after(self) -> StartAfter {
        StartAfter {
            value: self.value,
            id: self.id,
        }
    }
}

/// Cursor-aware page result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("cursor was issued for ordering by `{issued}`, not `{requested}`")]
    CursorMismatch { issued: String, requested: String },
    #[error("limit must be between 1 and {max}, got {0}", max = MAX_LIMIT)]
    InvalidLimit(u32),
    #[error("cannot order by `{0}`")]
    InvalidOrderBy(String),
    #[error("cannot filter on `{0}`")]
    InvalidFilter(String),
}

/// Caller-supplied list parameters; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: Option<OrderDirection>,
    pub filters: BTreeMap<String, Value>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(field.into());
        self.order_direction = Some(direction);
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Apply defaults and reject malformed parameters.
    pub fn normalize(self) -> Result<ListQuery, PaginationError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(PaginationError::InvalidLimit(limit));
        }

        let order_by = self
            .order_by
            .map(|field| field.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ORDER_BY.to_string());
        if order_by.is_empty() || order_by == ID_FIELD || order_by == INDEXED_AT_FIELD {
            return Err(PaginationError::InvalidOrderBy(order_by));
        }

        let mut filters = BTreeMap::new();
        for (field, value) in self.filters {
            if field.is_empty() || field == ID_FIELD {
                return Err(PaginationError::InvalidFilter(field));
            }
            if !value.is_null() {
                filters.insert(field, value);
            }
        }

        let cursor = match self.cursor.filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                let decoded = ListCursor::decode(&raw)?;
                if decoded.order_by() != order_by {
                    return Err(PaginationError::CursorMismatch {
                        issued: decoded.order_by().to_string(),
                        requested: order_by,
                    });
                }
                Some((raw, decoded))
            }
            None => None,
        };

        Ok(ListQuery {
            limit,
            order_by,
            direction: self.order_direction.unwrap_or_default(),
            filters,
            cursor,
        })
    }
}

/// Validated list parameters with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub limit: u32,
    pub order_by: String,
    pub direction: OrderDirection,
    pub filters: BTreeMap<String, Value>,
    cursor: Option<(String, ListCursor)>,
}

impl ListQuery {
    /// The cursor exactly as the caller supplied it.
    pub fn raw_cursor(&self) -> Option<&str> {
        self.cursor.as_ref().map(|(raw, _)| raw.as_str())
    }

    pub fn to_document_query(&self) -> DocumentQuery {
        DocumentQuery {
            order_by: self.order_by.clone(),
            direction: self.direction,
            filters: self
                .filters
                .iter()
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
            limit: self.limit,
            start_after: self
                .cursor
                .as_ref()
                .map(|(_, cursor)| cursor.clone().into_start_after()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn list_cursor_round_trip() {
        let cursor = ListCursor::new("createdAt", json!("2024-01-01T00:00:00.000Z"), "doc-7");
        let encoded = cursor.encode().expect("encode cursor");
        assert!(!encoded.contains('='));
        let decoded = ListCursor::decode(&encoded).expect("decode cursor");
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            ListCursor::decode("not a cursor!"),
            Err(PaginationError::InvalidCursor(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(matches!(
            ListCursor::decode(&not_json),
            Err(PaginationError::InvalidCursor(_))
        ));
    }

    #[test]
    fn normalize_applies_defaults() {
        let query = ListParams::new().normalize().expect("defaults are valid");
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert_eq!(query.order_by, "createdAt");
        assert_eq!(query.direction, OrderDirection::Desc);
        assert!(query.filters.is_empty());
        assert!(query.raw_cursor().is_none());
    }

    #[test]
    fn normalize_rejects_bad_limits() {
        assert!(matches!(
            ListParams::new().limit(0).normalize(),
            Err(PaginationError::InvalidLimit(0))
        ));
        assert!(matches!(
            ListParams::new().limit(MAX_LIMIT + 1).normalize(),
            Err(PaginationError::InvalidLimit(_))
        ));
        assert!(ListParams::new().limit(MAX_LIMIT).normalize().is_ok());
    }

    #[test]
    fn normalize_drops_null_filters_and_rejects_id() {
        let query = ListParams::new()
            .filter("status", "new")
            .filter("type", Value::Null)
            .normalize()
            .expect("valid filters");
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters.get("status"), Some(&json!("new")));

        assert!(matches!(
            ListParams::new().filter("id", "x").normalize(),
            Err(PaginationError::InvalidFilter(_))
        ));
    }

    #[test]
    fn normalize_rejects_reserved_order_fields() {
        for field in ["id", "indexedAt", "  "] {
            assert!(matches!(
                ListParams::new()
                    .order_by(field, OrderDirection::Asc)
                    .normalize(),
                Err(PaginationError::InvalidOrderBy(_))
            ));
        }
    }

    #[test]
    fn cursor_for_other_ordering_is_rejected() {
        let cursor = ListCursor::new("points", json!(10), "u1")
            .encode()
            .expect("encode cursor");
        let result = ListParams::new().cursor(cursor).normalize();
        assert!(matches!(
            result,
            Err(PaginationError::CursorMismatch { .. })
        ));
    }

    #[test]
    fn cursor_becomes_start_after_bound() {
        let cursor = ListCursor::new("points", json!(10), "u1")
            .encode()
            .expect("encode cursor");
        let query = ListParams::new()
            .order_by("points", OrderDirection::Desc)
            .cursor(cursor.clone())
            .limit(5)
            .normalize()
            .expect("valid params");

        assert_eq!(query.raw_cursor(), Some(cursor.as_str()));
        let document_query = query.to_document_query();
        assert_eq!(document_query.limit, 5);
        assert_eq!(
            document_query.start_after,
            Some(StartAfter {
                value: json!(10),
                id: "u1".to_string(),
            })
        );
    }
}
