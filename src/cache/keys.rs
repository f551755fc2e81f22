//! Cache key definitions.
//!
//! Keys are rendered to strings so that invalidation can match on prefixes.
//! Every free-form component is written as a JSON string literal, which keeps
//! distinct tuples distinct and stops one collection's prefix from matching a
//! longer collection name.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::application::pagination::ListQuery;
use crate::application::store::OrderDirection;

/// Normalized parameter tuple of a list read.
#[derive(Debug, Clone, PartialEq)]
pub struct ListKey {
    pub limit: u32,
    pub cursor: Option<String>,
    pub order_by: String,
    pub direction: OrderDirection,
    pub filters: BTreeMap<String, Value>,
}

impl From<&ListQuery> for ListKey {
    fn from(query: &ListQuery) -> Self {
        Self {
            limit: query.limit,
            cursor: query.raw_cursor().map(str::to_string),
            order_by: query.order_by.clone(),
            direction: query.direction,
            filters: query.filters.clone(),
        }
    }
}

/// Identifies one cached read of one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    List { collection: String, params: ListKey },
    GetById { collection: String, id: String },
    Stats { collection: String },
}

impl CacheKey {
    pub fn list(collection: &str, query: &ListQuery) -> Self {
        Self::List {
            collection: collection.to_string(),
            params: ListKey::from(query),
        }
    }

    pub fn get_by_id(collection: &str, id: &str) -> Self {
        Self::GetById {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn stats(collection: &str) -> Self {
        Self::Stats {
            collection: collection.to_string(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            CacheKey::List { collection, params } => {
                let mut tuple = Map::new();
                tuple.insert("cursor".into(), params.cursor.clone().into());
                tuple.insert("direction".into(), params.direction.as_str().into());
                let filters = params
                    .filters
                    .iter()
                    .map(|(field, value)| (field.clone(), canonical(value)))
                    .collect::<Map<String, Value>>();
                tuple.insert("filters".into(), Value::Object(filters));
                tuple.insert("limit".into(), params.limit.into());
                tuple.insert("orderBy".into(), params.order_by.clone().into());
                format!(
                    "{}{}",
                    KeyPrefix::lists(collection).render(),
                    Value::Object(tuple)
                )
            }
            CacheKey::GetById { collection, id } => {
                format!("get:{}:{}", quoted(collection), quoted(id))
            }
            CacheKey::Stats { collection } => KeyPrefix::stats(collection).render(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Family of keys removed together on invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPrefix {
    Lists { collection: String },
    Stats { collection: String },
}

impl KeyPrefix {
    pub fn lists(collection: &str) -> Self {
        Self::Lists {
            collection: collection.to_string(),
        }
    }

    pub fn stats(collection: &str) -> Self {
        Self::Stats {
            collection: collection.to_string(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            KeyPrefix::Lists { collection } => format!("list:{}:", quoted(collection)),
            KeyPrefix::Stats { collection } => format!("stats:{}", quoted(collection)),
        }
    }
}

fn quoted(component: &str) -> String {
    Value::String(component.to_string()).to_string()
}

/// Rebuild a JSON value with object keys in sorted order at every depth.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(key, value)| (key, canonical(value))).collect();
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(key, value)| (key.clone(), value))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
