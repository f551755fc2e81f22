use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use axum::response::Response;
use thiserror::Error;

use crate::application::pagination::PaginationError;
use crate::application::store::StoreError;
use crate::infra::error::InfraError;

/// Access-layer operation, carried on every store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    GetById,
    Create,
    Update,
    Remove,
    BatchCreate,
    AggregateStats,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::GetById => "get_by_id",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Remove => "remove",
            Operation::BatchCreate => "batch_create",
            Operation::AggregateStats => "aggregate_stats",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Remove | Operation::BatchCreate
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by the cached collection access layer.
///
/// A point lookup on a missing id is `Ok(None)`, never an error.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{operation} on collection `{collection}` failed to read from the store")]
    StoreRead {
        collection: String,
        operation: Operation,
        #[source]
        source: StoreError,
    },
    #[error("{operation} on collection `{collection}` failed to write to the store")]
    StoreWrite {
        collection: String,
        operation: Operation,
        #[source]
        source: StoreError,
    },
    #[error("aggregation scan of collection `{collection}` failed")]
    AggregationScan {
        collection: String,
        #[source]
        source: StoreError,
    },
}

impl AccessError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Tag a store failure with the operation and collection it happened in.
    pub fn store(collection: &str, operation: Operation, source: StoreError) -> Self {
        let collection = collection.to_string();
        match operation {
            Operation::AggregateStats => Self::AggregationScan { collection, source },
            op if op.is_write() => Self::StoreWrite {
                collection,
                operation: op,
                source,
            },
            op => Self::StoreRead {
                collection,
                operation: op,
                source,
            },
        }
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            AccessError::Validation(_) => None,
            AccessError::StoreRead { source, .. }
            | AccessError::StoreWrite { source, .. }
            | AccessError::AggregationScan { source, .. } => Some(source),
        }
    }
}

impl From<PaginationError> for AccessError {
    fn from(error: PaginationError) -> Self {
        Self::Validation(error.to_string())
    }
}

/// Diagnostic chain attached to failed HTTP responses for the response logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Top-level failure of a binary command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_classified_by_operation() {
        let read = AccessError::store("incidents", Operation::List, StoreError::Timeout);
        assert!(matches!(
            read,
            AccessError::StoreRead {
                operation: Operation::List,
                ..
            }
        ));

        let write = AccessError::store("incidents", Operation::Update, StoreError::Timeout);
        assert!(matches!(
            write,
            AccessError::StoreWrite {
                operation: Operation::Update,
                ..
            }
        ));

        let scan = AccessError::store("incidents", Operation::AggregateStats, StoreError::Timeout);
        assert!(matches!(scan, AccessError::AggregationScan { .. }));
    }

    #[test]
    fn error_report_walks_the_source_chain() {
        let error = AccessError::store(
            "users",
            Operation::Create,
            StoreError::Unavailable("connection refused".to_string()),
        );
        let report =
            ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);
        assert_eq!(
            report.messages,
            vec![
                "create on collection `users` failed to write to the store".to_string(),
                "store unavailable: connection refused".to_string(),
            ]
        );
    }
}
