use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::dashboard::AdminError;
use crate::application::error::{AccessError, ErrorReport};
use crate::application::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub message: String,
}

/// Error response of the JSON API; the full diagnostic chain goes to the response logger.
#[derive(Debug)]
pub struct ApiError {
    source: &'static str,
    status: StatusCode,
    message: String,
    chain: Vec<String>,
}

impl ApiError {
    pub fn new(source: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            source,
            status,
            chain: vec![message.clone()],
            message,
        }
    }

    pub fn bad_request(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(source, StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(source: &'static str, message: impl Into<String>) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn from_access(source: &'static str, err: AccessError) -> Self {
        let status = match &err {
            AccessError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => err
                .store_error()
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, store_status),
        };
        let message = match &err {
            AccessError::Validation(message) => message.clone(),
            _ => err.to_string(),
        };
        let chain = ErrorReport::from_error(source, status, &err).messages;
        Self {
            source,
            status,
            message,
            chain,
        }
    }

    pub fn from_admin(source: &'static str, err: AdminError) -> Self {
        match err {
            AdminError::Access(err) => Self::from_access(source, err),
            AdminError::Validation(message) => Self::bad_request(source, message),
            AdminError::UserNotFound(_) => Self::not_found(source, "User not found"),
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        StoreError::Timeout | StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Persistence(_) | StoreError::Integrity { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            message: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport {
            source: self.source,
            status: self.status,
            messages: self.chain,
        }
        .attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error::Operation;

    #[test]
    fn access_errors_map_to_statuses() {
        let cases = [
            (
                AccessError::validation("bad limit"),
                StatusCode::BAD_REQUEST,
            ),
            (
                AccessError::store(
                    "users",
                    Operation::Create,
                    StoreError::Conflict { id: "u1".into() },
                ),
                StatusCode::CONFLICT,
            ),
            (
                AccessError::store("users", Operation::List, StoreError::Timeout),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AccessError::store(
                    "users",
                    Operation::AggregateStats,
                    StoreError::Persistence("boom".into()),
                ),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from_access("test", err).status(), expected);
        }
    }

    #[test]
    fn response_carries_report_with_cause_chain() {
        let err = AccessError::store(
            "users",
            Operation::Update,
            StoreError::Unavailable("connection refused".into()),
        );
        let response = ApiError::from_access("test", err).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "store unavailable: connection refused");
    }

    #[test]
    fn unknown_user_is_not_found() {
        let err = ApiError::from_admin("test", AdminError::UserNotFound("u9".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
