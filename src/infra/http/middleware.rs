use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

/// Successful responses slower than this are logged as well.
pub const SLOW_RESPONSE: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let elapsed = start.elapsed();
    let status = response.status();
    let report = response.extensions_mut().remove::<ErrorReport>();

    let entry = ResponseLog {
        method,
        uri,
        status,
        elapsed,
        request_id,
    };
    if status.is_server_error() || status.is_client_error() {
        entry.failed(report);
    } else if elapsed > SLOW_RESPONSE {
        entry.slow();
    }

    response
}

struct ResponseLog {
    method: Method,
    uri: Uri,
    status: StatusCode,
    elapsed: Duration,
    request_id: String,
}

impl ResponseLog {
    fn failed(&self, report: Option<ErrorReport>) {
        let (source, chain) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = chain
            .first()
            .map(String::as_str)
            .unwrap_or("no diagnostic available");

        if self.status.is_server_error() {
            error!(
                target = "docdash::http::response",
                status = self.status.as_u16(),
                method = %self.method,
                path = %self.uri.path(),
                query = self.uri.query().unwrap_or(""),
                elapsed_ms = self.elapsed.as_millis(),
                source,
                detail,
                chain = ?chain,
                request_id = %self.request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "docdash::http::response",
                status = self.status.as_u16(),
                method = %self.method,
                path = %self.uri.path(),
                query = self.uri.query().unwrap_or(""),
                elapsed_ms = self.elapsed.as_millis(),
                source,
                detail,
                chain = ?chain,
                request_id = %self.request_id,
                "client request error",
            );
        }
    }

    fn slow(&self) {
        warn!(
            target = "docdash::http::response",
            status = self.status.as_u16(),
            method = %self.method,
            path = %self.uri.path(),
            elapsed_ms = self.elapsed.as_millis(),
            request_id = %self.request_id,
            "slow response",
        );
    }
}
