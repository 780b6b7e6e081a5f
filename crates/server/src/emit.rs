//! Response emission. Every response leaves with an `apns-id` header, whether
//! it came from the push handler, the fault switch or the unknown-path fallback.

use std::time::Instant;

use apnsmock_contracts::{Outcome, ReasonBody, Rejection, headers};
use axum::Json;
use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

static APNS_ID: HeaderName = HeaderName::from_static(headers::APNS_ID);

const UNMATCHED_ROUTE: &str = "unmatched";

/// The `apns-id` this exchange answers with, stored as a request extension.
#[derive(Debug, Clone)]
pub struct ResponseId(pub HeaderValue);

/// Echoes a non-empty request `apns-id`; otherwise a fresh random UUID.
pub fn response_id(request_headers: &HeaderMap) -> HeaderValue {
    if let Some(id) = request_headers.get(&APNS_ID)
        && !id.is_empty()
    {
        return id.clone();
    }

    let fresh = uuid::Uuid::new_v4().hyphenated().to_string();
    HeaderValue::from_str(&fresh)
        .unwrap_or_else(|_| HeaderValue::from_static("00000000-0000-0000-0000-000000000000"))
}

pub fn success() -> Response {
    StatusCode::OK.into_response()
}

pub fn failure(rejection: &Rejection) -> Response {
    crate::metrics::observe_rejection(rejection.reason());
    let status =
        StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ReasonBody::from(rejection))).into_response()
}

pub fn emit(outcome: &Outcome) -> Response {
    match outcome {
        Outcome::Accept => success(),
        Outcome::Reject(rejection) => failure(rejection),
    }
}

/// Outermost layer: assigns the response id before anything else runs and
/// records request metrics once the response is known.
pub async fn envelope(mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    let id = response_id(request.headers());
    request.extensions_mut().insert(ResponseId(id.clone()));

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let method = request.method().as_str().to_string();

    let mut response = next.run(request).await;
    response.headers_mut().insert(APNS_ID.clone(), id);

    crate::metrics::observe_http_request(
        &route,
        &method,
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}
