use std::time::Duration;

use apnsmock_contracts::{Reason, Rejection};
use apnsmock_rules::RuleChain;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tracing::Instrument;

use crate::config::HandlerKind;
use crate::emit::{self, ResponseId};
use crate::fault::FaultSwitch;
use crate::parse::parse_request;

/// What answers requests on the notification route.
#[derive(Debug, Clone)]
pub enum PushHandler {
    Validate(RuleChain),
    /// Answers 200 to everything, without looking at the request.
    AllOk,
}

impl From<HandlerKind> for PushHandler {
    fn from(kind: HandlerKind) -> Self {
        match kind {
            HandlerKind::Rules(chain) => PushHandler::Validate(chain.chain()),
            HandlerKind::AllOk => PushHandler::AllOk,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub handler: PushHandler,
    pub fault: FaultSwitch,
    pub response_delay: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/3/device/", any(push))
        .route("/3/device/{*device_token}", any(push))
        .fallback(bad_path)
        .layer(middleware::from_fn_with_state(state.clone(), fault_gate))
        .layer(middleware::from_fn(emit::envelope))
        .with_state(state)
}

async fn fault_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.fault.current() {
        Some(rejection) => emit::failure(&rejection),
        None => next.run(request).await,
    }
}

async fn bad_path() -> Response {
    emit::failure(&Rejection::new(404, Reason::BadPath))
}

async fn push(State(state): State<AppState>, request: Request) -> Response {
    if !state.response_delay.is_zero() {
        tokio::time::sleep(state.response_delay).await;
    }

    let chain = match &state.handler {
        PushHandler::AllOk => return emit::success(),
        PushHandler::Validate(chain) => chain.clone(),
    };

    let apns_id = request
        .extensions()
        .get::<ResponseId>()
        .and_then(|id| id.0.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let span = tracing::info_span!(
        "push.evaluate",
        apns_id = %apns_id,
        device_token = tracing::field::Empty,
        status = tracing::field::Empty,
        reason = tracing::field::Empty,
    );

    async move {
        let outcome = match parse_request(request).await {
            Ok(parsed) => {
                tracing::Span::current().record("device_token", parsed.device_token());
                chain.evaluate(&parsed)
            }
            Err(rejection) => rejection.into(),
        };

        let span = tracing::Span::current();
        span.record("status", outcome.status());
        if let Some(rejection) = outcome.rejection() {
            span.record("reason", rejection.reason());
        }
        tracing::debug!("push evaluated");

        emit::emit(&outcome)
    }
    .instrument(span)
    .await
}

/// Plain-HTTP operational endpoints, served on their own listener.
pub fn metrics_router(fault: FaultSwitch) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(fault)
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    fault_installed: bool,
}

async fn healthz(State(fault): State<FaultSwitch>) -> impl IntoResponse {
    Json(HealthzResponse {
        status: "ok",
        fault_installed: fault.is_installed(),
    })
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
