//! Structural gating of a notification request, ahead of the rule chain.

use apnsmock_auth::{bearer_token, decode_unverified};
use apnsmock_contracts::{MAX_PAYLOAD_BYTES, REQUEST_ROOT, Reason, Rejection};
use apnsmock_rules::ParsedRequest;
use axum::body::{Body, Bytes, to_bytes};
use axum::extract::Request;
use axum::http::Method;
use percent_encoding::percent_decode_str;

/// Checks method, path, credential and body, in that order. The body is only
/// read once everything before it has passed.
pub async fn parse_request(request: Request) -> Result<ParsedRequest, Rejection> {
    let (parts, body) = request.into_parts();

    if !is_post(&parts.method) {
        return Err(Rejection::new(405, Reason::MethodNotAllowed));
    }

    let device_token = device_token(parts.uri.path())
        .ok_or_else(|| Rejection::bad_request(Reason::BadDeviceToken))?;

    let raw_token =
        bearer_token(&parts.headers).map_err(|err| Rejection::forbidden(err.reason()))?;
    let token = decode_unverified(raw_token).map_err(|err| {
        tracing::debug!(code = err.code, message = %err.message, "provider token rejected");
        Rejection::forbidden(err.reason())
    })?;

    let body = read_payload(body).await?;

    Ok(ParsedRequest::new(device_token, parts.headers, token, body))
}

fn is_post(method: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case(Method::POST.as_str())
}

/// The percent-decoded path segment after the request root, if it is a
/// non-empty run of hex digits.
pub fn device_token(path: &str) -> Option<String> {
    let raw = path.strip_prefix(REQUEST_ROOT)?;
    let token = percent_decode_str(raw).decode_utf8().ok()?;
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(token.into_owned())
}

async fn read_payload(body: Body) -> Result<Bytes, Rejection> {
    // A body over the limit is reported as PayloadEmpty too.
    let bytes = to_bytes(body, MAX_PAYLOAD_BYTES)
        .await
        .map_err(|_| Rejection::bad_request(Reason::PayloadEmpty))?;
    if bytes.is_empty() {
        return Err(Rejection::bad_request(Reason::PayloadEmpty));
    }
    Ok(bytes)
}
