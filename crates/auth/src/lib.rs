//! Provider credential handling for the mock.
//!
//! **No cryptographic validation happens here.** The bearer token is split
//! into its three JWT segments and the header and claims are base64url- and
//! JSON-decoded so that rules can inspect them, but the signature segment is
//! only checked for being decodable. This crate emulates how the real service
//! *reacts* to credentials; it is not an authentication boundary.

use apnsmock_contracts::Reason;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::HeaderMap;
use http::header;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    fn required(message: impl Into<String>) -> Self {
        Self {
            code: "ERR_AUTH_REQUIRED",
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: "ERR_AUTH_INVALID",
            message: message.into(),
        }
    }

    /// Rejection reason the service reports for this failure.
    pub fn reason(&self) -> Reason {
        match self.code {
            "ERR_AUTH_REQUIRED" => Reason::MissingProviderToken,
            _ => Reason::InvalidProviderToken,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

/// Decoded, unverified provider token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderToken {
    pub header: Map<String, Value>,
    pub claims: Map<String, Value>,
}

impl ProviderToken {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Value::as_str)
    }

    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// Numeric claim as whole seconds; fractional values are truncated.
    pub fn claim_i64(&self, name: &str) -> Option<i64> {
        let value = self.claims.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
    }
}

/// Extracts the raw credential from an `authorization: bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::required("missing authorization header"))?;

    let token = authz
        .strip_prefix("bearer ")
        .or_else(|| authz.strip_prefix("Bearer "))
        .ok_or_else(|| AuthError::required("authorization must be a bearer token"))?;

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::invalid("bearer token is empty"));
    }

    Ok(token)
}

/// Splits and decodes a provider token without verifying its signature.
pub fn decode_unverified(token: &str) -> Result<ProviderToken, AuthError> {
    let segments = token.split('.').collect::<Vec<_>>();
    let [header, claims, signature] = segments.as_slice() else {
        return Err(AuthError::invalid(format!(
            "token must have 3 segments, found {}",
            segments.len()
        )));
    };

    let header = decode_object(header, "header")?;
    let claims = decode_object(claims, "claims")?;
    decode_segment(signature, "signature")?;

    Ok(ProviderToken { header, claims })
}

fn decode_object(segment: &str, name: &str) -> Result<Map<String, Value>, AuthError> {
    let bytes = decode_segment(segment, name)?;
    serde_json::from_slice::<Map<String, Value>>(&bytes)
        .map_err(|_| AuthError::invalid(format!("token {} is not a JSON object", name)))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, AuthError> {
    if segment.is_empty() {
        return Err(AuthError::invalid(format!("token {} segment is empty", name)));
    }

    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| AuthError::invalid(format!("token {} segment is not base64url", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("json should encode"))
    }

    fn headers_with_authz(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(value).expect("header value should parse"),
        );
        headers
    }

    #[test]
    fn bearer_token_rejects_missing_header() {
        let headers = HeaderMap::new();
        let err = bearer_token(&headers).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_REQUIRED");
        assert_eq!(err.reason(), Reason::MissingProviderToken);
    }

    #[test]
    fn bearer_token_rejects_other_schemes_as_missing() {
        let headers = headers_with_authz("Basic dXNlcjpwYXNz");
        let err = bearer_token(&headers).unwrap_err();
        assert_eq!(err.reason(), Reason::MissingProviderToken);
    }

    #[test]
    fn bearer_token_rejects_blank_token_as_invalid() {
        let headers = headers_with_authz("bearer    ");
        let err = bearer_token(&headers).unwrap_err();
        assert_eq!(err.reason(), Reason::InvalidProviderToken);
    }

    #[test]
    fn bearer_token_accepts_lowercase_scheme() {
        let headers = headers_with_authz("bearer a.b.c");
        assert_eq!(bearer_token(&headers).unwrap(), "a.b.c");

        let headers = headers_with_authz("Bearer a.b.c");
        assert_eq!(bearer_token(&headers).unwrap(), "a.b.c");

        let headers = headers_with_authz("BEARER a.b.c");
        assert_eq!(
            bearer_token(&headers).unwrap_err().reason(),
            Reason::MissingProviderToken
        );
    }

    #[test]
    fn bearer_token_trims_value() {
        let headers = headers_with_authz("bearer  a.b.c ");
        assert_eq!(bearer_token(&headers).unwrap(), "a.b.c");
    }

    #[test]
    fn decode_unverified_exposes_header_and_claims() {
        let token = format!(
            "{}.{}.{}",
            encode(&serde_json::json!({"alg": "ES256", "kid": "ABC123DEFG"})),
            encode(&serde_json::json!({"iss": "DEF123GHIJ", "iat": 1_700_000_000})),
            URL_SAFE_NO_PAD.encode(b"not-a-real-signature"),
        );

        let decoded = decode_unverified(&token).expect("token should decode");
        assert_eq!(decoded.header_str("alg"), Some("ES256"));
        assert_eq!(decoded.claim_str("iss"), Some("DEF123GHIJ"));
        assert_eq!(decoded.claim_i64("iat"), Some(1_700_000_000));
    }

    #[test]
    fn decode_unverified_accepts_padded_segments() {
        let header = base64::engine::general_purpose::URL_SAFE
            .encode(serde_json::to_vec(&serde_json::json!({"alg": "ES256"})).unwrap());
        let token = format!("{}.{}.c2ln", header, encode(&serde_json::json!({})));
        assert!(decode_unverified(&token).is_ok());
    }

    #[test]
    fn decode_unverified_rejects_malformed_shapes() {
        let header = encode(&serde_json::json!({"alg": "ES256"}));
        let claims = encode(&serde_json::json!({"iss": "x"}));
        let not_object = encode(&serde_json::json!(["a"]));

        for token in [
            "onlyone".to_string(),
            format!("{}.{}", header, claims),
            format!("{}.{}.c2ln.extra", header, claims),
            format!("{}..c2ln", header),
            format!("{}.{}.", header, claims),
            format!("{}.{}.c2ln", not_object, claims),
            format!("{}.%%%.c2ln", header),
            format!("{}.{}.@@", header, claims),
        ] {
            let err = decode_unverified(&token).unwrap_err();
            assert_eq!(err.reason(), Reason::InvalidProviderToken, "token {}", token);
        }
    }

    #[test]
    fn claim_i64_truncates_floats_and_ignores_strings() {
        let token = ProviderToken {
            header: Map::new(),
            claims: serde_json::json!({"a": 12.9, "b": "12"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert_eq!(token.claim_i64("a"), Some(12));
        assert_eq!(token.claim_i64("b"), None);
        assert_eq!(token.claim_i64("missing"), None);
    }
}
