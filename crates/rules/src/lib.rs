use std::borrow::Cow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use apnsmock_auth::ProviderToken;
use apnsmock_contracts::Outcome;
use bytes::Bytes;
use http::HeaderMap;

pub mod device_token;
pub mod header;
pub mod provider_token;

pub use device_token::DEVICE_TOKEN_RULES;
pub use header::HEADER_RULES;
pub use provider_token::PROVIDER_TOKEN_RULES;

/// A structurally valid notification request, ready for rule evaluation.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    device_token: String,
    headers: HeaderMap,
    token: ProviderToken,
    body: Bytes,
}

impl ParsedRequest {
    pub fn new(
        device_token: impl Into<String>,
        headers: HeaderMap,
        token: ProviderToken,
        body: Bytes,
    ) -> Self {
        Self {
            device_token: device_token.into(),
            headers,
            token,
            body,
        }
    }

    pub fn device_token(&self) -> &str {
        &self.device_token
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of `name`, or `""` when the header is absent.
    pub fn header(&self, name: &str) -> Cow<'_, str> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .unwrap_or(Cow::Borrowed(""))
    }

    pub fn token(&self) -> &ProviderToken {
        &self.token
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Inputs a rule may depend on besides the request itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleContext {
    pub now_unix: i64,
}

impl RuleContext {
    pub fn now() -> Self {
        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self { now_unix }
    }

    pub fn at(now_unix: i64) -> Self {
        Self { now_unix }
    }
}

pub type Rule = fn(&ParsedRequest, &RuleContext) -> Outcome;

/// Ordered, immutable list of rules; the first rejection wins.
#[derive(Debug, Clone)]
pub struct RuleChain {
    rules: Arc<[Rule]>,
}

impl RuleChain {
    /// Concatenates rule groups, keeping each group's internal order.
    pub fn join(groups: &[&[Rule]]) -> Self {
        let rules = groups
            .iter()
            .flat_map(|group| group.iter().copied())
            .collect::<Vec<Rule>>();
        Self {
            rules: rules.into(),
        }
    }

    pub fn token_auth() -> Self {
        Self::join(&[HEADER_RULES, DEVICE_TOKEN_RULES, PROVIDER_TOKEN_RULES])
    }

    // TODO: append certificate rules once client-certificate sessions are emulated.
    pub fn cert_auth() -> Self {
        Self::join(&[HEADER_RULES, DEVICE_TOKEN_RULES])
    }

    pub fn standard() -> Self {
        Self::join(&[HEADER_RULES, DEVICE_TOKEN_RULES, PROVIDER_TOKEN_RULES])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, req: &ParsedRequest) -> Outcome {
        self.evaluate_at(req, &RuleContext::now())
    }

    pub fn evaluate_at(&self, req: &ParsedRequest, ctx: &RuleContext) -> Outcome {
        for rule in self.rules.iter() {
            let outcome = rule(req, ctx);
            if !outcome.is_accept() {
                return outcome;
            }
        }
        Outcome::Accept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Standard,
    TokenAuth,
    CertAuth,
}

impl ChainKind {
    pub fn chain(self) -> RuleChain {
        match self {
            ChainKind::Standard => RuleChain::standard(),
            ChainKind::TokenAuth => RuleChain::token_auth(),
            ChainKind::CertAuth => RuleChain::cert_auth(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChainKind::Standard => "default",
            ChainKind::TokenAuth => "token",
            ChainKind::CertAuth => "cert",
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use http::HeaderValue;

    pub const NOW: i64 = 1_700_000_000;

    pub fn ctx() -> RuleContext {
        RuleContext::at(NOW)
    }

    pub fn valid_token() -> ProviderToken {
        ProviderToken {
            header: serde_json::json!({"alg": "ES256", "kid": "ABC123DEFG"})
                .as_object()
                .cloned()
                .unwrap(),
            claims: serde_json::json!({"iss": "DEF123GHIJ", "iat": NOW - 60})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    pub struct RequestBuilder {
        device_token: String,
        headers: HeaderMap,
        token: ProviderToken,
    }

    impl RequestBuilder {
        pub fn valid() -> Self {
            let mut headers = HeaderMap::new();
            headers.insert("apns-topic", HeaderValue::from_static("com.example.app"));
            Self {
                device_token: "abc0000000000000".to_string(),
                headers,
                token: valid_token(),
            }
        }

        pub fn device_token(mut self, token: &str) -> Self {
            self.device_token = token.to_string();
            self
        }

        pub fn header(mut self, name: &'static str, value: &str) -> Self {
            self.headers
                .insert(name, HeaderValue::from_str(value).expect("valid header value"));
            self
        }

        pub fn without_header(mut self, name: &'static str) -> Self {
            self.headers.remove(name);
            self
        }

        pub fn token_header(mut self, name: &str, value: serde_json::Value) -> Self {
            self.token.header.insert(name.to_string(), value);
            self
        }

        pub fn claim(mut self, name: &str, value: serde_json::Value) -> Self {
            self.token.claims.insert(name.to_string(), value);
            self
        }

        pub fn without_claim(mut self, name: &str) -> Self {
            self.token.claims.remove(name);
            self
        }

        pub fn build(self) -> ParsedRequest {
            ParsedRequest::new(
                self.device_token,
                self.headers,
                self.token,
                Bytes::from_static(b"{}"),
            )
        }
    }
}
