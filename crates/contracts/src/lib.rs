use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Path prefix of the notification route; the remainder is the device token.
pub const REQUEST_ROOT: &str = "/3/device/";

/// Request body size above which a notification is rejected.
pub const MAX_PAYLOAD_BYTES: usize = 4096;

pub mod headers {
    pub const APNS_ID: &str = "apns-id";
    pub const APNS_TOPIC: &str = "apns-topic";
    pub const APNS_PRIORITY: &str = "apns-priority";
    pub const APNS_COLLAPSE_ID: &str = "apns-collapse-id";
    pub const APNS_EXPIRATION: &str = "apns-expiration";
    pub const AUTHORIZATION: &str = "authorization";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    BadCollapseId,
    BadDeviceToken,
    BadExpirationDate,
    BadMessageId,
    BadPath,
    BadPriority,
    DeviceTokenNotForTopic,
    ExpiredProviderToken,
    InvalidProviderToken,
    MethodNotAllowed,
    MissingProviderToken,
    MissingTopic,
    PayloadEmpty,
    TopicDisallowed,
    Unregistered,
}

impl Reason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Reason::BadCollapseId => "BadCollapseId",
            Reason::BadDeviceToken => "BadDeviceToken",
            Reason::BadExpirationDate => "BadExpirationDate",
            Reason::BadMessageId => "BadMessageId",
            Reason::BadPath => "BadPath",
            Reason::BadPriority => "BadPriority",
            Reason::DeviceTokenNotForTopic => "DeviceTokenNotForTopic",
            Reason::ExpiredProviderToken => "ExpiredProviderToken",
            Reason::InvalidProviderToken => "InvalidProviderToken",
            Reason::MethodNotAllowed => "MethodNotAllowed",
            Reason::MissingProviderToken => "MissingProviderToken",
            Reason::MissingTopic => "MissingTopic",
            Reason::PayloadEmpty => "PayloadEmpty",
            Reason::TopicDisallowed => "TopicDisallowed",
            Reason::Unregistered => "Unregistered",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal (status, reason) pair. The status is never 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub reason: Cow<'static, str>,
}

impl Rejection {
    pub const fn new(status: u16, reason: Reason) -> Self {
        Self {
            status,
            reason: Cow::Borrowed(reason.as_str()),
        }
    }

    /// Rejection with a caller-chosen reason, e.g. a simulated outage.
    pub fn custom(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Cow::Owned(reason.into()),
        }
    }

    pub fn bad_request(reason: Reason) -> Self {
        Self::new(400, reason)
    }

    pub fn forbidden(reason: Reason) -> Self {
        Self::new(403, reason)
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is(&self, status: u16, reason: Reason) -> bool {
        self.status == status && self.reason == reason.as_str()
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Reject(Rejection),
}

impl Outcome {
    pub fn reject(status: u16, reason: Reason) -> Self {
        Outcome::Reject(Rejection::new(status, reason))
    }

    pub fn status(&self) -> u16 {
        match self {
            Outcome::Accept => 200,
            Outcome::Reject(rejection) => rejection.status,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Accept => None,
            Outcome::Reject(rejection) => Some(rejection),
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Outcome::Accept)
    }
}

impl From<Rejection> for Outcome {
    fn from(value: Rejection) -> Self {
        Outcome::Reject(value)
    }
}

/// JSON body of every failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonBody {
    pub reason: String,
}

impl From<&Rejection> for ReasonBody {
    fn from(value: &Rejection) -> Self {
        Self {
            reason: value.reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_serializes_as_wire_string() {
        for reason in [
            Reason::BadDeviceToken,
            Reason::DeviceTokenNotForTopic,
            Reason::PayloadEmpty,
        ] {
            let encoded = serde_json::to_string(&reason).expect("reason should serialize");
            assert_eq!(encoded, format!("\"{}\"", reason.as_str()));
        }
    }

    #[test]
    fn reason_body_uses_reason_field() {
        let body = ReasonBody::from(&Rejection::new(410, Reason::Unregistered));
        assert_eq!(
            serde_json::to_value(&body).expect("body should serialize"),
            serde_json::json!({"reason": "Unregistered"})
        );
    }

    #[test]
    fn outcome_status_is_200_only_for_accept() {
        assert_eq!(Outcome::Accept.status(), 200);
        assert!(Outcome::Accept.rejection().is_none());

        let outcome = Outcome::from(Rejection::custom(503, "Shutdown"));
        assert_eq!(outcome.status(), 503);
        assert_eq!(outcome.rejection().map(Rejection::reason), Some("Shutdown"));
        assert!(!outcome.is_accept());
    }

    #[test]
    fn rejection_matches_status_and_reason() {
        let rejection = Rejection::forbidden(Reason::ExpiredProviderToken);
        assert!(rejection.is(403, Reason::ExpiredProviderToken));
        assert!(!rejection.is(400, Reason::ExpiredProviderToken));
        assert!(!rejection.is(403, Reason::InvalidProviderToken));
        assert_eq!(rejection.to_string(), "403 ExpiredProviderToken");
    }
}
