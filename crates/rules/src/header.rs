use apnsmock_contracts::{Outcome, Reason, headers};
use uuid::Uuid;

use crate::{ParsedRequest, Rule, RuleContext};

pub const MAX_COLLAPSE_ID_BYTES: usize = 64;

pub const HEADER_RULES: &[Rule] = &[
    message_id,
    priority,
    topic_present,
    topic_allowed,
    collapse_id,
    expiration,
];

fn message_id(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    let id = req.header(headers::APNS_ID);
    if !id.is_empty() && Uuid::parse_str(&id).is_err() {
        return Outcome::reject(400, Reason::BadMessageId);
    }
    Outcome::Accept
}

fn priority(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    match req.header(headers::APNS_PRIORITY).as_ref() {
        "" | "5" | "10" => Outcome::Accept,
        _ => Outcome::reject(400, Reason::BadPriority),
    }
}

fn topic_present(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    if req.header(headers::APNS_TOPIC).is_empty() {
        return Outcome::reject(400, Reason::MissingTopic);
    }
    Outcome::Accept
}

fn topic_allowed(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    if req.header(headers::APNS_TOPIC).starts_with('d') {
        return Outcome::reject(400, Reason::TopicDisallowed);
    }
    Outcome::Accept
}

fn collapse_id(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    let len = req
        .headers()
        .get(headers::APNS_COLLAPSE_ID)
        .map(|v| v.len())
        .unwrap_or(0);
    if len > MAX_COLLAPSE_ID_BYTES {
        return Outcome::reject(400, Reason::BadCollapseId);
    }
    Outcome::Accept
}

fn expiration(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    let expiration = req.header(headers::APNS_EXPIRATION);
    if !expiration.is_empty() && expiration.parse::<i64>().is_err() {
        return Outcome::reject(400, Reason::BadExpirationDate);
    }
    Outcome::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleChain;
    use crate::testing::{RequestBuilder, ctx};

    fn evaluate(req: &ParsedRequest) -> Outcome {
        RuleChain::join(&[HEADER_RULES]).evaluate_at(req, &ctx())
    }

    #[test]
    fn accepts_valid_headers() {
        let req = RequestBuilder::valid()
            .header("apns-id", "123e4567-e89b-12d3-a456-426614174000")
            .header("apns-priority", "10")
            .header("apns-collapse-id", &"c".repeat(64))
            .header("apns-expiration", "0")
            .build();
        assert_eq!(evaluate(&req), Outcome::Accept);
    }

    #[test]
    fn message_id_must_be_uuid() {
        let req = RequestBuilder::valid().header("apns-id", "not-a-uuid").build();
        assert_eq!(evaluate(&req), Outcome::reject(400, Reason::BadMessageId));

        let req = RequestBuilder::valid().header("apns-id", "").build();
        assert_eq!(evaluate(&req), Outcome::Accept);
    }

    #[test]
    fn priority_allows_only_5_and_10() {
        for ok in ["", "5", "10"] {
            let req = RequestBuilder::valid().header("apns-priority", ok).build();
            assert_eq!(evaluate(&req), Outcome::Accept, "priority {:?}", ok);
        }
        for bad in ["1", "05", "10 ", "high"] {
            let req = RequestBuilder::valid().header("apns-priority", bad).build();
            assert_eq!(
                evaluate(&req),
                Outcome::reject(400, Reason::BadPriority),
                "priority {:?}",
                bad
            );
        }
    }

    #[test]
    fn topic_is_required_and_must_not_start_with_d() {
        let req = RequestBuilder::valid().without_header("apns-topic").build();
        assert_eq!(evaluate(&req), Outcome::reject(400, Reason::MissingTopic));

        let req = RequestBuilder::valid().header("apns-topic", "").build();
        assert_eq!(evaluate(&req), Outcome::reject(400, Reason::MissingTopic));

        let req = RequestBuilder::valid()
            .header("apns-topic", "disallowed.topic")
            .build();
        assert_eq!(evaluate(&req), Outcome::reject(400, Reason::TopicDisallowed));

        let req = RequestBuilder::valid()
            .header("apns-topic", "Dallowed.topic")
            .build();
        assert_eq!(evaluate(&req), Outcome::Accept);
    }

    #[test]
    fn collapse_id_is_capped_at_64_bytes() {
        let req = RequestBuilder::valid()
            .header("apns-collapse-id", &"c".repeat(65))
            .build();
        assert_eq!(evaluate(&req), Outcome::reject(400, Reason::BadCollapseId));
    }

    #[test]
    fn expiration_must_be_integer() {
        for ok in ["1700000000", "-1", "+5"] {
            let req = RequestBuilder::valid().header("apns-expiration", ok).build();
            assert_eq!(evaluate(&req), Outcome::Accept, "expiration {:?}", ok);
        }
        for bad in ["tomorrow", "1.5", "99999999999999999999"] {
            let req = RequestBuilder::valid().header("apns-expiration", bad).build();
            assert_eq!(
                evaluate(&req),
                Outcome::reject(400, Reason::BadExpirationDate),
                "expiration {:?}",
                bad
            );
        }
    }

    #[test]
    fn first_header_violation_wins() {
        let req = RequestBuilder::valid()
            .header("apns-id", "bogus")
            .header("apns-priority", "3")
            .without_header("apns-topic")
            .build();
        assert_eq!(evaluate(&req), Outcome::reject(400, Reason::BadMessageId));
    }
}
