use apnsmock_contracts::{Outcome, Reason, headers};

use crate::{ParsedRequest, Rule, RuleContext};

pub const DEVICE_TOKEN_RULES: &[Rule] = &[bad_token, unregistered, not_for_topic];

fn first_byte(s: &str) -> Option<u8> {
    s.as_bytes().first().copied()
}

fn bad_token(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    if first_byte(req.device_token()) == Some(b'1') {
        return Outcome::reject(400, Reason::BadDeviceToken);
    }
    Outcome::Accept
}

fn unregistered(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    if first_byte(req.device_token()) == Some(b'2') {
        return Outcome::reject(410, Reason::Unregistered);
    }
    Outcome::Accept
}

fn not_for_topic(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    let token = first_byte(req.device_token());
    let topic = first_byte(&req.header(headers::APNS_TOPIC));
    if token.is_some() && token == topic {
        return Outcome::reject(400, Reason::DeviceTokenNotForTopic);
    }
    Outcome::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleChain;
    use crate::testing::{RequestBuilder, ctx};

    fn evaluate(req: &ParsedRequest) -> Outcome {
        RuleChain::join(&[DEVICE_TOKEN_RULES]).evaluate_at(req, &ctx())
    }

    #[test]
    fn tokens_starting_with_1_are_bad() {
        for token in ["1", "1abc", "1fffffffffffffffffffffffffffffff"] {
            let req = RequestBuilder::valid().device_token(token).build();
            assert_eq!(evaluate(&req), Outcome::reject(400, Reason::BadDeviceToken));
        }
    }

    #[test]
    fn tokens_starting_with_2_are_unregistered() {
        let req = RequestBuilder::valid().device_token("2abc0000").build();
        assert_eq!(evaluate(&req), Outcome::reject(410, Reason::Unregistered));
    }

    #[test]
    fn token_sharing_first_char_with_topic_is_rejected() {
        let req = RequestBuilder::valid()
            .device_token("cafe")
            .header("apns-topic", "com.example.app")
            .build();
        assert_eq!(
            evaluate(&req),
            Outcome::reject(400, Reason::DeviceTokenNotForTopic)
        );
    }

    #[test]
    fn topic_comparison_is_case_sensitive() {
        let req = RequestBuilder::valid()
            .device_token("Cafe")
            .header("apns-topic", "com.example.app")
            .build();
        assert_eq!(evaluate(&req), Outcome::Accept);
    }

    #[test]
    fn missing_topic_does_not_match_token() {
        let req = RequestBuilder::valid()
            .device_token("abc")
            .without_header("apns-topic")
            .build();
        assert_eq!(evaluate(&req), Outcome::Accept);
    }
}
