//! Rules over the decoded provider token. The token was never verified;
//! these rules only emulate how the service reacts to its contents.

use apnsmock_contracts::{Outcome, Reason};

use crate::{ParsedRequest, Rule, RuleContext};

/// Provider tokens issued longer ago than this are expired.
pub const MAX_TOKEN_AGE_SECS: i64 = 60 * 60;

pub const REQUIRED_ALG: &str = "ES256";

pub const PROVIDER_TOKEN_RULES: &[Rule] = &[issued_recently, signing_algorithm, team_id];

fn issued_recently(req: &ParsedRequest, ctx: &RuleContext) -> Outcome {
    match req.token().claim_i64("iat") {
        Some(iat) if iat >= ctx.now_unix - MAX_TOKEN_AGE_SECS => Outcome::Accept,
        _ => Outcome::reject(403, Reason::ExpiredProviderToken),
    }
}

fn signing_algorithm(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    if req.token().header_str("alg") != Some(REQUIRED_ALG) {
        return Outcome::reject(403, Reason::InvalidProviderToken);
    }
    Outcome::Accept
}

fn team_id(req: &ParsedRequest, _: &RuleContext) -> Outcome {
    match req.token().claim_str("iss") {
        Some(iss) if !iss.is_empty() && !iss.starts_with('1') => Outcome::Accept,
        _ => Outcome::reject(403, Reason::InvalidProviderToken),
    }
}
