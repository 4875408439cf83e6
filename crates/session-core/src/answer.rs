//! Answer Parser (C3): splits an operator's free-form answer string into
//! `{decision, reason?}` on the first colon.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Split on the **first** `:` only; both sides trimmed. A reason containing
/// further `:` characters is preserved verbatim. No colon at all yields a
/// bare decision with no reason.
pub fn parse(input: &str) -> Answer {
    match input.find(':') {
        None => Answer {
            decision: input.trim().to_string(),
            reason: None,
        },
        Some(idx) => {
            let (decision, rest) = input.split_at(idx);
            let reason = &rest[1..];
            Answer {
                decision: decision.trim().to_string(),
                reason: Some(reason.trim().to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_colon_is_bare_decision() {
        let a = parse("allow");
        assert_eq!(a.decision, "allow");
        assert_eq!(a.reason, None);
    }

    #[test]
    fn splits_on_first_colon_only() {
        let a = parse("reject: also cover the auth module: and tests");
        assert_eq!(a.decision, "reject");
        assert_eq!(a.reason.as_deref(), Some("also cover the auth module: and tests"));
    }

    #[test]
    fn trims_both_sides() {
        let a = parse("  deny  :   too risky  ");
        assert_eq!(a.decision, "deny");
        assert_eq!(a.reason.as_deref(), Some("too risky"));
    }

    #[test]
    fn empty_input_yields_empty_decision() {
        let a = parse("");
        assert_eq!(a.decision, "");
        assert_eq!(a.reason, None);
    }

    #[test]
    fn round_trip_law() {
        // parse(d + ": " + r) == {d, r} for d with no ':' and no surrounding whitespace.
        let d = "approve";
        let r = "looks fine, ship it";
        let a = parse(&format!("{}: {}", d, r));
        assert_eq!(a.decision, d);
        assert_eq!(a.reason.as_deref(), Some(r));
    }
}
