//! Capability rules and the wildcard matcher (§3.4).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single capability rule: `{ kind: <pattern>, payload?: <partial matcher> }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRule {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CapabilityRule {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), payload: None }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Does this rule authorize sending an envelope with the given `kind`/`payload`?
    pub fn matches(&self, kind: &str, payload: &Value) -> bool {
        if !pattern_matches(&self.kind, kind) {
            return false;
        }
        match &self.payload {
            None => true,
            Some(matcher) => structural_match(matcher, payload),
        }
    }
}

/// `pattern` may end in `*` for a prefix match; otherwise it is an exact match.
fn pattern_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

/// Every field present in `matcher` must be present in `value` and match by the same rules
/// (deep structural equality, trailing-`*` wildcards on strings, recursive on objects).
fn structural_match(matcher: &Value, value: &Value) -> bool {
    match (matcher, value) {
        (Value::Object(matcher_fields), Value::Object(value_fields)) => {
            matcher_fields.iter().all(|(key, expected)| {
                value_fields.get(key).is_some_and(|actual| structural_match(expected, actual))
            })
        }
        (Value::String(pattern), Value::String(actual)) => pattern_matches(pattern, actual),
        (matcher, value) => matcher == value,
    }
}

/// A participant's effective rule set: configured (base) rules plus runtime grants.
///
/// Kept as two separate vectors rather than one merged list so that `capability/revoke` can
/// remove exactly the granted rules without being able to touch base rules (§4.3).
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    base: Vec<CapabilityRule>,
    granted: Vec<CapabilityRule>,
}

impl CapabilitySet {
    pub fn new(base: Vec<CapabilityRule>) -> Self {
        Self { base, granted: Vec::new() }
    }

    pub fn base_rules(&self) -> &[CapabilityRule] {
        &self.base
    }

    /// All rules currently in effect: base ∪ granted.
    pub fn effective_rules(&self) -> impl Iterator<Item = &CapabilityRule> {
        self.base.iter().chain(self.granted.iter())
    }

    pub fn allows(&self, kind: &str, payload: &Value) -> bool {
        self.effective_rules().any(|rule| rule.matches(kind, payload))
    }

    /// Extend the effective set with newly granted rules. Duplicates (by structural equality)
    /// are not re-added.
    pub fn grant(&mut self, rules: Vec<CapabilityRule>) {
        for rule in rules {
            if !self.granted.contains(&rule) {
                self.granted.push(rule);
            }
        }
    }

    /// Remove previously granted rules matching the given ones by structural equality.
    /// Base rules are never removed by this path (§4.3).
    pub fn revoke(&mut self, rules: &[CapabilityRule]) {
        self.granted.retain(|existing| !rules.contains(existing));
    }

    /// Drop every granted rule, keeping only the configured base set. Used when a grant's
    /// issuer disconnects (§4.1 disconnect cleanup, §8.4 scenario 6).
    pub fn reset_to_base(&mut self) {
        self.granted.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn exact_kind_match() {
        let rule = CapabilityRule::new("chat");
        assert!(rule.matches("chat", &json!({})));
        assert!(!rule.matches("chatter", &json!({})));
    }

    #[test]
    fn trailing_wildcard_matches_prefix() {
        let rule = CapabilityRule::new("mcp/*");
        assert!(rule.matches("mcp/request", &json!({})));
        assert!(rule.matches("mcp/response", &json!({})));
        assert!(!rule.matches("chat", &json!({})));
    }

    #[test]
    fn nested_payload_wildcard() {
        let rule =
            CapabilityRule::new("mcp/request").with_payload(json!({"method": "tools/*"}));
        assert!(rule.matches("mcp/request", &json!({"method": "tools/list"})));
        assert!(rule.matches("mcp/request", &json!({"method": "tools/call"})));
        assert!(!rule.matches("mcp/request", &json!({"method": "resources/list"})));
    }

    #[test]
    fn payload_matcher_requires_only_listed_fields() {
        let rule = CapabilityRule::new("mcp/request").with_payload(json!({"method": "tools/call"}));
        assert!(rule.matches(
            "mcp/request",
            &json!({"method": "tools/call", "extra_field_not_in_rule": true})
        ));
    }

    #[test]
    fn grant_and_revoke_round_trip() {
        let mut set = CapabilitySet::new(vec![CapabilityRule::new("chat")]);
        assert!(!set.allows("mcp/request", &json!({})));

        set.grant(vec![CapabilityRule::new("mcp/*")]);
        assert!(set.allows("mcp/request", &json!({})));

        set.revoke(&[CapabilityRule::new("mcp/*")]);
        assert!(!set.allows("mcp/request", &json!({})));
    }

    #[test]
    fn revoke_cannot_remove_base_rules() {
        let mut set = CapabilitySet::new(vec![CapabilityRule::new("chat")]);
        set.revoke(&[CapabilityRule::new("chat")]);
        assert!(set.allows("chat", &json!({})));
    }

    #[test]
    fn reset_to_base_clears_only_grants() {
        let mut set = CapabilitySet::new(vec![CapabilityRule::new("chat")]);
        set.grant(vec![CapabilityRule::new("mcp/*")]);
        set.reset_to_base();
        assert!(set.allows("chat", &json!({})));
        assert!(!set.allows("mcp/request", &json!({})));
    }
}
