//! Canonical envelope schema (§3.1) and the wire-level JSON representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol literal accepted by this gateway. Any other value is a `protocol_error`.
pub const PROTOCOL: &str = "mew/v0.4";

/// A single envelope, as received from or delivered to a participant.
///
/// `kind` is free-form on the wire (`mcp/request`, `stream/open`, ...); the gateway does not
/// require a closed enum here because accepting unknown kinds is part of forward compatibility
/// (see `KindCategory` for the small amount of dispatch the router actually needs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<String>>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Vec<String>>,
    #[serde(default = "Value::default")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Envelope {
    /// Start building an envelope the gateway itself synthesizes (`system/*`, acks, ...).
    pub fn system(kind: impl Into<String>, payload: Value) -> EnvelopeBuilder {
        EnvelopeBuilder::new(kind).from("system:gateway").payload(payload)
    }

    /// Start building an envelope on behalf of an authenticated participant.
    pub fn from_participant(from: impl Into<String>, kind: impl Into<String>) -> EnvelopeBuilder {
        EnvelopeBuilder::new(kind).from(from)
    }

    /// Returns true when `to` is absent or empty, i.e. this is a broadcast envelope.
    pub fn is_broadcast(&self) -> bool {
        self.to.as_ref().map(|ids| ids.is_empty()).unwrap_or(true)
    }

    /// `kind` segments split on `/`, used by the capability matcher and echo-always rules.
    pub fn kind_category(&self) -> &str {
        self.kind.split('/').next().unwrap_or(&self.kind)
    }
}

/// Builder used both by the router (synthesized envelopes) and by the participant runtime.
pub struct EnvelopeBuilder {
    kind: String,
    from: Option<String>,
    to: Option<Vec<String>>,
    correlation_id: Option<Vec<String>>,
    payload: Value,
    context: Option<String>,
    id: Option<String>,
}

impl EnvelopeBuilder {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            from: None,
            to: None,
            correlation_id: None,
            payload: Value::Object(Default::default()),
            context: None,
            id: None,
        }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn to(mut self, to: Vec<String>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn correlation_id(mut self, ids: Vec<String>) -> Self {
        self.correlation_id = Some(ids);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn build(self) -> Envelope {
        Envelope {
            protocol: PROTOCOL.to_string(),
            id: self.id,
            ts: None,
            from: self.from,
            to: self.to,
            kind: self.kind,
            correlation_id: self.correlation_id,
            payload: self.payload,
            context: self.context,
        }
    }
}

/// Kinds the gateway synthesizes itself; these always echo back to the acting sender regardless
/// of whether that sender appears in `to` (§4.1.1).
pub fn is_echo_always_kind(kind: &str) -> bool {
    kind == "stream/open" || kind.starts_with("system/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_when_to_absent_or_empty() {
        let e = EnvelopeBuilder::new("chat").from("a").build();
        assert!(e.is_broadcast());

        let e = EnvelopeBuilder::new("chat").from("a").to(vec![]).build();
        assert!(e.is_broadcast());

        let e = EnvelopeBuilder::new("chat").from("a").to(vec!["b".into()]).build();
        assert!(!e.is_broadcast());
    }

    #[test]
    fn kind_category_splits_on_slash() {
        let e = EnvelopeBuilder::new("mcp/request").from("a").build();
        assert_eq!(e.kind_category(), "mcp");
    }

    #[test]
    fn echo_always_kinds() {
        assert!(is_echo_always_kind("stream/open"));
        assert!(is_echo_always_kind("system/presence"));
        assert!(!is_echo_always_kind("mcp/request"));
    }

    #[test]
    fn round_trips_through_json_preserving_unknown_kind() {
        let json = r#"{"protocol":"mew/v0.4","kind":"custom/thing","payload":{"x":1}}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.kind, "custom/thing");
        assert_eq!(envelope.payload["x"], 1);
    }
}
