//! Pure routing/error-kind logic (§4.1.1, §6.5), kept free of I/O so it is trivially unit
//! testable; `gateway::Space` drives these functions and performs the actual delivery.

use std::collections::HashSet;

use crate::envelope::is_echo_always_kind;

/// Wire-visible `system/error` kinds (§6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    ProtocolError,
    Unauthorized,
    CapabilityViolation,
    NotStreamOwner,
    UnauthorizedStreamWrite,
    UnknownStream,
    StreamClosed,
    UnknownTarget,
    RateLimited,
    ShuttingDown,
    InternalError,
    Timeout,
    MethodNotFound,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::CapabilityViolation => "capability_violation",
            ErrorKind::NotStreamOwner => "not_stream_owner",
            ErrorKind::UnauthorizedStreamWrite => "unauthorized_stream_write",
            ErrorKind::UnknownStream => "unknown_stream",
            ErrorKind::StreamClosed => "stream_closed",
            ErrorKind::UnknownTarget => "unknown_target",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ShuttingDown => "shutting_down",
            ErrorKind::InternalError => "internal_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MethodNotFound => "method_not_found",
        }
    }
}

/// Compute the final set of recipient ids for envelope `kind` sent by `sender`, given the
/// envelope's declared `to` and the set of currently-connected participant ids (§4.1.1).
pub fn routing_targets(
    sender: &str,
    to: Option<&[String]>,
    kind: &str,
    connected: &HashSet<String>,
) -> Vec<String> {
    match to {
        None => connected.iter().cloned().collect(),
        Some(ids) if ids.is_empty() => connected.iter().cloned().collect(),
        Some(ids) => {
            let mut targets: HashSet<String> =
                ids.iter().filter(|id| connected.contains(*id)).cloned().collect();
            let sender_named = ids.iter().any(|id| id == sender);
            if sender_named || is_echo_always_kind(kind) {
                targets.insert(sender.to_string());
            }
            targets.into_iter().collect()
        }
    }
}
