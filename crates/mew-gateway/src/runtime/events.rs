//! Typed event surface exposed to runtime consumers, carried over a `tokio::sync::broadcast`
//! channel so multiple observers (a CLI's renderer, a test harness) can subscribe independently.

use serde_json::Value;

use crate::envelope::Envelope;

#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// `system/welcome` was received; connection is fully established.
    Welcome { you: Value, participants: Value, active_streams: Value },
    /// Any other envelope addressed to or broadcast past this participant.
    Envelope(Envelope),
    /// A raw stream frame on an open stream this participant is subscribed to.
    StreamFrame { stream_id: String, data: Vec<u8> },
    /// The underlying connection dropped.
    Disconnected,
}
