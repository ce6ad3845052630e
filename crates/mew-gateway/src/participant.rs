//! Gateway-side participant record (§3.2).

use serde::Serialize;

use crate::{capability::CapabilitySet, envelope::Envelope};

/// One unit of outbound traffic queued for a connection: either an envelope to JSON-encode as a
/// text frame, or a raw stream frame to send as binary (§3.3, §6.1).
pub enum OutboundMessage {
    Envelope(Envelope),
    RawFrame(Vec<u8>),
}

/// A participant as tracked by the gateway's per-space registry.
///
/// `outbound` is the single FIFO channel draining into that participant's connection; `None`
/// while the participant is known (e.g. from the space's configured token table) but not
/// currently connected.
pub struct Participant {
    pub id: String,
    pub capabilities: CapabilitySet,
    pub outbound: Option<tokio::sync::mpsc::UnboundedSender<OutboundMessage>>,
}

impl Participant {
    pub fn new(id: String, capabilities: CapabilitySet) -> Self {
        Self { id, capabilities, outbound: None }
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_some()
    }
}

/// Public summary used in `system/welcome` and `GET /participants` (no internal channels).
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    pub id: String,
    pub capabilities: Vec<crate::capability::CapabilityRule>,
    pub connected: bool,
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id.clone(),
            capabilities: participant.capabilities.effective_rules().cloned().collect(),
            connected: participant.is_connected(),
        }
    }
}
