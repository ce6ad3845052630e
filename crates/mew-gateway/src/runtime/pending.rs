//! Correlation tables for the request/response and stream-request/stream-open patterns layered
//! on top of the fire-and-forget envelope transport (§4.2).

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::envelope::Envelope;

/// Outstanding `request()` calls awaiting a reply whose `correlation_id` names the original
/// envelope's id.
#[derive(Default)]
pub struct PendingRequests {
    by_envelope_id: HashMap<String, oneshot::Sender<Envelope>>,
}

impl PendingRequests {
    pub fn register(&mut self, envelope_id: String) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.by_envelope_id.insert(envelope_id, tx);
        rx
    }

    /// Resolve any pending request whose id appears in `correlation_id`. Returns true if a
    /// waiter was found and notified.
    pub fn resolve(&mut self, correlation_id: &[String], envelope: &Envelope) -> bool {
        for id in correlation_id {
            if let Some(tx) = self.by_envelope_id.remove(id) {
                let _ = tx.send(envelope.clone());
                return true;
            }
        }
        false
    }

    pub fn cancel_all(&mut self) {
        self.by_envelope_id.clear();
    }
}
