//! The gateway router (§4.1): the authoritative per-space actor. `Space` owns the participant
//! registry, stream registry, and grant bookkeeping behind a single logical lock, matching the
//! "equivalent to a per-space mutex or a single-threaded actor" scheduling model (§5).

pub mod audit;
pub mod http;
pub mod router;
pub mod serve;
pub mod ws;

use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};

use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::{Mutex, mpsc::UnboundedSender};
use uuid::Uuid;

use crate::{
    capability::{CapabilityRule, CapabilitySet},
    config::SpaceConfig,
    envelope::Envelope,
    error::GatewayError,
    gateway::{
        audit::{AuditLog, CapabilityAuditRecord, CapabilityCheckResult, EnvelopeAuditRecord, EnvelopeLifecycleEvent},
        router::{ErrorKind, routing_targets},
    },
    kinds,
    participant::{OutboundMessage, Participant, ParticipantSummary},
    stream::{StreamDirection, StreamOpError, StreamRegistry},
};

/// What a successful `connect` call needs to hand back to the transport layer.
pub struct ConnectOutcome {
    pub participant_id: String,
    pub welcome: Envelope,
    pub presence_join: Envelope,
}

struct SpaceState {
    config: SpaceConfig,
    participants: HashMap<String, Participant>,
    streams: StreamRegistry,
    /// ids of every stream ever requested in this space, newest last; used only for the
    /// welcome/health summaries (`StreamRegistry` itself exposes lookup by id, not iteration).
    stream_ids_snapshot: Vec<String>,
    /// granter id -> (recipient id, rules granted), so a disconnect can revert them (§4.1, §8.4#6).
    issued_grants: HashMap<String, Vec<(String, Vec<CapabilityRule>)>>,
}

/// One space's authoritative state and routing logic.
pub struct Space {
    name: String,
    state: Mutex<SpaceState>,
    audit: AuditLog,
    started_at: Instant,
}

impl Space {
    pub fn new(config: SpaceConfig, audit: AuditLog) -> Self {
        let name = config.definition().name.clone();
        Self {
            name,
            state: Mutex::new(SpaceState {
                config,
                participants: HashMap::new(),
                streams: StreamRegistry::new(),
                stream_ids_snapshot: Vec::new(),
                issued_grants: HashMap::new(),
            }),
            audit,
            started_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seconds since this space's gateway process started serving (§6.2 health surface).
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Authenticate `token` and either attach to an existing participant record or create one.
    ///
    /// Reconnect policy (documented open question, see DESIGN.md): reconnecting with a token
    /// that maps to an id already connected REPLACES the previous connection rather than
    /// rejecting it — the old outbound channel is dropped (its read loop will observe a closed
    /// send side and tear itself down), and the new connection inherits the same capability
    /// base rules with any runtime grants cleared, per Welcome Idempotence (§8.2).
    pub async fn connect(&self, token: &str) -> Result<ConnectOutcome, GatewayError> {
        let mut state = self.state.lock().await;
        let rules = state
            .config
            .definition()
            .effective_rules_for_token(token)
            .ok_or(GatewayError::Unauthorized)?;
        let participant_id = state
            .config
            .definition()
            .tokens
            .get(token)
            .expect("token validated above")
            .participant_id
            .clone();

        state
            .participants
            .entry(participant_id.clone())
            .and_modify(|p| {
                p.outbound = None;
                p.capabilities = CapabilitySet::new(rules.clone());
            })
            .or_insert_with(|| Participant::new(participant_id.clone(), CapabilitySet::new(rules.clone())));

        let participants: Vec<ParticipantSummary> =
            state.participants.values().map(ParticipantSummary::from).collect();
        let active_streams: Vec<String> = state.streams_ids();

        let welcome = Envelope::system(
            kinds::SYSTEM_WELCOME,
            json!({
                "you": {"id": participant_id, "capabilities": rules},
                "participants": participants,
                "active_streams": active_streams,
            }),
        )
        .to(vec![participant_id.clone()])
        .build();

        let presence_join = Envelope::system(
            kinds::SYSTEM_PRESENCE,
            json!({"event": "join", "id": participant_id}),
        )
        .build();

        Ok(ConnectOutcome { participant_id, welcome, presence_join })
    }

    /// Register the live outbound channel for a connected participant (called once the
    /// transport's write half is ready to receive).
    pub async fn attach_outbound(&self, participant_id: &str, outbound: UnboundedSender<OutboundMessage>) {
        let mut state = self.state.lock().await;
        if let Some(participant) = state.participants.get_mut(participant_id) {
            participant.outbound = Some(outbound);
        }
    }

    /// Run the full ingress pipeline (§4.1) for an envelope from an authenticated sender.
    /// Returns the gateway-stamped envelope (for callers that need its assigned `id`/`ts`, e.g.
    /// the HTTP control plane's accepted-response body) together with the list of
    /// (recipient_id, envelope) pairs to deliver; delivery itself is the caller's job (it owns
    /// the outbound channels).
    pub async fn handle_envelope(
        &self,
        sender_id: &str,
        mut envelope: Envelope,
    ) -> (Envelope, Vec<(String, Envelope)>) {
        let mut state = self.state.lock().await;

        envelope.from = Some(sender_id.to_string());
        envelope.ts = Some(now_ts());
        let envelope_id = envelope.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        envelope.id = Some(envelope_id.clone());

        if envelope.protocol != crate::envelope::PROTOCOL {
            let protocol = envelope.protocol.clone();
            return (
                envelope,
                vec![(
                    sender_id.to_string(),
                    error_envelope(
                        ErrorKind::ProtocolError,
                        format!("unsupported protocol '{protocol}'"),
                        Some(&envelope_id),
                    ),
                )],
            );
        }

        let allowed = state
            .participants
            .get(sender_id)
            .is_some_and(|p| p.capabilities.allows(&envelope.kind, &envelope.payload));

        self.audit.record_capability(CapabilityAuditRecord {
            event: "capability_check",
            result: if allowed { CapabilityCheckResult::Allowed } else { CapabilityCheckResult::Denied },
            participant: sender_id.to_string(),
            envelope_id: envelope_id.clone(),
            required_capability: envelope.kind.clone(),
            matched_rule: None,
        });

        if !allowed {
            self.audit.record_envelope(EnvelopeAuditRecord {
                event: EnvelopeLifecycleEvent::Rejected,
                envelope_id: envelope_id.clone(),
                ts: envelope.ts.clone().unwrap_or_default(),
                from: sender_id.to_string(),
                to: None,
                kind: envelope.kind.clone(),
                reason: Some("capability_violation".to_string()),
            });
            return (
                envelope.clone(),
                vec![(sender_id.to_string(), capability_violation_envelope(&envelope.kind, &envelope_id))],
            );
        }

        self.audit.record_envelope(EnvelopeAuditRecord {
            event: EnvelopeLifecycleEvent::Received,
            envelope_id: envelope_id.clone(),
            ts: envelope.ts.clone().unwrap_or_default(),
            from: sender_id.to_string(),
            to: envelope.to.as_ref().map(|ids| ids.join(",")),
            kind: envelope.kind.clone(),
            reason: None,
        });

        let connected: HashSet<String> =
            state.participants.iter().filter(|(_, p)| p.is_connected()).map(|(id, _)| id.clone()).collect();

        let mut extra: Vec<(String, Envelope)> = Vec::new();
        if let Some(outcome) = state.apply_pre_routing(sender_id, &envelope, &envelope_id, &connected) {
            extra.extend(outcome);
        }

        let targets = routing_targets(sender_id, envelope.to.as_deref(), &envelope.kind, &connected);

        let mut deliveries: Vec<(String, Envelope)> =
            targets.into_iter().map(|id| (id, envelope.clone())).collect();
        deliveries.extend(extra);

        for (recipient, _) in &deliveries {
            self.audit.record_envelope(EnvelopeAuditRecord {
                event: EnvelopeLifecycleEvent::Delivered,
                envelope_id: envelope_id.clone(),
                ts: envelope.ts.clone().unwrap_or_default(),
                from: sender_id.to_string(),
                to: Some(recipient.clone()),
                kind: envelope.kind.clone(),
                reason: None,
            });
        }

        (envelope, deliveries)
    }

    /// Validate and forward a raw `#<stream_id>#<data>` frame (§4.1 send stream frame).
    pub async fn handle_stream_frame(
        &self,
        sender_id: &str,
        stream_id: &str,
        data: &[u8],
    ) -> Result<Vec<(String, Vec<u8>)>, ErrorKind> {
        let state = self.state.lock().await;
        state.streams.authorize_frame(stream_id, sender_id).map_err(|err| match err {
            StreamOpError::NotOwner => ErrorKind::UnauthorizedStreamWrite,
            StreamOpError::UnknownStream => ErrorKind::UnknownStream,
            StreamOpError::StreamClosed => ErrorKind::StreamClosed,
        })?;

        let frame = frame_bytes(stream_id, data);
        let recipients: Vec<String> = state
            .participants
            .iter()
            .filter(|(id, p)| id.as_str() != sender_id && p.is_connected())
            .map(|(id, _)| id.clone())
            .collect();
        Ok(recipients.into_iter().map(|id| (id, frame.clone())).collect())
    }

    /// Disconnect cleanup (§4.1, §8.4 scenario 6): close owned streams, revert grants issued by
    /// this participant, and return the broadcast-worthy envelopes (presence leave + stream
    /// closes) for the caller to deliver.
    pub async fn disconnect(&self, participant_id: &str) -> Vec<Envelope> {
        let mut state = self.state.lock().await;
        if let Some(participant) = state.participants.get_mut(participant_id) {
            participant.outbound = None;
        }

        let mut envelopes = Vec::new();

        for stream_id in state.streams.close_all_owned_by(participant_id) {
            envelopes.push(
                Envelope::system(kinds::STREAM_CLOSE, json!({"stream_id": stream_id})).build(),
            );
        }

        if let Some(grants) = state.issued_grants.remove(participant_id) {
            for (recipient, _) in grants {
                if let Some(p) = state.participants.get_mut(&recipient) {
                    p.capabilities.reset_to_base();
                }
            }
        }

        envelopes.push(
            Envelope::system(kinds::SYSTEM_PRESENCE, json!({"event": "leave", "id": participant_id}))
                .build(),
        );
        envelopes
    }

    /// Deliver one envelope to one participant's outbound queue, if it is currently connected.
    pub async fn send_envelope(&self, recipient: &str, envelope: Envelope) {
        let state = self.state.lock().await;
        if let Some(participant) = state.participants.get(recipient) {
            if let Some(outbound) = &participant.outbound {
                let _ = outbound.send(OutboundMessage::Envelope(envelope));
            }
        }
    }

    /// Deliver a raw binary stream frame, bypassing JSON encoding entirely.
    pub async fn send_raw(&self, recipient: &str, frame: Vec<u8>) {
        let state = self.state.lock().await;
        if let Some(participant) = state.participants.get(recipient) {
            if let Some(outbound) = &participant.outbound {
                let _ = outbound.send(OutboundMessage::RawFrame(frame));
            }
        }
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.participants.iter().filter(|(_, p)| p.is_connected()).map(|(id, _)| id.clone()).collect()
    }

    pub async fn participant_summaries(&self) -> Vec<ParticipantSummary> {
        let state = self.state.lock().await;
        state.participants.values().map(ParticipantSummary::from).collect()
    }

    pub async fn stream_count(&self) -> usize {
        let state = self.state.lock().await;
        state.streams_ids().len()
    }
}

impl SpaceState {
    fn streams_ids(&self) -> Vec<String> {
        self.stream_ids_snapshot.clone()
    }

    /// Kind-specific pre-routing handling (§4.1 step 5): stream lifecycle and capability
    /// grant/revoke control messages. Returns any *extra* envelopes to deliver beyond the
    /// normal routed copy (acks, stream/open, etc).
    fn apply_pre_routing(
        &mut self,
        sender_id: &str,
        envelope: &Envelope,
        envelope_id: &str,
        connected: &HashSet<String>,
    ) -> Option<Vec<(String, Envelope)>> {
        match envelope.kind.as_str() {
            kinds::STREAM_REQUEST => {
                Some(self.handle_stream_request(sender_id, envelope, envelope_id, connected))
            }
            kinds::STREAM_GRANT_WRITE => self.handle_stream_grant_write(sender_id, envelope, connected),
            kinds::STREAM_REVOKE_WRITE => self.handle_stream_revoke_write(sender_id, envelope, connected),
            kinds::STREAM_TRANSFER_OWNERSHIP => self.handle_stream_transfer(sender_id, envelope, connected),
            kinds::STREAM_CLOSE => self.handle_stream_close(sender_id, envelope),
            kinds::CAPABILITY_GRANT => self.handle_capability_grant(sender_id, envelope),
            kinds::CAPABILITY_REVOKE => self.handle_capability_revoke(sender_id, envelope),
            _ => None,
        }
    }

    fn handle_stream_request(
        &mut self,
        sender_id: &str,
        envelope: &Envelope,
        envelope_id: &str,
        connected: &HashSet<String>,
    ) -> Vec<(String, Envelope)> {
        let stream_id = Uuid::new_v4().to_string();
        let direction = match envelope.payload.get("direction").and_then(Value::as_str) {
            Some("download") => StreamDirection::Download,
            _ => StreamDirection::Upload,
        };
        let description =
            envelope.payload.get("description").and_then(Value::as_str).unwrap_or_default().to_string();
        let encoding =
            envelope.payload.get("encoding").and_then(Value::as_str).unwrap_or("utf-8").to_string();

        self.streams.request(stream_id.clone(), direction, description, encoding, sender_id.to_string());
        let _ = self.streams.open(&stream_id);
        self.stream_ids_snapshot.push(stream_id.clone());

        let open = Envelope::system(
            kinds::STREAM_OPEN,
            json!({"stream_id": stream_id, "owner": sender_id}),
        )
        .correlation_id(vec![envelope_id.to_string()])
        .build();

        broadcast_to(connected, open)
    }

    fn handle_stream_grant_write(
        &mut self,
        sender_id: &str,
        envelope: &Envelope,
        connected: &HashSet<String>,
    ) -> Option<Vec<(String, Envelope)>> {
        let stream_id = envelope.payload.get("stream_id")?.as_str()?.to_string();
        let participant_id = envelope.payload.get("participant_id")?.as_str()?.to_string();
        match self.streams.grant_write(&stream_id, sender_id, &participant_id) {
            Ok(writers) => Some(broadcast_to(
                connected,
                stream_ack_envelope(kinds::STREAM_WRITE_GRANTED, &stream_id, sender_id, writers),
            )),
            Err(_) => Some(vec![(
                sender_id.to_string(),
                error_envelope(ErrorKind::NotStreamOwner, format!("not the owner of stream '{stream_id}'"), None),
            )]),
        }
    }

    fn handle_stream_revoke_write(
        &mut self,
        sender_id: &str,
        envelope: &Envelope,
        connected: &HashSet<String>,
    ) -> Option<Vec<(String, Envelope)>> {
        let stream_id = envelope.payload.get("stream_id")?.as_str()?.to_string();
        let participant_id = envelope.payload.get("participant_id")?.as_str()?.to_string();
        match self.streams.revoke_write(&stream_id, sender_id, &participant_id) {
            Ok(writers) => Some(broadcast_to(
                connected,
                stream_ack_envelope(kinds::STREAM_WRITE_REVOKED, &stream_id, sender_id, writers),
            )),
            Err(_) => Some(vec![(
                sender_id.to_string(),
                error_envelope(ErrorKind::NotStreamOwner, format!("not the owner of stream '{stream_id}'"), None),
            )]),
        }
    }

    fn handle_stream_transfer(
        &mut self,
        sender_id: &str,
        envelope: &Envelope,
        connected: &HashSet<String>,
    ) -> Option<Vec<(String, Envelope)>> {
        let stream_id = envelope.payload.get("stream_id")?.as_str()?.to_string();
        let new_owner = envelope.payload.get("new_owner")?.as_str()?.to_string();
        match self.streams.transfer_ownership(&stream_id, sender_id, &new_owner) {
            Ok((previous_owner, writers)) => {
                let payload = json!({
                    "stream_id": stream_id,
                    "previous_owner": previous_owner,
                    "new_owner": new_owner,
                    "authorized_writers": writers,
                });
                let ack = Envelope::system(kinds::STREAM_OWNERSHIP_TRANSFERRED, payload).build();
                Some(broadcast_to(connected, ack))
            }
            Err(_) => Some(vec![(
                sender_id.to_string(),
                error_envelope(ErrorKind::NotStreamOwner, format!("not the owner of stream '{stream_id}'"), None),
            )]),
        }
    }

    fn handle_stream_close(&mut self, sender_id: &str, envelope: &Envelope) -> Option<Vec<(String, Envelope)>> {
        let stream_id = envelope.payload.get("stream_id")?.as_str()?.to_string();
        match self.streams.close(&stream_id, sender_id) {
            Ok(()) => {
                let notice =
                    Envelope::system(kinds::STREAM_CLOSE, json!({"stream_id": stream_id})).build();
                Some(vec![(sender_id.to_string(), notice)])
            }
            Err(_) => Some(vec![(
                sender_id.to_string(),
                error_envelope(ErrorKind::NotStreamOwner, format!("not the owner of stream '{stream_id}'"), None),
            )]),
        }
    }

    fn handle_capability_grant(
        &mut self,
        sender_id: &str,
        envelope: &Envelope,
    ) -> Option<Vec<(String, Envelope)>> {
        let recipient = envelope.payload.get("recipient")?.as_str()?.to_string();
        let rules: Vec<CapabilityRule> =
            serde_json::from_value(envelope.payload.get("capabilities")?.clone()).ok()?;

        let participant = self.participants.get_mut(&recipient)?;
        participant.capabilities.grant(rules.clone());

        self.issued_grants
            .entry(sender_id.to_string())
            .or_default()
            .push((recipient.clone(), rules));

        let ack = Envelope::system(kinds::CAPABILITY_GRANT_ACK, json!({"recipient": recipient})).build();
        Some(vec![(recipient, ack)])
    }

    fn handle_capability_revoke(
        &mut self,
        _sender_id: &str,
        envelope: &Envelope,
    ) -> Option<Vec<(String, Envelope)>> {
        let recipient = envelope.payload.get("recipient")?.as_str()?.to_string();
        let rules: Vec<CapabilityRule> =
            serde_json::from_value(envelope.payload.get("capabilities")?.clone()).ok()?;

        let participant = self.participants.get_mut(&recipient)?;
        participant.capabilities.revoke(&rules);

        let ack = Envelope::system(kinds::CAPABILITY_GRANT_ACK, json!({"recipient": recipient})).build();
        Some(vec![(recipient, ack)])
    }
}

/// Distributes a single broadcast-worthy envelope (a `stream/open` or stream control-plane ack,
/// §4.1 step 5) to every connected participant, cloning it per recipient.
fn broadcast_to(connected: &HashSet<String>, envelope: Envelope) -> Vec<(String, Envelope)> {
    connected.iter().map(|id| (id.clone(), envelope.clone())).collect()
}

fn stream_ack_envelope(kind: &str, stream_id: &str, owner: &str, writers: HashSet<String>) -> Envelope {
    let payload = json!({"stream_id": stream_id, "owner": owner, "authorized_writers": writers});
    Envelope::system(kind, payload).build()
}

/// Generic `system/error { error, message, envelope_id? }` (§6.5). `message` is a human-readable
/// description; callers needing a machine-readable detail add their own field (see
/// `capability_violation_envelope`'s `attempted_kind`).
fn error_envelope(kind: ErrorKind, message: impl Into<String>, envelope_id: Option<&str>) -> Envelope {
    let mut payload = json!({"error": kind.as_str(), "message": message.into()});
    if let Some(id) = envelope_id {
        payload["envelope_id"] = json!(id);
    }
    Envelope::system(kinds::SYSTEM_ERROR, payload).build()
}

/// `system/error { error: capability_violation, attempted_kind, envelope_id }` (§4.1 step 4,
/// §8.4 scenario 2) — `attempted_kind` is the machine-readable field; `message` stays a
/// human-readable summary rather than duplicating it.
fn capability_violation_envelope(attempted_kind: &str, envelope_id: &str) -> Envelope {
    let payload = json!({
        "error": ErrorKind::CapabilityViolation.as_str(),
        "message": format!("missing capability for '{attempted_kind}'"),
        "attempted_kind": attempted_kind,
        "envelope_id": envelope_id,
    });
    Envelope::system(kinds::SYSTEM_ERROR, payload).build()
}

fn frame_bytes(stream_id: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(stream_id.len() + data.len() + 2);
    out.push(b'#');
    out.extend_from_slice(stream_id.as_bytes());
    out.push(b'#');
    out.extend_from_slice(data);
    out
}

fn now_ts() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
