//! Shared scaffolding for the end-to-end scenario tests (§8.4): boot a real gateway on a
//! loopback port and hand back its WebSocket base URL, mirroring the daemon's old
//! `tests/http_api.rs` style of driving a real in-process server over a real socket.

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use mew_gateway::{
    capability::CapabilityRule,
    config::{ParticipantKind, ParticipantSpec, SpaceConfig, SpaceDefinition, TokenSpec},
    envelope::Envelope,
    gateway::{Space, audit::AuditLog, http, ws},
    runtime::events::RuntimeEvent,
};
use tokio::{net::TcpListener, sync::broadcast};

/// One entry in a test space: participant id, its auth token, and the capability kinds it's
/// granted (exact kinds or trailing-`*` patterns, see `CapabilityRule`).
pub struct ParticipantFixture {
    pub id: &'static str,
    pub token: &'static str,
    pub capabilities: &'static [&'static str],
}

pub fn participant(id: &'static str, token: &'static str, capabilities: &'static [&'static str]) -> ParticipantFixture {
    ParticipantFixture { id, token, capabilities }
}

pub struct TestGateway {
    pub addr: SocketAddr,
}

impl TestGateway {
    pub async fn start(fixtures: &[ParticipantFixture]) -> Self {
        let mut participants = BTreeMap::new();
        let mut tokens = BTreeMap::new();

        for fixture in fixtures {
            let rules: Vec<CapabilityRule> =
                fixture.capabilities.iter().map(|kind| CapabilityRule::new(*kind)).collect();
            participants.insert(
                fixture.id.to_string(),
                ParticipantSpec {
                    kind: ParticipantKind::Local,
                    command: None,
                    args: Vec::new(),
                    env: BTreeMap::new(),
                    tokens: vec![fixture.token.to_string()],
                    capabilities: rules,
                },
            );
            tokens.insert(
                fixture.token.to_string(),
                TokenSpec { participant_id: fixture.id.to_string(), capabilities: Vec::new() },
            );
        }

        let definition = SpaceDefinition {
            name: "test-space".to_string(),
            description: None,
            participants,
            tokens,
        };
        let config = SpaceConfig::new(definition).expect("fixture space config is valid");
        let space = Arc::new(Space::new(config, AuditLog::disabled()));

        let ws_router = Router::new().route("/ws", get(ws::upgrade)).with_state(space.clone());
        let control_router = http::router(space.clone(), None);
        let app = ws_router.merge(control_router);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("listener has a local addr");

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr }
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={token}", self.addr)
    }
}

/// Waits (with a timeout, so a hung test fails fast instead of stalling the suite) for the
/// next envelope of `kind` on `events`, skipping anything else in between.
pub async fn recv_kind(events: &mut broadcast::Receiver<RuntimeEvent>, kind: &str) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await.expect("event channel closed before expected envelope") {
                RuntimeEvent::Envelope(envelope) if envelope.kind == kind => return envelope,
                _ => continue,
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for envelope kind '{kind}'"))
}

/// Waits for the next stream frame on `events`.
pub async fn recv_stream_frame(events: &mut broadcast::Receiver<RuntimeEvent>) -> (String, Vec<u8>) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await.expect("event channel closed before expected stream frame") {
                RuntimeEvent::StreamFrame { stream_id, data } => return (stream_id, data),
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for a stream frame")
}

/// Asserts that no stream frame arrives within a short window, i.e. a write was rejected.
pub async fn assert_no_stream_frame(events: &mut broadcast::Receiver<RuntimeEvent>) {
    let outcome = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            match events.recv().await.expect("event channel closed") {
                RuntimeEvent::StreamFrame { stream_id, data } => return Some((stream_id, data)),
                _ => continue,
            }
        }
    })
    .await;
    assert!(outcome.is_err(), "expected no stream frame, but one arrived: {outcome:?}");
}
