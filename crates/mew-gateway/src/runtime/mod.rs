//! Participant Runtime (§4.2): the client-side SDK used by anything that connects to a gateway
//! as a participant — the MCP bridge, the bench/test client, or a future agent host. Wraps a
//! WebSocket connection, correlates requests with replies, and exposes a typed event stream.

pub mod events;
pub mod pending;
pub mod tools;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::{
    envelope::{Envelope, EnvelopeBuilder},
    gateway::{router::ErrorKind, ws::parse_stream_frame},
    runtime::{events::RuntimeEvent, pending::PendingRequests, tools::ToolRegistry},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Outbound {
    tx: mpsc::UnboundedSender<Message>,
}

/// A live connection to a gateway, speaking the envelope protocol over a WebSocket.
pub struct Runtime {
    id: Arc<Mutex<String>>,
    outbound: Outbound,
    events: broadcast::Sender<RuntimeEvent>,
    pending: Arc<Mutex<PendingRequests>>,
    tools: Arc<Mutex<ToolRegistry>>,
}

impl Runtime {
    /// Connect to `url` (e.g. `ws://127.0.0.1:8765/ws?token=...`) and run the background read
    /// loop. The returned runtime is ready to `send`/`request` once the first `RuntimeEvent`
    /// (normally `Welcome`) has been observed by a subscriber.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) =
            connect_async(url).await.with_context(|| format!("failed to connect to {url}"))?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pending = Arc::new(Mutex::new(PendingRequests::default()));
        let tools = Arc::new(Mutex::new(ToolRegistry::default()));
        let id = Arc::new(Mutex::new(String::new()));

        let outbound_tx_reader = outbound_tx.clone();

        let runtime = Self {
            id: id.clone(),
            outbound: Outbound { tx: outbound_tx },
            events: events_tx.clone(),
            pending: pending.clone(),
            tools: tools.clone(),
        };

        tokio::spawn(async move {
            while let Some(Ok(message)) = source.next().await {
                match message {
                    Message::Text(text) => {
                        handle_incoming(&text, &events_tx, &pending, &id, &tools, &outbound_tx_reader).await
                    }
                    Message::Binary(bytes) => {
                        if let Some((stream_id, data)) = parse_stream_frame(&bytes) {
                            let _ = events_tx.send(RuntimeEvent::StreamFrame {
                                stream_id: stream_id.to_string(),
                                data: data.to_vec(),
                            });
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            let _ = events_tx.send(RuntimeEvent::Disconnected);
        });

        Ok(runtime)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    pub fn tools(&self) -> Arc<Mutex<ToolRegistry>> {
        self.tools.clone()
    }

    /// Fire-and-forget send; does not wait for any reply.
    pub async fn send(&self, envelope: Envelope) -> Result<String> {
        let id = envelope.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut envelope = envelope;
        envelope.id = Some(id.clone());
        self.write(&envelope)?;
        Ok(id)
    }

    /// Send `envelope` and await a reply whose `correlation_id` names it (§4.2).
    pub async fn request(&self, envelope: Envelope) -> Result<Envelope> {
        let id = envelope.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut envelope = envelope;
        envelope.id = Some(id.clone());

        let receiver = self.pending.lock().await.register(id);
        self.write(&envelope)?;
        receiver.await.context("connection closed while awaiting reply")
    }

    pub async fn register_tool(
        &self,
        descriptor: tools::ToolDescriptor,
        handler: tools::ToolFn,
    ) {
        self.tools.lock().await.register(descriptor, handler);
    }

    /// `mcp/proposal` (§3.1): a participant lacking direct capability proposes an action for
    /// another to execute on its behalf.
    pub async fn propose(&self, to: Vec<String>, payload: Value) -> Result<String> {
        let envelope = EnvelopeBuilder::new(crate::kinds::MCP_PROPOSAL).to(to).payload(payload).build();
        self.send(envelope).await
    }

    pub async fn request_stream(
        &self,
        direction: &str,
        description: &str,
        encoding: &str,
    ) -> Result<Envelope> {
        let payload = serde_json::json!({"direction": direction, "description": description, "encoding": encoding});
        let envelope = EnvelopeBuilder::new(crate::kinds::STREAM_REQUEST).payload(payload).build();
        self.request(envelope).await
    }

    pub async fn send_stream_frame(&self, stream_id: &str, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(stream_id.len() + data.len() + 2);
        frame.push(b'#');
        frame.extend_from_slice(stream_id.as_bytes());
        frame.push(b'#');
        frame.extend_from_slice(data);
        self.outbound
            .tx
            .send(Message::Binary(frame.into()))
            .map_err(|_| anyhow::anyhow!("outbound channel closed"))
    }

    pub async fn grant_stream_write(&self, stream_id: &str, participant_id: &str) -> Result<()> {
        let payload = serde_json::json!({"stream_id": stream_id, "participant_id": participant_id});
        self.send(EnvelopeBuilder::new(crate::kinds::STREAM_GRANT_WRITE).payload(payload).build()).await?;
        Ok(())
    }

    pub async fn revoke_stream_write(&self, stream_id: &str, participant_id: &str) -> Result<()> {
        let payload = serde_json::json!({"stream_id": stream_id, "participant_id": participant_id});
        self.send(EnvelopeBuilder::new(crate::kinds::STREAM_REVOKE_WRITE).payload(payload).build()).await?;
        Ok(())
    }

    pub async fn transfer_stream_ownership(&self, stream_id: &str, new_owner: &str) -> Result<()> {
        let payload = serde_json::json!({"stream_id": stream_id, "new_owner": new_owner});
        self.send(EnvelopeBuilder::new(crate::kinds::STREAM_TRANSFER_OWNERSHIP).payload(payload).build())
            .await?;
        Ok(())
    }

    pub async fn participant_id(&self) -> String {
        self.id.lock().await.clone()
    }

    /// Sends a close frame, prompting the gateway to run its disconnect cleanup (§4.1).
    pub async fn close(&self) -> Result<()> {
        self.outbound
            .tx
            .send(Message::Close(None))
            .map_err(|_| anyhow::anyhow!("outbound channel closed"))
    }

    fn write(&self, envelope: &Envelope) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        self.outbound
            .tx
            .send(Message::Text(text.into()))
            .map_err(|_| anyhow::anyhow!("outbound channel closed"))?;
        Ok(())
    }
}

async fn handle_incoming(
    text: &str,
    events: &broadcast::Sender<RuntimeEvent>,
    pending: &Arc<Mutex<PendingRequests>>,
    id: &Arc<Mutex<String>>,
    tools: &Arc<Mutex<ToolRegistry>>,
    outbound: &mpsc::UnboundedSender<Message>,
) {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return;
    };

    if envelope.kind == crate::kinds::SYSTEM_WELCOME {
        let you = envelope.payload.get("you").cloned().unwrap_or_default();
        if let Some(my_id) = you.get("id").and_then(Value::as_str) {
            *id.lock().await = my_id.to_string();
        }
        let participants = envelope.payload.get("participants").cloned().unwrap_or_default();
        let active_streams = envelope.payload.get("active_streams").cloned().unwrap_or_default();
        let _ = events.send(RuntimeEvent::Welcome { you, participants, active_streams });
        return;
    }

    if let Some(correlation_id) = &envelope.correlation_id {
        if pending.lock().await.resolve(correlation_id, &envelope) {
            return;
        }
    }

    if envelope.kind == crate::kinds::MCP_REQUEST {
        let self_id = id.lock().await.clone();
        let addressed_to_self = envelope.to.as_ref().is_some_and(|to| to.iter().any(|t| t == &self_id));
        if addressed_to_self && dispatch_tool_request(&envelope, tools, &self_id, outbound).await {
            return;
        }
    }

    let _ = events.send(RuntimeEvent::Envelope(envelope));
}

/// Answers an `mcp/request` addressed to this participant out of its local `ToolRegistry`
/// (§4.2: `register_tool` "automatically answers `tools/list` and `tools/call` requests
/// targeted at it"). Returns `false` (leaving the envelope to be surfaced as a normal
/// `RuntimeEvent::Envelope`) when nothing is registered to handle it, so a participant that
/// never calls `register_tool` behaves exactly as before.
async fn dispatch_tool_request(
    envelope: &Envelope,
    tools: &Arc<Mutex<ToolRegistry>>,
    self_id: &str,
    outbound: &mpsc::UnboundedSender<Message>,
) -> bool {
    let registry = tools.lock().await;
    if registry.is_empty() {
        return false;
    }

    let Some(request_id) = envelope.id.clone() else { return false };
    let Some(from) = envelope.from.clone() else { return false };
    let method = envelope.payload.get("method").and_then(Value::as_str).unwrap_or_default();

    let reply_payload = match method {
        "initialize" => json!({
            "protocolVersion": crate::envelope::PROTOCOL,
            "capabilities": {"tools": {}},
            "serverInfo": {"name": self_id, "version": env!("CARGO_PKG_VERSION")},
        }),
        "tools/list" => {
            let tools = registry
                .descriptors()
                .into_iter()
                .map(|d| json!({"name": d.name, "description": d.description, "inputSchema": d.input_schema}))
                .collect::<Vec<_>>();
            json!({"tools": tools})
        }
        "tools/call" => {
            let name = envelope.payload.get("params").and_then(|p| p.get("name")).and_then(Value::as_str).unwrap_or_default();
            let arguments =
                envelope.payload.get("params").and_then(|p| p.get("arguments")).cloned().unwrap_or(Value::Null);
            match registry.call(name, arguments).await {
                Ok(result) => result,
                Err(error) => json!({
                    "error": {"code": ErrorKind::MethodNotFound.as_str(), "message": error.to_string()},
                }),
            }
        }
        other => json!({
            "error": {"code": ErrorKind::MethodNotFound.as_str(), "message": format!("unsupported method '{other}'")},
        }),
    };

    let response = EnvelopeBuilder::new(crate::kinds::MCP_RESPONSE)
        .to(vec![from])
        .correlation_id(vec![request_id])
        .payload(reply_payload)
        .build();

    if let Ok(text) = serde_json::to_string(&response) {
        let _ = outbound.send(Message::Text(text.into()));
    }
    true
}

/// Returns an error describing why `url` cannot possibly be a gateway WebSocket endpoint,
/// without attempting to connect — used to fail fast on obviously malformed input.
pub fn validate_ws_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        bail!("URL scheme must be ws or wss, got '{}'", parsed.scheme());
    }
    Ok(())
}
