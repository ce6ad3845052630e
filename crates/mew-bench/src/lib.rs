use anyhow::{Context, Result};
use mew_gateway::{
    capability::CapabilityRule,
    envelope::{Envelope, EnvelopeBuilder},
    runtime::{
        Runtime,
        events::RuntimeEvent,
        tools::{ToolDescriptor, ToolFn},
    },
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Lightweight MEW participant client used for testing and debugging a running gateway.
///
/// Wraps [`mew_gateway::runtime::Runtime`] with the small set of conveniences a CLI or an
/// integration test needs: waiting for the welcome, sending a one-shot envelope, issuing a
/// correlated request, and rendering events as they arrive.
pub struct BenchClient {
    runtime: Runtime,
    welcome: WelcomeInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct WelcomeInfo {
    pub you: Value,
    pub participants: Value,
    pub active_streams: Value,
}

impl BenchClient {
    /// Connects to `url` (e.g. `ws://127.0.0.1:8765/ws?token=...`) and waits for the gateway's
    /// `system/welcome`.
    pub async fn connect(url: &str) -> Result<Self> {
        mew_gateway::runtime::validate_ws_url(url)?;
        let runtime = Runtime::connect(url).await.context("failed to connect to gateway")?;
        let mut events = runtime.subscribe();
        let welcome = wait_for_welcome(&mut events).await?;
        Ok(Self { runtime, welcome })
    }

    pub fn welcome(&self) -> &WelcomeInfo {
        &self.welcome
    }

    pub async fn participant_id(&self) -> String {
        self.runtime.participant_id().await
    }

    /// Subscribes to the live event stream; independent of any other subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.runtime.subscribe()
    }

    /// Sends a fire-and-forget envelope of `kind`, addressed to `to` (empty means broadcast).
    pub async fn send(&self, kind: &str, to: Vec<String>, payload: Value) -> Result<String> {
        self.runtime.send(build_envelope(kind, to, payload)).await
    }

    /// Sends an envelope of `kind` and awaits the reply correlated to it.
    pub async fn request(&self, kind: &str, to: Vec<String>, payload: Value) -> Result<Envelope> {
        self.runtime.request(build_envelope(kind, to, payload)).await
    }

    /// Calls a tool exposed by `to` (typically an MCP bridge participant) via `mcp/request`.
    pub async fn call_tool(&self, to: &str, name: &str, arguments: Value) -> Result<Value> {
        let payload = serde_json::json!({
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments},
        });
        let reply =
            self.request(mew_gateway::kinds::MCP_REQUEST, vec![to.to_string()], payload).await?;
        Ok(reply.payload)
    }

    /// Lists tools exposed by `to` via `mcp/request`.
    pub async fn list_tools(&self, to: &str) -> Result<Value> {
        let payload = serde_json::json!({"method": "tools/list"});
        let reply =
            self.request(mew_gateway::kinds::MCP_REQUEST, vec![to.to_string()], payload).await?;
        Ok(reply.payload)
    }

    /// Registers a locally-handled tool; the runtime answers `tools/list`/`tools/call` requests
    /// targeted at this participant out of the registry from then on (§4.2).
    pub async fn register_tool(&self, descriptor: ToolDescriptor, handler: ToolFn) {
        self.runtime.register_tool(descriptor, handler).await;
    }

    pub async fn request_stream(&self, direction: &str, description: &str, encoding: &str) -> Result<Envelope> {
        self.runtime.request_stream(direction, description, encoding).await
    }

    pub async fn send_stream_frame(&self, stream_id: &str, data: &[u8]) -> Result<()> {
        self.runtime.send_stream_frame(stream_id, data).await
    }

    pub async fn grant_stream_write(&self, stream_id: &str, participant_id: &str) -> Result<()> {
        self.runtime.grant_stream_write(stream_id, participant_id).await
    }

    pub async fn transfer_stream_ownership(&self, stream_id: &str, new_owner: &str) -> Result<()> {
        self.runtime.transfer_stream_ownership(stream_id, new_owner).await
    }

    /// Answers a request (`mcp/response`, `stream/*` acks, ...) by correlating back to the
    /// envelope id that triggered it.
    pub async fn reply(&self, kind: &str, to: &str, correlation_id: Vec<String>, payload: Value) -> Result<String> {
        let envelope = EnvelopeBuilder::new(kind)
            .to(vec![to.to_string()])
            .correlation_id(correlation_id)
            .payload(payload)
            .build();
        self.runtime.send(envelope).await
    }

    /// `capability/grant` (§3.4): extend `recipient`'s effective rule set at runtime.
    pub async fn grant_capability(&self, recipient: &str, rules: Vec<CapabilityRule>) -> Result<String> {
        let payload = serde_json::json!({"recipient": recipient, "capabilities": rules});
        self.send(mew_gateway::kinds::CAPABILITY_GRANT, vec![], payload).await
    }

    /// Closes the connection, triggering the gateway's disconnect cleanup (§4.1, §8.4#6).
    pub async fn disconnect(self) -> Result<()> {
        self.runtime.close().await
    }
}

fn build_envelope(kind: &str, to: Vec<String>, payload: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new(kind).payload(payload);
    if !to.is_empty() {
        builder = builder.to(to);
    }
    builder.build()
}

async fn wait_for_welcome(events: &mut broadcast::Receiver<RuntimeEvent>) -> Result<WelcomeInfo> {
    loop {
        match events.recv().await {
            Ok(RuntimeEvent::Welcome { you, participants, active_streams }) => {
                return Ok(WelcomeInfo { you, participants, active_streams });
            }
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                anyhow::bail!("connection closed before welcome was received")
            }
        }
    }
}

/// Renders a single runtime event the way the `watch` command prints it.
pub fn describe_event(event: &RuntimeEvent) -> String {
    match event {
        RuntimeEvent::Welcome { you, .. } => format!("welcome: you={you}"),
        RuntimeEvent::Envelope(envelope) => {
            let from = envelope.from.as_deref().unwrap_or("?");
            format!("{} from={from} payload={}", envelope.kind, envelope.payload)
        }
        RuntimeEvent::StreamFrame { stream_id, data } => {
            format!("stream/frame stream_id={stream_id} bytes={}", data.len())
        }
        RuntimeEvent::Disconnected => "disconnected".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_event_formats_disconnected() {
        assert_eq!(describe_event(&RuntimeEvent::Disconnected), "disconnected");
    }

    #[test]
    fn describe_event_formats_stream_frame() {
        let event = RuntimeEvent::StreamFrame { stream_id: "s1".into(), data: vec![1, 2, 3] };
        assert_eq!(describe_event(&event), "stream/frame stream_id=s1 bytes=3");
    }
}
