//! MCP Bridge: a participant that proxies a locally spawned MCP server subprocess into a space.
//! On `system/welcome` it spawns the subprocess, lists its tools, and from then on answers
//! `mcp/request` envelopes (`tools/list`, `tools/call`) by forwarding to the child process and
//! replying with `mcp/response`, correlating the bridge-local rmcp call with the envelope id
//! that triggered it. A subprocess that exits is respawned with exponential backoff.

pub mod stdio;

use std::{collections::BTreeMap, time::Duration};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::{envelope::EnvelopeBuilder, kinds, runtime::{Runtime, events::RuntimeEvent}};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct BridgeConfig {
    pub gateway_url: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Run the bridge until the connection closes permanently or the process is killed.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let runtime = Runtime::connect(&config.gateway_url).await.context("failed to connect to gateway")?;
    let mut events = runtime.subscribe();

    loop {
        match events.recv().await {
            Ok(RuntimeEvent::Welcome { .. }) => break,
            Ok(_) => continue,
            Err(_) => anyhow::bail!("connection closed before welcome was received"),
        }
    }

    let subprocess = spawn_with_backoff(&config).await?;
    let subprocess = Mutex::new(subprocess);

    loop {
        match events.recv().await {
            Ok(RuntimeEvent::Envelope(envelope)) if envelope.kind == kinds::MCP_REQUEST => {
                let reply = handle_mcp_request(&subprocess, &envelope.payload, &config).await;
                let response = EnvelopeBuilder::new(kinds::MCP_RESPONSE)
                    .to(vec![envelope.from.clone().unwrap_or_default()])
                    .correlation_id(vec![envelope.id.clone().unwrap_or_default()])
                    .payload(reply)
                    .build();
                let _ = runtime.send(response).await;
            }
            Ok(RuntimeEvent::Disconnected) => {
                anyhow::bail!("gateway connection dropped");
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    Ok(())
}

async fn handle_mcp_request(
    subprocess: &Mutex<stdio::McpSubprocess>,
    payload: &Value,
    config: &BridgeConfig,
) -> Value {
    let method = payload.get("method").and_then(Value::as_str).unwrap_or_default();
    let name = payload.get("params").and_then(|p| p.get("name")).and_then(Value::as_str).unwrap_or_default();
    let arguments = payload.get("params").and_then(|p| p.get("arguments")).cloned().unwrap_or(Value::Null);

    match dispatch(subprocess, method, name, arguments.clone()).await {
        Ok(value) => value,
        // The subprocess may have exited; respawn once with backoff and retry before giving up.
        Err(_) => match spawn_with_backoff(config).await {
            Ok(fresh) => {
                *subprocess.lock().await = fresh;
                dispatch(subprocess, method, name, arguments)
                    .await
                    .unwrap_or_else(|error| json!({"error": error.to_string()}))
            }
            Err(error) => json!({"error": error.to_string()}),
        },
    }
}

async fn dispatch(
    subprocess: &Mutex<stdio::McpSubprocess>,
    method: &str,
    name: &str,
    arguments: Value,
) -> Result<Value> {
    match method {
        "tools/list" => subprocess.lock().await.list_tools().await.map(|tools| json!({"tools": tools})),
        "tools/call" => subprocess.lock().await.call_tool(name, arguments).await,
        other => anyhow::bail!("unsupported method '{other}'"),
    }
}

async fn spawn_with_backoff(config: &BridgeConfig) -> Result<stdio::McpSubprocess> {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match stdio::McpSubprocess::spawn(&config.command, &config.args, &config.env).await {
            Ok(subprocess) => return Ok(subprocess),
            Err(error) => {
                tracing::warn!(?error, backoff_ms = backoff.as_millis(), "mcp subprocess failed to start, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
