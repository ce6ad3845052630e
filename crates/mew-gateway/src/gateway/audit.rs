//! Append-only JSON-Lines audit logs (§6.3): envelope lifecycle events and capability
//! decisions, each in its own file, rotated by size. Writes are delegated to a background
//! task so the router never blocks on disk I/O (§9 design notes).

use std::path::PathBuf;

use serde::Serialize;
use tokio::{
    fs::OpenOptions,
    io::AsyncWriteExt,
    sync::mpsc::{self, UnboundedSender},
};

use crate::paths::Layout;

/// Bytes at which an audit file is rotated to `<name>.1.jsonl` before a fresh file is started.
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeLifecycleEvent {
    Received,
    Delivered,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeAuditRecord {
    pub event: EnvelopeLifecycleEvent,
    pub envelope_id: String,
    pub ts: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityCheckResult {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityAuditRecord {
    pub event: &'static str,
    pub result: CapabilityCheckResult,
    pub participant: String,
    pub envelope_id: String,
    pub required_capability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
}

enum AuditMessage {
    Envelope(EnvelopeAuditRecord),
    Capability(CapabilityAuditRecord),
}

/// Handle to the audit subsystem for one space. Cheap to clone; records are fire-and-forget.
#[derive(Clone)]
pub struct AuditLog {
    tx: Option<UnboundedSender<AuditMessage>>,
}

impl AuditLog {
    /// `envelope_history_enabled`/`capability_decisions_enabled` mirror the
    /// `ENVELOPE_HISTORY`/`CAPABILITY_DECISIONS` environment switches (§6.3); when both are
    /// false no background task is spawned at all.
    pub fn spawn(layout: Layout, envelope_history_enabled: bool, capability_decisions_enabled: bool) -> Self {
        if !envelope_history_enabled && !capability_decisions_enabled {
            return Self { tx: None };
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<AuditMessage>();
        tokio::spawn(async move {
            let _ = layout.ensure().await;
            let envelope_path = layout.envelope_history_path();
            let capability_path = layout.capability_decisions_path();

            while let Some(message) = rx.recv().await {
                let (path, enabled, line) = match message {
                    AuditMessage::Envelope(record) if envelope_history_enabled => {
                        (envelope_path.clone(), true, serde_json::to_string(&record))
                    }
                    AuditMessage::Envelope(_) => continue,
                    AuditMessage::Capability(record) if capability_decisions_enabled => {
                        (capability_path.clone(), true, serde_json::to_string(&record))
                    }
                    AuditMessage::Capability(_) => continue,
                };
                if !enabled {
                    continue;
                }
                let Ok(mut line) = line else { continue };
                line.push('\n');
                if let Err(error) = append_with_rotation(&path, line.as_bytes()).await {
                    tracing::warn!(?error, path = %path.display(), "failed to write audit record");
                }
            }
        });

        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record_envelope(&self, record: EnvelopeAuditRecord) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(AuditMessage::Envelope(record));
        }
    }

    pub fn record_capability(&self, record: CapabilityAuditRecord) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(AuditMessage::Capability(record));
        }
    }
}

async fn append_with_rotation(path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        if metadata.len() >= ROTATE_AT_BYTES {
            let rotated = path.with_extension("1.jsonl");
            let _ = tokio::fs::rename(path, &rotated).await;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(bytes).await
}

/// Read env switches the way the teacher reads `MCP_CENTER_ROOT`: empty/unset means enabled,
/// any value that parses as `false` disables (`GATEWAY_LOGGING`, `ENVELOPE_HISTORY`,
/// `CAPABILITY_DECISIONS`, §6.3).
pub fn env_flag_enabled(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => !value.eq_ignore_ascii_case("false") && value != "0",
        Err(_) => true,
    }
}
