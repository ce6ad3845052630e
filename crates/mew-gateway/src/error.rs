//! Library-level error type for configuration loading, space provisioning, and internal
//! invariant violations. Wire-visible `system/error` kinds (§6.5) are a separate, smaller
//! vocabulary defined in `gateway::router::ErrorKind` — this type is for failures that happen
//! before or outside the per-envelope routing pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to read space config at {path:?}")]
    ReadConfig { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse YAML space config at {path:?}")]
    ParseYaml { path: PathBuf, #[source] source: serde_yaml::Error },

    #[error("failed to parse JSON space config at {path:?}")]
    ParseJson { path: PathBuf, #[source] source: serde_json::Error },

    #[error("space config at {path:?} is invalid: {reason}")]
    InvalidSpaceConfig { path: Option<PathBuf>, reason: String },

    #[error("unknown token presented at connect")]
    Unauthorized,

    #[error("space '{0}' is not provisioned")]
    SpaceNotFound(String),

    #[error("participant id '{0}' is already connected")]
    IdConflict(String),

    #[error("failed to create directory {path:?}")]
    CreateDirectory { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to append audit record to {path:?}")]
    AuditWrite { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to bind listener on {addr}")]
    Bind { addr: String, #[source] source: std::io::Error },

    #[error("mcp subprocess failed to start: {command}")]
    McpSpawn { command: String, #[source] source: std::io::Error },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
