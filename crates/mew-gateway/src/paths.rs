//! Filesystem layout helpers for a running gateway (audit logs, per-space directories).

use std::{env, path::PathBuf};

use crate::error::GatewayError;

const ROOT_ENV_KEY: &str = "MEW_ROOT";
const DEFAULT_ROOT_DIRNAME: &str = ".mew";

/// Descriptor for the on-disk directory structure of one space's runtime data.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
    audit_dir: PathBuf,
}

impl Layout {
    pub fn new(root: PathBuf, space_name: &str) -> Self {
        let audit_dir = root.join("spaces").join(space_name).join("audit");
        Self { root, audit_dir }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn audit_dir(&self) -> &std::path::Path {
        &self.audit_dir
    }

    pub fn envelope_history_path(&self) -> PathBuf {
        self.audit_dir.join("envelope-history.jsonl")
    }

    pub fn capability_decisions_path(&self) -> PathBuf {
        self.audit_dir.join("capability-decisions.jsonl")
    }

    pub async fn ensure(&self) -> Result<(), GatewayError> {
        tokio::fs::create_dir_all(&self.audit_dir).await.map_err(|source| {
            GatewayError::CreateDirectory { path: self.audit_dir.clone(), source }
        })
    }
}

/// Determine the default root directory for gateway runtime data.
pub fn default_root() -> PathBuf {
    if let Ok(value) = env::var(ROOT_ENV_KEY) {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }

    user_home_dir().map(|home| home.join(DEFAULT_ROOT_DIRNAME)).unwrap_or_else(|| PathBuf::from(".mew"))
}

fn user_home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.is_empty() {
            return Some(PathBuf::from(profile));
        }
    }
    None
}
