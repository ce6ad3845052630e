//! Space configuration document (§6.4): name, participants, and the token→participant table.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{capability::CapabilityRule, error::GatewayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    Local,
    Remote,
    Human,
}

/// One entry of the `participants` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSpec {
    #[serde(rename = "type")]
    pub kind: ParticipantKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityRule>,
}

/// One entry of the `tokens` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSpec {
    pub participant_id: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityRule>,
}

/// The parsed, not-yet-validated document as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub participants: BTreeMap<String, ParticipantSpec>,
    #[serde(default)]
    pub tokens: BTreeMap<String, TokenSpec>,
}

impl SpaceDefinition {
    /// Validate cross-references: every token's `participant_id` must name a declared
    /// participant, and the space must have a non-empty name.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.name.trim().is_empty() {
            return Err(GatewayError::InvalidSpaceConfig {
                path: None,
                reason: "space name must not be empty".to_string(),
            });
        }
        for (token, spec) in &self.tokens {
            if !self.participants.contains_key(&spec.participant_id) {
                return Err(GatewayError::InvalidSpaceConfig {
                    path: None,
                    reason: format!(
                        "token '{token}' references unknown participant '{}'",
                        spec.participant_id
                    ),
                });
            }
        }
        Ok(())
    }

    /// Effective capability rules for a token: the token's own rules plus its participant's
    /// declared rules.
    pub fn effective_rules_for_token(&self, token: &str) -> Option<Vec<CapabilityRule>> {
        let spec = self.tokens.get(token)?;
        let participant = self.participants.get(&spec.participant_id)?;
        let mut rules = participant.capabilities.clone();
        rules.extend(spec.capabilities.iter().cloned());
        Some(rules)
    }
}

/// A loaded, validated space configuration plus the path it came from (if any).
#[derive(Debug, Clone)]
pub struct SpaceConfig {
    definition: SpaceDefinition,
    source: Option<PathBuf>,
}

impl SpaceConfig {
    pub fn new(definition: SpaceDefinition) -> Result<Self, GatewayError> {
        definition.validate()?;
        Ok(Self { definition, source: None })
    }

    /// Load from a YAML (`.yaml`/`.yml`) or JSON (`.json`) file, sniffed by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|source| GatewayError::ReadConfig { path: path.to_path_buf(), source })?;

        let definition: SpaceDefinition = if is_json_path(path) {
            serde_json::from_str(&content)
                .map_err(|source| GatewayError::ParseJson { path: path.to_path_buf(), source })?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|source| GatewayError::ParseYaml { path: path.to_path_buf(), source })?
        };

        definition.validate().map_err(|err| match err {
            GatewayError::InvalidSpaceConfig { reason, .. } => {
                GatewayError::InvalidSpaceConfig { path: Some(path.to_path_buf()), reason }
            }
            other => other,
        })?;

        Ok(Self { definition, source: Some(path.to_path_buf()) })
    }

    pub fn definition(&self) -> &SpaceDefinition {
        &self.definition
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn is_json_path(path: &Path) -> bool {
    matches!(path.extension().and_then(|ext| ext.to_str()), Some("json"))
}
