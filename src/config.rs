use crate::arithmetic::DEFAULT_TOLERANCE;
use crate::error::{CertificationError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum SequencePolicy {
    #[default]
    #[schemars(
        description = "A certificate must be for a period strictly after the chain tail; anything else is rejected."
    )]
    Strict,

    #[schemars(
        description = "Out-of-order certificates are accepted and placed by period; deltas of later certificates are recomputed."
    )]
    Lenient,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum DeletionPolicy {
    #[default]
    #[schemars(description = "Only the latest certificate of a budget can be deleted.")]
    TailOnly,

    #[schemars(
        description = "Any certificate can be deleted; its neighbours are joined and the successor's delta recomputed."
    )]
    Relink,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct LedgerConfig {
    #[serde(default = "default_tolerance")]
    #[schemars(
        description = "Absolute tolerance for percentage closure and carry-forward checks. Must be finite and non-negative."
    )]
    pub tolerance: f64,

    #[serde(default)]
    pub sequence_policy: SequencePolicy,

    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            sequence_policy: SequencePolicy::default(),
            deletion_policy: DeletionPolicy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(CertificationError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(LedgerConfig);
        serde_json::to_string_pretty(&schema)
    }
}
