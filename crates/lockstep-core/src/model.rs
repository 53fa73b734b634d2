//! Model trait table - Maps firmware model identifiers to device capabilities
//!
//! Every downstream branch (session transport, provisioning, which store is
//! authoritative for settings) is decided by the capability returned here.
//! Classification never performs I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::device::Capability;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown device model: {0}")]
    UnknownModel(String),
}

/// Models known to the firmware, with their capability
const BUILTIN_MODELS: &[(&str, Capability)] = &[
    ("KD0", Capability::ProximityOnly),
    ("KD01", Capability::ProximityOnly),
    ("KL0", Capability::ProximityOnly),
    ("KL01", Capability::ProximityOnly),
    ("TLR0", Capability::ProximityOnly),
    ("KDW00", Capability::NetworkCapable),
    ("KLW00", Capability::NetworkCapable),
    ("WIFI", Capability::NetworkCapable),
];

/// Classify a model against the built-in table
pub fn classify(model: &str) -> Result<Capability, ModelError> {
    let model = model.trim();
    BUILTIN_MODELS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(model))
        .map(|(_, capability)| *capability)
        .ok_or_else(|| ModelError::UnknownModel(model.to_string()))
}

/// A single model entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier as reported by the device (case-insensitive)
    pub model: String,
    /// What the model can do
    pub capability: Capability,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// Model table: the built-in entries plus any configured extras
#[derive(Debug, Clone)]
pub struct ModelTable {
    entries: Vec<ModelEntry>,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelTable {
    /// Table with only the built-in models
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_MODELS
                .iter()
                .map(|(model, capability)| ModelEntry {
                    model: model.to_string(),
                    capability: *capability,
                    description: None,
                })
                .collect(),
        }
    }

    /// Add entries; an entry for an existing model replaces it
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ModelEntry>) {
        for entry in entries {
            match self
                .entries
                .iter_mut()
                .find(|e| e.model.eq_ignore_ascii_case(&entry.model))
            {
                Some(existing) => {
                    debug!(model = %entry.model, capability = %entry.capability, "Overriding model entry");
                    *existing = entry;
                }
                None => self.entries.push(entry),
            }
        }
    }

    /// Classify a model identifier
    pub fn classify(&self, model: &str) -> Result<Capability, ModelError> {
        let model = model.trim();
        self.entries
            .iter()
            .find(|e| e.model.eq_ignore_ascii_case(model))
            .map(|e| e.capability)
            .ok_or_else(|| ModelError::UnknownModel(model.to_string()))
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}
