//! Local connection-record store
//!
//! Records are kept in a single JSON manifest keyed by device identifier.
//! The manifest is rewritten after every change, so the file always reflects
//! the in-memory state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::code::ScannedCode;
use crate::device::DeviceId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// What the controller remembers about a device it has connected to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// MAC address or thing-name
    pub identifier: DeviceId,
    pub model: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    pub device_name: String,
    /// Cloud thing-name, once the device has been provisioned
    #[serde(default)]
    pub thing_name: Option<String>,
    #[serde(default)]
    pub connection_key: Option<String>,
    #[serde(default)]
    pub share_token: Option<String>,
    /// When this record was last written
    pub saved_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Build a record from a freshly scanned code
    pub fn from_code(code: &ScannedCode) -> Self {
        let (connection_key, share_token) = match code {
            ScannedCode::Pairing(p) => (Some(p.connection_key.clone()), Some(p.share_token.clone())),
            ScannedCode::Onboarding(_) => (None, None),
        };
        Self {
            identifier: code.identifier().clone(),
            model: code.model().to_string(),
            serial_number: code.serial_number().map(str::to_string),
            device_name: code.device_name(),
            thing_name: None,
            connection_key,
            share_token,
            saved_at: Utc::now(),
        }
    }
}

/// On-disk manifest format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordManifest {
    /// Version of the manifest format
    #[serde(default = "default_version")]
    pub version: String,
    /// Records keyed by identifier
    #[serde(default)]
    pub records: BTreeMap<String, ConnectionRecord>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for RecordManifest {
    fn default() -> Self {
        Self {
            version: default_version(),
            records: BTreeMap::new(),
        }
    }
}

impl RecordManifest {
    /// Load manifest or create new if file doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save manifest to a file
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// JSON-file backed record store
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    manifest: RecordManifest,
}

impl RecordStore {
    /// Open the store at `path`, creating an empty one if needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let manifest = RecordManifest::load_or_create(&path)?;
        Ok(Self { path, manifest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, identifier: &DeviceId) -> Option<&ConnectionRecord> {
        self.manifest.records.get(identifier.as_str())
    }

    /// Find a record by cloud thing-name
    pub fn find_by_thing_name(&self, thing_name: &str) -> Option<&ConnectionRecord> {
        self.manifest
            .records
            .values()
            .find(|r| r.thing_name.as_deref() == Some(thing_name))
    }

    /// Insert or replace a record
    pub fn save(&mut self, mut record: ConnectionRecord) -> Result<(), StoreError> {
        record.saved_at = Utc::now();
        self.manifest
            .records
            .insert(record.identifier.as_str().to_string(), record);
        self.manifest.save(&self.path)
    }

    /// Remove a record, returns true if it was present
    pub fn remove(&mut self, identifier: &DeviceId) -> Result<bool, StoreError> {
        if self.manifest.records.remove(identifier.as_str()).is_none() {
            return Ok(false);
        }
        self.manifest.save(&self.path)?;
        Ok(true)
    }

    pub fn records(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.manifest.records.values()
    }

    pub fn len(&self) -> usize {
        self.manifest.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.records.is_empty()
    }
}
