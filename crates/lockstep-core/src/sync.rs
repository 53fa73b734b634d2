//! The user-sync document: a user's proximity-only devices across clients
//!
//! The document carries an optimistic-concurrency version. Writers read the
//! document, compute the new device list, and write it back with the version
//! they read; a stale version comes back as [`SyncWrite::Conflict`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::DeviceId;

/// Optimistic-concurrency token of the user-sync document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncVersion(pub u64);

impl std::fmt::Display for SyncVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One proximity-only device in the user-sync document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityDeviceRecord {
    #[serde(rename = "MACAddress")]
    pub mac_address: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
    #[serde(rename = "ConnectionKey", default)]
    pub connection_key: String,
    #[serde(rename = "ShareToken", default)]
    pub share_token: String,
    /// Fields written by other clients, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProximityDeviceRecord {
    pub fn new(mac: &DeviceId, display_name: impl Into<String>) -> Self {
        Self {
            mac_address: mac.to_string(),
            display_name: display_name.into(),
            connection_key: String::new(),
            share_token: String::new(),
            extra: Map::new(),
        }
    }

    /// Whether this record describes the given device
    pub fn matches(&self, id: &DeviceId) -> bool {
        DeviceId::parse(&self.mac_address) == *id
    }
}

/// The versioned device list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSyncDocument {
    #[serde(rename = "Devices", default)]
    pub devices: Vec<ProximityDeviceRecord>,
    #[serde(rename = "version", default)]
    pub version: SyncVersion,
}

impl UserSyncDocument {
    pub fn new(devices: Vec<ProximityDeviceRecord>, version: SyncVersion) -> Self {
        Self { devices, version }
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.iter().any(|d| d.matches(id))
    }

    /// The document with `id` filtered out; order and version are preserved
    pub fn without_device(&self, id: &DeviceId) -> Self {
        Self {
            devices: self.devices.iter().filter(|d| !d.matches(id)).cloned().collect(),
            version: self.version,
        }
    }
}

/// Outcome of a versioned write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncWrite {
    /// The write was applied; `version` is the new current version
    Committed { version: SyncVersion },
    /// The version supplied was stale
    Conflict {
        attempted: SyncVersion,
        current: Option<SyncVersion>,
    },
}
