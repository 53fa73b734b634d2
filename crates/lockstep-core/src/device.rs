//! Device identity and link state types

use serde::{Deserialize, Serialize};

/// Unique identifier for a device: a normalized MAC address or a cloud thing-name
///
/// Deserialization goes through [`DeviceId::parse`], so stored MAC addresses
/// come back normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId from a MAC address in any common notation
    ///
    /// Accepts `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` and `aabbccddeeff`.
    /// Returns `None` if the input is not 12 hex digits.
    pub fn from_mac(mac: &str) -> Option<Self> {
        normalize_mac(mac).map(Self)
    }

    /// Create a DeviceId from a cloud thing-name (kept verbatim)
    pub fn from_thing_name(name: &str) -> Self {
        Self(name.trim().to_string())
    }

    /// Parse an identifier, normalizing it when it looks like a MAC address
    pub fn parse(identifier: &str) -> Self {
        Self::from_mac(identifier).unwrap_or_else(|| Self::from_thing_name(identifier))
    }

    /// Whether this identifier is a MAC address
    pub fn is_mac(&self) -> bool {
        normalize_mac(&self.0).is_some_and(|n| n == self.0)
    }

    /// Last four hex digits of a MAC identifier, used for default device names
    pub fn short_suffix(&self) -> String {
        let digits: String = self.0.chars().filter(|c| c.is_ascii_hexdigit()).collect();
        digits[digits.len().saturating_sub(4)..].to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(identifier: String) -> Self {
        Self::parse(&identifier)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a MAC address to upper-case colon-separated form
fn normalize_mac(mac: &str) -> Option<String> {
    let digits: String = mac
        .trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect();
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let upper = digits.to_ascii_uppercase();
    let pairs: Vec<&str> = (0..6).map(|i| &upper[i * 2..i * 2 + 2]).collect();
    Some(pairs.join(":"))
}

/// What a device model can do on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Only reachable over the proximity transport
    ProximityOnly,
    /// Has its own network connection and a cloud identity
    NetworkCapable,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProximityOnly => write!(f, "proximity-only"),
            Self::NetworkCapable => write!(f, "network-capable"),
        }
    }
}

/// Transport a session is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Proximity,
    Network,
}

impl From<Capability> for TransportKind {
    fn from(capability: Capability) -> Self {
        match capability {
            Capability::ProximityOnly => Self::Proximity,
            Capability::NetworkCapable => Self::Network,
        }
    }
}

/// Normalized description of a device, built by the identity resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    identifier: DeviceId,
    model: String,
    serial_number: Option<String>,
    device_name: String,
    capability: Capability,
}

impl DeviceInfo {
    pub fn new(
        identifier: DeviceId,
        model: impl Into<String>,
        serial_number: Option<String>,
        device_name: impl Into<String>,
        capability: Capability,
    ) -> Self {
        Self {
            identifier,
            model: model.into(),
            serial_number,
            device_name: device_name.into(),
            capability,
        }
    }

    pub fn identifier(&self) -> &DeviceId {
        &self.identifier
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn is_network_capable(&self) -> bool {
        self.capability == Capability::NetworkCapable
    }
}

/// State of the proximity link itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Progress of Wi-Fi and cloud provisioning reported by the device
///
/// Only meaningful while the proximity link is `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiProvisionState {
    ConnectingWifi,
    WifiConnected,
    WifiFailed,
    CloudConnecting,
    CloudConnected,
    Failed,
}

impl WifiProvisionState {
    /// Human-facing progress label
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectingWifi => "Connect to wifi...",
            Self::WifiConnected => "Connect to iot...",
            Self::WifiFailed => "Connect wifi fail.",
            Self::CloudConnecting => "Connect to cloud...",
            Self::CloudConnected => "Connected cloud.",
            Self::Failed => "Unknown error",
        }
    }

    /// States after which the device reports nothing more for this submission
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WifiFailed | Self::CloudConnected | Self::Failed)
    }

    /// Whether this state belongs to the cloud phase
    pub fn is_cloud_phase(&self) -> bool {
        matches!(self, Self::CloudConnecting | Self::CloudConnected)
    }
}
