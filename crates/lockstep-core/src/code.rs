//! Decoders for scanned device codes
//!
//! A scanned code is the standard base64 encoding of a small JSON object
//! (raw JSON is accepted too). Two kinds exist:
//!
//! - Proximity-pairing codes: `{"A": mac, "K": key, "T": token, "M": model, "N": name?}`
//! - Network-onboarding codes: `{"S": serial, "A": mac, "M": model, "N": name?}`
//!
//! Both decoders reject unknown fields and their required fields are
//! disjoint, so no input decodes as both kinds.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::device::DeviceId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    #[error("Invalid code: {0}")]
    InvalidCode(String),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PairingPayload {
    #[serde(rename = "A")]
    mac: String,
    #[serde(rename = "K")]
    connection_key: String,
    #[serde(rename = "T")]
    share_token: String,
    #[serde(rename = "M")]
    model: String,
    #[serde(rename = "N", default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OnboardingPayload {
    #[serde(rename = "S")]
    serial_number: String,
    #[serde(rename = "A")]
    mac: String,
    #[serde(rename = "M")]
    model: String,
    #[serde(rename = "N", default)]
    name: Option<String>,
}

/// A decoded proximity-pairing code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    pub mac: DeviceId,
    pub connection_key: String,
    pub share_token: String,
    pub model: String,
    pub name: Option<String>,
}

/// A decoded network-onboarding code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingCode {
    pub mac: DeviceId,
    pub serial_number: String,
    pub model: String,
    pub name: Option<String>,
}

/// Either kind of scanned code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedCode {
    Pairing(PairingCode),
    Onboarding(OnboardingCode),
}

impl ScannedCode {
    pub fn identifier(&self) -> &DeviceId {
        match self {
            Self::Pairing(code) => &code.mac,
            Self::Onboarding(code) => &code.mac,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Pairing(code) => &code.model,
            Self::Onboarding(code) => &code.model,
        }
    }

    pub fn serial_number(&self) -> Option<&str> {
        match self {
            Self::Pairing(_) => None,
            Self::Onboarding(code) => Some(&code.serial_number),
        }
    }

    /// Name from the code, or `<model>-<last four MAC digits>`
    pub fn device_name(&self) -> String {
        let name = match self {
            Self::Pairing(code) => code.name.as_deref(),
            Self::Onboarding(code) => code.name.as_deref(),
        };
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("{}-{}", self.model(), self.identifier().short_suffix()),
        }
    }
}

/// Decode a proximity-pairing code
pub fn decode_pairing(content: &str) -> Result<PairingCode, CodeError> {
    let bytes = payload_bytes(content)?;
    let payload: PairingPayload = serde_json::from_slice(&bytes)
        .map_err(|e| CodeError::InvalidCode(format!("not a pairing code: {e}")))?;

    let mac = DeviceId::from_mac(&payload.mac)
        .ok_or_else(|| CodeError::InvalidCode(format!("bad MAC address: {}", payload.mac)))?;
    let model = non_empty(payload.model, "model")?;

    Ok(PairingCode {
        mac,
        connection_key: non_empty(payload.connection_key, "connection key")?,
        share_token: non_empty(payload.share_token, "share token")?,
        model,
        name: payload.name,
    })
}

/// Decode a network-onboarding code
pub fn decode_onboarding(content: &str) -> Result<OnboardingCode, CodeError> {
    let bytes = payload_bytes(content)?;
    let payload: OnboardingPayload = serde_json::from_slice(&bytes)
        .map_err(|e| CodeError::InvalidCode(format!("not an onboarding code: {e}")))?;

    let mac = DeviceId::from_mac(&payload.mac)
        .ok_or_else(|| CodeError::InvalidCode(format!("bad MAC address: {}", payload.mac)))?;

    Ok(OnboardingCode {
        mac,
        serial_number: non_empty(payload.serial_number, "serial number")?,
        model: non_empty(payload.model, "model")?,
        name: payload.name,
    })
}

/// Try the pairing decoder, then the onboarding decoder
pub fn decode(content: &str) -> Result<ScannedCode, CodeError> {
    if let Ok(code) = decode_pairing(content) {
        return Ok(ScannedCode::Pairing(code));
    }
    decode_onboarding(content)
        .map(ScannedCode::Onboarding)
        .map_err(|_| CodeError::InvalidCode("neither a pairing nor an onboarding code".to_string()))
}

fn payload_bytes(content: &str) -> Result<Vec<u8>, CodeError> {
    let content = content.trim();
    if content.starts_with('{') {
        return Ok(content.as_bytes().to_vec());
    }
    STANDARD
        .decode(content)
        .map_err(|e| CodeError::InvalidCode(format!("bad base64: {e}")))
}

fn non_empty(value: String, field: &str) -> Result<String, CodeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CodeError::InvalidCode(format!("empty {field}")));
    }
    Ok(trimmed.to_string())
}
