//! Registry attributes: the authoritative device configuration document
//!
//! Network-capable devices keep this document in the cloud registry;
//! proximity-only devices expose the same fields through their on-device
//! configuration.

use serde::{Deserialize, Serialize};

/// Timezone block of the registry document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timezone {
    pub short_name: String,
    /// Offset from UTC in seconds
    pub offset: i32,
}

/// Wi-Fi credentials stored on the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WifiInfo {
    #[serde(rename = "SSID")]
    pub ssid: String,
    pub passphrase: String,
    pub security: String,
}

/// Proximity pairing material mirrored into the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothInfo {
    pub broadcast_name: String,
    pub mac_address: String,
    pub connection_key: String,
    pub share_token: String,
}

/// Installation location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// The device configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAttributes {
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub auto_lock: bool,
    /// Auto-lock delay in seconds
    #[serde(default)]
    pub auto_lock_delay: u32,
    #[serde(default)]
    pub vacation_mode: bool,
    #[serde(default)]
    pub key_press_beep: bool,
    #[serde(default)]
    pub secure_mode: bool,
    #[serde(default)]
    pub preamble: bool,
    #[serde(default)]
    pub syncing: bool,
    #[serde(default)]
    pub offline_notify: bool,
    #[serde(default)]
    pub status_notification: bool,
    #[serde(default)]
    pub timezone: Timezone,
    #[serde(default)]
    pub wifi: WifiInfo,
    #[serde(default)]
    pub bluetooth: Option<BluetoothInfo>,
    #[serde(default)]
    pub location: Location,
}

/// The six attributes a user can edit from the settings view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditableSettings {
    pub auto_lock: bool,
    pub auto_lock_delay: u32,
    pub vacation_mode: bool,
    pub key_press_beep: bool,
    pub preamble: bool,
    pub secure_mode: bool,
}

impl RegistryAttributes {
    pub fn editable(&self) -> EditableSettings {
        EditableSettings {
            auto_lock: self.auto_lock,
            auto_lock_delay: self.auto_lock_delay,
            vacation_mode: self.vacation_mode,
            key_press_beep: self.key_press_beep,
            preamble: self.preamble,
            secure_mode: self.secure_mode,
        }
    }

    /// Copy of this document with the editable attributes replaced
    pub fn with_editable(&self, settings: EditableSettings) -> Self {
        Self {
            auto_lock: settings.auto_lock,
            auto_lock_delay: settings.auto_lock_delay,
            vacation_mode: settings.vacation_mode,
            key_press_beep: settings.key_press_beep,
            preamble: settings.preamble,
            secure_mode: settings.secure_mode,
            ..self.clone()
        }
    }
}

/// Auto-lock delay applied when the user clears the field
pub const DEFAULT_AUTO_LOCK_DELAY: u32 = 2;

/// Settings view state: the last-fetched baseline and the edited copy
///
/// `edited` is `None` until a baseline has been loaded successfully; the
/// setters do nothing in that state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDraft {
    baseline: RegistryAttributes,
    edited: Option<RegistryAttributes>,
}

impl SettingsDraft {
    /// Draft for a freshly loaded baseline
    pub fn loaded(baseline: RegistryAttributes) -> Self {
        Self {
            edited: Some(baseline.clone()),
            baseline,
        }
    }

    /// Draft for a device whose settings could not be loaded
    pub fn unloaded() -> Self {
        Self::default()
    }

    pub fn baseline(&self) -> &RegistryAttributes {
        &self.baseline
    }

    pub fn edited(&self) -> Option<&RegistryAttributes> {
        self.edited.as_ref()
    }

    /// Whether any of the six editable attributes differ from the baseline
    pub fn is_dirty(&self) -> bool {
        self.edited
            .as_ref()
            .is_some_and(|e| e.editable() != self.baseline.editable())
    }

    pub fn set_auto_lock(&mut self, enabled: bool) {
        self.update(|a| a.auto_lock = enabled);
    }

    /// `None` resets the delay to the default
    pub fn set_auto_lock_delay(&mut self, delay: Option<u32>) {
        self.update(|a| a.auto_lock_delay = delay.unwrap_or(DEFAULT_AUTO_LOCK_DELAY));
    }

    pub fn set_vacation_mode(&mut self, enabled: bool) {
        self.update(|a| a.vacation_mode = enabled);
    }

    pub fn set_key_press_beep(&mut self, enabled: bool) {
        self.update(|a| a.key_press_beep = enabled);
    }

    pub fn set_secure_mode(&mut self, enabled: bool) {
        self.update(|a| a.secure_mode = enabled);
    }

    pub fn set_preamble(&mut self, enabled: bool) {
        self.update(|a| a.preamble = enabled);
    }

    fn update(&mut self, f: impl FnOnce(&mut RegistryAttributes)) {
        if let Some(edited) = self.edited.as_mut() {
            f(edited);
        }
    }
}
