//! Engine settings

use std::time::Duration;

use chrono::Local;
use lockstep_core::attributes::Timezone;
use lockstep_services::CloudConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Seconds from Wi-Fi submission until the attempt is abandoned
    #[serde(default = "default_watchdog_secs")]
    pub watchdog_secs: u64,
    /// Reconnect the proximity link once after it drops
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Timezone name sent with provisioning tickets
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            watchdog_secs: default_watchdog_secs(),
            auto_reconnect: false,
            timezone: default_timezone(),
        }
    }
}

fn default_watchdog_secs() -> u64 {
    120
}

fn default_timezone() -> String {
    std::env::var("TZ")
        .ok()
        .filter(|tz| !tz.trim().is_empty())
        .unwrap_or_else(|| "UTC".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Wait after a proximity factory reset before reporting success, while the device reboots
    #[serde(default = "default_settle_ms")]
    pub factory_reset_settle_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            factory_reset_settle_ms: default_settle_ms(),
        }
    }
}

fn default_settle_ms() -> u64 {
    5000
}

impl EngineConfig {
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.provisioning.watchdog_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.lifecycle.factory_reset_settle_ms)
    }

    /// Configured timezone name with the host's current UTC offset
    pub fn timezone(&self) -> Timezone {
        Timezone {
            short_name: self.provisioning.timezone.clone(),
            offset: Local::now().offset().local_minus_utc(),
        }
    }
}
