//! Proximity link contract
//!
//! A [`ProximityLink`] is the short-range session to one device. The engine
//! treats it as a pair of streams (link state and Wi-Fi progress) plus a
//! handful of request/response commands.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use lockstep_core::{ConnectionState, DeviceId, DeviceInfo, RegistryAttributes, WifiProvisionState};

use crate::error::ServiceError;

/// Progress reported by the device after a Wi-Fi credential submission
pub type WifiProgress = BoxStream<'static, Result<WifiProvisionState, ServiceError>>;

#[async_trait]
pub trait ProximityLink: Send + Sync {
    async fn connect(&self) -> Result<(), ServiceError>;

    async fn disconnect(&self) -> Result<(), ServiceError>;

    async fn is_connected(&self) -> bool;

    /// Link state changes, starting with the current state
    fn connection_states(&self) -> BoxStream<'static, ConnectionState>;

    async fn read_configuration(&self) -> Result<RegistryAttributes, ServiceError>;

    async fn write_configuration(&self, attributes: &RegistryAttributes) -> Result<(), ServiceError>;

    /// Hand Wi-Fi credentials to the device; the stream ends after a terminal state
    async fn submit_wifi_credentials(&self, ssid: &str, password: &str) -> Result<WifiProgress, ServiceError>;

    /// Returns whether the device accepted the reset
    async fn factory_reset(&self, admin_code: &str) -> Result<bool, ServiceError>;

    async fn change_admin_code(&self, old_code: &str, new_code: &str, user_name: &str) -> Result<bool, ServiceError>;

    async fn rename(&self, device_name: &str) -> Result<bool, ServiceError>;

    async fn set_timezone(&self, timezone: &str) -> Result<bool, ServiceError>;
}

/// Opens proximity links for devices
pub trait LinkFactory: Send + Sync {
    fn open(&self, info: &DeviceInfo) -> Arc<dyn ProximityLink>;
}

/// Link for hosts without a proximity radio
///
/// Always reports `Disconnected`; every command fails with
/// [`ServiceError::LinkUnavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableLink {
    identifier: DeviceId,
}

impl UnavailableLink {
    pub fn new(identifier: DeviceId) -> Self {
        Self { identifier }
    }

    fn unavailable(&self) -> ServiceError {
        ServiceError::LinkUnavailable(self.identifier.to_string())
    }
}

#[async_trait]
impl ProximityLink for UnavailableLink {
    async fn connect(&self) -> Result<(), ServiceError> {
        Err(self.unavailable())
    }

    async fn disconnect(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        false
    }

    fn connection_states(&self) -> BoxStream<'static, ConnectionState> {
        stream::once(async { ConnectionState::Disconnected }).boxed()
    }

    async fn read_configuration(&self) -> Result<RegistryAttributes, ServiceError> {
        Err(self.unavailable())
    }

    async fn write_configuration(&self, _attributes: &RegistryAttributes) -> Result<(), ServiceError> {
        Err(self.unavailable())
    }

    async fn submit_wifi_credentials(&self, _ssid: &str, _password: &str) -> Result<WifiProgress, ServiceError> {
        Err(self.unavailable())
    }

    async fn factory_reset(&self, _admin_code: &str) -> Result<bool, ServiceError> {
        Err(self.unavailable())
    }

    async fn change_admin_code(&self, _old_code: &str, _new_code: &str, _user_name: &str) -> Result<bool, ServiceError> {
        Err(self.unavailable())
    }

    async fn rename(&self, _device_name: &str) -> Result<bool, ServiceError> {
        Err(self.unavailable())
    }

    async fn set_timezone(&self, _timezone: &str) -> Result<bool, ServiceError> {
        Err(self.unavailable())
    }
}

/// Factory handing out [`UnavailableLink`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLinkFactory;

impl LinkFactory for UnavailableLinkFactory {
    fn open(&self, info: &DeviceInfo) -> Arc<dyn ProximityLink> {
        Arc::new(UnavailableLink::new(info.identifier().clone()))
    }
}
