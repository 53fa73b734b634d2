//! Cloud-side contracts: the device service and the user-sync service

use async_trait::async_trait;
use lockstep_core::attributes::Timezone;
use lockstep_core::{RegistryAttributes, SyncWrite, UserSyncDocument};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::token::ClientToken;

/// One-time payload that registers a network-capable device with the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningTicket {
    #[serde(rename = "applicationID")]
    pub application_id: String,
    pub model: String,
    pub serial_number: String,
    pub device_name: String,
    pub timezone: Timezone,
    pub data_encryption_key: String,
    pub client_token: String,
}

/// Details of a previously issued provisioning ticket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TicketDetails {
    #[serde(default)]
    pub ticket: String,
    #[serde(default)]
    pub thing_name: String,
    #[serde(rename = "ApplicationID", default)]
    pub application_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub timezone: Timezone,
    #[serde(default)]
    pub status: String,
}

/// A device bound to the user's cloud account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CloudDevice {
    pub thing_name: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub model: String,
}

/// Stored access code entry; the first entry is the admin code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessCode {
    #[serde(default)]
    pub name: String,
    pub code: String,
}

/// Cloud device service
///
/// Every call that touches a provisioned device is keyed by its thing-name
/// and carries the client token of the workflow that issued it.
#[async_trait]
pub trait CloudDeviceService: Send + Sync {
    /// Register a new device, returns the assigned thing-name
    async fn create(&self, ticket: &ProvisioningTicket) -> Result<String, ServiceError>;

    async fn get_ticket(&self, ticket: &str, token: &ClientToken) -> Result<TicketDetails, ServiceError>;

    async fn list(&self, token: &ClientToken) -> Result<Vec<CloudDevice>, ServiceError>;

    async fn update_name(&self, thing_name: &str, device_name: &str, token: &ClientToken) -> Result<(), ServiceError>;

    async fn update_timezone(&self, thing_name: &str, timezone: &str, token: &ClientToken) -> Result<(), ServiceError>;

    async fn update_admin_code(
        &self,
        thing_name: &str,
        admin_code: &str,
        old_code: &str,
        token: &ClientToken,
    ) -> Result<(), ServiceError>;

    async fn delete(&self, thing_name: &str, token: &ClientToken) -> Result<(), ServiceError>;

    async fn lock(&self, thing_name: &str, token: &ClientToken) -> Result<(), ServiceError>;

    async fn unlock(&self, thing_name: &str, token: &ClientToken) -> Result<(), ServiceError>;

    async fn get_registry(&self, thing_name: &str, token: &ClientToken) -> Result<RegistryAttributes, ServiceError>;

    /// Push a full registry document, returns the document the cloud now holds
    async fn update_registry(
        &self,
        thing_name: &str,
        attributes: &RegistryAttributes,
        token: &ClientToken,
    ) -> Result<RegistryAttributes, ServiceError>;

    async fn get_admin_code(&self, thing_name: &str, token: &ClientToken) -> Result<Vec<AccessCode>, ServiceError>;
}

/// Versioned store of the user's proximity-only devices
#[async_trait]
pub trait UserSyncService: Send + Sync {
    async fn get_user_sync(&self, token: &ClientToken) -> Result<UserSyncDocument, ServiceError>;

    /// Write `document` guarded by `document.version`
    ///
    /// A stale version is reported as [`SyncWrite::Conflict`], not as an error.
    async fn update_user_sync(&self, token: &ClientToken, document: &UserSyncDocument) -> Result<SyncWrite, ServiceError>;
}
