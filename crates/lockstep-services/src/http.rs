//! JSON-over-HTTP cloud client
//!
//! Every endpoint is a `POST` under the configured base URL with a JSON body
//! carrying the workflow's client token. Non-2xx responses become
//! [`ServiceError::Status`], except for a `409` on a user-sync update, which
//! is the stale-version signal.

use std::time::Duration;

use async_trait::async_trait;
use lockstep_core::{RegistryAttributes, SyncVersion, SyncWrite, UserSyncDocument};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace, warn};

use crate::cloud::{AccessCode, CloudDevice, CloudDeviceService, ProvisioningTicket, TicketDetails, UserSyncService};
use crate::error::ServiceError;
use crate::token::ClientToken;

/// Cloud endpoint settings (`[cloud]` section of the config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Application id sent with provisioning tickets
    #[serde(default = "default_application_id")]
    pub application_id: String,
    #[serde(default = "default_data_encryption_key")]
    pub data_encryption_key: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_application_id() -> String {
    "Sunion_20220617".to_string()
}

fn default_data_encryption_key() -> String {
    "Sunion_20220620".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            application_id: default_application_id(),
            data_encryption_key: default_data_encryption_key(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateResponse {
    thing_name: String,
}

#[derive(Deserialize)]
struct DeviceListResponse {
    #[serde(rename = "Devices", default)]
    devices: Vec<CloudDevice>,
}

#[derive(Deserialize)]
struct RegistryResponse {
    #[serde(rename = "Payload", alias = "payload")]
    payload: RegistryPayload,
}

#[derive(Deserialize)]
struct RegistryPayload {
    #[serde(rename = "Attributes", alias = "attributes", default)]
    attributes: RegistryAttributes,
}

#[derive(Deserialize)]
struct AccessCodeResponse {
    #[serde(rename = "AccessCode", default)]
    access_code: Vec<AccessCode>,
}

/// `{"Payload": {"Dataset": {"BLEDevices": {...}}}}`
#[derive(Serialize, Deserialize)]
struct UserSyncEnvelope {
    #[serde(rename = "Payload")]
    payload: UserSyncPayload,
}

#[derive(Serialize, Deserialize)]
struct UserSyncPayload {
    #[serde(rename = "Dataset")]
    dataset: UserSyncDataset,
}

#[derive(Serialize, Deserialize)]
struct UserSyncDataset {
    #[serde(rename = "BLEDevices", default)]
    ble_devices: UserSyncDocument,
}

impl UserSyncEnvelope {
    fn wrap(document: UserSyncDocument) -> Self {
        Self {
            payload: UserSyncPayload {
                dataset: UserSyncDataset { ble_devices: document },
            },
        }
    }

    fn into_document(self) -> UserSyncDocument {
        self.payload.dataset.ble_devices
    }
}

/// HTTP implementation of [`CloudDeviceService`] and [`UserSyncService`]
pub struct HttpCloudClient {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL without trailing slash
    base_url: String,
}

impl HttpCloudClient {
    pub fn new(config: &CloudConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response, ServiceError> {
        let url = self.url(path);
        trace!(url = %url, "POST");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(url = %url, status = %status, "Cloud call failed");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ServiceError> {
        let bytes = self.send(path, body).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ServiceError::Decode(format!("{}: {}", path, e)))
    }

    async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ServiceError> {
        self.send(path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl CloudDeviceService for HttpCloudClient {
    async fn create(&self, ticket: &ProvisioningTicket) -> Result<String, ServiceError> {
        let response: CreateResponse = self.post("device-provision/create", ticket).await?;
        debug!(thing_name = %response.thing_name, serial = %ticket.serial_number, "Device provisioned");
        Ok(response.thing_name)
    }

    async fn get_ticket(&self, ticket: &str, token: &ClientToken) -> Result<TicketDetails, ServiceError> {
        let body = json!({ "Ticket": ticket, "clientToken": token.as_str() });
        self.post("device-provision/ticket-get", &body).await
    }

    async fn list(&self, token: &ClientToken) -> Result<Vec<CloudDevice>, ServiceError> {
        let body = json!({ "clientToken": token.as_str() });
        let response: DeviceListResponse = self.post("device-list", &body).await?;
        Ok(response.devices)
    }

    async fn update_name(&self, thing_name: &str, device_name: &str, token: &ClientToken) -> Result<(), ServiceError> {
        let body = json!({
            "ThingName": thing_name,
            "DeviceName": device_name,
            "clientToken": token.as_str(),
        });
        self.post_ack("device/update-name", &body).await
    }

    async fn update_timezone(&self, thing_name: &str, timezone: &str, token: &ClientToken) -> Result<(), ServiceError> {
        let body = json!({
            "ThingName": thing_name,
            "Timezone": timezone,
            "clientToken": token.as_str(),
        });
        self.post_ack("device/update-timezone", &body).await
    }

    async fn update_admin_code(
        &self,
        thing_name: &str,
        admin_code: &str,
        old_code: &str,
        token: &ClientToken,
    ) -> Result<(), ServiceError> {
        let body = json!({
            "ThingName": thing_name,
            "AdminCode": admin_code,
            "OldAdminCode": old_code,
            "clientToken": token.as_str(),
        });
        self.post_ack("device/update-admin-code", &body).await
    }

    async fn delete(&self, thing_name: &str, token: &ClientToken) -> Result<(), ServiceError> {
        let body = json!({ "ThingName": thing_name, "clientToken": token.as_str() });
        self.post_ack("device/delete", &body).await
    }

    async fn lock(&self, thing_name: &str, token: &ClientToken) -> Result<(), ServiceError> {
        let body = json!({ "ThingName": thing_name, "clientToken": token.as_str() });
        self.post_ack("device/lock", &body).await
    }

    async fn unlock(&self, thing_name: &str, token: &ClientToken) -> Result<(), ServiceError> {
        let body = json!({ "ThingName": thing_name, "clientToken": token.as_str() });
        self.post_ack("device/unlock", &body).await
    }

    async fn get_registry(&self, thing_name: &str, token: &ClientToken) -> Result<RegistryAttributes, ServiceError> {
        let body = json!({ "ThingName": thing_name, "clientToken": token.as_str() });
        let response: RegistryResponse = self.post("device-registry/get", &body).await?;
        Ok(response.payload.attributes)
    }

    async fn update_registry(
        &self,
        thing_name: &str,
        attributes: &RegistryAttributes,
        token: &ClientToken,
    ) -> Result<RegistryAttributes, ServiceError> {
        let body = json!({
            "ThingName": thing_name,
            "Attributes": attributes,
            "clientToken": token.as_str(),
        });
        let response: RegistryResponse = self.post("device-registry/update", &body).await?;
        Ok(response.payload.attributes)
    }

    async fn get_admin_code(&self, thing_name: &str, token: &ClientToken) -> Result<Vec<AccessCode>, ServiceError> {
        let body = json!({ "ThingName": thing_name, "clientToken": token.as_str() });
        let response: AccessCodeResponse = self.post("device/admin-code-get", &body).await?;
        Ok(response.access_code)
    }
}

#[async_trait]
impl UserSyncService for HttpCloudClient {
    async fn get_user_sync(&self, token: &ClientToken) -> Result<UserSyncDocument, ServiceError> {
        let body = json!({ "clientToken": token.as_str() });
        let envelope: UserSyncEnvelope = self.post("user-sync/get", &body).await?;
        Ok(envelope.into_document())
    }

    async fn update_user_sync(&self, token: &ClientToken, document: &UserSyncDocument) -> Result<SyncWrite, ServiceError> {
        let body = json!({
            "clientToken": token.as_str(),
            "Payload": UserSyncEnvelope::wrap(document.clone()).payload,
        });

        let envelope: UserSyncEnvelope = match self.post("user-sync/update", &body).await {
            Ok(envelope) => envelope,
            Err(ServiceError::Status { status, body }) if status == StatusCode::CONFLICT.as_u16() => {
                let current = serde_json::from_str::<UserSyncEnvelope>(&body)
                    .ok()
                    .map(|e| e.into_document().version);
                warn!(attempted = %document.version, current = ?current, "User-sync write rejected as stale");
                return Ok(SyncWrite::Conflict {
                    attempted: document.version,
                    current,
                });
            }
            Err(e) => return Err(e),
        };

        let version: SyncVersion = envelope.into_document().version;
        debug!(version = %version, devices = document.devices.len(), "User-sync document committed");
        Ok(SyncWrite::Committed { version })
    }
}
