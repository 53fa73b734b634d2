//! Lifecycle consistency coordinator
//!
//! Multi-store workflows that must not leave the cloud registry, the
//! user-sync document and the local record store disagreeing:
//! delete, factory reset, settings reconciliation and the small device
//! commands (rename, timezone, location, admin code).
//!
//! Every workflow takes a fresh client token and holds the per-device
//! workflow lock for its whole duration.

use std::collections::HashMap;
use std::sync::Arc;

use lockstep_core::{DeviceId, Location, SyncWrite, TransportKind};
use lockstep_services::{
    ClientToken, ClientTokenSource, CloudDeviceService, LocalRepository, ProximityLink, ServiceError, UserSyncService,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::session::{Session, SessionRegistry};

/// Per-identifier mutual exclusion for workflows
#[derive(Default)]
pub struct WorkflowLocks {
    locks: Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl WorkflowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `identifier`
    pub async fn acquire(&self, identifier: &DeviceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(identifier.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct LifecycleCoordinator {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) cloud: Arc<dyn CloudDeviceService>,
    pub(crate) sync: Arc<dyn UserSyncService>,
    pub(crate) repository: Arc<dyn LocalRepository>,
    pub(crate) tokens: Arc<dyn ClientTokenSource>,
    pub(crate) locks: WorkflowLocks,
    pub(crate) config: Arc<EngineConfig>,
}

impl LifecycleCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        cloud: Arc<dyn CloudDeviceService>,
        sync: Arc<dyn UserSyncService>,
        repository: Arc<dyn LocalRepository>,
        tokens: Arc<dyn ClientTokenSource>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            registry,
            cloud,
            sync,
            repository,
            tokens,
            locks: WorkflowLocks::new(),
            config,
        }
    }

    /// Remove a device from every store that knows it, then drop its session
    pub async fn delete(&self, session: &Session) -> Result<(), EngineError> {
        let id = session.identifier();
        let _guard = self.locks.acquire(id).await;
        let token = self.tokens.client_token().await?;

        match session.transport() {
            TransportKind::Network => self.delete_network(session, &token).await?,
            TransportKind::Proximity => self.delete_proximity(session, &token).await?,
        }

        self.registry.remove(id).await;
        info!(device = %id, "Device deleted");
        Ok(())
    }

    /// Reset a device to factory state and delete it
    ///
    /// Network-capable devices are checked against the admin code stored in
    /// the cloud before anything is touched. Proximity-only devices check the
    /// code themselves.
    pub async fn factory_reset(&self, session: &Session, admin_code: &str) -> Result<(), EngineError> {
        let id = session.identifier();
        let _guard = self.locks.acquire(id).await;
        let token = self.tokens.client_token().await?;

        match session.transport() {
            TransportKind::Network => {
                if !session.is_established().await {
                    return Err(EngineError::unreachable(id));
                }
                let thing_name = self.thing_name(session, &token).await?;
                let codes = self.cloud.get_admin_code(&thing_name, &token).await?;
                let stored = codes.first().ok_or(EngineError::AdminCodeNotSet)?;
                if stored.code.as_bytes() != admin_code.as_bytes() {
                    warn!(device = %id, "Admin code mismatch, factory reset refused");
                    return Err(EngineError::AdminCodeIncorrect);
                }
                self.cloud.delete(&thing_name, &token).await?;
            }
            TransportKind::Proximity => {
                let link = self.connected_link(session).await?;
                let accepted = link
                    .factory_reset(admin_code)
                    .await
                    .map_err(|e| EngineError::from_link(id, e))?;
                if !accepted {
                    warn!(device = %id, "Device rejected factory reset");
                    return Err(EngineError::ResetRejected);
                }
                self.delete_proximity(session, &token).await?;
                debug!(device = %id, delay_ms = self.config.lifecycle.factory_reset_settle_ms, "Waiting for device to settle");
                tokio::time::sleep(self.config.settle_delay()).await;
            }
        }

        self.registry.remove(id).await;
        info!(device = %id, "Factory reset complete");
        Ok(())
    }

    pub async fn rename(&self, session: &Session, device_name: &str) -> Result<(), EngineError> {
        let id = session.identifier();
        let _guard = self.locks.acquire(id).await;
        let token = self.tokens.client_token().await?;

        match session.transport() {
            TransportKind::Network => {
                let thing_name = self.thing_name(session, &token).await?;
                self.cloud.update_name(&thing_name, device_name, &token).await?;
            }
            TransportKind::Proximity => {
                let link = self.connected_link(session).await?;
                if !link.rename(device_name).await.map_err(|e| EngineError::from_link(id, e))? {
                    return Err(EngineError::CommandRejected("rename"));
                }
            }
        }

        if let Some(mut record) = self.repository.get(id).await? {
            record.device_name = device_name.to_string();
            self.repository.save(record).await?;
        }
        info!(device = %id, name = %device_name, "Device renamed");
        Ok(())
    }

    pub async fn set_timezone(&self, session: &Session, timezone: &str) -> Result<(), EngineError> {
        let id = session.identifier();
        let _guard = self.locks.acquire(id).await;
        let token = self.tokens.client_token().await?;

        match session.transport() {
            TransportKind::Network => {
                let thing_name = self.thing_name(session, &token).await?;
                self.cloud.update_timezone(&thing_name, timezone, &token).await?;
            }
            TransportKind::Proximity => {
                let link = self.connected_link(session).await?;
                if !link.set_timezone(timezone).await.map_err(|e| EngineError::from_link(id, e))? {
                    return Err(EngineError::CommandRejected("timezone change"));
                }
            }
        }
        info!(device = %id, timezone = %timezone, "Timezone updated");
        Ok(())
    }

    /// Store the installation location in the device configuration
    pub async fn set_location(&self, session: &Session, location: Location) -> Result<(), EngineError> {
        let id = session.identifier();
        let _guard = self.locks.acquire(id).await;

        match session.transport() {
            TransportKind::Network => {
                let token = self.tokens.client_token().await?;
                let thing_name = self.thing_name(session, &token).await?;
                let mut attributes = self.cloud.get_registry(&thing_name, &token).await?;
                attributes.location = location.clone();
                self.cloud.update_registry(&thing_name, &attributes, &token).await?;
            }
            TransportKind::Proximity => {
                let link = self.connected_link(session).await?;
                let mut attributes = link
                    .read_configuration()
                    .await
                    .map_err(|e| EngineError::from_link(id, e))?;
                attributes.location = location.clone();
                link.write_configuration(&attributes)
                    .await
                    .map_err(|e| EngineError::from_link(id, e))?;
            }
        }
        info!(device = %id, latitude = location.latitude, longitude = location.longitude, "Location updated");
        Ok(())
    }

    pub async fn change_admin_code(
        &self,
        session: &Session,
        old_code: &str,
        new_code: &str,
        user_name: &str,
    ) -> Result<(), EngineError> {
        let id = session.identifier();
        let _guard = self.locks.acquire(id).await;
        let token = self.tokens.client_token().await?;

        match session.transport() {
            TransportKind::Network => {
                let thing_name = self.thing_name(session, &token).await?;
                self.cloud
                    .update_admin_code(&thing_name, new_code, old_code, &token)
                    .await?;
            }
            TransportKind::Proximity => {
                let link = self.connected_link(session).await?;
                let accepted = link
                    .change_admin_code(old_code, new_code, user_name)
                    .await
                    .map_err(|e| EngineError::from_link(id, e))?;
                if !accepted {
                    return Err(EngineError::CommandRejected("admin code change"));
                }
            }
        }
        info!(device = %id, "Admin code changed");
        Ok(())
    }

    async fn delete_network(&self, session: &Session, token: &ClientToken) -> Result<(), EngineError> {
        if !session.is_established().await {
            return Err(EngineError::unreachable(session.identifier()));
        }
        let thing_name = self.thing_name(session, token).await?;
        self.cloud.delete(&thing_name, token).await?;
        debug!(device = %session.identifier(), thing_name = %thing_name, "Cloud device deleted");
        Ok(())
    }

    /// User-sync first, local record second
    async fn delete_proximity(&self, session: &Session, token: &ClientToken) -> Result<(), EngineError> {
        let id = session.identifier();
        let document = self.sync.get_user_sync(token).await?;
        let updated = document.without_device(id);
        debug!(
            device = %id,
            version = %document.version,
            remaining = updated.devices.len(),
            "Writing user-sync document"
        );

        match self.sync.update_user_sync(token, &updated).await? {
            SyncWrite::Committed { version } => {
                debug!(device = %id, version = %version, "User-sync document committed");
            }
            SyncWrite::Conflict { attempted, current } => {
                warn!(device = %id, attempted = %attempted, current = ?current, "User-sync write conflict");
                return Err(EngineError::SyncConflict { attempted, current });
            }
        }

        self.remove_local_record(id).await;
        Ok(())
    }

    /// Best-effort: failures are logged, never returned
    async fn remove_local_record(&self, id: &DeviceId) {
        let result: Result<bool, ServiceError> = async {
            match self.repository.get(id).await? {
                Some(record) => self.repository.delete(&record).await.map(|_| true),
                None => Ok(false),
            }
        }
        .await;

        match result {
            Ok(true) => debug!(device = %id, "Local record removed"),
            Ok(false) => debug!(device = %id, "No local record to remove"),
            Err(e) => warn!(device = %id, error = %e, "Local record cleanup failed"),
        }
    }

    /// Thing-name from the session, the stored record or the cloud device list
    pub(crate) async fn thing_name(&self, session: &Session, token: &ClientToken) -> Result<String, EngineError> {
        if let Some(thing_name) = session.thing_name().await {
            return Ok(thing_name);
        }

        let id = session.identifier();
        if let Some(thing_name) = self.repository.get(id).await?.and_then(|r| r.thing_name) {
            session.set_thing_name(thing_name.clone()).await;
            return Ok(thing_name);
        }

        let serial = session
            .info()
            .serial_number()
            .ok_or_else(|| EngineError::NotFound(format!("thing-name of {}", id)))?;
        let device = self
            .cloud
            .list(token)
            .await?
            .into_iter()
            .find(|d| d.serial_number.as_deref() == Some(serial))
            .ok_or_else(|| EngineError::NotFound(format!("thing-name of {}", id)))?;
        session.set_thing_name(device.thing_name.clone()).await;
        Ok(device.thing_name)
    }

    pub(crate) async fn connected_link<'a>(&self, session: &'a Session) -> Result<&'a Arc<dyn ProximityLink>, EngineError> {
        let link = session.link();
        if !link.is_connected().await {
            return Err(EngineError::unreachable(session.identifier()));
        }
        Ok(link)
    }
}
