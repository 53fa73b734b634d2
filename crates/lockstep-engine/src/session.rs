//! Session registry - one live session per device identifier
//!
//! The registry owns a map from identifier to [`Session`]. Sessions built
//! from stored records are constructed under the map lock. Provisioning
//! from a scanned code talks to the cloud, so it runs under a per-identifier
//! construction lock and takes the map lock only to check and insert.
//! Either way, concurrent callers for the same identifier all receive the
//! same `Arc<Session>`.

use std::collections::HashMap;
use std::sync::Arc;

use lockstep_core::{ConnectionRecord, DeviceId, DeviceInfo, TransportKind};
use lockstep_services::{
    ClientToken, CloudDeviceService, LinkFactory, LocalRepository, ProvisioningTicket, ProximityLink,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lifecycle::WorkflowLocks;
use crate::resolver::IdentityResolver;

/// A transport session with one device
pub struct Session {
    info: DeviceInfo,
    transport: TransportKind,
    link: Arc<dyn ProximityLink>,
    /// Cloud thing-name, once known
    thing_name: RwLock<Option<String>>,
}

impl Session {
    fn new(info: DeviceInfo, link: Arc<dyn ProximityLink>, thing_name: Option<String>) -> Self {
        Self {
            transport: TransportKind::from(info.capability()),
            info,
            link,
            thing_name: RwLock::new(thing_name),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn identifier(&self) -> &DeviceId {
        self.info.identifier()
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn link(&self) -> &Arc<dyn ProximityLink> {
        &self.link
    }

    pub async fn thing_name(&self) -> Option<String> {
        self.thing_name.read().await.clone()
    }

    pub(crate) async fn set_thing_name(&self, thing_name: String) {
        *self.thing_name.write().await = Some(thing_name);
    }

    /// Bound to a cloud identity or holding a live proximity connection
    pub async fn is_established(&self) -> bool {
        self.thing_name.read().await.is_some() || self.link.is_connected().await
    }

    async fn answers_to(&self, identifier: &DeviceId) -> bool {
        self.identifier() == identifier || self.thing_name.read().await.as_deref() == Some(identifier.as_str())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Owner of all live sessions
pub struct SessionRegistry {
    resolver: IdentityResolver,
    links: Arc<dyn LinkFactory>,
    cloud: Arc<dyn CloudDeviceService>,
    repository: Arc<dyn LocalRepository>,
    config: Arc<EngineConfig>,
    /// Live sessions keyed by device identifier
    sessions: Mutex<HashMap<DeviceId, Arc<Session>>>,
    /// Serializes provisioning per identifier
    building: WorkflowLocks,
}

impl SessionRegistry {
    pub fn new(
        resolver: IdentityResolver,
        links: Arc<dyn LinkFactory>,
        cloud: Arc<dyn CloudDeviceService>,
        repository: Arc<dyn LocalRepository>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            resolver,
            links,
            cloud,
            repository,
            config,
            sessions: Mutex::new(HashMap::new()),
            building: WorkflowLocks::new(),
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Existing session for `identifier`, or a new one built from the stored record
    pub async fn get(&self, identifier: &DeviceId) -> Result<Arc<Session>, EngineError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = find(&sessions, identifier).await {
            return Ok(session);
        }

        let info = self.resolver.resolve_from_identifier(identifier).await?;
        if let Some(session) = sessions.get(info.identifier()) {
            return Ok(session.clone());
        }

        let thing_name = self
            .repository
            .get(info.identifier())
            .await?
            .and_then(|record| record.thing_name);
        Ok(self.register(&mut sessions, info, thing_name))
    }

    /// Session for a scanned code, provisioning network-capable devices on first sight
    ///
    /// On provisioning failure nothing is registered and nothing is stored.
    pub async fn get_or_provision(&self, content: &str, token: &ClientToken) -> Result<Arc<Session>, EngineError> {
        let code = self.resolver.decode(content)?;
        let info = self.resolver.describe(&code)?;

        let id = info.identifier().clone();
        if let Some(session) = self.registered(&id).await {
            return Ok(session);
        }

        let _building = self.building.acquire(&id).await;
        if let Some(session) = self.registered(&id).await {
            return Ok(session);
        }

        let thing_name = if info.is_network_capable() {
            Some(self.provision(&info, token).await?)
        } else {
            None
        };

        let mut record = ConnectionRecord::from_code(&code);
        record.thing_name = thing_name.clone();
        self.repository.save(record).await?;

        let mut sessions = self.sessions.lock().await;
        // a concurrent get() may have built it from the record just saved
        if let Some(session) = sessions.get(&id) {
            return Ok(session.clone());
        }
        Ok(self.register(&mut sessions, info, thing_name))
    }

    /// Existing session only
    pub async fn lookup(&self, identifier: &DeviceId) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        find(&sessions, identifier).await
    }

    /// Tear down a session and disconnect its link
    pub async fn remove(&self, identifier: &DeviceId) -> Option<Arc<Session>> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            let session = find(&sessions, identifier).await?;
            sessions.remove(session.identifier());
            session
        };

        if let Err(e) = session.link().disconnect().await {
            warn!(device = %session.identifier(), error = %e, "Failed to disconnect link");
        }
        info!(device = %session.identifier(), "Session removed");
        Some(session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn identifiers(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn registered(&self, identifier: &DeviceId) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(identifier).cloned()
    }

    fn register(
        &self,
        sessions: &mut HashMap<DeviceId, Arc<Session>>,
        info: DeviceInfo,
        thing_name: Option<String>,
    ) -> Arc<Session> {
        let link = self.links.open(&info);
        let session = Arc::new(Session::new(info, link, thing_name));
        info!(
            device = %session.identifier(),
            model = %session.info().model(),
            transport = ?session.transport(),
            "Session registered"
        );
        sessions.insert(session.identifier().clone(), session.clone());
        session
    }

    /// Bind a network-capable device to a cloud identity unless it already has one
    async fn provision(&self, info: &DeviceInfo, token: &ClientToken) -> Result<String, EngineError> {
        let serial = info
            .serial_number()
            .ok_or_else(|| EngineError::ProvisionFailed(format!("{} has no serial number", info.identifier())))?;

        let devices = self
            .cloud
            .list(token)
            .await
            .map_err(|e| EngineError::ProvisionFailed(format!("device list: {}", e)))?;
        if let Some(bound) = devices.into_iter().find(|d| d.serial_number.as_deref() == Some(serial)) {
            debug!(device = %info.identifier(), thing_name = %bound.thing_name, "Device already provisioned");
            return Ok(bound.thing_name);
        }

        let ticket = ProvisioningTicket {
            application_id: self.config.cloud.application_id.clone(),
            model: info.model().to_string(),
            serial_number: serial.to_string(),
            device_name: info.device_name().to_string(),
            timezone: self.config.timezone(),
            data_encryption_key: self.config.cloud.data_encryption_key.clone(),
            client_token: token.as_str().to_string(),
        };
        let thing_name = self.cloud.create(&ticket).await.map_err(|e| {
            warn!(device = %info.identifier(), serial = %serial, error = %e, "Provisioning ticket rejected");
            EngineError::ProvisionFailed(e.to_string())
        })?;

        info!(device = %info.identifier(), thing_name = %thing_name, "Device provisioned");
        Ok(thing_name)
    }
}

async fn find(sessions: &HashMap<DeviceId, Arc<Session>>, identifier: &DeviceId) -> Option<Arc<Session>> {
    if let Some(session) = sessions.get(identifier) {
        return Some(session.clone());
    }
    for session in sessions.values() {
        if session.answers_to(identifier).await {
            return Some(session.clone());
        }
    }
    None
}
