//! In-memory collaborators for engine tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use futures_util::stream::{self, BoxStream, StreamExt};
use lockstep_core::{
    ConnectionRecord, ConnectionState, DeviceId, DeviceInfo, ModelTable, RegistryAttributes, SyncVersion, SyncWrite,
    UserSyncDocument, WifiProvisionState,
};
use lockstep_services::{
    AccessCode, ClientToken, CloudDevice, CloudDeviceService, LinkFactory, LocalRepository, ProvisioningTicket,
    ProximityLink, ServiceError, TicketDetails, UserSyncService, UuidTokenSource, WifiProgress,
};
use serde_json::json;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::config::EngineConfig;
use crate::engine::{Collaborators, Engine};
use crate::session::SessionRegistry;

pub fn pairing_code(mac: &str, model: &str, name: Option<&str>) -> String {
    let mut payload = json!({
        "A": mac,
        "K": format!("key-{mac}"),
        "T": format!("token-{mac}"),
        "M": model,
    });
    if let Some(name) = name {
        payload["N"] = json!(name);
    }
    STANDARD.encode(payload.to_string())
}

pub fn onboarding_code(mac: &str, serial: &str, model: &str) -> String {
    STANDARD.encode(json!({ "S": serial, "A": mac, "M": model }).to_string())
}

/// Stored record with serial `SN-<mac>`
pub fn stored_record(mac: &str, model: &str, thing_name: Option<&str>) -> ConnectionRecord {
    ConnectionRecord {
        identifier: DeviceId::parse(mac),
        model: model.to_string(),
        serial_number: Some(format!("SN-{mac}")),
        device_name: format!("{model} lock"),
        thing_name: thing_name.map(str::to_string),
        connection_key: None,
        share_token: None,
        saved_at: Utc::now(),
    }
}

fn failure(what: &str) -> ServiceError {
    ServiceError::Status {
        status: 500,
        body: format!("{what} failed"),
    }
}

#[derive(Default)]
pub struct FakeRepository {
    records: Mutex<HashMap<DeviceId, ConnectionRecord>>,
    fail_deletes: AtomicBool,
    deletes: AtomicUsize,
}

impl FakeRepository {
    pub fn insert(&self, record: ConnectionRecord) {
        self.records.lock().unwrap().insert(record.identifier.clone(), record);
    }

    pub fn record(&self, mac: &str) -> Option<ConnectionRecord> {
        self.records.lock().unwrap().get(&DeviceId::parse(mac)).cloned()
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalRepository for FakeRepository {
    async fn get(&self, identifier: &DeviceId) -> Result<Option<ConnectionRecord>, ServiceError> {
        let records = self.records.lock().unwrap();
        let record = records.get(identifier).or_else(|| {
            records
                .values()
                .find(|r| r.thing_name.as_deref() == Some(identifier.as_str()))
        });
        Ok(record.cloned())
    }

    async fn delete(&self, record: &ConnectionRecord) -> Result<(), ServiceError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(failure("delete"));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().remove(&record.identifier);
        Ok(())
    }

    async fn save(&self, record: ConnectionRecord) -> Result<(), ServiceError> {
        self.insert(record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConnectionRecord>, ServiceError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
struct CloudState {
    devices: Vec<CloudDevice>,
    tickets: Vec<ProvisioningTicket>,
    calls: Vec<&'static str>,
    deleted: Vec<String>,
    admin_codes: Vec<AccessCode>,
    registry: RegistryAttributes,
    registry_writes: Vec<RegistryAttributes>,
    fail_create: bool,
    stall_create: bool,
    fail_list: bool,
}

#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn add_device(&self, device: CloudDevice) {
        self.state.lock().unwrap().devices.push(device);
    }

    pub fn tickets(&self) -> Vec<ProvisioningTicket> {
        self.state.lock().unwrap().tickets.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn registry_writes(&self) -> Vec<RegistryAttributes> {
        self.state.lock().unwrap().registry_writes.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| **c == name).count()
    }

    pub fn set_admin_codes(&self, codes: Vec<AccessCode>) {
        self.state.lock().unwrap().admin_codes = codes;
    }

    pub fn set_registry(&self, attributes: RegistryAttributes) {
        self.state.lock().unwrap().registry = attributes;
    }

    pub fn fail_create(&self) {
        self.state.lock().unwrap().fail_create = true;
    }

    /// Never answer `create`
    pub fn stall_create(&self) {
        self.state.lock().unwrap().stall_create = true;
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    fn record(&self, call: &'static str) -> std::sync::MutexGuard<'_, CloudState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl CloudDeviceService for FakeCloud {
    async fn create(&self, ticket: &ProvisioningTicket) -> Result<String, ServiceError> {
        let stalled = {
            let state = self.record("create");
            state.stall_create
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(failure("create"));
        }
        let thing_name = format!("thing-{}", ticket.serial_number);
        state.tickets.push(ticket.clone());
        state.devices.push(CloudDevice {
            thing_name: thing_name.clone(),
            serial_number: Some(ticket.serial_number.clone()),
            device_name: ticket.device_name.clone(),
            model: ticket.model.clone(),
        });
        Ok(thing_name)
    }

    async fn get_ticket(&self, ticket: &str, _token: &ClientToken) -> Result<TicketDetails, ServiceError> {
        self.record("get_ticket");
        Ok(TicketDetails {
            ticket: ticket.to_string(),
            ..Default::default()
        })
    }

    async fn list(&self, _token: &ClientToken) -> Result<Vec<CloudDevice>, ServiceError> {
        let state = self.record("list");
        if state.fail_list {
            return Err(failure("list"));
        }
        Ok(state.devices.clone())
    }

    async fn update_name(&self, _thing_name: &str, _device_name: &str, _token: &ClientToken) -> Result<(), ServiceError> {
        self.record("update_name");
        Ok(())
    }

    async fn update_timezone(&self, _thing_name: &str, _timezone: &str, _token: &ClientToken) -> Result<(), ServiceError> {
        self.record("update_timezone");
        Ok(())
    }

    async fn update_admin_code(
        &self,
        _thing_name: &str,
        _admin_code: &str,
        _old_code: &str,
        _token: &ClientToken,
    ) -> Result<(), ServiceError> {
        self.record("update_admin_code");
        Ok(())
    }

    async fn delete(&self, thing_name: &str, _token: &ClientToken) -> Result<(), ServiceError> {
        let mut state = self.record("delete");
        state.deleted.push(thing_name.to_string());
        Ok(())
    }

    async fn lock(&self, _thing_name: &str, _token: &ClientToken) -> Result<(), ServiceError> {
        self.record("lock");
        Ok(())
    }

    async fn unlock(&self, _thing_name: &str, _token: &ClientToken) -> Result<(), ServiceError> {
        self.record("unlock");
        Ok(())
    }

    async fn get_registry(&self, _thing_name: &str, _token: &ClientToken) -> Result<RegistryAttributes, ServiceError> {
        Ok(self.record("get_registry").registry.clone())
    }

    async fn update_registry(
        &self,
        _thing_name: &str,
        attributes: &RegistryAttributes,
        _token: &ClientToken,
    ) -> Result<RegistryAttributes, ServiceError> {
        let mut state = self.record("update_registry");
        state.registry_writes.push(attributes.clone());
        state.registry = attributes.clone();
        Ok(attributes.clone())
    }

    async fn get_admin_code(&self, _thing_name: &str, _token: &ClientToken) -> Result<Vec<AccessCode>, ServiceError> {
        Ok(self.record("get_admin_code").admin_codes.clone())
    }
}

#[derive(Default)]
struct SyncState {
    document: UserSyncDocument,
    writes: Vec<UserSyncDocument>,
    conflict_with: Option<SyncVersion>,
    fail_reads: bool,
    fail_writes: bool,
}

#[derive(Default)]
pub struct FakeSync {
    state: Mutex<SyncState>,
}

impl FakeSync {
    pub fn set_document(&self, document: UserSyncDocument) {
        self.state.lock().unwrap().document = document;
    }

    /// Make the next write see another writer's version
    pub fn conflict_on_next_write(&self, current: SyncVersion) {
        self.state.lock().unwrap().conflict_with = Some(current);
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn writes(&self) -> Vec<UserSyncDocument> {
        self.state.lock().unwrap().writes.clone()
    }
}

#[async_trait]
impl UserSyncService for FakeSync {
    async fn get_user_sync(&self, _token: &ClientToken) -> Result<UserSyncDocument, ServiceError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(failure("get_user_sync"));
        }
        Ok(state.document.clone())
    }

    async fn update_user_sync(&self, _token: &ClientToken, document: &UserSyncDocument) -> Result<SyncWrite, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(failure("update_user_sync"));
        }
        if let Some(current) = state.conflict_with.take() {
            state.document.version = current;
        }
        if document.version != state.document.version {
            return Ok(SyncWrite::Conflict {
                attempted: document.version,
                current: Some(state.document.version),
            });
        }

        let version = SyncVersion(document.version.0 + 1);
        state.writes.push(document.clone());
        state.document = UserSyncDocument::new(document.devices.clone(), version);
        Ok(SyncWrite::Committed { version })
    }
}

pub struct FakeLink {
    state: watch::Sender<ConnectionState>,
    script: Mutex<Vec<WifiProvisionState>>,
    hang: AtomicBool,
    stall: AtomicBool,
    accept_commands: AtomicBool,
    submissions: Mutex<Vec<(String, String)>>,
    configuration: Mutex<RegistryAttributes>,
    writes: Mutex<Vec<RegistryAttributes>>,
    resets: Mutex<Vec<String>>,
    renames: Mutex<Vec<String>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Default for FakeLink {
    fn default() -> Self {
        Self {
            state: watch::Sender::new(ConnectionState::Disconnected),
            script: Mutex::default(),
            hang: AtomicBool::new(false),
            stall: AtomicBool::new(false),
            accept_commands: AtomicBool::new(true),
            submissions: Mutex::default(),
            configuration: Mutex::default(),
            writes: Mutex::default(),
            resets: Mutex::default(),
            renames: Mutex::default(),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }
}

impl FakeLink {
    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Progress states reported after each credential submission
    pub fn script(&self, states: &[WifiProvisionState]) {
        *self.script.lock().unwrap() = states.to_vec();
    }

    /// Keep the progress stream open after the script instead of ending it
    pub fn hang_after_script(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Never answer credential submissions
    pub fn stall_submissions(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    pub fn reject_commands(&self) {
        self.accept_commands.store(false, Ordering::SeqCst);
    }

    pub fn set_configuration(&self, attributes: RegistryAttributes) {
        *self.configuration.lock().unwrap() = attributes;
    }

    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<RegistryAttributes> {
        self.writes.lock().unwrap().clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.resets.lock().unwrap().clone()
    }

    pub fn renames(&self) -> Vec<String> {
        self.renames.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn accepts(&self) -> bool {
        self.accept_commands.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProximityLink for FakeLink {
    async fn connect(&self) -> Result<(), ServiceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ServiceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    fn connection_states(&self) -> BoxStream<'static, ConnectionState> {
        WatchStream::new(self.state.subscribe()).boxed()
    }

    async fn read_configuration(&self) -> Result<RegistryAttributes, ServiceError> {
        Ok(self.configuration.lock().unwrap().clone())
    }

    async fn write_configuration(&self, attributes: &RegistryAttributes) -> Result<(), ServiceError> {
        self.writes.lock().unwrap().push(attributes.clone());
        *self.configuration.lock().unwrap() = attributes.clone();
        Ok(())
    }

    async fn submit_wifi_credentials(&self, ssid: &str, password: &str) -> Result<WifiProgress, ServiceError> {
        self.submissions
            .lock()
            .unwrap()
            .push((ssid.to_string(), password.to_string()));
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let states = stream::iter(self.script.lock().unwrap().clone().into_iter().map(Ok));
        if self.hang.load(Ordering::SeqCst) {
            Ok(states.chain(stream::pending()).boxed())
        } else {
            Ok(states.boxed())
        }
    }

    async fn factory_reset(&self, admin_code: &str) -> Result<bool, ServiceError> {
        self.resets.lock().unwrap().push(admin_code.to_string());
        Ok(self.accepts())
    }

    async fn change_admin_code(&self, _old_code: &str, _new_code: &str, _user_name: &str) -> Result<bool, ServiceError> {
        Ok(self.accepts())
    }

    async fn rename(&self, device_name: &str) -> Result<bool, ServiceError> {
        self.renames.lock().unwrap().push(device_name.to_string());
        Ok(self.accepts())
    }

    async fn set_timezone(&self, _timezone: &str) -> Result<bool, ServiceError> {
        Ok(self.accepts())
    }
}

#[derive(Default)]
pub struct FakeLinkFactory {
    links: Mutex<HashMap<DeviceId, Arc<FakeLink>>>,
    opened: AtomicUsize,
}

impl FakeLinkFactory {
    /// Link that will be handed out for `identifier`
    pub fn prepare(&self, identifier: &DeviceId) -> Arc<FakeLink> {
        self.links
            .lock()
            .unwrap()
            .entry(identifier.clone())
            .or_default()
            .clone()
    }

    pub fn link(&self, identifier: &DeviceId) -> Option<Arc<FakeLink>> {
        self.links.lock().unwrap().get(identifier).cloned()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl LinkFactory for FakeLinkFactory {
    fn open(&self, info: &DeviceInfo) -> Arc<dyn ProximityLink> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.prepare(info.identifier())
    }
}

pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub sync: Arc<FakeSync>,
    pub repository: Arc<FakeRepository>,
    pub links: Arc<FakeLinkFactory>,
    pub registry: Arc<SessionRegistry>,
    pub engine: Engine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let cloud = Arc::new(FakeCloud::default());
        let sync = Arc::new(FakeSync::default());
        let repository = Arc::new(FakeRepository::default());
        let links = Arc::new(FakeLinkFactory::default());

        let services = Collaborators {
            cloud: cloud.clone(),
            sync: sync.clone(),
            repository: repository.clone(),
            links: links.clone(),
            tokens: Arc::new(UuidTokenSource),
        };
        let engine = Engine::new(ModelTable::builtin(), services, config);

        Self {
            cloud,
            sync,
            repository,
            links,
            registry: engine.registry().clone(),
            engine,
        }
    }
}
