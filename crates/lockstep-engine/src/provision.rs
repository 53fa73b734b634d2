//! Wi-Fi and cloud provisioning state machine
//!
//! A [`Provisioner`] attaches a watcher task to a proximity session. The
//! watcher follows the link state and, whenever the link comes up (or the
//! caller asks via [`ProvisionHandle::submit`]), runs one provisioning
//! invocation:
//!
//! 1. Submit the stored Wi-Fi credentials to the device
//! 2. Relay each progress state as a [`ProvisionEvent::Progress`]
//! 3. On `CloudConnected`, record the device's thing-name
//! 4. Finish with exactly one terminal event, or `LinkDisconnected`
//!
//! A watchdog bounds every invocation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{BoxStream, StreamExt};
use lockstep_core::{ConnectionRecord, ConnectionState, WifiProvisionState};
use lockstep_services::{ClientTokenSource, CloudDeviceService, LocalRepository};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::session::Session;

const EVENT_BUFFER: usize = 32;

/// Why an invocation ended in `ConnectFailed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The watchdog expired before a terminal state
    Timeout,
    /// The device failed or misreported the cloud phase
    CloudRegistrationFailed,
    /// The credentials could not be submitted or progress reporting broke off
    ProvisionFailed,
}

impl From<FailureReason> for EngineError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Timeout => Self::Timeout,
            FailureReason::CloudRegistrationFailed => Self::CloudRegistrationFailed,
            FailureReason::ProvisionFailed => Self::ProvisionFailed("credential submission failed".to_string()),
        }
    }
}

/// Event delivered to the caller of [`Provisioner::attach`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvisionEvent {
    /// A provisioning invocation began
    Started,
    Progress {
        state: WifiProvisionState,
        label: &'static str,
    },
    LinkConnecting,
    LinkDisconnected,
    /// The device could not join Wi-Fi; the caller should ask for new credentials
    ResetWifi,
    ConnectSuccess { thing_name: Option<String> },
    ConnectFailed { reason: FailureReason },
}

impl ProvisionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisionEvent::ResetWifi | ProvisionEvent::ConnectSuccess { .. } | ProvisionEvent::ConnectFailed { .. }
        )
    }
}

enum Command {
    Submit,
    SetPassword(String),
}

/// Caller side of an attached provisioning watcher
///
/// Dropping the handle stops the watcher.
pub struct ProvisionHandle {
    events: mpsc::Receiver<ProvisionEvent>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    _stop_on_drop: DropGuard,
}

impl ProvisionHandle {
    pub async fn next_event(&mut self) -> Option<ProvisionEvent> {
        self.events.recv().await
    }

    /// Start an invocation with the stored credentials
    pub async fn submit(&self) -> Result<(), EngineError> {
        self.commands
            .send(Command::Submit)
            .await
            .map_err(|_| EngineError::WatcherClosed)
    }

    /// Replace the password used by the next invocation
    pub async fn set_password(&self, password: impl Into<String>) -> Result<(), EngineError> {
        self.commands
            .send(Command::SetPassword(password.into()))
            .await
            .map_err(|_| EngineError::WatcherClosed)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the current invocation to end
    ///
    /// Returns the recorded thing-name on success.
    pub async fn outcome(&mut self) -> Result<Option<String>, EngineError> {
        while let Some(event) = self.events.recv().await {
            match event {
                ProvisionEvent::ConnectSuccess { thing_name } => return Ok(thing_name),
                ProvisionEvent::ConnectFailed { reason } => return Err(reason.into()),
                ProvisionEvent::ResetWifi => return Err(EngineError::WifiFailed),
                ProvisionEvent::LinkDisconnected => {
                    return Err(EngineError::DeviceUnreachable("proximity link dropped".to_string()))
                }
                _ => {}
            }
        }
        Err(EngineError::WatcherClosed)
    }
}

/// Attaches provisioning watchers to sessions
pub struct Provisioner {
    cloud: Arc<dyn CloudDeviceService>,
    repository: Arc<dyn LocalRepository>,
    tokens: Arc<dyn ClientTokenSource>,
    config: Arc<EngineConfig>,
}

impl Provisioner {
    pub fn new(
        cloud: Arc<dyn CloudDeviceService>,
        repository: Arc<dyn LocalRepository>,
        tokens: Arc<dyn ClientTokenSource>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            cloud,
            repository,
            tokens,
            config,
        }
    }

    /// Watch `session` and provision it with the given credentials whenever the link connects
    pub fn attach(&self, session: Arc<Session>, ssid: impl Into<String>, password: impl Into<String>) -> ProvisionHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let states = session.link().connection_states();
        let watcher = Watcher {
            session,
            cloud: self.cloud.clone(),
            repository: self.repository.clone(),
            tokens: self.tokens.clone(),
            events: event_tx,
            cancel: cancel.clone(),
            ssid: ssid.into(),
            password: password.into(),
            watchdog: self.config.watchdog(),
            auto_reconnect: self.config.provisioning.auto_reconnect,
            link_state: ConnectionState::Disconnected,
            states_open: true,
        };
        tokio::spawn(watcher.run(states, command_rx));

        ProvisionHandle {
            events: event_rx,
            commands: command_tx,
            _stop_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }
}

struct Watcher {
    session: Arc<Session>,
    cloud: Arc<dyn CloudDeviceService>,
    repository: Arc<dyn LocalRepository>,
    tokens: Arc<dyn ClientTokenSource>,
    events: mpsc::Sender<ProvisionEvent>,
    cancel: CancellationToken,
    ssid: String,
    password: String,
    watchdog: Duration,
    auto_reconnect: bool,
    /// Last link state seen
    link_state: ConnectionState,
    /// False once the link-state stream has ended
    states_open: bool,
}

impl Watcher {
    async fn run(mut self, mut states: BoxStream<'static, ConnectionState>, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                state = states.next(), if self.states_open => match state {
                    Some(state) => self.on_link_state(state, &mut states).await,
                    None => self.states_open = false,
                },
                command = commands.recv() => match command {
                    Some(Command::Submit) => self.provision(&mut states).await,
                    Some(Command::SetPassword(password)) => self.password = password,
                    None => break,
                },
            }
        }
        debug!(device = %self.session.identifier(), "Provisioning watcher stopped");
    }

    async fn on_link_state(&mut self, state: ConnectionState, states: &mut BoxStream<'static, ConnectionState>) {
        let previous = std::mem::replace(&mut self.link_state, state);
        match state {
            ConnectionState::Connecting => {
                self.emit(ProvisionEvent::LinkConnecting).await;
            }
            ConnectionState::Connected => {
                debug!(device = %self.session.identifier(), "Link connected, submitting credentials");
                self.provision(states).await;
            }
            ConnectionState::Disconnected => {
                if previous != ConnectionState::Disconnected {
                    self.on_disconnect().await;
                }
            }
        }
    }

    async fn on_disconnect(&self) {
        info!(device = %self.session.identifier(), "Proximity link disconnected");
        self.emit(ProvisionEvent::LinkDisconnected).await;

        if self.auto_reconnect {
            if let Err(e) = self.session.link().connect().await {
                warn!(device = %self.session.identifier(), error = %e, "Reconnect failed");
            }
        }
    }

    /// One invocation: submit credentials and follow progress to a terminal event
    ///
    /// The watchdog starts with the submission and covers the whole invocation.
    async fn provision(&mut self, states: &mut BoxStream<'static, ConnectionState>) {
        let id = self.session.identifier().clone();
        info!(device = %id, ssid = %self.ssid, "Submitting Wi-Fi credentials");
        self.emit(ProvisionEvent::Started).await;

        let watchdog = tokio::time::sleep(self.watchdog);
        tokio::pin!(watchdog);

        let link = self.session.link().clone();
        let (ssid, password) = (self.ssid.clone(), self.password.clone());
        let submission = link.submit_wifi_credentials(&ssid, &password);
        tokio::pin!(submission);

        let mut progress = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = &mut watchdog => {
                    self.time_out().await;
                    return;
                }
                state = states.next(), if self.states_open => {
                    if self.link_dropped(state).await {
                        return;
                    }
                }
                submitted = &mut submission => match submitted {
                    Ok(progress) => break progress,
                    Err(e) => {
                        warn!(device = %id, error = %e, "Credential submission failed");
                        self.fail(FailureReason::ProvisionFailed).await;
                        return;
                    }
                },
            }
        };

        let mut wifi_connected = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = &mut watchdog => {
                    self.time_out().await;
                    return;
                }
                state = states.next(), if self.states_open => {
                    if self.link_dropped(state).await {
                        return;
                    }
                }
                update = progress.next() => {
                    let state = match update {
                        Some(Ok(state)) => state,
                        Some(Err(e)) => {
                            warn!(device = %id, error = %e, "Progress reporting failed");
                            self.fail(FailureReason::ProvisionFailed).await;
                            return;
                        }
                        None => {
                            warn!(device = %id, "Device stopped reporting before a terminal state");
                            self.fail(FailureReason::ProvisionFailed).await;
                            return;
                        }
                    };

                    if state.is_cloud_phase() && !wifi_connected {
                        warn!(device = %id, state = ?state, "Cloud state reported before Wi-Fi connected");
                        self.fail(FailureReason::CloudRegistrationFailed).await;
                        return;
                    }

                    debug!(device = %id, state = ?state, "Provisioning progress");
                    self.emit(ProvisionEvent::Progress { state, label: state.label() }).await;

                    match state {
                        WifiProvisionState::ConnectingWifi | WifiProvisionState::CloudConnecting => {}
                        WifiProvisionState::WifiConnected => wifi_connected = true,
                        WifiProvisionState::WifiFailed => {
                            warn!(device = %id, ssid = %self.ssid, "Device could not join Wi-Fi");
                            self.emit(ProvisionEvent::ResetWifi).await;
                            return;
                        }
                        WifiProvisionState::Failed => {
                            self.fail(FailureReason::CloudRegistrationFailed).await;
                            return;
                        }
                        WifiProvisionState::CloudConnected => break,
                    }
                }
            }
        }

        let thing_name = self.record_thing_name().await;
        info!(device = %id, thing_name = ?thing_name, "Provisioning complete");
        self.emit(ProvisionEvent::ConnectSuccess { thing_name }).await;
    }

    /// Track a link state seen mid-invocation; true when the link went down
    async fn link_dropped(&mut self, state: Option<ConnectionState>) -> bool {
        match state {
            Some(ConnectionState::Disconnected) => {
                self.link_state = ConnectionState::Disconnected;
                self.on_disconnect().await;
                true
            }
            Some(state) => {
                self.link_state = state;
                false
            }
            None => {
                self.states_open = false;
                false
            }
        }
    }

    async fn time_out(&self) {
        warn!(device = %self.session.identifier(), timeout_secs = self.watchdog.as_secs(), "Provisioning timed out");
        self.fail(FailureReason::Timeout).await;
    }

    /// Best-effort follow-up after `CloudConnected`
    async fn record_thing_name(&self) -> Option<String> {
        match self.fetch_thing_name().await {
            Ok(thing_name) => Some(thing_name),
            Err(e) => {
                warn!(device = %self.session.identifier(), error = %e, "Thing-name fetch failed after provisioning");
                self.session.thing_name().await
            }
        }
    }

    async fn fetch_thing_name(&self) -> Result<String, EngineError> {
        let id = self.session.identifier();
        let serial = self
            .session
            .info()
            .serial_number()
            .ok_or_else(|| EngineError::NotFound(format!("serial number of {}", id)))?;

        let token = self.tokens.client_token().await?;
        let device = self
            .cloud
            .list(&token)
            .await?
            .into_iter()
            .find(|d| d.serial_number.as_deref() == Some(serial))
            .ok_or_else(|| EngineError::NotFound(format!("cloud device with serial {}", serial)))?;

        self.session.set_thing_name(device.thing_name.clone()).await;

        let mut record = match self.repository.get(id).await? {
            Some(record) => record,
            None => ConnectionRecord {
                identifier: id.clone(),
                model: self.session.info().model().to_string(),
                serial_number: Some(serial.to_string()),
                device_name: self.session.info().device_name().to_string(),
                thing_name: None,
                connection_key: None,
                share_token: None,
                saved_at: Utc::now(),
            },
        };
        record.thing_name = Some(device.thing_name.clone());
        self.repository.save(record).await?;

        Ok(device.thing_name)
    }

    async fn fail(&self, reason: FailureReason) {
        self.emit(ProvisionEvent::ConnectFailed { reason }).await;
    }

    async fn emit(&self, event: ProvisionEvent) {
        if self.events.send(event).await.is_err() {
            self.cancel.cancel();
        }
    }
}
