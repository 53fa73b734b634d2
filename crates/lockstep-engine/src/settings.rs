//! Settings load and leave-view reconciliation

use lockstep_core::{RegistryAttributes, SettingsDraft, TransportKind};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::lifecycle::LifecycleCoordinator;
use crate::session::Session;

/// What [`LifecycleCoordinator::reconcile`] did
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The baseline was never loaded; nothing to compare
    NotLoaded,
    /// None of the editable attributes changed
    Unchanged,
    /// Full document pushed to the cloud registry; holds what the cloud stored
    PushedToCloud(RegistryAttributes),
    /// Edited attributes merged into the on-device configuration
    PushedOverProximity,
}

impl ReconcileOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, Self::PushedToCloud(_) | Self::PushedOverProximity)
    }
}

impl LifecycleCoordinator {
    /// Fetch the current configuration as a fresh draft
    pub async fn load_settings(&self, session: &Session) -> Result<SettingsDraft, EngineError> {
        let id = session.identifier();
        let _guard = self.locks.acquire(id).await;

        let baseline = match session.transport() {
            TransportKind::Network => {
                let token = self.tokens.client_token().await?;
                let thing_name = self.thing_name(session, &token).await?;
                self.cloud.get_registry(&thing_name, &token).await?
            }
            TransportKind::Proximity => {
                let link = self.connected_link(session).await?;
                link.read_configuration()
                    .await
                    .map_err(|e| EngineError::from_link(id, e))?
            }
        };
        debug!(device = %id, "Settings loaded");
        Ok(SettingsDraft::loaded(baseline))
    }

    /// Write the draft back if any of the six editable attributes changed
    pub async fn reconcile(&self, session: &Session, draft: &SettingsDraft) -> Result<ReconcileOutcome, EngineError> {
        let id = session.identifier();
        let Some(edited) = draft.edited() else {
            debug!(device = %id, "Settings never loaded, nothing to reconcile");
            return Ok(ReconcileOutcome::NotLoaded);
        };
        if !draft.is_dirty() {
            debug!(device = %id, "Settings unchanged");
            return Ok(ReconcileOutcome::Unchanged);
        }

        let _guard = self.locks.acquire(id).await;
        let outcome = match session.transport() {
            TransportKind::Network => {
                let token = self.tokens.client_token().await?;
                let thing_name = self.thing_name(session, &token).await?;
                let stored = self.cloud.update_registry(&thing_name, edited, &token).await?;
                ReconcileOutcome::PushedToCloud(stored)
            }
            TransportKind::Proximity => {
                let link = self.connected_link(session).await?;
                let current = link
                    .read_configuration()
                    .await
                    .map_err(|e| EngineError::from_link(id, e))?;
                let merged = current.with_editable(edited.editable());
                link.write_configuration(&merged)
                    .await
                    .map_err(|e| EngineError::from_link(id, e))?;
                ReconcileOutcome::PushedOverProximity
            }
        };

        info!(device = %id, settings = ?edited.editable(), "Settings written");
        Ok(outcome)
    }
}
