//! Lockstep Engine - Device sessions, provisioning and lifecycle workflows
//!
//! - [`SessionRegistry`]: one live session per device, built from a scanned
//!   code or a stored record, provisioning network-capable devices on first use
//! - [`Provisioner`]: the Wi-Fi/cloud provisioning state machine with watchdog
//! - [`LifecycleCoordinator`]: delete, factory reset and settings workflows
//!   that keep the cloud registry, user-sync document and local records consistent

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod provision;
pub mod resolver;
pub mod session;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{EngineConfig, LifecycleConfig, ProvisioningConfig};
pub use engine::{Collaborators, Engine};
pub use error::EngineError;
pub use lifecycle::{LifecycleCoordinator, WorkflowLocks};
pub use provision::{FailureReason, ProvisionEvent, ProvisionHandle, Provisioner};
pub use resolver::IdentityResolver;
pub use session::{Session, SessionRegistry};
pub use settings::ReconcileOutcome;
