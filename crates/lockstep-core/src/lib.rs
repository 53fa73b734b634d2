//! Lockstep Core - Core types, device classification, and local records
//!
//! This crate provides the foundational types for the Lockstep system:
//! - Device identity, transport capability and link state types
//! - The model trait table used to classify devices
//! - Decoders for scanned pairing and onboarding codes
//! - Registry attributes and the in-memory settings draft
//! - The versioned user-sync document
//! - A JSON-file store for connection records

pub mod attributes;
pub mod code;
pub mod device;
pub mod model;
pub mod store;
pub mod sync;

pub use attributes::{EditableSettings, Location, RegistryAttributes, SettingsDraft};
pub use code::{CodeError, OnboardingCode, PairingCode, ScannedCode};
pub use device::{Capability, ConnectionState, DeviceId, DeviceInfo, TransportKind, WifiProvisionState};
pub use model::{classify, ModelEntry, ModelError, ModelTable};
pub use store::{ConnectionRecord, RecordStore, StoreError};
pub use sync::{ProximityDeviceRecord, SyncVersion, SyncWrite, UserSyncDocument};
