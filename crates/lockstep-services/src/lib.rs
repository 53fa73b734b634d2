//! Lockstep Services - Contracts for the collaborators the engine talks to
//!
//! The engine never reaches a device, the cloud, or the disk directly. It
//! goes through the traits defined here:
//! - [`CloudDeviceService`] and [`UserSyncService`] for the cloud
//! - [`LocalRepository`] for stored connection records
//! - [`ProximityLink`] / [`LinkFactory`] for the short-range device session
//! - [`ClientTokenSource`] for per-workflow client tokens
//!
//! [`HttpCloudClient`] implements both cloud traits over JSON/HTTP.

pub mod cloud;
pub mod error;
pub mod http;
pub mod link;
pub mod repository;
pub mod token;

pub use cloud::{AccessCode, CloudDevice, CloudDeviceService, ProvisioningTicket, TicketDetails, UserSyncService};
pub use error::ServiceError;
pub use http::{CloudConfig, HttpCloudClient};
pub use link::{LinkFactory, ProximityLink, UnavailableLink, UnavailableLinkFactory, WifiProgress};
pub use repository::{JsonFileRepository, LocalRepository};
pub use token::{ClientToken, ClientTokenSource, StaticTokenSource, UuidTokenSource};
