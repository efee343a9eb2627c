//! Kyper API Types
//!
//! Defines the JSON shapes exchanged with the build service: apps, versions,
//! build-log pages, device authorization and the normalized error body.

pub mod app;
pub mod auth;
pub mod error;
pub mod version;

pub use app::{App, AppParams, AppStatus, PricingType};
pub use auth::{DeviceGrant, TokenResponse, User};
pub use error::{ApiError, ErrorDetail, ErrorKind};
pub use version::{BuildLog, MessageResponse, VersionInfo, VersionResponse, VersionStatus};

/// Prefix shared by every endpoint path.
pub const API_PREFIX: &str = "/api/v1";
