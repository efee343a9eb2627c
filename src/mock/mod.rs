//! Mock Server Implementation
//!
//! Implements a configurable in-process build service for testing the
//! client end to end. Supports every endpoint the client calls, with
//! scripted build logs and failure injection for testing error paths.
//!
//! # Endpoints
//!
//! - `device/authorize`, `device/token`: device handshake with pending polls
//! - `me`: the authenticated user
//! - `apps`: read, create, update, status with latest version
//! - `apps/<slug>/versions`: multipart upload, package entries recorded
//! - `versions/<id>/build_log`: cursor pagination over a `BuildScript`
//! - `versions/<id>/retry|cancel`, `DELETE versions/<id>`

mod failure;
mod server;
mod state;

pub use failure::{FailureConfig, FailureInjector, Injected};
pub use server::{MockServer, RecordedRequest};
pub use state::{BuildScript, DeviceFlow, MockState, MockVersion, UploadRecord};
