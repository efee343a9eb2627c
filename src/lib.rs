//! Kyper CLI - package, submit and follow remote builds
//!
//! This crate packages a project directory into a zip archive, submits it to
//! the Kyper build service over a retrying HTTP transport, and follows the
//! build log by cursor polling until the build reaches a terminal status.

pub mod bundle;
pub mod commands;
pub mod config;
pub mod host;
pub mod mock;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod prompt;
pub mod run;
pub mod timeout;

pub use bundle::{BundleResult, Bundler, ExcludeRules};
pub use config::{CliOverrides, ClientConfig};
pub use host::{ApiClient, ResilientTransport, RetryPolicy};
pub use pipeline::{PushError, PushOptions, PushOrchestrator, PushOutcome, PushState};
pub use project::{slugify, ProjectDescriptor};
