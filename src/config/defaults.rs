//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use serde::{Deserialize, Serialize};

/// Production API host
pub const DEFAULT_HOST: &str = "https://kyper.shop";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// API host (default: https://kyper.shop)
    pub host: String,

    /// Per-request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,

    /// Delays before each attempt of a safe request, in milliseconds
    /// (default: 0, 1000, 2000)
    pub retry_delays_ms: Vec<u64>,

    /// Sleep between build-log polls in milliseconds (default: 2000)
    pub tail_poll_interval_ms: u64,

    /// Wall-clock bound on tailing one build (default: 1800 = 30 min)
    pub tail_deadline_seconds: u64,

    /// Sleep between device-token polls in milliseconds (default: 2000)
    pub login_poll_interval_ms: u64,

    /// Wall-clock bound on the device handshake (default: 300 = 5 min)
    pub login_deadline_seconds: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            request_timeout_seconds: 30,
            retry_delays_ms: vec![0, 1000, 2000],
            tail_poll_interval_ms: 2000,
            tail_deadline_seconds: 1800,
            login_poll_interval_ms: 2000,
            login_deadline_seconds: 300,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.host,
            "output": "human",
            "verbose": false,
            "request_timeout_seconds": self.request_timeout_seconds,
            "retry_delays_ms": self.retry_delays_ms,
            "tail": {
                "poll_interval_ms": self.tail_poll_interval_ms,
                "deadline_seconds": self.tail_deadline_seconds
            },
            "login": {
                "poll_interval_ms": self.login_poll_interval_ms,
                "deadline_seconds": self.login_deadline_seconds
            }
        })
    }
}
