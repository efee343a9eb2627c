//! Failure Injection for Mock Server
//!
//! Supports configurable failure injection for testing error paths.

use std::time::Duration;

use crate::host::Method;

/// Failure configuration for a route
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// HTTP status to answer with (None = connection failure)
    pub status: Option<u16>,
    /// Error message placed in `{"error": ...}`
    pub message: String,
    /// Delay to add before responding
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Answer with an error status
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            delay: None,
            fail_count: None,
        }
    }

    /// 503 Service Unavailable
    pub fn unavailable() -> Self {
        Self::status(503, "Service unavailable")
    }

    /// Fail at the connection level, before any response
    pub fn connection() -> Self {
        Self {
            status: None,
            message: "connection refused".to_string(),
            delay: None,
            fail_count: None,
        }
    }

    /// Only add a delay
    pub fn delay(duration: Duration) -> Self {
        Self {
            status: None,
            message: String::new(),
            delay: Some(duration),
            fail_count: Some(0),
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Outcome of a failure check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injected {
    Status(u16, String),
    Connection(String),
}

#[derive(Debug)]
struct Rule {
    method: Method,
    prefix: String,
    config: FailureConfig,
    calls: u32,
}

/// Failure injector for the mock server
#[derive(Debug, Default)]
pub struct FailureInjector {
    rules: Vec<Rule>,
}

impl FailureInjector {
    /// Create a new failure injector
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for requests whose method matches and whose path
    /// starts with `prefix`. Replaces an earlier rule for the same route.
    pub fn inject(&mut self, method: Method, prefix: impl Into<String>, config: FailureConfig) {
        let prefix = prefix.into();
        self.rules
            .retain(|r| !(r.method == method && r.prefix == prefix));
        self.rules.push(Rule {
            method,
            prefix,
            config,
            calls: 0,
        });
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Check whether this request should fail.
    ///
    /// Returns the delay to apply (if any) and the failure (if any).
    pub fn check(&mut self, method: Method, path: &str) -> (Option<Duration>, Option<Injected>) {
        let Some(rule) = self
            .rules
            .iter_mut()
            .find(|r| r.method == method && path.starts_with(&r.prefix))
        else {
            return (None, None);
        };

        rule.calls += 1;
        let delay = rule.config.delay;

        if let Some(limit) = rule.config.fail_count {
            if rule.calls > limit {
                return (delay, None);
            }
        }

        let injected = match rule.config.status {
            Some(status) => Injected::Status(status, rule.config.message.clone()),
            None if rule.config.delay.is_some() => return (delay, None),
            None => Injected::Connection(rule.config.message.clone()),
        };
        (delay, Some(injected))
    }
}
