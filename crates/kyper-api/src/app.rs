//! App resources.
//!
//! Apps are keyed by slug. Create and update accept the same metadata bag,
//! wrapped as `{"app": {...}}`.

use serde::{Deserialize, Serialize};

use crate::version::VersionInfo;

/// An app as returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pricing_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tech_stack: String,
}

/// App status with the latest submitted version, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    pub app: App,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub latest_version: Option<VersionInfo>,
}

/// Combined pricing tag derived from which prices are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingType {
    #[serde(rename = "both")]
    Both,
    #[serde(rename = "one_time")]
    OneTime,
    #[serde(rename = "subscription")]
    Subscription,
    #[serde(rename = "")]
    Unpriced,
}

impl PricingType {
    pub fn from_prices(one_time: Option<f64>, subscription: Option<f64>) -> Self {
        match (one_time.is_some(), subscription.is_some()) {
            (true, true) => Self::Both,
            (true, false) => Self::OneTime,
            (false, true) => Self::Subscription,
            (false, false) => Self::Unpriced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::OneTime => "one_time",
            Self::Subscription => "subscription",
            Self::Unpriced => "",
        }
    }
}

/// Convert a currency amount to integer minor units (cents), rounding half
/// away from zero.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Metadata bag sent on app create/update.
///
/// Absent fields are omitted from the body so an update never clears a value
/// it did not mean to touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    pub pricing_type: PricingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_price_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_price_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<String>,
}

impl AppParams {
    /// Create a bag with the required fields and no pricing.
    pub fn new(description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: None,
            description: description.into(),
            category: category.into(),
            tagline: None,
            pricing_type: PricingType::Unpriced,
            one_time_price_cents: None,
            subscription_price_cents: None,
            tech_stack: None,
        }
    }

    /// Apply the two optional prices: sets the cents fields and the
    /// combined pricing tag.
    pub fn with_pricing(mut self, one_time: Option<f64>, subscription: Option<f64>) -> Self {
        self.pricing_type = PricingType::from_prices(one_time, subscription);
        self.one_time_price_cents = one_time.map(to_minor_units);
        self.subscription_price_cents = subscription.map(to_minor_units);
        self
    }

    /// Wrap as the request body `{"app": {...}}`.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "app": self })
    }
}
