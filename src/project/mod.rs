//! Project descriptor (`kyper.yml`)
//!
//! The descriptor names the app, its build inputs and its listing metadata.
//! The raw text is uploaded alongside the package, so `load` keeps it.

mod slug;
pub mod validate;

pub use slug::slugify;
pub use validate::{validate, ValidationReport};

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use kyper_api::AppParams;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Descriptor file name, looked up in the project root
pub const DESCRIPTOR_FILE_NAME: &str = "kyper.yml";

/// Errors loading a descriptor
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub dockerfile: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub min_memory_mb: u32,
    pub min_cpu: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub on_deploy: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub on_update: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthcheckConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Seconds between checks (0 = service default)
    pub interval: i64,
    /// Seconds before a check fails (0 = service default)
    pub timeout: i64,
}

/// A service dependency.
///
/// Accepted shapes: `postgres`, `redis:7`, and
/// `{postgres: "16", storage_gb: 50}` (a null value means unpinned).
/// Serializes back to the simplest shape that carries every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepEntry {
    pub name: String,
    pub version: Option<String>,
    pub storage_gb: Option<i64>,
}

impl DepEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            storage_gb: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_storage(mut self, gb: i64) -> Self {
        self.storage_gb = Some(gb);
        self
    }

    fn from_scalar(s: &str) -> Self {
        match s.split_once(':') {
            Some((name, version)) => Self::new(name).with_version(version),
            None => Self::new(s),
        }
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(Self::from_scalar(s)),
            Value::Mapping(map) => {
                let mut dep = Self::default();
                for (key, val) in map {
                    let key = scalar_text(key).ok_or("dep keys must be scalars")?;
                    if key == "storage_gb" {
                        let gb = val
                            .as_i64()
                            .ok_or_else(|| format!("invalid storage_gb: {:?}", val))?;
                        dep.storage_gb = Some(gb);
                    } else {
                        dep.name = key;
                        dep.version = scalar_text(val).filter(|v| !v.is_empty());
                    }
                }
                Ok(dep)
            }
            _ => Err("invalid dep entry format".to_string()),
        }
    }
}

/// Text of a YAML scalar; `None` for null and collections
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl fmt::Display for DepEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version)?,
            None => f.write_str(&self.name)?,
        }
        if let Some(gb) = self.storage_gb {
            write!(f, " ({} GB)", gb)?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for DepEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

impl Serialize for DepEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match (self.storage_gb, &self.version) {
            (Some(gb), version) => {
                // Empty string rather than null keeps the round-trip stable
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(&self.name, version.as_deref().unwrap_or(""))?;
                map.serialize_entry("storage_gb", &gb)?;
                map.end()
            }
            (None, Some(version)) => {
                serializer.serialize_str(&format!("{}:{}", self.name, version))
            }
            (None, None) => serializer.serialize_str(&self.name),
        }
    }
}

/// Parsed `kyper.yml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tagline: String,
    pub category: String,
    pub docker: DockerConfig,
    pub processes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<DepEntry>,
    pub pricing: PricingConfig,
    pub resources: ResourceConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    pub hooks: HooksConfig,
    pub healthcheck: HealthcheckConfig,
}

impl ProjectDescriptor {
    /// Parse descriptor text
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Read and parse a descriptor file; returns the parsed value and the raw
    /// text
    pub fn load(path: &Path) -> Result<(Self, String), DescriptorError> {
        let raw = fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let descriptor = Self::parse(&raw).map_err(|source| DescriptorError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok((descriptor, raw))
    }

    /// Read `kyper.yml` from a project root
    pub fn load_from_root(root: &Path) -> Result<(Self, String), DescriptorError> {
        Self::load(&root.join(DESCRIPTOR_FILE_NAME))
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// `processes: [web worker]` with names sorted; `None` without processes
    pub fn tech_stack(&self) -> Option<String> {
        if self.processes.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.processes.keys().map(String::as_str).collect();
        Some(format!("processes: [{}]", names.join(" ")))
    }

    /// Metadata for creating the app
    pub fn create_params(&self) -> AppParams {
        let mut params = self.update_params();
        params.title = Some(self.name.clone());
        params.tech_stack = self.tech_stack();
        params
    }

    /// Metadata for updating an existing app
    pub fn update_params(&self) -> AppParams {
        let mut params = AppParams::new(self.description.clone(), self.category.clone())
            .with_pricing(self.pricing.one_time, self.pricing.subscription);
        if !self.tagline.is_empty() {
            params.tagline = Some(self.tagline.clone());
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyper_api::PricingType;

    const SAMPLE: &str = r#"
name: My Cool App
version: 1.2.3
description: Does things
category: developer_tools
docker:
  dockerfile: Dockerfile
processes:
  worker: bundle exec sidekiq
  web: bundle exec puma
deps:
  - postgres
  - redis:7
  - {postgres: "16", storage_gb: 50}
pricing:
  one_time: 9.99
"#;

    #[test]
    fn test_parse_sample() {
        let desc = ProjectDescriptor::parse(SAMPLE).unwrap();

        assert_eq!(desc.name, "My Cool App");
        assert_eq!(desc.slug(), "my-cool-app");
        assert_eq!(desc.docker.dockerfile, "Dockerfile");
        assert_eq!(desc.processes.len(), 2);
        assert_eq!(desc.pricing.one_time, Some(9.99));
        assert!(desc.tagline.is_empty());
    }

    #[test]
    fn test_dep_shapes() {
        let desc = ProjectDescriptor::parse(SAMPLE).unwrap();

        assert_eq!(desc.deps[0], DepEntry::new("postgres"));
        assert_eq!(desc.deps[1], DepEntry::new("redis").with_version("7"));
        assert_eq!(
            desc.deps[2],
            DepEntry::new("postgres").with_version("16").with_storage(50)
        );
    }

    #[test]
    fn test_dep_mapping_null_and_numeric_version() {
        let deps: Vec<DepEntry> =
            serde_yaml::from_str("- {redis: 7}\n- {postgres: null, storage_gb: 10}\n").unwrap();

        assert_eq!(deps[0], DepEntry::new("redis").with_version("7"));
        assert_eq!(deps[1], DepEntry::new("postgres").with_storage(10));
    }

    #[test]
    fn test_dep_invalid_shape() {
        let result: Result<Vec<DepEntry>, _> = serde_yaml::from_str("- [postgres, 16]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_dep_encodes_simplest_shape() {
        let plain = serde_yaml::to_string(&DepEntry::new("postgres")).unwrap();
        assert_eq!(plain.trim(), "postgres");

        let pinned = serde_yaml::to_string(&DepEntry::new("redis").with_version("7")).unwrap();
        assert_eq!(pinned.trim(), "redis:7");

        let stored = DepEntry::new("postgres").with_storage(20);
        let text = serde_yaml::to_string(&stored).unwrap();
        let back: DepEntry = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn test_tech_stack_sorted() {
        let desc = ProjectDescriptor::parse(SAMPLE).unwrap();
        assert_eq!(desc.tech_stack().as_deref(), Some("processes: [web worker]"));
        assert!(ProjectDescriptor::default().tech_stack().is_none());
    }

    #[test]
    fn test_create_and_update_params() {
        let desc = ProjectDescriptor::parse(SAMPLE).unwrap();

        let create = desc.create_params();
        assert_eq!(create.title.as_deref(), Some("My Cool App"));
        assert_eq!(create.pricing_type, PricingType::OneTime);
        assert_eq!(create.one_time_price_cents, Some(999));
        assert!(create.tech_stack.is_some());

        let update = desc.update_params();
        assert!(update.title.is_none());
        assert!(update.tech_stack.is_none());
        assert_eq!(update.description, "Does things");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ProjectDescriptor::load_from_root(dir.path()).unwrap_err();
        assert!(matches!(err, DescriptorError::Read { .. }));
    }

    #[test]
    fn test_load_keeps_raw_text() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join(DESCRIPTOR_FILE_NAME), SAMPLE).unwrap();

        let (desc, raw) = ProjectDescriptor::load_from_root(dir.path()).unwrap();
        assert_eq!(raw, SAMPLE);
        assert_eq!(desc.version, "1.2.3");
    }
}
