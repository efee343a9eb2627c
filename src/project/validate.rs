//! Local descriptor validation
//!
//! Pure checks against fixed rule tables; no network. Errors block a push,
//! warnings are reported and ignored.

use std::path::Path;

use serde::Serialize;

use super::ProjectDescriptor;

pub const CATEGORIES: &[&str] = &[
    "developer_tools",
    "productivity",
    "finance",
    "health",
    "media",
    "education",
    "business_operations",
    "data_analytics",
    "gaming",
];

pub const KNOWN_DEPS: &[&str] = &["postgres", "mysql", "redis", "elasticsearch", "opensearch"];

/// Environment names the platform sets itself
pub const AUTO_INJECTED_ENV: &[&str] = &[
    "DATABASE_URL",
    "REDIS_URL",
    "SECRET_KEY_BASE",
    "PORT",
    "KYPER_DEPLOYMENT_ID",
    "ELASTICSEARCH_URL",
    "OPENSEARCH_URL",
];

const DB_DEPS: &[&str] = &["postgres", "mysql"];

pub fn allowed_dep_versions(name: &str) -> &'static [&'static str] {
    match name {
        "postgres" => &["14", "15", "16"],
        "mysql" => &["8"],
        "redis" => &["6", "7"],
        "elasticsearch" => &["8"],
        "opensearch" => &["2"],
        _ => &[],
    }
}

/// Exactly three dot-separated runs of ASCII digits
fn is_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Outcome of validating a descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn error(&mut self, msg: impl Into<String>) {
        self.valid = false;
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Check a descriptor against every rule.
///
/// With `root` set, `docker.dockerfile` is also checked on disk relative to
/// it.
pub fn validate(desc: &ProjectDescriptor, root: Option<&Path>) -> ValidationReport {
    let mut r = ValidationReport {
        valid: true,
        ..Default::default()
    };

    check_name(desc, &mut r);
    check_version(desc, &mut r);
    check_category(desc, &mut r);
    check_description(desc, &mut r);
    check_tagline(desc, &mut r);
    check_docker(desc, &mut r, root);
    check_processes(desc, &mut r);
    check_deps(desc, &mut r);
    check_healthcheck(desc, &mut r);
    check_pricing(desc, &mut r);
    check_env(desc, &mut r);
    check_db_without_hook(desc, &mut r);

    r
}

fn check_name(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    if desc.name.is_empty() {
        r.error("name is required");
        return;
    }
    if desc.name.chars().count() > 100 {
        r.error("name must be 100 characters or fewer");
    }
    if desc.slug().is_empty() {
        r.error("name must contain at least one letter or digit");
    }
}

fn check_version(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    if desc.version.is_empty() {
        r.error("version is required");
    } else if !is_semver(&desc.version) {
        r.error("version must be semver (MAJOR.MINOR.PATCH)");
    }
}

fn check_category(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    if desc.category.is_empty() {
        r.error("category is required");
    } else if !CATEGORIES.contains(&desc.category.as_str()) {
        r.error(format!("category must be one of: {}", CATEGORIES.join(", ")));
    }
}

fn check_description(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    if desc.description.is_empty() {
        r.error("description is required");
    } else if desc.description.chars().count() > 500 {
        r.error("description must be 500 characters or fewer");
    }
}

fn check_tagline(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    if desc.tagline.chars().count() > 160 {
        r.error("tagline must be 160 characters or fewer");
    }
}

fn check_docker(desc: &ProjectDescriptor, r: &mut ValidationReport, root: Option<&Path>) {
    if !desc.docker.image.is_empty() {
        r.error("docker.image is not supported; builds run from source using docker.dockerfile");
    }
    if desc.docker.dockerfile.is_empty() {
        r.error("docker.dockerfile is required");
        return;
    }
    if let Some(root) = root {
        if !root.join(&desc.docker.dockerfile).exists() {
            r.error(format!("docker.dockerfile {:?} not found", desc.docker.dockerfile));
        }
    }
}

fn check_processes(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    if desc.processes.is_empty() {
        r.error("processes is required");
    } else if !desc.processes.contains_key("web") {
        r.error("processes must include a 'web' entry");
    }
}

fn check_deps(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    for dep in &desc.deps {
        if dep.name.is_empty() {
            r.error("dep entry has empty name");
            continue;
        }
        if !KNOWN_DEPS.contains(&dep.name.as_str()) {
            r.error(format!(
                "unknown dep {:?}; known deps: {}",
                dep.name,
                KNOWN_DEPS.join(", ")
            ));
            continue;
        }

        if let Some(version) = &dep.version {
            let allowed = allowed_dep_versions(&dep.name);
            if !allowed.contains(&version.as_str()) {
                r.error(format!(
                    "dep {:?} version {:?} is not allowed; allowed: {}",
                    dep.name,
                    version,
                    allowed.join(", ")
                ));
            }
        }

        if let Some(gb) = dep.storage_gb {
            if gb != 0 && !(1..=500).contains(&gb) {
                r.error(format!("dep {:?} storage_gb must be between 1 and 500", dep.name));
            }
        }
    }
}

fn check_healthcheck(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    let hc = &desc.healthcheck;
    if !hc.path.is_empty() && !hc.path.starts_with('/') {
        r.error("healthcheck.path must start with /");
    }
    if hc.interval != 0 && !(10..=300).contains(&hc.interval) {
        r.error("healthcheck.interval must be between 10 and 300");
    }
    if hc.timeout != 0 && hc.timeout < 1 {
        r.error("healthcheck.timeout must be a positive integer");
    }
}

fn check_pricing(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    let pricing = &desc.pricing;
    if pricing.one_time.is_none() && pricing.subscription.is_none() {
        r.error("at least one pricing option is required (one_time or subscription)");
        return;
    }
    if pricing.one_time.is_some_and(|p| p < 1.0) {
        r.error("pricing.one_time must be at least $1.00");
    }
    if pricing.subscription.is_some_and(|p| p < 1.0) {
        r.error("pricing.subscription must be at least $1.00");
    }
}

fn check_env(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    for name in &desc.env {
        if name.is_empty() {
            r.error("env entries must be non-empty strings");
        }
        if AUTO_INJECTED_ENV.contains(&name.as_str()) {
            r.warning(format!(
                "env {:?} is auto-injected by the platform and cannot be overridden",
                name
            ));
        }
    }
}

fn check_db_without_hook(desc: &ProjectDescriptor, r: &mut ValidationReport) {
    let has_db = desc.deps.iter().any(|d| DB_DEPS.contains(&d.name.as_str()));
    if has_db && desc.hooks.on_deploy.is_empty() {
        r.warning("database dependency present without hooks.on_deploy; consider adding a migration hook");
    }
}
