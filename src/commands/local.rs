//! Commands that never touch the network

use std::io::Write;
use std::path::Path;

use serde_json::json;

use super::{print_json, CommandError, CommandResult};
use crate::project::{validate, ProjectDescriptor, ValidationReport};

/// Check `kyper.yml` against every local rule
pub fn validate_project(root: &Path, json: bool, out: &mut dyn Write) -> CommandResult<ValidationReport> {
    let (descriptor, _) = ProjectDescriptor::load_from_root(root)?;
    let report = validate(&descriptor, Some(root));

    if json {
        print_json(out, &report)?;
    } else {
        print_report(&report, out)?;
    }

    if report.valid {
        Ok(report)
    } else {
        Err(CommandError::ValidationFailed {
            errors: report.errors.len(),
            warnings: report.warnings.len(),
        })
    }
}

fn print_report(report: &ValidationReport, out: &mut dyn Write) -> CommandResult<()> {
    writeln!(out, "Validating kyper.yml")?;
    writeln!(out)?;

    if report.errors.is_empty() && report.warnings.is_empty() {
        writeln!(out, "All checks passed")?;
        return Ok(());
    }

    for error in &report.errors {
        writeln!(out, "  FAIL  {}", error)?;
    }
    for warning in &report.warnings {
        writeln!(out, "  WARN  {}", warning)?;
    }
    writeln!(out)?;

    if report.valid {
        writeln!(out, "Valid with {} warning(s)", report.warnings.len())?;
    }
    Ok(())
}

/// Print the client version
pub fn version(json: bool, out: &mut dyn Write) -> CommandResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        print_json(out, &json!({"version": version}))
    } else {
        writeln!(out, "kyper {}", version)?;
        Ok(())
    }
}
