//! `hoist validate`

use hoist_state::{StateError, ValidationIssue, ValidationWarning};
use serde::Serialize;

use super::Context;
use crate::error::{CliError, CliResult};
use crate::output::{print_document, print_error, print_success, print_warning};

#[derive(Debug, Serialize)]
struct ValidationReport {
    valid: bool,
    issues: Vec<ValidationIssue>,
    warnings: Vec<ValidationWarning>,
}

pub async fn execute(ctx: &Context, strict: bool) -> CliResult<()> {
    let report = match ctx.load_store().await {
        Ok(store) => {
            let snapshot = store.snapshot();
            ValidationReport {
                valid: !(strict && !snapshot.warnings.is_empty()),
                issues: Vec::new(),
                warnings: snapshot.warnings.clone(),
            }
        }
        Err(CliError::State(StateError::Validation(e))) => ValidationReport {
            valid: false,
            issues: e.issues().to_vec(),
            warnings: Vec::new(),
        },
        // An input file that cannot be read fails validation like any other defect.
        Err(CliError::State(e @ StateError::Io { .. })) => {
            return Err(CliError::Validation(e.to_string()))
        }
        Err(e) => return Err(e),
    };

    if !print_document(&report, ctx.format)? {
        for issue in &report.issues {
            print_error(&issue.to_string());
        }
        for warning in &report.warnings {
            print_warning(&warning.to_string());
        }
        if report.valid {
            print_success(&format!(
                "{} is valid",
                ctx.topology_path().display()
            ));
        }
    }

    if !report.issues.is_empty() {
        return Err(CliError::Validation(format!(
            "{} issue(s) found",
            report.issues.len()
        )));
    }
    if !report.valid {
        return Err(CliError::Validation(format!(
            "{} warning(s) under --strict",
            report.warnings.len()
        )));
    }
    Ok(())
}
