//! Sample operations for the demo command.
//!
//! Each one stands in for a real daemon operation and exercises one outcome:
//! success with warnings, a domain failure, and an internal defect.

use std::time::Duration;

use anyhow::anyhow;
use deckhand_core::{OperationResult, Problem, ProblemSet, Severity};
use deckhand_tasks::{context, WorkOutcome};
use serde_json::{json, Value};

/// Validate a deployment's configuration.
pub fn validate_deployment(deployment: &str) -> WorkOutcome<Value> {
    context::new_stage("Validating providers");
    std::thread::sleep(Duration::from_millis(40));
    context::report_problem(
        Problem::builder(Severity::Warning, "No persistent storage configured")
            .remediation("Configure a storage backend before deploying")
            .build(),
    );

    context::new_stage("Validating versions");
    std::thread::sleep(Duration::from_millis(40));

    Ok(OperationResult::ok(json!({
        "deployment": deployment,
        "valid": true,
    })))
}

/// Deploy a configuration to a target.
pub fn deploy(deployment: &str, version: Option<&str>) -> WorkOutcome<Value> {
    context::new_stage("Planning deployment");
    std::thread::sleep(Duration::from_millis(30));

    let mut problems = ProblemSet::new();
    match version {
        Some(v) if !v.is_empty() => {}
        _ => problems.add(
            Problem::builder(Severity::Fatal, "No version was supplied for this deployment")
                .remediation("Set a version with `version edit`")
                .build(),
        ),
    }
    problems.ensure_below(Severity::Error)?;

    context::new_stage("Applying");
    std::thread::sleep(Duration::from_millis(30));
    Ok(OperationResult::ok(json!({
        "deployment": deployment,
        "version": version,
    })))
}

/// Render service profiles.
pub fn generate_profiles(service: &str) -> WorkOutcome<Value> {
    context::new_stage("Rendering profiles");
    std::thread::sleep(Duration::from_millis(20));
    Err(anyhow!("profile template for {} is not registered", service).into())
}
