//! ---
//! pf_section: "04-configuration-orchestration"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Pre-flight validation of deployment plans."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::collections::HashMap;

use plantflow_services::{ArtifactDescriptor, Result, ServiceError};

use crate::plan::{DeploymentPlan, ResourceAssignment};

fn validate_assignments(plan: &DeploymentPlan, errors: &mut Vec<String>) {
    let mut owners: HashMap<&str, usize> = HashMap::new();
    for (index, assignment) in plan.assignments().iter().enumerate() {
        let context = format!("assignment #{}", index + 1);
        if assignment.resource.trim().is_empty() {
            errors.push(format!("{context}: resource id must not be empty"));
        }
        if plan.artifact().trim().is_empty()
            && assignment.artifact.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            errors.push(format!(
                "{context}: no artifact given for resource '{}'",
                assignment.resource
            ));
        }
        for service in &assignment.services {
            if service.trim().is_empty() {
                errors.push(format!("{context}: empty service id"));
                continue;
            }
            if let Some(first) = owners.insert(service.as_str(), index) {
                errors.push(format!(
                    "{context}: service '{service}' is already assigned in assignment #{}",
                    first + 1
                ));
            }
        }
    }
}

fn validate_ensembles(plan: &DeploymentPlan, errors: &mut Vec<String>) {
    for (follower, leader) in plan.ensembles() {
        if leader.trim().is_empty() {
            continue;
        }
        let together = plan
            .assignments()
            .iter()
            .any(|a| a.contains(follower) && a.contains(leader));
        if !together {
            errors.push(format!(
                "ensemble member '{follower}' and its leader '{leader}' are not assigned to the same resource"
            ));
        }
    }
}

/// Check a plan before any resource is touched.
///
/// Every problem is collected; the error lists all of them.
pub fn validate_plan(plan: &DeploymentPlan) -> Result<()> {
    let mut errors = Vec::new();
    if plan.assignments().is_empty() {
        errors.push("plan has no resource assignments".to_owned());
    }
    validate_assignments(plan, &mut errors);
    validate_ensembles(plan, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::plan_validation(format!(
            "plan '{}' is invalid: {}",
            plan.display_name(),
            errors.join("; ")
        )))
    }
}

/// One assignment with its resource id resolved and, when the document
/// could be read, the artifact it will deploy.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedAssignment<'a> {
    pub resource: &'a str,
    pub assignment: &'a ResourceAssignment,
    pub artifact: Option<&'a ArtifactDescriptor>,
}

/// Check that every follower is placed on the same resource as its leader.
///
/// The leader is taken from the plan's `ensembles` entry when there is one,
/// otherwise from the artifact. Leaders the plan does not assign anywhere are
/// not checked.
pub fn validate_placement(
    plan: &DeploymentPlan,
    resolved: &[ResolvedAssignment<'_>],
) -> Result<()> {
    let placed: HashMap<&str, &str> = resolved
        .iter()
        .flat_map(|r| r.assignment.services.iter().map(move |s| (s.as_str(), r.resource)))
        .collect();

    let mut errors = Vec::new();
    for entry in resolved {
        let Some(artifact) = entry.artifact else {
            continue;
        };
        for follower in &entry.assignment.services {
            let leader = match plan.ensembles().get(follower) {
                Some(leader) => Some(leader.as_str()).filter(|l| !l.trim().is_empty()),
                None => artifact.service(follower).and_then(|s| s.ensemble_leader()),
            };
            let Some(leader) = leader.filter(|l| *l != follower.as_str()) else {
                continue;
            };
            if let Some(elsewhere) = placed.get(leader).filter(|r| **r != entry.resource) {
                errors.push(format!(
                    "service '{follower}' on '{}' is separated from its ensemble leader '{leader}' on '{elsewhere}'",
                    entry.resource
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::plan_validation(format!(
            "plan '{}' splits ensembles: {}",
            plan.display_name(),
            errors.join("; ")
        )))
    }
}
