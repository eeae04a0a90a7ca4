//! ---
//! pf_section: "04-configuration-orchestration"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Deployment plan execution across resource service managers."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
//! Plans are executed assignment by assignment. Every assignment is attempted
//! even when an earlier one failed; the [`ExecutionReport`] records each
//! resource's outcome and nothing is rolled back.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use plantflow_common::AppConfig;
use plantflow_logging::{log_lifecycle_event, pf_error, pf_info, LifecycleOutcome, LogContext};
use plantflow_services::{
    ArtifactDescriptor, ErrorKind, ResourceRegistry, Result, ServiceError, ServiceManager,
    StartOptions,
};
use strum::Display;
use tracing::{debug, warn};

use crate::plan::{DeploymentPlan, ResourceAssignment};
use crate::validate::{validate_placement, validate_plan, ResolvedAssignment};

/// Default bound on a parallel plan run.
pub const DEFAULT_PARALLEL_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PlanAction {
    Deploy,
    Undeploy,
}

/// What happened on one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOutcome {
    /// Resource id with `.` already resolved.
    pub resource: String,
    /// Services in the order they were handled.
    pub services: Vec<String>,
    /// Artifact id on the resource, when one was registered or found.
    pub artifact: Option<String>,
    pub error: Option<ServiceError>,
}

impl ResourceOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of running a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub plan: String,
    pub action: PlanAction,
    /// Set for disabled plans, which are never executed.
    pub skipped: bool,
    pub resources: Vec<ResourceOutcome>,
}

impl ExecutionReport {
    fn skipped(plan: &DeploymentPlan, action: PlanAction) -> Self {
        Self {
            plan: plan.display_name().to_owned(),
            action,
            skipped: true,
            resources: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.resources.iter().all(ResourceOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceOutcome> + '_ {
        self.resources.iter().filter(|r| !r.is_success())
    }

    /// Fold every failure into one error carrying the first failure's kind.
    pub fn into_result(self) -> Result<Self> {
        let mut kind = None;
        let mut messages = Vec::new();
        for outcome in self.failures() {
            if let Some(err) = &outcome.error {
                kind.get_or_insert(err.kind());
                messages.push(format!("{}: {}", outcome.resource, err.message()));
            }
        }
        match kind {
            None => Ok(self),
            Some(kind) => Err(ServiceError::new(
                kind,
                format!(
                    "{} of plan '{}' failed on {} resource(s): {}",
                    self.action,
                    self.plan,
                    messages.len(),
                    messages.join("; ")
                ),
            )),
        }
    }
}

/// One assignment, owned so it can move onto a blocking worker.
#[derive(Debug, Clone)]
struct Unit {
    plan: String,
    assignment: ResourceAssignment,
    location: String,
    options: Arc<StartOptions>,
    remove_artifact: bool,
}

impl Unit {
    fn outcome(&self, resource: &str, services: Vec<String>) -> ResourceOutcome {
        ResourceOutcome {
            resource: resource.to_owned(),
            services,
            artifact: None,
            error: None,
        }
    }

    fn run(&self, registry: &ResourceRegistry, action: PlanAction) -> ResourceOutcome {
        let resource = registry
            .resolve_resource_id(&self.assignment.resource)
            .to_owned();
        let ctx = LogContext::new()
            .with_resource(&resource)
            .with_plan(&self.plan);
        let mut services = self.assignment.services.clone();
        if action == PlanAction::Undeploy {
            services.reverse();
        }
        let mut outcome = self.outcome(&resource, services);

        let result = registry.manager(&resource).and_then(|manager| match action {
            PlanAction::Deploy => self.deploy(&manager, &outcome.services),
            PlanAction::Undeploy => self.undeploy(&manager, &outcome.services),
        });
        match result {
            Ok(artifact) => {
                pf_info!(
                    context = ctx,
                    "{action} finished for {} service(s)",
                    outcome.services.len()
                );
                outcome.artifact = artifact;
            }
            Err(err) => {
                pf_error!(context = ctx, "{action} failed: {err}");
                outcome.error = Some(err);
            }
        }
        outcome
    }

    fn deploy(&self, manager: &ServiceManager, services: &[String]) -> Result<Option<String>> {
        let artifact_id = match manager.add_artifact(&self.location) {
            Ok(id) => id,
            Err(err) if err.kind() == ErrorKind::AlreadyKnown => {
                match manager.artifact_for_location(&self.location) {
                    Some(id) => {
                        debug!(artifact = %id, location = %self.location, "reusing registered artifact");
                        id
                    }
                    None => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };
        manager.start_service(services, &self.options)?;
        Ok(Some(artifact_id))
    }

    fn undeploy(&self, manager: &ServiceManager, services: &[String]) -> Result<Option<String>> {
        manager.stop_service(services)?;
        let artifact_id = manager.artifact_for_location(&self.location);
        if !self.remove_artifact {
            return Ok(artifact_id);
        }
        let Some(artifact_id) = artifact_id else {
            return Ok(None);
        };
        let still_active = manager
            .artifact(&artifact_id)
            .map(|artifact| artifact.services().iter().any(|s| s.state().is_active()))
            .unwrap_or(false);
        if still_active {
            debug!(artifact = %artifact_id, "artifact kept, services still active");
        } else {
            manager.remove_artifact(&artifact_id)?;
        }
        Ok(Some(artifact_id))
    }
}

/// Resolve every unit's artifact through its resource's resolver and check
/// that no ensemble is split across resources. Units whose manager or artifact
/// cannot be reached are left to fail when they run.
fn check_placement(
    registry: &ResourceRegistry,
    plan: &DeploymentPlan,
    units: &[Unit],
) -> Result<()> {
    let artifacts: Vec<Option<ArtifactDescriptor>> = units
        .iter()
        .map(|unit| {
            let manager = registry.manager(&unit.assignment.resource).ok()?;
            match manager.resolver().resolve(&unit.location) {
                Ok(artifact) => Some(artifact),
                Err(err) => {
                    debug!(location = %unit.location, error = %err, "placement check skipped");
                    None
                }
            }
        })
        .collect();
    let resolved: Vec<ResolvedAssignment<'_>> = units
        .iter()
        .zip(&artifacts)
        .map(|(unit, artifact)| ResolvedAssignment {
            resource: registry.resolve_resource_id(&unit.assignment.resource),
            assignment: &unit.assignment,
            artifact: artifact.as_ref(),
        })
        .collect();
    validate_placement(plan, &resolved)
}

/// Resolved resource and services of each unit, for reporting workers that
/// never returned.
fn pending(registry: &ResourceRegistry, units: &[Unit]) -> Vec<(String, Vec<String>)> {
    units
        .iter()
        .map(|unit| {
            (
                registry
                    .resolve_resource_id(&unit.assignment.resource)
                    .to_owned(),
                unit.assignment.services.clone(),
            )
        })
        .collect()
}

fn unfinished(resource: String, services: Vec<String>, message: String) -> ResourceOutcome {
    ResourceOutcome {
        resource,
        services,
        artifact: None,
        error: Some(ServiceError::remote(message)),
    }
}

/// Runs deployment plans against the managers of a [`ResourceRegistry`].
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    registry: Arc<ResourceRegistry>,
    artifacts_uri_prefix: Option<String>,
    parallel_timeout: Duration,
    remove_artifacts_on_undeploy: bool,
}

impl PlanExecutor {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            artifacts_uri_prefix: None,
            parallel_timeout: DEFAULT_PARALLEL_TIMEOUT,
            remove_artifacts_on_undeploy: true,
        }
    }

    pub fn from_config(registry: Arc<ResourceRegistry>, config: &AppConfig) -> Self {
        Self {
            registry,
            artifacts_uri_prefix: config.artifacts_uri_prefix.clone(),
            parallel_timeout: config.execution.parallel_timeout,
            remove_artifacts_on_undeploy: config.execution.remove_artifacts_on_undeploy,
        }
    }

    pub fn with_artifacts_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.artifacts_uri_prefix = Some(prefix.into());
        self
    }

    pub fn with_parallel_timeout(mut self, timeout: Duration) -> Self {
        self.parallel_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Add the plan's artifact on every assigned resource and start the
    /// listed services in order.
    pub async fn deploy(&self, plan: &DeploymentPlan) -> Result<ExecutionReport> {
        self.execute(plan, PlanAction::Deploy).await
    }

    /// Stop the plan's services in reverse order and drop artifacts that no
    /// longer have active services.
    pub async fn undeploy(&self, plan: &DeploymentPlan) -> Result<ExecutionReport> {
        self.execute(plan, PlanAction::Undeploy).await
    }

    async fn execute(&self, plan: &DeploymentPlan, action: PlanAction) -> Result<ExecutionReport> {
        let name = plan.display_name().to_owned();
        let ctx = LogContext::new()
            .with_resource(self.registry.local_resource_id())
            .with_plan(&name);
        if plan.is_disabled() {
            log_lifecycle_event(
                Some(&ctx),
                "plan.skipped",
                "plan is disabled",
                LifecycleOutcome::Success,
            );
            return Ok(ExecutionReport::skipped(plan, action));
        }
        if let Err(err) = validate_plan(plan) {
            log_lifecycle_event(Some(&ctx), "plan.validate", err.message(), LifecycleOutcome::Fault);
            return Err(err);
        }

        let mut units = self.units(plan);
        if action == PlanAction::Deploy {
            let registry = self.registry.clone();
            let owned = plan.clone();
            let checked = units.clone();
            let placement =
                tokio::task::spawn_blocking(move || check_placement(&registry, &owned, &checked))
                    .await
                    .map_err(|err| ServiceError::remote(format!("placement check failed: {err}")))
                    .and_then(|checked| checked);
            if let Err(err) = placement {
                log_lifecycle_event(Some(&ctx), "plan.validate", err.message(), LifecycleOutcome::Fault);
                return Err(err);
            }
        }
        if action == PlanAction::Undeploy {
            units.reverse();
        }
        let resources = if plan.is_parallelize() {
            self.run_parallel(units, action).await
        } else {
            self.run_sequential(units, action).await
        };

        let report = ExecutionReport {
            plan: name.clone(),
            action,
            skipped: false,
            resources,
        };
        let event = format!("plan.{action}");
        if report.is_success() {
            log_lifecycle_event(Some(&ctx), &event, "plan executed", LifecycleOutcome::Success);
        } else {
            let failed = report.failures().count();
            log_lifecycle_event(
                Some(&ctx),
                &event,
                &format!("{failed} resource(s) failed"),
                LifecycleOutcome::Fault,
            );
        }
        Ok(report)
    }

    fn units(&self, plan: &DeploymentPlan) -> Vec<Unit> {
        let options = Arc::new(plan.start_options());
        let remove_artifact = plan
            .on_undeploy_remove_artifact()
            .unwrap_or(self.remove_artifacts_on_undeploy);
        plan.assignments()
            .iter()
            .map(|assignment| Unit {
                plan: plan.display_name().to_owned(),
                assignment: assignment.clone(),
                location: plan.artifact_for(assignment, self.artifacts_uri_prefix.as_deref()),
                options: options.clone(),
                remove_artifact,
            })
            .collect()
    }

    /// Run the units one after another on a single blocking worker.
    async fn run_sequential(&self, units: Vec<Unit>, action: PlanAction) -> Vec<ResourceOutcome> {
        let pending = pending(&self.registry, &units);
        let registry = self.registry.clone();
        let worker = tokio::task::spawn_blocking(move || {
            units
                .iter()
                .map(|unit| unit.run(&registry, action))
                .collect::<Vec<_>>()
        });
        match worker.await {
            Ok(outcomes) => outcomes,
            Err(err) => pending
                .into_iter()
                .map(|(resource, services)| {
                    unfinished(resource, services, format!("worker failed: {err}"))
                })
                .collect(),
        }
    }

    async fn run_parallel(&self, units: Vec<Unit>, action: PlanAction) -> Vec<ResourceOutcome> {
        let pending = pending(&self.registry, &units);
        let tasks = units.into_iter().map(|unit| {
            let registry = self.registry.clone();
            tokio::task::spawn_blocking(move || unit.run(&registry, action))
        });

        match tokio::time::timeout(self.parallel_timeout, join_all(tasks)).await {
            Ok(joined) => joined
                .into_iter()
                .zip(pending)
                .map(|(joined, (resource, services))| match joined {
                    Ok(outcome) => outcome,
                    Err(err) => unfinished(resource, services, format!("worker failed: {err}")),
                })
                .collect(),
            Err(_) => {
                warn!(timeout = ?self.parallel_timeout, "parallel plan execution timed out");
                pending
                    .into_iter()
                    .map(|(resource, services)| {
                        unfinished(
                            resource,
                            services,
                            format!("no result within {:?}", self.parallel_timeout),
                        )
                    })
                    .collect()
            }
        }
    }
}
