//! ---
//! pf_section: "03-persistence-logging"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Structured logging context and lifecycle events."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Logging helpers shared by the orchestration crates.
//!
//! Every event carries the same four context fields so log processors can
//! filter by resource, artifact, service or plan without parsing messages.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline stderr subscriber for command line tools and tests.
///
/// Safe to call repeatedly; only the first call installs a subscriber.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured context attached to orchestration log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Resource whose service manager emitted the event.
    pub resource: Option<&'a str>,
    /// Artifact the event concerns.
    pub artifact: Option<&'a str>,
    /// Service the event concerns.
    pub service: Option<&'a str>,
    /// Deployment plan being executed.
    pub plan: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a resource identifier.
    pub fn with_resource(mut self, resource: &'a str) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Attach an artifact identifier.
    pub fn with_artifact(mut self, artifact: &'a str) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Attach a service identifier.
    pub fn with_service(mut self, service: &'a str) -> Self {
        self.service = Some(service);
        self
    }

    /// Attach a plan identifier.
    pub fn with_plan(mut self, plan: &'a str) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// Outcome of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The operation completed.
    Success,
    /// The operation failed or was rejected.
    Fault,
}

impl LifecycleOutcome {
    /// Lower-case name used as the `outcome` field value.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Success => "success",
            LifecycleOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event such as `service.start`.
///
/// Successes are logged at INFO, faults at ERROR.
pub fn log_lifecycle_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: LifecycleOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        LifecycleOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            resource = ctx.resource.unwrap_or(""),
            artifact = ctx.artifact.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            plan = ctx.plan.unwrap_or(""),
            message = %message
        ),
        LifecycleOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            resource = ctx.resource.unwrap_or(""),
            artifact = ctx.artifact.unwrap_or(""),
            service = ctx.service.unwrap_or(""),
            plan = ctx.plan.unwrap_or(""),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_resource("edge-1")
            .with_service("Transform");
        pf_info!(context = ctx, "service started");
        pf_debug!("debug message");
        pf_error!(context = ctx, "start failed: {}", "runtime refused");
    }

    #[test]
    fn lifecycle_helper_emits_both_outcomes() {
        init();
        let ctx = LogContext::new().with_plan("plan-a");
        log_lifecycle_event(
            Some(&ctx),
            "plan.deploy",
            "plan deployed",
            LifecycleOutcome::Success,
        );
        log_lifecycle_event(None, "plan.deploy", "plan failed", LifecycleOutcome::Fault);
    }

    #[test]
    fn outcome_names_are_lower_case() {
        assert_eq!(LifecycleOutcome::Success.as_str(), "success");
        assert_eq!(LifecycleOutcome::Fault.as_str(), "fault");
    }
}
