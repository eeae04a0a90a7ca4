//! ---
//! pf_section: "04-configuration-orchestration"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Deployment plans: model, validation and execution."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
//! Deployment plans assign an artifact's services to resources. This crate
//! loads them, validates them before anything is touched, and runs them
//! against the service managers of a fleet.

pub mod executor;
pub mod fleet;
pub mod plan;
pub mod validate;

pub use executor::{ExecutionReport, PlanAction, PlanExecutor, ResourceOutcome};
pub use fleet::Fleet;
pub use plan::{DeploymentPlan, ResourceAssignment, ARTIFACTS_URI_PREFIX};
pub use validate::{validate_placement, validate_plan, ResolvedAssignment};
