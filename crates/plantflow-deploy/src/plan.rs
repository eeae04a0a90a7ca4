//! ---
//! pf_section: "04-configuration-orchestration"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Deployment plan document model and loader."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use plantflow_services::{Result, ServiceError, StartOptions};
use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder in artifact references replaced by the configured URI prefix.
pub const ARTIFACTS_URI_PREFIX: &str = "${artifactsUriPrefix}";

/// Services of one artifact to run on one resource, in start order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceAssignment {
    pub resource: String,
    #[serde(default)]
    pub services: Vec<String>,
    /// Overrides the plan-level artifact for this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl ResourceAssignment {
    pub fn new<I, S>(resource: impl Into<String>, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: resource.into(),
            services: services.into_iter().map(Into::into).collect(),
            artifact: None,
        }
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.services.iter().any(|s| s == service_id)
    }
}

/// Declarative assignment of an artifact's services to resources.
///
/// `disabled` plans load normally but are never executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeploymentPlan {
    #[serde(default)]
    application: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    artifact: String,
    #[serde(default)]
    parallelize: bool,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    on_undeploy_remove_artifact: Option<bool>,
    #[serde(default)]
    assignments: Vec<ResourceAssignment>,
    /// Follower id to leader id; an empty leader marks a leaderless entry.
    #[serde(default, deserialize_with = "deserialize_ensembles")]
    ensembles: IndexMap<String, String>,
    #[serde(default)]
    arguments: Vec<String>,
    #[serde(default)]
    servers: IndexMap<String, String>,
    #[serde(default)]
    service_params: IndexMap<String, IndexMap<String, String>>,
}

fn deserialize_ensembles<'de, D>(deserializer: D) -> std::result::Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IndexMap<String, Option<String>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(follower, leader)| (follower, leader.unwrap_or_default()))
        .collect())
}

impl DeploymentPlan {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            application: None,
            id: None,
            app_id: None,
            version: None,
            description: None,
            artifact: artifact.into(),
            parallelize: false,
            disabled: false,
            on_undeploy_remove_artifact: None,
            assignments: Vec::new(),
            ensembles: IndexMap::new(),
            arguments: Vec::new(),
            servers: IndexMap::new(),
            service_params: IndexMap::new(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|err| ServiceError::invalid_argument(format!("malformed deployment plan: {err}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            ServiceError::remote(format!("cannot read plan {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&raw).map_err(|err| err.context(path.display()))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|err| ServiceError::invalid_argument(format!("cannot encode plan: {err}")))
    }

    pub fn with_assignment(mut self, assignment: ResourceAssignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    /// Declare `follower` part of `leader`'s ensemble; an empty leader records
    /// a leaderless entry.
    pub fn with_ensemble(mut self, follower: impl Into<String>, leader: impl Into<String>) -> Self {
        self.ensembles.insert(follower.into(), leader.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn set_parallelize(&mut self, parallelize: bool) {
        self.parallelize = parallelize;
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn set_on_undeploy_remove_artifact(&mut self, remove: bool) {
        self.on_undeploy_remove_artifact = Some(remove);
    }

    pub fn application(&self) -> Option<&str> {
        self.application.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Name used in logs: the plan id, else the application, else the artifact.
    pub fn display_name(&self) -> &str {
        self.id
            .as_deref()
            .or(self.application.as_deref())
            .unwrap_or(&self.artifact)
    }

    /// Raw artifact reference, placeholders untouched.
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Artifact reference for `assignment` with [`ARTIFACTS_URI_PREFIX`]
    /// replaced by `prefix` when one is configured.
    pub fn artifact_for(&self, assignment: &ResourceAssignment, prefix: Option<&str>) -> String {
        let raw = assignment.artifact.as_deref().unwrap_or(&self.artifact);
        substitute_prefix(raw, prefix)
    }

    pub fn is_parallelize(&self) -> bool {
        self.parallelize
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Explicit undeploy preference of the plan, if it states one.
    pub fn on_undeploy_remove_artifact(&self) -> Option<bool> {
        self.on_undeploy_remove_artifact
    }

    pub fn assignments(&self) -> &[ResourceAssignment] {
        &self.assignments
    }

    pub fn ensembles(&self) -> &IndexMap<String, String> {
        &self.ensembles
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn servers(&self) -> &IndexMap<String, String> {
        &self.servers
    }

    pub fn service_params(&self) -> &IndexMap<String, IndexMap<String, String>> {
        &self.service_params
    }

    /// Start options handed to every resource's manager.
    pub fn start_options(&self) -> StartOptions {
        StartOptions {
            ensembles: self.ensembles.clone(),
            arguments: self.arguments.clone(),
            servers: self.servers.clone(),
            service_params: self.service_params.clone(),
        }
    }
}

fn substitute_prefix(raw: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => raw.replace(ARTIFACTS_URI_PREFIX, prefix),
        None => raw.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
artifact: ${artifactsUriPrefix}/SimpleMesh.yml
assignments:
  - resource: a1234
    services: [Start, Transform]
  - resource: a1235
    services: [AI, End]
ensembles:
  AI:
  End: AI
"#;

    #[test]
    fn parses_two_assignments_and_ensembles() {
        let mut plan = DeploymentPlan::from_yaml_str(PLAN).unwrap();
        assert_eq!(plan.assignments().len(), 2);
        assert_eq!(plan.assignments()[0].resource, "a1234");
        assert_eq!(plan.assignments()[0].services, vec!["Start", "Transform"]);
        assert_eq!(plan.assignments()[1].services, vec!["AI", "End"]);
        assert_eq!(plan.ensembles().len(), 2);
        assert_eq!(plan.ensembles()["AI"], "");
        assert_eq!(plan.ensembles()["End"], "AI");
        assert!(!plan.is_parallelize());
        assert!(!plan.is_disabled());
        assert_eq!(plan.on_undeploy_remove_artifact(), None);

        plan.set_parallelize(true);
        assert!(plan.is_parallelize());
    }

    #[test]
    fn artifact_prefix_is_substituted() {
        let plan = DeploymentPlan::from_yaml_str(PLAN).unwrap();
        let first = &plan.assignments()[0];
        assert_eq!(
            plan.artifact_for(first, Some("file:///srv/artifacts")),
            "file:///srv/artifacts/SimpleMesh.yml"
        );
        assert_eq!(plan.artifact_for(first, None), plan.artifact());
        assert_eq!(plan.display_name(), plan.artifact());
    }

    #[test]
    fn optional_fields_use_camel_case() {
        let raw = r#"
id: plan-1
appId: app
artifact: app.yml
disabled: true
onUndeployRemoveArtifact: false
assignments:
  - resource: "."
    services: [s1]
    artifact: other.yml
servers:
  broker: 10.0.0.5
serviceParams:
  s1: { rate: "10" }
"#;
        let plan = DeploymentPlan::from_yaml_str(raw).unwrap();
        assert!(plan.is_disabled());
        assert_eq!(plan.on_undeploy_remove_artifact(), Some(false));
        assert_eq!(plan.app_id(), Some("app"));
        assert_eq!(plan.display_name(), "plan-1");
        assert_eq!(plan.artifact_for(&plan.assignments()[0], None), "other.yml");
        let options = plan.start_options();
        assert_eq!(options.servers["broker"], "10.0.0.5");
        assert_eq!(options.service_params["s1"]["rate"], "10");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = DeploymentPlan::from_yaml_str("artifact: a\nparallel: true\n").unwrap_err();
        assert_eq!(err.kind(), plantflow_services::ErrorKind::InvalidArgument);
    }

    #[test]
    fn serialised_plan_reads_back() {
        let plan = DeploymentPlan::new("app.yml")
            .with_id("p")
            .with_assignment(ResourceAssignment::new("edge-1", ["s1", "s2"]))
            .with_ensemble("s2", "s1");
        let yaml = plan.to_yaml_string().unwrap();
        assert_eq!(DeploymentPlan::from_yaml_str(&yaml).unwrap(), plan);
    }
}
