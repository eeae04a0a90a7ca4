//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Service and artifact descriptors tracked by the service manager."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::collections::HashSet;

use indexmap::IndexMap;
use semver::Version;
use serde::Serialize;

use crate::connector::{Direction, TypedDataConnector};
use crate::error::{Result, ServiceError};
use crate::state::{ServiceKind, ServiceState};

/// One deployable service instance.
///
/// Descriptors are plain records: the lifecycle state is written only by the
/// owning [`ServiceManager`](crate::ServiceManager), which also enforces the
/// transition rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDescriptor {
    id: String,
    name: String,
    description: String,
    version: Version,
    kind: ServiceKind,
    deployable: bool,
    state: ServiceState,
    inputs: Vec<TypedDataConnector>,
    outputs: Vec<TypedDataConnector>,
    ensemble_leader: Option<String>,
    parameters: IndexMap<String, String>,
    cmd_args: Vec<String>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: Version::new(0, 0, 0),
            kind,
            deployable: true,
            state: ServiceState::Available,
            inputs: Vec::new(),
            outputs: Vec::new(),
            ensemble_leader: None,
            parameters: IndexMap::new(),
            cmd_args: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_deployable(mut self, deployable: bool) -> Self {
        self.deployable = deployable;
        self
    }

    /// Attach a connector; it lands in the input or output list by direction.
    pub fn with_connector(mut self, connector: TypedDataConnector) -> Self {
        match connector.direction() {
            Direction::Input => self.inputs.push(connector),
            Direction::Output => self.outputs.push(connector),
        }
        self
    }

    pub fn with_ensemble_leader(mut self, leader_id: impl Into<String>) -> Self {
        self.ensemble_leader = Some(leader_id.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), ty.into());
        self
    }

    pub fn with_cmd_args(mut self, args: Vec<String>) -> Self {
        self.cmd_args = args;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn is_deployable(&self) -> bool {
        self.deployable
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn input_connectors(&self) -> &[TypedDataConnector] {
        &self.inputs
    }

    pub fn output_connectors(&self) -> &[TypedDataConnector] {
        &self.outputs
    }

    /// Id of the ensemble leader, `None` when the service leads itself.
    pub fn ensemble_leader(&self) -> Option<&str> {
        self.ensemble_leader.as_deref()
    }

    pub fn parameters(&self) -> &IndexMap<String, String> {
        &self.parameters
    }

    pub fn cmd_args(&self) -> &[String] {
        &self.cmd_args
    }

    pub(crate) fn set_state(&mut self, state: ServiceState) {
        self.state = state;
    }

    pub(crate) fn set_ensemble_leader(&mut self, leader: Option<String>) {
        self.ensemble_leader = leader;
    }
}

/// Ensembles are one level deep: a leader is a member of the artifact and
/// has no leader of its own.
pub(crate) fn check_ensembles(artifact_id: &str, services: &[ServiceDescriptor]) -> Result<()> {
    for service in services {
        let Some(leader_id) = service.ensemble_leader() else {
            continue;
        };
        if leader_id == service.id() {
            continue;
        }
        let leader = services.iter().find(|s| s.id() == leader_id).ok_or_else(|| {
            ServiceError::invalid_argument(format!(
                "ensemble leader '{leader_id}' of service '{}' is not part of artifact '{artifact_id}'",
                service.id()
            ))
        })?;
        if let Some(upper) = leader.ensemble_leader().filter(|upper| *upper != leader_id) {
            return Err(ServiceError::invalid_argument(format!(
                "service '{}' follows '{leader_id}', which itself follows '{upper}'",
                service.id()
            )));
        }
    }
    Ok(())
}

/// Immutable bundle of services deployed as one unit.
///
/// Membership is fixed at construction; only member states change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactDescriptor {
    id: String,
    name: String,
    location: String,
    version: Version,
    services: Vec<ServiceDescriptor>,
}

impl ArtifactDescriptor {
    /// Build an artifact, rejecting empty identity, duplicate service ids and
    /// ensemble leaders that are not members of the same artifact or that
    /// follow another leader themselves.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        services: Vec<ServiceDescriptor>,
    ) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(ServiceError::invalid_argument("artifact id must not be empty"));
        }
        if name.trim().is_empty() {
            return Err(ServiceError::invalid_argument(format!(
                "artifact '{id}' must have a name"
            )));
        }
        let mut seen = HashSet::new();
        for service in &services {
            if service.id().trim().is_empty() {
                return Err(ServiceError::invalid_argument(format!(
                    "artifact '{id}' contains a service without id"
                )));
            }
            if !seen.insert(service.id()) {
                return Err(ServiceError::already_known(format!(
                    "service '{}' declared twice in artifact '{id}'",
                    service.id()
                )));
            }
        }
        check_ensembles(&id, &services)?;
        Ok(Self {
            id,
            location: name.clone(),
            name,
            version: Version::new(0, 0, 0),
            services,
        })
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference the artifact was resolved from.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Look up a member service; unknown ids yield `None`.
    pub fn service(&self, service_id: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.id() == service_id)
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.services.iter().map(|s| s.id())
    }

    pub fn contains_service(&self, service_id: &str) -> bool {
        self.service(service_id).is_some()
    }

    pub(crate) fn service_mut(&mut self, service_id: &str) -> Option<&mut ServiceDescriptor> {
        self.services.iter_mut().find(|s| s.id() == service_id)
    }

    /// Re-key the artifact under the id generated by the manager.
    pub(crate) fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(id, id, ServiceKind::Transform)
    }

    #[test]
    fn unknown_service_lookup_returns_none() {
        let artifact =
            ArtifactDescriptor::new("a1", "a1.yml", vec![service("s1"), service("s2")]).unwrap();
        assert!(artifact.service("s1").is_some());
        assert!(artifact.service("missing").is_none());
        assert_eq!(artifact.service_ids().collect::<Vec<_>>(), vec!["s1", "s2"]);
        assert_eq!(artifact.services()[0].state(), ServiceState::Available);
    }

    #[test]
    fn empty_identity_is_rejected() {
        let err = ArtifactDescriptor::new("", "name", Vec::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        let err = ArtifactDescriptor::new("a1", " ", Vec::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn leader_must_live_in_same_artifact() {
        let follower = service("s1").with_ensemble_leader("elsewhere");
        let err = ArtifactDescriptor::new("a1", "a1", vec![follower]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn duplicate_service_ids_are_rejected() {
        let err = ArtifactDescriptor::new("a1", "a1", vec![service("s1"), service("s1")])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlreadyKnown);
    }

    #[test]
    fn connectors_are_split_by_direction() {
        let svc = service("s1")
            .with_connector(TypedDataConnector::input("in", "i32"))
            .with_connector(TypedDataConnector::output("out", "i32"));
        assert_eq!(svc.input_connectors().len(), 1);
        assert_eq!(svc.output_connectors()[0].id(), "out");
    }

    #[test]
    fn nested_leaders_are_rejected() {
        let services = vec![
            service("A"),
            service("B").with_ensemble_leader("A"),
            service("C").with_ensemble_leader("B"),
        ];
        let err = ArtifactDescriptor::new("a1", "a1", services).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        assert!(err.message().contains("'C'"));

        let flat = vec![
            service("A").with_ensemble_leader("A"),
            service("B").with_ensemble_leader("A"),
            service("C").with_ensemble_leader("A"),
        ];
        assert!(ArtifactDescriptor::new("a1", "a1", flat).is_ok());
    }
}
