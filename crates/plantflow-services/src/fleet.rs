//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Registry of service managers across resources and cross-resource migration."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::info;

use crate::descriptor::ArtifactDescriptor;
use crate::ensemble;
use crate::error::{ErrorKind, Result, ServiceError};
use crate::manager::ServiceManager;
use crate::resolver::ArtifactResolver;
use crate::runtime::{Migratable, StartOptions};
use crate::state::ServiceState;

/// Resource id standing for the local resource.
pub const LOCAL_RESOURCE: &str = ".";

/// Service managers of every known resource, keyed by resource id.
#[derive(Debug)]
pub struct ResourceRegistry {
    local: String,
    managers: RwLock<IndexMap<String, Arc<ServiceManager>>>,
}

impl ResourceRegistry {
    pub fn new(local_resource: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            local: local_resource.into(),
            managers: RwLock::new(IndexMap::new()),
        })
    }

    pub fn local_resource_id(&self) -> &str {
        &self.local
    }

    /// Map [`LOCAL_RESOURCE`] to the local resource id.
    pub fn resolve_resource_id<'a>(&'a self, resource_id: &'a str) -> &'a str {
        if resource_id.trim() == LOCAL_RESOURCE {
            &self.local
        } else {
            resource_id
        }
    }

    pub fn register(&self, manager: Arc<ServiceManager>) -> Result<()> {
        let mut managers = self.managers.write();
        let resource = manager.resource_id().to_owned();
        if managers.contains_key(&resource) {
            return Err(ServiceError::already_known(format!(
                "resource '{resource}' already has a service manager"
            )));
        }
        managers.insert(resource, manager);
        Ok(())
    }

    pub fn manager(&self, resource_id: &str) -> Result<Arc<ServiceManager>> {
        let resource_id = self.resolve_resource_id(resource_id);
        self.managers
            .read()
            .get(resource_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::unknown_entity(format!("resource '{resource_id}' is not known"))
            })
    }

    pub fn resource_ids(&self) -> Vec<String> {
        self.managers.read().keys().cloned().collect()
    }
}

/// [`Migratable`] implementation that moves services between the managers of
/// a [`ResourceRegistry`].
#[derive(Debug, Clone)]
pub struct FleetMigrator {
    registry: Weak<ResourceRegistry>,
}

impl FleetMigrator {
    pub fn new(registry: &Arc<ResourceRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }

    fn registry(&self) -> Result<Arc<ResourceRegistry>> {
        self.registry
            .upgrade()
            .ok_or_else(|| ServiceError::remote("resource registry is no longer available"))
    }
}

fn artifact_location(manager: &ServiceManager, artifact_id: &str) -> Result<String> {
    manager
        .artifact(artifact_id)
        .map(|artifact| artifact.location().to_owned())
        .ok_or_else(|| {
            ServiceError::unknown_entity(format!("artifact '{artifact_id}' is not registered"))
        })
}

/// Ensemble of `service_id`, leader first, followed by the members in
/// artifact order.
fn ensemble_members(artifact: &ArtifactDescriptor, service_id: &str) -> Result<Vec<String>> {
    let service = artifact.service(service_id).ok_or_else(|| {
        ServiceError::unknown_entity(format!("service '{service_id}' is not registered"))
    })?;
    let leader_id = ensemble::leader(service).to_owned();
    let mut members = vec![leader_id.clone()];
    members.extend(
        ensemble::ensemble(artifact, service)
            .into_iter()
            .map(|s| s.id().to_owned())
            .filter(|id| *id != leader_id),
    );
    Ok(members)
}

impl Migratable for FleetMigrator {
    /// Move the whole ensemble of `service_id` to `resource_id`.
    fn migrate_service(
        &self,
        manager: &ServiceManager,
        service_id: &str,
        resource_id: &str,
    ) -> Result<()> {
        let registry = self.registry()?;
        let target = registry.manager(resource_id)?;
        if target.resource_id() == manager.resource_id() {
            return Err(ServiceError::invalid_argument(format!(
                "service '{service_id}' already runs on resource '{resource_id}'"
            )));
        }
        let artifact_id = manager.artifact_of_service(service_id).ok_or_else(|| {
            ServiceError::unknown_entity(format!("service '{service_id}' is not registered"))
        })?;
        let artifact = manager.artifact(&artifact_id).ok_or_else(|| {
            ServiceError::unknown_entity(format!("artifact '{artifact_id}' is not registered"))
        })?;
        let location = artifact.location().to_owned();
        let members = ensemble_members(&artifact, service_id)?;

        let target_artifact = target.artifact_for_location(&location);
        for id in &members {
            let owner = target.artifact_of_service(id);
            if owner.is_some() && owner != target_artifact {
                return Err(ServiceError::already_known(format!(
                    "service '{id}' is registered with another artifact on resource '{resource_id}'"
                )));
            }
            if let Some(state) = target.service_state(id) {
                if !state.can_start() {
                    return Err(ServiceError::invalid_transition(format!(
                        "service '{id}' cannot be started on resource '{resource_id}' in state {state}"
                    )));
                }
            }
        }

        // Leaders rewired by earlier start options travel with the ensemble.
        let options = StartOptions {
            ensembles: members
                .iter()
                .filter_map(|id| artifact.service(id))
                .filter_map(|s| {
                    s.ensemble_leader()
                        .map(|leader| (s.id().to_owned(), leader.to_owned()))
                })
                .collect(),
            ..StartOptions::default()
        };

        manager.stop_service(&members)?;
        match target.add_artifact(&location) {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyKnown => {}
            Err(err) => return Err(err),
        }
        target.start_service(&members, &options)?;
        info!(
            service = service_id,
            members = members.len(),
            from = manager.resource_id(),
            to = target.resource_id(),
            "ensemble migrated"
        );
        Ok(())
    }

    fn switch_to_service(
        &self,
        manager: &ServiceManager,
        service_id: &str,
        target_id: &str,
    ) -> Result<()> {
        if manager.service(target_id).is_none() {
            return Err(ServiceError::unknown_entity(format!(
                "service '{target_id}' is not registered"
            )));
        }
        manager.stop_service(&[service_id.to_owned()])?;
        manager.start_service(&[target_id.to_owned()], &StartOptions::default())
    }

    fn clone_artifact(
        &self,
        manager: &ServiceManager,
        artifact_id: &str,
        location: &str,
    ) -> Result<()> {
        let source = artifact_location(manager, artifact_id)?;
        manager.resolver().export(&source, location)
    }

    fn update_service(
        &self,
        manager: &ServiceManager,
        artifact_id: &str,
        location: &str,
    ) -> Result<()> {
        let artifact = manager.artifact(artifact_id).ok_or_else(|| {
            ServiceError::unknown_entity(format!("artifact '{artifact_id}' is not registered"))
        })?;
        let running: Vec<String> = artifact
            .services()
            .iter()
            .filter(|s| s.state() == ServiceState::Running)
            .map(|s| s.id().to_owned())
            .collect();

        let replacement = manager.resolver().resolve(location).map_err(|err| {
            ServiceError::remote(format!(
                "cannot resolve artifact '{location}': {}",
                err.message()
            ))
        })?;
        if let Some(other) = manager
            .artifact_for_location(location)
            .filter(|other| other != artifact_id)
        {
            return Err(ServiceError::already_known(format!(
                "location '{location}' is already registered as artifact '{other}'"
            )));
        }
        for id in replacement.service_ids() {
            if let Some(owner) = manager
                .artifact_of_service(id)
                .filter(|owner| owner != artifact_id)
            {
                return Err(ServiceError::already_known(format!(
                    "service '{id}' of '{location}' is registered with artifact '{owner}'"
                )));
            }
        }

        manager.remove_artifact(artifact_id)?;
        let updated_id = manager.add_artifact(location)?;
        let restart: Vec<String> = match manager.artifact(&updated_id) {
            Some(updated) => running
                .into_iter()
                .filter(|id| updated.contains_service(id))
                .collect(),
            None => Vec::new(),
        };
        if !restart.is_empty() {
            manager.start_service(&restart, &StartOptions::default())?;
        }
        info!(
            resource = manager.resource_id(),
            old = artifact_id,
            new = %updated_id,
            restarted = restart.len(),
            "artifact updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ArtifactDescriptor, ServiceDescriptor};
    use crate::resolver::StaticArtifactResolver;
    use crate::state::ServiceKind;

    fn artifact(services: &[&str]) -> ArtifactDescriptor {
        let services = services
            .iter()
            .map(|id| ServiceDescriptor::new(*id, *id, ServiceKind::Transform))
            .collect();
        ArtifactDescriptor::new("app", "App", services).unwrap()
    }

    fn mesh() -> ArtifactDescriptor {
        let ai = ServiceDescriptor::new("AI", "AI", ServiceKind::Transform);
        let end = ServiceDescriptor::new("End", "End", ServiceKind::Sink).with_ensemble_leader("AI");
        ArtifactDescriptor::new("mesh", "Mesh", vec![ai, end]).unwrap()
    }

    fn fleet() -> (Arc<ResourceRegistry>, Arc<StaticArtifactResolver>) {
        let resolver = Arc::new(
            StaticArtifactResolver::new()
                .with_artifact("app.yml", artifact(&["s1", "s2"]))
                .with_artifact("app-v2.yml", artifact(&["s1", "s3"]))
                .with_artifact("mesh.yml", mesh()),
        );
        let registry = ResourceRegistry::new("edge-1");
        for resource in ["edge-1", "edge-2"] {
            let manager = ServiceManager::builder(resource)
                .resolver(resolver.clone())
                .migratable(Arc::new(FleetMigrator::new(&registry)))
                .build();
            registry.register(Arc::new(manager)).unwrap();
        }
        (registry, resolver)
    }

    #[test]
    fn local_alias_and_unknown_resources() {
        let (registry, _) = fleet();
        assert_eq!(registry.manager(".").unwrap().resource_id(), "edge-1");
        assert_eq!(registry.resource_ids(), vec!["edge-1", "edge-2"]);
        let err = registry.manager("cloud").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownEntity);
        let duplicate = ServiceManager::builder("edge-2").build();
        let err = registry.register(Arc::new(duplicate)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyKnown);
    }

    #[test]
    fn migrate_moves_service_between_resources() {
        let (registry, _) = fleet();
        let edge1 = registry.manager("edge-1").unwrap();
        let edge2 = registry.manager("edge-2").unwrap();
        edge1.add_artifact("app.yml").unwrap();
        edge1
            .start_service(&["s1".to_owned()], &StartOptions::default())
            .unwrap();

        edge1.migrate_service("s1", "edge-2").unwrap();
        assert_eq!(edge1.service_state("s1"), Some(ServiceState::Stopped));
        assert_eq!(edge2.service_state("s1"), Some(ServiceState::Running));
        assert!(edge2.artifact_for_location("app.yml").is_some());

        let err = edge1.migrate_service("s1", ".").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn switch_update_and_clone() {
        let (registry, resolver) = fleet();
        let edge1 = registry.manager(".").unwrap();
        let id = edge1.add_artifact("app.yml").unwrap();
        edge1
            .start_service(&["s1".to_owned()], &StartOptions::default())
            .unwrap();

        edge1.switch_to_service("s1", "s2").unwrap();
        assert_eq!(edge1.service_state("s1"), Some(ServiceState::Stopped));
        assert_eq!(edge1.service_state("s2"), Some(ServiceState::Running));

        edge1.update_service(&id, "app-v2.yml").unwrap();
        assert!(edge1.artifact(&id).is_none());
        assert_eq!(edge1.service_state("s1"), Some(ServiceState::Available));
        assert_eq!(edge1.service_state("s3"), Some(ServiceState::Available));
        assert!(edge1.service("s2").is_none());

        let updated = edge1.artifact_for_location("app-v2.yml").unwrap();
        edge1.clone_artifact(&updated, "app-copy.yml").unwrap();
        assert!(resolver.resolve("app-copy.yml").is_ok());
    }

    #[test]
    fn migrating_a_leader_moves_its_followers() {
        let (registry, _) = fleet();
        let edge1 = registry.manager("edge-1").unwrap();
        let edge2 = registry.manager("edge-2").unwrap();
        edge1.add_artifact("mesh.yml").unwrap();
        let ids = vec!["AI".to_owned(), "End".to_owned()];
        edge1.start_service(&ids, &StartOptions::default()).unwrap();

        edge1.migrate_service("AI", "edge-2").unwrap();
        for id in ["AI", "End"] {
            assert_eq!(edge1.service_state(id), Some(ServiceState::Stopped));
            assert_eq!(edge2.service_state(id), Some(ServiceState::Running));
        }
        assert_eq!(
            edge2.service("End").unwrap().ensemble_leader(),
            Some("AI")
        );
    }

    #[test]
    fn migrating_a_follower_moves_its_leader_first() {
        let (registry, _) = fleet();
        let edge1 = registry.manager("edge-1").unwrap();
        let edge2 = registry.manager("edge-2").unwrap();
        edge1.add_artifact("mesh.yml").unwrap();
        let ids = vec!["AI".to_owned(), "End".to_owned()];
        edge1.start_service(&ids, &StartOptions::default()).unwrap();

        edge1.migrate_service("End", "edge-2").unwrap();
        assert_eq!(edge2.service_state("AI"), Some(ServiceState::Running));
        assert_eq!(edge2.service_state("End"), Some(ServiceState::Running));
        assert_eq!(edge1.service_state("AI"), Some(ServiceState::Stopped));
    }

    #[test]
    fn migration_is_refused_when_target_member_is_busy() {
        let (registry, _) = fleet();
        let edge1 = registry.manager("edge-1").unwrap();
        let edge2 = registry.manager("edge-2").unwrap();
        edge1.add_artifact("mesh.yml").unwrap();
        edge2.add_artifact("mesh.yml").unwrap();
        let ids = vec!["AI".to_owned(), "End".to_owned()];
        edge1.start_service(&ids, &StartOptions::default()).unwrap();
        edge2
            .start_service(&["End".to_owned()], &StartOptions::default())
            .unwrap();

        let err = edge1.migrate_service("AI", "edge-2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(edge1.service_state("AI"), Some(ServiceState::Running));
        assert_eq!(edge1.service_state("End"), Some(ServiceState::Running));
        assert_eq!(edge2.service_state("AI"), Some(ServiceState::Available));
    }

    #[test]
    fn failed_update_keeps_the_registered_artifact() {
        let (registry, _) = fleet();
        let edge1 = registry.manager(".").unwrap();
        let id = edge1.add_artifact("app.yml").unwrap();
        edge1
            .start_service(&["s1".to_owned()], &StartOptions::default())
            .unwrap();

        let err = edge1.update_service(&id, "missing.yml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert!(edge1.artifact(&id).is_some());
        assert_eq!(edge1.service_state("s1"), Some(ServiceState::Running));

        edge1.add_artifact("mesh.yml").unwrap();
        let err = edge1.update_service(&id, "mesh.yml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyKnown);
        assert!(edge1.artifact(&id).is_some());
    }
}
