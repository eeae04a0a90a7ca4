//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Per-resource service manager owning artifact and service state."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
//! The [`ServiceManager`] is the only component that mutates service state on
//! its resource.
//!
//! Two locks are involved. The registry lock guards the artifact maps and is
//! only held while maps are read or written. The command lock serialises
//! mutating calls end to end, including the runtime call, so readers never
//! wait for a slow runtime.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock};
use plantflow_logging::{log_lifecycle_event, LifecycleOutcome, LogContext};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::descriptor::{check_ensembles, ArtifactDescriptor, ServiceDescriptor};
use crate::error::{Result, ServiceError};
use crate::resolver::{ArtifactResolver, YamlArtifactResolver};
use crate::runtime::{Migratable, Reconfigurable, ServiceRuntime, SimulatedRuntime, StartOptions};
use crate::state::ServiceState;

#[derive(Debug, Default)]
struct Registry {
    artifacts: IndexMap<String, ArtifactDescriptor>,
    /// Service id to owning artifact id.
    services: HashMap<String, String>,
    /// Location to artifact id.
    locations: HashMap<String, String>,
}

impl Registry {
    fn lookup(&self, service_id: &str) -> Result<(&ArtifactDescriptor, &ServiceDescriptor)> {
        let artifact = self
            .services
            .get(service_id)
            .and_then(|artifact_id| self.artifacts.get(artifact_id))
            .ok_or_else(|| unknown_service(service_id))?;
        let service = artifact
            .service(service_id)
            .ok_or_else(|| unknown_service(service_id))?;
        Ok((artifact, service))
    }

    fn set_state(&mut self, service_id: &str, state: ServiceState) {
        let Some(artifact_id) = self.services.get(service_id) else {
            return;
        };
        if let Some(service) = self
            .artifacts
            .get_mut(artifact_id)
            .and_then(|artifact| artifact.service_mut(service_id))
        {
            service.set_state(state);
        }
    }
}

fn unknown_service(service_id: &str) -> ServiceError {
    ServiceError::unknown_entity(format!("service '{service_id}' is not registered"))
}

/// Builder for [`ServiceManager`].
pub struct ServiceManagerBuilder {
    resource_id: String,
    resolver: Arc<dyn ArtifactResolver>,
    runtime: Arc<dyn ServiceRuntime>,
    reconfigurable: Option<Arc<dyn Reconfigurable>>,
    migratable: Option<Arc<dyn Migratable>>,
}

impl ServiceManagerBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn ArtifactResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn ServiceRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn reconfigurable(mut self, reconfigurable: Arc<dyn Reconfigurable>) -> Self {
        self.reconfigurable = Some(reconfigurable);
        self
    }

    pub fn migratable(mut self, migratable: Arc<dyn Migratable>) -> Self {
        self.migratable = Some(migratable);
        self
    }

    pub fn build(self) -> ServiceManager {
        ServiceManager {
            resource_id: self.resource_id,
            resolver: self.resolver,
            runtime: self.runtime,
            reconfigurable: self.reconfigurable,
            migratable: self.migratable,
            registry: RwLock::new(Registry::default()),
            command: Mutex::new(()),
        }
    }
}

/// Tracks the artifacts and services deployed on one resource.
pub struct ServiceManager {
    resource_id: String,
    resolver: Arc<dyn ArtifactResolver>,
    runtime: Arc<dyn ServiceRuntime>,
    reconfigurable: Option<Arc<dyn Reconfigurable>>,
    migratable: Option<Arc<dyn Migratable>>,
    registry: RwLock<Registry>,
    command: Mutex<()>,
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("ServiceManager")
            .field("resource_id", &self.resource_id)
            .field("artifacts", &registry.artifacts.keys().collect::<Vec<_>>())
            .field("reconfigurable", &self.reconfigurable.is_some())
            .field("migratable", &self.migratable.is_some())
            .finish()
    }
}

impl ServiceManager {
    /// Start building a manager for `resource_id`.
    ///
    /// Defaults to a [`YamlArtifactResolver`] and a [`SimulatedRuntime`] with no
    /// reconfiguration or migration capability.
    pub fn builder(resource_id: impl Into<String>) -> ServiceManagerBuilder {
        ServiceManagerBuilder {
            resource_id: resource_id.into(),
            resolver: Arc::new(YamlArtifactResolver::new()),
            runtime: Arc::new(SimulatedRuntime::new()),
            reconfigurable: None,
            migratable: None,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn resolver(&self) -> &Arc<dyn ArtifactResolver> {
        &self.resolver
    }

    fn context<'a>(&'a self, artifact: &'a str, service: &'a str) -> LogContext<'a> {
        LogContext::new()
            .with_resource(&self.resource_id)
            .with_artifact(artifact)
            .with_service(service)
    }

    /// Resolve `location` and register its services as `AVAILABLE`.
    ///
    /// Returns the generated artifact id.
    pub fn add_artifact(&self, location: &str) -> Result<String> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ServiceError::invalid_argument(
                "artifact location must not be empty",
            ));
        }
        let _command = self.command.lock();
        if let Some(existing) = self.registry.read().locations.get(location) {
            return Err(ServiceError::already_known(format!(
                "location '{location}' is already registered as artifact '{existing}'"
            )));
        }

        let resolved = self.resolver.resolve(location).map_err(|err| {
            ServiceError::remote(format!(
                "cannot resolve artifact '{location}': {}",
                err.message()
            ))
        })?;
        let artifact_id = Uuid::new_v4().to_string();
        let mut artifact = resolved.with_id(artifact_id.clone()).with_location(location);
        let ids: Vec<String> = artifact.service_ids().map(str::to_owned).collect();
        for id in &ids {
            if let Some(service) = artifact.service_mut(id) {
                service.set_state(ServiceState::Available);
            }
        }

        let mut registry = self.registry.write();
        if let Some(clash) = ids.iter().find(|id| registry.services.contains_key(id.as_str())) {
            return Err(ServiceError::already_known(format!(
                "service '{clash}' of '{location}' is already registered on resource '{}'",
                self.resource_id
            )));
        }
        for id in ids {
            registry.services.insert(id, artifact_id.clone());
        }
        registry
            .locations
            .insert(location.to_owned(), artifact_id.clone());
        let service_count = artifact.services().len();
        registry.artifacts.insert(artifact_id.clone(), artifact);
        drop(registry);

        info!(
            resource = %self.resource_id,
            artifact = %artifact_id,
            location,
            services = service_count,
            "artifact added"
        );
        Ok(artifact_id)
    }

    /// Stop every still-active service of the artifact and forget it.
    pub fn remove_artifact(&self, artifact_id: &str) -> Result<()> {
        let _command = self.command.lock();
        let artifact = self
            .registry
            .read()
            .artifacts
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::unknown_entity(format!("artifact '{artifact_id}' is not registered"))
            })?;

        for service in artifact.services().iter().filter(|s| s.state().is_active()) {
            if let Err(err) = self.runtime.stop(service) {
                warn!(
                    resource = %self.resource_id,
                    artifact = artifact_id,
                    service = service.id(),
                    error = %err,
                    "stop failed while removing artifact"
                );
            }
        }

        let mut registry = self.registry.write();
        registry.artifacts.shift_remove(artifact_id);
        registry.services.retain(|_, owner| owner != artifact_id);
        registry.locations.retain(|_, owner| owner != artifact_id);
        drop(registry);

        info!(resource = %self.resource_id, artifact = artifact_id, "artifact removed");
        Ok(())
    }

    /// Start the services in list order.
    ///
    /// Every id is checked before anything is started and repeated ids are
    /// started once. A runtime failure stops the sequence; services started
    /// before it stay `RUNNING`.
    pub fn start_service(&self, service_ids: &[String], options: &StartOptions) -> Result<()> {
        let service_ids: Vec<String> = service_ids
            .iter()
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        let _command = self.command.lock();
        {
            let registry = self.registry.read();
            for id in &service_ids {
                let (_, service) = registry.lookup(id)?;
                if !service.state().can_start() {
                    return Err(ServiceError::invalid_transition(format!(
                        "cannot start service '{id}' in state {}",
                        service.state()
                    )));
                }
            }
        }
        self.apply_ensembles(&service_ids, options)?;

        for id in &service_ids {
            let (artifact, service) = {
                let registry = self.registry.read();
                let (artifact, service) = registry.lookup(id)?;
                (artifact.clone(), service.clone())
            };
            let ctx = self.context(artifact.id(), id);
            if let Err(err) = self.runtime.start(&artifact, &service, options) {
                log_lifecycle_event(Some(&ctx), "service.start", err.message(), LifecycleOutcome::Fault);
                return Err(err.context(format!("starting service '{id}'")));
            }
            self.registry.write().set_state(id, ServiceState::Running);
            log_lifecycle_event(Some(&ctx), "service.start", "service running", LifecycleOutcome::Success);
        }
        Ok(())
    }

    /// Rewire leaders as requested by `options`. All touched artifacts are
    /// checked before anything is written back.
    fn apply_ensembles(&self, service_ids: &[String], options: &StartOptions) -> Result<()> {
        if options.ensembles.is_empty() {
            return Ok(());
        }
        let mut registry = self.registry.write();
        let mut updated: IndexMap<String, ArtifactDescriptor> = IndexMap::new();
        for (follower, leader) in &options.ensembles {
            if !service_ids.contains(follower) {
                continue;
            }
            let Some(artifact_id) = registry.services.get(follower).cloned() else {
                continue;
            };
            if !updated.contains_key(&artifact_id) {
                let Some(current) = registry.artifacts.get(&artifact_id) else {
                    continue;
                };
                updated.insert(artifact_id.clone(), current.clone());
            }
            let Some(artifact) = updated.get_mut(&artifact_id) else {
                continue;
            };
            let leader = if leader.trim().is_empty() || leader == follower {
                None
            } else if artifact.contains_service(leader) {
                Some(leader.clone())
            } else {
                debug!(follower, leader, "ignoring ensemble leader outside the artifact");
                continue;
            };
            if let Some(service) = artifact.service_mut(follower) {
                service.set_ensemble_leader(leader);
            }
        }
        for (artifact_id, artifact) in &updated {
            check_ensembles(artifact_id, artifact.services())?;
        }
        for (artifact_id, artifact) in updated {
            registry.artifacts.insert(artifact_id, artifact);
        }
        Ok(())
    }

    /// Stop the services in list order. Stopping a `STOPPED` service is a no-op.
    pub fn stop_service(&self, service_ids: &[String]) -> Result<()> {
        let _command = self.command.lock();
        {
            let registry = self.registry.read();
            for id in service_ids {
                let (_, service) = registry.lookup(id)?;
                let state = service.state();
                if state != ServiceState::Stopped && !state.can_stop() {
                    return Err(ServiceError::invalid_transition(format!(
                        "cannot stop service '{id}' in state {state}"
                    )));
                }
            }
        }

        for id in service_ids {
            let (artifact_id, service) = {
                let registry = self.registry.read();
                let (artifact, service) = registry.lookup(id)?;
                (artifact.id().to_owned(), service.clone())
            };
            if service.state() == ServiceState::Stopped {
                continue;
            }
            let ctx = self.context(&artifact_id, id);
            if service.state().is_active() {
                if let Err(err) = self.runtime.stop(&service) {
                    log_lifecycle_event(Some(&ctx), "service.stop", err.message(), LifecycleOutcome::Fault);
                    return Err(err.context(format!("stopping service '{id}'")));
                }
            }
            self.registry.write().set_state(id, ServiceState::Stopped);
            log_lifecycle_event(Some(&ctx), "service.stop", "service stopped", LifecycleOutcome::Success);
        }
        Ok(())
    }

    /// `RUNNING` to `PASSIVATED`, passing through `PASSIVATING`.
    pub fn passivate(&self, service_id: &str) -> Result<()> {
        let _command = self.command.lock();
        let service = self.expect_state(service_id, ServiceState::Running, "passivate")?;
        self.registry
            .write()
            .set_state(service_id, ServiceState::Passivating);
        let mut transient = service;
        transient.set_state(ServiceState::Passivating);

        match self.runtime.passivate(&transient) {
            Ok(()) => {
                self.registry
                    .write()
                    .set_state(service_id, ServiceState::Passivated);
                debug!(resource = %self.resource_id, service = service_id, "service passivated");
                Ok(())
            }
            Err(err) => {
                self.registry
                    .write()
                    .set_state(service_id, ServiceState::Running);
                Err(err.context(format!("passivating service '{service_id}'")))
            }
        }
    }

    /// `PASSIVATED` back to `RUNNING`.
    pub fn activate(&self, service_id: &str) -> Result<()> {
        let _command = self.command.lock();
        let service = self.expect_state(service_id, ServiceState::Passivated, "activate")?;
        self.runtime
            .activate(&service)
            .map_err(|err| err.context(format!("activating service '{service_id}'")))?;
        self.registry
            .write()
            .set_state(service_id, ServiceState::Running);
        debug!(resource = %self.resource_id, service = service_id, "service activated");
        Ok(())
    }

    fn expect_state(
        &self,
        service_id: &str,
        expected: ServiceState,
        operation: &str,
    ) -> Result<ServiceDescriptor> {
        let registry = self.registry.read();
        let (_, service) = registry.lookup(service_id)?;
        if service.state() != expected {
            return Err(ServiceError::invalid_transition(format!(
                "cannot {operation} service '{service_id}' in state {}",
                service.state()
            )));
        }
        Ok(service.clone())
    }

    /// Apply option values. The service is `RECONFIGURING` for the duration of
    /// the call and returns to its previous state afterwards, even on failure.
    pub fn reconfigure(&self, service_id: &str, options: &IndexMap<String, String>) -> Result<()> {
        let _command = self.command.lock();
        let mut service = {
            let registry = self.registry.read();
            let (_, service) = registry.lookup(service_id)?;
            service.clone()
        };
        let original = service.state();
        self.registry
            .write()
            .set_state(service_id, ServiceState::Reconfiguring);
        service.set_state(ServiceState::Reconfiguring);

        let outcome = match &self.reconfigurable {
            Some(reconfigurable) => reconfigurable.reconfigure(&service, options),
            None => Ok(()),
        };
        self.registry.write().set_state(service_id, original);
        debug!(
            resource = %self.resource_id,
            service = service_id,
            options = options.len(),
            ok = outcome.is_ok(),
            "service reconfigured"
        );
        outcome.map_err(|err| err.context(format!("reconfiguring service '{service_id}'")))
    }

    /// Force a state without any runtime call or transition check.
    pub fn set_service_state(&self, service_id: &str, state: ServiceState) -> Result<()> {
        let _command = self.command.lock();
        let mut registry = self.registry.write();
        registry.lookup(service_id)?;
        registry.set_state(service_id, state);
        Ok(())
    }

    fn migratable(&self, operation: &str) -> Result<Arc<dyn Migratable>> {
        self.migratable.clone().ok_or_else(|| {
            ServiceError::unsupported(format!(
                "{operation} is not supported on resource '{}'",
                self.resource_id
            ))
        })
    }

    /// Move a service to another resource.
    pub fn migrate_service(&self, service_id: &str, resource_id: &str) -> Result<()> {
        self.migratable("migration")?
            .migrate_service(self, service_id, resource_id)
    }

    /// Replace a running service by another service of this resource.
    pub fn switch_to_service(&self, service_id: &str, target_id: &str) -> Result<()> {
        self.migratable("switching")?
            .switch_to_service(self, service_id, target_id)
    }

    /// Copy an artifact to a new location.
    pub fn clone_artifact(&self, artifact_id: &str, location: &str) -> Result<()> {
        self.migratable("cloning")?
            .clone_artifact(self, artifact_id, location)
    }

    /// Re-register an artifact from a new location, keeping running services running.
    pub fn update_service(&self, artifact_id: &str, location: &str) -> Result<()> {
        self.migratable("updating")?
            .update_service(self, artifact_id, location)
    }

    pub fn artifact(&self, artifact_id: &str) -> Option<ArtifactDescriptor> {
        self.registry.read().artifacts.get(artifact_id).cloned()
    }

    pub fn artifacts(&self) -> Vec<ArtifactDescriptor> {
        self.registry.read().artifacts.values().cloned().collect()
    }

    pub fn artifact_ids(&self) -> Vec<String> {
        self.registry.read().artifacts.keys().cloned().collect()
    }

    /// Id of the artifact registered from `location`, if any.
    pub fn artifact_for_location(&self, location: &str) -> Option<String> {
        self.registry.read().locations.get(location.trim()).cloned()
    }

    /// Id of the artifact containing `service_id`, if any.
    pub fn artifact_of_service(&self, service_id: &str) -> Option<String> {
        self.registry.read().services.get(service_id).cloned()
    }

    pub fn service(&self, service_id: &str) -> Option<ServiceDescriptor> {
        let registry = self.registry.read();
        registry.lookup(service_id).ok().map(|(_, s)| s.clone())
    }

    pub fn service_state(&self, service_id: &str) -> Option<ServiceState> {
        let registry = self.registry.read();
        registry.lookup(service_id).ok().map(|(_, s)| s.state())
    }

    /// All services in artifact registration order.
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.registry
            .read()
            .artifacts
            .values()
            .flat_map(|artifact| artifact.services().iter().cloned())
            .collect()
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.registry
            .read()
            .artifacts
            .values()
            .flat_map(|artifact| artifact.service_ids().map(str::to_owned))
            .collect()
    }
}
