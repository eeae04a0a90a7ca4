//! ---
//! pf_section: "04-configuration-orchestration"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Construction of per-resource service managers from configuration."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use plantflow_common::{AppConfig, ResourceConfig, RuntimeKind};
use plantflow_services::{
    ArtifactResolver, FleetMigrator, ResourceRegistry, ServiceManager, SimulatedRuntime,
    YamlArtifactResolver,
};
use tracing::info;

/// Managers for every configured resource plus handles on their runtimes.
#[derive(Debug, Clone)]
pub struct Fleet {
    pub registry: Arc<ResourceRegistry>,
    /// Simulated runtimes by resource id, for inspection by tools and tests.
    pub runtimes: IndexMap<String, Arc<SimulatedRuntime>>,
}

impl Fleet {
    /// Build one manager per `[resources]` entry. Every manager can migrate
    /// services to the others.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let registry = ResourceRegistry::new(config.resource.clone());
        let mut runtimes = IndexMap::new();
        for (resource_id, resource) in &config.resources {
            let runtime = match resource.runtime {
                RuntimeKind::Simulated => Arc::new(SimulatedRuntime::failing_starts(
                    resource.fail_services.iter().cloned(),
                )),
            };
            let manager = ServiceManager::builder(resource_id.clone())
                .resolver(resolver_for(resource))
                .runtime(runtime.clone())
                .reconfigurable(runtime.clone())
                .migratable(Arc::new(FleetMigrator::new(&registry)))
                .build();
            registry
                .register(Arc::new(manager))
                .with_context(|| format!("registering resource {resource_id}"))?;
            runtimes.insert(resource_id.clone(), runtime);
        }
        info!(
            local = %config.resource,
            resources = runtimes.len(),
            "service managers ready"
        );
        Ok(Self { registry, runtimes })
    }
}

fn resolver_for(resource: &ResourceConfig) -> Arc<dyn ArtifactResolver> {
    match &resource.artifact_dir {
        Some(dir) => Arc::new(YamlArtifactResolver::with_base_dir(dir)),
        None => Arc::new(YamlArtifactResolver::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_manager_per_resource() {
        let config: AppConfig = r#"
resource = "edge-1"
[resources.edge-1]
[resources.edge-2]
fail_services = ["AI"]
"#
        .parse()
        .unwrap();
        let fleet = Fleet::from_config(&config).unwrap();
        assert_eq!(fleet.registry.resource_ids(), vec!["edge-1", "edge-2"]);
        assert_eq!(fleet.registry.manager(".").unwrap().resource_id(), "edge-1");
        assert_eq!(fleet.runtimes.len(), 2);
    }
}
