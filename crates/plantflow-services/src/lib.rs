//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Service orchestration kernel: descriptors, ensembles and service managers."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
//! Services are deployed as artifacts onto resources. Each resource owns one
//! [`ServiceManager`] that tracks every service's [`ServiceState`]; services
//! that must stay co-located form ensembles resolved by [`ensemble`].

pub mod connector;
pub mod descriptor;
pub mod ensemble;
pub mod error;
pub mod fleet;
pub mod manager;
pub mod resolver;
pub mod runtime;
pub mod state;

pub use connector::{Direction, TypedDataConnector};
pub use descriptor::{ArtifactDescriptor, ServiceDescriptor};
pub use ensemble::InternalConnection;
pub use error::{ErrorKind, Result, ServiceError};
pub use fleet::{FleetMigrator, ResourceRegistry, LOCAL_RESOURCE};
pub use manager::{ServiceManager, ServiceManagerBuilder};
pub use resolver::{ArtifactResolver, ArtifactSpec, StaticArtifactResolver, YamlArtifactResolver};
pub use runtime::{
    Migratable, Reconfigurable, RuntimeCall, RuntimeOp, ServiceRuntime, SimulatedRuntime,
    StartOptions,
};
pub use state::{ServiceKind, ServiceState};
