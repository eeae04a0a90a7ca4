//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Capability traits plugged into a service manager."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::collections::HashSet;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::descriptor::{ArtifactDescriptor, ServiceDescriptor};
use crate::error::{Result, ServiceError};
use crate::manager::ServiceManager;
use crate::state::ServiceState;

/// Options accompanying a start request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartOptions {
    /// Follower id to leader id; an empty leader clears the follower's leader.
    pub ensembles: IndexMap<String, String>,
    /// Extra command line arguments handed to the runtime.
    pub arguments: Vec<String>,
    /// Server id to network address, for services that talk to helper servers.
    pub servers: IndexMap<String, String>,
    /// Per-service parameter values, keyed by service id.
    pub service_params: IndexMap<String, IndexMap<String, String>>,
}

impl StartOptions {
    pub fn is_empty(&self) -> bool {
        self.ensembles.is_empty()
            && self.arguments.is_empty()
            && self.servers.is_empty()
            && self.service_params.is_empty()
    }
}

/// Executes lifecycle commands for the services of one resource.
///
/// Implementations only perform the work; the manager owns the tracked state
/// and decides whether a call is allowed at all.
pub trait ServiceRuntime: Send + Sync {
    fn start(
        &self,
        artifact: &ArtifactDescriptor,
        service: &ServiceDescriptor,
        options: &StartOptions,
    ) -> Result<()>;

    fn stop(&self, service: &ServiceDescriptor) -> Result<()>;

    /// Called with the service in `PASSIVATING`.
    fn passivate(&self, service: &ServiceDescriptor) -> Result<()>;

    fn activate(&self, service: &ServiceDescriptor) -> Result<()>;
}

/// Applies option values to a running service.
pub trait Reconfigurable: Send + Sync {
    /// Called with the service in `RECONFIGURING`.
    fn reconfigure(
        &self,
        service: &ServiceDescriptor,
        options: &IndexMap<String, String>,
    ) -> Result<()>;
}

/// Resource-transfer operations. Every method is unsupported unless overridden.
///
/// The manager passes itself in; implementations drive it through its public
/// lifecycle API and must not expect any manager lock to be held.
pub trait Migratable: Send + Sync {
    fn migrate_service(
        &self,
        manager: &ServiceManager,
        service_id: &str,
        resource_id: &str,
    ) -> Result<()> {
        let _ = (manager, resource_id);
        Err(ServiceError::unsupported(format!(
            "migrating service '{service_id}' is not supported"
        )))
    }

    fn switch_to_service(
        &self,
        manager: &ServiceManager,
        service_id: &str,
        target_id: &str,
    ) -> Result<()> {
        let _ = manager;
        Err(ServiceError::unsupported(format!(
            "switching '{service_id}' to '{target_id}' is not supported"
        )))
    }

    fn clone_artifact(
        &self,
        manager: &ServiceManager,
        artifact_id: &str,
        location: &str,
    ) -> Result<()> {
        let _ = (manager, location);
        Err(ServiceError::unsupported(format!(
            "cloning artifact '{artifact_id}' is not supported"
        )))
    }

    fn update_service(
        &self,
        manager: &ServiceManager,
        artifact_id: &str,
        location: &str,
    ) -> Result<()> {
        let _ = (manager, location);
        Err(ServiceError::unsupported(format!(
            "updating artifact '{artifact_id}' is not supported"
        )))
    }
}

/// Lifecycle operation names as recorded by [`SimulatedRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RuntimeOp {
    Start,
    Stop,
    Passivate,
    Activate,
    Reconfigure,
}

/// One call observed by [`SimulatedRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub op: RuntimeOp,
    pub service: String,
    /// Tracked state of the service when the call arrived.
    pub state: ServiceState,
}

/// In-process runtime that records every call and fails on request.
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    failures: Mutex<HashSet<(RuntimeOp, String)>>,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime whose `start` fails for each of the given services.
    pub fn failing_starts<I, S>(service_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let runtime = Self::new();
        for id in service_ids {
            runtime.fail_on(RuntimeOp::Start, id);
        }
        runtime
    }

    /// Make every future `op` call for `service_id` fail.
    pub fn fail_on(&self, op: RuntimeOp, service_id: impl Into<String>) {
        self.failures.lock().insert((op, service_id.into()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().clone()
    }

    /// Recorded calls of one kind, as service ids in call order.
    pub fn calls_of(&self, op: RuntimeOp) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.service.clone())
            .collect()
    }

    fn record(&self, op: RuntimeOp, service: &ServiceDescriptor) -> Result<()> {
        self.calls.lock().push(RuntimeCall {
            op,
            service: service.id().to_owned(),
            state: service.state(),
        });
        if self.failures.lock().contains(&(op, service.id().to_owned())) {
            return Err(ServiceError::remote(format!(
                "simulated {op} failure for service '{}'",
                service.id()
            )));
        }
        Ok(())
    }
}

impl ServiceRuntime for SimulatedRuntime {
    fn start(
        &self,
        _artifact: &ArtifactDescriptor,
        service: &ServiceDescriptor,
        _options: &StartOptions,
    ) -> Result<()> {
        self.record(RuntimeOp::Start, service)
    }

    fn stop(&self, service: &ServiceDescriptor) -> Result<()> {
        self.record(RuntimeOp::Stop, service)
    }

    fn passivate(&self, service: &ServiceDescriptor) -> Result<()> {
        self.record(RuntimeOp::Passivate, service)
    }

    fn activate(&self, service: &ServiceDescriptor) -> Result<()> {
        self.record(RuntimeOp::Activate, service)
    }
}

impl Reconfigurable for SimulatedRuntime {
    fn reconfigure(
        &self,
        service: &ServiceDescriptor,
        _options: &IndexMap<String, String>,
    ) -> Result<()> {
        self.record(RuntimeOp::Reconfigure, service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServiceKind;

    #[test]
    fn injected_failures_are_reported_after_recording() {
        let runtime = SimulatedRuntime::failing_starts(["s1"]);
        let artifact = ArtifactDescriptor::new("a", "a", Vec::new()).unwrap();
        let s1 = ServiceDescriptor::new("s1", "S1", ServiceKind::Source);
        let s2 = ServiceDescriptor::new("s2", "S2", ServiceKind::Sink);
        let options = StartOptions::default();

        let err = runtime.start(&artifact, &s1, &options).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::RemoteFailure);
        runtime.start(&artifact, &s2, &options).unwrap();
        assert_eq!(runtime.calls_of(RuntimeOp::Start), vec!["s1", "s2"]);

        runtime.clear_failures();
        runtime.start(&artifact, &s1, &options).unwrap();
    }

    #[test]
    fn start_options_parse_camel_case() {
        let yaml = "ensembles:\n  s2: s1\nserviceParams:\n  s1:\n    rate: \"5\"\n";
        let options: StartOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.ensembles.get("s2").map(String::as_str), Some("s1"));
        assert_eq!(options.service_params["s1"]["rate"], "5");
        assert!(!options.is_empty());
        assert!(StartOptions::default().is_empty());
    }
}
