//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Service lifecycle states and service classification."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a service instance on one resource.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ServiceState {
    /// Registered with its artifact, never started or cleanly reset.
    #[default]
    Available,
    Running,
    /// Transient while the runtime suspends the service.
    Passivating,
    Passivated,
    /// Transient while new option values are applied.
    Reconfiguring,
    Stopped,
}

impl ServiceState {
    /// Transient states only exist for the duration of one manager call.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceState::Passivating | ServiceState::Reconfiguring)
    }

    /// Whether the service currently holds runtime resources.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ServiceState::Running
                | ServiceState::Passivating
                | ServiceState::Passivated
                | ServiceState::Reconfiguring
        )
    }

    pub fn can_start(&self) -> bool {
        matches!(self, ServiceState::Available | ServiceState::Stopped)
    }

    pub fn can_stop(&self) -> bool {
        matches!(
            self,
            ServiceState::Running | ServiceState::Passivated | ServiceState::Available
        )
    }
}

/// Pipeline role of a service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ServiceKind {
    Source,
    #[default]
    Transform,
    Probe,
    Sink,
    /// Long-running helper server started alongside pipeline services.
    Server,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop_guards_follow_transition_table() {
        assert!(ServiceState::Available.can_start());
        assert!(ServiceState::Stopped.can_start());
        assert!(!ServiceState::Running.can_start());
        assert!(!ServiceState::Passivated.can_start());

        assert!(ServiceState::Running.can_stop());
        assert!(ServiceState::Passivated.can_stop());
        assert!(ServiceState::Available.can_stop());
        assert!(!ServiceState::Passivating.can_stop());
    }

    #[test]
    fn state_names_round_trip_through_strings() {
        assert_eq!(ServiceState::Passivated.to_string(), "PASSIVATED");
        let parsed: ServiceState = "running".parse().expect("case-insensitive");
        assert_eq!(parsed, ServiceState::Running);
        let kind: ServiceKind = "SINK".parse().expect("case-insensitive");
        assert_eq!(kind, ServiceKind::Sink);
    }
}
