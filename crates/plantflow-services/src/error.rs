//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Error model shared by the service manager and plan executor."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Broad classification of an orchestration failure.
///
/// Callers branch on the kind rather than on the error's message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// Empty or malformed location, id or option.
    InvalidArgument,
    /// Artifact, service or resource id is not registered.
    UnknownEntity,
    /// Operation is not permitted from the service's current state.
    InvalidStateTransition,
    /// No capability is installed for a resource-transfer operation.
    Unsupported,
    /// I/O or resolution failure while adding or updating an artifact, or a
    /// runtime refusing a lifecycle call.
    RemoteFailure,
    /// Deployment plan rejected during pre-flight validation.
    PlanValidationFailure,
    /// Artifact location or service id is already registered.
    AlreadyKnown,
}

/// Outcome carried by every failing lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn unknown_entity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownEntity, message)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidStateTransition, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteFailure, message)
    }

    pub fn plan_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PlanValidationFailure, message)
    }

    pub fn already_known(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyKnown, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message with additional context, keeping the kind.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{}: {}", context, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = ServiceError::unknown_entity("service 'x' is not registered");
        assert_eq!(
            err.to_string(),
            "unknown_entity: service 'x' is not registered"
        );
        assert_eq!(err.kind(), ErrorKind::UnknownEntity);
    }

    #[test]
    fn context_keeps_kind() {
        let err = ServiceError::remote("connection refused").context("resource edge-1");
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert_eq!(err.message(), "resource edge-1: connection refused");
    }

    #[test]
    fn kinds_parse_from_snake_case() {
        let kind: ErrorKind = "plan_validation_failure".parse().expect("known kind");
        assert_eq!(kind, ErrorKind::PlanValidationFailure);
    }
}
