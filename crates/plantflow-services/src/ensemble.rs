//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Ensemble membership and internal connector resolution."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
//! Pure functions over an [`ArtifactDescriptor`]: ensembles never span
//! artifacts, so the artifact is the whole search space.

use std::collections::BTreeSet;

use indexmap::IndexSet;
use serde::Serialize;

use crate::connector::TypedDataConnector;
use crate::descriptor::{ArtifactDescriptor, ServiceDescriptor};

/// Resolved leader id of `service`: its declared leader, otherwise itself.
pub fn leader(service: &ServiceDescriptor) -> &str {
    service.ensemble_leader().unwrap_or(service.id())
}

/// All services sharing the leader of `service`, the leader included.
///
/// The result is in artifact order and always contains `service`.
pub fn ensemble<'a>(
    artifact: &'a ArtifactDescriptor,
    service: &ServiceDescriptor,
) -> Vec<&'a ServiceDescriptor> {
    let leader_id = leader(service);
    artifact
        .services()
        .iter()
        .filter(|s| s.id() == leader_id || leader(s) == leader_id)
        .collect()
}

/// Ids of [`ensemble`], for callers that only need identity.
pub fn ensemble_ids(artifact: &ArtifactDescriptor, service: &ServiceDescriptor) -> BTreeSet<String> {
    ensemble(artifact, service)
        .into_iter()
        .map(|s| s.id().to_owned())
        .collect()
}

/// Channel ids of the given connectors.
pub fn connector_names(connectors: &[TypedDataConnector]) -> BTreeSet<String> {
    connectors.iter().map(|c| c.id().to_owned()).collect()
}

/// Connector ids produced by one ensemble member and consumed by another (or
/// the same) member. These channels stay in-process.
pub fn ensemble_connector_names(
    artifact: &ArtifactDescriptor,
    service: &ServiceDescriptor,
) -> BTreeSet<String> {
    let members = ensemble(artifact, service);
    if members.len() <= 1 {
        return BTreeSet::new();
    }
    let mut outputs = BTreeSet::new();
    let mut inputs = BTreeSet::new();
    for member in &members {
        outputs.extend(connector_names(member.output_connectors()));
        inputs.extend(connector_names(member.input_connectors()));
    }
    outputs.intersection(&inputs).cloned().collect()
}

/// Ids from `ids` that must be started explicitly.
///
/// A follower whose leader is also requested is dropped; the leader brings it
/// up. Order of `ids` is preserved and unknown ids are kept so the caller can
/// report them.
pub fn top_level<'a>(artifact: &ArtifactDescriptor, ids: &'a [String]) -> Vec<&'a str> {
    let requested: IndexSet<&str> = ids.iter().map(String::as_str).collect();
    requested
        .iter()
        .copied()
        .filter(|id| match artifact.service(id) {
            Some(service) => match service.ensemble_leader() {
                Some(leader_id) => leader_id == *id || !requested.contains(leader_id),
                None => true,
            },
            None => true,
        })
        .collect()
}

/// A channel between two requested services of the same artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InternalConnection {
    /// Service producing on the channel.
    pub producer: String,
    /// Service consuming from the channel.
    pub consumer: String,
    /// Channel id shared by the output and input connector.
    pub connector: String,
}

/// Channels connecting the requested services to each other, sorted.
pub fn internal_connections(
    artifact: &ArtifactDescriptor,
    ids: &[String],
) -> Vec<InternalConnection> {
    let selected: Vec<&ServiceDescriptor> =
        ids.iter().filter_map(|id| artifact.service(id)).collect();
    let mut connections = BTreeSet::new();
    for producer in &selected {
        for output in producer.output_connectors() {
            for consumer in &selected {
                if consumer.input_connectors().iter().any(|i| i.id() == output.id()) {
                    connections.insert(InternalConnection {
                        producer: producer.id().to_owned(),
                        consumer: consumer.id().to_owned(),
                        connector: output.id().to_owned(),
                    });
                }
            }
        }
    }
    connections.into_iter().collect()
}
