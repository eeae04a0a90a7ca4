//! ---
//! pf_section: "02-service-lifecycle"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Resolution of artifact locations into artifact descriptors."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::RwLock;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::connector::{Direction, TypedDataConnector};
use crate::descriptor::{ArtifactDescriptor, ServiceDescriptor};
use crate::error::{Result, ServiceError};
use crate::state::ServiceKind;

/// Maps an artifact location to its descriptor.
pub trait ArtifactResolver: Send + Sync {
    /// Resolve `location`. The returned descriptor carries the location; the
    /// manager assigns the final artifact id.
    fn resolve(&self, location: &str) -> Result<ArtifactDescriptor>;

    /// Copy the artifact stored at `location` to `target`.
    fn export(&self, location: &str, target: &str) -> Result<()> {
        Err(ServiceError::unsupported(format!(
            "cannot copy artifact '{location}' to '{target}'"
        )))
    }
}

/// On-disk artifact document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ServiceKind,
    #[serde(default = "default_deployable")]
    pub deployable: bool,
    /// Leader id of the ensemble this service belongs to.
    #[serde(default)]
    pub ensemble_with: Option<String>,
    #[serde(default)]
    pub inputs: Vec<ConnectorSpec>,
    #[serde(default)]
    pub outputs: Vec<ConnectorSpec>,
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
    #[serde(default)]
    pub cmd_args: Vec<String>,
}

fn default_deployable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub payload_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_service: Option<String>,
    #[serde(default)]
    pub target_function: Option<String>,
}

impl ArtifactSpec {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|err| ServiceError::invalid_argument(format!("malformed artifact: {err}")))
    }

    /// Validate the document and turn it into a descriptor.
    pub fn into_descriptor(self, location: &str) -> Result<ArtifactDescriptor> {
        let version = parse_version(self.version.as_deref(), &self.id)?;
        let mut services = Vec::with_capacity(self.services.len());
        for spec in self.services {
            services.push(spec.into_descriptor()?);
        }
        Ok(ArtifactDescriptor::new(self.id, self.name, services)?
            .with_location(location)
            .with_version(version))
    }
}

impl ServiceSpec {
    fn into_descriptor(self) -> Result<ServiceDescriptor> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::invalid_argument(format!(
                "service '{}' must have a name",
                self.id
            )));
        }
        let version = parse_version(self.version.as_deref(), &self.id)?;
        let mut descriptor = ServiceDescriptor::new(self.id, self.name, self.kind)
            .with_description(self.description)
            .with_version(version)
            .with_deployable(self.deployable)
            .with_cmd_args(self.cmd_args);
        if let Some(leader) = self.ensemble_with.filter(|l| !l.trim().is_empty()) {
            descriptor = descriptor.with_ensemble_leader(leader);
        }
        for (name, ty) in self.parameters {
            descriptor = descriptor.with_parameter(name, ty);
        }
        for (direction, specs) in [
            (Direction::Input, self.inputs),
            (Direction::Output, self.outputs),
        ] {
            let mut seen = std::collections::HashSet::new();
            for spec in specs {
                if !seen.insert(spec.id.clone()) {
                    return Err(ServiceError::invalid_argument(format!(
                        "service '{}' declares {direction} connector '{}' twice",
                        descriptor.id(),
                        spec.id
                    )));
                }
                descriptor = descriptor.with_connector(spec.into_connector(direction));
            }
        }
        Ok(descriptor)
    }
}

impl ConnectorSpec {
    fn into_connector(self, direction: Direction) -> TypedDataConnector {
        let name = self.name.unwrap_or_else(|| self.id.clone());
        let mut connector = TypedDataConnector::new(self.id, name, self.payload_type, direction)
            .with_description(self.description);
        if let Some(service) = self.target_service {
            connector = connector.with_target(service, self.target_function);
        }
        connector
    }
}

fn parse_version(raw: Option<&str>, owner: &str) -> Result<Version> {
    match raw {
        None => Ok(Version::new(0, 0, 0)),
        Some(raw) => Version::parse(raw.trim()).map_err(|err| {
            ServiceError::invalid_argument(format!("invalid version '{raw}' for '{owner}': {err}"))
        }),
    }
}

/// Turn a plain path or `file://` URL into a filesystem path.
///
/// Relative paths are resolved against `base_dir` when one is given.
pub fn location_to_path(location: &str, base_dir: Option<&Path>) -> Result<PathBuf> {
    let location = location.trim();
    if location.is_empty() {
        return Err(ServiceError::invalid_argument("artifact location must not be empty"));
    }
    if location.contains("://") || location.starts_with("file:") {
        let url = Url::parse(location).map_err(|err| {
            ServiceError::invalid_argument(format!("invalid artifact url '{location}': {err}"))
        })?;
        if url.scheme() != "file" {
            return Err(ServiceError::unsupported(format!(
                "artifact scheme '{}' is not supported",
                url.scheme()
            )));
        }
        return url.to_file_path().map_err(|()| {
            ServiceError::invalid_argument(format!("url '{location}' has no file path"))
        });
    }
    let path = PathBuf::from(location);
    Ok(match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    })
}

/// Reads YAML artifact documents from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct YamlArtifactResolver {
    base_dir: Option<PathBuf>,
}

impl YamlArtifactResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path(&self, location: &str) -> Result<PathBuf> {
        location_to_path(location, self.base_dir.as_deref())
    }
}

impl ArtifactResolver for YamlArtifactResolver {
    fn resolve(&self, location: &str) -> Result<ArtifactDescriptor> {
        let path = self.path(location)?;
        debug!(location, path = %path.display(), "reading artifact document");
        let raw = fs::read_to_string(&path).map_err(|err| {
            ServiceError::remote(format!("cannot read artifact {}: {err}", path.display()))
        })?;
        ArtifactSpec::from_yaml_str(&raw)?.into_descriptor(location)
    }

    fn export(&self, location: &str, target: &str) -> Result<()> {
        let source = self.path(location)?;
        let target = self.path(target)?;
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                ServiceError::remote(format!("cannot create {}: {err}", parent.display()))
            })?;
        }
        fs::copy(&source, &target).map_err(|err| {
            ServiceError::remote(format!(
                "cannot copy {} to {}: {err}",
                source.display(),
                target.display()
            ))
        })?;
        Ok(())
    }
}

/// In-memory table of artifacts keyed by location.
#[derive(Debug, Default)]
pub struct StaticArtifactResolver {
    artifacts: RwLock<HashMap<String, ArtifactDescriptor>>,
}

impl StaticArtifactResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(self, location: impl Into<String>, artifact: ArtifactDescriptor) -> Self {
        self.insert(location, artifact);
        self
    }

    pub fn insert(&self, location: impl Into<String>, artifact: ArtifactDescriptor) {
        let location = location.into();
        let artifact = artifact.with_location(location.clone());
        self.artifacts.write().insert(location, artifact);
    }
}

impl ArtifactResolver for StaticArtifactResolver {
    fn resolve(&self, location: &str) -> Result<ArtifactDescriptor> {
        self.artifacts
            .read()
            .get(location)
            .cloned()
            .ok_or_else(|| ServiceError::remote(format!("no artifact at '{location}'")))
    }

    fn export(&self, location: &str, target: &str) -> Result<()> {
        let artifact = self.resolve(location)?;
        self.insert(target, artifact);
        Ok(())
    }
}
