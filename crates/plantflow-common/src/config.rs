//! ---
//! pf_section: "01-core-functionality"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Configuration model for resources, plan execution and logging."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_resource() -> String {
    "local".to_owned()
}

fn default_resources() -> IndexMap<String, ResourceConfig> {
    let mut resources = IndexMap::new();
    resources.insert(default_resource(), ResourceConfig::default());
    resources
}

fn default_parallel_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_remove_artifacts() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for orchestration tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Id of the resource this process runs on; plans refer to it as `.`.
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Substituted for `${artifactsUriPrefix}` in plan artifact references.
    #[serde(default)]
    pub artifacts_uri_prefix: Option<String>,
    #[serde(default = "default_resources")]
    pub resources: IndexMap<String, ResourceConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults are in use.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "PLANTFLOW_CONFIG";

    /// Load configuration from disk, respecting the `PLANTFLOW_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        match Self::load_with_source(candidates)? {
            LoadedAppConfig {
                config,
                source: Some(_),
            } => Ok(config),
            LoadedAppConfig { source: None, .. } => Err(anyhow!(
                "no configuration files found. inspected: {}",
                candidates
                    .iter()
                    .map(|p| p.as_ref().display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    /// Load configuration together with its source, falling back to
    /// [`AppConfig::default`] when neither the override nor a candidate exists.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn resource(&self, resource_id: &str) -> Option<&ResourceConfig> {
        self.resources.get(resource_id)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.resource.trim().is_empty() {
            return Err(anyhow!("local resource id must not be empty"));
        }
        if self.resource.trim() == "." {
            return Err(anyhow!("'.' is reserved and cannot name the local resource"));
        }
        if !self.resources.contains_key(&self.resource) {
            return Err(anyhow!(
                "local resource '{}' is not declared under [resources]",
                self.resource
            ));
        }
        for (resource_id, resource) in &self.resources {
            resource.validate(resource_id)?;
        }
        self.execution.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            artifacts_uri_prefix: None,
            resources: default_resources(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Runtime implementation backing a resource's service manager.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// In-process runtime that records lifecycle calls.
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourceConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeKind,
    /// Relative artifact locations are resolved against this directory.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
    /// Services whose start is rejected by the simulated runtime.
    #[serde(default)]
    pub fail_services: Vec<String>,
}

impl ResourceConfig {
    pub fn validate(&self, resource_id: &str) -> Result<()> {
        if resource_id.trim().is_empty() || resource_id.trim() == "." {
            return Err(anyhow!("invalid resource id '{}'", resource_id));
        }
        if let Some(dir) = &self.artifact_dir {
            if dir.as_os_str().is_empty() {
                return Err(anyhow!(
                    "resource '{}' declares an empty artifact_dir",
                    resource_id
                ));
            }
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Upper bound for a parallel plan run, in seconds.
    #[serde(default = "default_parallel_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub parallel_timeout: Duration,
    /// Default for plans that do not say whether to drop artifacts on undeploy.
    #[serde(default = "default_remove_artifacts")]
    pub remove_artifacts_on_undeploy: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel_timeout: default_parallel_timeout(),
            remove_artifacts_on_undeploy: default_remove_artifacts(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.parallel_timeout.is_zero() {
            return Err(anyhow!("execution.parallel_timeout must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
resource = "edge-1"
artifacts_uri_prefix = "file:///opt/plantflow/artifacts"

[resources.edge-1]
artifact_dir = "/opt/plantflow/artifacts"

[resources.edge-2]
runtime = "simulated"
fail_services = ["AI"]

[execution]
parallel_timeout = 30

[logging]
format = "pretty"
"#;

    #[test]
    fn parses_full_configuration() {
        let config: AppConfig = SAMPLE.parse().unwrap();
        assert_eq!(config.resource, "edge-1");
        assert_eq!(
            config.resources.keys().collect::<Vec<_>>(),
            vec!["edge-1", "edge-2"]
        );
        assert_eq!(config.resource("edge-2").unwrap().fail_services, vec!["AI"]);
        assert_eq!(config.execution.parallel_timeout, Duration::from_secs(30));
        assert!(config.execution.remove_artifacts_on_undeploy);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.execution.parallel_timeout, Duration::from_secs(180));
        let parsed: AppConfig = "".parse().unwrap();
        assert_eq!(parsed.resource, "local");
    }

    #[test]
    fn rejects_undeclared_local_resource() {
        let err = "resource = \"edge-9\"\n[resources.edge-1]\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("edge-9"));
        let err = "[execution]\nparallel_timeout = 0\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("parallel_timeout"));
    }

    #[test]
    fn loads_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plantflow.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let missing = dir.path().join("missing.toml");
        if std::env::var(AppConfig::ENV_CONFIG_PATH).is_err() {
            let loaded = AppConfig::load_with_source(&[missing.clone(), path.clone()]).unwrap();
            assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
            assert_eq!(loaded.config.resource, "edge-1");

            let fallback = AppConfig::load_with_source(&[missing.clone()]).unwrap();
            assert!(fallback.source.is_none());
            assert!(AppConfig::load(&[missing]).is_err());
        }
    }
}
