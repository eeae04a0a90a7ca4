//! ---
//! pf_section: "01-core-functionality"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Tracing subscriber initialisation for orchestration binaries."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

pub const LOG_ENV: &str = "PLANTFLOW_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Output format of the stdout layer. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Build the filter from `PLANTFLOW_LOG`, then `RUST_LOG`, then `info`.
///
/// An unparsable `PLANTFLOW_LOG` is reported on stderr and replaced by the default.
pub fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

/// Name of the daily log file for `service_name` acting for `resource_id`.
///
/// The configured prefix replaces the service name. The resource id keeps
/// logs of several resources sharing one directory apart.
pub fn log_file_name(service_name: &str, resource_id: &str, config: &LoggingConfig) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let resource: String = resource_id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if resource.is_empty() {
        format!("{prefix}.log")
    } else {
        format!("{prefix}-{resource}.log")
    }
}

/// Install the global subscriber for a binary acting on `resource_id`.
///
/// Events go to stdout in the configured format and, as JSON, to a daily
/// rolling file named by [`log_file_name`]. Calling it again after a
/// subscriber is installed is harmless.
pub fn init_tracing(service_name: &str, resource_id: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let file_name = log_file_name(service_name, resource_id, config);

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, &file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .compact()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        resource = %resource_id,
        log_file = %config.directory.join(&file_name).display(),
        "tracing initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("plantflow-test".to_owned()),
        };
        init_tracing("plantflow-test", "a1234", &config).unwrap();
        assert!(config.directory.is_dir());
    }

    #[test]
    fn log_file_is_named_after_the_resource() {
        let mut config = LoggingConfig {
            directory: "logs".into(),
            format: LogFormat::StructuredJson,
            file_prefix: None,
        };
        assert_eq!(log_file_name("plantflowctl", "a1234", &config), "plantflowctl-a1234.log");
        assert_eq!(log_file_name("plantflowctl", "edge/1", &config), "plantflowctl-edge_1.log");
        assert_eq!(log_file_name("plantflowctl", " ", &config), "plantflowctl.log");

        config.file_prefix = Some("plant".to_owned());
        assert_eq!(log_file_name("plantflowctl", "a1235", &config), "plant-a1235.log");
    }

    #[test]
    fn log_format_uses_kebab_case() {
        let format: LogFormat = serde_json::from_str("\"structured-json\"").unwrap();
        assert_eq!(format, LogFormat::StructuredJson);
    }
}
