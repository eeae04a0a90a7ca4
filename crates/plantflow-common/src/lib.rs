//! ---
//! pf_section: "01-core-functionality"
//! pf_subsection: "module"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Shared configuration and tracing setup."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
//! Shared primitives for the PlantFlow workspace: configuration loading and
//! tracing initialisation consumed by the binaries and integration tests.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ExecutionConfig, LoadedAppConfig, LoggingConfig, ResourceConfig, RuntimeKind,
};
pub use logging::{env_filter, init_tracing, log_file_name, LogFormat};
