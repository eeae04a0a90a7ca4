//! ---
//! pf_section: "05-networking-external-interfaces"
//! pf_subsection: "binary"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Artifact inspection subcommands of the control CLI."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use clap::Subcommand;
use plantflow_common::AppConfig;
use plantflow_services::ensemble::{
    ensemble_connector_names, ensemble_ids, internal_connections, leader, top_level,
};
use plantflow_services::{ArtifactDescriptor, ArtifactResolver, YamlArtifactResolver};

#[derive(Debug, Subcommand)]
pub enum ArtifactCommand {
    /// Print services, ensembles and in-process channels of an artifact.
    Inspect {
        /// Artifact location, a path or `file://` URI.
        #[arg(value_name = "LOCATION")]
        location: String,
    },
}

pub fn run(command: ArtifactCommand, config: &AppConfig) -> Result<()> {
    match command {
        ArtifactCommand::Inspect { location } => {
            let resolver = match config
                .resource(&config.resource)
                .and_then(|r| r.artifact_dir.as_ref())
            {
                Some(dir) => YamlArtifactResolver::with_base_dir(dir),
                None => YamlArtifactResolver::new(),
            };
            let artifact = resolver
                .resolve(&location)
                .with_context(|| format!("resolving artifact {location}"))?;
            render_artifact(&artifact);
            Ok(())
        }
    }
}

fn render_artifact(artifact: &ArtifactDescriptor) {
    println!(
        "Artifact {} '{}' version {}",
        artifact.id(),
        artifact.name(),
        artifact.version()
    );
    println!("Services:");
    for service in artifact.services() {
        println!(
            "  {:<20} {:<12} {:<10} leader={}{}",
            service.id(),
            service.kind().to_string(),
            service.version().to_string(),
            leader(service),
            if service.is_deployable() { "" } else { " (not deployable)" }
        );
    }

    println!("Ensembles:");
    let mut seen = Vec::new();
    for service in artifact.services() {
        let members = ensemble_ids(artifact, service);
        if members.len() <= 1 || seen.contains(&members) {
            continue;
        }
        let channels = ensemble_connector_names(artifact, service);
        println!(
            "  {} -> [{}] channels [{}]",
            leader(service),
            members.iter().cloned().collect::<Vec<_>>().join(", "),
            channels.into_iter().collect::<Vec<_>>().join(", ")
        );
        seen.push(members);
    }

    let ids: Vec<String> = artifact.service_ids().map(str::to_owned).collect();
    println!("Top-level: {}", top_level(artifact, &ids).join(", "));
    println!("Connections:");
    for connection in internal_connections(artifact, &ids) {
        println!(
            "  {} -[{}]-> {}",
            connection.producer, connection.connector, connection.consumer
        );
    }
}
