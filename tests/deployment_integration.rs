//! ---
//! pf_section: "15-testing-qa-runbook"
//! pf_subsection: "integration-tests"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "End-to-end deployment tests over the demo artifact and plan."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use plantflow_common::AppConfig;
use plantflow_deploy::{validate_plan, DeploymentPlan, Fleet, PlanExecutor};
use plantflow_services::ensemble::{ensemble_connector_names, ensemble_ids, internal_connections};
use plantflow_services::{
    ArtifactResolver, ErrorKind, RuntimeOp, ServiceState, YamlArtifactResolver,
};

fn repo_path(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(path)
}

fn read(path: &str) -> String {
    let full = repo_path(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

fn demo_plan() -> DeploymentPlan {
    DeploymentPlan::from_path(repo_path("demos/SimpleMesh-plan.yml")).unwrap()
}

/// Two-resource fleet resolving `${artifactsUriPrefix}` to the demo directory.
fn fleet(extra: &str) -> (AppConfig, Fleet) {
    let demos = repo_path("demos");
    let raw = format!(
        r#"
resource = "a1234"
artifacts_uri_prefix = "{}"

[resources.a1234]

[resources.a1235]
{extra}
"#,
        demos.display()
    );
    let config: AppConfig = raw.parse().unwrap();
    let fleet = Fleet::from_config(&config).unwrap();
    (config, fleet)
}

fn state(fleet: &Fleet, resource: &str, service: &str) -> Option<ServiceState> {
    fleet
        .registry
        .manager(resource)
        .unwrap()
        .service_state(service)
}

#[test]
fn sample_configuration_is_loadable() {
    let config: AppConfig = read("configs/plantflow.toml").parse().unwrap();
    assert_eq!(config.resource, "a1234");
    assert!(config.resource("a1235").is_some());
    assert_eq!(config.artifacts_uri_prefix.as_deref(), Some("demos"));
}

#[test]
fn demo_artifact_declares_one_ensemble() {
    let resolver = YamlArtifactResolver::with_base_dir(repo_path("demos"));
    let artifact = resolver.resolve("SimpleMesh.yml").unwrap();
    assert_eq!(artifact.services().len(), 4);

    let end = artifact.service("End").unwrap();
    let members: Vec<String> = ensemble_ids(&artifact, end).into_iter().collect();
    assert_eq!(members, vec!["AI", "End"]);
    let channels: Vec<String> = ensemble_connector_names(&artifact, end).into_iter().collect();
    assert_eq!(channels, vec!["scored"]);

    let ids: Vec<String> = ["Start", "Transform"].map(String::from).to_vec();
    let connections = internal_connections(&artifact, &ids);
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].connector, "raw");
}

#[test]
fn demo_plan_is_valid() {
    let plan = demo_plan();
    validate_plan(&plan).unwrap();
    assert_eq!(plan.display_name(), "simple-mesh");
    assert_eq!(plan.assignments().len(), 2);
}

#[tokio::test]
async fn deploy_then_undeploy_across_two_resources() {
    let (config, fleet) = fleet("");
    let executor = PlanExecutor::from_config(fleet.registry.clone(), &config);
    let plan = demo_plan();

    let report = executor.deploy(&plan).await.unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.resources[0].resource, "a1234");
    assert!(report.resources.iter().all(|r| r.artifact.is_some()));
    for (resource, service) in [
        ("a1234", "Start"),
        ("a1234", "Transform"),
        ("a1235", "AI"),
        ("a1235", "End"),
    ] {
        assert_eq!(state(&fleet, resource, service), Some(ServiceState::Running));
    }
    assert_eq!(state(&fleet, "a1234", "AI"), Some(ServiceState::Available));
    assert_eq!(fleet.runtimes["a1235"].calls_of(RuntimeOp::Start), vec!["AI", "End"]);

    let report = executor.undeploy(&plan).await.unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.resources[0].resource, "a1235");
    assert_eq!(fleet.runtimes["a1235"].calls_of(RuntimeOp::Stop), vec!["End", "AI"]);
    assert_eq!(
        fleet.runtimes["a1234"].calls_of(RuntimeOp::Stop),
        vec!["Transform", "Start"]
    );
    for resource in ["a1234", "a1235"] {
        assert!(fleet.registry.manager(resource).unwrap().artifact_ids().is_empty());
    }
}

#[tokio::test]
async fn failing_resource_does_not_stop_the_others() {
    let (config, fleet) = fleet(r#"fail_services = ["End"]"#);
    let executor = PlanExecutor::from_config(fleet.registry.clone(), &config);

    let report = executor.deploy(&demo_plan()).await.unwrap();
    assert!(!report.is_success());
    let failed: Vec<&str> = report.failures().map(|r| r.resource.as_str()).collect();
    assert_eq!(failed, vec!["a1235"]);
    assert_eq!(state(&fleet, "a1234", "Transform"), Some(ServiceState::Running));
    assert_eq!(state(&fleet, "a1235", "AI"), Some(ServiceState::Running));
    assert_eq!(state(&fleet, "a1235", "End"), Some(ServiceState::Available));

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteFailure);
}

#[tokio::test]
async fn follower_placed_away_from_its_artifact_leader_is_rejected() {
    let (config, fleet) = fleet("");
    let executor = PlanExecutor::from_config(fleet.registry.clone(), &config);
    let plan = DeploymentPlan::from_yaml_str(
        r#"
artifact: ${artifactsUriPrefix}/SimpleMesh.yml
assignments:
  - resource: a1234
    services: [Start, Transform, End]
  - resource: a1235
    services: [AI]
"#,
    )
    .unwrap();
    validate_plan(&plan).unwrap();

    let err = executor.deploy(&plan).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlanValidationFailure);
    assert!(err.message().contains("'AI'"));
    for resource in ["a1234", "a1235"] {
        assert!(fleet.runtimes[resource].calls().is_empty());
        assert!(fleet.registry.manager(resource).unwrap().artifact_ids().is_empty());
    }
}

#[tokio::test]
async fn parallel_and_disabled_plans() {
    let (config, fleet) = fleet("");
    let executor = PlanExecutor::from_config(fleet.registry.clone(), &config);

    let mut plan = demo_plan();
    plan.set_disabled(true);
    let report = executor.deploy(&plan).await.unwrap();
    assert!(report.skipped);
    assert_eq!(state(&fleet, "a1234", "Start"), None);

    plan.set_disabled(false);
    plan.set_parallelize(true);
    let report = executor.deploy(&plan).await.unwrap();
    assert!(report.is_success(), "{report:?}");
    let resources: Vec<&str> = report.resources.iter().map(|r| r.resource.as_str()).collect();
    assert_eq!(resources, vec!["a1234", "a1235"]);
    assert_eq!(state(&fleet, "a1235", "End"), Some(ServiceState::Running));
}

#[tokio::test]
async fn deployed_service_migrates_to_other_resource() {
    let (config, fleet) = fleet("");
    let executor = PlanExecutor::from_config(fleet.registry.clone(), &config);
    executor.deploy(&demo_plan()).await.unwrap().into_result().unwrap();

    let local = fleet.registry.manager(".").unwrap();
    local.migrate_service("Transform", "a1235").unwrap();
    assert_eq!(state(&fleet, "a1234", "Transform"), Some(ServiceState::Stopped));
    assert_eq!(state(&fleet, "a1235", "Transform"), Some(ServiceState::Running));

    let err = local.migrate_service("Transform", "nowhere").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownEntity);
}

#[tokio::test]
async fn unprefixed_location_fails_to_resolve() {
    let config = AppConfig::default();
    let fleet = Fleet::from_config(&config).unwrap();
    let executor = PlanExecutor::new(fleet.registry.clone());
    let plan = DeploymentPlan::from_yaml_str(
        "artifact: ${artifactsUriPrefix}/SimpleMesh.yml\nassignments:\n  - resource: \".\"\n    services: [Start]\n",
    )
    .unwrap();

    let report = executor.deploy(&plan).await.unwrap();
    let outcome = &report.resources[0];
    assert_eq!(outcome.resource, config.resource);
    assert_eq!(
        outcome.error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::RemoteFailure)
    );
}
