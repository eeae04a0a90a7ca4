//! ---
//! pf_section: "05-networking-external-interfaces"
//! pf_subsection: "binary"
//! pf_type: "source"
//! pf_scope: "code"
//! pf_description: "Deployment plan subcommands of the control CLI."
//! pf_version: "v0.0.0-prealpha"
//! pf_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use plantflow_common::AppConfig;
use plantflow_deploy::{validate_plan, DeploymentPlan, ExecutionReport, Fleet, PlanExecutor};
use tokio::runtime::Runtime;

/// Deployment plan commands.
#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    /// Load and validate a plan without touching any resource.
    Validate(PlanFile),
    /// Deploy a plan onto the configured resources.
    Deploy(RunOptions),
    /// Deploy a plan, then undeploy it again in reverse order.
    Cycle(RunOptions),
}

#[derive(Debug, Args)]
pub struct PlanFile {
    /// Plan document (YAML).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunOptions {
    #[command(flatten)]
    pub plan: PlanFile,
    /// Run assignments concurrently regardless of the plan's `parallelize`.
    #[arg(long)]
    pub parallel: bool,
}

/// Execute the supplied plan command.
pub fn run(command: PlanCommand, config: &AppConfig) -> Result<()> {
    match command {
        PlanCommand::Validate(file) => {
            let plan = load_plan(&file)?;
            println!(
                "Plan '{}' is valid ({} assignment(s))",
                plan.display_name(),
                plan.assignments().len()
            );
            Ok(())
        }
        PlanCommand::Deploy(options) => {
            let plan = load_runnable(&options)?;
            let executor = executor_for(config)?;
            let runtime = Runtime::new()?;
            let report = runtime.block_on(executor.deploy(&plan))?;
            render_report(&report);
            report.into_result()?;
            Ok(())
        }
        PlanCommand::Cycle(options) => {
            let plan = load_runnable(&options)?;
            let executor = executor_for(config)?;
            let runtime = Runtime::new()?;
            let deployed = runtime.block_on(executor.deploy(&plan))?;
            render_report(&deployed);
            let undeployed = runtime.block_on(executor.undeploy(&plan))?;
            render_report(&undeployed);
            deployed.into_result()?;
            undeployed.into_result()?;
            Ok(())
        }
    }
}

fn load_plan(file: &PlanFile) -> Result<DeploymentPlan> {
    let plan = DeploymentPlan::from_path(&file.file)
        .with_context(|| format!("loading plan {}", file.file.display()))?;
    validate_plan(&plan)?;
    Ok(plan)
}

fn load_runnable(options: &RunOptions) -> Result<DeploymentPlan> {
    let mut plan = load_plan(&options.plan)?;
    if options.parallel {
        plan.set_parallelize(true);
    }
    Ok(plan)
}

fn executor_for(config: &AppConfig) -> Result<PlanExecutor> {
    let fleet = Fleet::from_config(config)?;
    Ok(PlanExecutor::from_config(fleet.registry.clone(), config))
}

fn render_report(report: &ExecutionReport) {
    if report.skipped {
        println!("Plan '{}' is disabled; {} skipped", report.plan, report.action);
        return;
    }
    println!("Plan '{}' {}:", report.plan, report.action);
    for outcome in &report.resources {
        let status = match &outcome.error {
            None => "ok".to_owned(),
            Some(err) => format!("failed ({err})"),
        };
        println!(
            "  {:<16} {:<40} [{}] {}",
            outcome.resource,
            outcome.artifact.as_deref().unwrap_or("-"),
            outcome.services.join(", "),
            status
        );
    }
}
