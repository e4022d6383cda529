use super::NodeArgs;
use anyhow::Result;
use knode::config;
use knode::error::ProvisionError;
use knode::services::node::control_plane::SshControlPlane;
use knode::services::node::{RunReport, STEPS, Sequencer, StepContext, StepResult};
use knode::utils::exec::{Executor, PackageManager};
use knode::utils::prompt::{ConsolePrompt, NoPrompt, Prompt};
use std::path::Path;

/// Last step that needs the package manager
const LAST_PACKAGE_STEP: usize = 6;

/// Handle provision command
pub fn handle_provision(
    node: &NodeArgs,
    config_path: Option<&Path>,
    from_step: usize,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    let config = config::load_config(node.to_layer(), config_path)?;
    let sequencer = Sequencer::starting_at(from_step)?;

    let exec = if dry_run {
        Executor::DryRun
    } else {
        Executor::local()
    };
    let prompt: &dyn Prompt = if yes { &NoPrompt } else { &ConsolePrompt };
    let control_plane = SshControlPlane::new(&config);

    let package_manager = PackageManager::detect(&exec)?;
    if package_manager == PackageManager::Unknown && from_step <= LAST_PACKAGE_STEP {
        return Err(ProvisionError::UnsupportedPackageManager.into());
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if dry_run {
        println!("Provision Kubernetes Worker Node (dry run)");
    } else {
        println!("Provision Kubernetes Worker Node");
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Kubernetes:      {}", config.k8s_version);
    println!("Control plane:   {} ({})", config.control_plane_ip, config.control_plane_alias);
    println!("Package manager: {}", package_manager.display_name());
    if from_step > 1 {
        println!("Resuming at:     step {}", from_step);
    }

    let mut ctx = StepContext {
        exec: &exec,
        prompt,
        control_plane: &control_plane,
        config: &config,
        package_manager,
        node_name: None,
    };
    let report = sequencer.run(&mut ctx);

    print_summary(&report);

    if let Some(record) = report.fatal() {
        if let StepResult::Fatal(ref e) = record.result {
            anyhow::bail!(
                "Provisioning stopped at step {} ({}): {}\n\
                 Fix the problem and resume with: knode provision --from-step {}",
                record.number,
                record.title,
                e,
                record.number
            );
        }
    }

    println!();
    if dry_run {
        println!("✓ Dry run complete; no changes were made and the node did not join");
    } else {
        println!("✓ Node provisioned and joined the cluster");
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for record in &report.records {
        let (mark, note) = match &record.result {
            StepResult::Success => ("✓", String::new()),
            StepResult::Skipped(reason) => ("-", format!(" (skipped: {})", reason)),
            StepResult::Fatal(_) => ("✗", " (failed)".to_string()),
        };
        println!(
            "  {} {}. {}{} [{:.1}s]",
            mark,
            record.number,
            record.title,
            note,
            record.elapsed.as_secs_f64()
        );
    }

    let attempted = report.attempted();
    for step in STEPS.iter() {
        if !attempted.contains(&step.number) && step.number > attempted.last().copied().unwrap_or(0) {
            println!("    {}. {} (not run)", step.number, step.title);
        }
    }
}
