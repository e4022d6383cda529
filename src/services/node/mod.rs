//! Worker node provisioning
//!
//! A fixed, ordered list of steps run against the local host. The sequencer
//! stops at the first fatal step; nothing is rolled back.

pub mod control_plane;
mod host_prep;
mod identity;
pub mod join;
mod kubernetes;
mod packages;
mod runtime;

use crate::config::NodeConfig;
use crate::error::ProvisionError;
use crate::utils::exec::{CommandExecutor, PackageManager};
use crate::utils::prompt::Prompt;
use control_plane::ControlPlane;
use log::{error, info};
use std::time::{Duration, Instant};

pub use identity::HOSTS_PATH;
pub use packages::KUBERNETES_REPO_PATH;
pub use runtime::CONTAINERD_CONFIG_PATH;

/// Everything a step may touch
pub struct StepContext<'a> {
    pub exec: &'a dyn CommandExecutor,
    pub prompt: &'a dyn Prompt,
    pub control_plane: &'a dyn ControlPlane,
    pub config: &'a NodeConfig,
    pub package_manager: PackageManager,
    /// Settled by the host identity step; the join step reads the hostname if unset
    pub node_name: Option<String>,
}

/// Non-fatal result of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Skipped(String),
}

pub type StepFn = fn(&mut StepContext) -> Result<StepOutcome, ProvisionError>;

pub struct Step {
    pub number: usize,
    pub title: &'static str,
    run: StepFn,
}

pub const STEPS: [Step; 9] = [
    Step {
        number: 1,
        title: "Disable swap and firewall",
        run: host_prep::disable_swap_and_firewall,
    },
    Step {
        number: 2,
        title: "Configure kernel modules and network sysctls",
        run: host_prep::configure_kernel_prerequisites,
    },
    Step {
        number: 3,
        title: "Install dependencies",
        run: packages::install_dependencies,
    },
    Step {
        number: 4,
        title: "Register Kubernetes repository",
        run: packages::register_kubernetes_repo,
    },
    Step {
        number: 5,
        title: "Set up container runtime",
        run: runtime::setup_container_runtime,
    },
    Step {
        number: 6,
        title: "Install Kubernetes components",
        run: kubernetes::install_kubernetes_components,
    },
    Step {
        number: 7,
        title: "Enable kubelet",
        run: kubernetes::enable_kubelet,
    },
    Step {
        number: 8,
        title: "Configure host identity",
        run: identity::configure_host_identity,
    },
    Step {
        number: 9,
        title: "Join cluster",
        run: join::join_cluster,
    },
];

/// Per-step outcome as recorded by the sequencer
#[derive(Debug)]
pub enum StepResult {
    Success,
    Skipped(String),
    Fatal(ProvisionError),
}

#[derive(Debug)]
pub struct StepRecord {
    pub number: usize,
    pub title: &'static str,
    pub result: StepResult,
    pub elapsed: Duration,
}

/// What happened during one run
#[derive(Debug, Default)]
pub struct RunReport {
    pub records: Vec<StepRecord>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.fatal().is_none()
    }

    pub fn fatal(&self) -> Option<&StepRecord> {
        self.records
            .iter()
            .find(|r| matches!(r.result, StepResult::Fatal(_)))
    }

    /// Numbers of the steps that were attempted, in order
    pub fn attempted(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.number).collect()
    }
}

/// Runs `STEPS` in order, halting on the first fatal result
pub struct Sequencer {
    from_step: usize,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self { from_step: 1 }
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume at `step` (1-based), skipping the ones before it
    pub fn starting_at(step: usize) -> anyhow::Result<Self> {
        if !(1..=STEPS.len()).contains(&step) {
            anyhow::bail!("Step must be between 1 and {}, got {}", STEPS.len(), step);
        }
        Ok(Self { from_step: step })
    }

    pub fn run(&self, ctx: &mut StepContext) -> RunReport {
        let total = STEPS.len();
        let mut report = RunReport::default();

        for step in STEPS.iter().filter(|s| s.number >= self.from_step) {
            println!();
            println!("[{}/{}] {}...", step.number, total, step.title);
            info!("Starting step {}: {}", step.number, step.title);

            let started = Instant::now();
            let result = match (step.run)(ctx) {
                Ok(StepOutcome::Success) => {
                    println!("✓ [{}/{}] {}", step.number, total, step.title);
                    StepResult::Success
                }
                Ok(StepOutcome::Skipped(reason)) => {
                    println!("- [{}/{}] {} skipped: {}", step.number, total, step.title, reason);
                    StepResult::Skipped(reason)
                }
                Err(e) => {
                    println!("✗ [{}/{}] {}: {}", step.number, total, step.title, e);
                    error!("Step {} failed: {:?}", step.number, e);
                    StepResult::Fatal(e)
                }
            };

            let fatal = matches!(result, StepResult::Fatal(_));
            report.records.push(StepRecord {
                number: step.number,
                title: step.title,
                result,
                elapsed: started.elapsed(),
            });
            if fatal {
                break;
            }
        }

        report
    }
}
