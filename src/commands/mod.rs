// Command module routing
//
// To add a new command:
// 1. Create a new file in this directory (e.g., `mycommand.rs`)
// 2. Add `pub mod mycommand;` below
// 3. Add the match arm in `handle_command` function

pub mod config;
pub mod preflight;
pub mod provision;
pub mod steps;

use crate::Commands;
use crate::Commands::*;
use anyhow::Result;
use clap::Args;
use knode::ConfigLayer;
use std::path::Path;

/// Node settings accepted on the command line. Each one falls back to the
/// environment, then the config file.
#[derive(Args, Clone, Debug, Default)]
pub struct NodeArgs {
    /// Kubernetes minor version to install (e.g. v1.29)
    #[arg(long)]
    pub k8s_version: Option<String>,
    /// Control-plane IP address
    #[arg(long)]
    pub control_plane: Option<String>,
    /// Hostname to give this node (skips the placeholder prompt)
    #[arg(long)]
    pub hostname: Option<String>,
    /// Name mapped to the control-plane IP in /etc/hosts
    #[arg(long)]
    pub control_plane_alias: Option<String>,
    /// SSH user for the control plane
    #[arg(long)]
    pub ssh_user: Option<String>,
    /// Seconds to wait on the control plane before giving up
    #[arg(long)]
    pub remote_timeout: Option<u64>,
    /// Seconds to wait for the node to become Ready after joining
    #[arg(long)]
    pub registration_timeout: Option<u64>,
}

impl NodeArgs {
    pub fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            k8s_version: self.k8s_version.clone(),
            control_plane_ip: self.control_plane.clone(),
            hostname: self.hostname.clone(),
            control_plane_alias: self.control_plane_alias.clone(),
            ssh_user: self.ssh_user.clone(),
            remote_timeout_secs: self.remote_timeout,
            registration_timeout_secs: self.registration_timeout,
            ..Default::default()
        }
    }
}

/// Dispatch command to appropriate handler
pub fn handle_command(config_path: Option<&Path>, command: Commands) -> Result<()> {
    match command {
        Provision {
            node,
            from_step,
            dry_run,
            yes,
        } => {
            provision::handle_provision(&node, config_path, from_step, dry_run, yes)?;
        }
        Preflight { node } => {
            preflight::handle_preflight(&node, config_path)?;
        }
        Steps => {
            steps::handle_steps();
        }
        Config { node } => {
            config::handle_config(&node, config_path)?;
        }
    }
    Ok(())
}
