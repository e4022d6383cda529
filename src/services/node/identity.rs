//! Node hostname and control-plane name resolution

use super::{StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::utils::exec::run_checked;
use crate::utils::hostname::{get_current_hostname, is_valid_hostname, node_name};
use log::{info, warn};
use std::net::IpAddr;

pub const HOSTS_PATH: &str = "/etc/hosts";

pub fn hosts_entry(ip: IpAddr, alias: &str) -> String {
    format!("{} {}", ip, alias)
}

/// Append `entry` unless it is already there (substring match).
/// `None` means the file is already correct.
pub fn append_hosts_entry(hosts: &str, entry: &str) -> Option<String> {
    if hosts.contains(entry) {
        return None;
    }
    let mut updated = hosts.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    Some(updated)
}

/// Decide which hostname to set, if any
fn desired_hostname(ctx: &StepContext, current: &str) -> Result<Option<String>, ProvisionError> {
    if let Some(ref wanted) = ctx.config.hostname {
        if wanted == current {
            return Ok(None);
        }
        return Ok(Some(wanted.clone()));
    }

    if !ctx.config.hostname_placeholder.matches(current) {
        return Ok(None);
    }

    if ctx.exec.is_dry_run() {
        println!(
            "  [dry-run] hostname '{}' is a placeholder; would prompt for a replacement",
            current
        );
        return Ok(None);
    }

    let reply = ctx.prompt.ask(&format!(
        "Hostname '{}' is a placeholder. Enter a hostname for this node",
        current
    ))?;
    if reply.is_empty() {
        warn!("No replacement hostname given; keeping '{}'", current);
        println!("  ⚠ No hostname entered; keeping '{}'", current);
        return Ok(None);
    }
    if !is_valid_hostname(&reply) {
        return Err(ProvisionError::InvalidHostname(reply));
    }
    Ok(Some(reply))
}

/// Step 8
pub fn configure_host_identity(ctx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
    let exec = ctx.exec;

    let current = get_current_hostname(exec)?;
    let hostname = match desired_hostname(ctx, &current)? {
        Some(name) => {
            run_checked(exec, "hostnamectl", &["set-hostname", &name])?;
            println!("  ✓ Hostname changed from '{}' to '{}'", current, name);
            name
        }
        None => {
            println!("  ✓ Hostname: {}", current);
            current
        }
    };
    ctx.node_name = Some(node_name(&hostname));

    let entry = hosts_entry(ctx.config.control_plane_ip, &ctx.config.control_plane_alias);
    let hosts = if exec.file_exists(HOSTS_PATH)? {
        exec.read_file(HOSTS_PATH)?
    } else {
        String::new()
    };
    match append_hosts_entry(&hosts, &entry) {
        Some(updated) => {
            exec.write_file(HOSTS_PATH, updated.as_bytes())?;
            println!("  ✓ Added '{}' to {}", entry, HOSTS_PATH);
        }
        None => {
            info!("{} already maps the control plane", HOSTS_PATH);
            println!("  ✓ {} already contains '{}'", HOSTS_PATH, entry);
        }
    }

    Ok(StepOutcome::Success)
}
