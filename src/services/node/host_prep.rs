//! Swap, firewall and kernel prerequisites

use super::{StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::utils::exec::run_checked;
use anyhow::Context;
use log::warn;

pub const FSTAB_PATH: &str = "/etc/fstab";
pub const MODULES_LOAD_PATH: &str = "/etc/modules-load.d/k8s.conf";
pub const SYSCTL_PATH: &str = "/etc/sysctl.d/k8s.conf";

pub const KERNEL_MODULES: [&str; 2] = ["overlay", "br_netfilter"];

pub const SYSCTL_PARAMS: [(&str, &str); 3] = [
    ("net.bridge.bridge-nf-call-iptables", "1"),
    ("net.bridge.bridge-nf-call-ip6tables", "1"),
    ("net.ipv4.ip_forward", "1"),
];

/// Step 1. A firewalld failure is tolerated; a swap failure is not.
pub fn disable_swap_and_firewall(ctx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
    let exec = ctx.exec;

    match exec.execute("systemctl", &["disable", "--now", "firewalld"]) {
        Ok(output) if output.status.success() => println!("  ✓ firewalld stopped and disabled"),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Disabling firewalld failed: {}", stderr.trim());
            println!("  ⚠ Could not disable firewalld (continuing): {}", stderr.trim());
        }
        Err(e) => {
            warn!("Disabling firewalld failed: {:#}", e);
            println!("  ⚠ Could not disable firewalld (continuing)");
        }
    }

    run_checked(exec, "swapoff", &["-a"])?;
    println!("  ✓ Swap turned off");

    if !exec.file_exists(FSTAB_PATH)? {
        println!("  ⚠ {} not found; nothing to persist", FSTAB_PATH);
        return Ok(StepOutcome::Success);
    }

    let fstab = exec.read_file(FSTAB_PATH)?;
    let (updated, commented) = comment_out_swap_entries(&fstab);
    if commented == 0 {
        println!("  ✓ No active swap entries in {}", FSTAB_PATH);
        return Ok(StepOutcome::Success);
    }

    let backup = format!(
        "{}.knode-{}",
        FSTAB_PATH,
        chrono::Local::now().format("%Y%m%d%H%M%S")
    );
    exec.write_file(&backup, fstab.as_bytes())
        .with_context(|| format!("Failed to back up {}", FSTAB_PATH))?;
    exec.write_file(FSTAB_PATH, updated.as_bytes())?;
    println!(
        "  ✓ Commented out {} swap entr{} in {} (backup: {})",
        commented,
        if commented == 1 { "y" } else { "ies" },
        FSTAB_PATH,
        backup
    );

    Ok(StepOutcome::Success)
}

/// Prefix every active swap mount with `#`. Returns the new text and how many
/// lines changed; comments and other mounts pass through untouched.
pub fn comment_out_swap_entries(fstab: &str) -> (String, usize) {
    let mut commented = 0;
    let mut lines: Vec<String> = Vec::new();

    for line in fstab.lines() {
        let trimmed = line.trim_start();
        let is_swap = !trimmed.starts_with('#')
            && trimmed.split_whitespace().nth(2) == Some("swap");
        if is_swap {
            commented += 1;
            lines.push(format!("#{}", line));
        } else {
            lines.push(line.to_string());
        }
    }

    let mut out = lines.join("\n");
    if fstab.ends_with('\n') {
        out.push('\n');
    }
    (out, commented)
}

pub fn modules_load_conf() -> String {
    KERNEL_MODULES
        .iter()
        .map(|m| format!("{}\n", m))
        .collect()
}

pub fn sysctl_conf() -> String {
    SYSCTL_PARAMS
        .iter()
        .map(|(key, value)| format!("{} = {}\n", key, value))
        .collect()
}

/// Step 2
pub fn configure_kernel_prerequisites(
    ctx: &mut StepContext,
) -> Result<StepOutcome, ProvisionError> {
    let exec = ctx.exec;

    exec.mkdir_p("/etc/modules-load.d")?;
    exec.write_file(MODULES_LOAD_PATH, modules_load_conf().as_bytes())?;
    for module in KERNEL_MODULES {
        run_checked(exec, "modprobe", &[module])?;
    }
    println!("  ✓ Kernel modules loaded: {}", KERNEL_MODULES.join(", "));

    exec.mkdir_p("/etc/sysctl.d")?;
    exec.write_file(SYSCTL_PATH, sysctl_conf().as_bytes())?;
    run_checked(exec, "sysctl", &["--system"])?;
    println!("  ✓ Network sysctls applied");

    Ok(StepOutcome::Success)
}
