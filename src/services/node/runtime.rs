//! containerd installation and configuration

use super::{StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::utils::exec::{run_checked, service_state};
use anyhow::Context;
use log::warn;
use regex::Regex;

pub const DOCKER_CE_REPO_URL: &str = "https://download.docker.com/linux/centos/docker-ce.repo";
pub const CONTAINERD_PACKAGE: &str = "containerd.io";
pub const CONTAINERD_CONFIG_PATH: &str = "/etc/containerd/config.toml";
const CONTAINERD_SERVICE: &str = "containerd";

/// Flip the runc `SystemdCgroup` option to true. Returns the new config and
/// whether anything changed (an already-patched config is left alone).
pub fn enable_systemd_cgroup(config: &str) -> anyhow::Result<(String, bool)> {
    let pattern = Regex::new(r"(?m)^(\s*SystemdCgroup\s*=\s*)false\s*$")
        .context("Failed to compile SystemdCgroup pattern")?;
    let changed = pattern.is_match(config);
    Ok((pattern.replace_all(config, "${1}true").into_owned(), changed))
}

/// Step 5. The only step that checks its own post-condition.
pub fn setup_container_runtime(ctx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
    let exec = ctx.exec;
    let pm = ctx.package_manager;

    pm.add_repo(exec, DOCKER_CE_REPO_URL)?;
    println!("  ✓ Docker CE repository registered");

    pm.install_packages(exec, &[CONTAINERD_PACKAGE], &[])?;
    println!("  ✓ {} installed", CONTAINERD_PACKAGE);

    let output = exec.query("containerd", &["config", "default"])?;
    if !output.status.success() {
        return Err(ProvisionError::command_failed("containerd config default", &output));
    }
    let default_config = String::from_utf8_lossy(&output.stdout);
    let (config, changed) = enable_systemd_cgroup(&default_config)?;
    if changed {
        println!("  ✓ SystemdCgroup enabled");
    } else if !exec.is_dry_run() {
        warn!("SystemdCgroup = false not found in the default containerd config");
        println!("  ⚠ SystemdCgroup setting not found; config written unchanged");
    }

    exec.mkdir_p("/etc/containerd")?;
    exec.write_file(CONTAINERD_CONFIG_PATH, config.as_bytes())?;

    run_checked(exec, "systemctl", &["restart", CONTAINERD_SERVICE])?;
    run_checked(exec, "systemctl", &["enable", CONTAINERD_SERVICE])?;

    if exec.is_dry_run() {
        println!("  [dry-run] would verify {} is active", CONTAINERD_SERVICE);
        return Ok(StepOutcome::Success);
    }

    let state = service_state(exec, CONTAINERD_SERVICE)?;
    if state != "active" {
        println!("  ✗ {} is not running (state: {})", CONTAINERD_SERVICE, state);
        if let Ok(status) = exec.query("systemctl", &["status", CONTAINERD_SERVICE, "--no-pager"]) {
            for line in String::from_utf8_lossy(&status.stdout).lines() {
                println!("    {}", line);
            }
        }
        return Err(ProvisionError::ServiceInactive {
            service: CONTAINERD_SERVICE.to_string(),
            state,
        });
    }
    println!("  ✓ {} is active", CONTAINERD_SERVICE);

    Ok(StepOutcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_CONFIG: &str = r#"version = 2
[plugins."io.containerd.grpc.v1.cri".containerd.runtimes.runc.options]
            BinaryName = ""
            SystemdCgroup = false
"#;

    #[test]
    fn test_enable_systemd_cgroup() {
        let (patched, changed) = enable_systemd_cgroup(DEFAULT_CONFIG).unwrap();
        assert!(changed);
        assert!(patched.contains("            SystemdCgroup = true\n"));
        assert!(!patched.contains("SystemdCgroup = false"));
        assert!(patched.contains("BinaryName = \"\""));
    }

    #[test]
    fn test_enable_systemd_cgroup_is_idempotent() {
        let (once, _) = enable_systemd_cgroup(DEFAULT_CONFIG).unwrap();
        let (twice, changed) = enable_systemd_cgroup(&once).unwrap();
        assert!(!changed);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_other_false_settings_untouched() {
        let config = "  SystemdCgroupX = false\n  NoPivotRoot = false\n";
        let (patched, changed) = enable_systemd_cgroup(config).unwrap();
        assert!(!changed);
        assert_eq!(patched, config);
    }
}
