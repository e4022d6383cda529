use super::NodeArgs;
use anyhow::Result;
use knode::config;
use knode::services::node::control_plane::{API_SERVER_PORT, SshControlPlane, probe_api_server};
use knode::utils::exec::{CommandExecutor, Executor, PackageManager, local};
use std::path::Path;

const SWAPS_PATH: &str = "/proc/swaps";

/// Handle preflight command
pub fn handle_preflight(node: &NodeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config(node.to_layer(), config_path)?;
    let exec = Executor::DryRun;
    let mut failures = 0;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Preflight Checks");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    println!("Local host:");
    if cfg!(target_os = "linux") {
        println!("  ✓ Linux ({})", whoami::distro());
    } else {
        println!("  ✗ Worker nodes must run Linux");
        failures += 1;
    }

    let user = whoami::username();
    if local::is_root() {
        println!("  ✓ Running as root");
    } else if exec.check_command_exists("sudo")? {
        println!("  ✓ Running as {} (privileged commands will use sudo)", user);
    } else {
        println!("  ✗ Running as {} without sudo", user);
        failures += 1;
    }

    let package_manager = PackageManager::detect(&exec)?;
    if package_manager == PackageManager::Unknown {
        println!("  ✗ No supported package manager (need dnf or yum)");
        failures += 1;
    } else {
        println!("  ✓ Package manager: {}", package_manager.display_name());
    }

    match exec.read_file(SWAPS_PATH) {
        Ok(swaps) if swaps.lines().skip(1).any(|l| !l.trim().is_empty()) => {
            println!("  ⚠ Swap is active (step 1 will disable it)")
        }
        Ok(_) => println!("  ✓ Swap is off"),
        Err(_) => println!("  ⚠ Could not read {}", SWAPS_PATH),
    }

    for binary in ["containerd", "kubeadm", "kubelet"] {
        if exec.check_command_exists(binary)? {
            println!("  ⚠ {} already installed", binary);
        } else {
            println!("  ✓ {} not installed yet", binary);
        }
    }

    println!();
    println!("Control plane ({}):", config.control_plane_ip);
    let control_plane = SshControlPlane::new(&config);
    if control_plane.check_access() {
        println!("  ✓ SSH key access as {}", control_plane.host());
    } else {
        // Not fatal: the join step falls back to asking for the command
        println!(
            "  ⚠ No SSH key access as {}; the join command will be requested interactively",
            control_plane.host()
        );
    }

    match probe_api_server(config.control_plane_ip, config.remote_timeout) {
        Ok(body) => println!("  ✓ API server on port {} reports '{}'", API_SERVER_PORT, body),
        Err(e) => {
            println!("  ✗ API server not reachable: {:#}", e);
            failures += 1;
        }
    }

    println!();
    if failures > 0 {
        anyhow::bail!("{} preflight check(s) failed", failures);
    }
    println!("✓ Ready to provision");
    Ok(())
}
