//! The remote side of a join: the control-plane host

use crate::config::NodeConfig;
use crate::error::RemoteError;
use crate::utils::ssh::SshConnection;
use anyhow::{Context, Result};
use log::debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub const API_SERVER_PORT: u16 = 6443;
const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";

/// What the join step needs from the control plane
pub trait ControlPlane {
    /// A fresh `kubeadm join ...` line. `Ok(None)` means the control plane
    /// answered but printed nothing.
    fn fetch_join_command(&self) -> Result<Option<String>, RemoteError>;

    /// Whether `node_name` is registered with a `Ready` condition of `True`
    fn node_ready(&self, node_name: &str) -> Result<bool, RemoteError>;
}

/// Control plane reached over SSH with key authentication
pub struct SshControlPlane {
    conn: SshConnection,
}

impl SshControlPlane {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            conn: SshConnection::new(
                &config.ssh_user,
                &config.control_plane_ip.to_string(),
                config.remote_timeout,
            ),
        }
    }

    pub fn host(&self) -> &str {
        self.conn.host()
    }

    /// Whether non-interactive SSH works at all
    pub fn check_access(&self) -> bool {
        self.conn.check_key_auth()
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String, RemoteError> {
        let output = self.conn.execute_simple(program, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!("{} on {} failed: {}", program, self.conn.host(), stderr);
            return Err(RemoteError::CommandFailed {
                host: self.conn.host().to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ControlPlane for SshControlPlane {
    fn fetch_join_command(&self) -> Result<Option<String>, RemoteError> {
        let stdout = self.run("kubeadm", &["token", "create", "--print-join-command"])?;
        Ok(extract_join_line(&stdout))
    }

    fn node_ready(&self, node_name: &str) -> Result<bool, RemoteError> {
        let stdout = self.run(
            "kubectl",
            &[
                "--kubeconfig",
                ADMIN_KUBECONFIG,
                "get",
                "node",
                node_name,
                "--ignore-not-found",
                "-o",
                "json",
            ],
        )?;
        // --ignore-not-found prints nothing for a node that has not registered yet
        if stdout.trim().is_empty() {
            return Ok(false);
        }
        Ok(parse_node_ready(&stdout).unwrap_or_else(|e| {
            debug!("Unreadable node status for {}: {:#}", node_name, e);
            false
        }))
    }
}

/// Pick the `kubeadm join` line out of the remote output
pub fn extract_join_line(stdout: &str) -> Option<String> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .find(|l| l.starts_with("kubeadm join"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
}

/// Read the `Ready` condition from `kubectl get node -o json`
pub fn parse_node_ready(json: &str) -> Result<bool> {
    let node: serde_json::Value =
        serde_json::from_str(json).context("Failed to parse node JSON")?;
    let conditions = node
        .pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .context("Node JSON has no status.conditions")?;
    Ok(conditions.iter().any(|c| {
        c.get("type").and_then(|t| t.as_str()) == Some("Ready")
            && c.get("status").and_then(|s| s.as_str()) == Some("True")
    }))
}

/// GET `/readyz` on the API server. Certificates are not verified: the
/// cluster CA is not on this host until the join has run.
pub fn probe_api_server(ip: IpAddr, timeout: Duration) -> Result<String> {
    let url = format!("https://{}/readyz", SocketAddr::new(ip, API_SERVER_PORT));
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
        .context("Failed to create HTTP client")?;

    let body = client
        .get(&url)
        .send()
        .with_context(|| format!("Failed to reach {}", url))?
        .error_for_status()
        .with_context(|| format!("API server at {} is not ready", url))?
        .text()
        .context("Failed to read API server response")?;
    Ok(body.trim().to_string())
}
