//! Cluster join: obtain a join command, run it, wait for the node to register

use super::control_plane::ControlPlane;
use super::{StepContext, StepOutcome};
use crate::error::ProvisionError;
use crate::utils::hostname::{get_current_hostname, node_name};
use crate::utils::prompt::Prompt;
use log::{debug, info, warn};
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

/// Characters that only appear in a pasted join command by mistake
const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '`', '$', '<', '>', '(', ')'];

/// A parsed `kubeadm join` invocation. Holds a live credential: never logged
/// in full and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinCommand {
    endpoint: String,
    token: String,
    /// Everything after `kubeadm`, in order
    args: Vec<String>,
}

impl JoinCommand {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Arguments for the `kubeadm` binary
    pub fn argv(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

impl FromStr for JoinCommand {
    type Err = ProvisionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ProvisionError::InvalidJoinCommand(reason.to_string());

        if raw.contains(SHELL_METACHARACTERS) {
            return Err(invalid("contains shell metacharacters"));
        }
        // Tolerate a pasted line continuation
        let words: Vec<&str> = raw
            .split_whitespace()
            .filter(|w| *w != "\\")
            .collect();

        match words.as_slice() {
            ["kubeadm", "join", endpoint, ..] if !endpoint.starts_with('-') => {
                let mut token = None;
                let mut discovery = false;
                let mut iter = words.iter().skip(3);
                while let Some(word) = iter.next() {
                    match *word {
                        "--token" => token = iter.next().map(|t| t.to_string()),
                        w if w.starts_with("--token=") => {
                            token = Some(w["--token=".len()..].to_string())
                        }
                        "--discovery-token-ca-cert-hash"
                        | "--discovery-token-unsafe-skip-ca-verification" => discovery = true,
                        w if w.starts_with("--discovery-token-ca-cert-hash=") => discovery = true,
                        _ => {}
                    }
                }

                let token = token
                    .filter(|t| !t.is_empty() && !t.starts_with('-'))
                    .ok_or_else(|| invalid("missing --token"))?;
                if !discovery {
                    return Err(invalid(
                        "missing --discovery-token-ca-cert-hash (or --discovery-token-unsafe-skip-ca-verification)",
                    ));
                }

                Ok(JoinCommand {
                    endpoint: endpoint.to_string(),
                    token,
                    args: words[1..].iter().map(|w| w.to_string()).collect(),
                })
            }
            _ => Err(invalid("expected 'kubeadm join <endpoint> ...'")),
        }
    }
}

/// Renders with the token secret masked
impl fmt::Display for JoinCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = redact_token(&self.token);
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if a == &self.token {
                    masked.clone()
                } else if a.starts_with("--token=") {
                    format!("--token={}", masked)
                } else {
                    a.clone()
                }
            })
            .collect();
        write!(f, "kubeadm {}", args.join(" "))
    }
}

impl fmt::Debug for JoinCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinCommand({})", self)
    }
}

/// kubeadm tokens are `<id>.<secret>`; the id is safe to show
fn redact_token(token: &str) -> String {
    match token.split_once('.') {
        Some((id, _)) => format!("{}.****************", id),
        None => "********".to_string(),
    }
}

/// Where the join command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSource {
    ControlPlane,
    Operator,
}

/// Remote first; operator prompt when the remote path fails, is empty, or is unusable
pub fn obtain_join_command(
    control_plane: &dyn ControlPlane,
    prompt: &dyn Prompt,
) -> Result<(JoinCommand, JoinSource), ProvisionError> {
    match control_plane.fetch_join_command() {
        Ok(Some(line)) => match line.parse::<JoinCommand>() {
            Ok(command) => {
                println!("  ✓ Join command retrieved from control plane");
                return Ok((command, JoinSource::ControlPlane));
            }
            Err(e) => {
                warn!("Control plane returned an unusable join command: {}", e);
                println!("  ⚠ Control plane returned an unusable join command");
            }
        },
        Ok(None) => {
            println!("  ⚠ Control plane returned no join command");
        }
        Err(e) => {
            debug!("Remote join command retrieval failed: {}", e);
            println!("  ⚠ Could not retrieve a join command from the control plane");
        }
    }

    let reply = prompt.ask(
        "Paste the join command (run 'kubeadm token create --print-join-command' on the control plane)",
    )?;
    if reply.is_empty() {
        return Err(ProvisionError::EmptyJoinCommand);
    }
    let command = reply.parse::<JoinCommand>()?;
    Ok((command, JoinSource::Operator))
}

/// How the post-join wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Ready { after: Duration },
    TimedOut,
    /// The control plane could not be asked; waited the settle delay instead
    Unverified,
}

/// Poll the control plane until the node is Ready or `timeout` passes
pub fn wait_for_registration(
    control_plane: &dyn ControlPlane,
    node: &str,
    timeout: Duration,
    poll: Duration,
    settle: Duration,
) -> Registration {
    let started = Instant::now();
    let mut answered = false;

    loop {
        match control_plane.node_ready(node) {
            Ok(true) => {
                return Registration::Ready {
                    after: started.elapsed(),
                };
            }
            Ok(false) => answered = true,
            Err(e) if !answered => {
                debug!("Cannot query node status: {}", e);
                thread::sleep(settle);
                return Registration::Unverified;
            }
            Err(e) => debug!("Node status query failed, retrying: {}", e),
        }

        if started.elapsed() >= timeout {
            return Registration::TimedOut;
        }
        thread::sleep(poll);
    }
}

/// Step 9
pub fn join_cluster(ctx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
    if ctx.exec.is_dry_run() {
        // kubeadm token create mints a real credential on the control plane
        return Ok(StepOutcome::Skipped(
            "dry run: join command not requested".to_string(),
        ));
    }

    let (command, source) = obtain_join_command(ctx.control_plane, ctx.prompt)?;
    info!("Joining {} with a join command from {:?}", command.endpoint(), source);
    println!("  Joining cluster at {}", command.endpoint());
    println!("  Command: {}", command);

    let shown = command.to_string();
    if let Err(e) = ctx
        .exec
        .execute_interactive_masked("kubeadm", &command.argv(), &shown)
    {
        println!("  ✗ kubeadm join failed");
        return Err(ProvisionError::Other(anyhow::anyhow!(
            "kubeadm join failed: {:#}",
            e
        )));
    }
    drop(command);
    println!("  ✓ kubeadm join completed");

    let node = match ctx.node_name.clone() {
        Some(node) => node,
        None => node_name(&get_current_hostname(ctx.exec)?),
    };
    let config = ctx.config;
    println!("  Waiting for node '{}' to register...", node);
    match wait_for_registration(
        ctx.control_plane,
        &node,
        config.registration_timeout,
        config.registration_poll,
        config.settle_delay,
    ) {
        Registration::Ready { after } => {
            println!("  ✓ Node '{}' is Ready ({}s)", node, after.as_secs())
        }
        Registration::TimedOut => {
            warn!("Node {} not Ready after {:?}", node, config.registration_timeout);
            println!(
                "  ⚠ Node '{}' not Ready after {}s; check 'kubectl get nodes' on the control plane",
                node,
                config.registration_timeout.as_secs()
            );
        }
        Registration::Unverified => {
            println!(
                "  ⚠ Could not query the control plane; registration not verified (waited {}s)",
                config.settle_delay.as_secs()
            );
        }
    }

    Ok(StepOutcome::Success)
}
