//! Failure kinds for the provisioning sequence and the control-plane channel

use std::time::Duration;
use thiserror::Error;

/// Why a step could not complete. Every variant halts the sequencer.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("command `{command}` failed (exit code {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("service {service} is not active (state: {state})")]
    ServiceInactive { service: String, state: String },

    #[error("no join command obtained from the control plane or the operator")]
    EmptyJoinCommand,

    #[error("invalid join command: {0}")]
    InvalidJoinCommand(String),

    #[error("invalid hostname '{0}': must be a valid RFC 1123 hostname")]
    InvalidHostname(String),

    #[error("no supported package manager found (need dnf or yum)")]
    UnsupportedPackageManager,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProvisionError {
    /// Build a `CommandFailed` from a finished process
    pub fn command_failed(command: &str, output: &std::process::Output) -> Self {
        ProvisionError::CommandFailed {
            command: command.to_string(),
            code: output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Failures of the remote control-plane channel.
///
/// Kept apart from an empty-but-successful reply so callers can tell
/// "unreachable" from "returned nothing".
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("control plane {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    #[error("remote command on {host} timed out after {timeout:?}")]
    TimedOut { host: String, timeout: Duration },

    #[error("remote command on {host} failed (exit code {code}): {stderr}")]
    CommandFailed {
        host: String,
        code: i32,
        stderr: String,
    },
}
