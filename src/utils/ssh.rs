use crate::error::RemoteError;
use log::debug;
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// ssh exits with 255 when the connection itself failed
const SSH_CONNECTION_FAILURE: i32 = 255;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Non-interactive SSH connection to the control plane
pub struct SshConnection {
    pub(crate) host: String,
    timeout: Duration,
}

impl SshConnection {
    /// `timeout` bounds both the TCP connect and the whole remote command
    pub fn new(user: &str, address: &str, timeout: Duration) -> Self {
        Self {
            host: format!("{}@{}", user, address),
            timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn build_ssh_args(&self) -> Vec<String> {
        let connect_secs = self.timeout.as_secs().max(1);
        vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(), // never prompt; a password-only host counts as unreachable
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_secs),
            "-o".to_string(),
            "PreferredAuthentications=publickey".to_string(),
            self.host.clone(),
        ]
    }

    /// Test if key-based auth works
    pub fn check_key_auth(&self) -> bool {
        self.execute_simple("true", &[])
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Run a command on the remote host, killing it when the deadline passes.
    ///
    /// A non-zero exit of the remote command is returned as `Ok`; only the
    /// channel failing (spawn error, exit 255, timeout) is an `Err`.
    pub fn execute_simple(&self, program: &str, args: &[&str]) -> Result<Output, RemoteError> {
        let mut ssh_args = self.build_ssh_args();
        ssh_args.push(program.to_string());
        for arg in args {
            ssh_args.push(shell_escape(arg));
        }
        debug!("ssh {}", ssh_args.join(" "));

        let child = Command::new("ssh")
            .args(&ssh_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| RemoteError::Unreachable {
                host: self.host.clone(),
                reason: format!("failed to spawn ssh: {}", e),
            })?;

        let output = self.wait_with_deadline(child)?;
        if output.status.code() == Some(SSH_CONNECTION_FAILURE) {
            return Err(RemoteError::Unreachable {
                host: self.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn wait_with_deadline(&self, mut child: Child) -> Result<Output, RemoteError> {
        // Pipes are drained on their own threads; a full pipe would stall the child
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RemoteError::TimedOut {
                        host: self.host.clone(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(RemoteError::Unreachable {
                        host: self.host.clone(),
                        reason: format!("failed to wait for ssh: {}", e),
                    });
                }
            }
        };

        Ok(Output {
            status,
            stdout: stdout.map(join_drain).unwrap_or_default(),
            stderr: stderr.map(join_drain).unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

/// Escape a string for safe use in the remote shell command line
fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    // If string contains no special characters, return as-is
    if s.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '/' || c == '.' || c == '=')
    {
        return s.to_string();
    }

    // Escape single quotes by ending quote, adding escaped quote, starting new quote
    let escaped = s.replace('\'', "'\"'\"'");
    format!("'{}'", escaped)
}
