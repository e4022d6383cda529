use crate::error::ProvisionError;
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Output, Stdio};

/// Local command execution helpers
pub mod local {
    use super::*;

    pub fn execute(program: &str, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdout(Stdio::piped()); // Capture stdout for parsing
        cmd.stderr(Stdio::piped()); // Capture stderr for error messages
        cmd.stdin(Stdio::null());
        cmd.env("SYSTEMD_PAGER", "cat");
        cmd.output()
            .with_context(|| format!("Failed to execute command: {}", program))
    }

    pub fn execute_interactive(program: &str, args: &[&str]) -> Result<()> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .env("SYSTEMD_PAGER", "cat")
            .status()
            .with_context(|| format!("Failed to execute command: {}", program))?;
        if !status.success() {
            anyhow::bail!(
                "Command '{}' failed with exit code: {}",
                program,
                status.code().unwrap_or(1)
            );
        }
        Ok(())
    }

    /// Check if a command exists using native Rust (which crate)
    pub fn check_command_exists(command: &str) -> bool {
        which::which(command).is_ok()
    }

    pub fn read_file(path: impl AsRef<std::path::Path>) -> Result<String> {
        let path_ref = path.as_ref();
        std::fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read file: {}", path_ref.display()))
    }

    /// True when the effective user is root
    pub fn is_root() -> bool {
        nix::unistd::geteuid().is_root()
    }

    /// Write through `sudo tee` so unprivileged runs can still touch /etc
    pub fn sudo_write(path: &str, content: &[u8]) -> Result<()> {
        let mut child = Command::new("sudo")
            .args(["tee", path])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn sudo command for writing file")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content)?;
            stdin.flush()?;
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to write file: {}", path))?;
        if !status.success() {
            anyhow::bail!("Failed to write file: {}", path);
        }
        Ok(())
    }
}

/// Trait for executing commands against the host being provisioned
pub trait CommandExecutor {
    /// Execute a command that changes host state, capturing its output
    fn execute(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Execute a read-only command. Runs even when mutations are suppressed.
    fn query(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.execute(program, args)
    }

    /// Execute a command with the terminal attached
    fn execute_interactive(&self, program: &str, args: &[&str]) -> Result<()>;

    /// Like `execute_interactive`, but only `shown` is ever printed or logged.
    /// For argv carrying a credential.
    fn execute_interactive_masked(&self, program: &str, args: &[&str], shown: &str) -> Result<()> {
        let _ = shown;
        self.execute_interactive(program, args)
    }

    /// Check if a command exists
    fn check_command_exists(&self, command: &str) -> Result<bool>;

    /// Read a file
    fn read_file(&self, path: &str) -> Result<String>;

    /// Write a file, replacing its contents
    fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Check if file exists
    fn file_exists(&self, path: &str) -> Result<bool>;

    /// Create directory recursively
    fn mkdir_p(&self, path: &str) -> Result<()>;

    /// Whether mutations are only printed
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Executor for the local host
pub enum Executor {
    /// Run for real, prefixing `sudo` when not already root
    Local { sudo: bool },
    /// Print mutations instead of running them
    DryRun,
}

impl Executor {
    /// Local executor, with sudo only if the effective user is not root
    pub fn local() -> Self {
        let sudo = !local::is_root();
        if sudo {
            info!("Not running as root; privileged commands will use sudo");
        }
        Executor::Local { sudo }
    }

    fn argv<'a>(&self, program: &'a str, args: &[&'a str]) -> (&'a str, Vec<&'a str>) {
        match self {
            Executor::Local { sudo: true } => {
                let mut full = vec![program];
                full.extend_from_slice(args);
                ("sudo", full)
            }
            _ => (program, args.to_vec()),
        }
    }
}

/// A successful, empty result for commands that were not run
pub fn synthetic_success() -> Output {
    Output {
        status: ExitStatus::from_raw(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

impl CommandExecutor for Executor {
    fn execute(&self, program: &str, args: &[&str]) -> Result<Output> {
        match self {
            Executor::DryRun => {
                println!("  [dry-run] {} {}", program, args.join(" "));
                Ok(synthetic_success())
            }
            Executor::Local { .. } => {
                let (program, args) = self.argv(program, args);
                debug!("exec: {} {}", program, args.join(" "));
                local::execute(program, &args)
            }
        }
    }

    fn query(&self, program: &str, args: &[&str]) -> Result<Output> {
        match self {
            Executor::DryRun => {
                if local::check_command_exists(program) {
                    debug!("query: {} {}", program, args.join(" "));
                    local::execute(program, args)
                } else {
                    println!("  [dry-run] {} {} (not installed yet)", program, args.join(" "));
                    Ok(synthetic_success())
                }
            }
            Executor::Local { .. } => self.execute(program, args),
        }
    }

    fn execute_interactive(&self, program: &str, args: &[&str]) -> Result<()> {
        match self {
            Executor::DryRun => {
                println!("  [dry-run] {} {}", program, args.join(" "));
                Ok(())
            }
            Executor::Local { .. } => {
                let (program, args) = self.argv(program, args);
                debug!("exec (interactive): {} {}", program, args.join(" "));
                local::execute_interactive(program, &args)
            }
        }
    }

    fn execute_interactive_masked(&self, program: &str, args: &[&str], shown: &str) -> Result<()> {
        match self {
            Executor::DryRun => {
                println!("  [dry-run] {}", shown);
                Ok(())
            }
            Executor::Local { sudo } => {
                let (program, args) = self.argv(program, args);
                debug!(
                    "exec (interactive): {}{}",
                    if *sudo { "sudo " } else { "" },
                    shown
                );
                local::execute_interactive(program, &args)
            }
        }
    }

    fn check_command_exists(&self, command: &str) -> Result<bool> {
        Ok(local::check_command_exists(command))
    }

    fn read_file(&self, path: &str) -> Result<String> {
        local::read_file(path)
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        match self {
            Executor::DryRun => {
                println!("  [dry-run] write {} ({} bytes)", path, content.len());
                debug!("{}:\n{}", path, String::from_utf8_lossy(content));
                Ok(())
            }
            Executor::Local { sudo: true } => {
                debug!("write (sudo tee): {}", path);
                local::sudo_write(path, content)
            }
            Executor::Local { sudo: false } => {
                debug!("write: {}", path);
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write file: {}", path))
            }
        }
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(std::path::Path::new(path).is_file())
    }

    fn mkdir_p(&self, path: &str) -> Result<()> {
        match self {
            Executor::DryRun => {
                println!("  [dry-run] mkdir -p {}", path);
                Ok(())
            }
            Executor::Local { sudo: true } => {
                let output = local::execute("sudo", &["mkdir", "-p", path])?;
                if !output.status.success() {
                    anyhow::bail!("Failed to create directory: {}", path);
                }
                Ok(())
            }
            Executor::Local { sudo: false } => std::fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path)),
        }
    }

    fn is_dry_run(&self) -> bool {
        matches!(self, Executor::DryRun)
    }
}

/// Run a state-changing command and treat a non-zero exit as a step failure
pub fn run_checked(
    exec: &dyn CommandExecutor,
    program: &str,
    args: &[&str],
) -> Result<Output, ProvisionError> {
    let output = exec.execute(program, args)?;
    if !output.status.success() {
        let command = format!("{} {}", program, args.join(" "));
        return Err(ProvisionError::command_failed(&command, &output));
    }
    Ok(output)
}

/// `systemctl is-active` state of a unit ("active", "inactive", "failed", ...)
pub fn service_state(exec: &dyn CommandExecutor, unit: &str) -> Result<String> {
    // is-active exits non-zero for anything but active; the state is still on stdout
    let output = exec.query("systemctl", &["is-active", unit])?;
    let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if state.is_empty() {
        Ok("unknown".to_string())
    } else {
        Ok(state)
    }
}

/// Package manager types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Dnf,
    Yum,
    Unknown,
}

impl PackageManager {
    /// Detect the package manager available on the system
    pub fn detect(exec: &dyn CommandExecutor) -> Result<Self> {
        if exec.check_command_exists("dnf")? {
            Ok(PackageManager::Dnf)
        } else if exec.check_command_exists("yum")? {
            Ok(PackageManager::Yum)
        } else {
            Ok(PackageManager::Unknown)
        }
    }

    fn program(&self) -> Result<&'static str, ProvisionError> {
        match self {
            PackageManager::Dnf => Ok("dnf"),
            PackageManager::Yum => Ok("yum"),
            PackageManager::Unknown => Err(ProvisionError::UnsupportedPackageManager),
        }
    }

    /// Install packages, passing `extra` flags through (e.g. `--disableexcludes`)
    pub fn install_packages(
        &self,
        exec: &dyn CommandExecutor,
        packages: &[&str],
        extra: &[&str],
    ) -> Result<(), ProvisionError> {
        let program = self.program()?;
        let mut args = vec!["install", "-y"];
        args.extend_from_slice(packages);
        args.extend_from_slice(extra);
        let output = run_checked(exec, program, &args)?;
        debug!("{}", String::from_utf8_lossy(&output.stdout));
        Ok(())
    }

    /// Register an external `.repo` file by URL
    pub fn add_repo(&self, exec: &dyn CommandExecutor, url: &str) -> Result<(), ProvisionError> {
        match self {
            PackageManager::Dnf => run_checked(exec, "dnf", &["config-manager", "--add-repo", url])?,
            PackageManager::Yum => run_checked(exec, "yum-config-manager", &["--add-repo", url])?,
            PackageManager::Unknown => return Err(ProvisionError::UnsupportedPackageManager),
        };
        Ok(())
    }

    /// Get display name for the package manager
    pub fn display_name(&self) -> &'static str {
        match self {
            PackageManager::Dnf => "dnf (Fedora/RHEL 8+)",
            PackageManager::Yum => "yum (RHEL/CentOS 7)",
            PackageManager::Unknown => "unknown",
        }
    }
}
