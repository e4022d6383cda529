//! In-memory host, prompt and control plane for driving the sequencer
#![allow(dead_code)]

use anyhow::Result;
use knode::config::{ConfigLayer, NodeConfig};
use knode::error::RemoteError;
use knode::services::node::control_plane::ControlPlane;
use knode::utils::exec::CommandExecutor;
use knode::utils::prompt::Prompt;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};

pub const JOIN_LINE: &str = "kubeadm join 10.0.0.10:6443 --token abcdef.0123456789abcdef --discovery-token-ca-cert-hash sha256:1f2e3d4c";

pub const FSTAB: &str = "\
/dev/mapper/rl-root  /      xfs   defaults  0 0
/dev/mapper/rl-swap  none   swap  defaults  0 0
";

const CONTAINERD_DEFAULT: &str = "version = 2
[plugins.\"io.containerd.grpc.v1.cri\".containerd.runtimes.runc.options]
            SystemdCgroup = false
";

fn output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// A RHEL-like host that records every command instead of running it
pub struct FakeHost {
    pub files: RefCell<HashMap<String, String>>,
    pub commands: RefCell<Vec<String>>,
    pub hostname: RefCell<String>,
    pub containerd_state: RefCell<String>,
    /// Display forms passed alongside masked commands
    pub shown: RefCell<Vec<String>>,
    binaries: HashSet<String>,
    /// Command prefix -> (exit code, stderr)
    failures: RefCell<Vec<(String, i32, String)>>,
}

impl FakeHost {
    pub fn new(hostname: &str) -> Self {
        let mut files = HashMap::new();
        files.insert("/etc/fstab".to_string(), FSTAB.to_string());
        files.insert(
            "/etc/hosts".to_string(),
            "127.0.0.1 localhost localhost.localdomain\n".to_string(),
        );
        Self {
            files: RefCell::new(files),
            commands: RefCell::new(Vec::new()),
            hostname: RefCell::new(hostname.to_string()),
            containerd_state: RefCell::new("active".to_string()),
            shown: RefCell::new(Vec::new()),
            binaries: ["dnf", "systemctl", "hostname"]
                .into_iter()
                .map(String::from)
                .collect(),
            failures: RefCell::new(Vec::new()),
        }
    }

    /// Any command starting with `prefix` exits with `code`
    pub fn fail(&self, prefix: &str, code: i32, stderr: &str) {
        self.failures
            .borrow_mut()
            .push((prefix.to_string(), code, stderr.to_string()));
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.commands.borrow().iter().any(|c| c.starts_with(prefix))
    }

    fn run(&self, program: &str, args: &[&str]) -> Output {
        let line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        self.commands.borrow_mut().push(line.clone());

        if let Some((_, code, stderr)) = self
            .failures
            .borrow()
            .iter()
            .find(|(prefix, _, _)| line.starts_with(prefix.as_str()))
        {
            return output(*code, "", stderr);
        }

        match (program, args) {
            ("hostname", []) => output(0, &format!("{}\n", self.hostname.borrow()), ""),
            ("hostnamectl", ["set-hostname", name]) => {
                *self.hostname.borrow_mut() = name.to_string();
                output(0, "", "")
            }
            ("containerd", ["config", "default"]) => output(0, CONTAINERD_DEFAULT, ""),
            ("systemctl", ["is-active", "containerd"]) => {
                let state = self.containerd_state.borrow().clone();
                let code = if state == "active" { 0 } else { 3 };
                output(code, &format!("{}\n", state), "")
            }
            _ => output(0, "", ""),
        }
    }
}

impl CommandExecutor for FakeHost {
    fn execute(&self, program: &str, args: &[&str]) -> Result<Output> {
        Ok(self.run(program, args))
    }

    fn execute_interactive(&self, program: &str, args: &[&str]) -> Result<()> {
        let output = self.run(program, args);
        if !output.status.success() {
            anyhow::bail!(
                "Command '{}' failed with exit code: {}",
                program,
                output.status.code().unwrap_or(1)
            );
        }
        Ok(())
    }

    fn execute_interactive_masked(&self, program: &str, args: &[&str], shown: &str) -> Result<()> {
        self.shown.borrow_mut().push(shown.to_string());
        self.execute_interactive(program, args)
    }

    fn check_command_exists(&self, command: &str) -> Result<bool> {
        Ok(self.binaries.contains(command))
    }

    fn read_file(&self, path: &str) -> Result<String> {
        self.file(path)
            .ok_or_else(|| anyhow::anyhow!("Failed to read file: {}", path))
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.files.borrow_mut().insert(
            path.to_string(),
            String::from_utf8_lossy(content).into_owned(),
        );
        Ok(())
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.borrow().contains_key(path))
    }

    fn mkdir_p(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}

/// Replies in order, then empty strings
pub struct FakePrompt {
    replies: RefCell<VecDeque<String>>,
    pub questions: RefCell<Vec<String>>,
}

impl FakePrompt {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
            questions: RefCell::new(Vec::new()),
        }
    }
}

impl Prompt for FakePrompt {
    fn ask(&self, question: &str) -> Result<String> {
        self.questions.borrow_mut().push(question.to_string());
        Ok(self.replies.borrow_mut().pop_front().unwrap_or_default())
    }
}

pub enum FetchReply {
    Line(&'static str),
    Empty,
    Unreachable,
}

pub struct FakeControlPlane {
    reply: FetchReply,
    /// Number of `node_ready` calls answered `false` before `true`
    not_ready_polls: Cell<usize>,
    pub fetches: Cell<usize>,
}

impl FakeControlPlane {
    pub fn new(reply: FetchReply) -> Self {
        Self {
            reply,
            not_ready_polls: Cell::new(0),
            fetches: Cell::new(0),
        }
    }

    pub fn not_ready_for(self, polls: usize) -> Self {
        self.not_ready_polls.set(polls);
        self
    }
}

impl ControlPlane for FakeControlPlane {
    fn fetch_join_command(&self) -> Result<Option<String>, RemoteError> {
        self.fetches.set(self.fetches.get() + 1);
        match self.reply {
            FetchReply::Line(line) => Ok(Some(line.to_string())),
            FetchReply::Empty => Ok(None),
            FetchReply::Unreachable => Err(RemoteError::Unreachable {
                host: "root@10.0.0.10".to_string(),
                reason: "Connection refused".to_string(),
            }),
        }
    }

    fn node_ready(&self, _node_name: &str) -> Result<bool, RemoteError> {
        let left = self.not_ready_polls.get();
        if left > 0 {
            self.not_ready_polls.set(left - 1);
            return Ok(false);
        }
        Ok(true)
    }
}

/// A resolved config that never sleeps: the registration wait gives up after
/// its first poll and the settle delay is zero
pub fn node_config() -> NodeConfig {
    NodeConfig::resolve(ConfigLayer {
        k8s_version: Some("v1.29".to_string()),
        control_plane_ip: Some("10.0.0.10".to_string()),
        registration_timeout_secs: Some(0),
        registration_poll_secs: Some(1),
        settle_secs: Some(0),
        ..Default::default()
    })
    .unwrap()
}
