use crate::utils::hostname::{self, DEFAULT_PLACEHOLDER_PATTERN, PlaceholderPattern};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "knode";
const CONFIG_FILE_NAME: &str = "config.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/knode/config.toml";

pub const DEFAULT_CONTROL_PLANE_ALIAS: &str = "k8s-master";
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REGISTRATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_REGISTRATION_POLL_SECS: u64 = 5;
pub const DEFAULT_SETTLE_SECS: u64 = 10;

/// One source of settings (file, environment or command line).
/// Every field is optional; layers are merged before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub k8s_version: Option<String>,
    pub control_plane_ip: Option<String>,
    pub hostname: Option<String>,
    pub control_plane_alias: Option<String>,
    pub ssh_user: Option<String>,
    pub remote_timeout_secs: Option<u64>,
    pub registration_timeout_secs: Option<u64>,
    pub registration_poll_secs: Option<u64>,
    pub settle_secs: Option<u64>,
    pub hostname_placeholder: Option<String>,
}

impl ConfigLayer {
    /// Fill unset fields from `lower`
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            k8s_version: self.k8s_version.or(lower.k8s_version),
            control_plane_ip: self.control_plane_ip.or(lower.control_plane_ip),
            hostname: self.hostname.or(lower.hostname),
            control_plane_alias: self.control_plane_alias.or(lower.control_plane_alias),
            ssh_user: self.ssh_user.or(lower.ssh_user),
            remote_timeout_secs: self.remote_timeout_secs.or(lower.remote_timeout_secs),
            registration_timeout_secs: self
                .registration_timeout_secs
                .or(lower.registration_timeout_secs),
            registration_poll_secs: self.registration_poll_secs.or(lower.registration_poll_secs),
            settle_secs: self.settle_secs.or(lower.settle_secs),
            hostname_placeholder: self.hostname_placeholder.or(lower.hostname_placeholder),
        }
    }

    /// Read `KNODE_*` variables through `lookup`
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<ConfigLayer> {
        let string = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| -> Result<Option<u64>> {
            string(key)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("{} must be a whole number of seconds", key))
                })
                .transpose()
        };

        Ok(ConfigLayer {
            k8s_version: string("KNODE_K8S_VERSION"),
            control_plane_ip: string("KNODE_CONTROL_PLANE_IP"),
            hostname: string("KNODE_HOSTNAME"),
            control_plane_alias: string("KNODE_CONTROL_PLANE_ALIAS"),
            ssh_user: string("KNODE_SSH_USER"),
            remote_timeout_secs: number("KNODE_REMOTE_TIMEOUT_SECS")?,
            registration_timeout_secs: number("KNODE_REGISTRATION_TIMEOUT_SECS")?,
            registration_poll_secs: None,
            settle_secs: None,
            hostname_placeholder: None,
        })
    }

    pub fn from_env() -> Result<ConfigLayer> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn load_file(path: &Path) -> Result<ConfigLayer> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Immutable input to a provisioning run
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub k8s_version: String,
    pub control_plane_ip: IpAddr,
    /// Applied without prompting when set
    pub hostname: Option<String>,
    pub control_plane_alias: String,
    pub ssh_user: String,
    pub remote_timeout: Duration,
    pub registration_timeout: Duration,
    pub registration_poll: Duration,
    pub settle_delay: Duration,
    pub hostname_placeholder: PlaceholderPattern,
}

impl NodeConfig {
    /// Validate a merged layer
    pub fn resolve(layer: ConfigLayer) -> Result<NodeConfig> {
        let k8s_version = normalize_version(layer.k8s_version.as_deref().context(
            "Kubernetes version not set (use --k8s-version, KNODE_K8S_VERSION or k8s_version in the config file)",
        )?)?;

        let ip = layer.control_plane_ip.context(
            "Control-plane IP not set (use --control-plane, KNODE_CONTROL_PLANE_IP or control_plane_ip in the config file)",
        )?;
        let control_plane_ip: IpAddr = ip
            .trim()
            .parse()
            .with_context(|| format!("Control-plane address '{}' is not an IP address", ip))?;

        let hostname = layer
            .hostname
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());
        if let Some(ref h) = hostname {
            if !hostname::is_valid_hostname(h) {
                anyhow::bail!("Hostname override '{}' is not a valid RFC 1123 hostname", h);
            }
        }

        let remote_timeout = layer.remote_timeout_secs.unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS);
        if remote_timeout == 0 {
            anyhow::bail!("remote_timeout_secs must be at least 1");
        }
        let registration_poll = layer
            .registration_poll_secs
            .unwrap_or(DEFAULT_REGISTRATION_POLL_SECS);
        if registration_poll == 0 {
            anyhow::bail!("registration_poll_secs must be at least 1");
        }

        let placeholder = layer
            .hostname_placeholder
            .unwrap_or_else(|| DEFAULT_PLACEHOLDER_PATTERN.to_string());

        Ok(NodeConfig {
            k8s_version,
            control_plane_ip,
            hostname,
            control_plane_alias: layer
                .control_plane_alias
                .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_ALIAS.to_string()),
            ssh_user: layer.ssh_user.unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            remote_timeout: Duration::from_secs(remote_timeout),
            registration_timeout: Duration::from_secs(
                layer
                    .registration_timeout_secs
                    .unwrap_or(DEFAULT_REGISTRATION_TIMEOUT_SECS),
            ),
            registration_poll: Duration::from_secs(registration_poll),
            settle_delay: Duration::from_secs(layer.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS)),
            hostname_placeholder: PlaceholderPattern::new(&placeholder)?,
        })
    }

    /// Render the resolved settings back to TOML
    pub fn to_toml(&self) -> Result<String> {
        let layer = ConfigLayer {
            k8s_version: Some(self.k8s_version.clone()),
            control_plane_ip: Some(self.control_plane_ip.to_string()),
            hostname: self.hostname.clone(),
            control_plane_alias: Some(self.control_plane_alias.clone()),
            ssh_user: Some(self.ssh_user.clone()),
            remote_timeout_secs: Some(self.remote_timeout.as_secs()),
            registration_timeout_secs: Some(self.registration_timeout.as_secs()),
            registration_poll_secs: Some(self.registration_poll.as_secs()),
            settle_secs: Some(self.settle_delay.as_secs()),
            hostname_placeholder: Some(self.hostname_placeholder.as_str().to_string()),
        };
        toml::to_string_pretty(&layer).context("Failed to serialize config")
    }
}

/// Accept `1.29` or `v1.29`; the repository paths use the `v` form
fn normalize_version(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let version = if trimmed.starts_with('v') {
        trimmed.to_string()
    } else {
        format!("v{}", trimmed)
    };
    let valid = regex::Regex::new(r"^v\d+\.\d+$")
        .context("Failed to compile version pattern")?
        .is_match(&version);
    if !valid {
        anyhow::bail!(
            "Kubernetes version '{}' must be a minor stream such as v1.29",
            raw
        );
    }
    Ok(version)
}

pub fn get_home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .with_context(|| "Could not determine home directory")
}

/// The config file to read: the explicit one, else the first that exists
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            anyhow::bail!("Config file does not exist: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let system = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system.is_file() {
        return Ok(Some(system));
    }

    if let Ok(home) = get_home_dir() {
        let user = home
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        if user.is_file() {
            return Ok(Some(user));
        }
    }

    Ok(None)
}

/// Merge command line, environment and config file, then validate
pub fn load_config(cli: ConfigLayer, config_path: Option<&Path>) -> Result<NodeConfig> {
    // A missing .env is normal
    if let Ok(path) = dotenv::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }

    let env = ConfigLayer::from_env()?;
    let file = match find_config_file(config_path)? {
        Some(path) => {
            info!("Using config file {}", path.display());
            ConfigLayer::load_file(&path)?
        }
        None => ConfigLayer::default(),
    };

    NodeConfig::resolve(cli.or(env).or(file))
}
