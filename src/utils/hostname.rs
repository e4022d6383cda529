// Hostname utilities

use crate::utils::exec::CommandExecutor;
use anyhow::{Context, Result};
use regex::Regex;

/// Hostnames a fresh image ships with and which must not join a cluster
pub const DEFAULT_PLACEHOLDER_PATTERN: &str = r"^(localhost(\.localdomain)?)?$";

/// Get the current hostname from the system
pub fn get_current_hostname(exec: &dyn CommandExecutor) -> Result<String> {
    let output = exec.query("hostname", &[]);
    match output {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        _ => std::env::var("HOSTNAME").context("Failed to get hostname"),
    }
}

/// Name the kubelet registers under: the hostname, lowercased
pub fn node_name(hostname: &str) -> String {
    hostname.trim().to_lowercase()
}

/// Compiled placeholder matcher
#[derive(Debug, Clone)]
pub struct PlaceholderPattern(Regex);

impl PlaceholderPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid hostname placeholder pattern: {}", pattern))?;
        Ok(Self(regex))
    }

    pub fn matches(&self, hostname: &str) -> bool {
        self.0.is_match(hostname.trim())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// RFC 1123 hostname check
pub fn is_valid_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
