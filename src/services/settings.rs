use crate::constants::limits::{MAX_PORT, MAX_TIMEOUT_SECS, MIN_PORT};
use crate::constants::network;
use crate::errors::ToolError;
use crate::services::host_keys::HostKeyPolicy;
use crate::services::policy::{Policy, PolicyConfig};
use crate::utils::paths::{resolve_audit_path, resolve_known_hosts_path, resolve_policy_path};
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide configuration, read once at startup.
#[derive(Clone)]
pub struct Settings {
    pub default_username: String,
    pub default_password: String,
    pub default_port: u16,
    pub connect_timeout: Duration,
    pub default_exec_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts_path: PathBuf,
    pub audit_path: PathBuf,
    pub policy_config: PolicyConfig,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("default_username", &self.default_username)
            .field("default_password", &"[REDACTED]")
            .field("default_port", &self.default_port)
            .field("connect_timeout", &self.connect_timeout)
            .field("default_exec_timeout", &self.default_exec_timeout)
            .field("host_key_policy", &self.host_key_policy)
            .field("known_hosts_path", &self.known_hosts_path)
            .field("audit_path", &self.audit_path)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_username: network::SSH_DEFAULT_USERNAME.to_string(),
            default_password: String::new(),
            default_port: network::SSH_DEFAULT_PORT,
            connect_timeout: Duration::from_secs(network::TIMEOUT_SSH_CONNECT_SECS),
            default_exec_timeout: Duration::from_secs(network::TIMEOUT_SSH_EXEC_DEFAULT_SECS),
            host_key_policy: HostKeyPolicy::Tofu,
            known_hosts_path: resolve_known_hosts_path(),
            audit_path: resolve_audit_path(),
            policy_config: PolicyConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ToolError> {
        let mut settings = Self::default();
        if let Ok(value) = std::env::var("OPSGUARD_SSH_DEFAULT_USERNAME") {
            if !value.trim().is_empty() {
                settings.default_username = value.trim().to_string();
            }
        }
        if let Ok(value) = std::env::var("OPSGUARD_SSH_DEFAULT_PASSWORD") {
            settings.default_password = value;
        }
        if let Ok(value) = std::env::var("OPSGUARD_SSH_DEFAULT_PORT") {
            settings.default_port = parse_port(&value)?;
        }
        if let Ok(value) = std::env::var("OPSGUARD_SSH_TIMEOUT") {
            let timeout = Duration::from_secs(parse_timeout_secs(&value, "OPSGUARD_SSH_TIMEOUT")?);
            settings.connect_timeout = timeout;
            settings.default_exec_timeout = timeout;
        }
        if let Ok(value) = std::env::var("OPSGUARD_HOST_KEY_POLICY") {
            settings.host_key_policy = HostKeyPolicy::parse(&value)?;
        }
        let file_config = match resolve_policy_path() {
            Some(path) => PolicyConfig::load_file(&path)?,
            None => PolicyConfig::default(),
        };
        settings.policy_config = file_config.overlay_env();
        Ok(settings)
    }

    pub fn build_policy(&self) -> Result<Policy, ToolError> {
        Policy::from_config(self.policy_config.clone())
    }
}

fn parse_port(raw: &str) -> Result<u16, ToolError> {
    raw.trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port >= MIN_PORT)
        .ok_or_else(|| {
            ToolError::invalid_params(format!(
                "OPSGUARD_SSH_DEFAULT_PORT must be an integer between {} and {}",
                MIN_PORT, MAX_PORT
            ))
        })
}

pub(crate) fn parse_timeout_secs(raw: &str, label: &str) -> Result<u64, ToolError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0 && *secs <= MAX_TIMEOUT_SECS)
        .ok_or_else(|| {
            ToolError::invalid_params(format!(
                "{} must be an integer between 1 and {} seconds",
                label, MAX_TIMEOUT_SECS
            ))
        })
}
