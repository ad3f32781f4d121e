use crate::errors::{ToolError, ToolErrorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKeyPolicy {
    /// Any host key is accepted. Insecure; only for lab networks.
    Accept,
    /// First key seen for host:port is recorded, later keys must match.
    Tofu,
    /// The host must already be recorded, or a fingerprint supplied per call.
    Pin,
}

impl HostKeyPolicy {
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        match raw.trim().to_lowercase().as_str() {
            "accept" | "insecure" => Ok(HostKeyPolicy::Accept),
            "tofu" | "" => Ok(HostKeyPolicy::Tofu),
            "pin" | "strict" => Ok(HostKeyPolicy::Pin),
            other => Err(
                ToolError::invalid_params(format!("Unknown host key policy: {}", other))
                    .with_hint("Use one of: accept, tofu, pin."),
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostKeyPolicy::Accept => "accept",
            HostKeyPolicy::Tofu => "tofu",
            HostKeyPolicy::Pin => "pin",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnownHost {
    pub host: String,
    pub port: u16,
    pub key_type: String,
    pub fingerprint: String,
    pub first_seen: String,
    pub last_used: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct KnownHostsFile {
    hosts: Vec<KnownHost>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKeyDecision {
    Accepted,
    Matched,
    Learned,
}

/// JSON-backed store of host key fingerprints keyed by host and port.
pub struct KnownHosts {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KnownHosts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<KnownHostsFile, ToolError> {
        if !self.path.exists() {
            return Ok(KnownHostsFile::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|err| {
            ToolError::internal(format!("Failed to read known hosts file: {}", err))
        })?;
        if raw.trim().is_empty() {
            return Ok(KnownHostsFile::default());
        }
        serde_json::from_str(&raw)
            .map_err(|err| ToolError::internal(format!("Invalid known hosts file: {}", err)))
    }

    fn save(&self, file: &KnownHostsFile) -> Result<(), ToolError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(file)
            .map_err(|err| ToolError::internal(err.to_string()))?;
        let tmp = self
            .path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.path).map_err(|err| {
            let _ = std::fs::remove_file(&tmp);
            ToolError::internal(format!("Failed to write known hosts file: {}", err))
        })
    }

    pub fn lookup(&self, host: &str, port: u16) -> Result<Option<KnownHost>, ToolError> {
        let _guard = self.lock.lock().unwrap_or_else(|err| err.into_inner());
        Ok(self
            .load()?
            .hosts
            .into_iter()
            .find(|entry| entry.host.eq_ignore_ascii_case(host) && entry.port == port))
    }

    /// Checks an observed fingerprint against the policy, the optional
    /// per-call pin, and the stored entry. Learns new hosts under TOFU.
    pub fn verify(
        &self,
        policy: HostKeyPolicy,
        host: &str,
        port: u16,
        key_type: &str,
        observed: &str,
        pinned: Option<&str>,
    ) -> Result<HostKeyDecision, ToolError> {
        if let Some(expected) = pinned {
            let expected = normalize_fingerprint(expected);
            if expected != observed {
                return Err(mismatch(host, port, &expected, observed));
            }
            return Ok(HostKeyDecision::Matched);
        }
        if policy == HostKeyPolicy::Accept {
            return Ok(HostKeyDecision::Accepted);
        }

        let _guard = self.lock.lock().unwrap_or_else(|err| err.into_inner());
        let mut file = self.load()?;
        let now = chrono::Utc::now().to_rfc3339();
        let existing = file
            .hosts
            .iter_mut()
            .find(|entry| entry.host.eq_ignore_ascii_case(host) && entry.port == port);
        match existing {
            Some(entry) if entry.fingerprint == observed => {
                entry.last_used = now;
                self.save(&file)?;
                Ok(HostKeyDecision::Matched)
            }
            Some(entry) => Err(mismatch(host, port, &entry.fingerprint, observed)),
            None if policy == HostKeyPolicy::Pin => {
                let mut err = ToolError::new(
                    ToolErrorKind::Connection,
                    "HOST_KEY_UNKNOWN",
                    format!("No pinned host key for {}:{}", host, port),
                )
                .with_hint(
                    "Record the host first (host_key_policy=tofu) or pass host_key_fingerprint.",
                );
                err.retryable = false;
                Err(err)
            }
            None => {
                file.hosts.push(KnownHost {
                    host: host.to_lowercase(),
                    port,
                    key_type: key_type.to_string(),
                    fingerprint: observed.to_string(),
                    first_seen: now.clone(),
                    last_used: now,
                });
                self.save(&file)?;
                Ok(HostKeyDecision::Learned)
            }
        }
    }
}

pub fn normalize_fingerprint(raw: &str) -> String {
    let cleaned = raw.trim().trim_end_matches('=');
    let prefixed = cleaned
        .get(..7)
        .map(|head| head.eq_ignore_ascii_case("sha256:"))
        .unwrap_or(false);
    if prefixed {
        return format!("SHA256:{}", cleaned[7..].trim());
    }
    format!("SHA256:{}", cleaned)
}

fn mismatch(host: &str, port: u16, expected: &str, observed: &str) -> ToolError {
    let mut err = ToolError::new(
        ToolErrorKind::Connection,
        "HOST_KEY_MISMATCH",
        format!(
            "Host key mismatch for {}:{} (expected {}, got {})",
            host, port, expected, observed
        ),
    );
    err.retryable = false;
    err
}
