use crate::errors::ToolError;
use crate::services::command_validator::validate_command;
use crate::services::host_validator::validate_host;
use crate::services::policy::{Policy, Verdict};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where and as whom to connect. The password is only reachable through
/// [`ConnectionTarget::password`] and never shows up in `Debug` output.
#[derive(Clone)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    password: String,
    pub host_key_fingerprint: Option<String>,
}

impl ConnectionTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            host_key_fingerprint: None,
        }
    }

    pub fn with_host_key_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.host_key_fingerprint = fingerprint;
        self
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub target: ConnectionTarget,
    pub command: String,
    pub timeout: Duration,
}

/// A target whose host passed the host validator.
#[derive(Debug, Clone)]
pub struct AdmittedTarget(ConnectionTarget);

impl AdmittedTarget {
    pub fn target(&self) -> &ConnectionTarget {
        &self.0
    }
}

/// A request that cleared both validators. The execution engine accepts
/// nothing else, so an unvalidated command cannot reach a connection.
#[derive(Debug, Clone)]
pub struct AdmittedRequest {
    target: AdmittedTarget,
    command: String,
    timeout: Duration,
}

impl AdmittedRequest {
    /// Compiled-in probe commands issued by the aggregators. Any caller
    /// input interpolated into `command` must already be checked with
    /// `Validation::ensure_identifier`.
    pub(crate) fn probe(target: &AdmittedTarget, command: String, timeout: Duration) -> Self {
        Self {
            target: target.clone(),
            command,
            timeout,
        }
    }

    pub fn target(&self) -> &ConnectionTarget {
        self.target.target()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Host and command admission against one shared, read-only policy.
#[derive(Clone)]
pub struct CommandGate {
    policy: Arc<Policy>,
}

impl CommandGate {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn check_host(&self, host: &str) -> Verdict {
        validate_host(host, &self.policy)
    }

    pub fn check_command(&self, command: &str) -> Verdict {
        validate_command(command, &self.policy)
    }

    pub fn admit_target(&self, target: ConnectionTarget) -> Result<AdmittedTarget, ToolError> {
        self.check_host(&target.host).into_result()?;
        Ok(AdmittedTarget(target))
    }

    pub fn admit(&self, request: CommandRequest) -> Result<AdmittedRequest, ToolError> {
        let target = self.admit_target(request.target)?;
        self.check_command(&request.command).into_result()?;
        Ok(AdmittedRequest {
            target,
            command: request.command,
            timeout: request.timeout,
        })
    }
}
