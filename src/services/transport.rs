use crate::constants::network::TIMEOUT_SSH_EXEC_HARD_GRACE_MS;
use crate::errors::ToolError;
use crate::services::gate::ConnectionTarget;
use crate::services::host_keys::{HostKeyDecision, HostKeyPolicy, KnownHosts};
use crate::services::logger::Logger;
use base64::Engine;
use ssh2::Session;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Opens authenticated SSH sessions. Implementations block; callers run
/// them on the blocking pool.
pub trait SshConnector: Send + Sync {
    fn connect(
        &self,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<Box<dyn SshSession>, ToolError>;
}

pub trait SshSession: Send {
    /// Starts `command` on a fresh exec channel and switches the session to
    /// non-blocking reads.
    fn exec(&mut self, command: &str) -> Result<Box<dyn RemoteChannel>, ToolError>;

    fn disconnect(&mut self);
}

/// Non-blocking view of a running remote command. Reads return
/// `ErrorKind::WouldBlock` (or `Ok(0)`) when no data is pending.
pub trait RemoteChannel: Send {
    fn read_stdout(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn read_stderr(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    fn eof(&self) -> bool;

    /// Waits for the channel to close and returns the exit status.
    fn finish(&mut self, timeout: Duration) -> Result<i32, ToolError>;

    /// Best-effort close after a timeout; the remote process may keep running.
    fn abort(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Connect,
    Exec,
}

pub struct Ssh2Connector {
    logger: Logger,
    host_key_policy: HostKeyPolicy,
    known_hosts: Arc<KnownHosts>,
}

impl Ssh2Connector {
    pub fn new(logger: Logger, host_key_policy: HostKeyPolicy, known_hosts: Arc<KnownHosts>) -> Self {
        if host_key_policy == HostKeyPolicy::Accept {
            logger.warn(
                "Host key verification disabled (host_key_policy=accept); connections are open to impersonation",
                None,
            );
        }
        Self {
            logger: logger.child("transport"),
            host_key_policy,
            known_hosts,
        }
    }

    fn open_tcp(&self, target: &ConnectionTarget, timeout: Duration) -> Result<TcpStream, ToolError> {
        let addrs = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|err| {
                ToolError::connection(format!("Failed to resolve {}: {}", target.host, err))
            })?;
        let mut last_err: Option<std::io::Error> = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout)).ok();
                    stream.set_write_timeout(Some(timeout)).ok();
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(match last_err {
            Some(err) if err.kind() == std::io::ErrorKind::TimedOut => ToolError::connection(
                format!("Connection timed out: {}:{}", target.host, target.port),
            ),
            Some(err) => ToolError::connection(format!(
                "Failed to connect to {}:{}: {}",
                target.host, target.port, err
            )),
            None => ToolError::connection(format!("No addresses found for {}", target.host)),
        })
    }
}

impl SshConnector for Ssh2Connector {
    fn connect(
        &self,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<Box<dyn SshSession>, ToolError> {
        let tcp = self.open_tcp(target, timeout)?;
        let mut session =
            Session::new().map_err(|_| ToolError::internal("Failed to create SSH session"))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(duration_ms(timeout));
        session
            .handshake()
            .map_err(|err| map_ssh_error(err, Phase::Connect))?;

        let observed = fingerprint_host_key_sha256(&session)
            .ok_or_else(|| ToolError::connection("Remote host key unavailable"))?;
        let key_type = session
            .host_key()
            .map(|(_, kind)| format!("{:?}", kind).to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        let decision = self.known_hosts.verify(
            self.host_key_policy,
            &target.host,
            target.port,
            &key_type,
            &observed,
            target.host_key_fingerprint.as_deref(),
        )?;
        if decision == HostKeyDecision::Learned {
            self.logger.info(
                "Recorded new host key",
                Some(&serde_json::json!({
                    "host": target.host,
                    "port": target.port,
                    "fingerprint": observed,
                })),
            );
        }

        session
            .userauth_password(&target.username, target.password())
            .map_err(|_| {
                ToolError::connection(format!(
                    "Authentication failed: {}@{}",
                    target.username, target.host
                ))
            })?;
        if !session.authenticated() {
            return Err(ToolError::connection(format!(
                "Authentication failed: {}@{}",
                target.username, target.host
            )));
        }
        Ok(Box::new(Ssh2Session { session }))
    }
}

struct Ssh2Session {
    session: Session,
}

impl SshSession for Ssh2Session {
    fn exec(&mut self, command: &str) -> Result<Box<dyn RemoteChannel>, ToolError> {
        self.session.set_blocking(true);
        let mut channel = self
            .session
            .channel_session()
            .map_err(|err| map_ssh_error(err, Phase::Exec))?;
        channel
            .exec(command)
            .map_err(|err| map_ssh_error(err, Phase::Exec))?;
        self.session.set_blocking(false);
        Ok(Box::new(Ssh2Channel {
            session: self.session.clone(),
            channel,
        }))
    }

    fn disconnect(&mut self) {
        self.session.set_blocking(true);
        self.session
            .set_timeout(TIMEOUT_SSH_EXEC_HARD_GRACE_MS as u32);
        let _ = self.session.disconnect(None, "opsguard: done", None);
    }
}

struct Ssh2Channel {
    session: Session,
    channel: ssh2::Channel,
}

impl RemoteChannel for Ssh2Channel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.channel.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.channel.stderr().read(buf)
    }

    fn eof(&self) -> bool {
        self.channel.eof()
    }

    fn finish(&mut self, timeout: Duration) -> Result<i32, ToolError> {
        self.session.set_blocking(true);
        self.session.set_timeout(duration_ms(timeout));
        self.channel
            .wait_close()
            .map_err(|err| map_ssh_error(err, Phase::Exec))?;
        self.channel
            .exit_status()
            .map_err(|err| map_ssh_error(err, Phase::Exec))
    }

    fn abort(&mut self) {
        self.session.set_blocking(true);
        self.session
            .set_timeout(TIMEOUT_SSH_EXEC_HARD_GRACE_MS as u32);
        let _ = self.channel.close();
    }
}

fn duration_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1)
}

fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

fn map_ssh_error(err: ssh2::Error, phase: Phase) -> ToolError {
    let io_err: std::io::Error = err.into();
    match (io_err.kind(), phase) {
        (std::io::ErrorKind::TimedOut, Phase::Connect) => {
            ToolError::connection("SSH handshake timed out")
        }
        (std::io::ErrorKind::TimedOut, Phase::Exec) => {
            ToolError::timeout("SSH operation timed out")
        }
        (_, Phase::Connect) => ToolError::connection(format!("SSH protocol error: {}", io_err)),
        (_, Phase::Exec) => ToolError::execution(format!("SSH channel error: {}", io_err)),
    }
}
