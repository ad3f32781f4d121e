use crate::constants::limits::{MAX_CAPTURE_BYTES, READ_CHUNK_BYTES};
use crate::constants::network::{POLL_IDLE_SLEEP_MS, TIMEOUT_SSH_EXEC_HARD_GRACE_MS};
use crate::errors::ToolError;
use crate::services::gate::{AdmittedRequest, AdmittedTarget, ConnectionTarget};
use crate::services::logger::Logger;
use crate::services::transport::{RemoteChannel, SshConnector, SshSession};
use crate::utils::text::decode_output;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Per-probe outcomes of a batch, in submission order.
pub type ProbeResults = Vec<(String, Result<ExecutionResult, ToolError>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Connecting,
    Authenticated,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Connecting => "connecting",
            ExecutionState::Authenticated => "authenticated",
            ExecutionState::Executing => "executing",
            ExecutionState::Completed => "completed",
            ExecutionState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Disconnects the wrapped session when dropped, on every exit path.
struct SessionGuard {
    session: Box<dyn SshSession>,
}

impl SessionGuard {
    fn session(&mut self) -> &mut dyn SshSession {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.disconnect();
    }
}

struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Capture {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let remaining = MAX_CAPTURE_BYTES.saturating_sub(self.bytes.len());
        if chunk.len() > remaining {
            self.bytes.extend_from_slice(&chunk[..remaining]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(chunk);
        }
    }
}

/// Tracks the state machine of one execution for logging.
struct Run<'a> {
    logger: &'a Logger,
    host: &'a str,
    state: ExecutionState,
}

impl<'a> Run<'a> {
    fn new(logger: &'a Logger, host: &'a str) -> Self {
        Self {
            logger,
            host,
            state: ExecutionState::Idle,
        }
    }

    fn advance(&mut self, next: ExecutionState) {
        self.logger.debug(
            "state",
            Some(&serde_json::json!({
                "host": self.host,
                "from": self.state.to_string(),
                "to": next.to_string(),
            })),
        );
        self.state = next;
    }

    fn fail(&mut self, err: ToolError) -> ToolError {
        let failed_in = self.state;
        self.advance(ExecutionState::Failed);
        let mut details = err
            .details
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = details.as_object_mut() {
            obj.insert(
                "state".to_string(),
                serde_json::Value::String(failed_in.to_string()),
            );
        }
        err.with_details(details)
    }
}

/// Connect, run, capture, close. Each call owns its connection; nothing is
/// pooled or shared between calls.
#[derive(Clone)]
pub struct ExecutionEngine {
    logger: Logger,
    connector: Arc<dyn SshConnector>,
    connect_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(logger: Logger, connector: Arc<dyn SshConnector>, connect_timeout: Duration) -> Self {
        Self {
            logger: logger.child("engine"),
            connector,
            connect_timeout,
        }
    }

    pub async fn execute(&self, request: AdmittedRequest) -> Result<ExecutionResult, ToolError> {
        let engine = self.clone();
        let backstop = request.timeout() + Duration::from_millis(TIMEOUT_SSH_EXEC_HARD_GRACE_MS);
        let task = tokio::task::spawn_blocking(move || engine.execute_blocking(&request));
        match tokio::time::timeout(backstop, task).await {
            Ok(joined) => joined.map_err(|_| ToolError::internal("SSH exec task failed"))?,
            Err(_) => Err(ToolError::timeout(format!(
                "Command did not finish within {}s",
                backstop.as_secs()
            ))),
        }
    }

    /// Connect + authenticate only.
    pub async fn probe_connection(&self, target: &AdmittedTarget) -> Result<(), ToolError> {
        let engine = self.clone();
        let target = target.target().clone();
        tokio::task::spawn_blocking(move || -> Result<(), ToolError> {
            let mut run = Run::new(&engine.logger, &target.host);
            let _guard = engine.open(&mut run, &target, engine.connect_timeout)?;
            run.advance(ExecutionState::Completed);
            Ok(())
        })
        .await
        .map_err(|_| ToolError::internal("SSH connection test task failed"))?
    }

    /// Runs several compiled-in probes over a single connection. A connection
    /// failure fails the batch; a failing probe only fails its own entry.
    pub async fn execute_batch(
        &self,
        target: &AdmittedTarget,
        probes: Vec<(String, String)>,
        per_probe_timeout: Duration,
    ) -> Result<ProbeResults, ToolError> {
        let engine = self.clone();
        let target = target.target().clone();
        tokio::task::spawn_blocking(move || -> Result<ProbeResults, ToolError> {
            let mut run = Run::new(&engine.logger, &target.host);
            let mut guard = engine.open(&mut run, &target, engine.connect_timeout)?;
            let mut results = Vec::with_capacity(probes.len());
            for (name, command) in probes {
                let deadline = Instant::now() + per_probe_timeout;
                let started = Instant::now();
                let outcome = run_command(guard.session(), &command, deadline)
                    .map(|output| output.into_result(started));
                results.push((name, outcome));
            }
            run.advance(ExecutionState::Completed);
            Ok(results)
        })
        .await
        .map_err(|_| ToolError::internal("SSH batch task failed"))?
    }

    fn open(
        &self,
        run: &mut Run<'_>,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<SessionGuard, ToolError> {
        run.advance(ExecutionState::Connecting);
        let session = self
            .connector
            .connect(target, timeout)
            .map_err(|err| run.fail(err))?;
        run.advance(ExecutionState::Authenticated);
        Ok(SessionGuard { session })
    }

    pub fn execute_blocking(&self, request: &AdmittedRequest) -> Result<ExecutionResult, ToolError> {
        let started = Instant::now();
        let deadline = started + request.timeout();
        let target = request.target();
        let mut run = Run::new(&self.logger, &target.host);
        let connect_budget = std::cmp::min(self.connect_timeout, request.timeout());
        let mut guard = self.open(&mut run, target, connect_budget)?;
        run.advance(ExecutionState::Executing);
        let output = run_command(guard.session(), request.command(), deadline)
            .map_err(|err| run.fail(err))?;
        drop(guard);
        run.advance(ExecutionState::Completed);
        Ok(output.into_result(started))
    }
}

struct RawOutput {
    stdout: Capture,
    stderr: Capture,
    exit_code: i32,
}

impl RawOutput {
    fn into_result(self, started: Instant) -> ExecutionResult {
        ExecutionResult {
            stdout: decode_output(&self.stdout.bytes),
            stderr: decode_output(&self.stderr.bytes),
            exit_code: self.exit_code,
            success: self.exit_code == 0,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            truncated: self.stdout.truncated || self.stderr.truncated,
        }
    }
}

enum Poll {
    Data(usize),
    Idle,
}

fn poll_stream(
    read: std::io::Result<usize>,
    stream: &str,
) -> Result<Poll, ToolError> {
    match read {
        Ok(0) => Ok(Poll::Idle),
        Ok(n) => Ok(Poll::Data(n)),
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(Poll::Idle),
        Err(err) => Err(ToolError::execution(format!(
            "SSH {} read failed: {}",
            stream, err
        ))),
    }
}

fn run_command(
    session: &mut dyn SshSession,
    command: &str,
    deadline: Instant,
) -> Result<RawOutput, ToolError> {
    let mut channel = session.exec(command)?;
    let mut stdout = Capture::new();
    let mut stderr = Capture::new();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];

    loop {
        let mut progressed = false;
        if let Poll::Data(n) = poll_stream(channel.read_stdout(&mut buf), "stdout")
            .map_err(|err| abort(channel.as_mut(), err))?
        {
            stdout.push(&buf[..n]);
            progressed = true;
        }
        if let Poll::Data(n) = poll_stream(channel.read_stderr(&mut buf), "stderr")
            .map_err(|err| abort(channel.as_mut(), err))?
        {
            stderr.push(&buf[..n]);
            progressed = true;
        }
        if channel.eof() && !progressed {
            break;
        }
        if Instant::now() >= deadline {
            return Err(abort(
                channel.as_mut(),
                ToolError::timeout(format!("Command timed out: {}", command)),
            ));
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(POLL_IDLE_SLEEP_MS));
        }
    }

    let remaining = deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_millis(TIMEOUT_SSH_EXEC_HARD_GRACE_MS));
    let exit_code = channel.finish(remaining)?;
    Ok(RawOutput {
        stdout,
        stderr,
        exit_code,
    })
}

fn abort(channel: &mut dyn RemoteChannel, err: ToolError) -> ToolError {
    channel.abort();
    err
}
