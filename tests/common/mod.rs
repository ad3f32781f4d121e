#![allow(dead_code)]

use once_cell::sync::Lazy;
use opsguard::app::App;
use opsguard::errors::ToolError;
use opsguard::services::gate::ConnectionTarget;
use opsguard::services::logger::Logger;
use opsguard::services::settings::Settings;
use opsguard::services::transport::{RemoteChannel, SshConnector, SshSession};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub static ENV_LOCK: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// What the fake remote does for commands starting with a given prefix.
#[derive(Clone, Default)]
pub struct Script {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Never produces output or EOF.
    pub hang: bool,
    pub exec_error: Option<ToolError>,
}

impl Script {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn failing(stderr: &str, exit_code: i32) -> Self {
        Self {
            stderr: stderr.to_string(),
            exit_code,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Default)]
pub struct Counters {
    pub attempts: Arc<AtomicUsize>,
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub aborts: Arc<AtomicUsize>,
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl Counters {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands lock").clone()
    }
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub counters: Counters,
    scripts: Vec<(String, Script)>,
    fallback: Script,
    connect_error: Option<ToolError>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, prefix: &str, script: Script) -> Self {
        self.scripts.push((prefix.to_string(), script));
        self
    }

    pub fn fallback(mut self, script: Script) -> Self {
        self.fallback = script;
        self
    }

    pub fn refuse(mut self, err: ToolError) -> Self {
        self.connect_error = Some(err);
        self
    }

    fn lookup(&self, command: &str) -> Script {
        self.scripts
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, script)| script.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl SshConnector for FakeConnector {
    fn connect(
        &self,
        target: &ConnectionTarget,
        _timeout: Duration,
    ) -> Result<Box<dyn SshSession>, ToolError> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        assert!(!target.host.is_empty());
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            connector: self.clone(),
            closed: false,
        }))
    }
}

struct FakeSession {
    connector: FakeConnector,
    closed: bool,
}

impl SshSession for FakeSession {
    fn exec(&mut self, command: &str) -> Result<Box<dyn RemoteChannel>, ToolError> {
        self.connector
            .counters
            .commands
            .lock()
            .expect("commands lock")
            .push(command.to_string());
        let script = self.connector.lookup(command);
        if let Some(err) = script.exec_error.clone() {
            return Err(err);
        }
        Ok(Box::new(FakeChannel {
            stdout: script.stdout.into_bytes(),
            stderr: script.stderr.into_bytes(),
            stdout_pos: 0,
            stderr_pos: 0,
            exit_code: script.exit_code,
            hang: script.hang,
            aborts: self.connector.counters.aborts.clone(),
        }))
    }

    fn disconnect(&mut self) {
        if !self.closed {
            self.closed = true;
            self.connector
                .counters
                .disconnects
                .fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeChannel {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_pos: usize,
    stderr_pos: usize,
    exit_code: i32,
    hang: bool,
    aborts: Arc<AtomicUsize>,
}

fn drain(source: &[u8], pos: &mut usize, buf: &mut [u8]) -> io::Result<usize> {
    if *pos >= source.len() {
        return Err(io::Error::from(io::ErrorKind::WouldBlock));
    }
    let n = std::cmp::min(buf.len(), source.len() - *pos);
    buf[..n].copy_from_slice(&source[*pos..*pos + n]);
    *pos += n;
    Ok(n)
}

impl RemoteChannel for FakeChannel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.hang {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        drain(&self.stdout, &mut self.stdout_pos, buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.hang {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        drain(&self.stderr, &mut self.stderr_pos, buf)
    }

    fn eof(&self) -> bool {
        !self.hang && self.stdout_pos >= self.stdout.len() && self.stderr_pos >= self.stderr.len()
    }

    fn finish(&mut self, _timeout: Duration) -> Result<i32, ToolError> {
        Ok(self.exit_code)
    }

    fn abort(&mut self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("opsguard-{}-{}", label, uuid::Uuid::new_v4()))
}

pub fn test_settings() -> Settings {
    Settings {
        default_password: "default-secret".to_string(),
        audit_path: temp_path("audit.jsonl"),
        known_hosts_path: temp_path("known_hosts.json"),
        ..Settings::default()
    }
}

pub fn app_with(connector: FakeConnector) -> App {
    app_with_settings(connector, test_settings())
}

pub fn app_with_settings(connector: FakeConnector, settings: Settings) -> App {
    App::with_connector(Logger::new("test"), settings, Arc::new(connector)).expect("app")
}
