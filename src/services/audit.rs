use crate::services::logger::Logger;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One executed command. Credentials are not part of the record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub request_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub outcome: String,
}

impl AuditRecord {
    pub fn new(host: &str, port: u16, username: &str, command: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: uuid::Uuid::new_v4().to_string(),
            host: host.to_string(),
            port,
            username: username.to_string(),
            command: command.to_string(),
            exit_code: None,
            outcome: "pending".to_string(),
        }
    }

    pub fn completed(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self.outcome = if exit_code == 0 { "success" } else { "failure" }.to_string();
        self
    }

    pub fn failed(mut self, code: &str) -> Self {
        self.outcome = code.to_lowercase();
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AuditStats {
    pub logged: u64,
    pub errors: u64,
}

/// Append-only JSONL sink. Nothing here reads the trail back.
#[derive(Clone)]
pub struct AuditService {
    logger: Logger,
    file_path: PathBuf,
    queue: Arc<Mutex<()>>,
    stats: Arc<Mutex<AuditStats>>,
}

impl AuditService {
    pub fn new(logger: Logger, file_path: impl Into<PathBuf>) -> Self {
        Self {
            logger: logger.child("audit"),
            file_path: file_path.into(),
            queue: Arc::new(Mutex::new(())),
            stats: Arc::new(Mutex::new(AuditStats::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Write failures are logged and counted, never surfaced to the caller.
    pub fn append(&self, record: &AuditRecord) {
        let payload = match serde_json::to_string(record) {
            Ok(line) => format!("{}\n", line),
            Err(err) => {
                self.record_error(&err.to_string());
                return;
            }
        };
        let _guard = self.queue.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(parent) = self.file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .and_then(|mut file| file.write_all(payload.as_bytes()));
        match written {
            Ok(()) => {
                if let Ok(mut stats) = self.stats.lock() {
                    stats.logged += 1;
                }
            }
            Err(err) => self.record_error(&err.to_string()),
        }
    }

    fn record_error(&self, error: &str) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.errors += 1;
        }
        self.logger
            .warn("Audit write failed", Some(&serde_json::json!({ "error": error })));
    }

    pub fn stats(&self) -> AuditStats {
        *self.stats.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_record() {
        let path = std::env::temp_dir().join(format!("opsguard-audit-{}.jsonl", uuid::Uuid::new_v4()));
        let audit = AuditService::new(Logger::new("test"), &path);
        audit.append(&AuditRecord::new("10.0.0.5", 22, "root", "uptime").completed(0));
        audit.append(&AuditRecord::new("10.0.0.5", 22, "root", "df -h").failed("EXECUTION_TIMED_OUT"));

        let raw = std::fs::read_to_string(&path).expect("audit file");
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["command"], "uptime");
        assert_eq!(lines[0]["exit_code"], 0);
        assert_eq!(lines[0]["outcome"], "success");
        assert!(lines[1].get("exit_code").is_none());
        assert_eq!(lines[1]["outcome"], "execution_timed_out");
        assert_eq!(audit.stats().logged, 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unwritable_path_counts_error() {
        let dir = std::env::temp_dir().join(format!("opsguard-audit-dir-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("dir");
        let audit = AuditService::new(Logger::new("test"), &dir);
        audit.append(&AuditRecord::new("h", 22, "root", "uptime").completed(0));
        assert_eq!(audit.stats().errors, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
