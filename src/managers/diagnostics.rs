use crate::constants::network::{
    TIMEOUT_DIAGNOSE_PROBE_SECS, TIMEOUT_PODS_PROBE_SECS, TIMEOUT_SERVICE_PROBE_SECS,
    TIMEOUT_STATUS_PROBE_SECS,
};
use crate::constants::probes::{JOURNAL_TAIL_LINES, STATUS_UNAVAILABLE};
use crate::errors::ToolError;
use crate::services::executor::{ExecutionEngine, ExecutionResult};
use crate::services::gate::{AdmittedRequest, AdmittedTarget, CommandGate};
use crate::services::logger::Logger;
use crate::services::settings::Settings;
use crate::services::validation::Validation;
use crate::utils::tool_errors::unknown_action_error;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const OPS_ACTIONS: &[&str] = &["status", "diagnose", "service_status", "containers", "pods"];

const STATUS_METRICS: &[&str] = &[
    "cpu_usage",
    "memory_usage",
    "disk_usage",
    "load_average",
    "uptime",
];

fn status_probes() -> Vec<(String, String)> {
    [
        (
            "cpu_usage",
            "top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | cut -d'%' -f1",
        ),
        (
            "memory_usage",
            "free -m | awk 'NR==2{printf \"%.1f%%\", $3*100/$2 }'",
        ),
        ("disk_usage", "df -h / | awk 'NR==2{print $5}'"),
        (
            "load_average",
            "uptime | awk -F'load average:' '{print $2}' | xargs",
        ),
        (
            "uptime",
            "uptime -p 2>/dev/null || uptime | awk -F'up' '{print $2}' | cut -d',' -f1,2",
        ),
    ]
    .into_iter()
    .map(|(name, cmd)| (name.to_string(), cmd.to_string()))
    .collect()
}

fn diagnose_probes(service: &str) -> Vec<(&'static str, String)> {
    vec![
        (
            "service_status",
            format!("systemctl status {} --no-pager", service),
        ),
        (
            "recent_logs",
            format!(
                "journalctl -u {} -n {} --no-pager",
                service, JOURNAL_TAIL_LINES
            ),
        ),
        ("process_check", format!("ps aux | grep {}", service)),
    ]
}

fn container_probe(name: Option<&str>) -> String {
    let format = "--format '{{.ID}}\\t{{.Names}}\\t{{.Status}}\\t{{.Ports}}'";
    match name {
        Some(name) => format!("docker ps -a --filter 'name={}' {}", name, format),
        None => format!("docker ps -a {}", format),
    }
}

/// Rows are `id\tname\tstatus[\tports]`; anything shorter is skipped.
pub fn parse_container_rows(output: &str) -> Vec<Value> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 {
                return None;
            }
            Some(serde_json::json!({
                "id": parts[0],
                "name": parts[1],
                "status": parts[2],
                "ports": parts.get(3).copied().unwrap_or(""),
            }))
        })
        .collect()
}

fn metric_value(outcome: &Result<ExecutionResult, ToolError>) -> String {
    match outcome {
        Ok(result) => {
            let trimmed = result.stdout.trim();
            if trimmed.is_empty() {
                STATUS_UNAVAILABLE.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => STATUS_UNAVAILABLE.to_string(),
    }
}

fn check_entry(outcome: Result<ExecutionResult, ToolError>) -> Value {
    match outcome {
        Ok(result) => {
            let output = if result.stdout.is_empty() {
                result.stderr
            } else {
                result.stdout
            };
            serde_json::json!({ "success": result.success, "output": output })
        }
        Err(err) => serde_json::json!({ "success": false, "output": err.message }),
    }
}

fn probe_meta(action: &str, host: &str, check: &str) -> Value {
    serde_json::json!({ "action": action, "host": host, "check": check })
}

/// Read-only status and diagnostic aggregators built from compiled-in probes.
#[derive(Clone)]
pub struct DiagnosticsManager {
    logger: Logger,
    settings: Arc<Settings>,
    validation: Validation,
    gate: CommandGate,
    engine: ExecutionEngine,
}

impl DiagnosticsManager {
    pub fn new(
        logger: Logger,
        settings: Arc<Settings>,
        validation: Validation,
        gate: CommandGate,
        engine: ExecutionEngine,
    ) -> Self {
        Self {
            logger: logger.child("ops"),
            settings,
            validation,
            gate,
            engine,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action").and_then(|v| v.as_str()).unwrap_or("");
        match action {
            "status" => self.server_status(&args).await,
            "diagnose" => self.diagnose(&args).await,
            "service_status" => self.service_status(&args).await,
            "containers" => self.containers(&args).await,
            "pods" => self.pods(&args).await,
            _ => Err(unknown_action_error("ops", args.get("action"), OPS_ACTIONS)),
        }
    }

    fn trace_probes<'a>(
        &self,
        action: &str,
        host: &str,
        checks: impl IntoIterator<Item = &'a str>,
    ) {
        for check in checks {
            self.logger
                .debug("Running probe", Some(&probe_meta(action, host, check)));
        }
    }

    fn admit(&self, args: &Value) -> Result<AdmittedTarget, ToolError> {
        let target = self.validation.ensure_target(args, &self.settings)?;
        self.gate.admit_target(target)
    }

    async fn server_status(&self, args: &Value) -> Result<Value, ToolError> {
        let target = self.admit(args)?;
        let host = target.target().host.clone();
        let mut out = serde_json::Map::new();
        out.insert("host".to_string(), Value::String(host.clone()));

        let probes = status_probes();
        self.trace_probes("status", &host, probes.iter().map(|(name, _)| name.as_str()));
        let batch = self
            .engine
            .execute_batch(
                &target,
                probes,
                Duration::from_secs(TIMEOUT_STATUS_PROBE_SECS),
            )
            .await;
        match batch {
            Ok(results) => {
                out.insert("online".to_string(), Value::Bool(true));
                for (name, outcome) in results.iter() {
                    out.insert(name.clone(), Value::String(metric_value(outcome)));
                }
            }
            Err(err) => {
                self.logger.warn(
                    "Status probe connection failed",
                    Some(&serde_json::json!({ "host": host, "code": err.code })),
                );
                out.insert("online".to_string(), Value::Bool(false));
                for name in STATUS_METRICS {
                    out.insert(
                        name.to_string(),
                        Value::String(STATUS_UNAVAILABLE.to_string()),
                    );
                }
                out.insert("error".to_string(), Value::String(err.message));
            }
        }
        Ok(Value::Object(out))
    }

    async fn diagnose(&self, args: &Value) -> Result<Value, ToolError> {
        let service = self.service_name(args)?;
        let target = self.admit(args)?;
        let mut diagnostics = serde_json::Map::new();
        for (check, command) in diagnose_probes(&service) {
            self.trace_probes("diagnose", &target.target().host, [check]);
            let request = AdmittedRequest::probe(
                &target,
                command,
                Duration::from_secs(TIMEOUT_DIAGNOSE_PROBE_SECS),
            );
            let outcome = self.engine.execute(request).await;
            diagnostics.insert(check.to_string(), check_entry(outcome));
        }
        Ok(serde_json::json!({
            "host": target.target().host,
            "service": service,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "diagnostics": diagnostics,
        }))
    }

    async fn service_status(&self, args: &Value) -> Result<Value, ToolError> {
        let service = self.service_name(args)?;
        let target = self.admit(args)?;
        let probes = vec![
            ("is_active".to_string(), format!("systemctl is-active {}", service)),
            (
                "status".to_string(),
                format!("systemctl status {} --no-pager -l", service),
            ),
        ];
        self.trace_probes(
            "service_status",
            &target.target().host,
            probes.iter().map(|(name, _)| name.as_str()),
        );
        let results = self
            .engine
            .execute_batch(
                &target,
                probes,
                Duration::from_secs(TIMEOUT_SERVICE_PROBE_SECS),
            )
            .await?;
        let mut is_active = false;
        let mut details = String::new();
        for (name, outcome) in results {
            let result = outcome?;
            match name.as_str() {
                "is_active" => is_active = result.stdout.trim() == "active",
                _ => details = result.stdout,
            }
        }
        Ok(serde_json::json!({
            "service": service,
            "is_active": is_active,
            "details": details,
        }))
    }

    async fn containers(&self, args: &Value) -> Result<Value, ToolError> {
        let name = self
            .validation
            .ensure_optional_string(args.get("container_name"), "container_name", true)?
            .map(|raw| self.validation.ensure_identifier(&raw, "container_name"))
            .transpose()?;
        let target = self.admit(args)?;
        let request = AdmittedRequest::probe(
            &target,
            container_probe(name.as_deref()),
            Duration::from_secs(TIMEOUT_SERVICE_PROBE_SECS),
        );
        let result = self.engine.execute(request).await?;
        if !result.stderr.trim().is_empty() {
            return Ok(serde_json::json!({ "error": result.stderr, "containers": [] }));
        }
        Ok(serde_json::json!({ "containers": parse_container_rows(&result.stdout) }))
    }

    async fn pods(&self, args: &Value) -> Result<Value, ToolError> {
        let namespace = match self
            .validation
            .ensure_optional_string(args.get("namespace"), "namespace", true)?
        {
            Some(raw) => self.validation.ensure_identifier(&raw, "namespace")?,
            None => "default".to_string(),
        };
        let target = self.admit(args)?;
        let request = AdmittedRequest::probe(
            &target,
            format!("kubectl get pods -n {} -o wide", namespace),
            Duration::from_secs(TIMEOUT_PODS_PROBE_SECS),
        );
        let result = self.engine.execute(request).await?;
        let error = if result.stderr.is_empty() {
            Value::Null
        } else {
            Value::String(result.stderr)
        };
        Ok(serde_json::json!({
            "namespace": namespace,
            "output": result.stdout,
            "error": error,
        }))
    }

    fn service_name(&self, args: &Value) -> Result<String, ToolError> {
        let raw = self.validation.ensure_string(
            args.get("service_name")
                .or_else(|| args.get("service"))
                .unwrap_or(&Value::Null),
            "service_name",
            true,
        )?;
        self.validation.ensure_identifier(&raw, "service_name")
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for DiagnosticsManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.logger.debug("handle_action", args.get("action"));
        self.handle_action(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_rows_skip_short_lines() {
        let rows = parse_container_rows("abc\tweb\tUp 2 hours\t0.0.0.0:80->80/tcp\nbad line\ndef\tdb\tExited (0)\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ports"], "0.0.0.0:80->80/tcp");
        assert_eq!(rows[1]["name"], "db");
        assert_eq!(rows[1]["ports"], "");
    }

    #[test]
    fn probe_trace_names_host_and_check() {
        let line = Logger::new("opsguard").child("ops").format_line(
            crate::services::logger::LogLevel::Debug,
            "Running probe",
            Some(&probe_meta("diagnose", "web01", "recent_logs")),
        );
        assert!(line.contains("DEBUG [opsguard:ops] Running probe"));
        assert!(line.contains("\"host\":\"web01\""));
        assert!(line.contains("\"check\":\"recent_logs\""));
    }

    #[test]
    fn container_probe_embeds_filter() {
        assert!(container_probe(Some("web")).contains("--filter 'name=web'"));
        assert!(!container_probe(None).contains("--filter"));
    }

    #[test]
    fn empty_metric_output_is_unavailable() {
        let empty = Ok(ExecutionResult {
            stdout: "  \n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
            elapsed_ms: 1.0,
            truncated: false,
        });
        assert_eq!(metric_value(&empty), STATUS_UNAVAILABLE);
        assert_eq!(
            metric_value(&Err(ToolError::timeout("slow"))),
            STATUS_UNAVAILABLE
        );
    }

    #[test]
    fn check_entry_prefers_stdout() {
        let result = ExecutionResult {
            stdout: String::new(),
            stderr: "Unit foo.service could not be found.".to_string(),
            exit_code: 4,
            success: false,
            elapsed_ms: 1.0,
            truncated: false,
        };
        let entry = check_entry(Ok(result));
        assert_eq!(entry["success"], false);
        assert_eq!(entry["output"], "Unit foo.service could not be found.");
        let failed = check_entry(Err(ToolError::connection("refused")));
        assert_eq!(failed["output"], "refused");
    }
}
