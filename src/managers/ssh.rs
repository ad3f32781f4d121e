use crate::errors::ToolError;
use crate::services::audit::{AuditRecord, AuditService};
use crate::services::executor::ExecutionEngine;
use crate::services::gate::{CommandGate, CommandRequest};
use crate::services::logger::Logger;
use crate::services::settings::Settings;
use crate::services::validation::Validation;
use crate::utils::text::abbreviate;
use crate::utils::tool_errors::unknown_action_error;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

const SSH_ACTIONS: &[&str] = &["exec", "test_connection", "validate", "allowed_commands"];

#[derive(Clone)]
pub struct SshManager {
    logger: Logger,
    settings: Arc<Settings>,
    validation: Validation,
    gate: CommandGate,
    engine: ExecutionEngine,
    audit: Arc<AuditService>,
}

impl SshManager {
    pub fn new(
        logger: Logger,
        settings: Arc<Settings>,
        validation: Validation,
        gate: CommandGate,
        engine: ExecutionEngine,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            logger: logger.child("ssh"),
            settings,
            validation,
            gate,
            engine,
            audit,
        }
    }

    pub async fn handle_action(&self, args: Value) -> Result<Value, ToolError> {
        let action = args.get("action").and_then(|v| v.as_str()).unwrap_or("");
        match action {
            "exec" => self.exec_command(&args).await,
            "test_connection" | "test" => self.test_connection(&args).await,
            "validate" => self.validate(&args),
            "allowed_commands" => Ok(self.allowed_commands()),
            _ => Err(unknown_action_error("ssh", args.get("action"), SSH_ACTIONS)),
        }
    }

    async fn exec_command(&self, args: &Value) -> Result<Value, ToolError> {
        let target = self.validation.ensure_target(args, &self.settings)?;
        let command = self.validation.ensure_string(
            args.get("command").unwrap_or(&Value::Null),
            "command",
            false,
        )?;
        let timeout = self
            .validation
            .ensure_timeout(args.get("timeout"), self.settings.default_exec_timeout)?;

        let host = target.host.clone();
        let port = target.port;
        let username = target.username.clone();
        let admitted = match self.gate.admit(CommandRequest {
            target,
            command: command.clone(),
            timeout,
        }) {
            Ok(admitted) => admitted,
            Err(err) => {
                self.logger.warn(
                    "Command rejected",
                    Some(&serde_json::json!({
                        "host": host,
                        "command": abbreviate(&command, 200),
                        "reason": err.message,
                    })),
                );
                return Err(err);
            }
        };

        let record = AuditRecord::new(&host, port, &username, &command);
        match self.engine.execute(admitted).await {
            Ok(result) => {
                self.audit.append(&record.clone().completed(result.exit_code));
                self.logger.info(
                    "Command executed",
                    Some(&serde_json::json!({
                        "request_id": record.request_id,
                        "host": host,
                        "username": username,
                        "command": abbreviate(&command, 200),
                        "exit_code": result.exit_code,
                        "elapsed_ms": result.elapsed_ms,
                    })),
                );
                let mut out = serde_json::json!({
                    "success": result.success,
                    "command": command,
                    "stdout": result.stdout,
                    "stderr": result.stderr,
                    "exit_code": result.exit_code,
                    "execution_time_ms": result.elapsed_ms,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                });
                if result.truncated {
                    out["truncated"] = Value::Bool(true);
                }
                Ok(out)
            }
            Err(err) => {
                self.audit.append(&record.clone().failed(&err.code));
                self.logger.warn(
                    "Command failed",
                    Some(&serde_json::json!({
                        "request_id": record.request_id,
                        "host": host,
                        "command": abbreviate(&command, 200),
                        "code": err.code,
                        "message": err.message,
                    })),
                );
                Err(err)
            }
        }
    }

    /// A failed connection is reported in the payload, not as an error.
    async fn test_connection(&self, args: &Value) -> Result<Value, ToolError> {
        let target = self.validation.ensure_target(args, &self.settings)?;
        let host = target.host.clone();
        let port = target.port;
        let admitted = self.gate.admit_target(target)?;
        let started = Instant::now();
        let outcome = self.engine.probe_connection(&admitted).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        Ok(match outcome {
            Ok(()) => serde_json::json!({
                "success": true,
                "message": "Connection successful",
                "host": host,
                "port": port,
                "latency_ms": latency_ms,
            }),
            Err(err) => serde_json::json!({
                "success": false,
                "message": err.message,
                "code": err.code,
                "host": host,
                "port": port,
                "latency_ms": latency_ms,
            }),
        })
    }

    fn validate(&self, args: &Value) -> Result<Value, ToolError> {
        let command = self.validation.ensure_optional_string(args.get("command"), "command", false)?;
        let host = self.validation.ensure_optional_string(args.get("host"), "host", true)?;
        if command.is_none() && host.is_none() {
            return Err(ToolError::invalid_params("validate needs a command, a host, or both"));
        }
        let host_verdict = host.as_deref().map(|h| self.gate.check_host(h));
        let command_verdict = command.as_deref().map(|c| self.gate.check_command(c));
        let allowed = host_verdict.as_ref().map_or(true, |v| v.allowed)
            && command_verdict.as_ref().map_or(true, |v| v.allowed);
        Ok(serde_json::json!({
            "allowed": allowed,
            "host": host_verdict,
            "command": command_verdict,
        }))
    }

    pub fn allowed_commands(&self) -> Value {
        serde_json::json!({
            "allowed_commands": self.gate.policy().allowed_command_prefixes(),
            "note": "Only commands starting with one of these prefixes are permitted",
        })
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for SshManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.logger.debug("handle_action", args.get("action"));
        self.handle_action(args).await
    }
}
