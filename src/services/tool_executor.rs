use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::utils::redact::redact_object;

use serde_json::Value;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<Value, ToolError>;
}

/// Routes a tool name to its handler. Shared by the CLI and the stdio server.
#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn execute(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let handler = self.handlers.get(tool).cloned().ok_or_else(|| {
            ToolError::invalid_params(format!("Unknown tool: {}", tool))
                .with_hint(format!("Use one of: {}.", self.tool_names().join(", ")))
        })?;
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        let action = args
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        self.logger.debug(
            "Tool call",
            Some(&serde_json::json!({ "tool": tool, "args": redact_object(&args) })),
        );

        let started = Instant::now();
        let outcome = handler.handle(args).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => self.logger.debug(
                "Tool call finished",
                Some(&serde_json::json!({
                    "tool": tool,
                    "action": action,
                    "duration_ms": duration_ms,
                })),
            ),
            Err(err) => self.logger.warn(
                "Tool call failed",
                Some(&serde_json::json!({
                    "tool": tool,
                    "action": action,
                    "duration_ms": duration_ms,
                    "code": err.code,
                    "message": err.message,
                })),
            ),
        }
        outcome
    }
}
