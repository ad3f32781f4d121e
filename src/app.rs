use crate::errors::ToolError;
use crate::managers::diagnostics::DiagnosticsManager;
use crate::managers::ssh::SshManager;
use crate::mcp::catalog::tool_catalog;
use crate::services::audit::AuditService;
use crate::services::executor::ExecutionEngine;
use crate::services::gate::CommandGate;
use crate::services::host_keys::KnownHosts;
use crate::services::logger::Logger;
use crate::services::settings::Settings;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::transport::{Ssh2Connector, SshConnector};
use crate::services::validation::Validation;
use std::collections::HashMap;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub settings: Arc<Settings>,
    pub gate: CommandGate,
    pub ssh: Arc<SshManager>,
    pub ops: Arc<DiagnosticsManager>,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    fn validate_tool_wiring(handlers: &HashMap<String, Arc<dyn ToolHandler>>) -> Result<(), ToolError> {
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .filter(|tool| !handlers.contains_key(&tool.name))
            .map(|tool| tool.name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool in tool_catalog.json must have a handler.")
            .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    /// Reads configuration from the environment and connects over real SSH.
    pub fn initialize() -> Result<Self, ToolError> {
        let logger = Logger::new("opsguard");
        let settings = Settings::from_env()?;
        let known_hosts = Arc::new(KnownHosts::new(settings.known_hosts_path.clone()));
        let connector: Arc<dyn SshConnector> = Arc::new(Ssh2Connector::new(
            logger.clone(),
            settings.host_key_policy,
            known_hosts,
        ));
        Self::with_connector(logger, settings, connector)
    }

    pub fn with_connector(
        logger: Logger,
        settings: Settings,
        connector: Arc<dyn SshConnector>,
    ) -> Result<Self, ToolError> {
        let policy = Arc::new(settings.build_policy()?);
        logger.info(
            "Policy loaded",
            Some(&serde_json::json!({
                "allowed_prefixes": policy.allowed_command_prefixes().len(),
                "dangerous_patterns": policy.dangerous_patterns().len(),
                "host_allow_list": !policy.allowed_hosts().is_unrestricted(),
                "host_key_policy": settings.host_key_policy.as_str(),
            })),
        );

        let settings = Arc::new(settings);
        let validation = Validation::new();
        let gate = CommandGate::new(policy);
        let engine = ExecutionEngine::new(logger.clone(), connector, settings.connect_timeout);
        let audit = Arc::new(AuditService::new(logger.clone(), settings.audit_path.clone()));

        let ssh = Arc::new(SshManager::new(
            logger.clone(),
            settings.clone(),
            validation.clone(),
            gate.clone(),
            engine.clone(),
            audit,
        ));
        let ops = Arc::new(DiagnosticsManager::new(
            logger.clone(),
            settings.clone(),
            validation,
            gate.clone(),
            engine,
        ));

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert("ssh".to_string(), ssh.clone());
        handlers.insert("ops".to_string(), ops.clone());
        Self::validate_tool_wiring(&handlers)?;
        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));

        Ok(Self {
            logger,
            settings,
            gate,
            ssh,
            ops,
            tool_executor,
        })
    }
}
