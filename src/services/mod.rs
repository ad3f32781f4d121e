pub mod audit;
pub mod command_validator;
pub mod executor;
pub mod gate;
pub mod host_keys;
pub mod host_validator;
pub mod logger;
pub mod policy;
pub mod settings;
pub mod tool_executor;
pub mod transport;
pub mod validation;
