use serde::Serialize;
use std::fmt;

use super::{ToolError, ToolErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    ValidationRejected = -32010,
    ConnectionFailed = -32011,
    ExecutionFailed = -32012,
    ExecutionTimedOut = -32013,
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&ToolError> for McpError {
    fn from(error: &ToolError) -> Self {
        let code = match error.kind {
            ToolErrorKind::InvalidParams => ErrorCode::InvalidParams,
            ToolErrorKind::Denied => ErrorCode::ValidationRejected,
            ToolErrorKind::Connection => ErrorCode::ConnectionFailed,
            ToolErrorKind::Execution => ErrorCode::ExecutionFailed,
            ToolErrorKind::Timeout => ErrorCode::ExecutionTimedOut,
            ToolErrorKind::Internal => ErrorCode::InternalError,
        };
        let mut message = format!("{}: {}", error.code, error.message);
        if let Some(hint) = &error.hint {
            message.push_str(&format!(" (hint: {})", hint));
        }
        McpError::new(code, message)
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for McpError {}
