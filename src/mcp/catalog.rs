use crate::errors::{ErrorCode, McpError};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

static TOOL_CATALOG: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    serde_json::from_str(raw).expect("tool_catalog.json must be valid JSON")
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for tool in TOOL_CATALOG.iter() {
        if let Ok(schema) = JSONSchema::compile(&tool.input_schema) {
            map.insert(tool.name.clone(), schema);
        }
    }
    map
});

pub fn tool_catalog() -> &'static Vec<ToolDef> {
    &TOOL_CATALOG
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_CATALOG.iter().find(|tool| tool.name == name)
}

pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), McpError> {
    let Some(schema) = TOOL_VALIDATORS.get(tool_name) else {
        return Ok(());
    };
    if let Err(errors) = schema.validate(args) {
        let header = match args.get("action").and_then(|v| v.as_str()) {
            Some(action) => format!("Invalid arguments for {}:{}", tool_name, action),
            None => format!("Invalid arguments for {}", tool_name),
        };
        let rendered: Vec<String> = errors
            .take(10)
            .map(|err| {
                let path = err.instance_path.to_string();
                let path = if path.is_empty() { "(root)".to_string() } else { path };
                // Values are not echoed; a rejected password must not leak.
                format!("{}: {}", path, describe_kind(&err.kind))
            })
            .collect();
        return Err(McpError::new(
            ErrorCode::InvalidParams,
            format!("{}\n{}", header, rendered.join("\n")),
        ));
    }
    Ok(())
}

fn describe_kind(kind: &jsonschema::error::ValidationErrorKind) -> String {
    use jsonschema::error::ValidationErrorKind as Kind;
    match kind {
        Kind::AdditionalProperties { unexpected } => {
            format!("unknown field(s) {}", unexpected.join(", "))
        }
        Kind::Required { property } => format!("missing required field {}", property),
        Kind::Enum { options } => format!("expected one of {}", options),
        Kind::Type { .. } => "wrong type".to_string(),
        _ => "invalid value".to_string(),
    }
}

pub fn list_tools() -> Value {
    serde_json::json!({ "tools": tool_catalog() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_lists_both_tools() {
        let names: Vec<&str> = tool_catalog().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ssh", "ops"]);
        assert!(tool_by_name("ops").is_some());
    }

    #[test]
    fn rejects_unknown_fields_and_actions() {
        let err = validate_tool_args("ssh", &json!({"action": "exec", "cmd": "uptime"}))
            .expect_err("unknown field");
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert!(err.message.contains("cmd"));

        let err = validate_tool_args("ops", &json!({"action": "reboot", "host": "h"}))
            .expect_err("bad action");
        assert!(err.message.contains("ops:reboot"));
    }

    #[test]
    fn schema_errors_do_not_echo_values() {
        let err = validate_tool_args("ssh", &json!({"action": "exec", "password": 12345678}))
            .expect_err("wrong type");
        assert!(!err.message.contains("12345678"));
    }

    #[test]
    fn accepts_well_formed_exec() {
        validate_tool_args(
            "ssh",
            &json!({"action": "exec", "host": "10.0.0.5", "port": 22, "command": "uptime"}),
        )
        .expect("valid");
    }
}
