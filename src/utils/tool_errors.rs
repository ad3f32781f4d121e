use crate::errors::ToolError;
use serde_json::Value;

pub fn unknown_action_error(tool: &str, action: Option<&Value>, known_actions: &[&str]) -> ToolError {
    let action_value = action.and_then(|v| v.as_str()).unwrap_or("").trim();
    let close: Vec<&str> = if action_value.is_empty() {
        Vec::new()
    } else {
        let needle = action_value.to_lowercase();
        known_actions
            .iter()
            .copied()
            .filter(|known| known.contains(needle.as_str()) || needle.contains(known))
            .collect()
    };
    let mut hint = format!("Use one of: {}.", known_actions.join(", "));
    if !close.is_empty() {
        hint = format!("Did you mean: {}? {}", close.join(", "), hint);
    }
    let message = if action_value.is_empty() {
        format!("{}: action is required", tool)
    } else {
        format!("{}: unknown action '{}'", tool, action_value)
    };
    ToolError::invalid_params(message)
        .with_hint(hint)
        .with_details(serde_json::json!({
            "tool": tool,
            "action": action_value,
            "known_actions": known_actions,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_actions() {
        let err = unknown_action_error(
            "ops",
            Some(&serde_json::json!("service")),
            &["status", "service_status", "pods"],
        );
        assert!(err.message.contains("unknown action 'service'"));
        assert!(err.hint.as_deref().unwrap_or("").contains("Did you mean: service_status?"));
    }

    #[test]
    fn missing_action_is_invalid_params() {
        let err = unknown_action_error("ssh", None, &["exec"]);
        assert_eq!(err.code, "INVALID_PARAMS");
        assert!(err.message.contains("action is required"));
    }
}
