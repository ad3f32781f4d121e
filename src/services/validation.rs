use crate::constants::limits::{MAX_PORT, MAX_TIMEOUT_SECS, MIN_PORT};
use crate::errors::ToolError;
use crate::services::gate::ConnectionTarget;
use crate::services::settings::Settings;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9@._:-]+$").expect("identifier regex"));

/// Argument parsing shared by the CLI, the stdio server and the managers.
#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(
        &self,
        value: &Value,
        label: &str,
        trim: bool,
    ) -> Result<String, ToolError> {
        let text = value.as_str().ok_or_else(|| {
            ToolError::invalid_params(format!("{} must be a non-empty string", label))
        })?;
        let normalized = text.trim();
        if normalized.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        Ok(if trim {
            normalized.to_string()
        } else {
            text.to_string()
        })
    }

    pub fn ensure_optional_string(
        &self,
        value: Option<&Value>,
        label: &str,
        trim: bool,
    ) -> Result<Option<String>, ToolError> {
        match value {
            None => Ok(None),
            Some(val) if val.is_null() => Ok(None),
            Some(val) => self.ensure_string(val, label, trim).map(Some),
        }
    }

    pub fn ensure_port(&self, value: Option<&Value>, fallback: u16) -> Result<u16, ToolError> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(fallback);
        };
        let numeric = value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
            .filter(|n| *n >= MIN_PORT as i64 && *n <= MAX_PORT as i64)
            .ok_or_else(|| {
                ToolError::invalid_params(format!(
                    "Port must be an integer between {} and {}",
                    MIN_PORT, MAX_PORT
                ))
            })?;
        Ok(numeric as u16)
    }

    pub fn ensure_timeout(
        &self,
        value: Option<&Value>,
        fallback: Duration,
    ) -> Result<Duration, ToolError> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(fallback);
        };
        let secs = value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse::<u64>().ok()))
            .filter(|n| *n > 0 && *n <= MAX_TIMEOUT_SECS)
            .ok_or_else(|| {
                ToolError::invalid_params(format!(
                    "timeout must be an integer between 1 and {} seconds",
                    MAX_TIMEOUT_SECS
                ))
            })?;
        Ok(Duration::from_secs(secs))
    }

    /// Names interpolated into compiled-in probes (services, containers,
    /// namespaces). Shell metacharacters and whitespace never pass.
    pub fn ensure_identifier(&self, value: &str, label: &str) -> Result<String, ToolError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        if trimmed.len() > 253 || !IDENTIFIER.is_match(trimmed) || trimmed.starts_with('-') {
            return Err(ToolError::invalid_params(format!(
                "{} may only contain letters, digits and @ . _ : -",
                label
            ))
            .with_details(serde_json::json!({ "value": crate::utils::text::abbreviate(trimmed, 64) })));
        }
        Ok(trimmed.to_string())
    }

    /// Builds a target from `{host, port?, username?, password?, host_key_fingerprint?}`,
    /// filling the gaps from the configured defaults.
    pub fn ensure_target(&self, args: &Value, settings: &Settings) -> Result<ConnectionTarget, ToolError> {
        let host = self.ensure_string(args.get("host").unwrap_or(&Value::Null), "host", true)?;
        let port = self.ensure_port(args.get("port"), settings.default_port)?;
        let username = self
            .ensure_optional_string(args.get("username"), "username", true)?
            .unwrap_or_else(|| settings.default_username.clone());
        let password = match args.get("password") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => settings.default_password.clone(),
            Some(_) => return Err(ToolError::invalid_params("password must be a string")),
        };
        let fingerprint =
            self.ensure_optional_string(args.get("host_key_fingerprint"), "host_key_fingerprint", true)?;
        Ok(ConnectionTarget::new(host, port, username, password).with_host_key_fingerprint(fingerprint))
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_grammar_blocks_shell_syntax() {
        let v = Validation::new();
        assert_eq!(v.ensure_identifier(" nginx.service ", "service").expect("ok"), "nginx.service");
        assert!(v.ensure_identifier("kube-system", "namespace").is_ok());
        for bad in ["nginx; reboot", "a b", "$(id)", "x|grep", "-rf", "svc`id`", ""] {
            assert!(v.ensure_identifier(bad, "service").is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn target_falls_back_to_defaults() {
        let settings = Settings {
            default_password: "fallback".to_string(),
            default_username: "ops".to_string(),
            ..Settings::default()
        };
        let target = Validation::new()
            .ensure_target(&json!({"host": "10.0.0.5"}), &settings)
            .expect("target");
        assert_eq!(target.port, 22);
        assert_eq!(target.username, "ops");
        assert_eq!(target.password(), "fallback");

        let explicit = Validation::new()
            .ensure_target(
                &json!({"host": "db01", "port": "2222", "username": "admin", "password": "pw"}),
                &settings,
            )
            .expect("target");
        assert_eq!(explicit.port, 2222);
        assert_eq!(explicit.password(), "pw");
    }

    #[test]
    fn rejects_bad_port_and_timeout() {
        let v = Validation::new();
        assert!(v.ensure_port(Some(&json!(0)), 22).is_err());
        assert!(v.ensure_port(Some(&json!("x")), 22).is_err());
        assert_eq!(v.ensure_port(None, 22).expect("default"), 22);
        assert!(v.ensure_timeout(Some(&json!(0)), Duration::from_secs(30)).is_err());
        assert_eq!(
            v.ensure_timeout(Some(&json!(5)), Duration::from_secs(30)).expect("timeout"),
            Duration::from_secs(5)
        );
        assert!(v.ensure_target(&json!({}), &Settings::default()).is_err());
    }
}
