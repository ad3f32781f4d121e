use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

const DEFAULT_REDACTION: &str = "[REDACTED]";
const INLINE_REDACTION: &str = "***REDACTED***";

static SENSITIVE_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password",
        "passwd",
        "passphrase",
        "private_key",
        "secret",
        "token",
        "api_key",
        "authorization",
        "default_password",
    ]
    .into_iter()
    .collect()
});

static INLINE_REDACTION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r#"(?i)\b(password|passwd|passphrase|token|secret)\b\s*([:=])\s*([^\s"'`]+)"#)
                .expect("inline redaction regex"),
            "$1$2***REDACTED***",
        ),
        (
            Regex::new(r"(?i)\b(Bearer)\s+([A-Za-z0-9._~-]{10,})\b").expect("inline redaction regex"),
            "$1 ***REDACTED***",
        ),
    ]
});

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    if SENSITIVE_KEYS.contains(normalized.as_str()) {
        return true;
    }
    normalized.contains("password") || normalized.contains("secret") || normalized.contains("token")
}

/// Scrubs inline secrets and every literal in `extra_secrets` from `value`.
pub fn redact_text(value: &str, extra_secrets: &[&str]) -> String {
    let mut out = value.to_string();
    for (re, replacement) in INLINE_REDACTION_PATTERNS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).to_string();
        }
    }
    for secret in extra_secrets {
        if secret.is_empty() {
            continue;
        }
        out = out.replace(secret, INLINE_REDACTION);
    }
    out
}

pub fn redact_object(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text, &[])),
        Value::Array(items) => Value::Array(items.iter().map(redact_object).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map.iter() {
                if is_sensitive_key(key) && !entry.is_null() {
                    out.insert(key.clone(), Value::String(DEFAULT_REDACTION.to_string()));
                    continue;
                }
                out.insert(key.clone(), redact_object(entry));
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{redact_object, redact_text};
    use serde_json::Value;

    #[test]
    fn redact_object_hides_password_fields_at_any_depth() {
        let input = serde_json::json!({
            "host": "10.0.0.5",
            "target": {"username": "root", "password": "hunter22"},
        });
        let out = redact_object(&input);
        assert_eq!(out["host"], "10.0.0.5");
        assert_eq!(out["target"]["username"], "root");
        assert_eq!(
            out["target"]["password"],
            Value::String("[REDACTED]".to_string())
        );
    }

    #[test]
    fn redact_object_keeps_null_secret_fields() {
        let out = redact_object(&serde_json::json!({"password": null}));
        assert!(out["password"].is_null());
    }

    #[test]
    fn redact_text_removes_known_secret_literals() {
        let out = redact_text("auth failed for root with s3cretpw", &["s3cretpw"]);
        assert!(!out.contains("s3cretpw"));
        assert!(out.contains("***REDACTED***"));
    }

    #[test]
    fn redact_text_masks_inline_assignments() {
        let out = redact_text("login password=abc123 rejected", &[]);
        assert_eq!(out, "login password=***REDACTED*** rejected");
    }
}
