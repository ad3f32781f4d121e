use crate::constants::limits::{MAX_COMMAND_LENGTH, REJECTION_PREFIX_SAMPLE};
use crate::services::policy::{Policy, Verdict};

/// Admission check for caller-supplied commands.
///
/// The deny check runs first, on the original string, so a dangerous pattern
/// is reported as such whether or not a prefix matched. The allow check then
/// compares the trimmed, lowercased command against the prefix list.
pub fn validate_command(command: &str, policy: &Policy) -> Verdict {
    let normalized = command.trim().to_lowercase();
    if normalized.is_empty() {
        return Verdict::reject("Command must not be empty");
    }
    if command.contains('\0') {
        return Verdict::reject("Command contains null bytes");
    }
    if command.chars().any(|c| c.is_ascii_control() && c != '\t') {
        return Verdict::reject("Command contains control characters");
    }
    if command.len() > MAX_COMMAND_LENGTH {
        return Verdict::reject(format!(
            "Command exceeds {} bytes",
            MAX_COMMAND_LENGTH
        ));
    }

    let lowered = command.to_lowercase();
    if let Some(pattern) = policy
        .dangerous_patterns()
        .iter()
        .find(|pattern| pattern.matches(command, &lowered, policy.benign_pipe_filters()))
    {
        return Verdict::reject(format!(
            "Command contains a forbidden pattern: {}",
            pattern.label()
        ));
    }

    let prefix_match = policy
        .allowed_command_prefixes()
        .iter()
        .any(|prefix| normalized.starts_with(prefix.as_str()));
    if !prefix_match {
        return Verdict::reject(missing_prefix_reason(&normalized, policy));
    }

    Verdict::allow()
}

fn missing_prefix_reason(normalized: &str, policy: &Policy) -> String {
    let head = normalized.split_whitespace().next().unwrap_or(normalized);
    let base = format!("Command '{}' does not start with an allowed prefix", head);
    if !policy.reveal_allowed_prefixes() {
        return base;
    }
    let prefixes = policy.allowed_command_prefixes();
    let sample = prefixes
        .iter()
        .take(REJECTION_PREFIX_SAMPLE)
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let more = if prefixes.len() > REJECTION_PREFIX_SAMPLE {
        ", ..."
    } else {
        ""
    };
    format!("{}. Allowed prefixes: {}{}", base, sample, more)
}
