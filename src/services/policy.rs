use crate::errors::ToolError;
use crate::utils::text::split_csv;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

const REGEX_PREFIX: &str = "re:";
const PIPE_TOKEN: &str = "|";

pub const DEFAULT_ALLOWED_COMMAND_PREFIXES: &[&str] = &[
    "kubectl get",
    "kubectl describe",
    "kubectl logs",
    "kubectl top",
    "docker ps",
    "docker logs",
    "docker inspect",
    "docker stats",
    "systemctl status",
    "systemctl is-active",
    "df -h",
    "free -m",
    "top -bn1",
    "ps aux",
    "netstat -tlnp",
    "ss -tlnp",
    "ping",
    "curl",
    "cat /var/log",
    "tail -f",
    "journalctl",
    "uptime",
    "hostname",
    "whoami",
    "date",
    "uname",
    "ip addr",
    "ip route",
    "cat /etc/hosts",
    "cat /etc/resolv.conf",
];

/// Literal entries match as case-insensitive substrings, `re:` entries as
/// case-insensitive regexes, and a lone `|` is the pipe rule.
pub const DEFAULT_DANGEROUS_PATTERNS: &[&str] = &[
    ";",
    "&&",
    "||",
    "&",
    "|",
    "`",
    "$(",
    ">",
    "<",
    r"re:rm\s+-rf",
    r"re:rm\s+-r",
    "mkfs",
    r"re:dd\s+if=",
    "shutdown",
    "reboot",
    r"re:init\s+0",
    "halt",
    "poweroff",
];

pub const DEFAULT_BENIGN_PIPE_FILTERS: &[&str] = &["grep"];

/// Outcome of a host or command check. `reason` is present iff rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn into_result(self) -> Result<(), ToolError> {
        if self.allowed {
            return Ok(());
        }
        Err(ToolError::denied(
            self.reason
                .unwrap_or_else(|| "Rejected by policy".to_string()),
        ))
    }
}

#[derive(Debug, Clone)]
pub enum DangerousPattern {
    Literal(String),
    Regex { source: String, regex: Regex },
    /// A bare pipe, unless the next word is one of the benign filters.
    Pipe,
}

impl DangerousPattern {
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        if raw == PIPE_TOKEN {
            return Ok(DangerousPattern::Pipe);
        }
        if let Some(source) = raw.strip_prefix(REGEX_PREFIX) {
            let regex = RegexBuilder::new(source)
                .case_insensitive(true)
                .build()
                .map_err(|err| {
                    ToolError::invalid_params(format!(
                        "Invalid dangerous pattern regex '{}': {}",
                        source, err
                    ))
                })?;
            return Ok(DangerousPattern::Regex {
                source: source.to_string(),
                regex,
            });
        }
        if raw.is_empty() {
            return Err(ToolError::invalid_params(
                "Dangerous patterns must not be empty",
            ));
        }
        Ok(DangerousPattern::Literal(raw.to_lowercase()))
    }

    pub fn label(&self) -> &str {
        match self {
            DangerousPattern::Literal(text) => text,
            DangerousPattern::Regex { source, .. } => source,
            DangerousPattern::Pipe => PIPE_TOKEN,
        }
    }

    /// `command` is the caller's original string; `lowered` its lowercase form.
    pub(crate) fn matches(&self, command: &str, lowered: &str, benign_filters: &[String]) -> bool {
        match self {
            DangerousPattern::Literal(text) => lowered.contains(text.as_str()),
            DangerousPattern::Regex { regex, .. } => regex.is_match(command),
            DangerousPattern::Pipe => has_unfiltered_pipe(lowered, benign_filters),
        }
    }
}

// Whitespace between `|` and the filter is skipped: the shell ignores it, and
// `ps aux | grep x` is the form callers actually send.
fn has_unfiltered_pipe(lowered: &str, benign_filters: &[String]) -> bool {
    for (idx, _) in lowered.match_indices('|') {
        let rest = &lowered[idx + 1..];
        if rest.starts_with('|') || lowered[..idx].ends_with('|') {
            return true;
        }
        let next = rest.trim_start();
        let benign = benign_filters.iter().any(|filter| {
            next.strip_prefix(filter.as_str())
                .map(|tail| tail.is_empty() || tail.starts_with(char::is_whitespace))
                .unwrap_or(false)
        });
        if !benign {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRule {
    Exact(String),
    Cidr { network: u32, prefix: u8 },
}

impl HostRule {
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        let trimmed = raw.trim();
        let Some((addr, prefix)) = trimmed.split_once('/') else {
            return Ok(HostRule::Exact(trimmed.to_lowercase()));
        };
        let addr: Ipv4Addr = addr.parse().map_err(|_| {
            ToolError::invalid_params(format!("Invalid CIDR network address: {}", trimmed))
        })?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| {
                ToolError::invalid_params(format!("Invalid CIDR prefix length: {}", trimmed))
            })?;
        Ok(HostRule::Cidr {
            network: u32::from(addr) & cidr_mask(prefix),
            prefix,
        })
    }

    fn admits(&self, host: &str, ipv4: Option<Ipv4Addr>) -> bool {
        match self {
            HostRule::Exact(entry) => entry.eq_ignore_ascii_case(host),
            HostRule::Cidr { network, prefix } => ipv4
                .map(|ip| u32::from(ip) & cidr_mask(*prefix) == *network)
                .unwrap_or(false),
        }
    }
}

fn cidr_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostAllowList {
    rules: Vec<HostRule>,
}

impl HostAllowList {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ToolError> {
        let rules = entries
            .iter()
            .map(|entry| entry.as_ref().trim())
            .filter(|entry| !entry.is_empty())
            .map(HostRule::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn is_unrestricted(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn admits(&self, host: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let ipv4 = host.parse::<Ipv4Addr>().ok();
        self.rules.iter().any(|rule| rule.admits(host, ipv4))
    }
}

/// On-disk / env form of the policy. Every field is optional; missing fields
/// fall back to the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub allowed_command_prefixes: Option<Vec<String>>,
    pub dangerous_patterns: Option<Vec<String>>,
    pub allowed_hosts: Option<Vec<String>>,
    pub benign_pipe_filters: Option<Vec<String>>,
    pub reveal_allowed_prefixes: Option<bool>,
}

impl PolicyConfig {
    pub fn load_file(path: &Path) -> Result<Self, ToolError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ToolError::invalid_params(format!(
                "Failed to read policy file {}: {}",
                path.display(),
                err
            ))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            ToolError::invalid_params(format!(
                "Invalid policy file {}: {}",
                path.display(),
                err
            ))
        })
    }

    /// Env values override file values field by field.
    pub fn overlay_env(mut self) -> Self {
        if let Ok(raw) = std::env::var("OPSGUARD_ALLOWED_COMMANDS") {
            self.allowed_command_prefixes = Some(split_csv(&raw));
        }
        if let Ok(raw) = std::env::var("OPSGUARD_DANGEROUS_PATTERNS") {
            self.dangerous_patterns = Some(split_csv(&raw));
        }
        if let Ok(raw) = std::env::var("OPSGUARD_ALLOWED_HOSTS") {
            self.allowed_hosts = Some(split_csv(&raw));
        }
        if let Ok(raw) = std::env::var("OPSGUARD_REVEAL_ALLOWED_PREFIXES") {
            self.reveal_allowed_prefixes = Some(matches!(
                raw.trim().to_lowercase().as_str(),
                "1" | "true" | "yes"
            ));
        }
        self
    }
}

/// Immutable allow/deny policy. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Policy {
    allowed_command_prefixes: Vec<String>,
    dangerous_patterns: Vec<DangerousPattern>,
    allowed_hosts: HostAllowList,
    benign_pipe_filters: Vec<String>,
    reveal_allowed_prefixes: bool,
}

impl Policy {
    pub fn from_config(config: PolicyConfig) -> Result<Self, ToolError> {
        let allowed_command_prefixes = config
            .allowed_command_prefixes
            .unwrap_or_else(|| to_owned(DEFAULT_ALLOWED_COMMAND_PREFIXES))
            .into_iter()
            .map(|prefix| prefix.trim().to_lowercase())
            .filter(|prefix| !prefix.is_empty())
            .collect::<Vec<_>>();
        if allowed_command_prefixes.is_empty() {
            return Err(ToolError::invalid_params(
                "Allowed command prefix list must not be empty",
            ));
        }
        let dangerous_patterns = config
            .dangerous_patterns
            .unwrap_or_else(|| to_owned(DEFAULT_DANGEROUS_PATTERNS))
            .iter()
            .map(|raw| DangerousPattern::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let allowed_hosts = HostAllowList::parse(&config.allowed_hosts.unwrap_or_default())?;
        let benign_pipe_filters = config
            .benign_pipe_filters
            .unwrap_or_else(|| to_owned(DEFAULT_BENIGN_PIPE_FILTERS))
            .into_iter()
            .map(|filter| filter.trim().to_lowercase())
            .filter(|filter| !filter.is_empty())
            .collect();
        Ok(Self {
            allowed_command_prefixes,
            dangerous_patterns,
            allowed_hosts,
            benign_pipe_filters,
            reveal_allowed_prefixes: config.reveal_allowed_prefixes.unwrap_or(true),
        })
    }

    pub fn with_allowed_hosts<S: AsRef<str>>(mut self, hosts: &[S]) -> Result<Self, ToolError> {
        self.allowed_hosts = HostAllowList::parse(hosts)?;
        Ok(self)
    }

    pub fn with_allowed_prefixes<S: AsRef<str>>(mut self, prefixes: &[S]) -> Self {
        self.allowed_command_prefixes = prefixes
            .iter()
            .map(|prefix| prefix.as_ref().trim().to_lowercase())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        self
    }

    pub fn with_reveal_allowed_prefixes(mut self, reveal: bool) -> Self {
        self.reveal_allowed_prefixes = reveal;
        self
    }

    pub fn allowed_command_prefixes(&self) -> &[String] {
        &self.allowed_command_prefixes
    }

    pub fn dangerous_patterns(&self) -> &[DangerousPattern] {
        &self.dangerous_patterns
    }

    pub fn allowed_hosts(&self) -> &HostAllowList {
        &self.allowed_hosts
    }

    pub fn benign_pipe_filters(&self) -> &[String] {
        &self.benign_pipe_filters
    }

    pub fn reveal_allowed_prefixes(&self) -> bool {
        self.reveal_allowed_prefixes
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_config(PolicyConfig::default()).expect("built-in policy is valid")
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_rules_use_real_network_arithmetic() {
        let list = HostAllowList::parse(&["10.0.0.0/24"]).expect("valid list");
        assert!(list.admits("10.0.0.5"));
        assert!(list.admits("10.0.0.255"));
        assert!(!list.admits("10.0.1.5"));
        // A string-prefix comparison on "10.0.0" would wrongly admit this.
        assert!(!list.admits("10.0.00.5"));
        assert!(!list.admits("db01.internal"));
    }

    #[test]
    fn cidr_network_bits_are_masked() {
        assert_eq!(
            HostRule::parse("192.168.7.9/16").expect("valid rule"),
            HostRule::Cidr {
                network: u32::from(Ipv4Addr::new(192, 168, 0, 0)),
                prefix: 16
            }
        );
        let any = HostAllowList::parse(&["0.0.0.0/0"]).expect("valid list");
        assert!(any.admits("203.0.113.9"));
    }

    #[test]
    fn bad_cidr_entries_fail_loading() {
        assert!(HostRule::parse("10.0.0.0/33").is_err());
        assert!(HostRule::parse("10.0.0/8").is_err());
    }

    #[test]
    fn exact_host_entries_ignore_case() {
        let list = HostAllowList::parse(&["DB01.internal", "10.0.0.5"]).expect("valid list");
        assert!(list.admits("db01.internal"));
        assert!(list.admits("10.0.0.5"));
        assert!(!list.admits("10.0.0.6"));
    }

    #[test]
    fn pipe_rule_allows_grep_filters_only() {
        let filters = vec!["grep".to_string()];
        assert!(!has_unfiltered_pipe("ps aux | grep nginx", &filters));
        assert!(!has_unfiltered_pipe("ps aux |grep nginx", &filters));
        assert!(has_unfiltered_pipe("ps aux | sh", &filters));
        assert!(has_unfiltered_pipe("ps aux | grepx", &filters));
        assert!(has_unfiltered_pipe("ps aux || grep x", &filters));
        assert!(has_unfiltered_pipe("ps aux | grep a | sh", &filters));
    }

    #[test]
    fn invalid_regex_pattern_is_a_config_error() {
        let err = DangerousPattern::parse("re:(unclosed").expect_err("must fail");
        assert_eq!(err.kind, crate::errors::ToolErrorKind::InvalidParams);
    }

    #[test]
    fn empty_prefix_list_is_rejected() {
        let config = PolicyConfig {
            allowed_command_prefixes: Some(vec!["  ".to_string()]),
            ..PolicyConfig::default()
        };
        assert!(Policy::from_config(config).is_err());
    }

    #[test]
    fn default_policy_mirrors_builtin_lists() {
        let policy = Policy::default();
        assert!(policy
            .allowed_command_prefixes()
            .contains(&"kubectl get".to_string()));
        assert_eq!(
            policy.dangerous_patterns().len(),
            DEFAULT_DANGEROUS_PATTERNS.len()
        );
        assert!(policy.allowed_hosts().is_unrestricted());
        assert!(policy.reveal_allowed_prefixes());
    }
}
