use crate::constants::limits::MAX_HOSTNAME_LENGTH;
use crate::services::policy::{Policy, Verdict};
use once_cell::sync::Lazy;
use regex::Regex;

static DOTTED_QUAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("dotted quad regex"));

static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("hostname regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Ipv4,
    Hostname,
}

/// Syntactic classification only; `None` means neither grammar matched.
pub fn classify_host(host: &str) -> Option<HostKind> {
    if DOTTED_QUAD.is_match(host) {
        // Anything shaped like an address must be a valid one; "999.1.1.1"
        // never falls back to the hostname grammar.
        return valid_octets(host).then_some(HostKind::Ipv4);
    }
    if host.len() > MAX_HOSTNAME_LENGTH || !HOSTNAME.is_match(host) {
        return None;
    }
    let last_label = host.rsplit('.').next().unwrap_or(host);
    if last_label.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(HostKind::Hostname)
}

fn valid_octets(host: &str) -> bool {
    host.split('.').all(|octet| {
        let leading_zero = octet.len() > 1 && octet.starts_with('0');
        !leading_zero && octet.parse::<u16>().map(|v| v <= 255).unwrap_or(false)
    })
}

pub fn validate_host(host: &str, policy: &Policy) -> Verdict {
    if host.is_empty() {
        return Verdict::reject("Host must not be empty");
    }
    if classify_host(host).is_none() {
        return Verdict::reject(format!("Invalid host address: {}", host));
    }
    if !policy.allowed_hosts().admits(host) {
        return Verdict::reject(format!("Host {} is not in the allowed host list", host));
    }
    Verdict::allow()
}
