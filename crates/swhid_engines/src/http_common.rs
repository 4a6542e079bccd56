#![forbid(unsafe_code)]

use std::time::Duration;

use swhid_contracts::ContractViolation;
use url::Url;

pub const HTTP_TIMEOUT_MS_MIN: u32 = 100;
pub const HTTP_TIMEOUT_MS_MAX: u32 = 60_000;
pub const DEFAULT_USER_AGENT: &str = concat!("swhid-resolver/", env!("CARGO_PKG_VERSION"));

/// Parses an API base URL and normalizes its path to end with `/` so that
/// relative joins append instead of replacing the last segment.
pub fn parse_base_url(field: &'static str, raw: &str) -> Result<Url, ContractViolation> {
    let mut url = Url::parse(raw.trim()).map_err(|_| ContractViolation::InvalidValue {
        field,
        reason: "must be an absolute URL",
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "scheme must be http or https",
        });
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not carry a query or fragment",
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub fn validate_timeout_ms(field: &'static str, timeout_ms: u32) -> Result<(), ContractViolation> {
    if !(HTTP_TIMEOUT_MS_MIN..=HTTP_TIMEOUT_MS_MAX).contains(&timeout_ms) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be within 100..=60000",
        });
    }
    Ok(())
}

pub fn build_http_agent(timeout_ms: u32, user_agent: &str) -> ureq::Agent {
    let timeout = Duration::from_millis(u64::from(timeout_ms).max(100));
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .try_proxy_from_env(false)
        .build()
}

/// Short transport failure class used in error messages and log fields.
pub fn classify_transport_error(transport: &ureq::Transport) -> &'static str {
    let lower = format!("{:?} {}", transport.kind(), transport).to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}
