#![forbid(unsafe_code)]

use serde_json::json;
use swhid_contracts::swhid::{parse_swhid, TypedIdentifier};
use swhid_resolver::browse::browse_path;

/// One JSON line per identifier. Any malformed identifier fails the whole
/// command with its parse error.
pub fn execute_parse_command(texts: &[String]) -> Result<String, String> {
    if texts.is_empty() {
        return Err("usage: swhid parse <swhid> [swhid...]".to_string());
    }
    let mut lines = Vec::with_capacity(texts.len());
    for text in texts {
        let identifier = parse_swhid(text).map_err(|e| e.to_string())?;
        lines.push(describe(&identifier).to_string());
    }
    Ok(lines.join("\n"))
}

fn describe(identifier: &TypedIdentifier) -> serde_json::Value {
    json!({
        "swhid": identifier.to_string(),
        "core": identifier.core().to_string(),
        "namespace": identifier.namespace(),
        "scheme_version": identifier.scheme_version(),
        "object_type": identifier.object_type().name(),
        "object_id": identifier.object_id().to_hex(),
        "qualifiers": identifier.qualifiers(),
        "origin_url": identifier.origin_url(),
        "browse_path": browse_path(identifier),
    })
}
