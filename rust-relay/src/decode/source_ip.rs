//! Best-effort client address recovery for `X-Forwarded-For`.

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::queue::QueuedMessage;

/// Attribute names the ingress has used for the caller's address.
pub const SOURCE_IP_ATTRIBUTES: &[&str] = &[
    "sourceip",
    "source-ip",
    "clientip",
    "client-ip",
    "originatingip",
    "originating-ip",
    "remote-addr",
    "x-real-ip",
];

/// Body fields checked when no attribute carried the address. Dotted names are paths.
const SOURCE_IP_BODY_FIELDS: &[&str] = &[
    "sourceIp",
    "source_ip",
    "clientIp",
    "client_ip",
    "originatingIp",
    "originating_ip",
    "remoteAddr",
    "remote_addr",
    "requestContext.identity.sourceIp",
    "headers.x-forwarded-for",
    "headers.x-real-ip",
    "requestInfo.remoteIp",
    "request.ip",
    "ip",
];

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Address carried in one of the [`SOURCE_IP_ATTRIBUTES`].
pub fn from_attributes(message: &QueuedMessage) -> Option<String> {
    SOURCE_IP_ATTRIBUTES.iter().find_map(|name| {
        message
            .attribute(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| {
                debug!(message_id = %message.id, attribute = name, "source_ip_from_attribute");
                v.to_string()
            })
    })
}

/// Address found in a JSON body, if the body is JSON at all.
pub fn from_json_body(bytes: &[u8]) -> Option<String> {
    let json: Value = serde_json::from_slice(bytes).ok()?;

    SOURCE_IP_BODY_FIELDS.iter().find_map(|field| {
        let value = field
            .split('.')
            .try_fold(&json, |current, part| current.get(part))?;
        value.as_str().map(|ip| {
            debug!(field = field, "source_ip_from_body");
            ip.to_string()
        })
    })
}

/// Append `ip` to `X-Forwarded-For`, creating the header when absent.
pub fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let combined = match headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if existing.split(',').any(|hop| hop.trim() == ip) => return,
        Some(existing) => format!("{existing}, {ip}"),
        None => ip.to_string(),
    };

    if let Ok(value) = HeaderValue::from_str(&combined) {
        headers.insert(FORWARDED_FOR, value);
    }
}
