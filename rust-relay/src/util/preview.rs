//! Log-friendly previews of payloads. Used for logging only.

use serde_json::Value;

/// Truncate `s` to at most `max` characters, noting the full length.
pub fn preview_str(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}... ({} chars)", &s[..cut], s.chars().count()),
        None => s.to_string(),
    }
}

/// Hex dump of the first `max_bytes` bytes.
pub fn preview_hex(bytes: &[u8], max_bytes: usize) -> String {
    let shown = bytes
        .iter()
        .take(max_bytes)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > max_bytes {
        format!("hex:{shown}... ({} bytes)", bytes.len())
    } else {
        format!("hex:{shown} ({} bytes)", bytes.len())
    }
}

/// One-line description of a webhook payload.
///
/// JSON payloads are described by their `type`/`event`/`action` and `id`
/// fields, other text by a short preview, binary data by a hex preview.
pub fn summarize_payload(bytes: &[u8]) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return preview_hex(bytes, 24);
    };

    if let Ok(json) = serde_json::from_str::<Value>(text) {
        let mut parts = Vec::new();

        let kind = ["type", "event", "action"]
            .iter()
            .find_map(|field| json.get(field).and_then(Value::as_str).map(|v| (field, v)));
        if let Some((field, value)) = kind {
            parts.push(format!("{field}:{value}"));
        }

        if let Some(id) = json.get("id").and_then(Value::as_str) {
            if id.chars().count() > 12 {
                let short: String = id.chars().take(8).collect();
                parts.push(format!("id:{short}..."));
            } else {
                parts.push(format!("id:{id}"));
            }
        }

        if !parts.is_empty() {
            return parts.join(" ");
        }
    }

    preview_str(text, 40)
}
