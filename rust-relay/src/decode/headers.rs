//! Attribute to header mapping.
//!
//! The ingress templates store selected request headers as message attributes,
//! under names that differ between template versions. A mapping entry names
//! the attribute to read and the header to write it to.

use reqwest::header::HeaderName;
use tracing::warn;

/// One forwarded attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMapping {
    /// Attribute name, matched ignoring ASCII case
    pub attribute: String,
    /// Header written on the outbound request
    pub header: HeaderName,
}

impl HeaderMapping {
    /// Parse a single `Attribute` or `Attribute=header-name` entry.
    ///
    /// Without an explicit header the lowercased attribute name is used.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }

        let (attribute, header) = match entry.split_once('=') {
            Some((attr, header)) => (attr.trim(), header.trim()),
            None => (entry, entry),
        };
        if attribute.is_empty() {
            return None;
        }

        match HeaderName::from_bytes(header.to_ascii_lowercase().as_bytes()) {
            Ok(header) => Some(Self {
                attribute: attribute.to_string(),
                header,
            }),
            Err(_) => {
                warn!(entry = %entry, "header_mapping_invalid_header_name");
                None
            }
        }
    }

    /// Parse a comma-separated list, skipping blank and invalid entries.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',').filter_map(Self::parse).collect()
    }
}
