//! Message decoding module.
//!
//! Turns one [`QueuedMessage`] back into the HTTP request the ingress received.
//!
//! ## Decoding Flow
//!
//! ```text
//! QueuedMessage → BodyEncoding (flag attribute) → body bytes
//!               → HeaderMapping list            → headers
//!               → ForwardRequest
//! ```

pub mod headers;
pub mod source_ip;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use tracing::{debug, warn};
use url::Url;

use crate::config::RelayConfig;
use crate::error::DecodeError;
use crate::queue::QueuedMessage;

pub use headers::HeaderMapping;

/// How the ingress stored the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// The message body is the payload itself
    RawBody,
    /// The message body is the base64 encoding of the payload
    Base64Body,
}

impl BodyEncoding {
    /// Select the strategy from the flag attribute value.
    pub fn from_flag(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") => BodyEncoding::Base64Body,
            _ => BodyEncoding::RawBody,
        }
    }

    /// Recover the original payload bytes.
    pub fn decode(&self, body: &str) -> Result<Bytes, DecodeError> {
        match self {
            BodyEncoding::RawBody => Ok(Bytes::copy_from_slice(body.as_bytes())),
            BodyEncoding::Base64Body => Ok(Bytes::from(general_purpose::STANDARD.decode(body)?)),
        }
    }
}

/// A reconstructed webhook request, ready to replay.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub message_id: String,
    pub method: Method,
    pub target_url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub encoding: BodyEncoding,
}

/// Rebuilds [`ForwardRequest`]s according to the configured attribute schema.
#[derive(Debug, Clone)]
pub struct Decoder {
    target_url: Url,
    flag_attribute: String,
    mappings: Vec<HeaderMapping>,
    forward_all: bool,
    default_content_type: Option<HeaderValue>,
    signature_header: Option<HeaderName>,
}

impl Decoder {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            target_url: config.local_url.clone(),
            flag_attribute: config.body_base64_attribute.clone(),
            mappings: config.header_attributes.clone(),
            forward_all: config.forward_all_attributes,
            default_content_type: config
                .default_content_type
                .as_deref()
                .and_then(|v| HeaderValue::from_str(v).ok()),
            signature_header: config
                .signature_header
                .as_deref()
                .and_then(|h| HeaderName::from_bytes(h.to_ascii_lowercase().as_bytes()).ok()),
        }
    }

    /// Decode one message.
    ///
    /// Missing or unrecognised attributes never fail decoding; only a body
    /// flagged as base64 that does not decode does.
    pub fn decode(&self, message: &QueuedMessage) -> Result<ForwardRequest, DecodeError> {
        let encoding = BodyEncoding::from_flag(message.attribute(&self.flag_attribute));
        let body = encoding.decode(&message.body)?;

        debug!(
            message_id = %message.id,
            encoding = ?encoding,
            raw_length = message.body.len(),
            decoded_length = body.len(),
            "relay_body_decoded"
        );

        let mut headers = self.mapped_headers(message);

        if !headers.contains_key(CONTENT_TYPE) {
            if let Some(content_type) = &self.default_content_type {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
        }

        if let Some(signature) = &self.signature_header {
            if !headers.contains_key(signature) {
                warn!(
                    message_id = %message.id,
                    header = %signature,
                    "relay_signature_header_missing"
                );
            }
        }

        let source_ip =
            source_ip::from_attributes(message).or_else(|| source_ip::from_json_body(&body));
        if let Some(ip) = &source_ip {
            source_ip::append_forwarded_for(&mut headers, ip);
        }

        Ok(ForwardRequest {
            message_id: message.id.clone(),
            method: Method::POST,
            target_url: self.target_url.clone(),
            headers,
            body,
            encoding,
        })
    }

    fn mapped_headers(&self, message: &QueuedMessage) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if self.forward_all {
            for (name, value) in &message.attributes {
                if name.eq_ignore_ascii_case(&self.flag_attribute) {
                    continue;
                }
                let Ok(header) = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
                else {
                    debug!(message_id = %message.id, attribute = %name, "relay_attribute_not_a_header");
                    continue;
                };
                insert_value(&mut headers, &message.id, header, value);
            }
        }

        for mapping in &self.mappings {
            if headers.contains_key(&mapping.header) {
                continue;
            }
            if let Some(value) = message.attribute(&mapping.attribute) {
                insert_value(&mut headers, &message.id, mapping.header.clone(), value);
            }
        }

        headers
    }
}

fn insert_value(headers: &mut HeaderMap, message_id: &str, header: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(header, value);
        }
        Err(_) => {
            warn!(
                message_id = %message_id,
                header = %header,
                "relay_header_value_invalid"
            );
        }
    }
}
