//! Queue message types.
//!
//! [`QueuedMessage`] is the relay's own view of one delivery, independent of
//! the SQS SDK types so pipelines can be driven by any [`QueueClient`](super::QueueClient).

use std::collections::HashMap;

/// One delivery received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Queue-assigned message identifier
    pub id: String,
    /// Token required to delete or extend this specific delivery
    pub receipt_handle: String,
    /// Message body as written by the ingress, possibly base64
    pub body: String,
    /// String message attributes, keyed by attribute name
    pub attributes: HashMap<String, String>,
    /// How many times the queue has handed out this message
    pub approx_receive_count: u32,
}

impl QueuedMessage {
    /// Create a message with no attributes, received for the first time.
    pub fn new(
        id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            attributes: HashMap::new(),
            approx_receive_count: 1,
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute by name, ignoring ASCII case.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value.as_str());
        }
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
