//! Hookrelay - relays queued webhook deliveries to a local HTTP service.
//!
//! A public endpoint writes each inbound webhook into an SQS queue. This
//! agent runs next to the service that should receive them, drains the
//! queue and replays every request against a local URL.
//!
//! ## Architecture
//!
//! ```text
//! SQS → Poller → [Decoder → ForwardingClient (+ VisibilityExtender) → Acknowledger] → local service
//! ```
//!
//! Each message runs through its own pipeline; at most `MAX_IN_FLIGHT`
//! pipelines run at once.

pub mod ack;
pub mod config;
pub mod context;
pub mod decode;
pub mod error;
pub mod forward;
pub mod lifecycle;
pub mod pipeline;
pub mod poller;
pub mod queue;
pub mod util;
pub mod visibility;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use ack::{AckAction, Acknowledger, Disposition};
pub use config::{LogFormat, RelayConfig};
pub use context::RelayContext;
pub use decode::{BodyEncoding, Decoder, ForwardRequest, HeaderMapping};
pub use error::{
    ConfigError, DecodeError, ForwardExhaustedError, ForwardTransientError, QueueTransportError,
    TransientKind, TransportFailure, VisibilityExtendError,
};
pub use forward::{ForwardOutcome, ForwardingClient, HttpTarget, LocalTarget};
pub use lifecycle::{LifecycleState, Relay, RunReport};
pub use pipeline::{process_message, PipelineReport};
pub use queue::{QueueClient, QueuedMessage, SqsQueue};
