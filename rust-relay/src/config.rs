//! Configuration module for environment variable parsing.
//!
//! All configuration is read once at startup into an immutable [`RelayConfig`].
//! Required values that are missing and tunables that do not parse are both
//! startup errors.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::decode::HeaderMapping;
use crate::error::ConfigError;

/// SQS caps a single long-poll at 20 seconds.
pub const MAX_POLL_WAIT_SECS: u64 = 20;

/// SQS returns at most 10 messages per receive call.
pub const MAX_BATCH_SIZE: usize = 10;

/// SQS caps visibility timeouts at 12 hours.
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;

/// Largest `BACKOFF_JITTER` that keeps consecutive retry waits increasing:
/// `d * (1 + j) < 2d * (1 - j)` holds for every `j < 1/3`.
pub const MAX_BACKOFF_JITTER: f64 = 0.3;

/// Header attributes forwarded when `HEADER_ATTRIBUTES` is not set.
///
/// Covers both ingress templates: one forwards `Content-Type`, the other
/// writes it as `ContentType`.
pub const DEFAULT_HEADER_ATTRIBUTES: &str = "Content-Type,ContentType=content-type,\
X-GitHub-Event,X-GitHub-Delivery,X-GitHub-Hook-ID,X-Hub-Signature,X-Hub-Signature-256,\
User-Agent,X-Forwarded-For";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Compact human-readable lines
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "compact" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("expected json or pretty, got {other}")),
        }
    }
}

/// Relay configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// SQS queue URL to drain
    pub queue_url: String,

    /// Local URL every webhook is replayed against
    pub local_url: Url,

    /// Region override; the SDK default chain applies when unset
    pub region: Option<String>,

    /// Custom SQS endpoint, e.g. a local emulator
    pub queue_endpoint_url: Option<String>,

    /// Long-poll wait per receive call
    pub poll_wait: Duration,

    /// Maximum messages requested per receive call
    pub max_batch_size: usize,

    /// Visibility timeout requested on receive and on each extension
    pub visibility_timeout: Duration,

    /// Remaining visibility at which an extension is issued
    pub visibility_safety_margin: Duration,

    /// Maximum number of messages processed concurrently
    pub max_in_flight: usize,

    /// Forward attempts per delivery, including the first
    pub max_attempts: u32,

    /// Wait before the first retry
    pub backoff_base: Duration,

    /// Upper bound for any retry wait
    pub backoff_max: Duration,

    /// Proportional jitter applied to retry waits (0.0 - 0.3)
    pub backoff_jitter: f64,

    /// Timeout of a single forward attempt
    pub request_timeout: Duration,

    /// First wait after a failed poll; doubles on consecutive failures
    pub poll_error_backoff: Duration,

    /// How long in-flight pipelines may run after cancellation
    pub drain_timeout: Duration,

    /// Receive count from which a message is reported as a probable poison message
    pub poison_receive_count: u32,

    /// Attribute flagging a base64-encoded body
    pub body_base64_attribute: String,

    /// Attribute to header mapping used to rebuild requests
    pub header_attributes: Vec<HeaderMapping>,

    /// Forward every string attribute as a header
    pub forward_all_attributes: bool,

    /// Content type inserted when none was forwarded
    pub default_content_type: Option<String>,

    /// Header whose absence is reported
    pub signature_header: Option<String>,

    /// Log output format
    pub log_format: LogFormat,
}

impl RelayConfig {
    /// Configuration with default tunables for the given queue and target.
    pub fn new(queue_url: impl Into<String>, local_url: Url) -> Self {
        RelayConfig {
            queue_url: queue_url.into(),
            local_url,
            region: None,
            queue_endpoint_url: None,
            poll_wait: Duration::from_secs(MAX_POLL_WAIT_SECS),
            max_batch_size: MAX_BATCH_SIZE,
            visibility_timeout: Duration::from_secs(60),
            visibility_safety_margin: Duration::from_secs(10),
            max_in_flight: 10,
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            backoff_jitter: 0.1,
            request_timeout: Duration::from_secs(20),
            poll_error_backoff: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(30),
            poison_receive_count: 5,
            body_base64_attribute: "BodyIsBase64".to_string(),
            header_attributes: HeaderMapping::parse_list(DEFAULT_HEADER_ATTRIBUTES),
            forward_all_attributes: false,
            default_content_type: Some("application/json".to_string()),
            signature_header: Some("x-hub-signature-256".to_string()),
            log_format: LogFormat::Json,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let queue_url = required(&lookup, "QUEUE_URL")?;
        let raw_local = required(&lookup, "LOCAL_URL")?;
        let local_url = parse_local_url(&raw_local)?;

        let defaults = RelayConfig::new(queue_url, local_url);

        let config = RelayConfig {
            region: optional(&lookup, "AWS_REGION"),
            queue_endpoint_url: optional(&lookup, "QUEUE_ENDPOINT_URL"),
            poll_wait: Duration::from_secs(parse_var(
                &lookup,
                "POLL_WAIT_SECONDS",
                defaults.poll_wait.as_secs(),
            )?),
            max_batch_size: parse_var(&lookup, "MAX_BATCH_SIZE", defaults.max_batch_size)?,
            visibility_timeout: Duration::from_secs(parse_var(
                &lookup,
                "VISIBILITY_TIMEOUT_SECONDS",
                defaults.visibility_timeout.as_secs(),
            )?),
            visibility_safety_margin: Duration::from_secs(parse_var(
                &lookup,
                "VISIBILITY_SAFETY_MARGIN_SECONDS",
                defaults.visibility_safety_margin.as_secs(),
            )?),
            max_in_flight: parse_var(&lookup, "MAX_IN_FLIGHT", defaults.max_in_flight)?,
            max_attempts: parse_var(&lookup, "MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base: Duration::from_millis(parse_var(
                &lookup,
                "BACKOFF_BASE_MS",
                defaults.backoff_base.as_millis() as u64,
            )?),
            backoff_max: Duration::from_millis(parse_var(
                &lookup,
                "BACKOFF_MAX_MS",
                defaults.backoff_max.as_millis() as u64,
            )?),
            backoff_jitter: parse_var(&lookup, "BACKOFF_JITTER", defaults.backoff_jitter)?,
            request_timeout: Duration::from_millis(parse_var(
                &lookup,
                "REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )?),
            poll_error_backoff: Duration::from_millis(parse_var(
                &lookup,
                "POLL_ERROR_BACKOFF_MS",
                defaults.poll_error_backoff.as_millis() as u64,
            )?),
            drain_timeout: Duration::from_secs(parse_var(
                &lookup,
                "DRAIN_TIMEOUT_SECONDS",
                defaults.drain_timeout.as_secs(),
            )?),
            poison_receive_count: parse_var(
                &lookup,
                "POISON_RECEIVE_COUNT",
                defaults.poison_receive_count,
            )?,
            body_base64_attribute: optional(&lookup, "BODY_BASE64_ATTRIBUTE")
                .unwrap_or_else(|| defaults.body_base64_attribute.clone()),
            header_attributes: optional(&lookup, "HEADER_ATTRIBUTES")
                .map(|raw| HeaderMapping::parse_list(&raw))
                .unwrap_or_else(|| defaults.header_attributes.clone()),
            forward_all_attributes: parse_bool(&lookup, "FORWARD_ALL_ATTRIBUTES", false)?,
            default_content_type: disableable(&lookup, "DEFAULT_CONTENT_TYPE")
                .unwrap_or_else(|| defaults.default_content_type.clone()),
            signature_header: disableable(&lookup, "SIGNATURE_HEADER")
                .unwrap_or_else(|| defaults.signature_header.clone()),
            log_format: parse_var(&lookup, "LOG_FORMAT", defaults.log_format)?,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints and SQS limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_url.trim().is_empty() {
            return Err(ConfigError::Missing("QUEUE_URL"));
        }
        if self.poll_wait.as_secs() > MAX_POLL_WAIT_SECS {
            return Err(invalid(
                "POLL_WAIT_SECONDS",
                self.poll_wait.as_secs(),
                format!("must be at most {MAX_POLL_WAIT_SECS}"),
            ));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.max_batch_size) {
            return Err(invalid(
                "MAX_BATCH_SIZE",
                self.max_batch_size,
                format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }
        let visibility = self.visibility_timeout.as_secs();
        if visibility == 0 || visibility > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(invalid(
                "VISIBILITY_TIMEOUT_SECONDS",
                visibility,
                format!("must be between 1 and {MAX_VISIBILITY_TIMEOUT_SECS}"),
            ));
        }
        if self.visibility_safety_margin >= self.visibility_timeout {
            return Err(invalid(
                "VISIBILITY_SAFETY_MARGIN_SECONDS",
                self.visibility_safety_margin.as_secs(),
                "must be smaller than the visibility timeout",
            ));
        }
        if self.max_in_flight == 0 {
            return Err(invalid("MAX_IN_FLIGHT", 0, "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("MAX_ATTEMPTS", 0, "must be at least 1"));
        }
        if self.backoff_max < self.backoff_base {
            return Err(invalid(
                "BACKOFF_MAX_MS",
                self.backoff_max.as_millis(),
                "must not be below BACKOFF_BASE_MS",
            ));
        }
        if !(0.0..=MAX_BACKOFF_JITTER).contains(&self.backoff_jitter) {
            return Err(invalid(
                "BACKOFF_JITTER",
                self.backoff_jitter,
                format!("must be between 0.0 and {MAX_BACKOFF_JITTER}"),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("REQUEST_TIMEOUT_MS", 0, "must be positive"));
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

/// Read a variable, treating blank values as unset.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like [`optional`], but `none` explicitly disables the setting.
fn disableable<F>(lookup: &F, name: &str) -> Option<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).map(|v| {
        if v.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(v)
        }
    })
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            var: name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(name, raw, "expected true or false")),
        },
    }
}

fn parse_local_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid("LOCAL_URL", raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(
            "LOCAL_URL",
            raw,
            format!("unsupported scheme {other}"),
        )),
    }
}

fn invalid(var: &'static str, value: impl Display, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}
