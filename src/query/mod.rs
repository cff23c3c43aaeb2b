//! # Query Definitions
//!
//! The immutable per-invocation query model consumed from the editing
//! surface, plus validation and duration-string parsing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ExecutionError, ExecutionResult};

/// Timeout applied when the editing surface leaves the field empty
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interaction mode of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    /// Send one request, await one reply
    RequestReply,
    /// Long-lived subscription, frames streamed per message
    Subscribe,
    /// Free-form script drives the whole interaction
    Script,
}

/// A query against the NATS cluster, immutable per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDefinition {
    /// Interaction mode
    #[serde(rename = "queryType")]
    pub query_type: QueryType,

    /// NATS subject; wildcards permitted in Subscribe mode.
    /// May be empty in Script mode.
    #[serde(rename = "natsSubject", default)]
    pub subject: String,

    /// Duration string such as `"5s"` or `"50ms"`; empty means the default
    #[serde(rename = "requestTimeout", default)]
    pub request_timeout: String,

    /// Script source; empty means the built-in default mapping.
    /// Required in Script mode.
    #[serde(default)]
    pub script: String,
}

impl QueryDefinition {
    /// Validates the definition and returns the parsed timeout.
    ///
    /// Fails with `InvalidQuery` before anything touches the network.
    pub fn validate(&self) -> ExecutionResult<Duration> {
        match self.query_type {
            QueryType::RequestReply | QueryType::Subscribe => {
                if self.subject.trim().is_empty() {
                    return Err(ExecutionError::InvalidQuery(
                        "subject must not be empty".to_string(),
                    ));
                }
            }
            QueryType::Script => {
                if self.script.trim().is_empty() {
                    return Err(ExecutionError::InvalidQuery(
                        "script must not be empty in script mode".to_string(),
                    ));
                }
            }
        }
        self.timeout()
    }

    /// Parses the timeout field, applying the default for an empty field
    pub fn timeout(&self) -> ExecutionResult<Duration> {
        if self.request_timeout.trim().is_empty() {
            return Ok(DEFAULT_TIMEOUT);
        }
        let parsed = parse_duration(&self.request_timeout).ok_or_else(|| {
            ExecutionError::InvalidQuery(format!(
                "invalid timeout '{}'",
                self.request_timeout
            ))
        })?;
        if parsed.is_zero() {
            return Err(ExecutionError::InvalidQuery(
                "timeout must be positive".to_string(),
            ));
        }
        Ok(parsed)
    }
}

/// Parses a duration string like `"5s"`, `"50ms"` or `"1m30s"`.
///
/// Units: `ns`, `us`, `ms`, `s`, `m`, `h`. Returns `None` on anything else.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        let amount: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .count();
        let step = match &rest[..unit_len] {
            "ns" => Duration::from_nanos(amount),
            "us" => Duration::from_micros(amount),
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount * 60),
            "h" => Duration::from_secs(amount * 3600),
            _ => return None,
        };
        rest = &rest[unit_len..];
        total = total.checked_add(step)?;
    }
    Some(total)
}
