//! # Test-outcome events carried through the pipeline.
//!
//! An [`Event`] records one request made by the load generator: whether it
//! succeeded ([`EventKind`]), what it was (`request_type`, `name`), how long it
//! took, and producer metadata (`extra`).
//!
//! The kind-dependent fields live in [`Outcome`], so a success without a
//! response length or a failure without an exception cannot be built.
//! Events are immutable: fields are private and only readable through accessors.
//!
//! ## Ordering
//! Each event gets a globally unique, monotonically increasing `seq` at
//! construction time. The queue preserves admission order; `seq` is useful to
//! correlate log lines across backends.
//!
//! ## Example
//! ```rust
//! use loadsink::{Event, EventKind};
//!
//! let ev = Event::failure("POST", "/login", Some(35.0), "connection reset")
//!     .with_extra("user", 7);
//!
//! assert_eq!(ev.kind(), EventKind::Failure);
//! assert_eq!(ev.exception(), Some("connection reset"));
//! assert_eq!(ev.response_length(), None);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde::{Serialize, Serializer};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Open-ended producer metadata: string keys to scalar values.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// Whether the recorded request succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Failure,
}

impl EventKind {
    /// Lowercase name, as used in serialized documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Success => "success",
            EventKind::Failure => "failure",
        }
    }
}

/// Kind-dependent part of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The request completed; its response size is known.
    Success {
        /// Response body length in bytes.
        response_length: u64,
    },
    /// The request failed.
    Failure {
        /// Description of what went wrong.
        exception: Arc<str>,
        /// Response body length, when a response was received at all.
        response_length: Option<u64>,
    },
}

/// One recorded test outcome.
#[derive(Debug, Clone)]
pub struct Event {
    seq: u64,
    at: SystemTime,
    request_type: Arc<str>,
    name: Arc<str>,
    response_time: Option<f64>,
    outcome: Outcome,
    extra: Extra,
}

impl Event {
    fn new(
        request_type: Arc<str>,
        name: Arc<str>,
        response_time: Option<f64>,
        outcome: Outcome,
    ) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            request_type,
            name,
            response_time,
            outcome,
            extra: Extra::new(),
        }
    }

    /// Creates a success event.
    ///
    /// Negative or non-finite response times are recorded as `0.0`.
    pub fn success(
        request_type: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        response_time_ms: f64,
        response_length: u64,
    ) -> Self {
        Self::new(
            request_type.into(),
            name.into(),
            Some(measured(response_time_ms).unwrap_or(0.0)),
            Outcome::Success { response_length },
        )
    }

    /// Creates a failure event.
    ///
    /// `None` (or a negative / non-finite value) means the time could not be measured.
    pub fn failure(
        request_type: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        response_time_ms: Option<f64>,
        exception: impl Into<Arc<str>>,
    ) -> Self {
        Self::new(
            request_type.into(),
            name.into(),
            response_time_ms.and_then(measured),
            Outcome::Failure {
                exception: exception.into(),
                response_length: None,
            },
        )
    }

    /// Attaches one metadata entry.
    #[inline]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Attaches a whole metadata map, overriding existing keys.
    #[inline]
    pub fn with_extras(mut self, extra: Extra) -> Self {
        self.extra.extend(extra);
        self
    }

    /// Records the response length (overrides it for success events).
    #[inline]
    pub fn with_response_length(mut self, len: u64) -> Self {
        match &mut self.outcome {
            Outcome::Success { response_length } => *response_length = len,
            Outcome::Failure {
                response_length, ..
            } => *response_length = Some(len),
        }
        self
    }

    /// Globally unique, monotonically increasing sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wall-clock construction time.
    pub fn at(&self) -> SystemTime {
        self.at
    }

    pub fn kind(&self) -> EventKind {
        match self.outcome {
            Outcome::Success { .. } => EventKind::Success,
            Outcome::Failure { .. } => EventKind::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Response time in milliseconds; `None` only for unmeasured failures.
    pub fn response_time(&self) -> Option<f64> {
        self.response_time
    }

    pub fn response_length(&self) -> Option<u64> {
        match self.outcome {
            Outcome::Success { response_length } => Some(response_length),
            Outcome::Failure {
                response_length, ..
            } => response_length,
        }
    }

    pub fn exception(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { exception, .. } => Some(exception),
        }
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn extra(&self) -> &Extra {
        &self.extra
    }
}

fn measured(ms: f64) -> Option<f64> {
    (ms.is_finite() && ms >= 0.0).then_some(ms)
}

/// Wire shape of an event payload.
#[derive(Serialize)]
struct Payload<'a> {
    request_type: &'a str,
    name: &'a str,
    response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a str>,
    other: &'a Extra,
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Payload {
            request_type: &self.request_type,
            name: &self.name,
            response_time: self.response_time,
            response_length: self.response_length(),
            exception: self.exception(),
            other: &self.extra,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_requires_length_and_has_no_exception() {
        let ev = Event::success("POST", "/login", 120.0, 512);
        assert_eq!(ev.kind(), EventKind::Success);
        assert_eq!(ev.response_length(), Some(512));
        assert_eq!(ev.exception(), None);
        assert_eq!(ev.response_time(), Some(120.0));
    }

    #[test]
    fn failure_may_lack_time_and_length() {
        let ev = Event::failure("GET", "/health", None, "timeout");
        assert_eq!(ev.kind(), EventKind::Failure);
        assert_eq!(ev.response_time(), None);
        assert_eq!(ev.response_length(), None);

        let ev = ev.with_response_length(10);
        assert_eq!(ev.response_length(), Some(10));
    }

    #[test]
    fn unmeasurable_times_are_normalised() {
        assert_eq!(Event::success("GET", "/", -3.0, 0).response_time(), Some(0.0));
        assert_eq!(Event::success("GET", "/", f64::NAN, 0).response_time(), Some(0.0));
        assert_eq!(Event::failure("GET", "/", Some(f64::INFINITY), "x").response_time(), None);
    }

    #[test]
    fn seq_is_monotonic() {
        let a = Event::success("GET", "/a", 1.0, 1);
        let b = Event::success("GET", "/b", 1.0, 1);
        assert!(b.seq() > a.seq());
    }

    #[test]
    fn serializes_like_the_listener_payload() {
        let ev = Event::success("POST", "/login", 120.0, 512).with_extra("region", "eu");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            v,
            json!({
                "request_type": "POST",
                "name": "/login",
                "response_time": 120.0,
                "response_length": 512,
                "other": { "region": "eu" }
            })
        );

        let ev = Event::failure("POST", "/login", None, "refused");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["exception"], "refused");
        assert_eq!(v["response_time"], serde_json::Value::Null);
        assert!(v.get("response_length").is_none());
    }
}
