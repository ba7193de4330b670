//! # Host-facing hooks that turn request outcomes into events.
//!
//! [`EventSource`] is what a load generator calls after each request. It
//! builds the [`Event`] and admits it through the wrapped [`EventSender`];
//! the async hooks wait for space, the `try_` hooks never do.

use std::sync::Arc;

use crate::core::queue::EventSender;
use crate::error::EnqueueError;
use crate::events::{Event, Extra};

/// Success/failure hooks feeding the forwarder queue.
#[derive(Clone)]
pub struct EventSource {
    sender: EventSender,
}

impl EventSource {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }

    /// Records a successful request.
    pub async fn on_success(
        &self,
        request_type: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        response_time_ms: f64,
        response_length: u64,
        extra: Extra,
    ) -> Result<(), EnqueueError> {
        let ev = Event::success(request_type, name, response_time_ms, response_length)
            .with_extras(extra);
        self.sender.enqueue(ev).await
    }

    /// Records a failed request.
    pub async fn on_failure(
        &self,
        request_type: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        response_time_ms: Option<f64>,
        exception: impl Into<Arc<str>>,
        extra: Extra,
    ) -> Result<(), EnqueueError> {
        let ev = Event::failure(request_type, name, response_time_ms, exception).with_extras(extra);
        self.sender.enqueue(ev).await
    }

    /// Non-waiting variant of [`on_success`](Self::on_success).
    pub fn try_on_success(
        &self,
        request_type: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        response_time_ms: f64,
        response_length: u64,
        extra: Extra,
    ) -> Result<(), EnqueueError> {
        let ev = Event::success(request_type, name, response_time_ms, response_length)
            .with_extras(extra);
        self.sender.try_enqueue(ev)
    }

    /// Non-waiting variant of [`on_failure`](Self::on_failure).
    pub fn try_on_failure(
        &self,
        request_type: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        response_time_ms: Option<f64>,
        exception: impl Into<Arc<str>>,
        extra: Extra,
    ) -> Result<(), EnqueueError> {
        let ev = Event::failure(request_type, name, response_time_ms, exception).with_extras(extra);
        self.sender.try_enqueue(ev)
    }

    pub fn sender(&self) -> &EventSender {
        &self.sender
    }
}
