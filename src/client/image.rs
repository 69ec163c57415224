//! Per-session image of a remote publisher's log

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::counters::ReadablePosition;

use super::log_buffers::LogBuffers;

/// A view onto one remote publisher session feeding a subscribed stream.
///
/// An image appears in at most one subscription at a time and is keyed by
/// its correlation id.
#[derive(Debug)]
pub struct Image {
    session_id: i32,
    correlation_id: i64,
    subscription_registration_id: i64,
    source_identity: String,
    subscriber_position: ReadablePosition,
    log_buffers: Arc<LogBuffers>,
    closed: AtomicBool,
}

impl Image {
    pub(crate) fn new(
        session_id: i32,
        correlation_id: i64,
        subscription_registration_id: i64,
        source_identity: String,
        subscriber_position: ReadablePosition,
        log_buffers: Arc<LogBuffers>,
    ) -> Self {
        Self {
            session_id,
            correlation_id,
            subscription_registration_id,
            source_identity,
            subscriber_position,
            log_buffers,
            closed: AtomicBool::new(false),
        }
    }

    /// Session id of the remote publisher
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Correlation id keying this image
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    /// Registration id of the owning subscription
    pub fn subscription_registration_id(&self) -> i64 {
        self.subscription_registration_id
    }

    /// Source identity string reported by the driver
    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }

    /// Current subscriber position within the stream
    pub fn position(&self) -> i64 {
        self.subscriber_position.get()
    }

    /// The shared log buffers backing this image
    pub fn log_buffers(&self) -> &Arc<LogBuffers> {
        &self.log_buffers
    }

    /// Whether the image has been closed by the conductor
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
