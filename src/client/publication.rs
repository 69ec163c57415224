//! User-facing publication handles

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::counters::ReadablePosition;

use super::log_buffers::LogBuffers;

/// A publication onto a channel/stream, possibly shared with other clients
/// on the same driver.
///
/// Owned by the application; the conductor keeps only a weak back-reference
/// so dropping the handle requires no conductor action. The handle pins the
/// mapped log buffers and the position-limit counter. The append path itself
/// belongs to the wire protocol and is out of scope here.
#[derive(Debug)]
pub struct Publication {
    channel: String,
    registration_id: i64,
    original_registration_id: i64,
    stream_id: i32,
    session_id: i32,
    position_limit: ReadablePosition,
    log_buffers: Arc<LogBuffers>,
    closed: AtomicBool,
}

impl Publication {
    pub(crate) fn new(
        channel: String,
        registration_id: i64,
        original_registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit: ReadablePosition,
        log_buffers: Arc<LogBuffers>,
    ) -> Self {
        Self {
            channel,
            registration_id,
            original_registration_id,
            stream_id,
            session_id,
            position_limit,
            log_buffers,
            closed: AtomicBool::new(false),
        }
    }

    /// Channel URI this publication was added with
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Registration id issued when the publication was added
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Registration id of the first client to register this log; differs from
    /// [`registration_id`](Self::registration_id) when the driver coalesced
    /// clients onto one shared log
    pub fn original_registration_id(&self) -> i64 {
        self.original_registration_id
    }

    /// Stream id within the channel
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Session id the driver assigned to this publication
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Current position limit imposed by the slowest consumer
    pub fn position_limit(&self) -> i64 {
        self.position_limit.get()
    }

    /// Id of the position-limit counter in the CnC file
    pub fn position_limit_counter_id(&self) -> i32 {
        self.position_limit.counter_id()
    }

    /// The shared log buffers backing this publication
    pub fn log_buffers(&self) -> &Arc<LogBuffers> {
        &self.log_buffers
    }

    /// Whether the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// A publication with a log exclusively owned by this client.
///
/// Unlike [`Publication`], adding an exclusive publication never coalesces
/// with an existing registration.
#[derive(Debug)]
pub struct ExclusivePublication {
    channel: String,
    registration_id: i64,
    stream_id: i32,
    session_id: i32,
    position_limit: ReadablePosition,
    log_buffers: Arc<LogBuffers>,
    closed: AtomicBool,
}

impl ExclusivePublication {
    pub(crate) fn new(
        channel: String,
        registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit: ReadablePosition,
        log_buffers: Arc<LogBuffers>,
    ) -> Self {
        Self {
            channel,
            registration_id,
            stream_id,
            session_id,
            position_limit,
            log_buffers,
            closed: AtomicBool::new(false),
        }
    }

    /// Channel URI this publication was added with
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Registration id issued when the publication was added
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Stream id within the channel
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Session id the driver assigned to this publication
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Current position limit imposed by the slowest consumer
    pub fn position_limit(&self) -> i64 {
        self.position_limit.get()
    }

    /// The shared log buffers backing this publication
    pub fn log_buffers(&self) -> &Arc<LogBuffers> {
        &self.log_buffers
    }

    /// Whether the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
