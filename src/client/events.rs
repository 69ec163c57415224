//! Driver-to-client events polled by the conductor
//!
//! Responses travel through the to-clients broadcast region of the CnC file.
//! The broadcast receiver itself is a collaborator; the conductor only
//! depends on this event surface.

/// Decoded driver responses and notifications
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// A publication registration completed
    NewPublication {
        registration_id: i64,
        original_registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit_counter_id: i32,
        log_file: String,
    },
    /// An exclusive publication registration completed
    NewExclusivePublication {
        registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit_counter_id: i32,
        log_file: String,
    },
    /// A command without installed resources (a subscription, a destination
    /// change) was accepted
    OperationSuccess { correlation_id: i64 },
    /// The driver rejected the command with the given correlation id
    ErrorResponse {
        offending_correlation_id: i64,
        error_code: i32,
        error_message: String,
    },
    /// A publisher session became visible to a subscription
    AvailableImage {
        correlation_id: i64,
        stream_id: i32,
        session_id: i32,
        subscriber_position_id: i32,
        subscriber_registration_id: i64,
        log_file: String,
        source_identity: String,
    },
    /// A publisher session went away
    UnavailableImage { correlation_id: i64, stream_id: i32 },
}

/// Source of driver events, polled by the conductor's duty cycle.
///
/// Implementations wrap the to-clients broadcast receiver; tests enqueue
/// events directly.
pub trait DriverEventSource {
    /// Deliver up to `event_limit` pending events to `sink`, returning the
    /// number delivered
    fn poll(&mut self, sink: &mut dyn FnMut(DriverEvent), event_limit: usize) -> usize;
}

/// An event source that never produces events; useful when responses are fed
/// to the conductor handlers directly.
#[derive(Debug, Default)]
pub struct NullEventSource;

impl DriverEventSource for NullEventSource {
    fn poll(&mut self, _sink: &mut dyn FnMut(DriverEvent), _event_limit: usize) -> usize {
        0
    }
}
