//! Client configuration and callback wiring

use std::{path::PathBuf, sync::Arc};

use crate::{driver::aeron_dir_from_env, error::AeronError, EpochClock};

use super::{image::Image, subscription::Subscription};

/// Sink for asynchronous/event-path failures
pub type ErrorHandler = Arc<dyn Fn(&AeronError) + Send + Sync>;

/// Fired when a publication registration completes:
/// `(channel, stream_id, session_id, registration_id)`
pub type OnNewPublication = Arc<dyn Fn(&str, i32, i32, i64) + Send + Sync>;

/// Fired when a subscription registration completes:
/// `(channel, stream_id, registration_id)`
pub type OnNewSubscription = Arc<dyn Fn(&str, i32, i64) + Send + Sync>;

/// Per-subscription availability handler. Invoked with `None` when the
/// subscription is first acknowledged by the driver (empty image set) and
/// with `Some(image)` for each image that becomes available afterwards.
pub type OnAvailableImage = Arc<dyn Fn(&Arc<Subscription>, Option<&Arc<Image>>) + Send + Sync>;

/// Per-subscription handler invoked with each image that goes away
pub type OnUnavailableImage = Arc<dyn Fn(&Arc<Subscription>, &Arc<Image>) + Send + Sync>;

/// Configuration for a client attaching to a media driver.
///
/// Timeouts are in epoch-clock milliseconds. Concrete clocks and idle
/// strategies are collaborators supplied by the embedding application.
#[derive(Clone)]
pub struct ClientContext {
    pub aeron_dir: PathBuf,
    pub driver_timeout_ms: i64,
    pub resource_linger_timeout_ms: i64,
    pub keepalive_interval_ms: i64,
    pub inter_service_timeout_ms: i64,
    pub epoch_clock: EpochClock,
    pub error_handler: ErrorHandler,
    pub on_new_publication: Option<OnNewPublication>,
    pub on_new_exclusive_publication: Option<OnNewPublication>,
    pub on_new_subscription: Option<OnNewSubscription>,
}

impl Default for ClientContext {
    fn default() -> Self {
        Self {
            aeron_dir: aeron_dir_from_env(),
            driver_timeout_ms: 10 * 1000,
            resource_linger_timeout_ms: 5 * 1000,
            keepalive_interval_ms: 500,
            inter_service_timeout_ms: 10 * 1000,
            epoch_clock: crate::system_epoch_clock(),
            error_handler: Arc::new(|error| tracing::error!(%error, "client error")),
            on_new_publication: None,
            on_new_exclusive_publication: None,
            on_new_subscription: None,
        }
    }
}

impl ClientContext {
    /// Context with defaults, honoring `$AERON_DIR`
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the media directory to attach to
    pub fn with_aeron_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.aeron_dir = dir.into();
        self
    }

    /// Timeout for the driver to answer a registration
    pub fn with_driver_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.driver_timeout_ms = timeout_ms;
        self
    }

    /// Minimum time a retired shared resource is kept reachable
    pub fn with_resource_linger_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.resource_linger_timeout_ms = timeout_ms;
        self
    }

    /// Interval between client keepalive commands
    pub fn with_keepalive_interval_ms(mut self, interval_ms: i64) -> Self {
        self.keepalive_interval_ms = interval_ms;
        self
    }

    /// Driver heartbeat age after which the client considers the driver gone
    /// and tears down all state
    pub fn with_inter_service_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.inter_service_timeout_ms = timeout_ms;
        self
    }

    /// Supply the epoch clock driving all timeouts
    pub fn with_epoch_clock(mut self, clock: EpochClock) -> Self {
        self.epoch_clock = clock;
        self
    }

    /// Supply the error handler for event-path failures
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    /// Notification for completed publication registrations
    pub fn with_on_new_publication(mut self, handler: OnNewPublication) -> Self {
        self.on_new_publication = Some(handler);
        self
    }

    /// Notification for completed exclusive publication registrations
    pub fn with_on_new_exclusive_publication(mut self, handler: OnNewPublication) -> Self {
        self.on_new_exclusive_publication = Some(handler);
        self
    }

    /// Notification for completed subscription registrations
    pub fn with_on_new_subscription(mut self, handler: OnNewSubscription) -> Self {
        self.on_new_subscription = Some(handler);
        self
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("aeron_dir", &self.aeron_dir)
            .field("driver_timeout_ms", &self.driver_timeout_ms)
            .field("resource_linger_timeout_ms", &self.resource_linger_timeout_ms)
            .field("keepalive_interval_ms", &self.keepalive_interval_ms)
            .field("inter_service_timeout_ms", &self.inter_service_timeout_ms)
            .finish()
    }
}
