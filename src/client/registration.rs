//! Conductor-side registration records for in-flight and completed
//! registrations

use std::sync::{Arc, Weak};

use super::{
    context::{OnAvailableImage, OnUnavailableImage},
    log_buffers::LogBuffers,
    publication::{ExclusivePublication, Publication},
    subscription::Subscription,
};

/// Lifecycle of a registration sent to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Command sent, no response yet
    AwaitingDriver,
    /// Driver acknowledged and resources are installed
    Registered,
    /// Driver answered with an error response
    Errored,
}

#[derive(Debug)]
pub(crate) struct PublicationRecord {
    pub channel: String,
    pub registration_id: i64,
    pub original_registration_id: i64,
    pub stream_id: i32,
    pub session_id: i32,
    pub position_limit_counter_id: i32,
    pub time_of_registration_ms: i64,
    pub status: RegistrationStatus,
    pub error_code: i32,
    pub error_message: String,
    pub buffers: Option<Arc<LogBuffers>>,
    pub publication: Weak<Publication>,
}

impl PublicationRecord {
    pub fn new(channel: String, registration_id: i64, stream_id: i32, now_ms: i64) -> Self {
        Self {
            channel,
            registration_id,
            original_registration_id: registration_id,
            stream_id,
            session_id: 0,
            position_limit_counter_id: -1,
            time_of_registration_ms: now_ms,
            status: RegistrationStatus::AwaitingDriver,
            error_code: 0,
            error_message: String::new(),
            buffers: None,
            publication: Weak::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ExclusivePublicationRecord {
    pub channel: String,
    pub registration_id: i64,
    pub stream_id: i32,
    pub session_id: i32,
    pub position_limit_counter_id: i32,
    pub time_of_registration_ms: i64,
    pub status: RegistrationStatus,
    pub error_code: i32,
    pub error_message: String,
    pub buffers: Option<Arc<LogBuffers>>,
    pub publication: Weak<ExclusivePublication>,
}

impl ExclusivePublicationRecord {
    pub fn new(channel: String, registration_id: i64, stream_id: i32, now_ms: i64) -> Self {
        Self {
            channel,
            registration_id,
            stream_id,
            session_id: 0,
            position_limit_counter_id: -1,
            time_of_registration_ms: now_ms,
            status: RegistrationStatus::AwaitingDriver,
            error_code: 0,
            error_message: String::new(),
            buffers: None,
            publication: Weak::new(),
        }
    }
}

pub(crate) struct SubscriptionRecord {
    pub channel: String,
    pub registration_id: i64,
    pub stream_id: i32,
    pub time_of_registration_ms: i64,
    pub status: RegistrationStatus,
    pub error_code: i32,
    pub error_message: String,
    pub on_available_image: OnAvailableImage,
    pub on_unavailable_image: OnUnavailableImage,
    /// Strong handle retained from `on_operation_success` until the first
    /// successful `find_subscription`; afterwards lifetime is governed solely
    /// by the application through the weak reference.
    pub subscription_cache: Option<Arc<Subscription>>,
    pub subscription: Weak<Subscription>,
}

impl SubscriptionRecord {
    pub fn new(
        channel: String,
        registration_id: i64,
        stream_id: i32,
        now_ms: i64,
        on_available_image: OnAvailableImage,
        on_unavailable_image: OnUnavailableImage,
    ) -> Self {
        Self {
            channel,
            registration_id,
            stream_id,
            time_of_registration_ms: now_ms,
            status: RegistrationStatus::AwaitingDriver,
            error_code: 0,
            error_message: String::new(),
            on_available_image,
            on_unavailable_image,
            subscription_cache: None,
            subscription: Weak::new(),
        }
    }

    /// The live handle, whether still cached or only application-held
    pub fn handle(&self) -> Option<Arc<Subscription>> {
        self.subscription
            .upgrade()
            .or_else(|| self.subscription_cache.clone())
    }
}
