//! The client conductor: a single-threaded state machine over registrations,
//! images and lingering resources

use std::{
    cell::RefCell,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, ReentrantMutex};

use crate::{
    counters::CounterValuesView,
    driver::CncFile,
    error::{AeronError, Result},
    ringbuf::ManyToOneRingBuffer,
    EpochClock,
};

use super::{
    context::{
        ClientContext, ErrorHandler, OnAvailableImage, OnNewPublication, OnNewSubscription,
        OnUnavailableImage,
    },
    events::{DriverEvent, DriverEventSource},
    image::Image,
    log_buffers::LogBuffers,
    proxy::DriverProxy,
    publication::{ExclusivePublication, Publication},
    registration::{
        ExclusivePublicationRecord, PublicationRecord, RegistrationStatus, SubscriptionRecord,
    },
    subscription::{ImageArray, Subscription},
};

/// Events drained from the broadcast per duty cycle
const EVENT_POLL_LIMIT: usize = 10;

struct LingeringLogBuffers {
    time_of_last_state_change_ms: i64,
    _buffers: Arc<LogBuffers>,
}

struct LingeringImageArray {
    time_of_last_state_change_ms: i64,
    _array: Box<ImageArray>,
}

/// State tables, serialized behind the conductor's admin lock.
///
/// Linear scans are deliberate; expected cardinality is small.
struct ConductorState {
    publications: Vec<PublicationRecord>,
    exclusive_publications: Vec<ExclusivePublicationRecord>,
    subscriptions: Vec<SubscriptionRecord>,
    lingering_log_buffers: Vec<LingeringLogBuffers>,
    lingering_image_arrays: Vec<LingeringImageArray>,
    time_of_last_keepalive_ms: i64,
}

/// Tracks the lifecycle of publications, exclusive publications and
/// subscriptions; correlates driver responses; installs mapped log buffers;
/// synthesizes and destroys per-session [`Image`]s; and defers reclamation of
/// shared resources through a timed linger list.
///
/// Operations are serialized by one re-entrant admin lock. User callbacks are
/// invoked after internal state borrows end, while the re-entrant lock may
/// still be held, so callbacks that call back into the conductor are safe.
pub struct ClientConductor {
    admin: ReentrantMutex<RefCell<ConductorState>>,
    proxy: DriverProxy,
    ring: Arc<ManyToOneRingBuffer>,
    event_source: Mutex<Box<dyn DriverEventSource + Send>>,
    counter_values: CounterValuesView,
    epoch_clock: EpochClock,
    driver_timeout_ms: i64,
    resource_linger_timeout_ms: i64,
    keepalive_interval_ms: i64,
    inter_service_timeout_ms: i64,
    error_handler: ErrorHandler,
    on_new_publication: Option<OnNewPublication>,
    on_new_exclusive_publication: Option<OnNewPublication>,
    on_new_subscription: Option<OnNewSubscription>,
    terminated: AtomicBool,
    _cnc: Option<Arc<CncFile>>,
}

impl ClientConductor {
    /// Wire a conductor over externally constructed collaborators.
    ///
    /// `counter_values` must view the counter values region of the same CnC
    /// file the ring lives in; `cnc` (when present) pins the mapping.
    pub fn new(
        context: ClientContext,
        proxy: DriverProxy,
        ring: Arc<ManyToOneRingBuffer>,
        event_source: Box<dyn DriverEventSource + Send>,
        counter_values: CounterValuesView,
        cnc: Option<Arc<CncFile>>,
    ) -> Self {
        let now_ms = (context.epoch_clock)();

        Self {
            admin: ReentrantMutex::new(RefCell::new(ConductorState {
                publications: Vec::new(),
                exclusive_publications: Vec::new(),
                subscriptions: Vec::new(),
                lingering_log_buffers: Vec::new(),
                lingering_image_arrays: Vec::new(),
                time_of_last_keepalive_ms: now_ms,
            })),
            proxy,
            ring,
            event_source: Mutex::new(event_source),
            counter_values,
            epoch_clock: context.epoch_clock,
            driver_timeout_ms: context.driver_timeout_ms,
            resource_linger_timeout_ms: context.resource_linger_timeout_ms,
            keepalive_interval_ms: context.keepalive_interval_ms,
            inter_service_timeout_ms: context.inter_service_timeout_ms,
            error_handler: context.error_handler,
            on_new_publication: context.on_new_publication,
            on_new_exclusive_publication: context.on_new_exclusive_publication,
            on_new_subscription: context.on_new_subscription,
            terminated: AtomicBool::new(false),
            _cnc: cnc,
        }
    }

    /// Attach to the media driver under `context.aeron_dir`: map the CnC
    /// file, build the to-driver ring and the counter values view.
    pub fn connect(
        context: ClientContext,
        event_source: Box<dyn DriverEventSource + Send>,
    ) -> Result<Self> {
        let cnc = Arc::new(CncFile::map_existing(&context.aeron_dir)?);

        let (ring_ptr, ring_length) = cnc.to_driver_buffer();
        let ring = Arc::new(unsafe {
            ManyToOneRingBuffer::from_memory(ring_ptr, ring_length, context.epoch_clock.clone())
        }?);

        let (values_ptr, values_length) = cnc.counters_values_buffer();
        let counter_values = unsafe { CounterValuesView::new(values_ptr, values_length) };

        let proxy = DriverProxy::new(Arc::clone(&ring), std::process::id() as i64);

        Ok(Self::new(
            context,
            proxy,
            ring,
            event_source,
            counter_values,
            Some(cnc),
        ))
    }

    /// The command proxy this conductor sends through
    pub fn proxy(&self) -> &DriverProxy {
        &self.proxy
    }

    /// Whether the inter-service timeout has terminated this client
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Number of registrations across all three state tables
    pub fn active_registrations(&self) -> usize {
        let guard = self.admin.lock();
        let state = guard.borrow();
        state.publications.len() + state.exclusive_publications.len() + state.subscriptions.len()
    }

    /// Number of resources currently awaiting reclamation
    pub fn lingering_resources(&self) -> usize {
        let guard = self.admin.lock();
        let state = guard.borrow();
        state.lingering_log_buffers.len() + state.lingering_image_arrays.len()
    }

    // ---------------------------------------------------------------------
    // Synchronous API
    // ---------------------------------------------------------------------

    /// Register a publication, reusing an existing registration for the same
    /// `(channel, stream_id)` pair.
    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<i64> {
        self.verify_driver_is_active()?;

        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        if let Some(record) = state
            .publications
            .iter()
            .find(|r| r.stream_id == stream_id && r.channel == channel)
        {
            return Ok(record.registration_id);
        }

        let registration_id = self.proxy.add_publication(channel, stream_id)?;
        let now_ms = self.now_ms();
        state.publications.push(PublicationRecord::new(
            channel.to_string(),
            registration_id,
            stream_id,
            now_ms,
        ));

        Ok(registration_id)
    }

    /// Register an exclusive publication; never coalesces with an existing
    /// registration.
    pub fn add_exclusive_publication(&self, channel: &str, stream_id: i32) -> Result<i64> {
        self.verify_driver_is_active()?;

        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        let registration_id = self.proxy.add_exclusive_publication(channel, stream_id)?;
        let now_ms = self.now_ms();
        state
            .exclusive_publications
            .push(ExclusivePublicationRecord::new(
                channel.to_string(),
                registration_id,
                stream_id,
                now_ms,
            ));

        Ok(registration_id)
    }

    /// Look up a publication by registration id.
    ///
    /// Returns `Ok(None)` while the driver has not answered (the application
    /// retries), `DriverTimeout` once the response deadline has passed, and
    /// `Registration` for a driver error response, after which the record is
    /// discarded. A live handle is returned as-is; a dropped handle is
    /// rebuilt from the stored buffers and counter.
    pub fn find_publication(&self, registration_id: i64) -> Result<Option<Arc<Publication>>> {
        self.check_not_terminated()?;

        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        let index = match state
            .publications
            .iter()
            .position(|r| r.registration_id == registration_id)
        {
            Some(index) => index,
            None => return Ok(None),
        };

        match state.publications[index].status {
            RegistrationStatus::AwaitingDriver => {
                self.check_registration_deadline(state.publications[index].time_of_registration_ms)?;
                Ok(None)
            }
            RegistrationStatus::Errored => {
                let record = state.publications.remove(index);
                Err(AeronError::registration(record.error_code, record.error_message))
            }
            RegistrationStatus::Registered => {
                let record = &mut state.publications[index];

                if let Some(publication) = record.publication.upgrade() {
                    return Ok(Some(publication));
                }

                let buffers = record
                    .buffers
                    .clone()
                    .ok_or_else(|| AeronError::memory("registered publication has no log buffers"))?;
                let position_limit = self
                    .counter_values
                    .position(record.position_limit_counter_id)?;

                let publication = Arc::new(Publication::new(
                    record.channel.clone(),
                    record.registration_id,
                    record.original_registration_id,
                    record.stream_id,
                    record.session_id,
                    position_limit,
                    buffers,
                ));
                record.publication = Arc::downgrade(&publication);

                Ok(Some(publication))
            }
        }
    }

    /// Look up an exclusive publication by registration id; same status
    /// machinery as [`find_publication`](Self::find_publication).
    pub fn find_exclusive_publication(
        &self,
        registration_id: i64,
    ) -> Result<Option<Arc<ExclusivePublication>>> {
        self.check_not_terminated()?;

        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        let index = match state
            .exclusive_publications
            .iter()
            .position(|r| r.registration_id == registration_id)
        {
            Some(index) => index,
            None => return Ok(None),
        };

        match state.exclusive_publications[index].status {
            RegistrationStatus::AwaitingDriver => {
                self.check_registration_deadline(
                    state.exclusive_publications[index].time_of_registration_ms,
                )?;
                Ok(None)
            }
            RegistrationStatus::Errored => {
                let record = state.exclusive_publications.remove(index);
                Err(AeronError::registration(record.error_code, record.error_message))
            }
            RegistrationStatus::Registered => {
                let record = &mut state.exclusive_publications[index];

                if let Some(publication) = record.publication.upgrade() {
                    return Ok(Some(publication));
                }

                let buffers = record
                    .buffers
                    .clone()
                    .ok_or_else(|| AeronError::memory("registered publication has no log buffers"))?;
                let position_limit = self
                    .counter_values
                    .position(record.position_limit_counter_id)?;

                let publication = Arc::new(ExclusivePublication::new(
                    record.channel.clone(),
                    record.registration_id,
                    record.stream_id,
                    record.session_id,
                    position_limit,
                    buffers,
                ));
                record.publication = Arc::downgrade(&publication);

                Ok(Some(publication))
            }
        }
    }

    /// Remove a publication registration. Safe to call during driver
    /// shutdown: liveness failures are reported through the error handler and
    /// teardown proceeds.
    pub fn release_publication(&self, registration_id: i64) {
        self.check_driver_active_soft();

        let guard = self.admin.lock();

        let exists = guard
            .borrow()
            .publications
            .iter()
            .any(|r| r.registration_id == registration_id);
        if !exists {
            return;
        }

        if let Err(error) = self.proxy.remove_publication(registration_id) {
            (self.error_handler)(&error);
        }

        let mut state = guard.borrow_mut();
        state
            .publications
            .retain(|r| r.registration_id != registration_id);
    }

    /// Remove an exclusive publication registration; same semantics as
    /// [`release_publication`](Self::release_publication).
    pub fn release_exclusive_publication(&self, registration_id: i64) {
        self.check_driver_active_soft();

        let guard = self.admin.lock();

        let exists = guard
            .borrow()
            .exclusive_publications
            .iter()
            .any(|r| r.registration_id == registration_id);
        if !exists {
            return;
        }

        if let Err(error) = self.proxy.remove_publication(registration_id) {
            (self.error_handler)(&error);
        }

        let mut state = guard.borrow_mut();
        state
            .exclusive_publications
            .retain(|r| r.registration_id != registration_id);
    }

    /// Register a subscription, capturing its image availability handlers.
    pub fn add_subscription(
        &self,
        channel: &str,
        stream_id: i32,
        on_available_image: OnAvailableImage,
        on_unavailable_image: OnUnavailableImage,
    ) -> Result<i64> {
        self.verify_driver_is_active()?;

        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        let registration_id = self.proxy.add_subscription(channel, stream_id)?;
        let now_ms = self.now_ms();
        state.subscriptions.push(SubscriptionRecord::new(
            channel.to_string(),
            registration_id,
            stream_id,
            now_ms,
            on_available_image,
            on_unavailable_image,
        ));

        Ok(registration_id)
    }

    /// Look up a subscription by registration id; same status machinery as
    /// [`find_publication`](Self::find_publication). The first successful
    /// retrieval clears the conductor's strong cache so the handle's lifetime
    /// is governed solely by the application afterwards.
    pub fn find_subscription(&self, registration_id: i64) -> Result<Option<Arc<Subscription>>> {
        self.check_not_terminated()?;

        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        let index = match state
            .subscriptions
            .iter()
            .position(|r| r.registration_id == registration_id)
        {
            Some(index) => index,
            None => return Ok(None),
        };

        match state.subscriptions[index].status {
            RegistrationStatus::AwaitingDriver => {
                self.check_registration_deadline(
                    state.subscriptions[index].time_of_registration_ms,
                )?;
                Ok(None)
            }
            RegistrationStatus::Errored => {
                let record = state.subscriptions.remove(index);
                Err(AeronError::registration(record.error_code, record.error_message))
            }
            RegistrationStatus::Registered => {
                let record = &mut state.subscriptions[index];
                let subscription = record.subscription.upgrade();
                let cached = record.subscription_cache.take();
                Ok(subscription.or(cached))
            }
        }
    }

    /// Remove a subscription registration: send the remove command, remove
    /// and close all images, linger their resources, and fire the
    /// unavailable-image handler once per image. Never fails; liveness
    /// problems are reported through the error handler.
    pub fn release_subscription(&self, registration_id: i64) {
        self.check_driver_active_soft();

        let guard = self.admin.lock();

        let record = {
            let mut state = guard.borrow_mut();
            match state
                .subscriptions
                .iter()
                .position(|r| r.registration_id == registration_id)
            {
                Some(index) => state.subscriptions.remove(index),
                None => return,
            }
        };

        if let Err(error) = self.proxy.remove_subscription(registration_id) {
            (self.error_handler)(&error);
        }

        let mut callbacks = Vec::new();
        if let Some(subscription) = record.handle() {
            subscription.close();
            let (images, old_array) = subscription.take_images();

            let now_ms = self.now_ms();
            let mut state = guard.borrow_mut();
            for image in &images {
                image.close();
                state.lingering_log_buffers.push(LingeringLogBuffers {
                    time_of_last_state_change_ms: now_ms,
                    _buffers: Arc::clone(image.log_buffers()),
                });
            }
            state.lingering_image_arrays.push(LingeringImageArray {
                time_of_last_state_change_ms: now_ms,
                _array: old_array,
            });
            drop(state);

            for image in images {
                callbacks.push((record.on_unavailable_image.clone(), Arc::clone(&subscription), image));
            }
        }

        for (handler, subscription, image) in callbacks {
            handler(&subscription, &image);
        }
    }

    /// Add a destination to a multi-destination publication; pass-through to
    /// the driver proxy.
    pub fn add_destination(&self, registration_id: i64, channel: &str) -> Result<i64> {
        self.verify_driver_is_active()?;
        self.proxy.add_destination(registration_id, channel)
    }

    /// Remove a destination from a multi-destination publication;
    /// pass-through to the driver proxy.
    pub fn remove_destination(&self, registration_id: i64, channel: &str) -> Result<i64> {
        self.verify_driver_is_active()?;
        self.proxy.remove_destination(registration_id, channel)
    }

    // ---------------------------------------------------------------------
    // Duty cycle
    // ---------------------------------------------------------------------

    /// One pass of the conductor duty cycle: drain driver events, keep the
    /// client alive, check driver liveness, sweep the linger lists. Driven by
    /// an externally supplied idle strategy between passes.
    pub fn do_work(&self) -> usize {
        if self.is_terminated() {
            return 0;
        }

        let events = {
            let mut source = self.event_source.lock();
            let mut events = Vec::new();
            source.poll(&mut |event| events.push(event), EVENT_POLL_LIMIT);
            events
        };

        let mut work_count = events.len();
        for event in events {
            self.dispatch(event);
        }

        work_count += self.on_heartbeat_check_timeouts();
        work_count
    }

    fn dispatch(&self, event: DriverEvent) {
        match event {
            DriverEvent::NewPublication {
                registration_id,
                original_registration_id,
                stream_id,
                session_id,
                position_limit_counter_id,
                log_file,
            } => self.on_new_publication(
                registration_id,
                original_registration_id,
                stream_id,
                session_id,
                position_limit_counter_id,
                &log_file,
            ),
            DriverEvent::NewExclusivePublication {
                registration_id,
                stream_id,
                session_id,
                position_limit_counter_id,
                log_file,
            } => self.on_new_exclusive_publication(
                registration_id,
                stream_id,
                session_id,
                position_limit_counter_id,
                &log_file,
            ),
            DriverEvent::OperationSuccess { correlation_id } => {
                self.on_operation_success(correlation_id)
            }
            DriverEvent::ErrorResponse {
                offending_correlation_id,
                error_code,
                error_message,
            } => self.on_error_response(offending_correlation_id, error_code, &error_message),
            DriverEvent::AvailableImage {
                correlation_id,
                stream_id,
                session_id,
                subscriber_position_id,
                subscriber_registration_id,
                log_file,
                source_identity,
            } => self.on_available_image(
                correlation_id,
                stream_id,
                session_id,
                subscriber_position_id,
                subscriber_registration_id,
                &log_file,
                &source_identity,
            ),
            DriverEvent::UnavailableImage {
                correlation_id,
                stream_id,
            } => self.on_unavailable_image(correlation_id, stream_id),
        }
    }

    fn on_heartbeat_check_timeouts(&self) -> usize {
        let now_ms = self.now_ms();

        let keepalive_due = {
            let guard = self.admin.lock();
            let mut state = guard.borrow_mut();
            if now_ms > state.time_of_last_keepalive_ms + self.keepalive_interval_ms {
                state.time_of_last_keepalive_ms = now_ms;
                true
            } else {
                false
            }
        };

        let mut work_count = 0;
        if keepalive_due {
            if let Err(error) = self.proxy.client_keepalive() {
                (self.error_handler)(&error);
            }

            let heartbeat_ms = self.ring.consumer_heartbeat_time();
            if now_ms > heartbeat_ms + self.inter_service_timeout_ms {
                (self.error_handler)(&AeronError::driver_timeout(format!(
                    "driver has been inactive for {} ms",
                    now_ms - heartbeat_ms
                )));
                self.on_inter_service_timeout(now_ms);
            }

            work_count += 1;
        }

        self.on_check_managed_resources(now_ms);
        work_count
    }

    // ---------------------------------------------------------------------
    // Driver event handlers
    // ---------------------------------------------------------------------

    /// A publication registration completed: install the mapped log and the
    /// derived fields, then notify the application.
    pub fn on_new_publication(
        &self,
        registration_id: i64,
        original_registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit_counter_id: i32,
        log_file: &str,
    ) {
        let guard = self.admin.lock();

        let mut notify_channel = None;
        let mut map_error = None;
        {
            let mut state = guard.borrow_mut();
            if let Some(record) = state
                .publications
                .iter_mut()
                .find(|r| r.registration_id == registration_id)
            {
                match LogBuffers::map_existing(log_file) {
                    Ok(buffers) => {
                        record.status = RegistrationStatus::Registered;
                        record.session_id = session_id;
                        record.position_limit_counter_id = position_limit_counter_id;
                        record.original_registration_id = original_registration_id;
                        record.buffers = Some(Arc::new(buffers));
                        notify_channel = Some(record.channel.clone());
                    }
                    Err(error) => {
                        record.status = RegistrationStatus::Errored;
                        record.error_code = -1;
                        record.error_message =
                            format!("failed to map log file {}: {}", log_file, error);
                        map_error = Some(error);
                    }
                }
            }
        }

        if let Some(channel) = notify_channel {
            if let Some(handler) = &self.on_new_publication {
                handler(&channel, stream_id, session_id, registration_id);
            }
        } else if let Some(error) = map_error {
            (self.error_handler)(&error);
        }
    }

    /// An exclusive publication registration completed.
    pub fn on_new_exclusive_publication(
        &self,
        registration_id: i64,
        stream_id: i32,
        session_id: i32,
        position_limit_counter_id: i32,
        log_file: &str,
    ) {
        let guard = self.admin.lock();

        let mut notify_channel = None;
        let mut map_error = None;
        {
            let mut state = guard.borrow_mut();
            if let Some(record) = state
                .exclusive_publications
                .iter_mut()
                .find(|r| r.registration_id == registration_id)
            {
                match LogBuffers::map_existing(log_file) {
                    Ok(buffers) => {
                        record.status = RegistrationStatus::Registered;
                        record.session_id = session_id;
                        record.position_limit_counter_id = position_limit_counter_id;
                        record.buffers = Some(Arc::new(buffers));
                        notify_channel = Some(record.channel.clone());
                    }
                    Err(error) => {
                        record.status = RegistrationStatus::Errored;
                        record.error_code = -1;
                        record.error_message =
                            format!("failed to map log file {}: {}", log_file, error);
                        map_error = Some(error);
                    }
                }
            }
        }

        if let Some(channel) = notify_channel {
            if let Some(handler) = &self.on_new_exclusive_publication {
                handler(&channel, stream_id, session_id, registration_id);
            }
        } else if let Some(error) = map_error {
            (self.error_handler)(&error);
        }
    }

    /// A subscription was accepted. The strong handle is built immediately
    /// and cached so the first `find_subscription` returns the exact instance
    /// the driver acknowledged, whether it runs before or after this event.
    pub fn on_operation_success(&self, correlation_id: i64) {
        let guard = self.admin.lock();

        let mut notify = None;
        {
            let mut state = guard.borrow_mut();
            if let Some(record) = state.subscriptions.iter_mut().find(|r| {
                r.registration_id == correlation_id
                    && r.status == RegistrationStatus::AwaitingDriver
            }) {
                record.status = RegistrationStatus::Registered;

                let subscription = Arc::new(Subscription::new(
                    record.channel.clone(),
                    record.registration_id,
                    record.stream_id,
                ));
                record.subscription_cache = Some(Arc::clone(&subscription));
                record.subscription = Arc::downgrade(&subscription);

                notify = Some((
                    record.channel.clone(),
                    record.stream_id,
                    record.on_available_image.clone(),
                    subscription,
                ));
            }
        }

        if let Some((channel, stream_id, on_available_image, subscription)) = notify {
            if let Some(handler) = &self.on_new_subscription {
                handler(&channel, stream_id, correlation_id);
            }
            on_available_image(&subscription, None);
        }
    }

    /// The driver rejected a command: mark the matching record errored; the
    /// next `find_*` surfaces the failure and discards the record.
    pub fn on_error_response(&self, correlation_id: i64, error_code: i32, error_message: &str) {
        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        if let Some(record) = state
            .subscriptions
            .iter_mut()
            .find(|r| r.registration_id == correlation_id)
        {
            record.status = RegistrationStatus::Errored;
            record.error_code = error_code;
            record.error_message = error_message.to_string();
            return;
        }

        if let Some(record) = state
            .publications
            .iter_mut()
            .find(|r| r.registration_id == correlation_id)
        {
            record.status = RegistrationStatus::Errored;
            record.error_code = error_code;
            record.error_message = error_message.to_string();
            return;
        }

        if let Some(record) = state
            .exclusive_publications
            .iter_mut()
            .find(|r| r.registration_id == correlation_id)
        {
            record.status = RegistrationStatus::Errored;
            record.error_code = error_code;
            record.error_message = error_message.to_string();
        }
    }

    /// A publisher session became visible: build the image, deliver it to
    /// the availability handler, and add it to each matching subscription.
    #[allow(clippy::too_many_arguments)]
    pub fn on_available_image(
        &self,
        correlation_id: i64,
        stream_id: i32,
        session_id: i32,
        subscriber_position_id: i32,
        subscriber_registration_id: i64,
        log_file: &str,
        source_identity: &str,
    ) {
        let guard = self.admin.lock();

        let mut pending: Vec<(OnAvailableImage, Arc<Subscription>, Arc<Image>)> = Vec::new();
        let mut errors = Vec::new();
        {
            let state = guard.borrow();
            for record in state.subscriptions.iter().filter(|r| {
                r.stream_id == stream_id && r.registration_id == subscriber_registration_id
            }) {
                let subscription = match record.handle() {
                    Some(subscription) => subscription,
                    None => continue,
                };
                if subscription.has_image(correlation_id) {
                    continue;
                }

                let buffers = match LogBuffers::map_existing(log_file) {
                    Ok(buffers) => Arc::new(buffers),
                    Err(error) => {
                        errors.push(error);
                        continue;
                    }
                };
                let subscriber_position = match self.counter_values.position(subscriber_position_id)
                {
                    Ok(position) => position,
                    Err(error) => {
                        errors.push(error);
                        continue;
                    }
                };

                let image = Arc::new(Image::new(
                    session_id,
                    correlation_id,
                    record.registration_id,
                    source_identity.to_string(),
                    subscriber_position,
                    buffers,
                ));

                pending.push((record.on_available_image.clone(), subscription, image));
            }
        }

        let mut replaced = Vec::new();
        for (handler, subscription, image) in pending {
            handler(&subscription, Some(&image));
            replaced.push(subscription.add_image(image));
        }

        if !replaced.is_empty() {
            let now_ms = self.now_ms();
            let mut state = guard.borrow_mut();
            for array in replaced {
                state.lingering_image_arrays.push(LingeringImageArray {
                    time_of_last_state_change_ms: now_ms,
                    _array: array,
                });
            }
        }

        for error in errors {
            (self.error_handler)(&error);
        }
    }

    /// A publisher session went away: remove its image from each matching
    /// subscription, linger the removed resources, and notify once per
    /// removal.
    pub fn on_unavailable_image(&self, correlation_id: i64, stream_id: i32) {
        let guard = self.admin.lock();

        let mut callbacks = Vec::new();
        {
            let mut state = guard.borrow_mut();
            let now_ms = self.now_ms();

            let matches: Vec<(OnUnavailableImage, Arc<Subscription>)> = state
                .subscriptions
                .iter()
                .filter(|r| r.stream_id == stream_id)
                .filter_map(|r| r.handle().map(|s| (r.on_unavailable_image.clone(), s)))
                .collect();

            for (handler, subscription) in matches {
                if let Some((image, old_array)) = subscription.remove_image(correlation_id) {
                    image.close();
                    state.lingering_log_buffers.push(LingeringLogBuffers {
                        time_of_last_state_change_ms: now_ms,
                        _buffers: Arc::clone(image.log_buffers()),
                    });
                    state.lingering_image_arrays.push(LingeringImageArray {
                        time_of_last_state_change_ms: now_ms,
                        _array: old_array,
                    });
                    callbacks.push((handler, subscription, image));
                }
            }
        }

        for (handler, subscription, image) in callbacks {
            handler(&subscription, &image);
        }
    }

    /// The driver stopped responding within the inter-service interval: close
    /// every live handle, linger every image resource, clear all tables.
    /// Terminal; all subsequent synchronous operations fail with
    /// `ClientTerminated`.
    pub fn on_inter_service_timeout(&self, now_ms: i64) {
        self.terminated.store(true, Ordering::Release);

        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        for record in &state.publications {
            if let Some(publication) = record.publication.upgrade() {
                publication.close();
            }
        }
        for record in &state.exclusive_publications {
            if let Some(publication) = record.publication.upgrade() {
                publication.close();
            }
        }

        let subscriptions: Vec<Arc<Subscription>> = state
            .subscriptions
            .iter()
            .filter_map(|r| r.handle())
            .collect();
        for subscription in subscriptions {
            subscription.close();
            let (images, old_array) = subscription.take_images();
            for image in &images {
                image.close();
                state.lingering_log_buffers.push(LingeringLogBuffers {
                    time_of_last_state_change_ms: now_ms,
                    _buffers: Arc::clone(image.log_buffers()),
                });
            }
            state.lingering_image_arrays.push(LingeringImageArray {
                time_of_last_state_change_ms: now_ms,
                _array: old_array,
            });
        }

        state.publications.clear();
        state.exclusive_publications.clear();
        state.subscriptions.clear();
    }

    /// Sweep both linger lists, releasing entries older than the resource
    /// linger timeout.
    pub fn on_check_managed_resources(&self, now_ms: i64) {
        let guard = self.admin.lock();
        let mut state = guard.borrow_mut();

        let linger_ms = self.resource_linger_timeout_ms;
        state
            .lingering_log_buffers
            .retain(|entry| now_ms <= entry.time_of_last_state_change_ms + linger_ms);
        state
            .lingering_image_arrays
            .retain(|entry| now_ms <= entry.time_of_last_state_change_ms + linger_ms);
    }

    // ---------------------------------------------------------------------
    // Liveness
    // ---------------------------------------------------------------------

    fn now_ms(&self) -> i64 {
        (self.epoch_clock)()
    }

    fn check_not_terminated(&self) -> Result<()> {
        if self.is_terminated() {
            return Err(AeronError::client_terminated(
                "client conductor terminated by inter-service timeout",
            ));
        }
        Ok(())
    }

    fn check_registration_deadline(&self, time_of_registration_ms: i64) -> Result<()> {
        if self.now_ms() > time_of_registration_ms + self.driver_timeout_ms {
            return Err(AeronError::driver_timeout(format!(
                "no response from driver in {} ms",
                self.driver_timeout_ms
            )));
        }
        Ok(())
    }

    fn verify_driver_is_active(&self) -> Result<()> {
        self.check_not_terminated()?;

        let age_ms = self.now_ms() - self.ring.consumer_heartbeat_time();
        if age_ms > self.driver_timeout_ms {
            return Err(AeronError::driver_timeout(format!(
                "driver heartbeat is {} ms old",
                age_ms
            )));
        }

        Ok(())
    }

    /// Release-path liveness check: report through the error handler instead
    /// of failing so that application teardown proceeds.
    fn check_driver_active_soft(&self) {
        if let Err(error) = self.verify_driver_is_active() {
            tracing::warn!(%error, "releasing resource while driver is inactive");
            (self.error_handler)(&error);
        }
    }
}
