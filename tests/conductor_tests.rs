//! Tests for the client conductor state machine

use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex,
};

use tempfile::TempDir;

use aeron_core::client::proxy::{
    ADD_DESTINATION_MSG_TYPE_ID, ADD_EXCLUSIVE_PUBLICATION_MSG_TYPE_ID,
    ADD_PUBLICATION_MSG_TYPE_ID, ADD_SUBSCRIPTION_MSG_TYPE_ID, CLIENT_KEEPALIVE_MSG_TYPE_ID,
    REMOVE_PUBLICATION_MSG_TYPE_ID, REMOVE_SUBSCRIPTION_MSG_TYPE_ID,
};
use aeron_core::client::{
    ClientContext, DriverEvent, DriverEventSource, OnAvailableImage, OnUnavailableImage,
};
use aeron_core::counters::{CounterValuesView, COUNTER_VALUE_LENGTH};
use aeron_core::ringbuf::TRAILER_LENGTH;
use aeron_core::{AeronError, ClientConductor, DriverProxy, EpochClock, ManyToOneRingBuffer};

const CHANNEL: &str = "aeron:udp?endpoint=127.0.0.1:40123";
const IPC_CHANNEL: &str = "aeron:ipc";
const STREAM_ID: i32 = 1001;

const COUNTER_SLOTS: usize = 16;
const COUNTERS_LENGTH: usize = COUNTER_SLOTS * COUNTER_VALUE_LENGTH;

const DRIVER_TIMEOUT_MS: i64 = 1000;
const LINGER_TIMEOUT_MS: i64 = 100;
const KEEPALIVE_INTERVAL_MS: i64 = 500;
const INTER_SERVICE_TIMEOUT_MS: i64 = 2000;

#[repr(align(64))]
struct CounterBacking([u8; COUNTERS_LENGTH]);

#[derive(Clone)]
struct TestEventSource {
    queue: Arc<Mutex<VecDeque<DriverEvent>>>,
}

impl DriverEventSource for TestEventSource {
    fn poll(&mut self, sink: &mut dyn FnMut(DriverEvent), event_limit: usize) -> usize {
        let mut queue = self.queue.lock().unwrap();
        let mut delivered = 0;
        while delivered < event_limit {
            match queue.pop_front() {
                Some(event) => {
                    sink(event);
                    delivered += 1;
                }
                None => break,
            }
        }
        delivered
    }
}

struct Fixture {
    clock: Arc<AtomicI64>,
    ring: Arc<ManyToOneRingBuffer>,
    conductor: Arc<ClientConductor>,
    errors: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<VecDeque<DriverEvent>>>,
    tmp: TempDir,
    _counters: Box<CounterBacking>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_context(|context| context)
    }

    fn with_context(customize: impl FnOnce(ClientContext) -> ClientContext) -> Self {
        let clock = Arc::new(AtomicI64::new(0));
        let clock_time = Arc::clone(&clock);
        let epoch_clock: EpochClock = Arc::new(move || clock_time.load(Ordering::Relaxed));

        let ring = Arc::new(
            ManyToOneRingBuffer::with_clock(65536 + TRAILER_LENGTH, epoch_clock.clone()).unwrap(),
        );
        ring.update_consumer_heartbeat(0);

        let mut counters = Box::new(CounterBacking([0u8; COUNTERS_LENGTH]));
        // A position-limit value for counter id 3, used by the scenarios.
        counters.0[3 * COUNTER_VALUE_LENGTH..3 * COUNTER_VALUE_LENGTH + 8]
            .copy_from_slice(&1000i64.to_ne_bytes());
        let counter_values = unsafe {
            CounterValuesView::new(
                NonNull::new(counters.0.as_mut_ptr()).unwrap(),
                COUNTERS_LENGTH,
            )
        };

        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let error_sink = Arc::clone(&errors);

        let events: Arc<Mutex<VecDeque<DriverEvent>>> = Arc::new(Mutex::new(VecDeque::new()));

        let context = customize(
            ClientContext::new()
                .with_epoch_clock(epoch_clock)
                .with_driver_timeout_ms(DRIVER_TIMEOUT_MS)
                .with_resource_linger_timeout_ms(LINGER_TIMEOUT_MS)
                .with_keepalive_interval_ms(KEEPALIVE_INTERVAL_MS)
                .with_inter_service_timeout_ms(INTER_SERVICE_TIMEOUT_MS)
                .with_error_handler(Arc::new(move |error| {
                    error_sink.lock().unwrap().push(error.to_string());
                })),
        );

        let proxy = DriverProxy::new(Arc::clone(&ring), 7);
        let conductor = Arc::new(ClientConductor::new(
            context,
            proxy,
            Arc::clone(&ring),
            Box::new(TestEventSource {
                queue: Arc::clone(&events),
            }),
            counter_values,
            None,
        ));

        Self {
            clock,
            ring,
            conductor,
            errors,
            events,
            tmp: TempDir::new().unwrap(),
            _counters: counters,
        }
    }

    /// Advance the clock while keeping the driver heartbeat fresh
    fn advance(&self, ms: i64) -> i64 {
        let now = self.clock.fetch_add(ms, Ordering::Relaxed) + ms;
        self.ring.update_consumer_heartbeat(now);
        now
    }

    /// Advance the clock leaving the heartbeat behind
    fn advance_without_heartbeat(&self, ms: i64) -> i64 {
        self.clock.fetch_add(ms, Ordering::Relaxed) + ms
    }

    /// Create a driver-style log file and return its path
    fn log_file(&self, name: &str) -> String {
        let path = self.tmp.path().join(name);
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Consume the to-driver ring, returning the message type ids seen
    fn drain_commands(&self) -> Vec<i32> {
        let mut types = Vec::new();
        while self.ring.read(|msg_type_id, _| types.push(msg_type_id), 16) != 0 {}
        types
    }
}

fn noop_available() -> OnAvailableImage {
    Arc::new(|_, _| {})
}

fn noop_unavailable() -> OnUnavailableImage {
    Arc::new(|_, _| {})
}

// ---------------------------------------------------------------------------
// Publications
// ---------------------------------------------------------------------------

#[test]
fn test_duplicate_add_publication_reuses_registration() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let first = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let second = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    assert_eq!(first, second);

    // Only one command reached the driver.
    assert_eq!(fixture.drain_commands(), vec![ADD_PUBLICATION_MSG_TYPE_ID]);

    // A different stream registers separately.
    let third = conductor.add_publication(CHANNEL, STREAM_ID + 1).unwrap();
    assert_ne!(first, third);
}

#[test]
fn test_find_publication_times_out_only_after_deadline() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();

    assert!(conductor.find_publication(id).unwrap().is_none());
    fixture.advance(DRIVER_TIMEOUT_MS);
    assert!(conductor.find_publication(id).unwrap().is_none());

    fixture.advance(1);
    for _ in 0..2 {
        assert!(matches!(
            conductor.find_publication(id),
            Err(AeronError::DriverTimeout { .. })
        ));
    }
}

// Scenario: driver response installs session 7 and the position-limit counter.
#[test]
fn test_new_publication_response_completes_registration() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let log_file = fixture.log_file("publication.log");
    conductor.on_new_publication(id, id, STREAM_ID, 7, 3, &log_file);

    let publication = conductor.find_publication(id).unwrap().unwrap();
    assert_eq!(publication.channel(), CHANNEL);
    assert_eq!(publication.stream_id(), STREAM_ID);
    assert_eq!(publication.session_id(), 7);
    assert_eq!(publication.registration_id(), id);
    assert_eq!(publication.original_registration_id(), id);
    assert_eq!(publication.position_limit_counter_id(), 3);
    assert_eq!(publication.position_limit(), 1000);
}

#[test]
fn test_find_publication_returns_same_handle_while_alive() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let log_file = fixture.log_file("publication.log");
    conductor.on_new_publication(id, id, STREAM_ID, 7, 3, &log_file);

    let first = conductor.find_publication(id).unwrap().unwrap();
    let second = conductor.find_publication(id).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_find_publication_rebuilds_dropped_handle() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let log_file = fixture.log_file("publication.log");
    conductor.on_new_publication(id, id, STREAM_ID, 7, 3, &log_file);

    let handle = conductor.find_publication(id).unwrap().unwrap();
    drop(handle);

    let rebuilt = conductor.find_publication(id).unwrap().unwrap();
    assert_eq!(rebuilt.session_id(), 7);
    assert_eq!(rebuilt.channel(), CHANNEL);
}

#[test]
fn test_new_publication_fires_notification_handler() {
    let seen: Arc<Mutex<Vec<(String, i32, i32, i64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let fixture = Fixture::with_context(move |context| {
        context.with_on_new_publication(Arc::new(move |channel, stream_id, session_id, id| {
            sink.lock()
                .unwrap()
                .push((channel.to_string(), stream_id, session_id, id));
        }))
    });
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let log_file = fixture.log_file("publication.log");
    conductor.on_new_publication(id, id, STREAM_ID, 7, 3, &log_file);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(CHANNEL.to_string(), STREAM_ID, 7, id)]
    );
}

#[test]
fn test_unmappable_log_file_errors_the_registration() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let missing = fixture.tmp.path().join("missing.log");
    conductor.on_new_publication(id, id, STREAM_ID, 7, 3, &missing.to_string_lossy());

    assert!(!fixture.errors.lock().unwrap().is_empty());
    assert!(matches!(
        conductor.find_publication(id),
        Err(AeronError::Registration { code: -1, .. })
    ));
}

// Scenario: an error response surfaces once, then the record is gone.
#[test]
fn test_error_response_surfaces_then_removes_record() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    conductor.on_error_response(id, 42, "channel unknown");

    match conductor.find_publication(id) {
        Err(AeronError::Registration { code, message }) => {
            assert_eq!(code, 42);
            assert_eq!(message, "channel unknown");
        }
        other => panic!("expected registration error, got {:?}", other.map(|_| ())),
    }

    assert!(conductor.find_publication(id).unwrap().is_none());
}

#[test]
fn test_release_publication_sends_remove_and_forgets() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let log_file = fixture.log_file("publication.log");
    conductor.on_new_publication(id, id, STREAM_ID, 7, 3, &log_file);
    fixture.drain_commands();

    conductor.release_publication(id);

    assert_eq!(fixture.drain_commands(), vec![REMOVE_PUBLICATION_MSG_TYPE_ID]);
    assert!(conductor.find_publication(id).unwrap().is_none());
    assert_eq!(conductor.active_registrations(), 0);
}

#[test]
fn test_add_publication_fails_when_driver_heartbeat_is_stale() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    fixture.advance_without_heartbeat(DRIVER_TIMEOUT_MS + 1);
    assert!(matches!(
        conductor.add_publication(CHANNEL, STREAM_ID),
        Err(AeronError::DriverTimeout { .. })
    ));
}

// ---------------------------------------------------------------------------
// Exclusive publications
// ---------------------------------------------------------------------------

#[test]
fn test_exclusive_publications_never_deduplicate() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let first = conductor
        .add_exclusive_publication(CHANNEL, STREAM_ID)
        .unwrap();
    let second = conductor
        .add_exclusive_publication(CHANNEL, STREAM_ID)
        .unwrap();
    assert_ne!(first, second);

    assert_eq!(
        fixture.drain_commands(),
        vec![
            ADD_EXCLUSIVE_PUBLICATION_MSG_TYPE_ID,
            ADD_EXCLUSIVE_PUBLICATION_MSG_TYPE_ID
        ]
    );
}

#[test]
fn test_exclusive_publication_lifecycle() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor
        .add_exclusive_publication(CHANNEL, STREAM_ID)
        .unwrap();
    assert!(conductor.find_exclusive_publication(id).unwrap().is_none());

    let log_file = fixture.log_file("exclusive.log");
    conductor.on_new_exclusive_publication(id, STREAM_ID, 11, 3, &log_file);

    let publication = conductor.find_exclusive_publication(id).unwrap().unwrap();
    assert_eq!(publication.session_id(), 11);
    assert_eq!(publication.stream_id(), STREAM_ID);

    conductor.on_error_response(id, 13, "too late");
    // A completed registration errored later surfaces on the next find.
    assert!(matches!(
        conductor.find_exclusive_publication(id),
        Err(AeronError::Registration { code: 13, .. })
    ));
    assert!(conductor.find_exclusive_publication(id).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Subscriptions and images
// ---------------------------------------------------------------------------

// Scenario: operation success fires the availability handler with an empty
// image set; the image event delivers the image and stores it.
#[test]
fn test_subscription_image_available_then_unavailable() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let available: Arc<Mutex<Vec<Option<i64>>>> = Arc::new(Mutex::new(Vec::new()));
    let unavailable: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

    let available_sink = Arc::clone(&available);
    let unavailable_sink = Arc::clone(&unavailable);

    let id = conductor
        .add_subscription(
            IPC_CHANNEL,
            2002,
            Arc::new(move |_, image| {
                available_sink
                    .lock()
                    .unwrap()
                    .push(image.map(|i| i.correlation_id()));
            }),
            Arc::new(move |_, image| {
                unavailable_sink.lock().unwrap().push(image.correlation_id());
            }),
        )
        .unwrap();

    conductor.on_operation_success(id);
    assert_eq!(*available.lock().unwrap(), vec![None]);

    let subscription = conductor.find_subscription(id).unwrap().unwrap();
    assert_eq!(subscription.image_count(), 0);

    let log_file = fixture.log_file("image.log");
    conductor.on_available_image(99, 2002, 3, 1, id, &log_file, "127.0.0.1:54321");

    assert_eq!(*available.lock().unwrap(), vec![None, Some(99)]);
    assert!(subscription.has_image(99));
    assert_eq!(subscription.image_count(), 1);

    let mut sessions = Vec::new();
    subscription.for_each_image(|image| {
        sessions.push((image.session_id(), image.source_identity().to_string()))
    });
    assert_eq!(sessions, vec![(3, "127.0.0.1:54321".to_string())]);

    // Duplicate availability for the same correlation id is ignored.
    conductor.on_available_image(99, 2002, 3, 1, id, &log_file, "127.0.0.1:54321");
    assert_eq!(subscription.image_count(), 1);

    conductor.on_unavailable_image(99, 2002);
    assert_eq!(*unavailable.lock().unwrap(), vec![99]);
    assert!(!subscription.has_image(99));
    assert_eq!(subscription.image_count(), 0);
}

#[test]
fn test_find_subscription_clears_strong_cache_on_first_retrieval() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor
        .add_subscription(IPC_CHANNEL, 2002, noop_available(), noop_unavailable())
        .unwrap();
    conductor.on_operation_success(id);

    let first = conductor.find_subscription(id).unwrap().unwrap();
    let second = conductor.find_subscription(id).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    // Once the application drops its handles, the conductor no longer pins
    // the subscription.
    drop(first);
    drop(second);
    assert!(conductor.find_subscription(id).unwrap().is_none());
}

#[test]
fn test_find_subscription_times_out_only_after_deadline() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor
        .add_subscription(IPC_CHANNEL, 2002, noop_available(), noop_unavailable())
        .unwrap();

    // Still awaiting; timeouts behave as for publications.
    assert!(conductor.find_subscription(id).unwrap().is_none());
    fixture.advance(DRIVER_TIMEOUT_MS + 1);
    assert!(matches!(
        conductor.find_subscription(id),
        Err(AeronError::DriverTimeout { .. })
    ));
}

#[test]
fn test_subscription_error_response_surfaces_then_removes_record() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor
        .add_subscription(IPC_CHANNEL, 2002, noop_available(), noop_unavailable())
        .unwrap();
    conductor.on_error_response(id, 8, "no such channel");

    assert!(matches!(
        conductor.find_subscription(id),
        Err(AeronError::Registration { code: 8, .. })
    ));
    assert!(conductor.find_subscription(id).unwrap().is_none());
}

#[test]
fn test_release_subscription_drains_images_and_notifies() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let unavailable: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let unavailable_sink = Arc::clone(&unavailable);

    let id = conductor
        .add_subscription(
            IPC_CHANNEL,
            2002,
            noop_available(),
            Arc::new(move |_, image| {
                unavailable_sink.lock().unwrap().push(image.correlation_id());
            }),
        )
        .unwrap();
    conductor.on_operation_success(id);
    let subscription = conductor.find_subscription(id).unwrap().unwrap();

    let log_file = fixture.log_file("image.log");
    conductor.on_available_image(99, 2002, 3, 1, id, &log_file, "src");
    fixture.drain_commands();

    conductor.release_subscription(id);

    assert_eq!(
        fixture.drain_commands(),
        vec![REMOVE_SUBSCRIPTION_MSG_TYPE_ID]
    );
    assert_eq!(*unavailable.lock().unwrap(), vec![99]);
    assert!(subscription.is_closed());
    assert_eq!(subscription.image_count(), 0);
    assert_eq!(conductor.active_registrations(), 0);
    assert!(conductor.lingering_resources() > 0);
}

// A log buffer lingered at t is reachable at t + linger - 1 and gone at
// t + linger + 1.
#[test]
fn test_lingered_log_buffers_released_after_timeout() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor
        .add_subscription(IPC_CHANNEL, 2002, noop_available(), noop_unavailable())
        .unwrap();
    conductor.on_operation_success(id);
    let subscription = conductor.find_subscription(id).unwrap().unwrap();

    let log_file = fixture.log_file("image.log");
    conductor.on_available_image(99, 2002, 3, 1, id, &log_file, "src");

    let mut buffers = None;
    subscription.for_each_image(|image| buffers = Some(Arc::clone(image.log_buffers())));
    let weak = Arc::downgrade(&buffers.take().unwrap());

    // Lingered at t = 0.
    conductor.on_unavailable_image(99, 2002);
    assert!(weak.upgrade().is_some());

    conductor.on_check_managed_resources(LINGER_TIMEOUT_MS - 1);
    assert!(weak.upgrade().is_some());

    conductor.on_check_managed_resources(LINGER_TIMEOUT_MS + 1);
    assert!(weak.upgrade().is_none());
}

// ---------------------------------------------------------------------------
// Inter-service timeout and duty cycle
// ---------------------------------------------------------------------------

#[test]
fn test_inter_service_timeout_is_terminal() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let pub_id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let log_file = fixture.log_file("publication.log");
    conductor.on_new_publication(pub_id, pub_id, STREAM_ID, 7, 3, &log_file);
    let publication = conductor.find_publication(pub_id).unwrap().unwrap();

    let sub_id = conductor
        .add_subscription(IPC_CHANNEL, 2002, noop_available(), noop_unavailable())
        .unwrap();
    conductor.on_operation_success(sub_id);
    let subscription = conductor.find_subscription(sub_id).unwrap().unwrap();
    let image_log = fixture.log_file("image.log");
    conductor.on_available_image(99, 2002, 3, 1, sub_id, &image_log, "src");

    conductor.on_inter_service_timeout(1000);

    assert!(conductor.is_terminated());
    assert_eq!(conductor.active_registrations(), 0);
    assert!(publication.is_closed());
    assert!(subscription.is_closed());
    assert_eq!(subscription.image_count(), 0);
    assert!(conductor.lingering_resources() > 0);

    assert!(matches!(
        conductor.add_publication(CHANNEL, STREAM_ID),
        Err(AeronError::ClientTerminated { .. })
    ));
    assert!(matches!(
        conductor.add_subscription(IPC_CHANNEL, 2002, noop_available(), noop_unavailable()),
        Err(AeronError::ClientTerminated { .. })
    ));
    assert!(matches!(
        conductor.find_publication(pub_id),
        Err(AeronError::ClientTerminated { .. })
    ));
}

#[test]
fn test_do_work_sends_one_keepalive_per_interval() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    fixture.advance(KEEPALIVE_INTERVAL_MS + 1);
    conductor.do_work();
    assert_eq!(fixture.drain_commands(), vec![CLIENT_KEEPALIVE_MSG_TYPE_ID]);

    // Same instant: no second keepalive.
    conductor.do_work();
    assert!(fixture.drain_commands().is_empty());

    fixture.advance(KEEPALIVE_INTERVAL_MS + 1);
    conductor.do_work();
    assert_eq!(fixture.drain_commands(), vec![CLIENT_KEEPALIVE_MSG_TYPE_ID]);
}

#[test]
fn test_do_work_detects_inter_service_timeout() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    fixture.advance_without_heartbeat(INTER_SERVICE_TIMEOUT_MS + KEEPALIVE_INTERVAL_MS + 1);
    conductor.do_work();

    assert!(conductor.is_terminated());
    assert!(fixture
        .errors
        .lock()
        .unwrap()
        .iter()
        .any(|message| message.contains("inactive")));

    // Terminated conductors do no further work.
    assert_eq!(conductor.do_work(), 0);
}

#[test]
fn test_do_work_dispatches_driver_events() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    let log_file = fixture.log_file("publication.log");
    fixture
        .events
        .lock()
        .unwrap()
        .push_back(DriverEvent::NewPublication {
            registration_id: id,
            original_registration_id: id,
            stream_id: STREAM_ID,
            session_id: 21,
            position_limit_counter_id: 3,
            log_file,
        });

    assert!(conductor.do_work() >= 1);

    let publication = conductor.find_publication(id).unwrap().unwrap();
    assert_eq!(publication.session_id(), 21);
}

// ---------------------------------------------------------------------------
// Destinations, releases under a dead driver, re-entrancy
// ---------------------------------------------------------------------------

#[test]
fn test_destination_commands_pass_through() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();
    fixture.drain_commands();

    conductor
        .add_destination(id, "aeron:udp?endpoint=127.0.0.1:40124")
        .unwrap();
    assert_eq!(fixture.drain_commands(), vec![ADD_DESTINATION_MSG_TYPE_ID]);
}

#[test]
fn test_release_during_driver_shutdown_reports_and_proceeds() {
    let fixture = Fixture::new();
    let conductor = &fixture.conductor;

    let id = conductor.add_publication(CHANNEL, STREAM_ID).unwrap();

    // Driver goes away; release must still tear down the record.
    fixture.advance_without_heartbeat(DRIVER_TIMEOUT_MS + 1);
    conductor.release_publication(id);

    assert!(!fixture.errors.lock().unwrap().is_empty());
    assert_eq!(conductor.active_registrations(), 0);
}

#[test]
fn test_callbacks_may_reenter_the_conductor() {
    let fixture = Fixture::new();
    let conductor = Arc::clone(&fixture.conductor);

    let reentrant = Arc::clone(&conductor);
    let nested_id: Arc<Mutex<Option<i64>>> = Arc::new(Mutex::new(None));
    let nested_sink = Arc::clone(&nested_id);

    let id = conductor
        .add_subscription(
            IPC_CHANNEL,
            2002,
            Arc::new(move |_, image| {
                if image.is_none() {
                    let id = reentrant.add_publication(IPC_CHANNEL, 77).unwrap();
                    *nested_sink.lock().unwrap() = Some(id);
                }
            }),
            noop_unavailable(),
        )
        .unwrap();

    conductor.on_operation_success(id);

    let nested = nested_id.lock().unwrap().expect("nested add ran");
    assert!(conductor.find_publication(nested).unwrap().is_none());
    assert_eq!(conductor.active_registrations(), 2);

    let commands = fixture.drain_commands();
    assert_eq!(
        commands,
        vec![ADD_SUBSCRIPTION_MSG_TYPE_ID, ADD_PUBLICATION_MSG_TYPE_ID]
    );
}
