//! Tests for driver configuration and the CnC file layout

use std::io::{Seek, SeekFrom, Write};
use std::sync::{Mutex, OnceLock};

use tempfile::TempDir;

use aeron_core::driver::{
    context::{
        AERON_CLIENT_LIVENESS_TIMEOUT_ENV_VAR, AERON_DIR_DELETE_ON_START_ENV_VAR,
        AERON_ERROR_BUFFER_LENGTH_ENV_VAR, AERON_MTU_LENGTH_ENV_VAR,
        AERON_SEND_TO_STATUS_POLL_RATIO_ENV_VAR, AERON_THREADING_MODE_ENV_VAR,
        AERON_TO_CONDUCTOR_BUFFER_LENGTH_ENV_VAR, MAX_UDP_PAYLOAD_LENGTH,
    },
    is_driver_active, CncFile, DriverContext, ThreadingMode, CNC_FILE, CNC_METADATA_LENGTH,
};
use aeron_core::ringbuf::{ManyToOneRingBuffer, TRAILER_LENGTH};

/// Environment mutation is process-global; serialize the tests that touch it.
fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

const ENV_VARS: &[&str] = &[
    AERON_THREADING_MODE_ENV_VAR,
    AERON_DIR_DELETE_ON_START_ENV_VAR,
    AERON_TO_CONDUCTOR_BUFFER_LENGTH_ENV_VAR,
    AERON_ERROR_BUFFER_LENGTH_ENV_VAR,
    AERON_CLIENT_LIVENESS_TIMEOUT_ENV_VAR,
    AERON_MTU_LENGTH_ENV_VAR,
    AERON_SEND_TO_STATUS_POLL_RATIO_ENV_VAR,
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

/// A context with regions small enough for fast file-backed tests
fn small_context(dir: &TempDir) -> DriverContext {
    let mut context = DriverContext::default()
        .with_aeron_dir(dir.path().join("media"))
        .with_counters_values_buffer_length(2048);
    context.to_driver_buffer_length = 4096 + TRAILER_LENGTH;
    context.to_clients_buffer_length = 4096 + 128;
    context.error_buffer_length = 4096;
    context
}

#[test]
fn test_env_unset_yields_defaults() {
    let _guard = env_lock().lock().unwrap();
    clear_env();

    let context = DriverContext::from_env();
    let defaults = DriverContext::default();

    assert_eq!(context.threading_mode, ThreadingMode::Dedicated);
    assert!(!context.dirs_delete_on_start);
    assert_eq!(context.to_driver_buffer_length, defaults.to_driver_buffer_length);
    assert_eq!(context.error_buffer_length, defaults.error_buffer_length);
    assert_eq!(
        context.client_liveness_timeout_ns,
        defaults.client_liveness_timeout_ns
    );
    assert_eq!(context.mtu_length, defaults.mtu_length);
}

#[test]
fn test_env_overrides_and_clamping() {
    let _guard = env_lock().lock().unwrap();
    clear_env();

    std::env::set_var(AERON_THREADING_MODE_ENV_VAR, "SHARED_NETWORK");
    std::env::set_var(AERON_DIR_DELETE_ON_START_ENV_VAR, "true");
    std::env::set_var(
        AERON_TO_CONDUCTOR_BUFFER_LENGTH_ENV_VAR,
        &(65536 + TRAILER_LENGTH).to_string(),
    );
    std::env::set_var(AERON_CLIENT_LIVENESS_TIMEOUT_ENV_VAR, "7000000000");
    // Below the data header length; clamped up.
    std::env::set_var(AERON_MTU_LENGTH_ENV_VAR, "1");
    // Garbage; falls back to the default.
    std::env::set_var(AERON_ERROR_BUFFER_LENGTH_ENV_VAR, "not-a-number");
    // Below minimum ratio of 1.
    std::env::set_var(AERON_SEND_TO_STATUS_POLL_RATIO_ENV_VAR, "0");

    let context = DriverContext::from_env();
    clear_env();

    assert_eq!(context.threading_mode, ThreadingMode::SharedNetwork);
    assert!(context.dirs_delete_on_start);
    assert_eq!(context.to_driver_buffer_length, 65536 + TRAILER_LENGTH);
    assert_eq!(context.client_liveness_timeout_ns, 7_000_000_000);
    assert_eq!(context.mtu_length, 32);
    assert!(context.mtu_length <= MAX_UDP_PAYLOAD_LENGTH);
    assert_eq!(context.error_buffer_length, 1024 * 1024);
    assert_eq!(context.send_to_sm_poll_ratio, 1);
}

#[test]
fn test_unknown_threading_mode_keeps_default() {
    let _guard = env_lock().lock().unwrap();
    clear_env();

    std::env::set_var(AERON_THREADING_MODE_ENV_VAR, "TURBO");
    let context = DriverContext::from_env();
    clear_env();

    assert_eq!(context.threading_mode, ThreadingMode::Dedicated);
}

#[test]
fn test_cnc_create_then_attach_roundtrip() {
    let dir = TempDir::new().unwrap();
    let context = small_context(&dir);

    let created = CncFile::create(&context).unwrap();
    assert_eq!(created.length(), context.cnc_length());

    let attached = CncFile::map_existing(&context.aeron_dir).unwrap();
    let metadata = attached.metadata();

    assert_eq!(
        metadata.to_driver_buffer_length as usize,
        context.to_driver_buffer_length
    );
    assert_eq!(
        metadata.to_clients_buffer_length as usize,
        context.to_clients_buffer_length
    );
    assert_eq!(
        metadata.counter_metadata_buffer_length as usize,
        context.counters_metadata_buffer_length
    );
    assert_eq!(
        metadata.counter_values_buffer_length as usize,
        context.counters_values_buffer_length
    );
    assert_eq!(
        metadata.client_liveness_timeout_ns as u64,
        context.client_liveness_timeout_ns
    );
    assert_eq!(
        metadata.error_log_buffer_length as usize,
        context.error_buffer_length
    );

    // Regions tile the file without gaps.
    assert_eq!(metadata.to_driver_buffer_offset(), CNC_METADATA_LENGTH);
    assert_eq!(metadata.total_length(), context.cnc_length());

    let (_, to_driver_length) = attached.to_driver_buffer();
    assert_eq!(to_driver_length, context.to_driver_buffer_length);
    let (_, error_length) = attached.error_log_buffer();
    assert_eq!(error_length, context.error_buffer_length);
}

#[test]
fn test_attach_rejects_unknown_version() {
    let dir = TempDir::new().unwrap();
    let context = small_context(&dir);
    CncFile::create(&context).unwrap();

    let cnc_path = context.aeron_dir.join(CNC_FILE);
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(&cnc_path)
        .unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&99i32.to_ne_bytes()).unwrap();
    drop(file);

    assert!(CncFile::map_existing(&context.aeron_dir).is_err());
}

#[test]
fn test_dirs_delete_on_start_removes_stale_media_dir() {
    let dir = TempDir::new().unwrap();
    let context = small_context(&dir).with_dirs_delete_on_start(true);

    std::fs::create_dir_all(&context.aeron_dir).unwrap();
    let marker = context.aeron_dir.join("stale.file");
    std::fs::write(&marker, b"stale").unwrap();

    CncFile::create(&context).unwrap();
    assert!(!marker.exists());
    assert!(context.aeron_dir.join(CNC_FILE).exists());
}

#[test]
fn test_driver_liveness_probe_follows_consumer_heartbeat() {
    let dir = TempDir::new().unwrap();
    let context = small_context(&dir);
    let cnc = CncFile::create(&context).unwrap();

    // No heartbeat written yet.
    assert!(!is_driver_active(&context.aeron_dir, 1000, 5000));

    let (ring_ptr, ring_length) = cnc.to_driver_buffer();
    let ring = unsafe {
        ManyToOneRingBuffer::from_memory(ring_ptr, ring_length, aeron_core::system_epoch_clock())
    }
    .unwrap();
    ring.update_consumer_heartbeat(4500);

    assert!(is_driver_active(&context.aeron_dir, 1000, 5000));
    assert!(!is_driver_active(&context.aeron_dir, 100, 5000));
}

#[test]
fn test_missing_dir_is_not_active() {
    let dir = TempDir::new().unwrap();
    assert!(!is_driver_active(&dir.path().join("absent"), 1000, 0));
}
