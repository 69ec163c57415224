//! Media driver configuration: defaults, environment overrides and derived
//! buffer geometry

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{AeronError, Result},
    ringbuf::descriptor::RECORD_ALIGNMENT,
    ringbuf::TRAILER_LENGTH,
};

use super::cnc::{CncMetadata, BROADCAST_BUFFER_TRAILER_LENGTH, CNC_METADATA_LENGTH, CNC_VERSION};

/// Length of the data frame header on the wire; lower bound for the MTU
pub const DATA_HEADER_LENGTH: usize = 32;

/// Largest UDP payload the transport will configure
pub const MAX_UDP_PAYLOAD_LENGTH: usize = 65_504;

pub const AERON_DIR_ENV_VAR: &str = "AERON_DIR";
pub const AERON_THREADING_MODE_ENV_VAR: &str = "AERON_THREADING_MODE";
pub const AERON_DIR_DELETE_ON_START_ENV_VAR: &str = "AERON_DIR_DELETE_ON_START";
pub const AERON_TERM_BUFFER_SPARSE_FILE_ENV_VAR: &str = "AERON_TERM_BUFFER_SPARSE_FILE";
pub const AERON_TO_CONDUCTOR_BUFFER_LENGTH_ENV_VAR: &str = "AERON_TO_CONDUCTOR_BUFFER_LENGTH";
pub const AERON_TO_CLIENTS_BUFFER_LENGTH_ENV_VAR: &str = "AERON_TO_CLIENTS_BUFFER_LENGTH";
pub const AERON_COUNTERS_VALUES_BUFFER_LENGTH_ENV_VAR: &str =
    "AERON_COUNTERS_VALUES_BUFFER_LENGTH";
pub const AERON_ERROR_BUFFER_LENGTH_ENV_VAR: &str = "AERON_ERROR_BUFFER_LENGTH";
pub const AERON_CLIENT_LIVENESS_TIMEOUT_ENV_VAR: &str = "AERON_CLIENT_LIVENESS_TIMEOUT";
pub const AERON_PUBLICATION_LINGER_TIMEOUT_ENV_VAR: &str = "AERON_PUBLICATION_LINGER_TIMEOUT";
pub const AERON_TERM_BUFFER_LENGTH_ENV_VAR: &str = "AERON_TERM_BUFFER_LENGTH";
pub const AERON_IPC_TERM_BUFFER_LENGTH_ENV_VAR: &str = "AERON_IPC_TERM_BUFFER_LENGTH";
pub const AERON_MTU_LENGTH_ENV_VAR: &str = "AERON_MTU_LENGTH";
pub const AERON_IPC_PUBLICATION_TERM_WINDOW_LENGTH_ENV_VAR: &str =
    "AERON_IPC_PUBLICATION_TERM_WINDOW_LENGTH";
pub const AERON_PUBLICATION_TERM_WINDOW_LENGTH_ENV_VAR: &str =
    "AERON_PUBLICATION_TERM_WINDOW_LENGTH";
pub const AERON_SOCKET_SO_RCVBUF_ENV_VAR: &str = "AERON_SOCKET_SO_RCVBUF";
pub const AERON_SOCKET_SO_SNDBUF_ENV_VAR: &str = "AERON_SOCKET_SO_SNDBUF";
pub const AERON_SOCKET_MULTICAST_TTL_ENV_VAR: &str = "AERON_SOCKET_MULTICAST_TTL";
pub const AERON_SEND_TO_STATUS_POLL_RATIO_ENV_VAR: &str = "AERON_SEND_TO_STATUS_POLL_RATIO";
pub const AERON_RCV_STATUS_MESSAGE_TIMEOUT_ENV_VAR: &str = "AERON_RCV_STATUS_MESSAGE_TIMEOUT";

/// Agent threading arrangement of the driver process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadingMode {
    /// Conductor, sender and receiver each on their own thread
    Dedicated,
    /// Sender and receiver share a thread, conductor on its own
    SharedNetwork,
    /// All agents share a single thread
    Shared,
}

impl ThreadingMode {
    fn parse(value: &str, default: Self) -> Self {
        match value {
            "DEDICATED" => Self::Dedicated,
            "SHARED_NETWORK" => Self::SharedNetwork,
            "SHARED" => Self::Shared,
            _ => default,
        }
    }
}

/// Parse a boolean setting: `1|on|true` and `0|off|false`, anything else is
/// the default
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        Some("1") | Some("on") | Some("true") => true,
        Some("0") | Some("off") | Some("false") => false,
        _ => default,
    }
}

/// Parse an unsigned setting with auto base detection (`0x` hex, leading `0`
/// octal, decimal otherwise); a parse failure yields the default; the result
/// is clamped to `[min, max]`
pub fn parse_u64(value: Option<&str>, default: u64, min: u64, max: u64) -> u64 {
    match value {
        None => default,
        Some(s) => {
            let s = s.trim();
            let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else if s.len() > 1 && s.starts_with('0') {
                u64::from_str_radix(&s[1..], 8).ok()
            } else {
                s.parse::<u64>().ok()
            };

            parsed.unwrap_or(default).clamp(min, max)
        }
    }
}

fn username() -> String {
    std::env::var("USER").unwrap_or_else(|_| "default".to_string())
}

/// Platform default media directory: `/dev/shm/aeron-<user>` on Linux, the
/// system temp dir otherwise
pub fn default_aeron_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from(format!("/dev/shm/aeron-{}", username()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        std::env::temp_dir().join(format!("aeron-{}", username()))
    }
}

/// The media directory: `$AERON_DIR` when set, the platform default otherwise
pub fn aeron_dir_from_env() -> PathBuf {
    match std::env::var(AERON_DIR_ENV_VAR) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_aeron_dir(),
    }
}

/// Recursively delete a media directory
pub fn dir_delete(path: &Path) -> Result<()> {
    std::fs::remove_dir_all(path)
        .map_err(|e| AeronError::from_io(e, "Failed to delete media directory"))
}

/// Configuration for the media driver process and the CnC file it owns.
///
/// Once the CnC file has been created its metadata header is immutable for
/// the lifetime of the driver; clients cache the region geometry at attach
/// time.
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub aeron_dir: PathBuf,
    pub threading_mode: ThreadingMode,
    pub dirs_delete_on_start: bool,
    pub warn_if_dirs_exist: bool,
    pub term_buffer_sparse_file: bool,
    pub driver_timeout_ms: u64,
    pub client_liveness_timeout_ns: u64,
    pub publication_linger_timeout_ns: u64,
    pub to_driver_buffer_length: usize,
    pub to_clients_buffer_length: usize,
    pub counters_values_buffer_length: usize,
    pub counters_metadata_buffer_length: usize,
    pub error_buffer_length: usize,
    pub term_buffer_length: usize,
    pub ipc_term_buffer_length: usize,
    pub mtu_length: usize,
    pub ipc_publication_window_length: usize,
    pub publication_window_length: usize,
    pub socket_rcvbuf: usize,
    pub socket_sndbuf: usize,
    pub multicast_ttl: u8,
    pub send_to_sm_poll_ratio: usize,
    pub status_message_timeout_ns: u64,
}

impl Default for DriverContext {
    fn default() -> Self {
        let counters_values_buffer_length = 1024 * 1024;

        Self {
            aeron_dir: default_aeron_dir(),
            threading_mode: ThreadingMode::Dedicated,
            dirs_delete_on_start: false,
            warn_if_dirs_exist: true,
            term_buffer_sparse_file: false,
            driver_timeout_ms: 10 * 1000,
            client_liveness_timeout_ns: 5_000_000_000,
            publication_linger_timeout_ns: 5_000_000_000,
            to_driver_buffer_length: 1024 * 1024 + TRAILER_LENGTH,
            to_clients_buffer_length: 1024 * 1024 + BROADCAST_BUFFER_TRAILER_LENGTH,
            counters_values_buffer_length,
            counters_metadata_buffer_length: counters_values_buffer_length * 2,
            error_buffer_length: 1024 * 1024,
            term_buffer_length: 16 * 1024 * 1024,
            ipc_term_buffer_length: 64 * 1024 * 1024,
            mtu_length: 4096,
            ipc_publication_window_length: 0,
            publication_window_length: 0,
            socket_rcvbuf: 128 * 1024,
            socket_sndbuf: 0,
            multicast_ttl: 0,
            send_to_sm_poll_ratio: 4,
            status_message_timeout_ns: 200_000_000,
        }
    }
}

impl DriverContext {
    /// Defaults overridden by any recognized environment variables
    pub fn from_env() -> Self {
        let mut context = Self::default();
        let env = |name: &str| std::env::var(name).ok();

        if let Some(dir) = env(AERON_DIR_ENV_VAR).filter(|d| !d.is_empty()) {
            context.aeron_dir = PathBuf::from(dir);
        }

        if let Some(mode) = env(AERON_THREADING_MODE_ENV_VAR) {
            context.threading_mode = ThreadingMode::parse(&mode, context.threading_mode);
        }

        context.dirs_delete_on_start = parse_bool(
            env(AERON_DIR_DELETE_ON_START_ENV_VAR).as_deref(),
            context.dirs_delete_on_start,
        );

        context.term_buffer_sparse_file = parse_bool(
            env(AERON_TERM_BUFFER_SPARSE_FILE_ENV_VAR).as_deref(),
            context.term_buffer_sparse_file,
        );

        context.to_driver_buffer_length = parse_u64(
            env(AERON_TO_CONDUCTOR_BUFFER_LENGTH_ENV_VAR).as_deref(),
            context.to_driver_buffer_length as u64,
            (1024 + TRAILER_LENGTH) as u64,
            i32::MAX as u64,
        ) as usize;

        context.to_clients_buffer_length = parse_u64(
            env(AERON_TO_CLIENTS_BUFFER_LENGTH_ENV_VAR).as_deref(),
            context.to_clients_buffer_length as u64,
            (1024 + BROADCAST_BUFFER_TRAILER_LENGTH) as u64,
            i32::MAX as u64,
        ) as usize;

        context.counters_values_buffer_length = parse_u64(
            env(AERON_COUNTERS_VALUES_BUFFER_LENGTH_ENV_VAR).as_deref(),
            context.counters_values_buffer_length as u64,
            1024,
            i32::MAX as u64,
        ) as usize;
        context.counters_metadata_buffer_length = context.counters_values_buffer_length * 2;

        context.error_buffer_length = parse_u64(
            env(AERON_ERROR_BUFFER_LENGTH_ENV_VAR).as_deref(),
            context.error_buffer_length as u64,
            1024,
            i32::MAX as u64,
        ) as usize;

        context.client_liveness_timeout_ns = parse_u64(
            env(AERON_CLIENT_LIVENESS_TIMEOUT_ENV_VAR).as_deref(),
            context.client_liveness_timeout_ns,
            1000,
            i64::MAX as u64,
        );

        context.publication_linger_timeout_ns = parse_u64(
            env(AERON_PUBLICATION_LINGER_TIMEOUT_ENV_VAR).as_deref(),
            context.publication_linger_timeout_ns,
            1000,
            i64::MAX as u64,
        );

        context.term_buffer_length = parse_u64(
            env(AERON_TERM_BUFFER_LENGTH_ENV_VAR).as_deref(),
            context.term_buffer_length as u64,
            1024,
            i32::MAX as u64,
        ) as usize;

        context.ipc_term_buffer_length = parse_u64(
            env(AERON_IPC_TERM_BUFFER_LENGTH_ENV_VAR).as_deref(),
            context.ipc_term_buffer_length as u64,
            1024,
            i32::MAX as u64,
        ) as usize;

        context.mtu_length = parse_u64(
            env(AERON_MTU_LENGTH_ENV_VAR).as_deref(),
            context.mtu_length as u64,
            DATA_HEADER_LENGTH as u64,
            MAX_UDP_PAYLOAD_LENGTH as u64,
        ) as usize;

        context.ipc_publication_window_length = parse_u64(
            env(AERON_IPC_PUBLICATION_TERM_WINDOW_LENGTH_ENV_VAR).as_deref(),
            context.ipc_publication_window_length as u64,
            0,
            i32::MAX as u64,
        ) as usize;

        context.publication_window_length = parse_u64(
            env(AERON_PUBLICATION_TERM_WINDOW_LENGTH_ENV_VAR).as_deref(),
            context.publication_window_length as u64,
            0,
            i32::MAX as u64,
        ) as usize;

        context.socket_rcvbuf = parse_u64(
            env(AERON_SOCKET_SO_RCVBUF_ENV_VAR).as_deref(),
            context.socket_rcvbuf as u64,
            0,
            i32::MAX as u64,
        ) as usize;

        context.socket_sndbuf = parse_u64(
            env(AERON_SOCKET_SO_SNDBUF_ENV_VAR).as_deref(),
            context.socket_sndbuf as u64,
            0,
            i32::MAX as u64,
        ) as usize;

        context.multicast_ttl = parse_u64(
            env(AERON_SOCKET_MULTICAST_TTL_ENV_VAR).as_deref(),
            context.multicast_ttl as u64,
            0,
            255,
        ) as u8;

        context.send_to_sm_poll_ratio = parse_u64(
            env(AERON_SEND_TO_STATUS_POLL_RATIO_ENV_VAR).as_deref(),
            context.send_to_sm_poll_ratio as u64,
            1,
            i32::MAX as u64,
        ) as usize;

        context.status_message_timeout_ns = parse_u64(
            env(AERON_RCV_STATUS_MESSAGE_TIMEOUT_ENV_VAR).as_deref(),
            context.status_message_timeout_ns,
            1000,
            i64::MAX as u64,
        );

        context
    }

    /// Set the media directory
    pub fn with_aeron_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.aeron_dir = dir.into();
        self
    }

    /// Recursively delete the media directory before creating the CnC file
    pub fn with_dirs_delete_on_start(mut self, delete: bool) -> Self {
        self.dirs_delete_on_start = delete;
        self
    }

    /// Allocate mapped files sparse instead of preallocating blocks
    pub fn with_term_buffer_sparse_file(mut self, sparse: bool) -> Self {
        self.term_buffer_sparse_file = sparse;
        self
    }

    /// Set the client liveness timeout in nanoseconds
    pub fn with_client_liveness_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.client_liveness_timeout_ns = timeout_ns;
        self
    }

    /// Set the counter values region length; the metadata region follows as
    /// twice the values length
    pub fn with_counters_values_buffer_length(mut self, length: usize) -> Self {
        self.counters_values_buffer_length = length;
        self.counters_metadata_buffer_length = length * 2;
        self
    }

    /// Check the buffer geometry invariants the CnC layout relies on
    pub fn validate(&self) -> Result<()> {
        let ring_capacity = self
            .to_driver_buffer_length
            .checked_sub(TRAILER_LENGTH)
            .unwrap_or(0);
        if ring_capacity == 0 || !ring_capacity.is_power_of_two() {
            return Err(AeronError::invalid_parameter(
                "to_driver_buffer_length",
                "Length must be a power of 2 + ring trailer length",
            ));
        }

        let broadcast_capacity = self
            .to_clients_buffer_length
            .checked_sub(BROADCAST_BUFFER_TRAILER_LENGTH)
            .unwrap_or(0);
        if broadcast_capacity == 0 || !broadcast_capacity.is_power_of_two() {
            return Err(AeronError::invalid_parameter(
                "to_clients_buffer_length",
                "Length must be a power of 2 + broadcast trailer length",
            ));
        }

        for (name, length) in [
            (
                "counters_values_buffer_length",
                self.counters_values_buffer_length,
            ),
            (
                "counters_metadata_buffer_length",
                self.counters_metadata_buffer_length,
            ),
            ("error_buffer_length", self.error_buffer_length),
        ] {
            if length == 0 || length % RECORD_ALIGNMENT != 0 {
                return Err(AeronError::invalid_parameter(
                    name,
                    format!("Length must be a non-zero multiple of {}", RECORD_ALIGNMENT),
                ));
            }
        }

        if self.counters_metadata_buffer_length != self.counters_values_buffer_length * 2 {
            return Err(AeronError::invalid_parameter(
                "counters_metadata_buffer_length",
                "Metadata region must be twice the values region",
            ));
        }

        Ok(())
    }

    /// Total CnC file length: the aligned metadata header plus the five
    /// regions
    pub fn cnc_length(&self) -> usize {
        CNC_METADATA_LENGTH
            + self.to_driver_buffer_length
            + self.to_clients_buffer_length
            + self.counters_metadata_buffer_length
            + self.counters_values_buffer_length
            + self.error_buffer_length
    }

    /// The CnC metadata header this configuration produces
    pub fn cnc_metadata(&self) -> CncMetadata {
        CncMetadata {
            cnc_version: CNC_VERSION,
            to_driver_buffer_length: self.to_driver_buffer_length as i32,
            to_clients_buffer_length: self.to_clients_buffer_length as i32,
            counter_metadata_buffer_length: self.counters_metadata_buffer_length as i32,
            counter_values_buffer_length: self.counters_values_buffer_length as i32,
            client_liveness_timeout_ns: self.client_liveness_timeout_ns as i64,
            error_log_buffer_length: self.error_buffer_length as i32,
        }
    }

    /// Publication window for IPC publications over a term of `term_length`
    /// bytes: half the term when unconfigured, otherwise the configured
    /// window capped at the term length.
    pub fn ipc_publication_term_window_length(&self, term_length: usize) -> usize {
        if self.ipc_publication_window_length == 0 {
            term_length / 2
        } else {
            self.ipc_publication_window_length.min(term_length)
        }
    }

    /// Publication window for network publications; same defaulting policy
    /// as the IPC window
    pub fn network_publication_term_window_length(&self, term_length: usize) -> usize {
        if self.publication_window_length == 0 {
            term_length / 2
        } else {
            self.publication_window_length.min(term_length)
        }
    }
}
