//! # aeron-core: shared-memory pub/sub transport core
//!
//! The core of a high-throughput publish/subscribe transport split across two
//! processes: a media driver owning the wire and shared-memory resources, and
//! a client library linked into applications. The two halves communicate
//! exclusively through a memory-mapped command-and-control (CnC) file holding
//! lock-free structures.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       cnc.dat                           │
//! ├────────────┬───────────┬──────────┬──────────┬──────────┤
//! │ to-driver  │ to-clients│ counter  │ counter  │ error    │
//! │ MPSC ring  │ broadcast │ metadata │ values   │ log      │
//! └─────┬──────┴─────┬─────┴──────────┴────┬─────┴────┬─────┘
//!       │ commands    │ responses           │ reads    │ errors
//!   ┌───┴─────────────┴───┐            ┌────┴──────────┴────┐
//!   │   ClientConductor   │            │    media driver    │
//!   │  (this crate, §D)   │            │  (separate proc)   │
//!   └─────────────────────┘            └────────────────────┘
//! ```
//!
//! The crate covers the client conductor state machine, the CnC layout and
//! driver configuration surface, the many-to-one command ring, and the
//! distinct error log. The on-the-wire protocol (UDP transport, flow
//! control, term buffers) lives elsewhere and is only referenced through
//! collaborator interfaces.

pub mod client;
pub mod counters;
pub mod driver;
pub mod error;
pub mod errorlog;
pub mod memory;
pub mod ringbuf;

pub use client::{
    ClientConductor, ClientContext, DriverEvent, DriverEventSource, DriverProxy, Image,
    LogBuffers, Publication, RegistrationStatus, Subscription,
};
pub use counters::{CounterValuesView, ReadablePosition, COUNTER_VALUE_LENGTH};
pub use driver::{CncFile, CncMetadata, DriverContext, ThreadingMode, CNC_FILE, CNC_VERSION};
pub use error::{AeronError, Result};
pub use errorlog::DistinctErrorLog;
pub use memory::MappedFile;
pub use ringbuf::ManyToOneRingBuffer;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds-since-epoch clock supplied by the embedding agent.
///
/// Concrete clocks are collaborators; tests drive the core with manual
/// clocks, production wiring uses [`system_epoch_clock`].
pub type EpochClock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Wall-clock milliseconds since the Unix epoch
pub fn system_epoch_clock() -> EpochClock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    })
}
