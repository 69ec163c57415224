//! Distinct error log: append-only error aggregation with deduplication
//!
//! Entry layout in the shared buffer, aligned to the ring record alignment:
//!
//! ```text
//!   0        4        8                16               24
//!   +--------+--------+----------------+----------------+-----------------+
//!   |length  |count   |last observation|first observation|encoded error...|
//!   +--------+--------+----------------+----------------+-----------------+
//! ```

mod distinct;
mod reader;

pub use distinct::{DistinctErrorLog, Observation, ObservationLingerFn};
pub use reader::{error_log_exists, read_errors, ErrorLogEntry};

use crate::ringbuf::descriptor::RECORD_ALIGNMENT;

/// Length of the fixed entry header
pub const ERROR_LOG_HEADER_LENGTH: usize = 24;

/// Entry alignment; matches the ring buffer record alignment
pub const ERROR_LOG_RECORD_ALIGNMENT: usize = RECORD_ALIGNMENT;

pub(crate) const LENGTH_OFFSET: usize = 0;
pub(crate) const OBSERVATION_COUNT_OFFSET: usize = 4;
pub(crate) const LAST_OBSERVATION_TIMESTAMP_OFFSET: usize = 8;
pub(crate) const FIRST_OBSERVATION_TIMESTAMP_OFFSET: usize = 16;
