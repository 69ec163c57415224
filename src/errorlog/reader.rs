//! Lock-free reader side of the distinct error log

use std::{
    ptr::NonNull,
    sync::atomic::{AtomicI32, AtomicI64, Ordering},
};

use crate::ringbuf::descriptor::align;

use super::{
    ERROR_LOG_HEADER_LENGTH, ERROR_LOG_RECORD_ALIGNMENT, FIRST_OBSERVATION_TIMESTAMP_OFFSET,
    LAST_OBSERVATION_TIMESTAMP_OFFSET, LENGTH_OFFSET, OBSERVATION_COUNT_OFFSET,
};

/// A decoded error log entry delivered to a reader sink
#[derive(Debug)]
pub struct ErrorLogEntry<'a> {
    pub observation_count: i32,
    pub first_observation_timestamp: i64,
    pub last_observation_timestamp: i64,
    /// `"<code>: <description> <message>"`
    pub encoded_error: &'a str,
}

/// Whether the log holds at least one published entry.
///
/// # Safety
/// `buffer` must point to `capacity` readable bytes laid out as an error log
/// region, aligned to [`ERROR_LOG_RECORD_ALIGNMENT`].
pub unsafe fn error_log_exists(buffer: NonNull<u8>, capacity: usize) -> bool {
    if capacity < ERROR_LOG_HEADER_LENGTH {
        return false;
    }

    let length = (*(buffer.as_ptr() as *const AtomicI32)).load(Ordering::Acquire);
    length != 0
}

/// Iterate published entries from offset 0, halting at the first zero-length
/// header. Entries whose `last_observation_timestamp >= since_timestamp` are
/// delivered to `sink`; the number delivered is returned.
///
/// Safe to run concurrently with writers: the length field is published with
/// release semantics, so an entry is either seen whole or not at all.
///
/// # Safety
/// `buffer` must point to `capacity` readable bytes laid out as an error log
/// region, aligned to [`ERROR_LOG_RECORD_ALIGNMENT`], and remain valid for
/// the duration of the call.
pub unsafe fn read_errors<F>(
    buffer: NonNull<u8>,
    capacity: usize,
    since_timestamp: i64,
    mut sink: F,
) -> usize
where
    F: FnMut(ErrorLogEntry<'_>),
{
    let mut entries = 0usize;
    let mut offset = 0usize;

    while offset + ERROR_LOG_HEADER_LENGTH <= capacity {
        let base = buffer.as_ptr().add(offset);

        let length = (*(base.add(LENGTH_OFFSET) as *const AtomicI32)).load(Ordering::Acquire);
        if length == 0 {
            break;
        }
        let length = length as usize;

        let last_observation_timestamp = (*(base.add(LAST_OBSERVATION_TIMESTAMP_OFFSET)
            as *const AtomicI64))
            .load(Ordering::Acquire);

        if last_observation_timestamp >= since_timestamp {
            let observation_count =
                (*(base.add(OBSERVATION_COUNT_OFFSET) as *const AtomicI32)).load(Ordering::Acquire);
            let first_observation_timestamp = (*(base.add(FIRST_OBSERVATION_TIMESTAMP_OFFSET)
                as *const AtomicI64))
                .load(Ordering::Relaxed);

            let encoded = std::slice::from_raw_parts(
                base.add(ERROR_LOG_HEADER_LENGTH),
                length - ERROR_LOG_HEADER_LENGTH,
            );

            entries += 1;
            sink(ErrorLogEntry {
                observation_count,
                first_observation_timestamp,
                last_observation_timestamp,
                encoded_error: std::str::from_utf8(encoded).unwrap_or(""),
            });
        }

        offset += align(length, ERROR_LOG_RECORD_ALIGNMENT);
    }

    entries
}
