//! Read-side access to the CnC counter values region
//!
//! Counters are allocated by the driver; clients only read values. Each
//! counter occupies its own padded slot in the values region so that hot
//! counters do not share cache lines.

use std::{
    ptr::NonNull,
    sync::atomic::{AtomicI64, Ordering},
};

use crate::{
    error::{AeronError, Result},
    ringbuf::descriptor::CACHE_LINE_LENGTH,
};

/// Bytes reserved per counter value slot
pub const COUNTER_VALUE_LENGTH: usize = 2 * CACHE_LINE_LENGTH;

/// A borrowed view over the counter values region of the CnC file
#[derive(Debug, Clone, Copy)]
pub struct CounterValuesView {
    buffer: NonNull<u8>,
    length: usize,
}

impl CounterValuesView {
    /// Wrap a counter values region.
    ///
    /// # Safety
    /// `buffer` must point to `length` bytes aligned to
    /// [`CACHE_LINE_LENGTH`] that outlive every position handed out by this
    /// view.
    pub unsafe fn new(buffer: NonNull<u8>, length: usize) -> Self {
        Self { buffer, length }
    }

    /// Maximum counter id representable in this region
    pub fn max_counter_id(&self) -> i32 {
        (self.length / COUNTER_VALUE_LENGTH) as i32 - 1
    }

    /// Build a read-only position over the given counter id
    pub fn position(&self, counter_id: i32) -> Result<ReadablePosition> {
        if counter_id < 0 || counter_id > self.max_counter_id() {
            return Err(AeronError::invalid_parameter(
                "counter_id",
                format!(
                    "Counter id {} outside values region (max {})",
                    counter_id,
                    self.max_counter_id()
                ),
            ));
        }

        Ok(ReadablePosition {
            value: unsafe {
                let offset = counter_id as usize * COUNTER_VALUE_LENGTH;
                NonNull::new_unchecked(self.buffer.as_ptr().add(offset) as *mut AtomicI64)
            },
            counter_id,
        })
    }
}

unsafe impl Send for CounterValuesView {}
unsafe impl Sync for CounterValuesView {}

/// A read-only view of one shared 64-bit counter (a position-limit counter,
/// a subscriber position, ...)
#[derive(Debug)]
pub struct ReadablePosition {
    value: NonNull<AtomicI64>,
    counter_id: i32,
}

impl ReadablePosition {
    /// Id of the counter in the CnC metadata
    pub fn counter_id(&self) -> i32 {
        self.counter_id
    }

    /// Volatile read of the counter value
    pub fn get(&self) -> i64 {
        unsafe { self.value.as_ref() }.load(Ordering::Acquire)
    }
}

unsafe impl Send for ReadablePosition {}
unsafe impl Sync for ReadablePosition {}
