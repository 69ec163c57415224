//! Append-only distinct error log over a shared byte buffer

use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicI32, AtomicI64, AtomicPtr, Ordering},
    sync::Mutex,
};

use crate::{
    error::{AeronError, Result},
    ringbuf::descriptor::align,
    EpochClock,
};

use super::{
    ERROR_LOG_HEADER_LENGTH, ERROR_LOG_RECORD_ALIGNMENT, FIRST_OBSERVATION_TIMESTAMP_OFFSET,
    LAST_OBSERVATION_TIMESTAMP_OFFSET, LENGTH_OFFSET, OBSERVATION_COUNT_OFFSET,
};

/// In-process index entry for a distinct observation already in the buffer
#[derive(Debug, Clone)]
pub struct Observation {
    pub error_code: i32,
    pub description: String,
    pub offset: usize,
}

/// Deferred-reclamation sink for retired observation arrays.
///
/// A new distinct observation republishes the whole index array; the old
/// array may still be walked by concurrent recorders, so it is handed to this
/// function instead of being dropped. The owner frees it once a linger
/// interval has passed.
pub type ObservationLingerFn = Box<dyn Fn(Box<Vec<Observation>>) + Send + Sync>;

/// Lock-free append-only error aggregator with deduplication.
///
/// Errors are keyed by `(error_code, description)`; the free-text message is
/// recorded with the first observation only. Repeat observations atomically
/// bump the in-buffer count and timestamp without taking a lock. New distinct
/// observations append a record under a writer mutex and publish an immutable
/// index array with a release store.
pub struct DistinctErrorLog {
    buffer: NonNull<u8>,
    capacity: usize,
    clock: EpochClock,
    linger: ObservationLingerFn,
    observations: AtomicPtr<Vec<Observation>>,
    /// Writer mutex; the guarded value is the next record offset.
    next_offset: Mutex<usize>,
    owned: Option<Layout>,
}

impl DistinctErrorLog {
    /// Allocate a zeroed, heap-backed log of `capacity` bytes
    pub fn new(capacity: usize, clock: EpochClock, linger: ObservationLingerFn) -> Result<Self> {
        Self::check_capacity(capacity)?;

        let layout = Layout::from_size_align(capacity, ERROR_LOG_RECORD_ALIGNMENT)
            .map_err(|_| AeronError::memory("Failed to create layout for error log"))?;

        let buffer = unsafe {
            let ptr = std::alloc::alloc_zeroed(layout);
            NonNull::new(ptr).ok_or_else(|| AeronError::memory("Failed to allocate error log"))?
        };

        Ok(Self {
            buffer,
            capacity,
            clock,
            linger,
            observations: AtomicPtr::new(std::ptr::null_mut()),
            next_offset: Mutex::new(0),
            owned: Some(layout),
        })
    }

    /// Construct a log over externally owned memory (a CnC file region).
    ///
    /// # Safety
    /// `memory` must point to at least `capacity` bytes aligned to
    /// [`ERROR_LOG_RECORD_ALIGNMENT`], zero-initialized on first use, that
    /// outlive the returned log.
    pub unsafe fn from_memory(
        memory: NonNull<u8>,
        capacity: usize,
        clock: EpochClock,
        linger: ObservationLingerFn,
    ) -> Result<Self> {
        Self::check_capacity(capacity)?;

        Ok(Self {
            buffer: memory,
            capacity,
            clock,
            linger,
            observations: AtomicPtr::new(std::ptr::null_mut()),
            next_offset: Mutex::new(0),
            owned: None,
        })
    }

    fn check_capacity(capacity: usize) -> Result<()> {
        if capacity < ERROR_LOG_HEADER_LENGTH {
            return Err(AeronError::invalid_parameter(
                "capacity",
                "Error log capacity smaller than a record header",
            ));
        }

        Ok(())
    }

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of distinct observations recorded so far
    pub fn num_observations(&self) -> usize {
        let observations = self.observations.load(Ordering::Acquire);
        if observations.is_null() {
            0
        } else {
            unsafe { (*observations).len() }
        }
    }

    /// Record an error observation.
    ///
    /// The fast path (an already-known `(error_code, description)` pair) is
    /// lock-free. Returns `ResourceExhausted` when the buffer cannot hold a
    /// new distinct record; no partial record is written in that case.
    pub fn record(&self, error_code: i32, description: &str, message: &str) -> Result<()> {
        let timestamp = (self.clock)();

        let observations = self.observations.load(Ordering::Acquire);
        let offset = match Self::find_observation(observations, error_code, description) {
            Some(offset) => offset,
            None => self.new_observation(timestamp, error_code, description, message)?,
        };

        self.atomic_i32(offset + OBSERVATION_COUNT_OFFSET)
            .fetch_add(1, Ordering::Relaxed);
        self.atomic_i64(offset + LAST_OBSERVATION_TIMESTAMP_OFFSET)
            .store(timestamp, Ordering::Release);

        Ok(())
    }

    /// Read entries whose last observation is at or after `since_timestamp`,
    /// delivering each to `sink` and returning the number delivered.
    pub fn read<F>(&self, since_timestamp: i64, sink: F) -> usize
    where
        F: FnMut(super::ErrorLogEntry<'_>),
    {
        unsafe { super::read_errors(self.buffer, self.capacity, since_timestamp, sink) }
    }

    fn find_observation(
        observations: *mut Vec<Observation>,
        error_code: i32,
        description: &str,
    ) -> Option<usize> {
        if observations.is_null() {
            return None;
        }

        unsafe { &*observations }
            .iter()
            .find(|o| o.error_code == error_code && o.description == description)
            .map(|o| o.offset)
    }

    fn new_observation(
        &self,
        timestamp: i64,
        error_code: i32,
        description: &str,
        message: &str,
    ) -> Result<usize> {
        let mut next_offset = self
            .next_offset
            .lock()
            .map_err(|_| AeronError::memory("Error log writer mutex poisoned"))?;

        // Another writer may have raced us to the same key.
        let old_observations = self.observations.load(Ordering::Acquire);
        if let Some(offset) = Self::find_observation(old_observations, error_code, description) {
            return Ok(offset);
        }

        let encoded = format!("{}: {} {}", error_code, description, message);
        let length = ERROR_LOG_HEADER_LENGTH + encoded.len();
        let offset = *next_offset;

        if offset + length > self.capacity {
            return Err(AeronError::resource_exhausted("distinct error log"));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                encoded.as_ptr(),
                self.buffer.as_ptr().add(offset + ERROR_LOG_HEADER_LENGTH),
                encoded.len(),
            );
        }
        self.atomic_i64(offset + FIRST_OBSERVATION_TIMESTAMP_OFFSET)
            .store(timestamp, Ordering::Relaxed);
        self.atomic_i32(offset + OBSERVATION_COUNT_OFFSET)
            .store(0, Ordering::Relaxed);

        *next_offset = align(offset + length, ERROR_LOG_RECORD_ALIGNMENT);

        let mut new_array = Vec::with_capacity(self.num_observations() + 1);
        new_array.push(Observation {
            error_code,
            description: description.to_string(),
            offset,
        });
        if !old_observations.is_null() {
            new_array.extend_from_slice(unsafe { &*old_observations });
        }

        self.observations
            .store(Box::into_raw(Box::new(new_array)), Ordering::Release);

        // Publish the record; readers either see it whole or not at all.
        self.atomic_i32(offset + LENGTH_OFFSET)
            .store(length as i32, Ordering::Release);

        if !old_observations.is_null() {
            (self.linger)(unsafe { Box::from_raw(old_observations) });
        }

        Ok(offset)
    }

    #[inline]
    fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        debug_assert!(offset + 4 <= self.capacity);
        unsafe { &*(self.buffer.as_ptr().add(offset) as *const AtomicI32) }
    }

    #[inline]
    fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        debug_assert!(offset + 8 <= self.capacity);
        unsafe { &*(self.buffer.as_ptr().add(offset) as *const AtomicI64) }
    }
}

impl Drop for DistinctErrorLog {
    fn drop(&mut self) {
        let observations = self.observations.load(Ordering::Acquire);
        if !observations.is_null() {
            unsafe { drop(Box::from_raw(observations)) };
        }

        if let Some(layout) = self.owned.take() {
            unsafe {
                std::alloc::dealloc(self.buffer.as_ptr(), layout);
            }
        }
    }
}

impl std::fmt::Debug for DistinctErrorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistinctErrorLog")
            .field("capacity", &self.capacity)
            .field("num_observations", &self.num_observations())
            .finish()
    }
}

unsafe impl Send for DistinctErrorLog {}
unsafe impl Sync for DistinctErrorLog {}
