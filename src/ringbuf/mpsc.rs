//! Wait-free many-to-one ring buffer over a shared byte region

use std::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicI32, AtomicI64, Ordering},
};

use crate::{
    error::{AeronError, Result},
    EpochClock,
};

use super::descriptor::{
    align, check_msg_type_id, encoded_msg_offset, length_offset, msg_length_offset, type_offset,
    CACHE_LINE_LENGTH, CONSUMER_HEARTBEAT_OFFSET, HEADER_LENGTH, HEAD_CACHE_POSITION_OFFSET,
    HEAD_POSITION_OFFSET, PADDING_MSG_TYPE_ID, RECORD_ALIGNMENT, TAIL_POSITION_OFFSET,
    TRAILER_LENGTH,
};

/// Wait-free multi-producer single-consumer record queue.
///
/// The backing region is `capacity + TRAILER_LENGTH` bytes where `capacity`
/// is a power of two. Producers contend on the tail with compare-and-swap;
/// the single consumer advances the head. A record becomes observable only
/// once its length field is published with release semantics, so a record is
/// observable iff its payload bytes are.
pub struct ManyToOneRingBuffer {
    buffer: NonNull<u8>,
    capacity: usize,
    mask: usize,
    max_message_length: usize,
    clock: EpochClock,
    owned: Option<Layout>,
}

impl ManyToOneRingBuffer {
    /// Allocate a zeroed, heap-backed ring of `total_length` bytes
    /// (`capacity + TRAILER_LENGTH`).
    pub fn new(total_length: usize) -> Result<Self> {
        Self::with_clock(total_length, crate::system_epoch_clock())
    }

    /// Heap-backed ring with an explicit consumer clock
    pub fn with_clock(total_length: usize, clock: EpochClock) -> Result<Self> {
        let capacity = Self::check_capacity(total_length)?;

        let layout = Layout::from_size_align(total_length, CACHE_LINE_LENGTH)
            .map_err(|_| AeronError::memory("Failed to create layout for ring buffer"))?;

        let buffer = unsafe {
            let ptr = std::alloc::alloc_zeroed(layout);
            NonNull::new(ptr).ok_or_else(|| AeronError::memory("Failed to allocate ring buffer"))?
        };

        Ok(Self {
            buffer,
            capacity,
            mask: capacity - 1,
            max_message_length: capacity / 8,
            clock,
            owned: Some(layout),
        })
    }

    /// Construct a ring over externally owned memory (a CnC file region).
    ///
    /// # Safety
    /// `memory` must point to at least `total_length` bytes that are aligned
    /// to [`CACHE_LINE_LENGTH`], zero-initialized on first use, and that
    /// outlive the returned ring.
    pub unsafe fn from_memory(
        memory: NonNull<u8>,
        total_length: usize,
        clock: EpochClock,
    ) -> Result<Self> {
        let capacity = Self::check_capacity(total_length)?;

        Ok(Self {
            buffer: memory,
            capacity,
            mask: capacity - 1,
            max_message_length: capacity / 8,
            clock,
            owned: None,
        })
    }

    fn check_capacity(total_length: usize) -> Result<usize> {
        let capacity = total_length
            .checked_sub(TRAILER_LENGTH)
            .ok_or_else(|| {
                AeronError::invalid_parameter(
                    "total_length",
                    "Region must be at least the trailer length",
                )
            })?;

        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(AeronError::invalid_parameter(
                "capacity",
                format!(
                    "Capacity must be a power of 2 + TRAILER_LENGTH, capacity={}",
                    capacity
                ),
            ));
        }

        Ok(capacity)
    }

    /// Data region capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest accepted payload: `capacity / 8`
    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Current producer (tail) position
    pub fn producer_position(&self) -> i64 {
        self.tail_counter().load(Ordering::Acquire)
    }

    /// Current consumer (head) position
    pub fn consumer_position(&self) -> i64 {
        self.head_counter().load(Ordering::Acquire)
    }

    /// Number of bytes between head and tail
    pub fn size(&self) -> usize {
        let head = self.head_counter().load(Ordering::Acquire);
        let tail = self.tail_counter().load(Ordering::Acquire);
        (tail - head).max(0) as usize
    }

    /// Timestamp last stored by the consumer, used for driver liveness checks
    pub fn consumer_heartbeat_time(&self) -> i64 {
        self.heartbeat_counter().load(Ordering::Acquire)
    }

    /// Store the consumer heartbeat timestamp
    pub fn update_consumer_heartbeat(&self, now_ms: i64) {
        self.heartbeat_counter().store(now_ms, Ordering::Release);
    }

    /// Append a record to the ring.
    ///
    /// Returns `Ok(false)` when there is insufficient free space; the tail is
    /// left untouched in that case. `msg_type_id` must be positive and the
    /// payload no longer than [`max_message_length`](Self::max_message_length).
    pub fn write(&self, msg_type_id: i32, payload: &[u8]) -> Result<bool> {
        check_msg_type_id(msg_type_id)?;

        if payload.len() > self.max_message_length {
            return Err(AeronError::invalid_parameter(
                "payload",
                format!(
                    "Message length {} exceeds max_message_length {}",
                    payload.len(),
                    self.max_message_length
                ),
            ));
        }

        let required = align(payload.len() + HEADER_LENGTH, RECORD_ALIGNMENT);
        let record_offset = match self.claim_capacity(required) {
            Some(offset) => offset,
            None => return Ok(false),
        };

        self.atomic_i32(type_offset(record_offset))
            .store(msg_type_id, Ordering::Relaxed);
        self.atomic_i32(msg_length_offset(record_offset))
            .store(payload.len() as i32, Ordering::Relaxed);

        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.buffer.as_ptr().add(encoded_msg_offset(record_offset)),
                payload.len(),
            );
        }

        // Publish: consumers only see the record once this store is visible.
        self.atomic_i32(length_offset(record_offset))
            .store(required as i32, Ordering::Release);

        Ok(true)
    }

    /// Read up to `message_count_limit` records, invoking `handler` with the
    /// message type id and payload of each non-padding record.
    ///
    /// Runs on the single consumer. Record headers are zeroed after the
    /// handler returns; the head is advanced once at the end of the pass and
    /// the consumer heartbeat is refreshed. If the handler unwinds, the head
    /// is not advanced and the caller is responsible for resetting the buffer.
    pub fn read<F>(&self, mut handler: F, message_count_limit: usize) -> usize
    where
        F: FnMut(i32, &[u8]),
    {
        let head_counter = self.head_counter();
        let head = head_counter.load(Ordering::Relaxed);
        let head_index = (head & self.mask as i64) as usize;
        let contiguous = self.capacity - head_index;

        let mut bytes_read = 0usize;
        let mut messages_read = 0usize;

        while bytes_read < contiguous && messages_read < message_count_limit {
            let record_offset = head_index + bytes_read;
            let record_length =
                self.atomic_i32(length_offset(record_offset)).load(Ordering::Acquire);

            if record_length == 0 {
                break;
            }

            bytes_read += record_length as usize;

            let msg_type_id = self
                .atomic_i32(type_offset(record_offset))
                .load(Ordering::Relaxed);

            if msg_type_id != PADDING_MSG_TYPE_ID {
                let msg_length = self
                    .atomic_i32(msg_length_offset(record_offset))
                    .load(Ordering::Relaxed) as usize;

                let payload = unsafe {
                    std::slice::from_raw_parts(
                        self.buffer.as_ptr().add(encoded_msg_offset(record_offset)),
                        msg_length,
                    )
                };

                handler(msg_type_id, payload);
                messages_read += 1;
            }

            self.zero_record_header(record_offset, record_length as usize);
        }

        if bytes_read > 0 {
            head_counter.store(head + bytes_read as i64, Ordering::Release);
        }

        self.update_consumer_heartbeat((self.clock)());

        messages_read
    }

    /// Claim `required` bytes, returning the record offset or `None` when the
    /// ring is full. The first claimant of a wrap writes a padding record over
    /// the remainder and the claim lands at offset 0.
    fn claim_capacity(&self, required: usize) -> Option<usize> {
        let tail_counter = self.tail_counter();
        let head_cache = self.head_cache_counter();
        let head_counter = self.head_counter();

        let mut head = head_cache.load(Ordering::Relaxed);

        loop {
            let tail = tail_counter.load(Ordering::Acquire);

            if required as i64 > self.capacity as i64 - (tail - head) {
                head = head_counter.load(Ordering::Acquire);
                if required as i64 > self.capacity as i64 - (tail - head) {
                    return None;
                }
                head_cache.store(head, Ordering::Release);
            }

            let tail_index = (tail & self.mask as i64) as usize;
            let to_buffer_end = self.capacity - tail_index;
            let mut padding = 0usize;

            if required > to_buffer_end {
                let mut head_index = (head & self.mask as i64) as usize;

                if required > head_index {
                    head = head_counter.load(Ordering::Acquire);
                    head_index = (head & self.mask as i64) as usize;
                    if required > head_index {
                        return None;
                    }
                    head_cache.store(head, Ordering::Release);
                }

                padding = to_buffer_end;
            }

            let new_tail = tail + (required + padding) as i64;
            if tail_counter
                .compare_exchange_weak(tail, new_tail, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                if padding != 0 {
                    // A padding record can be as short as the alignment, so
                    // only the length and type words are written.
                    self.atomic_i32(type_offset(tail_index))
                        .store(PADDING_MSG_TYPE_ID, Ordering::Relaxed);
                    self.atomic_i32(length_offset(tail_index))
                        .store(padding as i32, Ordering::Release);

                    return Some(0);
                }

                return Some(tail_index);
            }
        }
    }

    /// Zero the header of a consumed record; a short padding record carries
    /// only the length and type words.
    fn zero_record_header(&self, record_offset: usize, record_length: usize) {
        let header_words = record_length.min(HEADER_LENGTH) / 4;
        for word in 0..header_words {
            self.atomic_i32(record_offset + word * 4)
                .store(0, Ordering::Relaxed);
        }
    }

    fn tail_counter(&self) -> &AtomicI64 {
        self.atomic_i64(self.capacity + TAIL_POSITION_OFFSET)
    }

    fn head_cache_counter(&self) -> &AtomicI64 {
        self.atomic_i64(self.capacity + HEAD_CACHE_POSITION_OFFSET)
    }

    fn head_counter(&self) -> &AtomicI64 {
        self.atomic_i64(self.capacity + HEAD_POSITION_OFFSET)
    }

    fn heartbeat_counter(&self) -> &AtomicI64 {
        self.atomic_i64(self.capacity + CONSUMER_HEARTBEAT_OFFSET)
    }

    #[inline]
    fn atomic_i32(&self, offset: usize) -> &AtomicI32 {
        debug_assert!(offset + 4 <= self.capacity + TRAILER_LENGTH);
        unsafe { &*(self.buffer.as_ptr().add(offset) as *const AtomicI32) }
    }

    #[inline]
    fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        debug_assert!(offset + 8 <= self.capacity + TRAILER_LENGTH);
        unsafe { &*(self.buffer.as_ptr().add(offset) as *const AtomicI64) }
    }
}

impl Drop for ManyToOneRingBuffer {
    fn drop(&mut self) {
        if let Some(layout) = self.owned.take() {
            unsafe {
                std::alloc::dealloc(self.buffer.as_ptr(), layout);
            }
        }
    }
}

impl std::fmt::Debug for ManyToOneRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManyToOneRingBuffer")
            .field("capacity", &self.capacity)
            .field("producer_position", &self.producer_position())
            .field("consumer_position", &self.consumer_position())
            .finish()
    }
}

unsafe impl Send for ManyToOneRingBuffer {}
unsafe impl Sync for ManyToOneRingBuffer {}
