//! Tests for the many-to-one ring buffer

use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;

use aeron_core::ringbuf::{
    align, ManyToOneRingBuffer, HEADER_LENGTH, RECORD_ALIGNMENT, TRAILER_LENGTH,
};
use aeron_core::AeronError;

const CAPACITY: usize = 1024;
const TOTAL: usize = CAPACITY + TRAILER_LENGTH;

#[repr(align(64))]
struct RingBacking([u8; TOTAL]);

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

#[test]
fn test_construction_requires_power_of_two_capacity() {
    assert!(ManyToOneRingBuffer::new(1000 + TRAILER_LENGTH).is_err());
    assert!(ManyToOneRingBuffer::new(TRAILER_LENGTH).is_err());
    assert!(ManyToOneRingBuffer::new(CAPACITY + TRAILER_LENGTH).is_ok());
}

#[test]
fn test_roundtrip_preserves_payload_and_type() {
    let ring = ManyToOneRingBuffer::new(TOTAL).unwrap();

    for length in [0usize, 1, 7, 8, 64, CAPACITY / 8] {
        let payload: Vec<u8> = (0..length).map(|i| i as u8).collect();
        assert!(ring.write(42, &payload).unwrap());

        let mut received = Vec::new();
        let count = ring.read(
            |msg_type_id, bytes| received.push((msg_type_id, bytes.to_vec())),
            16,
        );

        assert_eq!(count, 1, "length {}", length);
        assert_eq!(received, vec![(42, payload)]);
    }
}

#[test]
fn test_oversize_payload_rejected() {
    let ring = ManyToOneRingBuffer::new(TOTAL).unwrap();
    let payload = vec![0u8; CAPACITY / 8 + 1];

    assert!(matches!(
        ring.write(1, &payload),
        Err(AeronError::InvalidParameter { .. })
    ));
}

#[test]
fn test_non_positive_msg_type_id_rejected() {
    let ring = ManyToOneRingBuffer::new(TOTAL).unwrap();

    assert!(matches!(
        ring.write(0, b"x"),
        Err(AeronError::InvalidParameter { .. })
    ));
    assert!(matches!(
        ring.write(-1, b"x"),
        Err(AeronError::InvalidParameter { .. })
    ));
}

// Scenario: capacity 1024, write (type=101, payload=[0x41; 8]) at head 0.
#[test]
fn test_single_record_layout() {
    let mut backing = Box::new(RingBacking([0u8; TOTAL]));
    let ptr = NonNull::new(backing.0.as_mut_ptr()).unwrap();
    let ring =
        unsafe { ManyToOneRingBuffer::from_memory(ptr, TOTAL, aeron_core::system_epoch_clock()) }
            .unwrap();

    assert!(ring.write(101, &[0x41; 8]).unwrap());

    let expected_length = align(8 + HEADER_LENGTH, RECORD_ALIGNMENT);
    assert_eq!(ring.producer_position(), expected_length as i64);
    drop(ring);

    let bytes = &backing.0;
    assert_eq!(read_i32(bytes, 0), expected_length as i32);
    assert_eq!(read_i32(bytes, 4), 101);
    assert_eq!(read_i32(bytes, 8), 8);
    assert_eq!(&bytes[HEADER_LENGTH..HEADER_LENGTH + 8], &[0x41; 8]);
}

// Scenario: head 0, tail 1024 (full) - a write returns false, tail unchanged.
#[test]
fn test_write_to_full_buffer_returns_false_and_leaves_tail() {
    let ring = ManyToOneRingBuffer::new(TOTAL).unwrap();

    // 8 records of 128 aligned bytes fill the 1024-byte data region exactly.
    let payload = [0u8; 128 - HEADER_LENGTH];
    for _ in 0..8 {
        assert!(ring.write(101, &payload).unwrap());
    }
    assert_eq!(ring.producer_position(), CAPACITY as i64);

    assert!(!ring.write(101, &[0u8; 8]).unwrap());
    assert_eq!(ring.producer_position(), CAPACITY as i64);
}

#[test]
fn test_records_survive_wrap_around() {
    let ring = ManyToOneRingBuffer::new(TOTAL).unwrap();
    let mut next_value = 0u64;
    let mut expected = 0u64;

    // Uneven record size so the wrap leaves a remainder for padding records.
    for _ in 0..200 {
        for _ in 0..5 {
            if ring.write(9, &next_value.to_ne_bytes()).unwrap() {
                next_value += 1;
            }
        }

        ring.read(
            |msg_type_id, payload| {
                assert_eq!(msg_type_id, 9);
                let value = u64::from_ne_bytes(payload.try_into().unwrap());
                assert_eq!(value, expected);
                expected += 1;
            },
            3,
        );
    }

    while ring.read(
        |_, payload| {
            let value = u64::from_ne_bytes(payload.try_into().unwrap());
            assert_eq!(value, expected);
            expected += 1;
        },
        16,
    ) != 0
    {}

    assert_eq!(expected, next_value);
}

// N producers writing M records each are consumed exactly once, in per-producer order.
#[test]
fn test_concurrent_producers_single_consumer() {
    const PRODUCERS: usize = 4;
    const MESSAGES: u32 = 1000;

    let ring = Arc::new(ManyToOneRingBuffer::new(8192 + TRAILER_LENGTH).unwrap());

    let handles: Vec<_> = (0..PRODUCERS as u32)
        .map(|producer| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for sequence in 0..MESSAGES {
                    let mut payload = [0u8; 8];
                    payload[..4].copy_from_slice(&producer.to_ne_bytes());
                    payload[4..].copy_from_slice(&sequence.to_ne_bytes());

                    while !ring.write(1, &payload).unwrap() {
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    let mut next_expected = [0u32; PRODUCERS];
    let mut total = 0usize;
    while total < PRODUCERS * MESSAGES as usize {
        total += ring.read(
            |_, payload| {
                let producer = u32::from_ne_bytes(payload[..4].try_into().unwrap()) as usize;
                let sequence = u32::from_ne_bytes(payload[4..].try_into().unwrap());
                assert_eq!(sequence, next_expected[producer]);
                next_expected[producer] += 1;
            },
            32,
        );
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(next_expected, [MESSAGES; PRODUCERS]);
    assert_eq!(ring.read(|_, _| {}, 16), 0);
}
