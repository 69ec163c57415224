//! Record and trailer layout for ring buffers over shared byte regions
//!
//! A record is laid out as:
//!
//! ```text
//!   0        4        8        12       16 -byte position
//!   +--------+--------+--------+--------+------------------------+
//!   |rec len |msg type|msg len |reserve |encoded message.........|
//!   +--------+--------+--------+--------+------------------------+
//! ```
//!
//! `rec len` is the aligned total length including the header and is
//! published last with release semantics; a zero length terminates a
//! consumer scan.

use crate::error::{AeronError, Result};

/// Assumed cache line length for padding shared counters
pub const CACHE_LINE_LENGTH: usize = 64;

/// Alignment of every record in the data region
pub const RECORD_ALIGNMENT: usize = 8;

/// Record header length: record length, message type, message length, reserve
pub const HEADER_LENGTH: usize = 16;

/// Message type id of padding records inserted at the end of the data region
pub const PADDING_MSG_TYPE_ID: i32 = -1;

/// Trailer length: tail, head cache, head and consumer heartbeat, each on its
/// own cache line
pub const TRAILER_LENGTH: usize = 4 * CACHE_LINE_LENGTH;

/// Offset of the producer tail position within the trailer
pub const TAIL_POSITION_OFFSET: usize = 0;

/// Offset of the cached consumer head position within the trailer
pub const HEAD_CACHE_POSITION_OFFSET: usize = CACHE_LINE_LENGTH;

/// Offset of the consumer head position within the trailer
pub const HEAD_POSITION_OFFSET: usize = 2 * CACHE_LINE_LENGTH;

/// Offset of the consumer heartbeat timestamp within the trailer
pub const CONSUMER_HEARTBEAT_OFFSET: usize = 3 * CACHE_LINE_LENGTH;

/// Align a value up to the given power-of-two alignment
pub const fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Offset of the record length field
pub const fn length_offset(record_offset: usize) -> usize {
    record_offset
}

/// Offset of the message type id field
pub const fn type_offset(record_offset: usize) -> usize {
    record_offset + 4
}

/// Offset of the message length field
pub const fn msg_length_offset(record_offset: usize) -> usize {
    record_offset + 8
}

/// Offset of the encoded message payload
pub const fn encoded_msg_offset(record_offset: usize) -> usize {
    record_offset + HEADER_LENGTH
}

/// Message type ids must be positive; negative values are reserved
pub fn check_msg_type_id(msg_type_id: i32) -> Result<()> {
    if msg_type_id < 1 {
        return Err(AeronError::invalid_parameter(
            "msg_type_id",
            format!(
                "Message type id must be greater than zero, msg_type_id={}",
                msg_type_id
            ),
        ));
    }

    Ok(())
}
