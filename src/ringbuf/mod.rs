//! Concurrent ring buffers over shared byte regions

pub mod descriptor;
mod mpsc;

pub use descriptor::{
    align, CACHE_LINE_LENGTH, CONSUMER_HEARTBEAT_OFFSET, HEADER_LENGTH, HEAD_CACHE_POSITION_OFFSET,
    HEAD_POSITION_OFFSET, PADDING_MSG_TYPE_ID, RECORD_ALIGNMENT, TAIL_POSITION_OFFSET,
    TRAILER_LENGTH,
};
pub use mpsc::ManyToOneRingBuffer;
