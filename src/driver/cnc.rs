//! Command-and-control file: the fixed shared-memory layout both sides agree
//! on
//!
//! The file starts with a packed metadata header padded to two cache lines,
//! followed by five regions in order: to-driver ring, to-clients broadcast,
//! counter metadata, counter values, error log.

use std::{path::Path, ptr::NonNull};

use crate::{
    error::{AeronError, Result},
    memory::MappedFile,
    ringbuf::descriptor::{align, CACHE_LINE_LENGTH},
    ringbuf::ManyToOneRingBuffer,
};

use super::context::DriverContext;

/// File name of the CnC file within the media directory
pub const CNC_FILE: &str = "cnc.dat";

/// Layout version stamped into the metadata header
pub const CNC_VERSION: i32 = 1;

/// Trailer of the to-clients broadcast region (latest-sequence block)
pub const BROADCAST_BUFFER_TRAILER_LENGTH: usize = 2 * CACHE_LINE_LENGTH;

/// Metadata header region length: the packed header padded to two cache lines
pub const CNC_METADATA_LENGTH: usize =
    align(std::mem::size_of::<CncMetadata>(), 2 * CACHE_LINE_LENGTH);

/// Packed metadata record at offset 0 of the CnC file.
///
/// Immutable once the driver has created the file; clients cache the region
/// geometry at attach time.
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy)]
pub struct CncMetadata {
    pub cnc_version: i32,
    pub to_driver_buffer_length: i32,
    pub to_clients_buffer_length: i32,
    pub counter_metadata_buffer_length: i32,
    pub counter_values_buffer_length: i32,
    pub client_liveness_timeout_ns: i64,
    pub error_log_buffer_length: i32,
}

impl CncMetadata {
    /// Byte offset of the to-driver ring region
    pub fn to_driver_buffer_offset(&self) -> usize {
        CNC_METADATA_LENGTH
    }

    /// Byte offset of the to-clients broadcast region
    pub fn to_clients_buffer_offset(&self) -> usize {
        self.to_driver_buffer_offset() + self.to_driver_buffer_length as usize
    }

    /// Byte offset of the counter metadata region
    pub fn counters_metadata_buffer_offset(&self) -> usize {
        self.to_clients_buffer_offset() + self.to_clients_buffer_length as usize
    }

    /// Byte offset of the counter values region
    pub fn counters_values_buffer_offset(&self) -> usize {
        self.counters_metadata_buffer_offset() + self.counter_metadata_buffer_length as usize
    }

    /// Byte offset of the error log region
    pub fn error_log_buffer_offset(&self) -> usize {
        self.counters_values_buffer_offset() + self.counter_values_buffer_length as usize
    }

    /// Total file length this header describes
    pub fn total_length(&self) -> usize {
        self.error_log_buffer_offset() + self.error_log_buffer_length as usize
    }
}

/// The mapped CnC file plus its cached metadata
#[derive(Debug)]
pub struct CncFile {
    mapping: MappedFile,
    metadata: CncMetadata,
}

impl CncFile {
    /// Driver side: create the media directory and the CnC file, stamping the
    /// metadata header once.
    pub fn create(context: &DriverContext) -> Result<Self> {
        context.validate()?;

        if context.aeron_dir.exists() {
            if context.dirs_delete_on_start {
                super::context::dir_delete(&context.aeron_dir)?;
            } else if context.warn_if_dirs_exist {
                tracing::warn!(dir = %context.aeron_dir.display(), "media directory already exists");
            }
        }
        std::fs::create_dir_all(&context.aeron_dir)
            .map_err(|e| AeronError::from_io(e, "Failed to create media directory"))?;

        let path = context.aeron_dir.join(CNC_FILE);
        let mapping = MappedFile::create(&path, context.cnc_length(), false)?;

        let metadata = context.cnc_metadata();
        unsafe {
            std::ptr::write_unaligned(mapping.as_mut_ptr() as *mut CncMetadata, metadata);
        }
        mapping.flush()?;

        Ok(Self { mapping, metadata })
    }

    /// Client side: map an existing CnC file and cache its geometry.
    pub fn map_existing(dir: &Path) -> Result<Self> {
        let path = dir.join(CNC_FILE);
        let mapping = MappedFile::map_existing(&path)?;

        if mapping.len() < CNC_METADATA_LENGTH {
            return Err(AeronError::invalid_parameter(
                "cnc_file",
                format!("CnC file truncated: {} bytes", mapping.len()),
            ));
        }

        let metadata = unsafe {
            std::ptr::read_unaligned(mapping.as_mut_ptr() as *const CncMetadata)
        };

        if metadata.cnc_version != CNC_VERSION {
            return Err(AeronError::invalid_parameter(
                "cnc_version",
                format!(
                    "CnC file version not understood: version={}",
                    metadata.cnc_version
                ),
            ));
        }

        if mapping.len() < metadata.total_length() {
            return Err(AeronError::invalid_parameter(
                "cnc_file",
                "CnC file shorter than its metadata describes",
            ));
        }

        Ok(Self { mapping, metadata })
    }

    /// The cached metadata header
    pub fn metadata(&self) -> CncMetadata {
        self.metadata
    }

    /// Total mapped length
    pub fn length(&self) -> usize {
        self.mapping.len()
    }

    /// The to-driver ring region
    pub fn to_driver_buffer(&self) -> (NonNull<u8>, usize) {
        self.region(
            self.metadata.to_driver_buffer_offset(),
            self.metadata.to_driver_buffer_length as usize,
        )
    }

    /// The to-clients broadcast region
    pub fn to_clients_buffer(&self) -> (NonNull<u8>, usize) {
        self.region(
            self.metadata.to_clients_buffer_offset(),
            self.metadata.to_clients_buffer_length as usize,
        )
    }

    /// The counter metadata region
    pub fn counters_metadata_buffer(&self) -> (NonNull<u8>, usize) {
        self.region(
            self.metadata.counters_metadata_buffer_offset(),
            self.metadata.counter_metadata_buffer_length as usize,
        )
    }

    /// The counter values region
    pub fn counters_values_buffer(&self) -> (NonNull<u8>, usize) {
        self.region(
            self.metadata.counters_values_buffer_offset(),
            self.metadata.counter_values_buffer_length as usize,
        )
    }

    /// The error log region
    pub fn error_log_buffer(&self) -> (NonNull<u8>, usize) {
        self.region(
            self.metadata.error_log_buffer_offset(),
            self.metadata.error_log_buffer_length as usize,
        )
    }

    fn region(&self, offset: usize, length: usize) -> (NonNull<u8>, usize) {
        debug_assert!(offset + length <= self.mapping.len());
        let ptr = unsafe { NonNull::new_unchecked(self.mapping.as_mut_ptr().add(offset)) };
        (ptr, length)
    }
}

/// Probe whether a media driver is active under `dir`: the CnC file must
/// exist, carry a known version, and its to-driver consumer heartbeat must be
/// within `timeout_ms` of `now_ms`.
pub fn is_driver_active(dir: &Path, timeout_ms: i64, now_ms: i64) -> bool {
    let cnc = match CncFile::map_existing(dir) {
        Ok(cnc) => cnc,
        Err(e) => {
            tracing::info!(dir = %dir.display(), error = %e, "no CnC file to probe");
            return false;
        }
    };

    let (ptr, length) = cnc.to_driver_buffer();
    let ring = match unsafe {
        ManyToOneRingBuffer::from_memory(ptr, length, crate::system_epoch_clock())
    } {
        Ok(ring) => ring,
        Err(e) => {
            tracing::info!(error = %e, "CnC file could not init to-driver buffer");
            return false;
        }
    };

    let age_ms = now_ms - ring.consumer_heartbeat_time();
    tracing::info!(age_ms, "to-driver consumer heartbeat age");

    age_ms <= timeout_ms
}
