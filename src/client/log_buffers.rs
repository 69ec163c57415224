//! Mapped log buffer files shared between publications, subscriptions and
//! images

use std::path::{Path, PathBuf};

use crate::{error::Result, memory::MappedFile};

/// A memory-mapped multi-term log file.
///
/// Ownership is shared (`Arc`) between every publication, subscription or
/// image that uses the log; release happens only through the conductor's
/// linger mechanism, never synchronously.
#[derive(Debug)]
pub struct LogBuffers {
    mapping: MappedFile,
}

impl LogBuffers {
    /// Map an existing log file created by the media driver
    pub fn map_existing(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            mapping: MappedFile::map_existing(path)?,
        })
    }

    /// Total mapped length in bytes
    pub fn length(&self) -> usize {
        self.mapping.len()
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.mapping.path()
    }

    /// Owned copy of the backing file path
    pub fn file_name(&self) -> PathBuf {
        self.mapping.path().to_path_buf()
    }
}
