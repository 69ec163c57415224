//! Memory-mapped file primitives shared by the driver and client sides

use std::{
    fs::{File, OpenOptions},
    os::fd::AsRawFd,
    path::{Path, PathBuf},
};

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::{fallocate, FallocateFlags};

use crate::error::{AeronError, Result};

/// A read-write memory mapping over a file on a shared filesystem.
///
/// The driver creates and sizes mappings (CnC file, log buffer files); clients
/// map the same files after the fact. Both sides share a mapping through `Arc`
/// and access the bytes through raw pointers, so the mapping itself hands out
/// pointers rather than slices.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    mmap: MmapMut,
    _file: File,
}

impl MappedFile {
    /// Create a file of the given length and map it read-write.
    ///
    /// With `sparse` set the file is only extended; otherwise the blocks are
    /// allocated eagerly so that page faults cannot hit `ENOSPC` later.
    pub fn create(path: impl AsRef<Path>, length: usize, sparse: bool) -> Result<Self> {
        let path = path.as_ref();

        if length == 0 {
            return Err(AeronError::invalid_parameter(
                "length",
                "Mapped file length must be greater than 0",
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| AeronError::from_io(e, "Failed to create mapped file"))?;

        file.set_len(length as u64)
            .map_err(|e| AeronError::from_io(e, "Failed to set mapped file length"))?;

        if !sparse {
            match fallocate(file.as_raw_fd(), FallocateFlags::empty(), 0, length as i64) {
                // Filesystems without preallocation still get a sized file.
                Ok(()) | Err(Errno::EOPNOTSUPP) => {}
                Err(e) => {
                    return Err(AeronError::memory(format!(
                        "Failed to preallocate file: {}",
                        e
                    )))
                }
            }
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(length)
                .map_mut(&file)
                .map_err(|e| AeronError::from_io(e, "Failed to create memory mapping"))?
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            _file: file,
        })
    }

    /// Map an existing file read-write over its full length.
    pub fn map_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| AeronError::from_io(e, "Failed to open existing file"))?;

        let length = file
            .metadata()
            .map_err(|e| AeronError::from_io(e, "Failed to stat existing file"))?
            .len() as usize;

        if length == 0 {
            return Err(AeronError::invalid_parameter(
                "path",
                format!("File is empty: {}", path.display()),
            ));
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(length)
                .map_mut(&file)
                .map_err(|e| AeronError::from_io(e, "Failed to create memory mapping"))?
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            _file: file,
        })
    }

    /// Length of the mapping in bytes
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the mapping is empty (never true for a constructed mapping)
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the mapping was created from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only view of the mapped bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Mutable view of the mapped bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Get a mutable pointer to the start of the mapping.
    ///
    /// # Safety
    /// Callers must coordinate concurrent access through the atomic protocols
    /// of the structures laid out in the region.
    pub unsafe fn as_mut_ptr(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    /// Flush dirty pages back to the file
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| AeronError::from_io(e, "Failed to flush memory mapping"))
    }
}

unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}
