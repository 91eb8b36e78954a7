//! Memory-mapped access to binary artifacts on disk.
//!
//! This module provides [`Buffer`], a read-only memory-mapped view of an
//! artifact file, and the [`parser`] submodule with the bounds-checked
//! cursor parser used to decode the artifact container format.
//!
//! # Architecture
//!
//! Artifacts are mapped into the process's address space rather than read
//! into heap buffers: a parsed [`crate::module::BinaryModule`] lives for the
//! whole process, and mapping lets the operating system page artifact bytes
//! in and out on demand. All access goes through bounds-checked slices.
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use depscope::file::Buffer;
//!
//! let buffer = Buffer::from_file("lib/net6.0/MyLib.dll".as_ref())?;
//! println!("artifact is {} bytes", buffer.len());
//! let magic = buffer.slice(0, 4)?;
//! # Ok::<(), depscope::Error>(())
//! ```

pub(crate) mod parser;

use memmap2::Mmap;
use std::{fs, path::Path};

use crate::Result;

/// A read-only memory-mapped view of a binary artifact.
///
/// Empty files are rejected up front: an empty artifact can never contain a
/// valid container header, and `memmap2` cannot map zero-length files.
#[derive(Debug)]
pub struct Buffer {
    data: Mmap,
}

impl Buffer {
    /// Map the file at `path` read-only.
    ///
    /// # Arguments
    /// * `path` - Location of the artifact on disk
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// mapped, and [`crate::Error::Malformed`] if it is empty.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(malformed_error!("Artifact is empty - {}", path.display()));
        }

        // SAFETY: the mapping is read-only and kept private to this Buffer
        let data = unsafe { Mmap::map(&file)? };
        Ok(Buffer { data })
    }

    /// Total length of the mapped data in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the mapped data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The complete mapped data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// A bounds-checked slice of the mapped data.
    ///
    /// # Arguments
    /// * `offset` - Start of the slice within the artifact
    /// * `len` - Length of the slice in bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the requested range exceeds
    /// the mapped data.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(&self.data[offset..end]),
            _ => Err(out_of_bounds_error!()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_buffer_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x42, 0x4D, 0x44, 0x4C, 0x01, 0x00]).unwrap();
        file.flush().unwrap();

        let buffer = Buffer::from_file(file.path()).unwrap();
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.slice(0, 4).unwrap(), b"BMDL");
        assert!(buffer.slice(4, 3).is_err());
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(Buffer::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = Buffer::from_file(Path::new("/nonexistent/artifact.dll"));
        assert!(result.is_err());
    }
}
