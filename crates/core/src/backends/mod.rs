//! Byte-read collaborators.
//!
//! Matching never touches binary images directly. String naming and
//! verification ask an [`ImageReader`] for bytes at a virtual address; this
//! module provides an in-memory reader and (behind the `image-backend`
//! feature) a file-backed one that understands PE and ELF section tables.

use std::collections::BTreeMap;

use thiserror::Error;

#[cfg(feature = "image-backend")]
pub mod image;

#[cfg(feature = "image-backend")]
pub use image::ImageFile;

/// Error type for byte reads.
#[derive(Debug, Error)]
pub enum ReadError {
    /// No mapped region contains the address.
    #[error("address {addr:#x} is not mapped")]
    Unmapped { addr: u64 },

    /// The read starts inside a region but runs past its end.
    #[error("read of {size} bytes at {addr:#x} runs past the end of its region")]
    OutOfRange { addr: u64, size: u64 },

    /// A terminator-delimited read hit the end of the region first.
    #[error("no string terminator after {addr:#x}")]
    Unterminated { addr: u64 },

    /// The image could not be parsed or is of an unsupported kind.
    #[error("failed to parse image: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for reads.
pub type ReadResult<T> = Result<T, ReadError>;

/// Something that can hand out bytes at a virtual address of one binary.
pub trait ImageReader {
    /// Read `size` bytes at `addr`. With `size = None`, read up to and
    /// including the first null terminator: one zero byte, or an aligned
    /// pair of zero bytes when `wide` is set.
    fn read(&self, addr: u64, size: Option<u64>, wide: bool) -> ReadResult<Vec<u8>>;
}

impl<T: ImageReader + ?Sized> ImageReader for &T {
    fn read(&self, addr: u64, size: Option<u64>, wide: bool) -> ReadResult<Vec<u8>> {
        (**self).read(addr, size, wide)
    }
}

/// Cut `data` just after its first null terminator.
pub(crate) fn take_terminated(data: &[u8], addr: u64, wide: bool) -> ReadResult<Vec<u8>> {
    let end = if wide {
        data.chunks_exact(2).position(|pair| pair == [0, 0]).map(|i| i * 2 + 2)
    } else {
        data.iter().position(|b| *b == 0).map(|i| i + 1)
    };
    match end {
        Some(end) => Ok(data[..end].to_vec()),
        None => Err(ReadError::Unterminated { addr }),
    }
}

/// Address-keyed byte blobs held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    blobs: BTreeMap<u64, Vec<u8>>,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `bytes` at `addr`. Blobs should not overlap; a later blob at the
    /// same start address replaces the earlier one.
    pub fn insert(&mut self, addr: u64, bytes: impl Into<Vec<u8>>) {
        self.blobs.insert(addr, bytes.into());
    }

    pub fn with_blob(mut self, addr: u64, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(addr, bytes);
        self
    }
}

impl ImageReader for MemoryImage {
    fn read(&self, addr: u64, size: Option<u64>, wide: bool) -> ReadResult<Vec<u8>> {
        let (start, blob) =
            self.blobs.range(..=addr).next_back().ok_or(ReadError::Unmapped { addr })?;
        let offset = usize::try_from(addr - start).map_err(|_| ReadError::Unmapped { addr })?;
        if offset >= blob.len() {
            return Err(ReadError::Unmapped { addr });
        }
        let rest = &blob[offset..];
        match size {
            Some(size) => {
                let len = usize::try_from(size)
                    .ok()
                    .filter(|len| *len <= rest.len())
                    .ok_or(ReadError::OutOfRange { addr, size })?;
                Ok(rest[..len].to_vec())
            }
            None => take_terminated(rest, addr, wide),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_reads_stay_inside_a_blob() {
        let image = MemoryImage::new().with_blob(0x1000, b"abcdef".to_vec());
        assert_eq!(image.read(0x1002, Some(2), false).unwrap(), b"cd");
        assert!(matches!(image.read(0x1004, Some(4), false), Err(ReadError::OutOfRange { .. })));
        assert!(matches!(image.read(0x0fff, Some(1), false), Err(ReadError::Unmapped { .. })));
        assert!(matches!(image.read(0x1006, Some(1), false), Err(ReadError::Unmapped { .. })));
    }

    #[test]
    fn unsized_reads_stop_at_terminator() {
        let image = MemoryImage::new()
            .with_blob(0x10, b"Hi\0junk".to_vec())
            .with_blob(0x20, vec![b'A', 0, 0, b'B', 0, 0, 0xff, 0xff]);
        assert_eq!(image.read(0x10, None, false).unwrap(), b"Hi\0");
        // The zero pair at offset 2 straddles two code units and does not count.
        assert_eq!(image.read(0x20, None, true).unwrap(), vec![b'A', 0, 0, b'B', 0, 0]);
        assert!(matches!(
            MemoryImage::new().with_blob(0, b"xx".to_vec()).read(0, None, false),
            Err(ReadError::Unterminated { .. })
        ));
    }
}
