//! Identifiers and ranges shared by the download and upload halves of the engine.
//!
//! [`FileDescriptor`] and [`ChunkRange`] are immutable values; equality covers
//! every field so that a re-published file with a corrected size or hash is a
//! distinct key from its predecessor.

use core::fmt;

use crate::constants::PEER_ID_LEN;

/// Helper to write lowercase hex.
fn fmt_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

/// A 16-byte swarm participant identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    pub const fn new(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an identifier from a big-endian integer.
    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PeerId {
    type Error = InvalidLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; PEER_ID_LEN] = bytes.try_into().map_err(|_| InvalidLength {
            expected: PEER_ID_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(&self.0, f)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId(")?;
        fmt_hex(&self.0[..4], f)?;
        write!(f, "..)")
    }
}

/// Identity of a shareable file: numeric id, content hash, and size.
///
/// The hash may be empty while it is not yet known. Two descriptors with the
/// same `id` but different sizes or hashes are different files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileDescriptor {
    id: u32,
    hash: String,
    size: u64,
}

impl FileDescriptor {
    pub fn new(id: u32, hash: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            hash: hash.into(),
            size,
        }
    }

    /// Descriptor whose content hash is not known yet.
    pub fn unhashed(id: u32, size: u64) -> Self {
        Self::new(id, String::new(), size)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of chunks of `chunk_size` bytes needed to cover the file.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub fn chunk_count(&self, chunk_size: u32) -> u32 {
        let count = self.size.div_ceil(u64::from(chunk_size));
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// The byte range of chunk `index` for this file.
    pub fn chunk_range(&self, index: u32, chunk_size: u32) -> ChunkRange {
        ChunkRange::from_index(index, chunk_size, self.size)
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id, self.hash, self.size)
    }
}

/// A contiguous byte range of a file, identified by its chunk index.
///
/// `offset` is always `index * chunk_size`. `size` equals the chunk size except
/// for the last chunk, which is clipped to the bytes remaining in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub index: u32,
    pub offset: u64,
    pub size: u32,
}

impl ChunkRange {
    pub const fn new(index: u32, offset: u64, size: u32) -> Self {
        Self {
            index,
            offset,
            size,
        }
    }

    /// Compute the range of chunk `index` in a file of `file_size` bytes.
    pub fn from_index(index: u32, chunk_size: u32, file_size: u64) -> Self {
        let offset = u64::from(index) * u64::from(chunk_size);
        let remainder = file_size.saturating_sub(offset);
        let size = if remainder > u64::from(chunk_size) {
            chunk_size
        } else {
            // remainder <= chunk_size, so it fits
            remainder as u32
        };
        Self::new(index, offset, size)
    }

    /// Same chunk with a different length, e.g. after a short read near end-of-file.
    pub const fn with_size(self, size: u32) -> Self {
        Self::new(self.index, self.offset, size)
    }

    /// Offset one past the last byte of the range.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}:{}]", self.index, self.offset, self.size)
    }
}

/// Error returned when a byte slice has the wrong length for a newtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLength {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for InvalidLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid length: expected {} bytes, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for InvalidLength {}
