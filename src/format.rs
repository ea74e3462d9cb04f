// SPDX-License-Identifier: MIT
//! Linked binary file format specification
//!
//! Defines the fixed header layout and the constants shared by the builder
//! and the reader. All fields use the native byte order of the machine.

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::error::FormatError;

/// Format identifier. Do not change this value.
pub const FILE_MAGIC: u64 = 0x0d0a_4642_4424;

/// Oldest version a reader accepts
pub const MIN_SUPPORTED_VERSION: u8 = 0x10;

/// Version written by the builder
pub const CURRENT_VERSION: u8 = 0x10;

/// Header size in bytes
pub const HEADER_SIZE: usize = std::mem::size_of::<FileHeader>();

/// Size of one serialized link record
pub const LINK_RECORD_SIZE: usize = 8;

/// Size of the reference slot a link rewrites
pub const LINK_SLOT_SIZE: usize = 8;

/// Inclusive upper bound of a container's byte length.
///
/// Offsets are stored as `u32` but consumers compare them as signed values.
pub const MAX_FILE_SIZE: usize = i32::MAX as usize;

const _: () = assert!(MIN_SUPPORTED_VERSION <= CURRENT_VERSION);
const _: () = assert!(HEADER_SIZE == 28);

/// Header flags
pub mod flags {
    /// Nothing set
    pub const NONE: u8 = 0x00;

    /// Link slots already hold absolute addresses
    pub const LINKED: u8 = 0x01;
}

/// Versions at which a feature was introduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum VersionFeature {
    /// Link table and relocation
    Linking = 0x10,
}

impl VersionFeature {
    /// Whether a container of `version` carries this feature
    #[inline]
    pub fn supported_by(self, version: u8) -> bool {
        version >= self as u8
    }
}

/// Container header (28 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Serialize)]
#[repr(C)]
pub struct FileHeader {
    /// `FILE_MAGIC` in native byte order
    pub magic: [u8; 8],

    /// Producer format version
    pub version: u8,

    /// See [`flags`]
    pub flags: u8,

    /// Number of link records
    pub links_count: u16,

    /// Offset of the link table from the start of the header
    pub links_table_offset: u32,

    /// Offset of the payload from the start of the header
    pub start_offset: u32,

    /// Payload length in bytes
    pub data_size: u32,

    /// Total container length in bytes
    pub file_size: u32,
}

impl FileHeader {
    /// An empty header for a builder that has not been finalized yet
    pub fn new() -> Self {
        Self {
            magic: FILE_MAGIC.to_ne_bytes(),
            version: CURRENT_VERSION,
            flags: flags::NONE,
            links_count: 0,
            links_table_offset: HEADER_SIZE as u32,
            start_offset: HEADER_SIZE as u32,
            data_size: 0,
            file_size: HEADER_SIZE as u32,
        }
    }

    /// Parse a header from the first `HEADER_SIZE` bytes of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let raw = bytes
            .get(..HEADER_SIZE)
            .ok_or(FormatError::FileTooSmall { len: bytes.len() })?;
        Ok(bytemuck::pod_read_unaligned(raw))
    }

    /// Serialize the header into the first `HEADER_SIZE` bytes of `buffer`
    ///
    /// # Panics
    /// Panics if `buffer` is shorter than `HEADER_SIZE`.
    #[inline]
    pub fn write_to_buffer(&self, buffer: &mut [u8]) {
        buffer[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(self));
    }

    /// Header bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        self.write_to_buffer(&mut bytes);
        bytes
    }

    /// Magic as an integer
    #[inline]
    pub fn magic_value(&self) -> u64 {
        u64::from_ne_bytes(self.magic)
    }

    /// Check magic and version
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.magic_value() != FILE_MAGIC {
            return Err(FormatError::BadMagic {
                found: self.magic_value(),
            });
        }

        if self.version < MIN_SUPPORTED_VERSION {
            return Err(FormatError::VersionTooLow {
                version: self.version,
                min: MIN_SUPPORTED_VERSION,
            });
        }

        Ok(())
    }

    #[inline]
    pub fn supports(&self, feature: VersionFeature) -> bool {
        feature.supported_by(self.version)
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.flags & flags::LINKED != 0
    }

    /// Byte length of the link table
    #[inline]
    pub fn links_table_len(&self) -> usize {
        self.links_count as usize * LINK_RECORD_SIZE
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
