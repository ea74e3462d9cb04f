// SPDX-License-Identifier: MIT
//! Error types for building and reading linked binary files

/// The buffer is not a container of this format, or is incompatible
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("invalid file: file too small ({len} bytes)")]
    FileTooSmall { len: usize },

    #[error("invalid file: bad magic {found:#x}")]
    BadMagic { found: u64 },

    #[error("invalid file: version too low ({version:#x} < {min:#x})")]
    VersionTooLow { version: u8, min: u8 },

    #[error("invalid file: read file too small (file_size {file_size} > {len} bytes read)")]
    Truncated { file_size: u32, len: usize },

    #[error("invalid file: start offset after file end ({start_offset} > {file_size})")]
    StartAfterEnd { start_offset: u32, file_size: u32 },

    #[error("invalid file: link table outside of buffer (offset {offset}, {count} links)")]
    LinkTableOutOfBounds { offset: u32, count: u16 },

    #[error(
        "invalid file: link {index} after end file ({origin} -> {destination}, file_size {file_size})"
    )]
    LinkAfterEnd {
        index: usize,
        origin: u32,
        destination: u32,
        file_size: u32,
    },

    #[error("invalid file: link {index} slot at {origin} overlaps the header or link table")]
    SlotOverlapsMetadata { index: usize, origin: u32 },
}

/// An access or allocation past the end of a block or buffer
#[derive(Debug, thiserror::Error)]
pub enum BoundsError {
    #[error("file too big: {requested} bytes requested, limit is {max}")]
    FileTooLarge { requested: usize, max: usize },

    #[error("invalid block {id} (buffer is {len} bytes)")]
    InvalidBlock { id: u32, len: usize },

    #[error(
        "trying to create a link after the end of a block (origin {origin_block}+{origin_offset}, destination {destination_block}+{destination_offset})"
    )]
    LinkOutsideBlock {
        origin_block: u32,
        origin_offset: u32,
        destination_block: u32,
        destination_offset: u32,
    },

    #[error("too many links (limit is {max})")]
    TooManyLinks { max: usize },

    #[error("range {offset}+{len} outside of buffer ({available} bytes)")]
    OutOfBuffer {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("no link originates at offset {origin}")]
    UnknownLink { origin: u32 },
}

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Bounds,
    Io,
    State,
}

/// The main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("builder already linked")]
    AlreadyFinalized,

    #[error("builder not built yet")]
    NotFinalized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) => ErrorKind::Format,
            Error::Bounds(_) => ErrorKind::Bounds,
            Error::Io(_) => ErrorKind::Io,
            Error::AlreadyFinalized | Error::NotFinalized | Error::InvalidConfig(_) => {
                ErrorKind::State
            }
        }
    }
}

/// A specialized Result type for linked file operations.
pub type Result<T> = std::result::Result<T, Error>;
