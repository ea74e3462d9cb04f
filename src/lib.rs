// SPDX-License-Identifier: MIT
//! # Linked Binary File
//!
//! A self-describing binary container of opaque byte blocks that can refer to
//! each other through position-independent links.
//!
//! ## Format Overview
//!
//! A producer appends blocks to a [`FileBuilder`], records links between them
//! and finalizes the buffer. A consumer hands the bytes to a [`FileReader`],
//! which validates the header and link table and resolves every link.
//!
//! Blocks are identified by the byte offset at which they start. Block
//! boundaries are not persisted: a reader only sees the flat payload region
//! and the link table.
//!
//! ## Format Specification
//!
//! ```text
//! Linked Binary File v0x10
//! ========================
//!
//! Header (28 bytes, native byte order):
//! - Magic: 0x0d0a46424424 (8 bytes)
//! - Version: 0x10 (1 byte)
//! - Flags: bit 0 set once link slots hold addresses (1 byte)
//! - Links Count (2 bytes)
//! - Links Table Offset (4 bytes)
//! - Start Offset (4 bytes)
//! - Data Size (4 bytes)
//! - File Size (4 bytes)
//!
//! Payload (data_size bytes): caller blocks
//! Link table (links_count x 8 bytes): (origin: u32, destination: u32)
//! ```
//!
//! A link states that the 8 bytes at `origin` refer to `destination`. The
//! reader either keeps the offsets and resolves them through a
//! [`RelocationTable`] ([`LinkMode::Table`], the default) or writes the
//! absolute address `base + destination` into each slot
//! ([`LinkMode::InPlace`]).
//!
//! Files are not portable across machines with a different byte order or
//! pointer width.
//!
//! ## Usage
//!
//! ```rust
//! use linked_binary_file::{FileBuilder, FileReader};
//!
//! let mut builder = FileBuilder::new();
//! let node = builder.create_block(&[0u8; 16]).unwrap();
//! let name = builder.create_block(b"leaf").unwrap();
//! builder.create_link(node, 0, name, 0).unwrap();
//!
//! let data = builder.into_bytes().unwrap();
//! let reader = FileReader::from_vec(data).unwrap();
//! assert_eq!(&reader.follow(node).unwrap()[..4], b"leaf");
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod format;
pub mod link;
pub mod reader;

// Re-export main types
pub use builder::{BlockId, BlockOffset, BlockSize, BuilderState, FileBuilder};
pub use config::{BuilderConfig, ReaderConfig};
pub use error::{BoundsError, Error, ErrorKind, FormatError, Result};
pub use format::{FileHeader, VersionFeature, FILE_MAGIC, HEADER_SIZE};
pub use link::{LinkMode, LinkRecord, RelocationTable};
pub use reader::FileReader;
