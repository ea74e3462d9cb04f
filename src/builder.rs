// SPDX-License-Identifier: MIT
//! Builder assembling blocks and links into a linked binary file

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use bytemuck::Pod;
use tracing::{debug, trace};

use crate::config::BuilderConfig;
use crate::error::{BoundsError, Error, Result};
use crate::format::{FileHeader, CURRENT_VERSION, FILE_MAGIC, HEADER_SIZE, LINK_SLOT_SIZE};
use crate::link::{encode_table, LinkRecord};

/// Offset at which a block begins inside the container
pub type BlockId = u32;

/// Offset relative to the start of a block
pub type BlockOffset = u32;

pub type BlockSize = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Blocks and links may still be added
    Open,

    /// Header and link table are committed
    Finalized,
}

/// Builder for linked binary files
///
/// Views returned by [`create_block_zeroed`](Self::create_block_zeroed) and
/// [`get_block`](Self::get_block) borrow the builder, so they cannot be held
/// across a call that may grow the buffer.
#[derive(Debug)]
pub struct FileBuilder {
    config: BuilderConfig,
    state: BuilderState,
    data: Vec<u8>,
    blocks: HashMap<BlockId, BlockSize>,
    links: Vec<LinkRecord>,
}

impl FileBuilder {
    /// Create a new builder with the default size cap
    pub fn new() -> Self {
        Self::from_valid_config(BuilderConfig::default())
    }

    /// Create a new builder with custom configuration
    pub fn with_config(config: BuilderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: BuilderConfig) -> Self {
        let mut data = Vec::with_capacity(config.initial_capacity.max(HEADER_SIZE));
        data.resize(HEADER_SIZE, 0);
        FileHeader::new().write_to_buffer(&mut data);
        Self {
            config,
            state: BuilderState::Open,
            data,
            blocks: HashMap::new(),
            links: Vec::new(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            BuilderState::Open => Ok(()),
            BuilderState::Finalized => Err(Error::AlreadyFinalized),
        }
    }

    /// Check that `additional` bytes fit under the cap and return the new length
    fn grown_len(&self, additional: usize) -> Result<usize> {
        let max = self.config.max_file_size;
        self.data
            .len()
            .checked_add(additional)
            .filter(|&end| end <= max)
            .ok_or_else(|| {
                BoundsError::FileTooLarge {
                    requested: self.data.len().saturating_add(additional),
                    max,
                }
                .into()
            })
    }

    /// Create a block from a buffer and return its id
    ///
    /// An empty buffer allocates nothing: the current buffer length is
    /// returned and no size is recorded for it.
    pub fn create_block(&mut self, bytes: &[u8]) -> Result<BlockId> {
        self.ensure_open()?;
        let id = self.data.len() as BlockId;
        if bytes.is_empty() {
            return Ok(id);
        }

        self.grown_len(bytes.len())?;
        self.data.extend_from_slice(bytes);
        self.blocks.insert(id, bytes.len() as BlockSize);
        trace!(id, len = bytes.len(), "created block");
        Ok(id)
    }

    /// Create a zero-filled block of `len` bytes and return a view for
    /// writing into it
    pub fn create_block_zeroed(&mut self, len: usize) -> Result<(BlockId, &mut [u8])> {
        self.ensure_open()?;
        let start = self.data.len();
        if len > 0 {
            let end = self.grown_len(len)?;
            self.data.resize(end, 0);
            self.blocks.insert(start as BlockId, len as BlockSize);
            trace!(id = start, len, "created zeroed block");
        }
        Ok((start as BlockId, &mut self.data[start..]))
    }

    /// Create a block holding the bytes of `value`
    pub fn create_block_from<T: Pod>(&mut self, value: &T) -> Result<BlockId> {
        self.create_block(bytemuck::bytes_of(value))
    }

    /// Bytes from `id` to the current end of the buffer
    pub fn get_block(&self, id: BlockId) -> Result<&[u8]> {
        let start = self.block_start(id)?;
        Ok(&self.data[start..])
    }

    /// Mutable bytes from `id` to the current end of the buffer
    pub fn get_block_mut(&mut self, id: BlockId) -> Result<&mut [u8]> {
        self.ensure_open()?;
        let start = self.block_start(id)?;
        Ok(&mut self.data[start..])
    }

    fn block_start(&self, id: BlockId) -> Result<usize> {
        let start = id as usize;
        if start > self.data.len() {
            return Err(BoundsError::InvalidBlock {
                id,
                len: self.data.len(),
            }
            .into());
        }
        Ok(start)
    }

    /// Recorded size of a block, 0 when unknown
    pub fn block_size(&self, id: BlockId) -> BlockSize {
        self.blocks.get(&id).copied().unwrap_or(0)
    }

    /// Copy `value` into block `id` at `offset`
    pub fn write_at<T: Pod>(&mut self, id: BlockId, offset: BlockOffset, value: &T) -> Result<()> {
        self.ensure_open()?;
        let block = self.block_start(id)?;
        let bytes = bytemuck::bytes_of(value);
        let size = self.block_size(id) as usize;
        let offset = offset as usize;
        if offset.saturating_add(bytes.len()) > size {
            return Err(BoundsError::OutOfBuffer {
                offset: id as usize + offset,
                len: bytes.len(),
                available: size,
            }
            .into());
        }

        let start = block + offset;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Create a link between 2 locations
    ///
    /// The 8 bytes at `origin_offset` inside `origin_block` will refer to
    /// `destination_offset` inside `destination_block` once the file is read.
    pub fn create_link(
        &mut self,
        origin_block: BlockId,
        origin_offset: BlockOffset,
        destination_block: BlockId,
        destination_offset: BlockOffset,
    ) -> Result<()> {
        self.ensure_open()?;
        self.block_start(destination_block)?;
        let origin_size = self.block_size(origin_block);
        let destination_size = self.block_size(destination_block);

        let slot_end = origin_offset.checked_add(LINK_SLOT_SIZE as u32);
        if slot_end.map_or(true, |end| end > origin_size) || destination_offset > destination_size {
            return Err(BoundsError::LinkOutsideBlock {
                origin_block,
                origin_offset,
                destination_block,
                destination_offset,
            }
            .into());
        }

        if self.links.len() >= u16::MAX as usize {
            return Err(BoundsError::TooManyLinks {
                max: u16::MAX as usize,
            }
            .into());
        }

        let link = LinkRecord::new(
            origin_block + origin_offset,
            destination_block + destination_offset,
        );
        trace!(origin = link.origin, destination = link.destination, "created link");
        self.links.push(link);
        Ok(())
    }

    /// Create a link to the first byte of `destination_block`
    pub fn create_link_to_start(
        &mut self,
        origin_block: BlockId,
        origin_offset: BlockOffset,
        destination_block: BlockId,
    ) -> Result<()> {
        self.create_link(origin_block, origin_offset, destination_block, 0)
    }

    /// Build the file and return its header
    ///
    /// Calling this again after a successful build returns the same header.
    pub fn build(&mut self) -> Result<FileHeader> {
        if let Some(header) = self.header() {
            return Ok(header);
        }

        let data_size = self.data.len() - HEADER_SIZE;
        let links_offset = self.data.len();
        let table = encode_table(&self.links);
        let file_size = self.grown_len(table.len())?;
        self.data.extend_from_slice(table);

        let header = FileHeader {
            magic: FILE_MAGIC.to_ne_bytes(),
            version: CURRENT_VERSION,
            flags: crate::format::flags::NONE,
            links_count: self.links.len() as u16,
            links_table_offset: links_offset as u32,
            start_offset: HEADER_SIZE as u32,
            data_size: data_size as u32,
            file_size: file_size as u32,
        };
        header.write_to_buffer(&mut self.data);
        self.state = BuilderState::Finalized;

        debug!(
            blocks = self.blocks.len(),
            links = header.links_count,
            data_size = header.data_size,
            file_size = header.file_size,
            "built linked file"
        );
        Ok(header)
    }

    /// Header of a finalized builder
    pub fn header(&self) -> Option<FileHeader> {
        match self.state {
            BuilderState::Open => None,
            BuilderState::Finalized => FileHeader::from_bytes(&self.data).ok(),
        }
    }

    /// Bytes of a finalized builder
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self.state {
            BuilderState::Open => Err(Error::NotFinalized),
            BuilderState::Finalized => Ok(&self.data),
        }
    }

    /// Build and return the container bytes
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.build()?;
        Ok(self.data)
    }

    /// Build the file and write it into a path
    pub fn write_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let header = self.build()?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&self.data[..header.file_size as usize])?;
        file.flush()?;
        debug!(path = %path.as_ref().display(), bytes = header.file_size, "wrote linked file");
        Ok(())
    }

    /// Current working buffer length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no block bytes have been added past the header
    pub fn is_empty(&self) -> bool {
        self.data.len() == HEADER_SIZE
    }

    pub fn links(&self) -> &[LinkRecord] {
        &self.links
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn is_finalized(&self) -> bool {
        self.state == BuilderState::Finalized
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }
}

impl Default for FileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
