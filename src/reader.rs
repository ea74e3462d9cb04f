// SPDX-License-Identifier: MIT
//! Reader validating linked binary files and resolving their links

use std::ops::Range;
use std::path::Path;

use bytemuck::Pod;
use tracing::{debug, warn};

use crate::config::ReaderConfig;
use crate::error::{BoundsError, Error, FormatError, Result};
use crate::format::{flags, FileHeader, VersionFeature, HEADER_SIZE, LINK_SLOT_SIZE};
use crate::link::{absolute_address, decode_table, LinkMode, LinkRecord, RelocationTable};

/// Bytes a reader validates, owned or borrowed from the caller
#[derive(Debug)]
enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a mut [u8]),
}

impl Storage<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(data) => data.as_slice(),
            Storage::Borrowed(data) => &data[..],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(data) => data.as_mut_slice(),
            Storage::Borrowed(data) => &mut data[..],
        }
    }
}

/// Reader for linked binary files
///
/// Validation and link resolution run once, when the reader is constructed.
/// Nothing in the buffer is modified if construction fails.
#[derive(Debug)]
pub struct FileReader<'a> {
    storage: Storage<'a>,
    header: FileHeader,
    relocations: RelocationTable,
    config: ReaderConfig,
}

impl FileReader<'static> {
    /// Create a reader from a file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReaderConfig::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = data.len(), "read linked file");
        Self::from_vec_with(data, config)
    }

    /// Create a reader from owned data
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_vec_with(data, ReaderConfig::default())
    }

    pub fn from_vec_with(data: Vec<u8>, config: ReaderConfig) -> Result<Self> {
        let len = data.len();
        Self::load(Storage::Owned(data), Some(len), config)
    }
}

impl<'a> FileReader<'a> {
    /// Create a reader over a caller-owned buffer
    ///
    /// With `known_len` set to `None` or `Some(0)` the length checks against
    /// the claimed `file_size` are skipped. Accesses outside `buffer` still
    /// fail.
    pub fn from_buffer(buffer: &'a mut [u8], known_len: Option<usize>) -> Result<Self> {
        Self::from_buffer_with(buffer, known_len, ReaderConfig::default())
    }

    pub fn from_buffer_with(
        buffer: &'a mut [u8],
        known_len: Option<usize>,
        config: ReaderConfig,
    ) -> Result<Self> {
        Self::load(Storage::Borrowed(buffer), known_len, config)
    }

    fn load(mut storage: Storage<'a>, known_len: Option<usize>, config: ReaderConfig) -> Result<Self> {
        let (mut header, records) = validate(storage.bytes(), known_len)?;

        if header.supports(VersionFeature::Linking) && config.link_mode == LinkMode::InPlace {
            if header.is_linked() {
                warn!("buffer already linked, rewriting slots for the current base address");
            }
            link_in_place(storage.bytes_mut(), &records);
            header.flags |= flags::LINKED;
            header.write_to_buffer(storage.bytes_mut());
        }

        let relocations = RelocationTable::from_records(records);
        debug!(
            version = header.version,
            links = relocations.len(),
            file_size = header.file_size,
            mode = ?config.link_mode,
            "validated linked file"
        );

        Ok(Self {
            storage,
            header,
            relocations,
            config,
        })
    }

    /// Get file header
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Payload bytes, beginning at `start_offset`
    pub fn start(&self) -> &[u8] {
        let range = self.payload_range();
        &self.storage.bytes()[range]
    }

    pub fn start_mut(&mut self) -> &mut [u8] {
        let range = self.payload_range();
        &mut self.storage.bytes_mut()[range]
    }

    fn payload_range(&self) -> Range<usize> {
        let available = self.storage.bytes().len();
        let start = (self.header.start_offset as usize).min(available);
        let end = start
            .saturating_add(self.header.data_size as usize)
            .min(available);
        start..end
    }

    /// Container bytes up to `file_size`
    pub fn as_bytes(&self) -> &[u8] {
        let bytes = self.storage.bytes();
        &bytes[..(self.header.file_size as usize).min(bytes.len())]
    }

    pub fn relocations(&self) -> &RelocationTable {
        &self.relocations
    }

    /// Destination offset of the link slot at `origin`
    pub fn resolve(&self, origin: u32) -> Option<u32> {
        self.relocations.resolve(origin)
    }

    /// Bytes the link slot at `origin` refers to, up to the end of the file
    pub fn follow(&self, origin: u32) -> Result<&[u8]> {
        let destination = self
            .resolve(origin)
            .ok_or(BoundsError::UnknownLink { origin })?;
        let bytes = self.as_bytes();
        bytes
            .get(destination as usize..)
            .ok_or_else(|| out_of_buffer(destination as usize, 0, bytes.len()))
    }

    /// Absolute address of `offset` in the loaded buffer
    pub fn address_of(&self, offset: u32) -> u64 {
        absolute_address(self.storage.bytes().as_ptr(), offset)
    }

    /// Copy a `T` out of the buffer at `offset`; no alignment required
    pub fn read_at<T: Pod>(&self, offset: usize) -> Result<T> {
        let bytes = self.storage.bytes();
        let len = std::mem::size_of::<T>();
        bytes
            .get(offset..offset.saturating_add(len))
            .map(bytemuck::pod_read_unaligned)
            .ok_or_else(|| out_of_buffer(offset, len, bytes.len()))
    }

    /// Raw contents of the 8-byte slot at `origin`
    pub fn slot(&self, origin: u32) -> Result<u64> {
        self.read_at::<u64>(origin as usize)
    }

    /// Whether the slots of this buffer hold absolute addresses
    pub fn is_linked(&self) -> bool {
        self.header.is_linked()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }
}

fn out_of_buffer(offset: usize, len: usize, available: usize) -> Error {
    BoundsError::OutOfBuffer {
        offset,
        len,
        available,
    }
    .into()
}

/// Run every structural check and collect the link records, in table order,
/// without touching the buffer
fn validate(bytes: &[u8], known_len: Option<usize>) -> Result<(FileHeader, Vec<LinkRecord>)> {
    let known_len = known_len
        .filter(|&len| len != 0)
        .map(|len| len.min(bytes.len()));

    if let Some(len) = known_len {
        if len < HEADER_SIZE {
            return Err(FormatError::FileTooSmall { len }.into());
        }
    }

    let header = FileHeader::from_bytes(bytes)?;
    header.validate()?;

    if let Some(len) = known_len {
        if header.file_size as usize > len {
            return Err(FormatError::Truncated {
                file_size: header.file_size,
                len,
            }
            .into());
        }
    }

    if header.start_offset > header.file_size {
        return Err(FormatError::StartAfterEnd {
            start_offset: header.start_offset,
            file_size: header.file_size,
        }
        .into());
    }

    if !header.supports(VersionFeature::Linking) || header.links_count == 0 {
        return Ok((header, Vec::new()));
    }

    let table = links_table_range(&header, bytes.len())?;
    let mut records = Vec::with_capacity(header.links_count as usize);
    for (index, link) in decode_table(&bytes[table.clone()]).enumerate() {
        if !link.within(header.file_size) {
            return Err(FormatError::LinkAfterEnd {
                index,
                origin: link.origin,
                destination: link.destination,
                file_size: header.file_size,
            }
            .into());
        }

        let slot = link.origin as usize..link.origin as usize + LINK_SLOT_SIZE;
        if slot.start < HEADER_SIZE || overlaps(&slot, &table) {
            return Err(FormatError::SlotOverlapsMetadata {
                index,
                origin: link.origin,
            }
            .into());
        }
        if slot.end > bytes.len() {
            return Err(out_of_buffer(slot.start, LINK_SLOT_SIZE, bytes.len()));
        }

        records.push(link);
    }

    Ok((header, records))
}

fn links_table_range(header: &FileHeader, available: usize) -> Result<Range<usize>> {
    let start = header.links_table_offset as usize;
    let end = start + header.links_table_len();

    if end > header.file_size as usize {
        return Err(FormatError::LinkTableOutOfBounds {
            offset: header.links_table_offset,
            count: header.links_count,
        }
        .into());
    }
    if end > available {
        return Err(out_of_buffer(start, end - start, available));
    }

    Ok(start..end)
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Overwrite every slot with the absolute address of its destination
///
/// Slots are written in table order, so a later record wins where slots
/// overlap.
fn link_in_place(bytes: &mut [u8], records: &[LinkRecord]) {
    let base = bytes.as_ptr();
    for link in records {
        let address = absolute_address(base, link.destination);
        let origin = link.origin as usize;
        bytes[origin..origin + LINK_SLOT_SIZE].copy_from_slice(&address.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FileBuilder;
    use crate::format::{FILE_MAGIC, MIN_SUPPORTED_VERSION};

    /// 16-byte block A linking to 8-byte block B
    fn create_test_data() -> (Vec<u8>, u32, u32) {
        let mut builder = FileBuilder::new();
        let a = builder.create_block(&[0xA1; 16]).unwrap();
        let b = builder.create_block(b"blockbbb").unwrap();
        builder.create_link(a, 0, b, 0).unwrap();
        (builder.into_bytes().unwrap(), a, b)
    }

    #[test]
    fn test_reader_table_mode_does_not_mutate() {
        let (data, a, b) = create_test_data();
        let reader = FileReader::from_vec(data.clone()).unwrap();

        assert_eq!(reader.as_bytes(), &data[..]);
        assert_eq!(reader.resolve(a), Some(b));
        assert_eq!(&reader.follow(a).unwrap()[..8], b"blockbbb");
        assert!(!reader.is_linked());
    }

    #[test]
    fn test_reader_in_place_writes_addresses() {
        let (mut data, a, b) = create_test_data();
        let reader = FileReader::from_buffer_with(&mut data, None, ReaderConfig::in_place()).unwrap();

        assert!(reader.is_linked());
        assert_eq!(reader.slot(a).unwrap(), reader.address_of(b));
        assert_eq!(&reader.start()[16..24], b"blockbbb");
        assert_eq!(&reader.start()[8..16], &[0xA1; 8]);
    }

    #[test]
    fn test_relinking_is_idempotent() {
        let (mut data, a, b) = create_test_data();
        FileReader::from_buffer_with(&mut data, None, ReaderConfig::in_place()).unwrap();
        let once = data.clone();

        let reader = FileReader::from_buffer_with(&mut data, None, ReaderConfig::in_place()).unwrap();
        assert_eq!(reader.resolve(a), Some(b));
        assert_eq!(reader.slot(a).unwrap(), reader.address_of(b));
        drop(reader);
        assert_eq!(data, once);
    }

    #[test]
    fn test_start_skips_header() {
        let (data, _, _) = create_test_data();
        let reader = FileReader::from_vec(data).unwrap();
        assert_eq!(reader.start().len(), reader.header().data_size as usize);
        assert_eq!(&reader.start()[..16], &[0xA1; 16]);
    }

    #[test]
    fn test_file_too_small() {
        let err = FileReader::from_vec(vec![0; 16]).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::FileTooSmall { len: 16 })));
    }

    #[test]
    fn test_bad_magic_leaves_buffer_untouched() {
        let (mut data, _, _) = create_test_data();
        data[0] ^= 0xFF;
        let before = data.clone();

        let err = FileReader::from_buffer_with(&mut data, None, ReaderConfig::in_place()).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadMagic { .. })));
        assert_eq!(data, before);
    }

    #[test]
    fn test_version_too_low() {
        let (mut data, _, _) = create_test_data();
        data[8] = MIN_SUPPORTED_VERSION - 1;
        let err = FileReader::from_vec(data).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::VersionTooLow { .. })));
    }

    #[test]
    fn test_truncated_with_known_length() {
        let (mut data, _, _) = create_test_data();
        let before = data.clone();
        let len = data.len() - 1;

        let err = FileReader::from_buffer_with(&mut data, Some(len), ReaderConfig::in_place()).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::Truncated { .. })));
        assert_eq!(data, before);
    }

    #[test]
    fn test_unknown_length_skips_length_checks() {
        let mut header = FileHeader::new();
        header.file_size = 4096;
        header.data_size = 4096 - HEADER_SIZE as u32;
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[5; 12]);

        let reader = FileReader::from_buffer(&mut data, None).unwrap();
        assert_eq!(reader.start(), &[5; 12]);

        let err = FileReader::from_buffer(&mut data, Some(40)).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::Truncated { .. })));
    }

    #[test]
    fn test_unknown_length_still_checks_magic() {
        let mut data = FileHeader::new().to_bytes().to_vec();
        data[0] ^= 0xFF;
        let err = FileReader::from_buffer(&mut data, None).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadMagic { .. })));
    }

    #[test]
    fn test_unknown_length_still_checks_version() {
        let mut data = FileHeader::new().to_bytes().to_vec();
        data[8] = MIN_SUPPORTED_VERSION - 1;
        let err = FileReader::from_buffer(&mut data, None).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::VersionTooLow { .. })));
    }

    #[test]
    fn test_unknown_length_still_checks_link_bounds() {
        // Claims 4096 bytes, only 52 are present
        let mut data = raw_file(LinkRecord::new(HEADER_SIZE as u32, 5000), 4096);
        let before = data.clone();

        let err = FileReader::from_buffer_with(&mut data, None, ReaderConfig::in_place()).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::LinkAfterEnd {
                index: 0,
                destination: 5000,
                file_size: 4096,
                ..
            })
        ));
        assert_eq!(data, before);
    }

    #[test]
    fn test_zero_length_is_unknown() {
        let mut header = FileHeader::new();
        header.file_size = 4096;
        header.data_size = 4096 - HEADER_SIZE as u32;
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[5; 12]);

        let reader = FileReader::from_buffer(&mut data, Some(0)).unwrap();
        assert_eq!(reader.start(), &[5; 12]);
    }

    #[test]
    fn test_in_place_overlapping_slots_follow_table_order() {
        let mut builder = FileBuilder::new();
        let a = builder.create_block(&[0; 16]).unwrap();
        let b = builder.create_block(b"bbbbbbbb").unwrap();
        let c = builder.create_block(b"cccccccc").unwrap();
        builder.create_link(a, 4, b, 0).unwrap();
        builder.create_link(a, 0, c, 0).unwrap();
        let mut data = builder.into_bytes().unwrap();

        let reader = FileReader::from_buffer_with(&mut data, None, ReaderConfig::in_place()).unwrap();
        assert_eq!(reader.slot(a).unwrap(), reader.address_of(c));
        assert_eq!(reader.resolve(a + 4), Some(b));
        assert_eq!(reader.resolve(a), Some(c));
    }

    #[test]
    fn test_start_after_end() {
        let mut header = FileHeader::new();
        header.start_offset = 100;
        let err = FileReader::from_vec(header.to_bytes().to_vec()).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::StartAfterEnd { .. })));
    }

    /// Header, 16 zero payload bytes and one link record
    fn raw_file(link: LinkRecord, file_size: u32) -> Vec<u8> {
        let mut header = FileHeader::new();
        header.links_count = 1;
        header.data_size = 16;
        header.links_table_offset = (HEADER_SIZE + 16) as u32;
        header.file_size = file_size;
        let mut data = header.to_bytes().to_vec();
        data.extend_from_slice(&[0; 16]);
        data.extend_from_slice(bytemuck::bytes_of(&link));
        data
    }

    #[test]
    fn test_link_after_end() {
        let file_size = (HEADER_SIZE + 24) as u32;
        let data = raw_file(LinkRecord::new(HEADER_SIZE as u32, file_size + 1), file_size);
        let err = FileReader::from_vec(data).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::LinkAfterEnd { index: 0, .. })));
    }

    #[test]
    fn test_link_slot_into_metadata_rejected() {
        let file_size = (HEADER_SIZE + 24) as u32;

        let data = raw_file(LinkRecord::new(4, HEADER_SIZE as u32), file_size);
        let err = FileReader::from_vec(data).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::SlotOverlapsMetadata { .. })));

        let table = (HEADER_SIZE + 16) as u32;
        let data = raw_file(LinkRecord::new(table, HEADER_SIZE as u32), file_size);
        let err = FileReader::from_vec(data).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::SlotOverlapsMetadata { .. })));
    }

    #[test]
    fn test_link_table_outside_file() {
        let mut data = raw_file(LinkRecord::new(HEADER_SIZE as u32, 0), (HEADER_SIZE + 24) as u32);
        let mut header = FileHeader::from_bytes(&data).unwrap();
        header.links_count = 2;
        header.write_to_buffer(&mut data);

        let err = FileReader::from_vec(data).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::LinkTableOutOfBounds { .. })));
    }

    #[test]
    fn test_follow_unknown_link() {
        let (data, a, _) = create_test_data();
        let reader = FileReader::from_vec(data).unwrap();
        let err = reader.follow(a + 1).unwrap_err();
        assert!(matches!(err, Error::Bounds(BoundsError::UnknownLink { .. })));
    }

    #[test]
    fn test_read_at() {
        let (data, a, _) = create_test_data();
        let reader = FileReader::from_vec(data).unwrap();
        let header: FileHeader = reader.read_at(0).unwrap();
        assert_eq!(header.magic_value(), FILE_MAGIC);
        assert_eq!(reader.read_at::<u8>(a as usize).unwrap(), 0xA1);
        assert!(reader.read_at::<u64>(reader.as_bytes().len() - 4).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileReader::open(dir.path().join("missing.lbf")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
