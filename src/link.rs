// SPDX-License-Identifier: MIT
//! Link records and relocation
//!
//! A link declares that the 8-byte slot at `origin` refers to the byte at
//! `destination`. Both are absolute offsets inside the container, so the
//! persisted file stays position independent. Resolution maps a slot to
//! `base_address + destination` once the buffer has been loaded.

use std::collections::BTreeMap;
use std::str::FromStr;

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::format::{LINK_RECORD_SIZE, LINK_SLOT_SIZE};

/// One entry of the link table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Serialize)]
#[repr(C)]
pub struct LinkRecord {
    pub origin: u32,
    pub destination: u32,
}

const _: () = assert!(std::mem::size_of::<LinkRecord>() == LINK_RECORD_SIZE);

impl LinkRecord {
    pub fn new(origin: u32, destination: u32) -> Self {
        Self {
            origin,
            destination,
        }
    }

    /// Whether both ends lie at or before `file_size`
    #[inline]
    pub fn within(&self, file_size: u32) -> bool {
        self.origin <= file_size && self.destination <= file_size
    }
}

/// Serialized form of a link table
pub fn encode_table(links: &[LinkRecord]) -> &[u8] {
    bytemuck::cast_slice(links)
}

/// Parse a serialized link table. Trailing bytes that do not form a full
/// record are ignored.
pub fn decode_table(bytes: &[u8]) -> impl Iterator<Item = LinkRecord> + '_ {
    bytes
        .chunks_exact(LINK_RECORD_SIZE)
        .map(bytemuck::pod_read_unaligned::<LinkRecord>)
}

/// How a reader realizes links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Keep offsets in the buffer and resolve through the relocation table
    #[default]
    Table,

    /// Overwrite every slot with the absolute address of its destination
    InPlace,
}

impl FromStr for LinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(LinkMode::Table),
            "in-place" | "inplace" | "in_place" => Ok(LinkMode::InPlace),
            other => Err(format!("unknown link mode: {}", other)),
        }
    }
}

/// Validated `origin -> destination` map
///
/// When several links share an origin the last one wins, matching the
/// outcome of rewriting the slots in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationTable {
    entries: BTreeMap<u32, u32>,
}

impl RelocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = LinkRecord>,
    {
        let entries = records
            .into_iter()
            .map(|link| (link.origin, link.destination))
            .collect();
        Self { entries }
    }

    /// Destination of the slot at `origin`
    #[inline]
    pub fn resolve(&self, origin: u32) -> Option<u32> {
        self.entries.get(&origin).copied()
    }

    /// Whether `offset` falls inside any link slot
    pub fn covers(&self, offset: u32) -> bool {
        let lower = offset.saturating_sub(LINK_SLOT_SIZE as u32 - 1);
        self.entries.range(lower..=offset).next().is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = LinkRecord> + '_ {
        self.entries
            .iter()
            .map(|(&origin, &destination)| LinkRecord::new(origin, destination))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Address a slot must hold once the buffer starting at `base` is linked
#[inline]
pub fn absolute_address(base: *const u8, destination: u32) -> u64 {
    (base as usize).wrapping_add(destination as usize) as u64
}
