// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Read-only view of a packed population table
//!
//! Mirrors the lookup the firmware performs on each spike: binary search for
//! the entry, then walk its address list to find the row of the firing neuron.

use byteorder::{ByteOrder, LittleEndian};

use super::builder::{ADDRESS_RECORD_BYTES, ENTRY_BYTES, HEADER_BYTES};
use super::record::{EntryWord, ExtraInfo, RowPointer};
use crate::error::DecodeError;
use crate::types::KeyAndMask;

/// One parsed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    key_and_mask: KeyAndMask,
    start: u32,
    has_extra_info: bool,
    count: u32,
}

impl TableEntry {
    pub fn key_and_mask(&self) -> KeyAndMask {
        self.key_and_mask
    }

    /// Index of the first address-list word of this entry
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn has_extra_info(&self) -> bool {
        self.has_extra_info
    }

    /// Number of row pointers (the extra info word is not counted)
    pub fn count(&self) -> u32 {
        self.count
    }

    fn first_pointer(&self) -> usize {
        self.start as usize + usize::from(self.has_extra_info)
    }
}

/// Where the row for one incoming key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    /// Position of the pointer within its entry
    pub position: usize,
    /// Byte address of the row (or of the single word, for direct rows)
    pub address: u32,
    /// Row length in data words
    pub row_length: u32,
    pub is_single: bool,
}

/// A packed table parsed back from bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationTableImage {
    entries: Vec<TableEntry>,
    address_list: Vec<u32>,
}

impl PopulationTableImage {
    /// Parse and check a table produced by [`PopulationIndex::finish`](super::PopulationIndex::finish)
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        check_len(bytes, HEADER_BYTES)?;
        let n_entries = LittleEndian::read_u32(&bytes[0..4]) as usize;
        let n_records = LittleEndian::read_u32(&bytes[4..8]) as usize;

        let entries_end = HEADER_BYTES + n_entries * ENTRY_BYTES;
        let total = entries_end + n_records * ADDRESS_RECORD_BYTES;
        check_len(bytes, total)?;

        let entries: Vec<TableEntry> = bytes[HEADER_BYTES..entries_end]
            .chunks_exact(ENTRY_BYTES)
            .map(|chunk| {
                let word = EntryWord::from_word(LittleEndian::read_u32(&chunk[8..12]));
                TableEntry {
                    key_and_mask: KeyAndMask::new(
                        LittleEndian::read_u32(&chunk[0..4]),
                        LittleEndian::read_u32(&chunk[4..8]),
                    ),
                    start: u32::from(word.start.get()),
                    has_extra_info: word.has_extra_info,
                    count: u32::from(word.count.get()),
                }
            })
            .collect();

        let address_list: Vec<u32> = bytes[entries_end..total]
            .chunks_exact(ADDRESS_RECORD_BYTES)
            .map(LittleEndian::read_u32)
            .collect();

        for pair in entries.windows(2) {
            if pair[0].key_and_mask.key >= pair[1].key_and_mask.key {
                return Err(DecodeError::MalformedTable(format!(
                    "entries are not strictly sorted at key 0x{:08x}",
                    pair[1].key_and_mask.key
                )));
            }
        }
        for entry in &entries {
            let end = entry.first_pointer() + entry.count as usize;
            if end > address_list.len() {
                return Err(DecodeError::MalformedTable(format!(
                    "entry {} refers past the end of the address list ({} > {})",
                    entry.key_and_mask,
                    end,
                    address_list.len()
                )));
            }
        }

        Ok(Self {
            entries,
            address_list,
        })
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn n_address_records(&self) -> usize {
        self.address_list.len()
    }

    /// Binary search for the entry matching `key`
    pub fn find(&self, key: u32) -> Option<&TableEntry> {
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = &self.entries[mid];
            let km = entry.key_and_mask;
            if km.matches(key) {
                return Some(entry);
            }
            if key < km.key & km.mask {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        None
    }

    pub fn extra_info(&self, entry: &TableEntry) -> Option<ExtraInfo> {
        entry
            .has_extra_info
            .then(|| ExtraInfo::from_word(self.address_list[entry.start as usize]))
    }

    /// All row pointers of `entry`, placeholders included, in position order
    pub fn row_pointers(&self, entry: &TableEntry) -> Vec<RowPointer> {
        let first = entry.first_pointer();
        self.address_list[first..first + entry.count as usize]
            .iter()
            .map(|&word| RowPointer::from_word(word))
            .collect()
    }

    /// Locations of every valid row a spike with `key` must process
    ///
    /// Rows whose address would not fit in 32 bits are skipped.
    pub fn resolve_rows(&self, key: u32) -> Vec<RowLocation> {
        let Some(entry) = self.find(key) else {
            return Vec::new();
        };
        let mask = entry.key_and_mask.mask;
        let row_index = match self.extra_info(entry) {
            Some(info) => info.row_index(key, mask),
            None => Some(key & !mask),
        };
        let Some(row_index) = row_index else {
            return Vec::new();
        };

        self.row_pointers(entry)
            .into_iter()
            .enumerate()
            .filter_map(|(position, pointer)| {
                let base = pointer.address()?;
                let stride = if pointer.is_single() {
                    4
                } else {
                    (pointer.row_length() + 3) * 4
                };
                let address = row_index
                    .checked_mul(stride)
                    .and_then(|offset| base.checked_add(offset))?;
                Some(RowLocation {
                    position,
                    address,
                    row_length: pointer.row_length(),
                    is_single: pointer.is_single(),
                })
            })
            .collect()
    }
}

fn check_len(bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() < expected {
        Err(DecodeError::Truncated {
            expected,
            actual: bytes.len(),
        })
    } else {
        Ok(())
    }
}
