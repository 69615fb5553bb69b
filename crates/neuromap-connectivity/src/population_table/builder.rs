// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Population table builder
//!
//! Accumulates row pointers per routing key while one core is being built,
//! then packs everything into the sorted layout the firmware binary-searches.

use ahash::AHashMap;
use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info};

use super::fields::{AddressListCount, AddressListStart};
use super::record::{
    AddressListRecord, CoreSplit, EntryWord, ExtraInfo, RowPointer, ADDRESS_SCALE,
    MAX_SCALED_ADDRESS,
};
use crate::error::{BuildError, BuildResult};
use crate::types::KeyAndMask;

/// Bytes of the table header (`n_entries`, `n_address_list_records`)
pub const HEADER_BYTES: usize = 8;

/// Bytes per packed entry (key, mask, start/flag/count word)
pub const ENTRY_BYTES: usize = 12;

/// Bytes per address-list record
pub const ADDRESS_RECORD_BYTES: usize = 4;

/// Largest number of distinct keys in one table
pub const MAX_ENTRIES: usize = AddressListStart::MAX as usize;

/// Largest number of address-list words in one table; keeps every start in range
pub const MAX_ADDRESS_LIST_RECORDS: usize = AddressListStart::MAX as usize;

/// Largest number of row pointers behind one key
pub const MAX_RECORDS_PER_ENTRY: usize = AddressListCount::MAX as usize;

/// Builder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Uninitialised,
    Building,
    Finalised,
}

/// Shape of one incoming edge, used to bound the table size before building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingEdgeShape {
    /// Machine-level cores of the source population
    pub n_source_cores: usize,
    /// Whether the source also sends through delay stages
    pub has_delays: bool,
}

#[derive(Debug)]
struct EntryBuilder {
    key_and_mask: KeyAndMask,
    extra_info: Option<ExtraInfo>,
    pointers: Vec<RowPointer>,
}

/// Master population table for one target core
#[derive(Debug)]
pub struct PopulationIndex {
    state: TableState,
    entries: Vec<EntryBuilder>,
    entry_by_key: AHashMap<u32, usize>,
    n_address_records: usize,
}

impl Default for PopulationIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PopulationIndex {
    pub fn new() -> Self {
        Self {
            state: TableState::Uninitialised,
            entries: Vec::new(),
            entry_by_key: AHashMap::new(),
            n_address_records: 0,
        }
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    /// Start (or restart) building; clears all entries
    pub fn initialise(&mut self) {
        self.entries.clear();
        self.entry_by_key.clear();
        self.n_address_records = 0;
        self.state = TableState::Building;
    }

    pub fn n_entries(&self) -> usize {
        self.entries.len()
    }

    /// Address-list words appended so far, extra info included
    pub fn n_address_records(&self) -> usize {
        self.n_address_records
    }

    /// Round `address` up to the next address a row pointer can carry
    pub fn next_aligned_address(address: u32) -> BuildResult<u32> {
        let scaled = address.div_ceil(ADDRESS_SCALE);
        if scaled > MAX_SCALED_ADDRESS {
            return Err(BuildError::config(format!(
                "address 0x{:x} is out of range for the population table",
                address
            )));
        }
        Ok(scaled * ADDRESS_SCALE)
    }

    /// Upper bound on the bytes [`finish`](Self::finish) can emit for these edges
    ///
    /// Assumes the worst case of one entry per source core, one extra info per
    /// edge, and a mirrored set of delayed entries.
    pub fn required_size_bytes<I>(in_edges: I) -> usize
    where
        I: IntoIterator<Item = IncomingEdgeShape>,
    {
        let mut n_entries = 0usize;
        let mut n_records = 0usize;
        for edge in in_edges {
            let factor = if edge.has_delays { 2 } else { 1 };
            n_entries += edge.n_source_cores * factor;
            n_records += (edge.n_source_cores + 1) * factor;
        }
        HEADER_BYTES + n_entries * ENTRY_BYTES + n_records * ADDRESS_RECORD_BYTES
    }

    /// Add a row pointer for a machine-level key; returns its position in the entry
    pub fn append_machine_record(
        &mut self,
        key_and_mask: KeyAndMask,
        address: u32,
        row_length: u32,
        is_single: bool,
    ) -> BuildResult<usize> {
        let pointer = RowPointer::new(address, row_length, is_single)?;
        self.append(key_and_mask, None, pointer)
    }

    /// Add a row pointer for an application-level key split across source cores
    pub fn append_application_record(
        &mut self,
        key_and_mask: KeyAndMask,
        address: u32,
        row_length: u32,
        split: CoreSplit,
    ) -> BuildResult<usize> {
        let pointer = RowPointer::new(address, row_length, false)?;
        self.append(key_and_mask, Some(split), pointer)
    }

    /// Add a placeholder that keeps positions aligned with a parallel entry
    pub fn append_invalid(
        &mut self,
        key_and_mask: KeyAndMask,
        split: Option<CoreSplit>,
    ) -> BuildResult<usize> {
        self.append(key_and_mask, split, RowPointer::INVALID)
    }

    fn append(
        &mut self,
        key_and_mask: KeyAndMask,
        split: Option<CoreSplit>,
        pointer: RowPointer,
    ) -> BuildResult<usize> {
        if self.state != TableState::Building {
            return Err(BuildError::config(format!(
                "population table is {:?}; call initialise() before appending",
                self.state
            )));
        }

        // Entries are keyed by route, so neuron bits in the key are dropped
        let key_and_mask = key_and_mask.normalised();

        // A zero core mask means every row lives on one core: no extra info needed
        let extra_info = match split {
            Some(split) if split.core_mask != 0 => Some(ExtraInfo::from_split(split)?),
            _ => None,
        };

        let entry_index = self.entry_index(key_and_mask)?;
        let entry = &mut self.entries[entry_index];

        let mut new_words = 1;
        match (entry.extra_info, extra_info) {
            (None, None) => {}
            (Some(existing), Some(requested)) if existing == requested => {}
            (Some(existing), Some(requested)) => {
                return Err(BuildError::config(format!(
                    "entry for key {} already splits cores as {:?}, cannot add {:?}",
                    key_and_mask, existing, requested
                )));
            }
            (Some(_), None) => {
                return Err(BuildError::config(format!(
                    "entry for key {} is application-level; cannot add a machine-level record",
                    key_and_mask
                )));
            }
            (None, Some(_)) if !entry.pointers.is_empty() => {
                return Err(BuildError::config(format!(
                    "entry for key {} is machine-level; cannot add an application-level record",
                    key_and_mask
                )));
            }
            (None, Some(_)) => new_words += 1,
        }

        if entry.pointers.len() >= MAX_RECORDS_PER_ENTRY {
            return Err(BuildError::config(format!(
                "too many address records for key {} (maximum {})",
                key_and_mask, MAX_RECORDS_PER_ENTRY
            )));
        }
        if self.n_address_records + new_words > MAX_ADDRESS_LIST_RECORDS {
            return Err(BuildError::config(format!(
                "population table address list is full (maximum {} records)",
                MAX_ADDRESS_LIST_RECORDS
            )));
        }

        if extra_info.is_some() {
            entry.extra_info = extra_info;
        }
        entry.pointers.push(pointer);
        self.n_address_records += new_words;

        let position = entry.pointers.len() - 1;
        debug!(
            target: "neuromap-connectivity",
            "[POP-TABLE] key {} position {} -> {:?} (row length {}, single {})",
            key_and_mask,
            position,
            pointer.address(),
            pointer.row_length(),
            pointer.is_single()
        );
        Ok(position)
    }

    fn entry_index(&mut self, key_and_mask: KeyAndMask) -> BuildResult<usize> {
        if let Some(&index) = self.entry_by_key.get(&key_and_mask.key) {
            let existing = self.entries[index].key_and_mask;
            if existing.mask != key_and_mask.mask {
                return Err(BuildError::config(format!(
                    "existing entry for key 0x{:08x} has mask 0x{:08x}, not 0x{:08x}",
                    key_and_mask.key, existing.mask, key_and_mask.mask
                )));
            }
            return Ok(index);
        }

        if self.entries.len() >= MAX_ENTRIES {
            return Err(BuildError::config(format!(
                "too many population table entries (maximum {})",
                MAX_ENTRIES
            )));
        }
        self.entries.push(EntryBuilder {
            key_and_mask,
            extra_info: None,
            pointers: Vec::new(),
        });
        let index = self.entries.len() - 1;
        self.entry_by_key.insert(key_and_mask.key, index);
        Ok(index)
    }

    /// Pack the table, sorted by key, and discard the builder state
    ///
    /// The length of the returned buffer is the exact size of the region.
    pub fn finish(&mut self) -> BuildResult<Vec<u8>> {
        if self.state != TableState::Building {
            return Err(BuildError::config(format!(
                "population table is {:?}; nothing to finish",
                self.state
            )));
        }

        let mut entries = std::mem::take(&mut self.entries);
        entries.sort_by_key(|entry| entry.key_and_mask.key);
        self.entry_by_key.clear();

        let total_bytes = HEADER_BYTES
            + entries.len() * ENTRY_BYTES
            + self.n_address_records * ADDRESS_RECORD_BYTES;
        let mut bytes = vec![0u8; total_bytes];
        let mut address_list = Vec::with_capacity(self.n_address_records);

        LittleEndian::write_u32(&mut bytes[0..4], entries.len() as u32);
        LittleEndian::write_u32(&mut bytes[4..8], self.n_address_records as u32);

        for (index, entry) in entries.iter().enumerate() {
            let start = AddressListStart::new(address_list.len() as u32).ok_or_else(|| {
                BuildError::config("population table address list start out of range")
            })?;
            let count = AddressListCount::new(entry.pointers.len() as u32).ok_or_else(|| {
                BuildError::config("population table address count out of range")
            })?;
            if let Some(info) = entry.extra_info {
                address_list.push(AddressListRecord::ExtraInfo(info));
            }
            address_list.extend(entry.pointers.iter().copied().map(AddressListRecord::Row));

            let word = EntryWord {
                start,
                has_extra_info: entry.extra_info.is_some(),
                count,
            };
            let offset = HEADER_BYTES + index * ENTRY_BYTES;
            let words = &mut bytes[offset..offset + ENTRY_BYTES];
            LittleEndian::write_u32(&mut words[0..4], entry.key_and_mask.key);
            LittleEndian::write_u32(&mut words[4..8], entry.key_and_mask.mask);
            LittleEndian::write_u32(&mut words[8..12], word.to_word());
        }

        let list_offset = HEADER_BYTES + entries.len() * ENTRY_BYTES;
        for (word, record) in bytes[list_offset..]
            .chunks_exact_mut(ADDRESS_RECORD_BYTES)
            .zip(&address_list)
        {
            LittleEndian::write_u32(word, record.to_word());
        }

        info!(
            target: "neuromap-connectivity",
            "[POP-TABLE] Finished: {} entries, {} address records, {} bytes",
            entries.len(),
            address_list.len(),
            bytes.len()
        );

        self.n_address_records = 0;
        self.state = TableState::Finalised;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population_table::PopulationTableImage;

    fn building() -> PopulationIndex {
        let mut table = PopulationIndex::new();
        table.initialise();
        table
    }

    #[test]
    fn test_append_requires_initialise() {
        let mut table = PopulationIndex::new();
        let result = table.append_machine_record(KeyAndMask::new(0, 0xFFFF_FF00), 0, 1, false);
        assert!(matches!(result, Err(BuildError::Configuration(_))));
    }

    #[test]
    fn test_same_key_appends_positions() {
        let mut table = building();
        let km = KeyAndMask::new(0x800, 0xFFFF_F800);
        assert_eq!(table.append_machine_record(km, 0x1000, 20, false).unwrap(), 0);
        assert_eq!(table.append_machine_record(km, 0x2000, 20, false).unwrap(), 1);
        assert_eq!(table.n_entries(), 1);

        let bytes = table.finish().unwrap();
        let image = PopulationTableImage::parse(&bytes).unwrap();
        let entry = image.find(0x800).unwrap();
        assert_eq!(entry.count(), 2);
        assert!(!entry.has_extra_info());
    }

    #[test]
    fn test_neuron_bits_in_key_share_the_entry() {
        let mut table = building();
        let mask = 0xFFFF_F800;
        assert_eq!(
            table.append_machine_record(KeyAndMask::new(0x801, mask), 0x1000, 20, false).unwrap(),
            0
        );
        assert_eq!(
            table.append_machine_record(KeyAndMask::new(0x802, mask), 0x2000, 20, false).unwrap(),
            1
        );
        assert_eq!(table.n_entries(), 1);

        let image = PopulationTableImage::parse(&table.finish().unwrap()).unwrap();
        assert_eq!(image.entries()[0].key_and_mask(), KeyAndMask::new(0x800, mask));
        assert_eq!(image.find(0x801).map(|entry| entry.count()), Some(2));
    }

    #[test]
    fn test_logs_under_crate_target() {
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured(Arc::new(Mutex::new(Vec::new())));
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("neuromap-connectivity=debug,off"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut table = building();
            table
                .append_machine_record(KeyAndMask::new(0x800, 0xFFFF_F800), 0x1000, 20, false)
                .unwrap();
            table.finish().unwrap();
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("[POP-TABLE] key"));
        assert!(output.contains("[POP-TABLE] Finished: 1 entries"));
    }

    #[test]
    fn test_mask_mismatch_is_rejected() {
        let mut table = building();
        table
            .append_machine_record(KeyAndMask::new(0x800, 0xFFFF_F800), 0, 1, false)
            .unwrap();
        let result =
            table.append_machine_record(KeyAndMask::new(0x800, 0xFFFF_FF00), 0x10, 1, false);
        assert!(matches!(result, Err(BuildError::Configuration(_))));
    }

    #[test]
    fn test_next_aligned_address() {
        assert_eq!(PopulationIndex::next_aligned_address(0).unwrap(), 0);
        assert_eq!(PopulationIndex::next_aligned_address(1).unwrap(), 16);
        assert_eq!(PopulationIndex::next_aligned_address(16).unwrap(), 16);
        assert_eq!(PopulationIndex::next_aligned_address(17).unwrap(), 32);
        assert!(PopulationIndex::next_aligned_address(u32::MAX).is_err());
    }

    #[test]
    fn test_application_record_adds_extra_info_once() {
        let mut table = building();
        let km = KeyAndMask::new(0x1_0000, 0xFFFF_0000);
        let split = CoreSplit::new(0x3, 8, 256);
        assert_eq!(table.append_application_record(km, 0, 10, split).unwrap(), 0);
        assert_eq!(table.append_application_record(km, 0x400, 10, split).unwrap(), 1);
        // One extra info word plus two pointers
        assert_eq!(table.n_address_records(), 3);

        let other_split = CoreSplit::new(0x7, 8, 256);
        assert!(table.append_application_record(km, 0x800, 10, other_split).is_err());
        assert!(table.append_machine_record(km, 0x800, 10, false).is_err());
    }

    #[test]
    fn test_application_after_machine_is_rejected() {
        let mut table = building();
        let km = KeyAndMask::new(0x1_0000, 0xFFFF_0000);
        table.append_machine_record(km, 0, 10, false).unwrap();
        let result = table.append_application_record(km, 0x400, 10, CoreSplit::new(1, 8, 10));
        assert!(matches!(result, Err(BuildError::Configuration(_))));
    }

    #[test]
    fn test_invalid_keeps_position() {
        let mut table = building();
        let km = KeyAndMask::new(0x200, 0xFFFF_FF00);
        assert_eq!(table.append_invalid(km, None).unwrap(), 0);
        assert_eq!(table.append_machine_record(km, 0x40, 4, false).unwrap(), 1);
    }

    #[test]
    fn test_finish_sorts_by_key() {
        let mut table = building();
        for key in [0x3000u32, 0x1000, 0x2000] {
            table
                .append_machine_record(KeyAndMask::new(key, 0xFFFF_F000), key, 1, false)
                .unwrap();
        }
        let bytes = table.finish().unwrap();
        assert_eq!(bytes.len(), HEADER_BYTES + 3 * ENTRY_BYTES + 3 * ADDRESS_RECORD_BYTES);
        assert_eq!(table.state(), TableState::Finalised);

        let image = PopulationTableImage::parse(&bytes).unwrap();
        let keys: Vec<u32> = image.entries().iter().map(|e| e.key_and_mask().key).collect();
        assert_eq!(keys, vec![0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn test_finish_twice_fails_until_reinitialised() {
        let mut table = building();
        table.finish().unwrap();
        assert!(table.finish().is_err());
        table.initialise();
        assert_eq!(table.finish().unwrap().len(), HEADER_BYTES);
    }

    #[test]
    fn test_required_size_is_an_upper_bound() {
        let edges = [
            IncomingEdgeShape {
                n_source_cores: 3,
                has_delays: true,
            },
            IncomingEdgeShape {
                n_source_cores: 1,
                has_delays: false,
            },
        ];
        let mut table = building();
        for core in 0..3u32 {
            let km = KeyAndMask::new(core << 8, 0xFFFF_FF00);
            table.append_machine_record(km, core * 16, 1, false).unwrap();
            let delayed = KeyAndMask::new(0x1_0000 | (core << 8), 0xFFFF_FF00);
            table.append_machine_record(delayed, core * 16, 1, false).unwrap();
        }
        table
            .append_machine_record(KeyAndMask::new(0x2_0000, 0xFFFF_FF00), 0, 1, false)
            .unwrap();
        let bytes = table.finish().unwrap();
        assert!(bytes.len() <= PopulationIndex::required_size_bytes(edges));
    }
}
