// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lookup behaviour of packed population tables

use neuromap_connectivity::population_table::{PopulationIndex, PopulationTableImage};
use neuromap_connectivity::KeyAndMask;
use proptest::prelude::*;

const MASK: u32 = 0xFFFF_FF00;

/// (key prefix, rows per record) for each source; prefixes are made unique
fn sources() -> impl Strategy<Value = Vec<(u32, Vec<u32>)>> {
    prop::collection::btree_map(1u32..0x00FF_FFFF, prop::collection::vec(1u32..=40, 1..4), 1..40)
        .prop_map(|map| map.into_iter().collect())
}

fn build(sources: &[(u32, Vec<u32>)]) -> (Vec<u8>, Vec<(KeyAndMask, Vec<(u32, u32)>)>) {
    let mut index = PopulationIndex::new();
    index.initialise();
    let mut address = 0u32;
    let mut expected = Vec::new();
    for (prefix, lengths) in sources {
        let key_and_mask = KeyAndMask::new(prefix << 8, MASK);
        let mut records = Vec::new();
        for &length in lengths {
            address = PopulationIndex::next_aligned_address(address).unwrap();
            index
                .append_machine_record(key_and_mask, address, length, false)
                .unwrap();
            records.push((address, length));
            address += 256 * (length + 3) * 4;
        }
        expected.push((key_and_mask, records));
    }
    (index.finish().unwrap(), expected)
}

proptest! {
    #[test]
    fn every_registered_key_resolves(sources in sources(), neuron in 0u32..256) {
        let (bytes, expected) = build(&sources);
        let table = PopulationTableImage::parse(&bytes).unwrap();
        prop_assert_eq!(table.entries().len(), sources.len());

        for (key_and_mask, records) in &expected {
            let rows = table.resolve_rows(key_and_mask.key | neuron);
            prop_assert_eq!(rows.len(), records.len());
            for (row, &(address, length)) in rows.iter().zip(records) {
                prop_assert_eq!(row.address, address + neuron * (length + 3) * 4);
                prop_assert_eq!(row.row_length, length);
            }
        }
    }

    #[test]
    fn unregistered_keys_miss(sources in sources(), prefix in 0u32..0x00FF_FFFF) {
        let (bytes, _) = build(&sources);
        let table = PopulationTableImage::parse(&bytes).unwrap();
        let registered = sources.iter().any(|(known, _)| *known == prefix);
        prop_assert_eq!(table.find(prefix << 8).is_some(), registered);
    }

    #[test]
    fn build_is_deterministic(sources in sources()) {
        let (first, _) = build(&sources);
        let mut reversed = sources.clone();
        reversed.reverse();
        let (second, _) = build(&sources);
        prop_assert_eq!(&first, &second);
        // Registration order does not change which keys resolve
        let (other, _) = build(&reversed);
        let other = PopulationTableImage::parse(&other).unwrap();
        for (prefix, lengths) in &sources {
            let entry = other.find(prefix << 8).unwrap();
            prop_assert_eq!(entry.count() as usize, lengths.len());
        }
    }
}

#[test]
fn test_two_records_for_one_key() {
    let mut index = PopulationIndex::new();
    index.initialise();
    let key_and_mask = KeyAndMask::new(0x800, 0xFFFF_F800);
    assert_eq!(
        index
            .append_machine_record(key_and_mask, 0x1000, 20, false)
            .unwrap(),
        0
    );
    assert_eq!(
        index
            .append_machine_record(key_and_mask, 0x2000, 20, false)
            .unwrap(),
        1
    );
    let table = PopulationTableImage::parse(&index.finish().unwrap()).unwrap();
    assert_eq!(table.find(0x800).map(|entry| entry.count()), Some(2));
    assert_eq!(table.resolve_rows(0x805)[1].address, 0x2000 + 5 * 23 * 4);
}

#[test]
fn test_keys_with_neuron_bits_resolve() {
    let mut index = PopulationIndex::new();
    index.initialise();
    let mask = 0xFFFF_F800;
    index
        .append_machine_record(KeyAndMask::new(0x801, mask), 0x1000, 20, false)
        .unwrap();
    assert_eq!(
        index
            .append_machine_record(KeyAndMask::new(0x802, mask), 0x2000, 20, false)
            .unwrap(),
        1
    );
    index
        .append_machine_record(KeyAndMask::new(0x1003, mask), 0x3000, 20, false)
        .unwrap();

    let table = PopulationTableImage::parse(&index.finish().unwrap()).unwrap();
    assert_eq!(table.entries().len(), 2);
    assert_eq!(table.find(0x801).map(|entry| entry.count()), Some(2));
    assert_eq!(table.find(0x1003).map(|entry| entry.count()), Some(1));

    let rows = table.resolve_rows(0x805);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].address, 0x1000 + 5 * 23 * 4);
    assert_eq!(rows[1].address, 0x2000 + 5 * 23 * 4);
}
