// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Master population table
//!
//! Maps each incoming routing key to the rows of synaptic data it activates.
//! [`PopulationIndex`] builds the table for one core; [`PopulationTableImage`]
//! parses the packed bytes back and performs the same lookup as the firmware.

mod builder;
pub mod fields;
mod image;
mod record;

pub use builder::{
    IncomingEdgeShape, PopulationIndex, TableState, ADDRESS_RECORD_BYTES, ENTRY_BYTES,
    HEADER_BYTES, MAX_ADDRESS_LIST_RECORDS, MAX_ENTRIES, MAX_RECORDS_PER_ENTRY,
};
pub use image::{PopulationTableImage, RowLocation, TableEntry};
pub use record::{
    AddressListRecord, CoreSplit, ExtraInfo, RowPointer, ADDRESS_SCALE, INVALID_SCALED_ADDRESS,
    MAX_ADDRESS, MAX_CORE_MASK, MAX_N_NEURONS, MAX_ROW_LENGTH, MAX_SCALED_ADDRESS,
};
