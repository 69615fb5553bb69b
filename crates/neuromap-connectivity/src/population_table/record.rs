// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Address-list records and entry words
//!
//! The address list is one flat array of 32-bit words. A word is either a
//! [`RowPointer`] or an [`ExtraInfo`]; the firmware tells them apart only by
//! position (the extra info, when present, is the first word of an entry).

use super::fields::{
    AddressListCount, AddressListStart, BitmapWords, CoreMask, MaskShift, NeuronCount,
    RowLengthCode, ScaledAddress,
};
use crate::error::{BuildError, BuildResult};

/// Every matrix address is a multiple of this many bytes
pub const ADDRESS_SCALE: u32 = 16;

/// Largest scaled address of a real row pointer
pub const MAX_SCALED_ADDRESS: u32 = ScaledAddress::MAX - 1;

/// Scaled address marking a placeholder record
pub const INVALID_SCALED_ADDRESS: u32 = ScaledAddress::MAX;

/// Largest byte address a row pointer can carry
pub const MAX_ADDRESS: u32 = MAX_SCALED_ADDRESS * ADDRESS_SCALE;

/// Longest row, in data words, the row-length field can encode
pub const MAX_ROW_LENGTH: u32 = RowLengthCode::MAX as u32 + 1;

/// Largest number of source neurons per core in an application entry
pub const MAX_N_NEURONS: u32 = NeuronCount::MAX as u32;

/// Largest core mask in an application entry
pub const MAX_CORE_MASK: u32 = CoreMask::MAX as u32;

const BITS_PER_WORD: u32 = 32;

// Both address-list variants must fill exactly one word
const _: () = assert!(RowLengthCode::BITS + ScaledAddress::BITS + 1 == BITS_PER_WORD);
const _: () = assert!(
    CoreMask::BITS + BitmapWords::BITS + MaskShift::BITS + NeuronCount::BITS == BITS_PER_WORD
);
const _: () = assert!(AddressListStart::BITS + 1 + AddressListCount::BITS == BITS_PER_WORD);

const ROW_LENGTH_SHIFT: u32 = 0;
const ADDRESS_SHIFT: u32 = RowLengthCode::BITS;
const SINGLE_SHIFT: u32 = ADDRESS_SHIFT + ScaledAddress::BITS;

const CORE_MASK_SHIFT: u32 = 0;
const N_WORDS_SHIFT: u32 = CoreMask::BITS;
const MASK_SHIFT_SHIFT: u32 = N_WORDS_SHIFT + BitmapWords::BITS;
const N_NEURONS_SHIFT: u32 = MASK_SHIFT_SHIFT + MaskShift::BITS;

const START_SHIFT: u32 = 0;
const EXTRA_INFO_FLAG_SHIFT: u32 = AddressListStart::BITS;
const COUNT_SHIFT: u32 = EXTRA_INFO_FLAG_SHIFT + 1;

/// Pointer to a block of rows (or a placeholder)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowPointer {
    row_length: RowLengthCode,
    address: ScaledAddress,
    is_single: bool,
}

impl RowPointer {
    /// Placeholder that keeps positions aligned across parallel tables
    pub const INVALID: RowPointer = RowPointer {
        row_length: RowLengthCode::unpack(0, 0),
        address: ScaledAddress::unpack(INVALID_SCALED_ADDRESS, 0),
        is_single: false,
    };

    /// Build a pointer to `address` (bytes) for rows of `row_length` data words
    pub fn new(address: u32, row_length: u32, is_single: bool) -> BuildResult<Self> {
        if row_length == 0 {
            return Err(BuildError::config(
                "row length of a real row pointer must be at least one word",
            ));
        }
        let row_length = RowLengthCode::new(row_length - 1).ok_or(BuildError::RowTooBig {
            requested: row_length,
            max_supported: MAX_ROW_LENGTH,
        })?;
        Ok(Self {
            row_length,
            address: scale_address(address)?,
            is_single,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.address.get() != INVALID_SCALED_ADDRESS
    }

    /// Byte address, or `None` for a placeholder
    pub fn address(&self) -> Option<u32> {
        self.is_valid()
            .then(|| self.address.get() * ADDRESS_SCALE)
    }

    /// Row length in data words
    pub fn row_length(&self) -> u32 {
        u32::from(self.row_length.get()) + 1
    }

    pub fn is_single(&self) -> bool {
        self.is_single
    }

    pub fn to_word(&self) -> u32 {
        self.row_length.pack(ROW_LENGTH_SHIFT)
            | self.address.pack(ADDRESS_SHIFT)
            | (u32::from(self.is_single) << SINGLE_SHIFT)
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            row_length: RowLengthCode::unpack(word, ROW_LENGTH_SHIFT),
            address: ScaledAddress::unpack(word, ADDRESS_SHIFT),
            is_single: (word >> SINGLE_SHIFT) & 1 == 1,
        }
    }
}

/// Validate alignment and range of a byte address and scale it down
fn scale_address(address: u32) -> BuildResult<ScaledAddress> {
    if address % ADDRESS_SCALE != 0 {
        return Err(BuildError::config(format!(
            "address 0x{:x} is not a multiple of the address scale {}",
            address, ADDRESS_SCALE
        )));
    }
    let scaled = address / ADDRESS_SCALE;
    if scaled > MAX_SCALED_ADDRESS {
        return Err(BuildError::config(format!(
            "address 0x{:x} is beyond the maximum population table address 0x{:x}",
            address, MAX_ADDRESS
        )));
    }
    // In range by the check above
    ScaledAddress::new(scaled).ok_or_else(|| BuildError::config("scaled address overflow"))
}

/// Unvalidated description of how an application key splits across source cores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreSplit {
    /// Mask of the core-index field after shifting
    pub core_mask: u32,
    /// Bit position of the core-index field in the key
    pub mask_shift: u32,
    /// Rows reserved per source core
    pub n_neurons: u32,
}

impl CoreSplit {
    pub fn new(core_mask: u32, mask_shift: u32, n_neurons: u32) -> Self {
        Self {
            core_mask,
            mask_shift,
            n_neurons,
        }
    }
}

/// Validated per-core split stored ahead of an entry's row pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtraInfo {
    core_mask: CoreMask,
    n_words: BitmapWords,
    mask_shift: MaskShift,
    n_neurons: NeuronCount,
}

impl ExtraInfo {
    pub fn from_split(split: CoreSplit) -> BuildResult<Self> {
        let core_mask = CoreMask::new(split.core_mask).ok_or_else(|| {
            BuildError::config(format!(
                "core mask 0x{:x} needs more than {} bits (max 0x{:x})",
                split.core_mask,
                CoreMask::BITS,
                MAX_CORE_MASK
            ))
        })?;
        let mask_shift = MaskShift::new(split.mask_shift).ok_or_else(|| {
            BuildError::config(format!("mask shift {} is out of range", split.mask_shift))
        })?;
        let n_neurons = NeuronCount::new(split.n_neurons).ok_or_else(|| {
            BuildError::config(format!(
                "{} neurons per core exceeds the maximum of {} in an application entry",
                split.n_neurons, MAX_N_NEURONS
            ))
        })?;
        let bitmap_words = split.n_neurons.div_ceil(BITS_PER_WORD);
        let n_words = BitmapWords::new(bitmap_words).ok_or_else(|| {
            BuildError::config(format!(
                "{} neurons per core needs {} bitmap words, more than the maximum of {}",
                split.n_neurons,
                bitmap_words,
                BitmapWords::MAX
            ))
        })?;
        Ok(Self {
            core_mask,
            n_words,
            mask_shift,
            n_neurons,
        })
    }

    pub fn core_mask(&self) -> u32 {
        u32::from(self.core_mask.get())
    }

    pub fn mask_shift(&self) -> u32 {
        u32::from(self.mask_shift.get())
    }

    pub fn n_neurons(&self) -> u32 {
        u32::from(self.n_neurons.get())
    }

    pub fn n_bitmap_words(&self) -> u32 {
        u32::from(self.n_words.get())
    }

    /// Source core index encoded in `key`
    pub fn core_of(&self, key: u32) -> u32 {
        (key >> self.mask_shift()) & self.core_mask()
    }

    /// Row of `key` within an application matrix whose entry mask is `mask`
    ///
    /// `None` when the row number does not fit in 32 bits.
    pub fn row_index(&self, key: u32, mask: u32) -> Option<u32> {
        let core_field = self.core_mask() << self.mask_shift();
        let local = key & !(mask | core_field);
        (self.core_of(key) * self.n_neurons()).checked_add(local)
    }

    pub fn to_word(&self) -> u32 {
        self.core_mask.pack(CORE_MASK_SHIFT)
            | self.n_words.pack(N_WORDS_SHIFT)
            | self.mask_shift.pack(MASK_SHIFT_SHIFT)
            | self.n_neurons.pack(N_NEURONS_SHIFT)
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            core_mask: CoreMask::unpack(word, CORE_MASK_SHIFT),
            n_words: BitmapWords::unpack(word, N_WORDS_SHIFT),
            mask_shift: MaskShift::unpack(word, MASK_SHIFT_SHIFT),
            n_neurons: NeuronCount::unpack(word, N_NEURONS_SHIFT),
        }
    }
}

/// One slot of the address list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressListRecord {
    Row(RowPointer),
    ExtraInfo(ExtraInfo),
}

impl AddressListRecord {
    pub fn to_word(&self) -> u32 {
        match self {
            AddressListRecord::Row(pointer) => pointer.to_word(),
            AddressListRecord::ExtraInfo(info) => info.to_word(),
        }
    }
}

/// The packed third word of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryWord {
    pub start: AddressListStart,
    pub has_extra_info: bool,
    pub count: AddressListCount,
}

impl EntryWord {
    pub fn to_word(self) -> u32 {
        self.start.pack(START_SHIFT)
            | (u32::from(self.has_extra_info) << EXTRA_INFO_FLAG_SHIFT)
            | self.count.pack(COUNT_SHIFT)
    }

    pub fn from_word(word: u32) -> Self {
        Self {
            start: AddressListStart::unpack(word, START_SHIFT),
            has_extra_info: (word >> EXTRA_INFO_FLAG_SHIFT) & 1 == 1,
            count: AddressListCount::unpack(word, COUNT_SHIFT),
        }
    }
}
