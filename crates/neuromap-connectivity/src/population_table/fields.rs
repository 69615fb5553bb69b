// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Range-checked bit fields of the packed population table
//!
//! Each newtype holds a value proven to fit its on-device bit width, so the
//! packing code never has to mask or truncate.

macro_rules! bit_field {
    ($(#[$meta:meta])* $name:ident, $repr:ty, $bits:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name($repr);

        impl $name {
            /// Width of the field in bits
            pub const BITS: u32 = $bits;

            /// Largest value the field can hold
            pub const MAX: $repr = ((1u64 << $bits) - 1) as $repr;

            /// Returns `None` if `value` does not fit in [`Self::BITS`] bits
            #[inline]
            pub fn new(value: u32) -> Option<Self> {
                if u64::from(value) > Self::MAX as u64 {
                    None
                } else {
                    Some(Self(value as $repr))
                }
            }

            #[inline]
            pub const fn get(self) -> $repr {
                self.0
            }

            /// Extract the field from `word` at bit offset `shift`
            #[inline]
            pub(crate) const fn unpack(word: u32, shift: u32) -> Self {
                Self(((word >> shift) as u64 & (Self::MAX as u64)) as $repr)
            }

            #[inline]
            pub(crate) const fn pack(self, shift: u32) -> u32 {
                (self.0 as u32) << shift
            }
        }
    };
}

bit_field!(
    /// Position of an entry's first record in the address list
    AddressListStart,
    u16,
    15
);
bit_field!(
    /// Number of row pointers in an entry
    AddressListCount,
    u16,
    16
);
bit_field!(
    /// Row length in words, stored minus one
    RowLengthCode,
    u8,
    8
);
bit_field!(
    /// Byte address divided by the address scale
    ScaledAddress,
    u32,
    23
);
bit_field!(
    /// Mask applied to the shifted key to find the source core
    CoreMask,
    u16,
    10
);
bit_field!(
    /// Words of the per-core connectivity bitmap
    BitmapWords,
    u8,
    6
);
bit_field!(
    /// Shift applied to the key before the core mask
    MaskShift,
    u8,
    5
);
bit_field!(
    /// Rows per source core in an application matrix
    NeuronCount,
    u16,
    11
);
