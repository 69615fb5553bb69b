// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core value types shared by the index, codec and allocator

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a processing core on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoreId {
    pub x: u8,
    pub y: u8,
    pub p: u8,
}

impl CoreId {
    pub const fn new(x: u8, y: u8, p: u8) -> Self {
        Self { x, y, p }
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.p)
    }
}

/// Identifier of a projection, unique within one target population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProjectionId(pub u32);

impl fmt::Display for ProjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projection#{}", self.0)
    }
}

/// Routing key and mask pair
///
/// A packet with key `k` matches when `(k & mask) == (key & mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyAndMask {
    pub key: u32,
    pub mask: u32,
}

impl KeyAndMask {
    pub const fn new(key: u32, mask: u32) -> Self {
        Self { key, mask }
    }

    /// True if `key` is routed to this entry
    #[inline]
    pub fn matches(&self, key: u32) -> bool {
        (key & self.mask) == (self.key & self.mask)
    }

    /// The same route with the key bits outside the mask cleared
    pub fn normalised(&self) -> Self {
        Self::new(self.key & self.mask, self.mask)
    }

    /// The neuron-id part of `key` (bits outside the mask)
    #[inline]
    pub fn neuron_bits(&self, key: u32) -> u32 {
        key & !self.mask
    }
}

impl fmt::Display for KeyAndMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}/0x{:08x}", self.key, self.mask)
    }
}

/// A contiguous range of neuron ids handled by one core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Slice {
    pub lo_atom: u32,
    pub n_atoms: u32,
}

impl Slice {
    pub const fn new(lo_atom: u32, n_atoms: u32) -> Self {
        Self { lo_atom, n_atoms }
    }

    /// Exclusive upper bound
    #[inline]
    pub fn end(&self) -> u32 {
        self.lo_atom + self.n_atoms
    }

    #[inline]
    pub fn contains(&self, atom: u32) -> bool {
        atom >= self.lo_atom && atom < self.end()
    }

    #[inline]
    pub fn overlaps(&self, other: &Slice) -> bool {
        self.lo_atom < other.end() && other.lo_atom < self.end()
    }

    pub fn atoms(&self) -> core::ops::Range<u32> {
        self.lo_atom..self.end()
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n_atoms == 0 {
            write!(f, "[{}:empty]", self.lo_atom)
        } else {
            write!(f, "[{}:{}]", self.lo_atom, self.end() - 1)
        }
    }
}

/// One synapse between two neurons, in host units
///
/// `source` and `target` are absolute atom ids of the pre and post
/// populations. `delay` is in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Connection {
    pub source: u32,
    pub target: u32,
    pub weight: f64,
    pub delay: f64,
    pub synapse_type: u8,
}

impl Connection {
    pub fn new(source: u32, target: u32, weight: f64, delay: f64, synapse_type: u8) -> Self {
        Self {
            source,
            target,
            weight,
            delay,
            synapse_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_mask_matches() {
        let km = KeyAndMask::new(0x800, 0xFFFF_F800);
        assert!(km.matches(0x800));
        assert!(km.matches(0x8FF));
        assert!(!km.matches(0x1000));
        assert_eq!(km.neuron_bits(0x805), 5);
    }

    #[test]
    fn test_slice_bounds() {
        let slice = Slice::new(10, 5);
        assert_eq!(slice.end(), 15);
        assert!(slice.contains(10));
        assert!(slice.contains(14));
        assert!(!slice.contains(15));
        assert!(slice.overlaps(&Slice::new(14, 3)));
        assert!(!slice.overlaps(&Slice::new(15, 3)));
        assert_eq!(slice.to_string(), "[10:14]");
    }
}
