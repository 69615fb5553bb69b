// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Row formats and the 16-bit synaptic control field

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// Words at the front of every row: plastic size, fixed-fixed count, fixed-plastic count
pub const ROW_HEADER_WORDS: u32 = 3;

/// Bytes per row word
pub const BYTES_PER_WORD: u32 = 4;

const CONTROL_BITS: u32 = 16;

/// Bit split of the control half-word: index, then synapse type, then delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseWordLayout {
    n_index_bits: u32,
    n_type_bits: u32,
    n_delay_bits: u32,
}

impl SynapseWordLayout {
    pub fn new(n_index_bits: u32, n_type_bits: u32, n_delay_bits: u32) -> BuildResult<Self> {
        let total = n_index_bits + n_type_bits + n_delay_bits;
        if total > CONTROL_BITS {
            return Err(BuildError::config(format!(
                "synapse word layout needs {} bits ({} index + {} type + {} delay), only {} available",
                total, n_index_bits, n_type_bits, n_delay_bits, CONTROL_BITS
            )));
        }
        if n_delay_bits == 0 {
            return Err(BuildError::config(
                "synapse word layout needs at least one delay bit",
            ));
        }
        Ok(Self {
            n_index_bits,
            n_type_bits,
            n_delay_bits,
        })
    }

    pub fn n_index_bits(&self) -> u32 {
        self.n_index_bits
    }

    pub fn n_type_bits(&self) -> u32 {
        self.n_type_bits
    }

    pub fn n_delay_bits(&self) -> u32 {
        self.n_delay_bits
    }

    /// Number of post-synaptic neurons addressable by the index field
    pub fn max_post_atoms(&self) -> u32 {
        1 << self.n_index_bits
    }

    pub fn n_synapse_types(&self) -> u32 {
        1 << self.n_type_bits
    }

    /// Largest delay, in ticks, the delay field can hold
    pub fn max_delay(&self) -> u32 {
        (1 << self.n_delay_bits) - 1
    }

    /// Pack a control half-word; callers range-check the inputs
    pub(crate) fn pack(&self, index: u32, synapse_type: u32, delay: u32) -> u16 {
        debug_assert!(index < self.max_post_atoms());
        debug_assert!(synapse_type < self.n_synapse_types());
        debug_assert!(delay <= self.max_delay());
        let type_shift = self.n_index_bits;
        let delay_shift = self.n_index_bits + self.n_type_bits;
        (index | (synapse_type << type_shift) | (delay << delay_shift)) as u16
    }

    /// Split a control half-word into (index, synapse type, delay)
    pub(crate) fn unpack(&self, control: u16) -> (u32, u32, u32) {
        let control = u32::from(control);
        let index = control & (self.max_post_atoms() - 1);
        let synapse_type = (control >> self.n_index_bits) & (self.n_synapse_types() - 1);
        let delay = (control >> (self.n_index_bits + self.n_type_bits)) & self.max_delay();
        (index, synapse_type, delay)
    }
}

/// Shape of the plastic-plastic region of a plastic row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlasticLayout {
    /// Pre-synaptic trace words at the start of the region
    pub n_header_words: u32,
    /// Half-words of state per synapse; the first is the weight
    pub n_half_words_per_synapse: u32,
}

impl PlasticLayout {
    pub fn new(n_header_words: u32, n_half_words_per_synapse: u32) -> BuildResult<Self> {
        if n_half_words_per_synapse == 0 {
            return Err(BuildError::config(
                "plastic synapses need at least one half-word of state for the weight",
            ));
        }
        Ok(Self {
            n_header_words,
            n_half_words_per_synapse,
        })
    }

    /// Words of the plastic-plastic region for `n_synapses`
    pub fn plastic_words(&self, n_synapses: u32) -> u32 {
        self.n_header_words + (n_synapses * self.n_half_words_per_synapse).div_ceil(2)
    }
}

/// Row format selected once per projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RowFormat {
    /// One fixed-fixed word per synapse, weight in the upper half
    Static,
    /// Plastic state plus half-word fixed-plastic controls
    Plastic(PlasticLayout),
}

impl RowFormat {
    pub fn is_plastic(&self) -> bool {
        matches!(self, RowFormat::Plastic(_))
    }

    /// Data words (header excluded) of a row holding `n_synapses`
    ///
    /// A row with no synapses has no data words in either format.
    pub fn words_for_synapses(&self, n_synapses: u32) -> u32 {
        if n_synapses == 0 {
            return 0;
        }
        match self {
            RowFormat::Static => n_synapses,
            RowFormat::Plastic(layout) => {
                layout.plastic_words(n_synapses) + n_synapses.div_ceil(2)
            }
        }
    }
}

/// Bytes of one padded row with `max_words` data words; zero for an empty partition
pub fn row_stride_bytes(max_words: u32) -> usize {
    if max_words == 0 {
        0
    } else {
        ((max_words + ROW_HEADER_WORDS) * BYTES_PER_WORD) as usize
    }
}
