// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Generator region layout
//!
//! ```text
//! header:  matrix_region index_region bitfield_region structural_region
//!          n_records post_lo post_n n_synapse_types ticks_per_ms
//!          population_seed[4] core_seed[4] weight_scale[n_synapse_types]
//! record:  undelayed_offset delayed_offset
//!          undelayed_max_words delayed_max_words
//!          undelayed_max_synapses delayed_max_synapses
//!          pre_lo pre_n max_atoms_per_core max_stage max_delay_per_stage
//!          synapse_type
//!          format_id n_format_params format_params...
//!          connector_id n_connector_params connector_params...
//!          weight_id n_weight_params weight_params...
//!          delay_id n_delay_params delay_params...
//! ```
//!
//! Absent offsets and an absent structural region are `0xFFFF_FFFF`.
//! Real-valued parameters are signed 16.15 fixed point.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{BuildError, BuildResult};
use crate::matrix::RegionIds;
use crate::param::{to_s1615, ParamGenerator};
use crate::row::{MaxRowInfo, RowFormat, SynapseWordLayout};
use crate::types::Slice;

/// Marker for an absent offset or region
pub const NO_OFFSET: u32 = u32::MAX;

/// Row format ids understood by the device
pub const STATIC_FORMAT_ID: u32 = 0;
pub const PLASTIC_FORMAT_ID: u32 = 1;

const WORD_BYTES: usize = 4;

/// Fixed part of the generator region
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorHeader {
    pub regions: RegionIds,
    pub post_slice: Slice,
    pub ticks_per_ms: f64,
    pub population_seed: [u32; 4],
    pub core_seed: [u32; 4],
    pub weight_scales: Vec<f64>,
}

impl GeneratorHeader {
    fn words(&self, n_records: usize) -> Vec<u32> {
        let mut words = vec![
            self.regions.synaptic_matrix,
            self.regions.population_table,
            self.regions.connectivity_bitfield,
            self.regions.structural.unwrap_or(NO_OFFSET),
            n_records as u32,
            self.post_slice.lo_atom,
            self.post_slice.n_atoms,
            self.weight_scales.len() as u32,
            to_s1615(self.ticks_per_ms),
        ];
        words.extend_from_slice(&self.population_seed);
        words.extend_from_slice(&self.core_seed);
        words.extend(self.weight_scales.iter().map(|&scale| to_s1615(scale)));
        words
    }
}

/// Connector and parameter description of one generated matrix
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorRecord {
    /// Byte offsets into the synaptic matrix region
    pub undelayed_offset: Option<u32>,
    pub delayed_offset: Option<u32>,
    pub max_row_info: MaxRowInfo,
    pub pre_slice: Slice,
    pub max_atoms_per_core: u32,
    pub n_delay_stages: u32,
    pub max_delay_per_stage: u32,
    pub synapse_type: u8,
    pub format: RowFormat,
    pub word_layout: SynapseWordLayout,
    pub connector_id: u32,
    pub connector_params: Vec<u32>,
    pub weights: ParamGenerator,
    pub delays: ParamGenerator,
    /// Device weight units per host weight unit for this synapse type
    pub weight_scale: f64,
    pub ticks_per_ms: f64,
}

impl GeneratorRecord {
    fn words(&self) -> Vec<u32> {
        let info = &self.max_row_info;
        let mut words = vec![
            self.undelayed_offset.unwrap_or(NO_OFFSET),
            self.delayed_offset.unwrap_or(NO_OFFSET),
            info.undelayed_max_words,
            info.delayed_max_words,
            info.undelayed_max_synapses,
            info.delayed_max_synapses,
            self.pre_slice.lo_atom,
            self.pre_slice.n_atoms,
            self.max_atoms_per_core,
            self.n_delay_stages + 1,
            self.max_delay_per_stage,
            u32::from(self.synapse_type),
        ];

        let mut format_params = vec![
            self.word_layout.n_index_bits(),
            self.word_layout.n_type_bits(),
            self.word_layout.n_delay_bits(),
        ];
        let format_id = match self.format {
            RowFormat::Static => STATIC_FORMAT_ID,
            RowFormat::Plastic(layout) => {
                format_params.push(layout.n_header_words);
                format_params.push(layout.n_half_words_per_synapse);
                PLASTIC_FORMAT_ID
            }
        };
        push_params(&mut words, format_id, &format_params);
        push_params(&mut words, self.connector_id, &self.connector_params);
        push_params(
            &mut words,
            self.weights.generator_id(),
            &self.weights.param_words(self.weight_scale),
        );
        push_params(
            &mut words,
            self.delays.generator_id(),
            &self.delays.param_words(self.ticks_per_ms),
        );
        words
    }
}

fn push_params(words: &mut Vec<u32>, id: u32, params: &[u32]) {
    words.push(id);
    words.push(params.len() as u32);
    words.extend_from_slice(params);
}

/// The whole generator region of one core
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorDescriptor {
    header: GeneratorHeader,
    records: Vec<GeneratorRecord>,
}

impl GeneratorDescriptor {
    pub fn new(header: GeneratorHeader) -> Self {
        Self {
            header,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: GeneratorRecord) -> BuildResult<()> {
        if !record.delays.is_bounded() {
            return Err(BuildError::config(format!(
                "delay generator {:?} cannot be expanded on the device",
                record.delays
            )));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[GeneratorRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes of the region; zero when nothing is generated
    pub fn size_bytes(&self) -> usize {
        if self.records.is_empty() {
            return 0;
        }
        let header = self.header.words(self.records.len()).len();
        let records: usize = self.records.iter().map(|record| record.words().len()).sum();
        (header + records) * WORD_BYTES
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        if self.records.is_empty() {
            return Vec::new();
        }
        let mut words = self.header.words(self.records.len());
        for record in &self.records {
            words.extend(record.words());
        }
        let mut bytes = Vec::with_capacity(words.len() * WORD_BYTES);
        for word in words {
            // Writing into a Vec cannot fail
            let _ = bytes.write_u32::<LittleEndian>(word);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;

    fn header() -> GeneratorHeader {
        GeneratorHeader {
            regions: RegionIds::default(),
            post_slice: Slice::new(0, 64),
            ticks_per_ms: 1.0,
            population_seed: [1, 2, 3, 4],
            core_seed: [5, 6, 7, 8],
            weight_scales: vec![256.0, 128.0],
        }
    }

    fn record() -> GeneratorRecord {
        GeneratorRecord {
            undelayed_offset: Some(0x100),
            delayed_offset: None,
            max_row_info: MaxRowInfo {
                undelayed_max_synapses: 64,
                undelayed_max_words: 64,
                undelayed_max_bytes: 268,
                ..MaxRowInfo::default()
            },
            pre_slice: Slice::new(0, 32),
            max_atoms_per_core: 32,
            n_delay_stages: 0,
            max_delay_per_stage: 15,
            synapse_type: 1,
            format: RowFormat::Static,
            word_layout: SynapseWordLayout::new(8, 1, 4).unwrap(),
            connector_id: 1,
            connector_params: Vec::new(),
            weights: ParamGenerator::Constant(0.5),
            delays: ParamGenerator::Uniform {
                low: 1.0,
                high: 3.0,
            },
            weight_scale: 128.0,
            ticks_per_ms: 1.0,
        }
    }

    #[test]
    fn test_empty_descriptor_has_no_bytes() {
        let descriptor = GeneratorDescriptor::new(header());
        assert_eq!(descriptor.size_bytes(), 0);
        assert!(descriptor.to_bytes().is_empty());
    }

    #[test]
    fn test_layout() {
        let mut descriptor = GeneratorDescriptor::new(header());
        descriptor.push(record()).unwrap();
        let bytes = descriptor.to_bytes();
        assert_eq!(bytes.len(), descriptor.size_bytes());

        let mut words = vec![0u32; bytes.len() / 4];
        LittleEndian::read_u32_into(&bytes, &mut words);
        // 9 fixed words + 8 seed words + 2 scales
        assert_eq!(&words[..5], &[3, 4, 6, NO_OFFSET, 1]);
        assert_eq!(words[7], 2);
        assert_eq!(words[8], 32_768);
        assert_eq!(words[17], 256 * 32_768);

        let record = &words[19..];
        assert_eq!(record[0], 0x100);
        assert_eq!(record[1], NO_OFFSET);
        assert_eq!(record[9], 1);
        // Static format with three layout params
        assert_eq!(&record[12..17], &[STATIC_FORMAT_ID, 3, 8, 1, 4]);
        // Connector 1 without params, constant weight 0.5 * 128
        assert_eq!(&record[17..19], &[1, 0]);
        assert_eq!(&record[19..22], &[0, 1, 64 * 32_768]);
        assert_eq!(&record[22..26], &[1, 2, 32_768, 3 * 32_768]);
        assert_eq!(record.len(), 26);
    }

    #[test]
    fn test_unbounded_delays_are_rejected() {
        let mut descriptor = GeneratorDescriptor::new(header());
        let mut unbounded = record();
        unbounded.delays = ParamGenerator::Exponential { beta: 2.0 };
        assert!(descriptor.push(unbounded).is_err());
    }
}
