// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Inputs to the allocator: sources, projections and the per-core context

use std::sync::Arc;

use crate::connector::{Connector, DelayTiming};
use crate::error::{BuildError, BuildResult};
use crate::param::ParamGenerator;
use crate::row::{RowCodec, RowFormat, SynapseWordLayout};
use crate::types::{CoreId, KeyAndMask, ProjectionId, Slice};

/// One machine-level core of a source population
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCore {
    pub slice: Slice,
    pub key_and_mask: KeyAndMask,
}

/// Keys of the delay extension relaying a source's long delays
///
/// There is one delay core per source core, in the same order and with the
/// same slice. Each delay core's keys cover `n_stages * n_atoms` neurons,
/// stage by stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayRouting {
    pub n_stages: u32,
    pub cores: Vec<KeyAndMask>,
}

/// A population sending spikes, as split and keyed by placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePopulation {
    pub label: String,
    pub n_atoms: u32,
    pub max_atoms_per_core: u32,
    pub cores: Vec<SourceCore>,
    pub delay_routing: Option<DelayRouting>,
}

impl SourcePopulation {
    pub fn n_delay_stages(&self) -> u32 {
        self.delay_routing.as_ref().map_or(0, |routing| routing.n_stages)
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.max_atoms_per_core == 0 {
            return Err(BuildError::config(format!(
                "source {} has no atoms per core",
                self.label
            )));
        }
        if let Some(core) = self
            .cores
            .iter()
            .find(|core| core.slice.end() > self.n_atoms || core.slice.n_atoms > self.max_atoms_per_core)
        {
            return Err(BuildError::config(format!(
                "source {} core slice {} does not fit {} atoms at {} per core",
                self.label, core.slice, self.n_atoms, self.max_atoms_per_core
            )));
        }
        if let Some(routing) = &self.delay_routing {
            if routing.cores.len() != self.cores.len() {
                return Err(BuildError::config(format!(
                    "source {} has {} cores but {} delay cores",
                    self.label,
                    self.cores.len(),
                    routing.cores.len()
                )));
            }
            if routing.n_stages == 0 {
                return Err(BuildError::config(format!(
                    "source {} has delay routing with no stages",
                    self.label
                )));
            }
        }
        Ok(())
    }
}

/// Structural plasticity settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralConfig {
    /// Minimum row capacity kept free for rewiring
    pub pad_to_length: u32,
}

/// How synapses of a projection behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynapseDynamics {
    pub format: RowFormat,
    /// Whether the device can expand rows of this kind itself
    pub supports_generation: bool,
    pub structural: Option<StructuralConfig>,
}

impl SynapseDynamics {
    pub fn static_synapses() -> Self {
        Self {
            format: RowFormat::Static,
            supports_generation: true,
            structural: None,
        }
    }

    pub fn pad_to_length(&self) -> Option<u32> {
        self.structural.map(|config| config.pad_to_length)
    }
}

/// Everything that describes the synapses of one projection
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseInfo {
    pub connector: Connector,
    pub dynamics: SynapseDynamics,
    pub weights: ParamGenerator,
    pub delays: ParamGenerator,
    pub synapse_type: u8,
    /// Seed of host-side generation
    pub seed: u64,
}

/// A projection arriving at the target population
#[derive(Debug, Clone)]
pub struct IncomingProjection {
    pub id: ProjectionId,
    pub source: Arc<SourcePopulation>,
    pub synapse_info: SynapseInfo,
}

/// Region ids of the per-core data, written into generator descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionIds {
    pub synaptic_matrix: u32,
    pub population_table: u32,
    pub direct_matrix: u32,
    pub connectivity_bitfield: u32,
    pub generator: u32,
    pub structural: Option<u32>,
}

impl Default for RegionIds {
    fn default() -> Self {
        Self {
            synaptic_matrix: 3,
            population_table: 4,
            direct_matrix: 5,
            connectivity_bitfield: 6,
            generator: 7,
            structural: None,
        }
    }
}

/// Explicit per-core build context
#[derive(Debug, Clone, PartialEq)]
pub struct CoreContext {
    pub core: CoreId,
    /// Atoms of the target population handled by this core
    pub post_slice: Slice,
    /// Atoms of the whole target population
    pub n_post_atoms: u32,
    pub word_layout: SynapseWordLayout,
    /// Host weight to device weight multiplier, per synapse type
    pub weight_scales: Vec<f64>,
    pub ticks_per_ms: f64,
    /// Largest delay a row can hold before a delay stage is needed
    pub max_delay_per_stage: u32,
    /// Bytes available for synaptic matrices
    pub synaptic_budget: usize,
    /// Bytes available for single-word direct rows
    pub direct_budget: usize,
    /// Synapse cores serving this neuron core
    pub n_synapse_cores: u32,
    pub regions: RegionIds,
    /// Off forces every projection to be expanded on the host
    pub generation_enabled: bool,
    pub population_seed: [u32; 4],
    pub core_seed: [u32; 4],
}

impl CoreContext {
    pub fn delay_timing(&self) -> DelayTiming {
        DelayTiming {
            ticks_per_ms: self.ticks_per_ms,
            max_delay_per_stage: self.max_delay_per_stage,
        }
    }

    pub fn codec(&self, format: RowFormat) -> BuildResult<RowCodec> {
        RowCodec::new(
            format,
            self.word_layout,
            self.weight_scales.clone(),
            self.ticks_per_ms,
            self.max_delay_per_stage,
        )
    }
}
