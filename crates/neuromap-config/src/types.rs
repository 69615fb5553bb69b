// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `neuromap_configuration.toml`. Every
//! field has a default, so a file only needs the values it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NeuromapConfig {
    pub synapse: SynapseConfig,
    pub memory: MemoryConfig,
    pub timing: TimingConfig,
    pub generation: GenerationConfig,
    pub regions: RegionsConfig,
    pub logging: LoggingConfig,
}

/// Synaptic word layout and weight scaling
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SynapseConfig {
    pub n_index_bits: u32,
    pub n_type_bits: u32,
    pub n_delay_bits: u32,
    /// Host weight to device weight multiplier, one per synapse type
    pub weight_scales: Vec<f64>,
    /// Plastic row state words ahead of the fixed region
    pub plastic_header_words: u32,
    pub plastic_half_words_per_synapse: u32,
}

impl Default for SynapseConfig {
    fn default() -> Self {
        Self {
            n_index_bits: 8,
            n_type_bits: 1,
            n_delay_bits: 4,
            weight_scales: vec![256.0, 256.0],
            plastic_header_words: 1,
            plastic_half_words_per_synapse: 1,
        }
    }
}

/// Per-core memory budgets
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Bytes for synaptic matrices on each core
    pub synaptic_budget_bytes: usize,
    /// Bytes for single-word direct rows on each core
    pub direct_budget_bytes: usize,
    /// Total device memory per core, used by the in-memory accessor
    pub core_capacity_bytes: usize,
    pub n_synapse_cores: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            synaptic_budget_bytes: 8 * 1024 * 1024,
            direct_budget_bytes: 64 * 1024,
            core_capacity_bytes: 16 * 1024 * 1024,
            n_synapse_cores: 1,
        }
    }
}

/// Simulation timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub ticks_per_ms: f64,
    /// Longest delay a row holds before a delay stage is needed
    pub max_delay_per_stage: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ticks_per_ms: 1.0,
            max_delay_per_stage: 15,
        }
    }
}

/// On-device generation and seeding
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Allow rows to be expanded on the device
    pub enabled: bool,
    pub population_seed: [u32; 4],
    /// Base of the per-core seeds; each core mixes in its coordinates
    pub core_seed_base: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            population_seed: [0x1234_5678, 0x9ABC_DEF0, 0x0FED_CBA9, 0x8765_4321],
            core_seed_base: 0x5EED,
        }
    }
}

/// Region ids written into generator descriptors
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegionsConfig {
    pub synaptic_matrix: u32,
    pub population_table: u32,
    pub direct_matrix: u32,
    pub connectivity_bitfield: u32,
    pub generator: u32,
    pub structural: Option<u32>,
}

impl Default for RegionsConfig {
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

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_to_file: bool,
    pub log_dir: PathBuf,
    /// Run folders older than this many days are removed
    pub retention_days: u64,
    /// Run folders kept in `log_dir`
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_dir: PathBuf::from("logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
