// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # neuromap
//!
//! Build-time synaptic connectivity for neuromorphic cores: the population
//! table each core searches on every incoming spike, the synaptic matrices it
//! points into, and the descriptors that let the device expand matrices itself.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! neuromap = "0.1"  # Default: parallel core builds
//! ```
//!
//! ## Feature Flags
//!
//! - **`parallel`** (default): [`build_cores`] runs on the rayon thread pool
//! - **`serde`**: serde derives on connectivity inputs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use neuromap::prelude::*;
//! use neuromap::{build_cores, context_from_config};
//!
//! let config = neuromap::config::load_config(None, None)?;
//! let context = context_from_config(&config, CoreId::new(0, 0, 1), Slice::new(0, 256), 256)?;
//! let projections: Vec<IncomingProjection> = Vec::new();
//!
//! let built = build_cores(vec![(context, projections)])?;
//! let mut device = InMemoryAccessor::new(config.memory.core_capacity_bytes);
//! for core in &built {
//!     core.image.load(&mut device)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: neuromap-config, neuromap-observability    │
//! │  (TOML settings, logging setup)                         │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Core: neuromap-connectivity                            │
//! │  (population table, row codec, matrices, generators)    │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Driver: neuromap                                       │
//! │  (config to core context, multi-core builds)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

use tracing::{debug, info};

pub use neuromap_config as config;
pub use neuromap_connectivity as connectivity;
pub use neuromap_observability as observability;

use neuromap_config::{validate_config, ConfigError, NeuromapConfig};
use neuromap_connectivity::{
    BuildError, CoreContext, CoreId, CoreSynapticImage, IncomingProjection, MatrixAllocator,
    PlasticLayout, RegionIds, RowFormat, Slice, SynapseWordLayout,
};
use neuromap_observability::LoggingOptions;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use neuromap_connectivity::{
        BuildError, BuildResult, Connection, Connector, CoreContext, CoreId, CoreSynapticImage,
        DelayRouting, InMemoryAccessor, IncomingProjection, KeyAndMask, MatrixAllocator,
        MemoryAccessor, ParamGenerator, ProjectionId, RegionAddresses, RowFormat, Slice,
        SourceCore, SourcePopulation, SynapseDynamics, SynapseInfo, WriteStrategy,
    };
}

/// Errors of the config-driven entry points
#[derive(Debug, thiserror::Error)]
pub enum NeuromapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Per-core seed mixed from the configured base and the core's coordinates
pub fn core_seed(base: u32, core: CoreId) -> [u32; 4] {
    let coordinates = (u32::from(core.x) << 16) | (u32::from(core.y) << 8) | u32::from(core.p);
    let mixed = coordinates.wrapping_mul(0x9E37_79B9);
    [
        base ^ mixed,
        base.rotate_left(8) ^ coordinates,
        base.rotate_left(16) ^ mixed.rotate_left(13),
        base.rotate_left(24).wrapping_add(coordinates),
    ]
}

/// Build context of one target core from a validated configuration
///
/// # Errors
///
/// `NeuromapError::Config` if the configuration does not validate,
/// `NeuromapError::Build` if the post slice lies outside the population.
pub fn context_from_config(
    config: &NeuromapConfig,
    core: CoreId,
    post_slice: Slice,
    n_post_atoms: u32,
) -> Result<CoreContext, NeuromapError> {
    validate_config(config)?;
    if post_slice.end() > n_post_atoms {
        return Err(BuildError::Configuration(format!(
            "post slice {} of core {} lies outside {} atoms",
            post_slice, core, n_post_atoms
        ))
        .into());
    }

    let synapse = &config.synapse;
    let word_layout =
        SynapseWordLayout::new(synapse.n_index_bits, synapse.n_type_bits, synapse.n_delay_bits)?;
    let regions = RegionIds {
        synaptic_matrix: config.regions.synaptic_matrix,
        population_table: config.regions.population_table,
        direct_matrix: config.regions.direct_matrix,
        connectivity_bitfield: config.regions.connectivity_bitfield,
        generator: config.regions.generator,
        structural: config.regions.structural,
    };

    Ok(CoreContext {
        core,
        post_slice,
        n_post_atoms,
        word_layout,
        weight_scales: synapse.weight_scales.clone(),
        ticks_per_ms: config.timing.ticks_per_ms,
        max_delay_per_stage: config.timing.max_delay_per_stage,
        synaptic_budget: config.memory.synaptic_budget_bytes,
        direct_budget: config.memory.direct_budget_bytes,
        n_synapse_cores: config.memory.n_synapse_cores,
        regions,
        generation_enabled: config.generation.enabled,
        population_seed: config.generation.population_seed,
        core_seed: core_seed(config.generation.core_seed_base, core),
    })
}

/// Plastic row format described by the `[synapse]` section
pub fn plastic_format(config: &NeuromapConfig) -> Result<RowFormat, NeuromapError> {
    let layout = PlasticLayout::new(
        config.synapse.plastic_header_words,
        config.synapse.plastic_half_words_per_synapse,
    )?;
    Ok(RowFormat::Plastic(layout))
}

/// Logging options described by the `[logging]` section
pub fn logging_options(config: &NeuromapConfig) -> LoggingOptions {
    LoggingOptions {
        level: config.logging.level.clone(),
        log_to_file: config.logging.log_to_file,
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
    }
}

/// One finished core: its allocator (for readback) and its region images
#[derive(Debug)]
pub struct BuiltCore {
    pub allocator: MatrixAllocator,
    pub image: CoreSynapticImage,
}

fn build_core(
    context: CoreContext,
    projections: Vec<IncomingProjection>,
) -> Result<BuiltCore, BuildError> {
    let core = context.core;
    debug!(target: "neuromap", "Building core {} with {} projections", core, projections.len());
    let mut allocator = MatrixAllocator::new(context)?;
    let image = allocator.build(&projections)?;
    Ok(BuiltCore { allocator, image })
}

/// Build every core, in input order
///
/// Cores are independent; with the `parallel` feature they are built on the
/// rayon thread pool. The first failing core aborts the whole placement.
pub fn build_cores(
    cores: Vec<(CoreContext, Vec<IncomingProjection>)>,
) -> Result<Vec<BuiltCore>, BuildError> {
    let n_cores = cores.len();

    #[cfg(feature = "parallel")]
    let built: Result<Vec<BuiltCore>, BuildError> = {
        use rayon::prelude::*;
        cores
            .into_par_iter()
            .map(|(context, projections)| build_core(context, projections))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let built: Result<Vec<BuiltCore>, BuildError> = cores
        .into_iter()
        .map(|(context, projections)| build_core(context, projections))
        .collect();

    let built = built?;
    let total_bytes: usize = built.iter().map(|core| core.image.total_bytes()).sum();
    info!(target: "neuromap", "Built {} cores, {} bytes of connectivity data", n_cores, total_bytes);
    Ok(built)
}
