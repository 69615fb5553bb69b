// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Neuromap Connectivity
//!
//! Build-time connectivity data for neuromorphic cores.
//!
//! ## Pieces
//! - **Population table**: key to row lookup, packed exactly as the firmware reads it
//! - **Row codec**: fixed-width synaptic rows with delay-stage splitting
//! - **Matrix allocator**: reserves, writes and reads back the matrices of one core
//! - **Generator descriptors**: compact per-matrix records for on-device expansion
//!
//! One [`MatrixAllocator`] builds one target core. Cores are independent, so a
//! caller can build many of them in parallel.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod connector;
pub mod error;
pub mod generator;
pub mod matrix;
pub mod param;
pub mod population_table;
pub mod row;
pub mod types;

pub use connector::{Connector, DelayTiming, ListConnection};
pub use error::{BuildError, BuildResult, DecodeError};
pub use generator::{GeneratorDescriptor, GeneratorHeader, GeneratorRecord};
pub use matrix::{
    AccessError, CoreContext, CoreSynapticImage, DelayRouting, InMemoryAccessor,
    IncomingProjection, MatrixAllocator, MemoryAccessor, ProjectionAllocation, RegionAddresses,
    RegionIds, SourceCore, SourcePopulation, StructuralConfig, SynapseDynamics, SynapseInfo,
    WriteStrategy,
};
pub use param::ParamGenerator;
pub use population_table::{PopulationIndex, PopulationTableImage};
pub use row::{MaxRowInfo, PlasticLayout, RowCodec, RowFormat, SynapseWordLayout};
pub use types::{Connection, CoreId, KeyAndMask, ProjectionId, Slice};
