// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synaptic matrix allocation, writing and readback for one target core

mod accessor;
mod allocator;
mod cache;
mod projection;
mod routing;

pub use accessor::{AccessError, InMemoryAccessor, MemoryAccessor, RegionTag};
pub use allocator::{
    CoreSynapticImage, MatrixAllocator, MatrixRegion, PartitionAllocation, ProjectionAllocation,
    RegionAddresses, RowBlock, WriteStrategy,
};
pub use cache::{ConnectionCache, Partition};
pub use projection::{
    CoreContext, DelayRouting, IncomingProjection, RegionIds, SourceCore, SourcePopulation,
    StructuralConfig, SynapseDynamics, SynapseInfo,
};
pub use routing::{application_keys, detect_granularity, ApplicationKeys, Granularity};
