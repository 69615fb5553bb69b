// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synaptic matrix allocation for one target core
//!
//! Projections are reserved in registration order. Each reservation aligns
//! the region cursor, appends population table records and grows the
//! host-side region images; writing then fills the reserved rows (or adds a
//! generator record) and reading decodes them back from device memory.

use ahash::AHashMap;
use tracing::{debug, info, warn};

use super::accessor::{MemoryAccessor, RegionTag};
use super::cache::{ConnectionCache, Partition};
use super::projection::{CoreContext, IncomingProjection, SourcePopulation, SynapseInfo};
use super::routing::{detect_granularity, ApplicationKeys, Granularity};
use crate::error::{BuildError, BuildResult};
use crate::generator::{GeneratorDescriptor, GeneratorHeader, GeneratorRecord};
use crate::population_table::{IncomingEdgeShape, PopulationIndex};
use crate::row::{
    delay_to_ticks, max_row_sizing, n_delay_stages, MaxConnections, MaxRowInfo, RowFormat,
    BYTES_PER_WORD,
};
use crate::types::{Connection, CoreId, KeyAndMask, ProjectionId, Slice};

/// How the rows of a projection reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Rows are encoded on the host
    HostExpanded,
    /// One synaptic word per source neuron in the direct region
    Direct,
    /// Rows are expanded by the device from a generator record
    Generated,
}

/// Region a partition lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixRegion {
    Synaptic,
    Direct,
}

impl MatrixRegion {
    fn name(&self) -> &'static str {
        match self {
            MatrixRegion::Synaptic => RegionTag::SynapticMatrix.name(),
            MatrixRegion::Direct => RegionTag::DirectMatrix.name(),
        }
    }
}

/// Rows of one source core inside a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBlock {
    pub core_index: usize,
    pub pre_slice: Slice,
    /// Byte offset from the start of the region
    pub offset: usize,
}

/// One population table record and the rows behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAllocation {
    pub key_and_mask: KeyAndMask,
    /// Position of the record within its entry
    pub position: usize,
    pub region: MatrixRegion,
    /// Start offset, or `None` for a placeholder record
    pub base: Option<usize>,
    pub size: usize,
    pub rows: Vec<RowBlock>,
}

impl PartitionAllocation {
    fn block_for(&self, core_index: usize) -> Option<&RowBlock> {
        self.rows.iter().find(|block| block.core_index == core_index)
    }
}

/// Result of reserving one projection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionAllocation {
    pub projection: ProjectionId,
    pub strategy: WriteStrategy,
    pub format: RowFormat,
    pub max_row_info: MaxRowInfo,
    pub n_delay_stages: u32,
    pub is_application: bool,
    pub max_atoms_per_core: u32,
    /// Source cores that can connect to this core, with their slices
    pub source_cores: Vec<(usize, Slice)>,
    pub undelayed: Vec<PartitionAllocation>,
    pub delayed: Vec<PartitionAllocation>,
}

/// Device addresses of the regions of one core after loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionAddresses {
    pub population_table: u32,
    pub synaptic_matrix: u32,
    pub direct_matrix: u32,
    pub generator: u32,
}

/// Everything built for one core, ready to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSynapticImage {
    pub core: CoreId,
    pub population_table: Vec<u8>,
    pub synaptic_matrix: Vec<u8>,
    pub direct_matrix: Vec<u8>,
    pub generator: Vec<u8>,
}

impl CoreSynapticImage {
    /// Allocate and write every region through `accessor`
    pub fn load<A: MemoryAccessor + ?Sized>(&self, accessor: &mut A) -> BuildResult<RegionAddresses> {
        Ok(RegionAddresses {
            population_table: load_region(
                accessor,
                self.core,
                RegionTag::PopulationTable,
                &self.population_table,
            )?,
            synaptic_matrix: load_region(
                accessor,
                self.core,
                RegionTag::SynapticMatrix,
                &self.synaptic_matrix,
            )?,
            direct_matrix: load_region(
                accessor,
                self.core,
                RegionTag::DirectMatrix,
                &self.direct_matrix,
            )?,
            generator: load_region(accessor, self.core, RegionTag::Generator, &self.generator)?,
        })
    }

    pub fn total_bytes(&self) -> usize {
        self.population_table.len()
            + self.synaptic_matrix.len()
            + self.direct_matrix.len()
            + self.generator.len()
    }
}

fn load_region<A: MemoryAccessor + ?Sized>(
    accessor: &mut A,
    core: CoreId,
    tag: RegionTag,
    bytes: &[u8],
) -> BuildResult<u32> {
    let address = accessor.allocate(core, bytes.len(), tag)?;
    if !bytes.is_empty() {
        accessor.write(core, address, bytes)?;
    }
    debug!(
        target: "neuromap-connectivity",
        "Loaded {} bytes of {} on core {} at 0x{:08x}",
        bytes.len(),
        tag.name(),
        core,
        address
    );
    Ok(address)
}

/// Builds the population table, matrices and generator data of one core
#[derive(Debug)]
pub struct MatrixAllocator {
    context: CoreContext,
    index: PopulationIndex,
    matrix: Vec<u8>,
    direct: Vec<u8>,
    generator: GeneratorDescriptor,
    granularity: AHashMap<String, Granularity>,
    allocations: Vec<ProjectionAllocation>,
    by_id: AHashMap<ProjectionId, usize>,
    written: Vec<bool>,
    cache: ConnectionCache,
}

impl MatrixAllocator {
    pub fn new(context: CoreContext) -> BuildResult<Self> {
        // Validates the timing and weight scales
        context.codec(RowFormat::Static)?;
        let mut index = PopulationIndex::new();
        index.initialise();
        let generator = GeneratorDescriptor::new(GeneratorHeader {
            regions: context.regions,
            post_slice: context.post_slice,
            ticks_per_ms: context.ticks_per_ms,
            population_seed: context.population_seed,
            core_seed: context.core_seed,
            weight_scales: context.weight_scales.clone(),
        });
        Ok(Self {
            context,
            index,
            matrix: Vec::new(),
            direct: Vec::new(),
            generator,
            granularity: AHashMap::new(),
            allocations: Vec::new(),
            by_id: AHashMap::new(),
            written: Vec::new(),
            cache: ConnectionCache::new(),
        })
    }

    pub fn context(&self) -> &CoreContext {
        &self.context
    }

    pub fn allocations(&self) -> &[ProjectionAllocation] {
        &self.allocations
    }

    pub fn allocation(&self, projection: ProjectionId) -> Option<&ProjectionAllocation> {
        self.by_id.get(&projection).map(|&i| &self.allocations[i])
    }

    /// Bytes of the synaptic matrix region reserved so far
    pub fn synaptic_bytes(&self) -> usize {
        self.matrix.len()
    }

    pub fn direct_bytes(&self) -> usize {
        self.direct.len()
    }

    /// Connection lists held in the readback cache
    pub fn cached_partitions(&self) -> usize {
        self.cache.len()
    }

    /// Upper bound on the population table size for `projections`
    pub fn population_table_bound(projections: &[IncomingProjection]) -> usize {
        PopulationIndex::required_size_bytes(projections.iter().map(|p| IncomingEdgeShape {
            n_source_cores: p.source.cores.len(),
            has_delays: p.source.delay_routing.is_some(),
        }))
    }

    /// Reserve, then write, every projection in order and finish the core
    pub fn build(&mut self, projections: &[IncomingProjection]) -> BuildResult<CoreSynapticImage> {
        for projection in projections {
            self.reserve(projection)?;
        }
        for projection in projections {
            self.write(projection)?;
        }
        self.finish()
    }

    /// Whether `projection` would be stored as single-word direct rows
    pub fn is_direct(&self, projection: &IncomingProjection) -> bool {
        let info = &projection.synapse_info;
        if !self.direct_eligible(info, &projection.source) {
            return false;
        }
        let post = self.context.post_slice;
        let mut cursor = self.direct.len();
        for core in &projection.source.cores {
            if !info.connector.could_connect(core.slice, post) {
                continue;
            }
            cursor = cursor.next_multiple_of(crate::population_table::ADDRESS_SCALE as usize)
                + core.slice.n_atoms as usize * BYTES_PER_WORD as usize;
        }
        cursor <= self.context.direct_budget
    }

    fn direct_eligible(&self, info: &SynapseInfo, source: &SourcePopulation) -> bool {
        let machine_keys = self
            .granularity
            .get(&source.label)
            .map_or(true, |granularity| !granularity.is_application());
        info.connector.is_one_to_one()
            && !info.dynamics.format.is_plastic()
            && source.delay_routing.is_none()
            && !self.is_generated(info)
            && machine_keys
    }

    fn is_generated(&self, info: &SynapseInfo) -> bool {
        self.context.generation_enabled
            && info.connector.is_generatable()
            && info.dynamics.supports_generation
            && info.dynamics.structural.is_none()
    }

    /// Reserve matrix space and population table records for `projection`
    pub fn reserve(&mut self, projection: &IncomingProjection) -> BuildResult<&ProjectionAllocation> {
        if self.by_id.contains_key(&projection.id) {
            return Err(BuildError::config(format!(
                "{} is already reserved on core {}",
                projection.id, self.context.core
            )));
        }
        let info = &projection.synapse_info;
        let source = projection.source.as_ref();
        self.check_projection(projection)?;

        let timing = self.context.delay_timing();
        let max_delay_ticks =
            delay_to_ticks(info.connector.max_delay_ms(&info.delays)?, timing.ticks_per_ms);
        let needed_stages = n_delay_stages(max_delay_ticks, timing.max_delay_per_stage);
        let routed_stages = source.n_delay_stages();
        if needed_stages > routed_stages {
            return Err(BuildError::config(format!(
                "{} from {} needs {} delay stages but the source routes {}",
                projection.id, source.label, needed_stages, routed_stages
            )));
        }

        let post = self.context.post_slice;
        let source_cores: Vec<(usize, Slice)> = source
            .cores
            .iter()
            .enumerate()
            .filter(|(_, core)| info.connector.could_connect(core.slice, post))
            .map(|(i, core)| (i, core.slice))
            .collect();

        let mut max_per_source = MaxConnections::default();
        for (_, slice) in &source_cores {
            let core_max =
                info.connector
                    .max_connections_per_source(*slice, post, &info.delays, timing)?;
            max_per_source.undelayed = max_per_source.undelayed.max(core_max.undelayed);
            max_per_source.delayed = max_per_source.delayed.max(core_max.delayed);
        }
        let max_row_info = max_row_sizing(
            info.dynamics.format,
            max_per_source,
            routed_stages,
            info.dynamics.pad_to_length(),
        )?;

        let strategy = if self.is_direct(projection) {
            WriteStrategy::Direct
        } else if self.is_generated(info) {
            WriteStrategy::Generated
        } else {
            WriteStrategy::HostExpanded
        };

        // The first projection from a source decides its granularity
        let granularity = match self.granularity.get(&source.label) {
            Some(granularity) => granularity.clone(),
            None => {
                let granularity = if strategy == WriteStrategy::Direct {
                    Granularity::Machine
                } else {
                    detect_granularity(source)
                };
                self.granularity
                    .insert(source.label.clone(), granularity.clone());
                granularity
            }
        };

        let mut undelayed = Vec::new();
        let mut delayed = Vec::new();
        if !source_cores.is_empty() {
            match &granularity {
                Granularity::Application {
                    undelayed: undelayed_keys,
                    delayed: delayed_keys,
                } => {
                    let u = self.reserve_application(
                        undelayed_keys,
                        source,
                        &source_cores,
                        &max_row_info,
                        false,
                    )?;
                    if let Some(keys) = delayed_keys {
                        let d = self.reserve_application(
                            keys,
                            source,
                            &source_cores,
                            &max_row_info,
                            true,
                        )?;
                        check_parity(&u, &d)?;
                        delayed.push(d);
                    }
                    undelayed.push(u);
                }
                Granularity::Machine => {
                    for &(core_index, slice) in &source_cores {
                        let key_and_mask = source.cores[core_index].key_and_mask;
                        let u = if strategy == WriteStrategy::Direct {
                            self.reserve_direct(key_and_mask, core_index, slice)?
                        } else {
                            self.reserve_machine(
                                key_and_mask,
                                core_index,
                                slice,
                                &max_row_info,
                                routed_stages,
                                false,
                            )?
                        };
                        if let Some(routing) = &source.delay_routing {
                            let d = self.reserve_machine(
                                routing.cores[core_index],
                                core_index,
                                slice,
                                &max_row_info,
                                routed_stages,
                                true,
                            )?;
                            check_parity(&u, &d)?;
                            delayed.push(d);
                        }
                        undelayed.push(u);
                    }
                }
            }
        }

        debug!(
            target: "neuromap-connectivity",
            "Core {}: reserved {} from {} as {:?} ({} matrices, {} delay stages, {} synaptic bytes used)",
            self.context.core,
            projection.id,
            source.label,
            strategy,
            undelayed.len() + delayed.len(),
            routed_stages,
            self.matrix.len()
        );

        let allocation = ProjectionAllocation {
            projection: projection.id,
            strategy,
            format: info.dynamics.format,
            max_row_info,
            n_delay_stages: routed_stages,
            is_application: granularity.is_application(),
            max_atoms_per_core: source.max_atoms_per_core,
            source_cores,
            undelayed,
            delayed,
        };
        let index = self.allocations.len();
        self.allocations.push(allocation);
        self.written.push(false);
        self.by_id.insert(projection.id, index);
        Ok(&self.allocations[index])
    }

    fn check_projection(&self, projection: &IncomingProjection) -> BuildResult<()> {
        let info = &projection.synapse_info;
        projection.source.validate()?;
        info.connector.validate(self.context.n_post_atoms)?;
        info.weights.validate()?;
        info.delays.validate()?;
        if info.dynamics.structural.is_some() && self.context.n_synapse_cores > 1 {
            return Err(BuildError::config(format!(
                "{} uses structural plasticity, which needs a single synapse core (core {} has {})",
                projection.id, self.context.core, self.context.n_synapse_cores
            )));
        }
        if usize::from(info.synapse_type) >= self.context.weight_scales.len() {
            return Err(BuildError::config(format!(
                "{} uses synapse type {} but only {} weight scales are configured",
                projection.id,
                info.synapse_type,
                self.context.weight_scales.len()
            )));
        }
        Ok(())
    }

    /// Advance a region cursor to the next aligned address and claim `size` bytes
    fn claim(&mut self, region: MatrixRegion, size: usize) -> BuildResult<usize> {
        let (image, budget) = match region {
            MatrixRegion::Synaptic => (&mut self.matrix, self.context.synaptic_budget),
            MatrixRegion::Direct => (&mut self.direct, self.context.direct_budget),
        };
        let cursor = u32::try_from(image.len()).map_err(|_| {
            BuildError::config(format!("{} region is beyond the address range", region.name()))
        })?;
        let base = PopulationIndex::next_aligned_address(cursor)? as usize;
        let end = base + size;
        if end > budget {
            return Err(BuildError::MemoryOverflow {
                region: region.name(),
                requested: end,
                available: budget,
            });
        }
        image.resize(end, 0);
        Ok(base)
    }

    fn reserve_application(
        &mut self,
        keys: &ApplicationKeys,
        source: &SourcePopulation,
        source_cores: &[(usize, Slice)],
        max_row_info: &MaxRowInfo,
        is_delayed: bool,
    ) -> BuildResult<PartitionAllocation> {
        let max_words = max_row_info.max_words(is_delayed);
        if max_words == 0 {
            let position = self
                .index
                .append_invalid(keys.key_and_mask, Some(keys.split))?;
            return Ok(placeholder(keys.key_and_mask, position));
        }

        let stride = max_row_info.stride_bytes(is_delayed);
        let block_bytes = keys.split.n_neurons as usize * stride;
        let size = source.cores.len() * block_bytes;
        let base = self.claim(MatrixRegion::Synaptic, size)?;
        let position = self.index.append_application_record(
            keys.key_and_mask,
            base as u32,
            max_words,
            keys.split,
        )?;
        Ok(PartitionAllocation {
            key_and_mask: keys.key_and_mask,
            position,
            region: MatrixRegion::Synaptic,
            base: Some(base),
            size,
            rows: source_cores
                .iter()
                .map(|&(core_index, pre_slice)| RowBlock {
                    core_index,
                    pre_slice,
                    offset: base + core_index * block_bytes,
                })
                .collect(),
        })
    }

    fn reserve_machine(
        &mut self,
        key_and_mask: KeyAndMask,
        core_index: usize,
        pre_slice: Slice,
        max_row_info: &MaxRowInfo,
        n_delay_stages: u32,
        is_delayed: bool,
    ) -> BuildResult<PartitionAllocation> {
        let max_words = max_row_info.max_words(is_delayed);
        if max_words == 0 {
            let position = self.index.append_invalid(key_and_mask, None)?;
            return Ok(placeholder(key_and_mask, position));
        }

        let n_rows = if is_delayed {
            pre_slice.n_atoms as usize * n_delay_stages as usize
        } else {
            pre_slice.n_atoms as usize
        };
        let size = n_rows * max_row_info.stride_bytes(is_delayed);
        let base = self.claim(MatrixRegion::Synaptic, size)?;
        let position = self
            .index
            .append_machine_record(key_and_mask, base as u32, max_words, false)?;
        Ok(PartitionAllocation {
            key_and_mask,
            position,
            region: MatrixRegion::Synaptic,
            base: Some(base),
            size,
            rows: vec![RowBlock {
                core_index,
                pre_slice,
                offset: base,
            }],
        })
    }

    fn reserve_direct(
        &mut self,
        key_and_mask: KeyAndMask,
        core_index: usize,
        pre_slice: Slice,
    ) -> BuildResult<PartitionAllocation> {
        let size = pre_slice.n_atoms as usize * BYTES_PER_WORD as usize;
        let base = self.claim(MatrixRegion::Direct, size)?;
        let position = self
            .index
            .append_machine_record(key_and_mask, base as u32, 1, true)?;
        Ok(PartitionAllocation {
            key_and_mask,
            position,
            region: MatrixRegion::Direct,
            base: Some(base),
            size,
            rows: vec![RowBlock {
                core_index,
                pre_slice,
                offset: base,
            }],
        })
    }

    fn allocation_index(&self, projection: ProjectionId) -> BuildResult<usize> {
        self.by_id.get(&projection).copied().ok_or_else(|| {
            BuildError::config(format!(
                "{} has not been reserved on core {}",
                projection, self.context.core
            ))
        })
    }

    /// Fill the rows of a reserved projection, or describe them for the device
    pub fn write(&mut self, projection: &IncomingProjection) -> BuildResult<()> {
        let index = self.allocation_index(projection.id)?;
        let allocation = self.allocations[index].clone();
        let info = &projection.synapse_info;

        if allocation.strategy == WriteStrategy::Generated {
            self.push_generator_records(&allocation, info)?;
        } else {
            let post = self.context.post_slice;
            for &(core_index, pre_slice) in &allocation.source_cores {
                let connections = info.connector.generate(
                    pre_slice,
                    post,
                    self.context.n_post_atoms,
                    &info.weights,
                    &info.delays,
                    info.synapse_type,
                    info.seed,
                );
                self.write_core_rows(&allocation, core_index, pre_slice, &connections)?;
            }
        }
        self.written[index] = true;
        Ok(())
    }

    /// Write explicit connections of a reserved, host-expanded projection
    ///
    /// Connections whose target is not on this core are ignored.
    pub fn write_connections(
        &mut self,
        projection: ProjectionId,
        connections: &[Connection],
    ) -> BuildResult<()> {
        let index = self.allocation_index(projection)?;
        let allocation = self.allocations[index].clone();
        if allocation.strategy == WriteStrategy::Generated {
            return Err(BuildError::config(format!(
                "{} is generated on the device; its rows cannot be written by the host",
                projection
            )));
        }

        let post = self.context.post_slice;
        let mut per_core: Vec<Vec<Connection>> = vec![Vec::new(); allocation.source_cores.len()];
        for connection in connections.iter().filter(|c| post.contains(c.target)) {
            let slot = allocation
                .source_cores
                .iter()
                .position(|(_, slice)| slice.contains(connection.source))
                .ok_or_else(|| {
                    BuildError::config(format!(
                        "connection {} -> {} of {} has no reserved rows",
                        connection.source, connection.target, projection
                    ))
                })?;
            per_core[slot].push(*connection);
        }
        for (&(core_index, pre_slice), core_connections) in
            allocation.source_cores.iter().zip(&per_core)
        {
            self.write_core_rows(&allocation, core_index, pre_slice, core_connections)?;
        }
        self.written[index] = true;
        Ok(())
    }

    fn write_core_rows(
        &mut self,
        allocation: &ProjectionAllocation,
        core_index: usize,
        pre_slice: Slice,
        connections: &[Connection],
    ) -> BuildResult<()> {
        let codec = self.context.codec(allocation.format)?;
        let post = self.context.post_slice;

        if allocation.strategy == WriteStrategy::Direct {
            let bytes = codec.encode_direct(connections, pre_slice, post)?;
            let block = find_block(&allocation.undelayed, core_index)?;
            return copy_into(&mut self.direct, block.offset, &bytes, MatrixRegion::Direct);
        }

        let encoded = codec.encode(
            connections,
            pre_slice,
            post,
            allocation.n_delay_stages,
            &allocation.max_row_info,
        )?;
        if !encoded.undelayed.is_empty() {
            let block = find_block(&allocation.undelayed, core_index)?;
            copy_into(&mut self.matrix, block.offset, &encoded.undelayed, MatrixRegion::Synaptic)?;
        }
        if !encoded.delayed.is_empty() {
            let block = find_block(&allocation.delayed, core_index)?;
            copy_into(&mut self.matrix, block.offset, &encoded.delayed, MatrixRegion::Synaptic)?;
        }
        Ok(())
    }

    fn push_generator_records(
        &mut self,
        allocation: &ProjectionAllocation,
        info: &SynapseInfo,
    ) -> BuildResult<()> {
        let connector_id = info.connector.generator_id().ok_or_else(|| {
            BuildError::config(format!(
                "{} connector cannot be generated on the device",
                info.connector.name()
            ))
        })?;
        let weight_scale = self
            .context
            .weight_scales
            .get(usize::from(info.synapse_type))
            .copied()
            .ok_or_else(|| {
                BuildError::config(format!("no weight scale for synapse type {}", info.synapse_type))
            })?;

        for &(core_index, pre_slice) in &allocation.source_cores {
            let offset_of = |partitions: &[PartitionAllocation]| {
                partitions
                    .iter()
                    .find_map(|p| p.block_for(core_index))
                    .map(|block| block.offset as u32)
            };
            self.generator.push(GeneratorRecord {
                undelayed_offset: offset_of(&allocation.undelayed),
                delayed_offset: offset_of(&allocation.delayed),
                max_row_info: allocation.max_row_info,
                pre_slice,
                max_atoms_per_core: allocation.max_atoms_per_core,
                n_delay_stages: allocation.n_delay_stages,
                max_delay_per_stage: self.context.max_delay_per_stage,
                synapse_type: info.synapse_type,
                format: allocation.format,
                word_layout: self.context.word_layout,
                connector_id,
                connector_params: info.connector.generator_params(self.context.n_post_atoms),
                weights: info.weights,
                delays: info.delays,
                weight_scale,
                ticks_per_ms: self.context.ticks_per_ms,
            })?;
        }
        Ok(())
    }

    /// Finalise the population table and hand out the region images
    pub fn finish(&mut self) -> BuildResult<CoreSynapticImage> {
        let unwritten = self.written.iter().filter(|written| !**written).count();
        if unwritten > 0 {
            warn!(
                target: "neuromap-connectivity",
                "Core {}: {} reserved projections were never written; their rows stay empty",
                self.context.core,
                unwritten
            );
        }

        let image = CoreSynapticImage {
            core: self.context.core,
            population_table: self.index.finish()?,
            synaptic_matrix: self.matrix.clone(),
            direct_matrix: self.direct.clone(),
            generator: self.generator.to_bytes(),
        };
        info!(
            target: "neuromap-connectivity",
            "Core {}: {} projections, table {} bytes, matrix {} bytes, direct {} bytes, generator {} bytes",
            image.core,
            self.allocations.len(),
            image.population_table.len(),
            image.synaptic_matrix.len(),
            image.direct_matrix.len(),
            image.generator.len()
        );
        Ok(image)
    }

    /// Read a projection's connections back from the device
    ///
    /// Each partition is decoded once and cached until [`invalidate`](Self::invalidate).
    pub fn read<A: MemoryAccessor + ?Sized>(
        &mut self,
        projection: ProjectionId,
        regions: &RegionAddresses,
        accessor: &A,
    ) -> BuildResult<Vec<Connection>> {
        let index = self.allocation_index(projection)?;
        let allocation = self.allocations[index].clone();

        let mut connections = Vec::new();
        for partition in [Partition::Undelayed, Partition::Delayed] {
            if let Some(cached) = self.cache.get(projection, partition) {
                connections.extend_from_slice(cached);
                continue;
            }
            let decoded = self.read_partition(&allocation, partition, regions, accessor)?;
            connections.extend_from_slice(&decoded);
            self.cache.insert(projection, partition, decoded);
        }
        Ok(connections)
    }

    fn read_partition<A: MemoryAccessor + ?Sized>(
        &self,
        allocation: &ProjectionAllocation,
        partition: Partition,
        regions: &RegionAddresses,
        accessor: &A,
    ) -> BuildResult<Vec<Connection>> {
        let is_delayed = partition == Partition::Delayed;
        let partitions = if is_delayed {
            &allocation.delayed
        } else {
            &allocation.undelayed
        };
        let codec = self.context.codec(allocation.format)?;
        let post = self.context.post_slice;
        let core = self.context.core;

        let mut connections = Vec::new();
        for part in partitions.iter().filter(|p| p.base.is_some()) {
            for block in &part.rows {
                if part.region == MatrixRegion::Direct {
                    let length = block.pre_slice.n_atoms as usize * BYTES_PER_WORD as usize;
                    let address = device_address(regions.direct_matrix, block.offset)?;
                    let raw = accessor.read(core, address, length)?;
                    connections.extend(codec.decode_direct(&raw, block.pre_slice, post)?);
                    continue;
                }
                let stride = allocation.max_row_info.stride_bytes(is_delayed);
                let n_rows = if is_delayed {
                    block.pre_slice.n_atoms as usize * allocation.n_delay_stages as usize
                } else {
                    block.pre_slice.n_atoms as usize
                };
                let address = device_address(regions.synaptic_matrix, block.offset)?;
                let raw = accessor.read(core, address, n_rows * stride)?;
                connections.extend(codec.decode(
                    &raw,
                    stride,
                    block.pre_slice,
                    post,
                    allocation.n_delay_stages,
                    is_delayed,
                )?);
            }
        }
        Ok(connections)
    }

    /// Drop every cached readback; call between runs
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}

fn placeholder(key_and_mask: KeyAndMask, position: usize) -> PartitionAllocation {
    PartitionAllocation {
        key_and_mask,
        position,
        region: MatrixRegion::Synaptic,
        base: None,
        size: 0,
        rows: Vec::new(),
    }
}

/// Undelayed and delayed records of one source must sit at the same position
fn check_parity(
    undelayed: &PartitionAllocation,
    delayed: &PartitionAllocation,
) -> BuildResult<()> {
    if undelayed.position != delayed.position {
        return Err(BuildError::config(format!(
            "undelayed record for {} is at position {} but delayed record for {} is at {}",
            undelayed.key_and_mask, undelayed.position, delayed.key_and_mask, delayed.position
        )));
    }
    Ok(())
}

fn find_block(partitions: &[PartitionAllocation], core_index: usize) -> BuildResult<&RowBlock> {
    partitions
        .iter()
        .find_map(|p| p.block_for(core_index))
        .ok_or_else(|| {
            BuildError::config(format!("no rows reserved for source core {}", core_index))
        })
}

fn copy_into(
    image: &mut [u8],
    offset: usize,
    bytes: &[u8],
    region: MatrixRegion,
) -> BuildResult<()> {
    let available = image.len();
    let target = image
        .get_mut(offset..offset + bytes.len())
        .ok_or(BuildError::MemoryOverflow {
            region: region.name(),
            requested: offset + bytes.len(),
            available,
        })?;
    target.copy_from_slice(bytes);
    Ok(())
}

fn device_address(base: u32, offset: usize) -> BuildResult<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| BuildError::config(format!("offset {} overflows the address space", offset)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connector::Connector;
    use crate::matrix::{
        DelayRouting, InMemoryAccessor, RegionIds, SourceCore, StructuralConfig, SynapseDynamics,
    };
    use crate::param::ParamGenerator;
    use crate::population_table::PopulationTableImage;
    use crate::row::SynapseWordLayout;

    fn context() -> CoreContext {
        CoreContext {
            core: CoreId::new(0, 0, 1),
            post_slice: Slice::new(0, 100),
            n_post_atoms: 100,
            word_layout: SynapseWordLayout::new(8, 1, 4).unwrap(),
            weight_scales: vec![256.0, 256.0],
            ticks_per_ms: 1.0,
            max_delay_per_stage: 15,
            synaptic_budget: 1 << 20,
            direct_budget: 1024,
            n_synapse_cores: 1,
            regions: RegionIds::default(),
            generation_enabled: true,
            population_seed: [1, 2, 3, 4],
            core_seed: [5, 6, 7, 8],
        }
    }

    /// Two cores of ten atoms; `shift` 8 gives uniform keys, 12 scattered ones
    fn source(label: &str, shift: u32, routing: Option<u32>) -> Arc<SourcePopulation> {
        let cores = (0..2)
            .map(|i| SourceCore {
                slice: Slice::new(i * 10, 10),
                key_and_mask: KeyAndMask::new(0x10_0000 | (i << shift), 0xFFFF_FF00),
            })
            .collect();
        let delay_routing = routing.map(|n_stages| DelayRouting {
            n_stages,
            cores: (0..2)
                .map(|i| KeyAndMask::new(0x20_0000 | (i << shift), 0xFFFF_FF00))
                .collect(),
        });
        Arc::new(SourcePopulation {
            label: label.to_string(),
            n_atoms: 20,
            max_atoms_per_core: 10,
            cores,
            delay_routing,
        })
    }

    fn host_dynamics() -> SynapseDynamics {
        SynapseDynamics {
            supports_generation: false,
            ..SynapseDynamics::static_synapses()
        }
    }

    fn projection(
        id: u32,
        source: Arc<SourcePopulation>,
        connector: Connector,
        dynamics: SynapseDynamics,
        delays: ParamGenerator,
    ) -> IncomingProjection {
        IncomingProjection {
            id: ProjectionId(id),
            source,
            synapse_info: SynapseInfo {
                connector,
                dynamics,
                weights: ParamGenerator::Constant(0.5),
                delays,
                synapse_type: 0,
                seed: 7,
            },
        }
    }

    fn sorted(mut connections: Vec<Connection>) -> Vec<Connection> {
        connections.sort_by_key(|c| (c.source, c.target));
        connections
    }

    fn expected(projection: &IncomingProjection, context: &CoreContext) -> Vec<Connection> {
        let info = &projection.synapse_info;
        let connections = projection
            .source
            .cores
            .iter()
            .flat_map(|core| {
                info.connector.generate(
                    core.slice,
                    context.post_slice,
                    context.n_post_atoms,
                    &info.weights,
                    &info.delays,
                    info.synapse_type,
                    info.seed,
                )
            })
            .map(|mut c: Connection| {
                // Delays come back whole ticks
                c.delay =
                    f64::from(delay_to_ticks(c.delay, context.ticks_per_ms)) / context.ticks_per_ms;
                c
            })
            .collect();
        sorted(connections)
    }

    #[test]
    fn test_host_expanded_matrix_reads_back() {
        let all_to_all = projection(
            1,
            source("scattered", 12, None),
            Connector::AllToAll,
            host_dynamics(),
            ParamGenerator::Constant(2.0),
        );
        let mut allocator = MatrixAllocator::new(context()).unwrap();
        let allocation = allocator.reserve(&all_to_all).unwrap();
        assert_eq!(allocation.strategy, WriteStrategy::HostExpanded);
        assert!(!allocation.is_application);
        assert_eq!(allocation.undelayed.len(), 2);
        assert!(allocation.delayed.is_empty());

        allocator.write(&all_to_all).unwrap();
        let image = allocator.finish().unwrap();

        let mut memory = InMemoryAccessor::new(1 << 22);
        let regions = image.load(&mut memory).unwrap();
        let read = allocator.read(ProjectionId(1), &regions, &memory).unwrap();
        assert_eq!(read.len(), 20 * 100);
        assert_eq!(sorted(read), expected(&all_to_all, allocator.context()));
        assert_eq!(allocator.cached_partitions(), 2);

        allocator.invalidate();
        assert_eq!(allocator.cached_partitions(), 0);

        let table = PopulationTableImage::parse(&image.population_table).unwrap();
        let rows = table.resolve_rows(0x10_1000 | 3);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_length, 100);
        assert!(!rows[0].is_single);
    }

    #[test]
    fn test_one_to_one_goes_direct() {
        let one_to_one = projection(
            2,
            source("direct", 8, None),
            Connector::OneToOne,
            host_dynamics(),
            ParamGenerator::Constant(1.0),
        );
        let mut allocator = MatrixAllocator::new(context()).unwrap();
        assert!(allocator.is_direct(&one_to_one));
        let image = allocator.build(std::slice::from_ref(&one_to_one)).unwrap();

        let allocation = allocator.allocation(ProjectionId(2)).unwrap();
        assert_eq!(allocation.strategy, WriteStrategy::Direct);
        assert!(image.synaptic_matrix.is_empty());
        // Second core starts on the next 16 byte boundary
        assert_eq!(image.direct_matrix.len(), 48 + 40);

        let table = PopulationTableImage::parse(&image.population_table).unwrap();
        let rows = table.resolve_rows(0x10_0100 | 4);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_single);
        assert_eq!(rows[0].address, 48 + 16);

        let mut memory = InMemoryAccessor::new(1 << 16);
        let regions = image.load(&mut memory).unwrap();
        let read = allocator.read(ProjectionId(2), &regions, &memory).unwrap();
        assert_eq!(sorted(read), expected(&one_to_one, allocator.context()));
    }

    #[test]
    fn test_direct_needs_room() {
        let one_to_one = projection(
            3,
            source("tight", 8, None),
            Connector::OneToOne,
            host_dynamics(),
            ParamGenerator::Constant(1.0),
        );
        let mut ctx = context();
        ctx.direct_budget = 64;
        let allocator = MatrixAllocator::new(ctx).unwrap();
        assert!(!allocator.is_direct(&one_to_one));
    }

    #[test]
    fn test_generated_projection_adds_generator_record() {
        let generated = projection(
            4,
            source("gen", 8, None),
            Connector::FixedProbability { p_connect: 0.2 },
            SynapseDynamics::static_synapses(),
            ParamGenerator::Uniform {
                low: 1.0,
                high: 4.0,
            },
        );
        let mut allocator = MatrixAllocator::new(context()).unwrap();
        allocator.reserve(&generated).unwrap();
        assert_eq!(
            allocator.allocation(ProjectionId(4)).map(|a| a.strategy),
            Some(WriteStrategy::Generated)
        );
        assert!(allocator.write_connections(ProjectionId(4), &[]).is_err());

        allocator.write(&generated).unwrap();
        let image = allocator.finish().unwrap();
        assert!(!image.generator.is_empty());
        // Rows stay zeroed until the device expands them
        assert!(image.synaptic_matrix.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_generation_disabled_expands_on_host() {
        let generated = projection(
            4,
            source("gen", 8, None),
            Connector::AllToAll,
            SynapseDynamics::static_synapses(),
            ParamGenerator::Constant(2.0),
        );
        let mut ctx = context();
        ctx.generation_enabled = false;
        let mut allocator = MatrixAllocator::new(ctx).unwrap();
        let image = allocator.build(std::slice::from_ref(&generated)).unwrap();
        assert_eq!(
            allocator.allocation(ProjectionId(4)).map(|a| a.strategy),
            Some(WriteStrategy::HostExpanded)
        );
        assert!(image.generator.is_empty());
        assert!(image.synaptic_matrix.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_application_delayed_records_share_position() {
        let delayed = projection(
            5,
            source("app", 8, Some(2)),
            Connector::AllToAll,
            host_dynamics(),
            ParamGenerator::Uniform {
                low: 1.0,
                high: 30.0,
            },
        );
        let mut allocator = MatrixAllocator::new(context()).unwrap();
        let allocation = allocator.reserve(&delayed).unwrap().clone();
        assert!(allocation.is_application);
        assert_eq!(allocation.n_delay_stages, 2);
        assert_eq!(allocation.undelayed[0].position, allocation.delayed[0].position);
        assert_eq!(allocation.delayed[0].rows.len(), 2);

        allocator.write(&delayed).unwrap();
        let image = allocator.finish().unwrap();
        let mut memory = InMemoryAccessor::new(1 << 22);
        let regions = image.load(&mut memory).unwrap();
        let read = allocator.read(ProjectionId(5), &regions, &memory).unwrap();
        assert_eq!(sorted(read), expected(&delayed, allocator.context()));
    }

    #[test]
    fn test_second_projection_appends_to_entry() {
        let src = source("shared", 12, None);
        let first = projection(
            6,
            src.clone(),
            Connector::AllToAll,
            host_dynamics(),
            ParamGenerator::Constant(1.0),
        );
        let second = projection(
            7,
            src,
            Connector::FixedNumberPost {
                n: 5,
                with_replacement: false,
            },
            host_dynamics(),
            ParamGenerator::Constant(3.0),
        );
        let mut allocator = MatrixAllocator::new(context()).unwrap();
        allocator.reserve(&first).unwrap();
        let positions: Vec<usize> = allocator
            .reserve(&second)
            .unwrap()
            .undelayed
            .iter()
            .map(|p| p.position)
            .collect();
        assert_eq!(positions, vec![1, 1]);
        assert!(allocator.reserve(&second).is_err());
    }

    #[test]
    fn test_configuration_errors() {
        let mut allocator = MatrixAllocator::new(context()).unwrap();

        // Delays beyond one stage with no delay routing
        let long = projection(
            8,
            source("long", 8, None),
            Connector::AllToAll,
            host_dynamics(),
            ParamGenerator::Constant(20.0),
        );
        assert!(matches!(
            allocator.reserve(&long),
            Err(BuildError::Configuration(_))
        ));

        let mut ctx = context();
        ctx.n_synapse_cores = 2;
        let mut shared = MatrixAllocator::new(ctx).unwrap();
        let structural = projection(
            9,
            source("rewired", 8, None),
            Connector::AllToAll,
            SynapseDynamics {
                structural: Some(StructuralConfig { pad_to_length: 32 }),
                ..host_dynamics()
            },
            ParamGenerator::Constant(1.0),
        );
        assert!(matches!(
            shared.reserve(&structural),
            Err(BuildError::Configuration(_))
        ));
    }

    #[test]
    fn test_synaptic_budget_overflow() {
        let mut ctx = context();
        ctx.synaptic_budget = 1024;
        let mut allocator = MatrixAllocator::new(ctx).unwrap();
        let all_to_all = projection(
            10,
            source("big", 12, None),
            Connector::AllToAll,
            host_dynamics(),
            ParamGenerator::Constant(1.0),
        );
        assert!(matches!(
            allocator.reserve(&all_to_all),
            Err(BuildError::MemoryOverflow { .. })
        ));
    }
}
