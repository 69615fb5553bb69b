// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device memory access
//!
//! The allocator never talks to a transport directly; it goes through a
//! [`MemoryAccessor`]. [`InMemoryAccessor`] keeps one byte vector per core
//! and backs tests and host-side dry runs.

use ahash::AHashMap;
use thiserror::Error;
use tracing::trace;

use crate::types::CoreId;

/// Errors raised by a memory accessor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("core {core}: access to 0x{address:08x}+{length} is outside allocated memory")]
    OutOfRange {
        core: CoreId,
        address: u32,
        length: usize,
    },

    #[error("core {core}: cannot allocate {requested} bytes, {available} bytes free")]
    OutOfMemory {
        core: CoreId,
        requested: usize,
        available: usize,
    },

    #[error("core {core}: transport failure: {reason}")]
    Transport { core: CoreId, reason: String },
}

/// What a block of device memory holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionTag {
    PopulationTable,
    SynapticMatrix,
    DirectMatrix,
    Generator,
}

impl RegionTag {
    pub fn name(&self) -> &'static str {
        match self {
            RegionTag::PopulationTable => "population table",
            RegionTag::SynapticMatrix => "synaptic matrix",
            RegionTag::DirectMatrix => "direct matrix",
            RegionTag::Generator => "connection generator",
        }
    }
}

/// Synchronous access to the memory of each core
pub trait MemoryAccessor {
    fn read(&self, core: CoreId, address: u32, length: usize) -> Result<Vec<u8>, AccessError>;

    fn write(&mut self, core: CoreId, address: u32, bytes: &[u8]) -> Result<(), AccessError>;

    /// Reserve `size` bytes and return the start address
    fn allocate(&mut self, core: CoreId, size: usize, tag: RegionTag) -> Result<u32, AccessError>;
}

#[derive(Debug, Default)]
struct CoreMemory {
    bytes: Vec<u8>,
    regions: Vec<(RegionTag, u32, usize)>,
}

/// Memory accessor backed by host vectors
#[derive(Debug)]
pub struct InMemoryAccessor {
    capacity_per_core: usize,
    cores: AHashMap<CoreId, CoreMemory>,
}

/// Allocations start on this boundary
const ALLOCATION_ALIGNMENT: usize = 16;

impl InMemoryAccessor {
    pub fn new(capacity_per_core: usize) -> Self {
        Self {
            capacity_per_core,
            cores: AHashMap::new(),
        }
    }

    /// Bytes allocated so far on `core`
    pub fn used(&self, core: CoreId) -> usize {
        self.cores.get(&core).map_or(0, |memory| memory.bytes.len())
    }

    /// Regions allocated on `core`, in allocation order
    pub fn regions(&self, core: CoreId) -> Vec<(RegionTag, u32, usize)> {
        self.cores
            .get(&core)
            .map(|memory| memory.regions.clone())
            .unwrap_or_default()
    }

    fn checked_range(
        &self,
        core: CoreId,
        address: u32,
        length: usize,
    ) -> Result<std::ops::Range<usize>, AccessError> {
        let out_of_range = AccessError::OutOfRange {
            core,
            address,
            length,
        };
        let used = self.used(core);
        let start = address as usize;
        match start.checked_add(length) {
            Some(end) if end <= used => Ok(start..end),
            _ => Err(out_of_range),
        }
    }
}

impl MemoryAccessor for InMemoryAccessor {
    fn read(&self, core: CoreId, address: u32, length: usize) -> Result<Vec<u8>, AccessError> {
        let range = self.checked_range(core, address, length)?;
        trace!(target: "neuromap-connectivity", "read {} bytes from core {} at 0x{:08x}", length, core, address);
        Ok(self
            .cores
            .get(&core)
            .map(|memory| memory.bytes[range].to_vec())
            .unwrap_or_default())
    }

    fn write(&mut self, core: CoreId, address: u32, bytes: &[u8]) -> Result<(), AccessError> {
        let range = self.checked_range(core, address, bytes.len())?;
        trace!(target: "neuromap-connectivity", "write {} bytes to core {} at 0x{:08x}", bytes.len(), core, address);
        if let Some(memory) = self.cores.get_mut(&core) {
            memory.bytes[range].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn allocate(&mut self, core: CoreId, size: usize, tag: RegionTag) -> Result<u32, AccessError> {
        let capacity = self.capacity_per_core;
        let memory = self.cores.entry(core).or_default();
        let start = memory.bytes.len().next_multiple_of(ALLOCATION_ALIGNMENT);
        let available = capacity.saturating_sub(start);
        if size > available || start > u32::MAX as usize {
            return Err(AccessError::OutOfMemory {
                core,
                requested: size,
                available,
            });
        }
        memory.bytes.resize(start + size, 0);
        memory.regions.push((tag, start as u32, size));
        Ok(start as u32)
    }
}
