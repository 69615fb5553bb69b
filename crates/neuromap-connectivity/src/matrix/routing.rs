// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Detection of application-level keys
//!
//! A source can share one population table entry across all its cores when
//! core `i` sends with key `base | (i << shift)` under a common mask. The
//! entry then uses the application mask (the common mask without the core
//! field) plus an extra-info word telling the firmware how to find the core.

use tracing::debug;

use super::projection::{SourceCore, SourcePopulation};
use crate::population_table::{CoreSplit, ExtraInfo, MAX_CORE_MASK};
use crate::types::KeyAndMask;

/// One entry key and split covering every core of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationKeys {
    pub key_and_mask: KeyAndMask,
    pub split: CoreSplit,
}

/// Keys used for a source's entries on one target core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Granularity {
    Application {
        undelayed: ApplicationKeys,
        delayed: Option<ApplicationKeys>,
    },
    Machine,
}

impl Granularity {
    pub fn is_application(&self) -> bool {
        matches!(self, Granularity::Application { .. })
    }
}

/// Application keys for `source`, or `None` when its keys are not uniform
pub fn detect_granularity(source: &SourcePopulation) -> Granularity {
    let undelayed_keys: Vec<KeyAndMask> = source.cores.iter().map(|c| c.key_and_mask).collect();
    let Some(undelayed) =
        application_keys(&source.cores, &undelayed_keys, source.max_atoms_per_core, 1)
    else {
        debug!(
            target: "neuromap-connectivity",
            "source {} keys are not uniform; using machine-level matrices",
            source.label
        );
        return Granularity::Machine;
    };

    let delayed = match &source.delay_routing {
        None => None,
        Some(routing) => {
            match application_keys(
                &source.cores,
                &routing.cores,
                source.max_atoms_per_core,
                routing.n_stages,
            ) {
                Some(keys) => Some(keys),
                None => {
                    debug!(
                        target: "neuromap-connectivity",
                        "source {} delay keys are not uniform; using machine-level matrices",
                        source.label
                    );
                    return Granularity::Machine;
                }
            }
        }
    };
    Granularity::Application { undelayed, delayed }
}

/// Check that `keys[i]` is `base | (i << shift)` and build the split
///
/// Each core needs `max_atoms_per_core * n_stages` rows.
pub fn application_keys(
    cores: &[SourceCore],
    keys: &[KeyAndMask],
    max_atoms_per_core: u32,
    n_stages: u32,
) -> Option<ApplicationKeys> {
    let first = *keys.first()?;
    if keys.len() != cores.len() {
        return None;
    }
    let mask = first.mask;
    if keys.iter().any(|km| km.mask != mask) || mask == 0 {
        return None;
    }
    for (i, core) in cores.iter().enumerate() {
        let expected_lo = (i as u32).checked_mul(max_atoms_per_core)?;
        if core.slice.lo_atom != expected_lo || core.slice.n_atoms > max_atoms_per_core {
            return None;
        }
    }

    let n_neurons = max_atoms_per_core.checked_mul(n_stages)?;
    let shift = mask.trailing_zeros();
    // Local neuron ids must fit below the core field
    if u64::from(n_neurons) > 1u64 << shift {
        return None;
    }

    let n_cores = keys.len() as u32;
    if n_cores == 1 {
        let split = CoreSplit::new(0, 0, n_neurons);
        return Some(ApplicationKeys {
            key_and_mask: first,
            split,
        });
    }

    let core_bits = u32::BITS - (n_cores - 1).leading_zeros();
    if shift + core_bits > u32::BITS {
        return None;
    }
    let core_mask = (1u32 << core_bits) - 1;
    if core_mask > MAX_CORE_MASK {
        return None;
    }
    let field = core_mask << shift;
    if field & !mask != 0 {
        return None;
    }

    let base = first.key;
    if base & field != 0 {
        return None;
    }
    let uniform = keys
        .iter()
        .enumerate()
        .all(|(i, km)| km.key == base | ((i as u32) << shift));
    if !uniform {
        return None;
    }

    let split = CoreSplit::new(core_mask, shift, n_neurons);
    ExtraInfo::from_split(split).ok()?;
    Some(ApplicationKeys {
        key_and_mask: KeyAndMask::new(base, mask & !field),
        split,
    })
}
