// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file to loaded device memory, across several target cores

use std::io::Write;
use std::sync::Arc;

use neuromap::config::{load_config, NeuromapConfig};
use neuromap::prelude::*;
use neuromap::{build_cores, context_from_config};

const N_POST_ATOMS: u32 = 64;
const POST_PER_CORE: u32 = 32;

fn write_config(dir: &std::path::Path) -> NeuromapConfig {
    let path = dir.join("neuromap_configuration.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[memory]").unwrap();
    writeln!(file, "synaptic_budget_bytes = 1048576").unwrap();
    writeln!(file, "direct_budget_bytes = 4096").unwrap();
    writeln!(file, "core_capacity_bytes = 2097152").unwrap();
    writeln!(file, "[generation]").unwrap();
    writeln!(file, "core_seed_base = 77").unwrap();
    load_config(Some(&path), None).unwrap()
}

fn population(label: &str, n_cores: u32, per_core: u32, key_base: u32) -> Arc<SourcePopulation> {
    Arc::new(SourcePopulation {
        label: label.to_string(),
        n_atoms: n_cores * per_core,
        max_atoms_per_core: per_core,
        cores: (0..n_cores)
            .map(|i| SourceCore {
                slice: Slice::new(i * per_core, per_core),
                key_and_mask: KeyAndMask::new(key_base | (i << 8), 0xFFFF_FF00),
            })
            .collect(),
        delay_routing: None,
    })
}

fn projection(id: u32, source: Arc<SourcePopulation>, connector: Connector) -> IncomingProjection {
    IncomingProjection {
        id: ProjectionId(id),
        source,
        synapse_info: SynapseInfo {
            connector,
            dynamics: SynapseDynamics {
                supports_generation: false,
                ..SynapseDynamics::static_synapses()
            },
            weights: ParamGenerator::Constant(0.25),
            delays: ParamGenerator::Constant(1.0),
            synapse_type: 0,
            seed: 5,
        },
    }
}

fn projections() -> Vec<IncomingProjection> {
    vec![
        projection(1, population("dense", 3, 16, 0x0100_0000), Connector::AllToAll),
        projection(2, population("relay", 1, 64, 0x0200_0000), Connector::OneToOne),
        projection(
            3,
            population("sparse", 2, 8, 0x0300_0000),
            Connector::FixedProbability { p_connect: 0.25 },
        ),
    ]
}

fn placement(config: &NeuromapConfig) -> Vec<(CoreContext, Vec<IncomingProjection>)> {
    (0..N_POST_ATOMS / POST_PER_CORE)
        .map(|i| {
            let core = CoreId::new(0, 0, 1 + i as u8);
            let slice = Slice::new(i * POST_PER_CORE, POST_PER_CORE);
            let context = context_from_config(config, core, slice, N_POST_ATOMS).unwrap();
            (context, projections())
        })
        .collect()
}

#[test]
fn test_config_to_device_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let built = build_cores(placement(&config)).unwrap();
    assert_eq!(built.len(), 2);

    let mut device = InMemoryAccessor::new(config.memory.core_capacity_bytes);
    let mut dense = 0;
    let mut relay = Vec::new();
    for mut core in built {
        let regions = core.image.load(&mut device).unwrap();
        let post = core.allocator.context().post_slice;
        assert_eq!(
            core.allocator.allocation(ProjectionId(2)).map(|a| a.strategy),
            Some(WriteStrategy::Direct)
        );

        let connections = core.allocator.read(ProjectionId(1), &regions, &device).unwrap();
        assert!(connections.iter().all(|c| post.contains(c.target)));
        dense += connections.len();

        relay.extend(core.allocator.read(ProjectionId(2), &regions, &device).unwrap());
        let sparse = core.allocator.read(ProjectionId(3), &regions, &device).unwrap();
        assert!(sparse.iter().all(|c| c.source < 16 && post.contains(c.target)));
    }

    assert_eq!(dense, 48 * N_POST_ATOMS as usize);
    relay.sort_by_key(|c| c.source);
    assert_eq!(relay.len(), N_POST_ATOMS as usize);
    assert!(relay.iter().all(|c| c.source == c.target && c.weight == 0.25));
}

#[test]
fn test_parallel_build_matches_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let driven: Vec<CoreSynapticImage> = build_cores(placement(&config))
        .unwrap()
        .into_iter()
        .map(|core| core.image)
        .collect();
    let sequential: Vec<CoreSynapticImage> = placement(&config)
        .into_iter()
        .map(|(context, projections)| {
            MatrixAllocator::new(context).unwrap().build(&projections).unwrap()
        })
        .collect();

    assert_eq!(driven, sequential);
    assert_ne!(driven[0].core, driven[1].core);
}

#[test]
fn test_failing_core_aborts_placement() {
    let mut cores = placement(&NeuromapConfig::default());
    cores[1].0.synaptic_budget = 16;
    let result = build_cores(cores);
    assert!(matches!(result, Err(BuildError::MemoryOverflow { .. })));
}
