// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connectors: the rules that decide which neurons of two populations connect
//!
//! Generation is deterministic: every source neuron draws from its own
//! `StdRng` seeded from the projection seed, so a rebuild with the same seed
//! produces the same connections whatever the core it runs for.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};
use crate::param::ParamGenerator;
use crate::row::{delay_to_ticks, split_delay, MaxConnections};
use crate::types::{Connection, Slice};

/// Binomial tail width used to bound fixed-probability rows
const BINOMIAL_SIGMAS: f64 = 6.0;

/// One explicit connection of a [`Connector::FromList`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ListConnection {
    pub source: u32,
    pub target: u32,
    pub weight: f64,
    /// Milliseconds
    pub delay: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connector {
    OneToOne,
    AllToAll,
    FixedProbability { p_connect: f64 },
    /// Each source picks `n` targets from the whole post population
    FixedNumberPost { n: u32, with_replacement: bool },
    FromList(Vec<ListConnection>),
}

/// Delay timing needed to split per-source maxima across partitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayTiming {
    pub ticks_per_ms: f64,
    pub max_delay_per_stage: u32,
}

impl Connector {
    pub fn validate(&self, n_post_atoms: u32) -> BuildResult<()> {
        match self {
            Connector::FixedProbability { p_connect } => {
                if !(0.0..=1.0).contains(p_connect) {
                    return Err(BuildError::config(format!(
                        "connection probability {} is outside [0, 1]",
                        p_connect
                    )));
                }
            }
            Connector::FixedNumberPost {
                n,
                with_replacement: false,
            } if *n > n_post_atoms => {
                return Err(BuildError::config(format!(
                    "cannot choose {} distinct targets from {} post neurons",
                    n, n_post_atoms
                )));
            }
            Connector::FromList(list) => {
                if let Some(bad) = list.iter().find(|c| c.target >= n_post_atoms) {
                    return Err(BuildError::config(format!(
                        "listed connection {} -> {} targets beyond {} post neurons",
                        bad.source, bad.target, n_post_atoms
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Connector::OneToOne => "one_to_one",
            Connector::AllToAll => "all_to_all",
            Connector::FixedProbability { .. } => "fixed_probability",
            Connector::FixedNumberPost { .. } => "fixed_number_post",
            Connector::FromList(_) => "from_list",
        }
    }

    pub fn is_one_to_one(&self) -> bool {
        matches!(self, Connector::OneToOne)
    }

    /// Whether the device can expand this connector itself
    pub fn is_generatable(&self) -> bool {
        !matches!(self, Connector::FromList(_))
    }

    /// Device-side connector id
    pub fn generator_id(&self) -> Option<u32> {
        match self {
            Connector::OneToOne => Some(0),
            Connector::AllToAll => Some(1),
            Connector::FixedProbability { .. } => Some(2),
            Connector::FixedNumberPost { .. } => Some(3),
            Connector::FromList(_) => None,
        }
    }

    /// Connector parameters for the generator descriptor
    pub fn generator_params(&self, n_post_atoms: u32) -> Vec<u32> {
        match self {
            Connector::OneToOne | Connector::AllToAll | Connector::FromList(_) => Vec::new(),
            Connector::FixedProbability { p_connect } => {
                // Unsigned 0.32 fixed point
                vec![(p_connect * f64::from(u32::MAX)).round() as u32]
            }
            Connector::FixedNumberPost {
                n,
                with_replacement,
            } => vec![*n, u32::from(*with_replacement), n_post_atoms],
        }
    }

    /// False when no connection can join these two slices
    pub fn could_connect(&self, pre_slice: Slice, post_slice: Slice) -> bool {
        match self {
            Connector::OneToOne => pre_slice.overlaps(&post_slice),
            Connector::FixedProbability { p_connect } => *p_connect > 0.0,
            Connector::FixedNumberPost { n, .. } => *n > 0,
            Connector::FromList(list) => list
                .iter()
                .any(|c| pre_slice.contains(c.source) && post_slice.contains(c.target)),
            Connector::AllToAll => true,
        }
    }

    /// Largest delay in milliseconds any connection can have
    ///
    /// Generated delays must come from a bounded generator.
    pub fn max_delay_ms(&self, delays: &ParamGenerator) -> BuildResult<f64> {
        match self {
            Connector::FromList(list) => Ok(list.iter().map(|c| c.delay).fold(0.0, f64::max)),
            _ => delays.max_value().ok_or_else(|| {
                BuildError::config(format!(
                    "delay generator {:?} is unbounded; use a constant, uniform or clipped normal",
                    delays
                ))
            }),
        }
    }

    /// Largest connection count of one source neuron into `post_slice`
    pub fn max_connections_per_source(
        &self,
        pre_slice: Slice,
        post_slice: Slice,
        delays: &ParamGenerator,
        timing: DelayTiming,
    ) -> BuildResult<MaxConnections> {
        if let Connector::FromList(list) = self {
            return Ok(list_maxima(list, pre_slice, post_slice, timing));
        }

        let n_post = post_slice.n_atoms;
        let max_row = match self {
            Connector::OneToOne => u32::from(n_post > 0),
            Connector::AllToAll => n_post,
            Connector::FixedProbability { p_connect } => {
                binomial_bound(n_post, *p_connect)
            }
            Connector::FixedNumberPost {
                n,
                with_replacement,
            } => {
                if *with_replacement {
                    *n
                } else {
                    (*n).min(n_post)
                }
            }
            Connector::FromList(_) => 0,
        };

        let min_ticks = delays
            .min_value()
            .map(|ms| delay_to_ticks(ms, timing.ticks_per_ms))
            .unwrap_or(1);
        let max_ticks = delay_to_ticks(self.max_delay_ms(delays)?, timing.ticks_per_ms);
        Ok(MaxConnections {
            undelayed: if min_ticks <= timing.max_delay_per_stage {
                max_row
            } else {
                0
            },
            delayed: if max_ticks > timing.max_delay_per_stage {
                max_row
            } else {
                0
            },
        })
    }

    /// Expand the connections from `pre_slice` into `post_slice`
    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        &self,
        pre_slice: Slice,
        post_slice: Slice,
        n_post_atoms: u32,
        weights: &ParamGenerator,
        delays: &ParamGenerator,
        synapse_type: u8,
        seed: u64,
    ) -> Vec<Connection> {
        if !self.could_connect(pre_slice, post_slice) {
            return Vec::new();
        }

        let mut connections = Vec::new();
        match self {
            Connector::FromList(list) => {
                connections.extend(
                    list.iter()
                        .filter(|c| pre_slice.contains(c.source) && post_slice.contains(c.target))
                        .map(|c| {
                            Connection::new(c.source, c.target, c.weight, c.delay, synapse_type)
                        }),
                );
            }
            _ => {
                for source in pre_slice.atoms() {
                    let mut rng = source_rng(seed, source);
                    for target in self.targets_of(source, post_slice, n_post_atoms, &mut rng) {
                        let weight = weights.sample(&mut rng);
                        let delay = delays.sample(&mut rng);
                        connections.push(Connection::new(
                            source,
                            target,
                            weight,
                            delay,
                            synapse_type,
                        ));
                    }
                }
            }
        }

        debug!(
            target: "neuromap-connectivity",
            "{} generated {} connections for {} -> {}",
            self.name(),
            connections.len(),
            pre_slice,
            post_slice
        );
        connections
    }

    fn targets_of(
        &self,
        source: u32,
        post_slice: Slice,
        n_post_atoms: u32,
        rng: &mut StdRng,
    ) -> Vec<u32> {
        match self {
            Connector::OneToOne => {
                if post_slice.contains(source) {
                    vec![source]
                } else {
                    Vec::new()
                }
            }
            Connector::AllToAll => post_slice.atoms().collect(),
            Connector::FixedProbability { p_connect } => post_slice
                .atoms()
                .filter(|_| rng.gen_bool(p_connect.clamp(0.0, 1.0)))
                .collect(),
            Connector::FixedNumberPost {
                n,
                with_replacement,
            } => {
                // Chosen over the whole post population so every core sees the same picks
                let chosen: Vec<u32> = if *with_replacement {
                    (0..*n).map(|_| rng.gen_range(0..n_post_atoms.max(1))).collect()
                } else {
                    let amount = (*n).min(n_post_atoms) as usize;
                    let mut picks: Vec<u32> = index::sample(rng, n_post_atoms as usize, amount)
                        .into_iter()
                        .map(|i| i as u32)
                        .collect();
                    picks.sort_unstable();
                    picks
                };
                chosen
                    .into_iter()
                    .filter(|target| post_slice.contains(*target))
                    .collect()
            }
            Connector::FromList(_) => Vec::new(),
        }
    }
}

/// Per-source generator, independent of how the populations are sliced
fn source_rng(seed: u64, source: u32) -> StdRng {
    let mixed = seed ^ u64::from(source).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    StdRng::seed_from_u64(mixed)
}

/// `n p + 6 sqrt(n p (1 - p)) + 1`, never more than `n`
fn binomial_bound(n: u32, p: f64) -> u32 {
    if n == 0 || p <= 0.0 {
        return 0;
    }
    let mean = f64::from(n) * p;
    let bound = (mean + BINOMIAL_SIGMAS * (mean * (1.0 - p)).sqrt()).ceil() as u32 + 1;
    bound.min(n)
}

fn list_maxima(
    list: &[ListConnection],
    pre_slice: Slice,
    post_slice: Slice,
    timing: DelayTiming,
) -> MaxConnections {
    let n_pre = pre_slice.n_atoms as usize;
    let mut undelayed = vec![0u32; n_pre];
    let mut delayed: ahash::AHashMap<(u32, u32), u32> = ahash::AHashMap::new();
    for c in list
        .iter()
        .filter(|c| pre_slice.contains(c.source) && post_slice.contains(c.target))
    {
        let local = (c.source - pre_slice.lo_atom) as usize;
        let ticks = delay_to_ticks(c.delay, timing.ticks_per_ms);
        match split_delay(ticks, timing.max_delay_per_stage) {
            (0, _) => undelayed[local] += 1,
            (stage, _) => *delayed.entry((c.source, stage)).or_default() += 1,
        }
    }
    MaxConnections {
        undelayed: undelayed.into_iter().max().unwrap_or(0),
        delayed: delayed.values().copied().max().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMING: DelayTiming = DelayTiming {
        ticks_per_ms: 1.0,
        max_delay_per_stage: 16,
    };

    #[test]
    fn test_one_to_one_generation() {
        let connector = Connector::OneToOne;
        let weights = ParamGenerator::Constant(1.0);
        let delays = ParamGenerator::Constant(1.0);
        let connections =
            connector.generate(Slice::new(0, 10), Slice::new(5, 10), 20, &weights, &delays, 0, 1);
        let pairs: Vec<(u32, u32)> = connections.iter().map(|c| (c.source, c.target)).collect();
        assert_eq!(pairs, (5..10).map(|i| (i, i)).collect::<Vec<_>>());
        assert!(!connector.could_connect(Slice::new(0, 5), Slice::new(5, 5)));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let connector = Connector::FixedProbability { p_connect: 0.3 };
        let weights = ParamGenerator::Uniform {
            low: 0.0,
            high: 1.0,
        };
        let delays = ParamGenerator::Constant(2.0);
        let a = connector.generate(Slice::new(0, 50), Slice::new(0, 50), 50, &weights, &delays, 0, 9);
        let b = connector.generate(Slice::new(0, 50), Slice::new(0, 50), 50, &weights, &delays, 0, 9);
        assert_eq!(a, b);
        let c = connector.generate(Slice::new(0, 50), Slice::new(0, 50), 50, &weights, &delays, 0, 10);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fixed_probability_stays_under_bound() {
        let connector = Connector::FixedProbability { p_connect: 0.1 };
        let post = Slice::new(0, 200);
        let delays = ParamGenerator::Constant(1.0);
        let max = connector
            .max_connections_per_source(Slice::new(0, 100), post, &delays, TIMING)
            .unwrap();
        assert_eq!(max.delayed, 0);
        let connections = connector.generate(
            Slice::new(0, 100),
            post,
            200,
            &ParamGenerator::Constant(1.0),
            &delays,
            0,
            3,
        );
        let mut per_source = vec![0u32; 100];
        for c in &connections {
            per_source[c.source as usize] += 1;
        }
        assert!(per_source.into_iter().all(|n| n <= max.undelayed));
    }

    #[test]
    fn test_fixed_number_post_is_consistent_across_slices() {
        let connector = Connector::FixedNumberPost {
            n: 5,
            with_replacement: false,
        };
        let w = ParamGenerator::Constant(1.0);
        let d = ParamGenerator::Constant(1.0);
        let whole = connector.generate(Slice::new(0, 4), Slice::new(0, 40), 40, &w, &d, 0, 5);
        let low = connector.generate(Slice::new(0, 4), Slice::new(0, 20), 40, &w, &d, 0, 5);
        let high = connector.generate(Slice::new(0, 4), Slice::new(20, 20), 40, &w, &d, 0, 5);
        assert_eq!(whole.len(), 20);
        let mut targets: Vec<(u32, u32)> = low
            .iter()
            .chain(high.iter())
            .map(|c| (c.source, c.target))
            .collect();
        targets.sort_unstable();
        let mut expected: Vec<(u32, u32)> = whole.iter().map(|c| (c.source, c.target)).collect();
        expected.sort_unstable();
        assert_eq!(targets, expected);
    }

    #[test]
    fn test_list_maxima_split_by_stage() {
        let list = vec![
            ListConnection {
                source: 0,
                target: 0,
                weight: 1.0,
                delay: 1.0,
            },
            ListConnection {
                source: 0,
                target: 1,
                weight: 1.0,
                delay: 20.0,
            },
            ListConnection {
                source: 1,
                target: 1,
                weight: 1.0,
                delay: 20.0,
            },
            ListConnection {
                source: 1,
                target: 2,
                weight: 1.0,
                delay: 18.0,
            },
        ];
        let connector = Connector::FromList(list);
        assert!(!connector.is_generatable());
        let max = connector
            .max_connections_per_source(
                Slice::new(0, 2),
                Slice::new(0, 4),
                &ParamGenerator::Constant(1.0),
                TIMING,
            )
            .unwrap();
        assert_eq!(max.undelayed, 1);
        assert_eq!(max.delayed, 2);
        assert_eq!(connector.max_delay_ms(&ParamGenerator::Constant(1.0)).unwrap(), 20.0);
    }

    #[test]
    fn test_unbounded_delays_are_rejected() {
        let connector = Connector::AllToAll;
        let delays = ParamGenerator::Normal {
            mean: 3.0,
            std_dev: 1.0,
        };
        assert!(connector.max_delay_ms(&delays).is_err());
    }

    #[test]
    fn test_binomial_bound() {
        assert_eq!(binomial_bound(0, 0.5), 0);
        assert_eq!(binomial_bound(10, 1.0), 10);
        // 100 * 0.1 = 10, 6 * sqrt(9) = 18, plus one
        assert_eq!(binomial_bound(100, 0.1), 29);
    }
}
