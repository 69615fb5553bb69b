// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Weight and delay generators
//!
//! Sampled on the host when rows are expanded there, or shipped to the
//! device as an id plus fixed-point parameters when rows are generated on
//! the device.

use rand::Rng;
use rand_distr::{Exp1, StandardNormal};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// Resampling attempts for clipped normals before clamping to the bounds
const MAX_RESAMPLES: usize = 1_000;

const S1615_ONE: f64 = 32_768.0;

/// Convert to the device's signed 16.15 fixed-point format, saturating
pub fn to_s1615(value: f64) -> u32 {
    let scaled = (value * S1615_ONE).round();
    let clamped = scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX));
    (clamped as i32) as u32
}

/// Inverse of [`to_s1615`]
pub fn from_s1615(word: u32) -> f64 {
    f64::from(word as i32) / S1615_ONE
}

/// A distribution of per-synapse values
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParamGenerator {
    Constant(f64),
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, std_dev: f64 },
    /// Normal, resampled until it falls in `[low, high]`
    NormalClipped {
        mean: f64,
        std_dev: f64,
        low: f64,
        high: f64,
    },
    /// Normal, with out-of-range samples moved to the nearest bound
    NormalClippedToBoundary {
        mean: f64,
        std_dev: f64,
        low: f64,
        high: f64,
    },
    Exponential { beta: f64 },
}

impl ParamGenerator {
    pub fn validate(&self) -> BuildResult<()> {
        let finite = self.params().iter().all(|v| v.is_finite());
        let ok = finite
            && match *self {
                ParamGenerator::Constant(_) => true,
                ParamGenerator::Uniform { low, high } => low <= high,
                ParamGenerator::Normal { std_dev, .. } => std_dev >= 0.0,
                ParamGenerator::NormalClipped {
                    std_dev, low, high, ..
                }
                | ParamGenerator::NormalClippedToBoundary {
                    std_dev, low, high, ..
                } => std_dev >= 0.0 && low <= high,
                ParamGenerator::Exponential { beta } => beta > 0.0,
            };
        if ok {
            Ok(())
        } else {
            Err(BuildError::config(format!("invalid parameter generator {:?}", self)))
        }
    }

    /// Device-side generator id
    pub fn generator_id(&self) -> u32 {
        match self {
            ParamGenerator::Constant(_) => 0,
            ParamGenerator::Uniform { .. } => 1,
            ParamGenerator::Normal { .. } => 2,
            ParamGenerator::NormalClipped { .. } => 3,
            ParamGenerator::NormalClippedToBoundary { .. } => 4,
            ParamGenerator::Exponential { .. } => 5,
        }
    }

    pub fn params(&self) -> Vec<f64> {
        match *self {
            ParamGenerator::Constant(value) => vec![value],
            ParamGenerator::Uniform { low, high } => vec![low, high],
            ParamGenerator::Normal { mean, std_dev } => vec![mean, std_dev],
            ParamGenerator::NormalClipped {
                mean,
                std_dev,
                low,
                high,
            }
            | ParamGenerator::NormalClippedToBoundary {
                mean,
                std_dev,
                low,
                high,
            } => vec![mean, std_dev, low, high],
            ParamGenerator::Exponential { beta } => vec![beta],
        }
    }

    /// Parameters scaled by `scale` and packed as s16.15 words
    pub fn param_words(&self, scale: f64) -> Vec<u32> {
        self.params()
            .into_iter()
            .map(|value| to_s1615(value * scale))
            .collect()
    }

    /// Smallest value the generator can produce, if bounded below
    pub fn min_value(&self) -> Option<f64> {
        match *self {
            ParamGenerator::Constant(value) => Some(value),
            ParamGenerator::Uniform { low, .. }
            | ParamGenerator::NormalClipped { low, .. }
            | ParamGenerator::NormalClippedToBoundary { low, .. } => Some(low),
            ParamGenerator::Exponential { .. } => Some(0.0),
            ParamGenerator::Normal { .. } => None,
        }
    }

    /// Largest value the generator can produce, if bounded above
    pub fn max_value(&self) -> Option<f64> {
        match *self {
            ParamGenerator::Constant(value) => Some(value),
            ParamGenerator::Uniform { high, .. }
            | ParamGenerator::NormalClipped { high, .. }
            | ParamGenerator::NormalClippedToBoundary { high, .. } => Some(high),
            ParamGenerator::Normal { .. } | ParamGenerator::Exponential { .. } => None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.min_value().is_some() && self.max_value().is_some()
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match *self {
            ParamGenerator::Constant(value) => value,
            ParamGenerator::Uniform { low, high } => {
                if low < high {
                    rng.gen_range(low..high)
                } else {
                    low
                }
            }
            ParamGenerator::Normal { mean, std_dev } => sample_normal(rng, mean, std_dev),
            ParamGenerator::NormalClipped {
                mean,
                std_dev,
                low,
                high,
            } => {
                for _ in 0..MAX_RESAMPLES {
                    let value = sample_normal(rng, mean, std_dev);
                    if (low..=high).contains(&value) {
                        return value;
                    }
                }
                mean.clamp(low, high)
            }
            ParamGenerator::NormalClippedToBoundary {
                mean,
                std_dev,
                low,
                high,
            } => sample_normal(rng, mean, std_dev).clamp(low, high),
            ParamGenerator::Exponential { beta } => {
                let unit: f64 = rng.sample(Exp1);
                unit * beta
            }
        }
    }
}

fn sample_normal<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let unit: f64 = rng.sample(StandardNormal);
    mean + std_dev * unit
}
