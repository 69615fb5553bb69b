// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Worst-case row sizing and delay-stage arithmetic

use super::format::{row_stride_bytes, RowFormat};
use crate::error::{BuildError, BuildResult};
use crate::population_table::MAX_ROW_LENGTH;

/// Largest number of connections any one source neuron can make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxConnections {
    /// With a delay that fits the stage directly
    pub undelayed: u32,
    /// Per delay stage, for delays beyond the first stage
    pub delayed: u32,
}

/// Per-projection row maxima, computed once before any row is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxRowInfo {
    pub undelayed_max_synapses: u32,
    pub delayed_max_synapses: u32,
    /// Data words, header excluded
    pub undelayed_max_words: u32,
    pub delayed_max_words: u32,
    /// Padded row stride in bytes (zero when the partition is empty)
    pub undelayed_max_bytes: usize,
    pub delayed_max_bytes: usize,
}

impl MaxRowInfo {
    pub fn has_undelayed(&self) -> bool {
        self.undelayed_max_words > 0
    }

    pub fn has_delayed(&self) -> bool {
        self.delayed_max_words > 0
    }

    pub fn max_synapses(&self, is_delayed: bool) -> u32 {
        if is_delayed {
            self.delayed_max_synapses
        } else {
            self.undelayed_max_synapses
        }
    }

    pub fn max_words(&self, is_delayed: bool) -> u32 {
        if is_delayed {
            self.delayed_max_words
        } else {
            self.undelayed_max_words
        }
    }

    pub fn stride_bytes(&self, is_delayed: bool) -> usize {
        if is_delayed {
            self.delayed_max_bytes
        } else {
            self.undelayed_max_bytes
        }
    }
}

/// Compute [`MaxRowInfo`] for a projection
///
/// `pad_to_length` reserves room for synapses added later by structural
/// rewiring. Fails with [`BuildError::RowTooBig`] when either partition needs
/// more words than a row pointer can describe.
pub fn max_row_sizing(
    format: RowFormat,
    max_per_source: MaxConnections,
    n_delay_stages: u32,
    pad_to_length: Option<u32>,
) -> BuildResult<MaxRowInfo> {
    let pad = pad_to_length.unwrap_or(0);
    let undelayed_max_synapses = max_per_source.undelayed.max(pad);
    let delayed_max_synapses = if n_delay_stages == 0 {
        0
    } else {
        max_per_source.delayed.max(pad)
    };

    let undelayed_max_words = checked_words(format, undelayed_max_synapses)?;
    let delayed_max_words = checked_words(format, delayed_max_synapses)?;

    Ok(MaxRowInfo {
        undelayed_max_synapses,
        delayed_max_synapses,
        undelayed_max_words,
        delayed_max_words,
        undelayed_max_bytes: row_stride_bytes(undelayed_max_words),
        delayed_max_bytes: row_stride_bytes(delayed_max_words),
    })
}

fn checked_words(format: RowFormat, n_synapses: u32) -> BuildResult<u32> {
    let words = format.words_for_synapses(n_synapses);
    if words > MAX_ROW_LENGTH {
        return Err(BuildError::RowTooBig {
            requested: words,
            max_supported: MAX_ROW_LENGTH,
        });
    }
    Ok(words)
}

/// Delay stages needed beyond the first for delays up to `max_delay_ticks`
pub fn n_delay_stages(max_delay_ticks: u32, max_delay_per_stage: u32) -> u32 {
    if max_delay_per_stage == 0 || max_delay_ticks <= max_delay_per_stage {
        0
    } else {
        max_delay_ticks.div_ceil(max_delay_per_stage) - 1
    }
}

/// Where a delay of `ticks` lands: `(stage, delay stored in the row)`
///
/// Stage 0 is the undelayed partition.
pub fn split_delay(ticks: u32, max_delay_per_stage: u32) -> (u32, u32) {
    if ticks <= max_delay_per_stage {
        (0, ticks)
    } else {
        let stage = (ticks - 1) / max_delay_per_stage;
        (stage, ticks - stage * max_delay_per_stage)
    }
}

/// Convert a delay in milliseconds to whole ticks, never less than one
pub fn delay_to_ticks(delay_ms: f64, ticks_per_ms: f64) -> u32 {
    let ticks = (delay_ms * ticks_per_ms).round();
    if ticks.is_nan() || ticks < 1.0 {
        1
    } else if ticks >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        ticks as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::PlasticLayout;

    #[test]
    fn test_row_length_boundary() {
        let exact = MaxConnections {
            undelayed: 256,
            delayed: 0,
        };
        let info = max_row_sizing(RowFormat::Static, exact, 0, None).unwrap();
        assert_eq!(info.undelayed_max_words, 256);
        assert_eq!(info.undelayed_max_bytes, (256 + 3) * 4);
        assert!(!info.has_delayed());

        let over = MaxConnections {
            undelayed: 257,
            delayed: 0,
        };
        match max_row_sizing(RowFormat::Static, over, 0, None) {
            Err(BuildError::RowTooBig {
                requested,
                max_supported,
            }) => {
                assert_eq!(requested, 257);
                assert_eq!(max_supported, 256);
            }
            other => panic!("expected RowTooBig, got {:?}", other),
        }
    }

    #[test]
    fn test_pad_to_length() {
        let few = MaxConnections {
            undelayed: 2,
            delayed: 1,
        };
        let info = max_row_sizing(RowFormat::Static, few, 1, Some(10)).unwrap();
        assert_eq!(info.undelayed_max_synapses, 10);
        assert_eq!(info.delayed_max_synapses, 10);

        let no_stages = max_row_sizing(RowFormat::Static, few, 0, Some(10)).unwrap();
        assert_eq!(no_stages.delayed_max_synapses, 0);
    }

    #[test]
    fn test_plastic_sizing() {
        let format = RowFormat::Plastic(PlasticLayout::new(1, 2).unwrap());
        let info = max_row_sizing(
            format,
            MaxConnections {
                undelayed: 4,
                delayed: 0,
            },
            0,
            None,
        )
        .unwrap();
        // 1 header word + 4 words of state + 2 control words
        assert_eq!(info.undelayed_max_words, 7);
    }

    #[test]
    fn test_delay_split_boundary() {
        assert_eq!(split_delay(16, 16), (0, 16));
        assert_eq!(split_delay(17, 16), (1, 1));
        assert_eq!(split_delay(32, 16), (1, 16));
        assert_eq!(split_delay(33, 16), (2, 1));
    }

    #[test]
    fn test_n_delay_stages() {
        assert_eq!(n_delay_stages(16, 16), 0);
        assert_eq!(n_delay_stages(17, 16), 1);
        assert_eq!(n_delay_stages(32, 16), 1);
        assert_eq!(n_delay_stages(33, 16), 2);
    }

    #[test]
    fn test_delay_to_ticks() {
        assert_eq!(delay_to_ticks(1.0, 1.0), 1);
        assert_eq!(delay_to_ticks(0.1, 1.0), 1);
        assert_eq!(delay_to_ticks(2.4, 10.0), 24);
        assert_eq!(delay_to_ticks(-3.0, 1.0), 1);
    }
}
