// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Row encoding and decoding
//!
//! Rows of one matrix are padded to a common stride so the firmware can
//! address row `i` as `base + i * stride`. Delayed rows are stacked stage by
//! stage: stage `s` (from 1) of source `j` lives at row `j + (s - 1) * n_pre`.

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

use super::format::{RowFormat, SynapseWordLayout, BYTES_PER_WORD, ROW_HEADER_WORDS};
use super::sizing::{delay_to_ticks, split_delay, MaxRowInfo};
use crate::error::{BuildError, BuildResult, DecodeError};
use crate::types::{Connection, Slice};

const MAX_WEIGHT: f64 = u16::MAX as f64;

/// Bytes produced for one projection on one core
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedRows {
    pub undelayed: Vec<u8>,
    pub delayed: Vec<u8>,
    pub undelayed_stride: usize,
    pub delayed_stride: usize,
}

impl EncodedRows {
    pub fn n_undelayed_rows(&self) -> usize {
        rows_in(&self.undelayed, self.undelayed_stride)
    }

    pub fn n_delayed_rows(&self) -> usize {
        rows_in(&self.delayed, self.delayed_stride)
    }
}

fn rows_in(bytes: &[u8], stride: usize) -> usize {
    if stride == 0 {
        0
    } else {
        bytes.len() / stride
    }
}

/// A connection reduced to its on-device fields
#[derive(Debug, Clone, Copy)]
struct Synapse {
    index: u32,
    synapse_type: u32,
    delay: u32,
    weight: u16,
}

/// Encoder and decoder for the rows of one projection
#[derive(Debug, Clone)]
pub struct RowCodec {
    format: RowFormat,
    layout: SynapseWordLayout,
    weight_scales: Vec<f64>,
    ticks_per_ms: f64,
    max_delay_per_stage: u32,
}

impl RowCodec {
    pub fn new(
        format: RowFormat,
        layout: SynapseWordLayout,
        weight_scales: Vec<f64>,
        ticks_per_ms: f64,
        max_delay_per_stage: u32,
    ) -> BuildResult<Self> {
        if !(ticks_per_ms.is_finite() && ticks_per_ms > 0.0) {
            return Err(BuildError::config(format!(
                "ticks per millisecond must be positive, got {}",
                ticks_per_ms
            )));
        }
        if max_delay_per_stage == 0 || max_delay_per_stage > layout.max_delay() {
            return Err(BuildError::config(format!(
                "maximum delay per stage {} must be between 1 and {} for {} delay bits",
                max_delay_per_stage,
                layout.max_delay(),
                layout.n_delay_bits()
            )));
        }
        if let Some(bad) = weight_scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(BuildError::config(format!(
                "weight scales must be positive, got {}",
                bad
            )));
        }
        Ok(Self {
            format,
            layout,
            weight_scales,
            ticks_per_ms,
            max_delay_per_stage,
        })
    }

    pub fn format(&self) -> RowFormat {
        self.format
    }

    pub fn layout(&self) -> SynapseWordLayout {
        self.layout
    }

    pub fn max_delay_per_stage(&self) -> u32 {
        self.max_delay_per_stage
    }

    pub fn ticks_per_ms(&self) -> f64 {
        self.ticks_per_ms
    }

    /// Encode `connections` into the undelayed and delayed partitions
    ///
    /// Every connection must start in `pre_slice` and end in `post_slice`.
    /// Rows are padded to the strides of `max_row_info`; a row holding more
    /// synapses than `max_row_info` allows is an error.
    pub fn encode(
        &self,
        connections: &[Connection],
        pre_slice: Slice,
        post_slice: Slice,
        n_delay_stages: u32,
        max_row_info: &MaxRowInfo,
    ) -> BuildResult<EncodedRows> {
        self.check_post_slice(post_slice)?;

        let n_pre = pre_slice.n_atoms as usize;
        let n_undelayed_rows = if max_row_info.has_undelayed() { n_pre } else { 0 };
        let n_delayed_rows = if max_row_info.has_delayed() {
            n_pre * n_delay_stages as usize
        } else {
            0
        };
        let mut undelayed: Vec<Vec<Synapse>> = vec![Vec::new(); n_undelayed_rows];
        let mut delayed: Vec<Vec<Synapse>> = vec![Vec::new(); n_delayed_rows];

        for connection in connections {
            let (local, synapse, stage) = self.quantize(connection, pre_slice, post_slice)?;
            let (rows, row, partition) = if stage == 0 {
                (&mut undelayed, local, "undelayed")
            } else {
                if stage > n_delay_stages {
                    return Err(BuildError::config(format!(
                        "connection {} -> {} needs delay stage {} but only {} are routed",
                        connection.source, connection.target, stage, n_delay_stages
                    )));
                }
                (&mut delayed, local + (stage as usize - 1) * n_pre, "delayed")
            };
            match rows.get_mut(row) {
                Some(row_synapses) => row_synapses.push(synapse),
                None => {
                    return Err(BuildError::config(format!(
                        "connection {} -> {} falls in the {} partition, which has no rows",
                        connection.source, connection.target, partition
                    )));
                }
            }
        }

        Ok(EncodedRows {
            undelayed: self.serialize_partition(&undelayed, max_row_info, false)?,
            delayed: self.serialize_partition(&delayed, max_row_info, true)?,
            undelayed_stride: max_row_info.undelayed_max_bytes,
            delayed_stride: max_row_info.delayed_max_bytes,
        })
    }

    /// Decode one partition read back from a matrix
    pub fn decode(
        &self,
        raw: &[u8],
        row_stride: usize,
        pre_slice: Slice,
        post_slice: Slice,
        n_delay_stages: u32,
        is_delayed: bool,
    ) -> Result<Vec<Connection>, DecodeError> {
        if row_stride == 0 {
            return if raw.is_empty() {
                Ok(Vec::new())
            } else {
                Err(DecodeError::MisalignedStride {
                    length: raw.len(),
                    stride: row_stride,
                })
            };
        }
        let header_bytes = (ROW_HEADER_WORDS * BYTES_PER_WORD) as usize;
        if row_stride % BYTES_PER_WORD as usize != 0
            || row_stride < header_bytes
            || raw.len() % row_stride != 0
        {
            return Err(DecodeError::MisalignedStride {
                length: raw.len(),
                stride: row_stride,
            });
        }

        let n_pre = pre_slice.n_atoms as usize;
        let expected_rows = if is_delayed {
            n_pre * n_delay_stages as usize
        } else {
            n_pre
        };
        let n_rows = raw.len() / row_stride;
        if n_rows < expected_rows {
            return Err(DecodeError::Truncated {
                expected: expected_rows * row_stride,
                actual: raw.len(),
            });
        }
        if n_rows > expected_rows {
            return Err(DecodeError::MalformedRow {
                row: expected_rows,
                reason: format!("{} rows found where {} were expected", n_rows, expected_rows),
            });
        }

        let mut words = vec![0u32; row_stride / BYTES_PER_WORD as usize];
        let mut connections = Vec::new();
        for (row, chunk) in raw.chunks_exact(row_stride).enumerate() {
            LittleEndian::read_u32_into(chunk, &mut words);
            let (local, stage) = if is_delayed {
                (row % n_pre, (row / n_pre) as u32 + 1)
            } else {
                (row, 0)
            };
            let source = pre_slice.lo_atom + local as u32;
            for synapse in self.parse_row(&words, row)? {
                connections.push(self.dequantize(synapse, source, stage, post_slice, row)?);
            }
        }
        Ok(connections)
    }

    /// One synaptic word per source atom, for single-row direct matrices
    pub fn encode_direct(
        &self,
        connections: &[Connection],
        pre_slice: Slice,
        post_slice: Slice,
    ) -> BuildResult<Vec<u8>> {
        if self.format.is_plastic() {
            return Err(BuildError::config("direct rows cannot hold plastic synapses"));
        }
        self.check_post_slice(post_slice)?;
        let mut words = vec![0u32; pre_slice.n_atoms as usize];
        let mut used = vec![false; words.len()];
        for connection in connections {
            let (local, synapse, stage) = self.quantize(connection, pre_slice, post_slice)?;
            if stage != 0 {
                return Err(BuildError::config(format!(
                    "connection {} -> {} is too delayed for a direct row",
                    connection.source, connection.target
                )));
            }
            if std::mem::replace(&mut used[local], true) {
                return Err(BuildError::config(format!(
                    "source {} has more than one connection in a direct row",
                    connection.source
                )));
            }
            words[local] = self.fixed_word(synapse);
        }
        let mut bytes = vec![0u8; words.len() * BYTES_PER_WORD as usize];
        LittleEndian::write_u32_into(&words, &mut bytes);
        Ok(bytes)
    }

    /// Inverse of [`encode_direct`](Self::encode_direct); all-zero words are empty slots
    pub fn decode_direct(
        &self,
        raw: &[u8],
        pre_slice: Slice,
        post_slice: Slice,
    ) -> Result<Vec<Connection>, DecodeError> {
        let expected = pre_slice.n_atoms as usize * BYTES_PER_WORD as usize;
        if raw.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: raw.len(),
            });
        }
        let mut connections = Vec::new();
        for (local, chunk) in raw[..expected].chunks_exact(BYTES_PER_WORD as usize).enumerate() {
            let word = LittleEndian::read_u32(chunk);
            if word == 0 {
                continue;
            }
            let synapse = self.unpack_fixed_word(word);
            let source = pre_slice.lo_atom + local as u32;
            connections.push(self.dequantize(synapse, source, 0, post_slice, local)?);
        }
        Ok(connections)
    }

    fn check_post_slice(&self, post_slice: Slice) -> BuildResult<()> {
        if post_slice.n_atoms > self.layout.max_post_atoms() {
            return Err(BuildError::config(format!(
                "post slice {} has more atoms than {} index bits can address",
                post_slice,
                self.layout.n_index_bits()
            )));
        }
        Ok(())
    }

    /// Validate a connection and convert it to device units
    fn quantize(
        &self,
        connection: &Connection,
        pre_slice: Slice,
        post_slice: Slice,
    ) -> BuildResult<(usize, Synapse, u32)> {
        if !pre_slice.contains(connection.source) {
            return Err(BuildError::config(format!(
                "source {} is outside the pre slice {}",
                connection.source, pre_slice
            )));
        }
        if !post_slice.contains(connection.target) {
            return Err(BuildError::config(format!(
                "target {} is outside the post slice {}",
                connection.target, post_slice
            )));
        }
        let synapse_type = u32::from(connection.synapse_type);
        let scale = self
            .weight_scales
            .get(connection.synapse_type as usize)
            .copied()
            .filter(|_| synapse_type < self.layout.n_synapse_types())
            .ok_or_else(|| {
                BuildError::config(format!(
                    "synapse type {} is not configured ({} scales, {} type bits)",
                    synapse_type,
                    self.weight_scales.len(),
                    self.layout.n_type_bits()
                ))
            })?;

        let weight = quantize_weight(connection, scale)?;
        let ticks = delay_to_ticks(connection.delay, self.ticks_per_ms);
        let (stage, delay) = split_delay(ticks, self.max_delay_per_stage);

        let local = (connection.source - pre_slice.lo_atom) as usize;
        let synapse = Synapse {
            index: connection.target - post_slice.lo_atom,
            synapse_type,
            delay,
            weight,
        };
        Ok((local, synapse, stage))
    }

    fn dequantize(
        &self,
        synapse: Synapse,
        source: u32,
        stage: u32,
        post_slice: Slice,
        row: usize,
    ) -> Result<Connection, DecodeError> {
        if synapse.index >= post_slice.n_atoms {
            return Err(DecodeError::MalformedRow {
                row,
                reason: format!(
                    "target index {} is outside the post slice {}",
                    synapse.index, post_slice
                ),
            });
        }
        let scale = self
            .weight_scales
            .get(synapse.synapse_type as usize)
            .copied()
            .ok_or_else(|| DecodeError::MalformedRow {
                row,
                reason: format!("unknown synapse type {}", synapse.synapse_type),
            })?;
        let ticks = synapse.delay + stage * self.max_delay_per_stage;
        Ok(Connection {
            source,
            target: post_slice.lo_atom + synapse.index,
            weight: f64::from(synapse.weight) / scale,
            delay: f64::from(ticks) / self.ticks_per_ms,
            synapse_type: synapse.synapse_type as u8,
        })
    }

    fn fixed_word(&self, synapse: Synapse) -> u32 {
        (u32::from(synapse.weight) << 16)
            | u32::from(self.layout.pack(synapse.index, synapse.synapse_type, synapse.delay))
    }

    fn unpack_fixed_word(&self, word: u32) -> Synapse {
        let (index, synapse_type, delay) = self.layout.unpack((word & 0xFFFF) as u16);
        Synapse {
            index,
            synapse_type,
            delay,
            weight: (word >> 16) as u16,
        }
    }

    fn serialize_partition(
        &self,
        rows: &[Vec<Synapse>],
        max_row_info: &MaxRowInfo,
        is_delayed: bool,
    ) -> BuildResult<Vec<u8>> {
        let stride = max_row_info.stride_bytes(is_delayed);
        if rows.is_empty() || stride == 0 {
            return Ok(Vec::new());
        }
        let max_synapses = max_row_info.max_synapses(is_delayed);
        let stride_words = stride / BYTES_PER_WORD as usize;
        let mut words = vec![0u32; rows.len() * stride_words];

        for (index, (row, out)) in rows.iter().zip(words.chunks_exact_mut(stride_words)).enumerate()
        {
            if row.len() as u32 > max_synapses {
                return Err(BuildError::config(format!(
                    "row {} of the {} partition has {} synapses, more than the maximum of {}",
                    index,
                    if is_delayed { "delayed" } else { "undelayed" },
                    row.len(),
                    max_synapses
                )));
            }
            self.write_row(row, out);
        }

        let mut bytes = vec![0u8; words.len() * BYTES_PER_WORD as usize];
        LittleEndian::write_u32_into(&words, &mut bytes);
        Ok(bytes)
    }

    /// Write one row into a zeroed, stride-sized word buffer
    fn write_row(&self, synapses: &[Synapse], out: &mut [u32]) {
        if synapses.is_empty() {
            return;
        }
        let n = synapses.len() as u32;
        match self.format {
            RowFormat::Static => {
                out[1] = n;
                for (slot, synapse) in out[3..].iter_mut().zip(synapses) {
                    *slot = self.fixed_word(*synapse);
                }
            }
            RowFormat::Plastic(layout) => {
                let pp_size = layout.plastic_words(n) as usize;
                out[0] = pp_size as u32;
                {
                    let state = &mut out[1..1 + pp_size];
                    let first_half = (layout.n_header_words * 2) as usize;
                    for (i, synapse) in synapses.iter().enumerate() {
                        let half = first_half + i * layout.n_half_words_per_synapse as usize;
                        put_half_word(state, half, synapse.weight);
                    }
                }
                out[2 + pp_size] = n;
                let controls = &mut out[3 + pp_size..];
                for (i, synapse) in synapses.iter().enumerate() {
                    let control =
                        self.layout
                            .pack(synapse.index, synapse.synapse_type, synapse.delay);
                    put_half_word(controls, i, control);
                }
            }
        }
    }

    /// Parse one padded row, checking its header against the stride
    fn parse_row(&self, words: &[u32], row: usize) -> Result<Vec<Synapse>, DecodeError> {
        let malformed = |reason: String| DecodeError::MalformedRow { row, reason };
        let stride_words = words.len();

        let pp_size = words[0] as usize;
        if ROW_HEADER_WORDS as usize + pp_size > stride_words {
            return Err(malformed(format!(
                "plastic region of {} words overruns a {}-word row",
                pp_size, stride_words
            )));
        }
        let n_fixed_fixed = words[1 + pp_size] as usize;
        let n_fixed_plastic = words[2 + pp_size] as usize;
        let body = &words[3 + pp_size..];

        match self.format {
            RowFormat::Static => {
                if pp_size != 0 || n_fixed_plastic != 0 {
                    return Err(malformed("static row carries plastic data".to_string()));
                }
                if n_fixed_fixed > body.len() {
                    return Err(malformed(format!(
                        "{} fixed-fixed words overrun the row",
                        n_fixed_fixed
                    )));
                }
                Ok(body[..n_fixed_fixed]
                    .iter()
                    .map(|&word| self.unpack_fixed_word(word))
                    .collect())
            }
            RowFormat::Plastic(layout) => {
                if n_fixed_fixed != 0 {
                    return Err(malformed("plastic row carries fixed-fixed words".to_string()));
                }
                if n_fixed_plastic.div_ceil(2) > body.len() {
                    return Err(malformed(format!(
                        "{} fixed-plastic half-words overrun the row",
                        n_fixed_plastic
                    )));
                }
                if n_fixed_plastic > 0
                    && pp_size < layout.plastic_words(n_fixed_plastic as u32) as usize
                {
                    return Err(malformed(format!(
                        "plastic region of {} words is too small for {} synapses",
                        pp_size, n_fixed_plastic
                    )));
                }
                let state = &words[1..1 + pp_size];
                let first_half = (layout.n_header_words * 2) as usize;
                Ok((0..n_fixed_plastic)
                    .map(|i| {
                        let (index, synapse_type, delay) =
                            self.layout.unpack(get_half_word(body, i));
                        let half = first_half + i * layout.n_half_words_per_synapse as usize;
                        Synapse {
                            index,
                            synapse_type,
                            delay,
                            weight: get_half_word(state, half),
                        }
                    })
                    .collect())
            }
        }
    }
}

fn quantize_weight(connection: &Connection, scale: f64) -> BuildResult<u16> {
    if !connection.weight.is_finite() || connection.weight < 0.0 {
        return Err(BuildError::config(format!(
            "connection {} -> {} has weight {}; weights must be finite and non-negative",
            connection.source, connection.target, connection.weight
        )));
    }
    let scaled = (connection.weight * scale).round();
    if scaled > MAX_WEIGHT {
        warn!(
            target: "neuromap-connectivity",
            "Weight {} of connection {} -> {} saturates at {} with scale {}",
            connection.weight,
            connection.source,
            connection.target,
            u16::MAX,
            scale
        );
        return Ok(u16::MAX);
    }
    Ok(scaled as u16)
}

fn put_half_word(words: &mut [u32], half: usize, value: u16) {
    let shift = (half % 2) * 16;
    words[half / 2] |= u32::from(value) << shift;
}

fn get_half_word(words: &[u32], half: usize) -> u16 {
    let shift = (half % 2) * 16;
    (words[half / 2] >> shift) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{max_row_sizing, MaxConnections, PlasticLayout};

    fn static_codec(scale: f64) -> RowCodec {
        let layout = SynapseWordLayout::new(8, 1, 4).unwrap();
        RowCodec::new(RowFormat::Static, layout, vec![scale, scale], 1.0, 15).unwrap()
    }

    fn sizing(format: RowFormat, undelayed: u32, delayed: u32, stages: u32) -> MaxRowInfo {
        max_row_sizing(format, MaxConnections { undelayed, delayed }, stages, None).unwrap()
    }

    #[test]
    fn test_two_neuron_static_example() {
        let codec = static_codec(256.0);
        let pre = Slice::new(0, 2);
        let post = Slice::new(0, 4);
        let connections = vec![
            Connection::new(0, 0, 1.5, 1.0, 0),
            Connection::new(1, 1, 2.0, 1.0, 0),
        ];
        let info = sizing(RowFormat::Static, 1, 0, 0);
        let encoded = codec.encode(&connections, pre, post, 0, &info).unwrap();
        assert_eq!(encoded.n_undelayed_rows(), 2);
        assert!(encoded.delayed.is_empty());

        // Row 0: [pp=0][n_ff=1][n_fp=0][weight 384, delay 1, type 0, index 0]
        let row0: Vec<u32> = encoded.undelayed[..16]
            .chunks_exact(4)
            .map(LittleEndian::read_u32)
            .collect();
        assert_eq!(row0, vec![0, 1, 0, (384 << 16) | (1 << 9)]);
        let word1 = LittleEndian::read_u32(&encoded.undelayed[28..32]);
        assert_eq!(word1, (512 << 16) | (1 << 9) | 1);

        let decoded = codec
            .decode(&encoded.undelayed, encoded.undelayed_stride, pre, post, 0, false)
            .unwrap();
        assert_eq!(decoded, connections);
    }

    #[test]
    fn test_delay_boundary_goes_to_stage_one() {
        let codec = static_codec(1.0);
        let pre = Slice::new(10, 3);
        let post = Slice::new(0, 4);
        let connections = vec![
            Connection::new(11, 2, 5.0, 15.0, 0),
            Connection::new(11, 3, 5.0, 16.0, 1),
        ];
        let info = sizing(RowFormat::Static, 1, 1, 1);
        let encoded = codec.encode(&connections, pre, post, 1, &info).unwrap();
        assert_eq!(encoded.n_undelayed_rows(), 3);
        assert_eq!(encoded.n_delayed_rows(), 3);

        // Stage 1 row of local source 1, stored delay 1
        let stride = encoded.delayed_stride;
        let word = LittleEndian::read_u32(&encoded.delayed[stride + 12..stride + 16]);
        assert_eq!((word >> 9) & 0xF, 1);

        let undelayed = codec
            .decode(&encoded.undelayed, encoded.undelayed_stride, pre, post, 1, false)
            .unwrap();
        assert_eq!(undelayed, vec![connections[0]]);
        let delayed = codec
            .decode(&encoded.delayed, encoded.delayed_stride, pre, post, 1, true)
            .unwrap();
        assert_eq!(delayed, vec![connections[1]]);
    }

    #[test]
    fn test_plastic_round_trip() {
        let layout = SynapseWordLayout::new(8, 1, 4).unwrap();
        let format = RowFormat::Plastic(PlasticLayout::new(1, 2).unwrap());
        let codec = RowCodec::new(format, layout, vec![16.0], 1.0, 15).unwrap();
        let pre = Slice::new(0, 2);
        let post = Slice::new(100, 8);
        let connections: Vec<Connection> = (0..3)
            .map(|i| Connection::new(1, 100 + i, 0.5 * f64::from(i + 1), 2.0, 0))
            .collect();
        let info = sizing(format, 3, 0, 0);
        let encoded = codec.encode(&connections, pre, post, 0, &info).unwrap();

        // Empty row for source 0 is all zeros
        assert!(encoded.undelayed[..encoded.undelayed_stride].iter().all(|&b| b == 0));
        let decoded = codec
            .decode(&encoded.undelayed, encoded.undelayed_stride, pre, post, 0, false)
            .unwrap();
        assert_eq!(decoded, connections);
    }

    #[test]
    fn test_row_over_maximum_is_rejected() {
        let codec = static_codec(1.0);
        let connections = vec![
            Connection::new(0, 0, 1.0, 1.0, 0),
            Connection::new(0, 1, 1.0, 1.0, 0),
        ];
        let info = sizing(RowFormat::Static, 1, 0, 0);
        let result = codec.encode(&connections, Slice::new(0, 1), Slice::new(0, 2), 0, &info);
        assert!(matches!(result, Err(BuildError::Configuration(_))));
    }

    #[test]
    fn test_weight_checks() {
        let codec = static_codec(256.0);
        let info = sizing(RowFormat::Static, 1, 0, 0);
        let pre = Slice::new(0, 1);
        let post = Slice::new(0, 1);

        let negative = [Connection::new(0, 0, -1.0, 1.0, 0)];
        assert!(codec.encode(&negative, pre, post, 0, &info).is_err());

        let huge = [Connection::new(0, 0, 1000.0, 1.0, 0)];
        let encoded = codec.encode(&huge, pre, post, 0, &info).unwrap();
        let decoded = codec
            .decode(&encoded.undelayed, encoded.undelayed_stride, pre, post, 0, false)
            .unwrap();
        assert_eq!(decoded[0].weight, 65535.0 / 256.0);
    }

    #[test]
    fn test_out_of_slice_and_missing_stage() {
        let codec = static_codec(1.0);
        let info = sizing(RowFormat::Static, 1, 0, 0);
        let outside = [Connection::new(5, 0, 1.0, 1.0, 0)];
        assert!(codec
            .encode(&outside, Slice::new(0, 2), Slice::new(0, 2), 0, &info)
            .is_err());

        let too_slow = [Connection::new(0, 0, 1.0, 20.0, 0)];
        assert!(codec
            .encode(&too_slow, Slice::new(0, 2), Slice::new(0, 2), 0, &info)
            .is_err());
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let codec = static_codec(1.0);
        let pre = Slice::new(0, 2);
        let post = Slice::new(0, 2);
        assert!(matches!(
            codec.decode(&[0u8; 20], 16, pre, post, 0, false),
            Err(DecodeError::MisalignedStride { .. })
        ));
        assert!(matches!(
            codec.decode(&[0u8; 16], 16, pre, post, 0, false),
            Err(DecodeError::Truncated { .. })
        ));

        // n_ff claims more words than the row holds
        let mut raw = vec![0u8; 32];
        LittleEndian::write_u32(&mut raw[4..8], 5);
        assert!(matches!(
            codec.decode(&raw, 16, pre, post, 0, false),
            Err(DecodeError::MalformedRow { row: 0, .. })
        ));
    }

    #[test]
    fn test_direct_round_trip() {
        let codec = static_codec(10.0);
        let pre = Slice::new(4, 3);
        let post = Slice::new(4, 3);
        let connections = vec![
            Connection::new(4, 4, 1.0, 1.0, 0),
            Connection::new(6, 6, 2.0, 3.0, 1),
        ];
        let bytes = codec.encode_direct(&connections, pre, post).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), 0);
        assert_eq!(codec.decode_direct(&bytes, pre, post).unwrap(), connections);

        let duplicate = [connections[0], connections[0]];
        assert!(codec.encode_direct(&duplicate, pre, post).is_err());
    }
}
