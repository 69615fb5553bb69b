// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synaptic row codec
//!
//! A row holds the synapses from one source neuron (or one delay stage of
//! one source neuron) to the neurons of a target core:
//!
//! ```text
//! [pp_size][pp_size words][n_fixed_fixed][n_fixed_plastic][fixed-fixed words][fixed-plastic half-words]
//! ```

mod codec;
mod format;
mod sizing;

pub use codec::{EncodedRows, RowCodec};
pub use format::{
    row_stride_bytes, PlasticLayout, RowFormat, SynapseWordLayout, BYTES_PER_WORD,
    ROW_HEADER_WORDS,
};
pub use sizing::{
    delay_to_ticks, max_row_sizing, n_delay_stages, split_delay, MaxConnections, MaxRowInfo,
};
