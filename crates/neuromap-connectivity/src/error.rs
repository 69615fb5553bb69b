// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for synaptic data building and readback
//!
//! Build-direction failures (sizing, index capacity, memory budgets) are
//! reported through [`BuildError`]. Faults found while decoding bytes read back
//! from a device are [`DecodeError`]s, so callers can tell a transport or
//! earlier-build fault apart from a sizing fault.

use thiserror::Error;

use crate::matrix::AccessError;

/// Result type for build operations
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors raised while building, placing or reading back synaptic data
#[derive(Debug, Error)]
pub enum BuildError {
    /// A row needs more words than the row-length field can encode
    #[error("synaptic row of {requested} words is too big; the maximum supported is {max_supported} words")]
    RowTooBig { requested: u32, max_supported: u32 },

    /// Index capacity, alignment, routing or connectivity is inconsistent
    #[error("synaptic configuration error: {0}")]
    Configuration(String),

    /// An allocation would overrun a memory region budget
    #[error("too much synaptic memory in the {region} region: {requested} bytes needed, {available} bytes available")]
    MemoryOverflow {
        region: &'static str,
        requested: usize,
        available: usize,
    },

    /// Bytes read back could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The memory accessor failed
    #[error(transparent)]
    Access(#[from] AccessError),
}

impl BuildError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        BuildError::Configuration(msg.into())
    }
}

/// Errors raised while decoding rows or a packed population table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated data: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("data length {length} is not a multiple of the row stride {stride}")]
    MisalignedStride { length: usize, stride: usize },

    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("malformed population table: {0}")]
    MalformedTable(String),
}
