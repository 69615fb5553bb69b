// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! On-device connection generation
//!
//! Instead of host-expanded rows, a core can receive a compact description of
//! each matrix and expand the rows itself.

mod descriptor;

pub use descriptor::{
    GeneratorDescriptor, GeneratorHeader, GeneratorRecord, NO_OFFSET, PLASTIC_FORMAT_ID,
    STATIC_FORMAT_ID,
};
