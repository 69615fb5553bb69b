// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # neuromap-observability
//!
//! Logging setup shared by the neuromap crates and tools, with per-crate
//! debug flags.
//!
//! ## Features
//! - `file-logging`: per-run log folders with retention (default)

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known crate names for debug flags; these are also the tracing targets
pub const KNOWN_CRATES: &[&str] = &["neuromap", "neuromap-connectivity", "neuromap-config"];
