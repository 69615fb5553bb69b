// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Values are layered in this order, later layers winning:
//! 1. TOML file
//! 2. Environment variables
//! 3. CLI arguments

use crate::{ConfigError, ConfigResult, NeuromapConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "neuromap_configuration.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `NEUROMAP_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("NEUROMAP_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by NEUROMAP_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        search_paths.extend(
            cwd.ancestors()
                .skip(1)
                .take(5)
                .map(|dir| dir.join(CONFIG_FILE_NAME)),
        );
    }

    if let Some(found) = search_paths.iter().find(|path| path.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet NEUROMAP_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file and apply overrides
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is missing, contains invalid TOML, or an override
/// value cannot be parsed
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<NeuromapConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: NeuromapConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }
    Ok(config)
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}'", name, value)))
}

fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{} = '{}'", name, value))),
    }
}

/// Comma separated list, e.g. `256,128`
fn parse_list<T: FromStr>(name: &str, value: &str) -> ConfigResult<Vec<T>> {
    value
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| parse_value(name, item))
        .collect()
}

/// Set one setting by its flat name; returns `false` for unknown names
fn apply_setting(config: &mut NeuromapConfig, name: &str, value: &str) -> ConfigResult<bool> {
    match name {
        "n_index_bits" => config.synapse.n_index_bits = parse_value(name, value)?,
        "n_type_bits" => config.synapse.n_type_bits = parse_value(name, value)?,
        "n_delay_bits" => config.synapse.n_delay_bits = parse_value(name, value)?,
        "weight_scales" => config.synapse.weight_scales = parse_list(name, value)?,
        "synaptic_budget_bytes" => {
            config.memory.synaptic_budget_bytes = parse_value(name, value)?
        }
        "direct_budget_bytes" => config.memory.direct_budget_bytes = parse_value(name, value)?,
        "core_capacity_bytes" => config.memory.core_capacity_bytes = parse_value(name, value)?,
        "n_synapse_cores" => config.memory.n_synapse_cores = parse_value(name, value)?,
        "ticks_per_ms" => config.timing.ticks_per_ms = parse_value(name, value)?,
        "max_delay_per_stage" => config.timing.max_delay_per_stage = parse_value(name, value)?,
        "generation" => config.generation.enabled = parse_bool(name, value)?,
        "log_level" => config.logging.level = value.to_string(),
        "log_to_file" => config.logging.log_to_file = parse_bool(name, value)?,
        "log_dir" => config.logging.log_dir = PathBuf::from(value),
        "log_retention_days" => config.logging.retention_days = parse_value(name, value)?,
        "log_retention_runs" => config.logging.retention_runs = parse_value(name, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

/// Settings that can be overridden, by flat name
pub const OVERRIDABLE_SETTINGS: &[&str] = &[
    "n_index_bits",
    "n_type_bits",
    "n_delay_bits",
    "weight_scales",
    "synaptic_budget_bytes",
    "direct_budget_bytes",
    "core_capacity_bytes",
    "n_synapse_cores",
    "ticks_per_ms",
    "max_delay_per_stage",
    "generation",
    "log_level",
    "log_to_file",
    "log_dir",
    "log_retention_days",
    "log_retention_runs",
];

/// Apply environment variable overrides to configuration
///
/// Each name in [`OVERRIDABLE_SETTINGS`] is read from `NEUROMAP_<NAME>`, e.g.
/// `NEUROMAP_TICKS_PER_MS` or `NEUROMAP_WEIGHT_SCALES=256,128`.
pub fn apply_environment_overrides(config: &mut NeuromapConfig) -> ConfigResult<()> {
    for name in OVERRIDABLE_SETTINGS {
        let var = format!("NEUROMAP_{}", name.to_uppercase());
        if let Ok(value) = env::var(&var) {
            apply_setting(config, name, &value)?;
        }
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Flat names to values (e.g., `{"ticks_per_ms": "10"}`)
///
/// # Errors
///
/// Unknown names and unparsable values are `ConfigError::InvalidValue`
pub fn apply_cli_overrides(
    config: &mut NeuromapConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    for (name, value) in cli_args {
        if !apply_setting(config, name, value)? {
            return Err(ConfigError::InvalidValue(format!(
                "unknown setting '{}'; expected one of {}",
                name,
                OVERRIDABLE_SETTINGS.join(", ")
            )));
        }
    }
    Ok(())
}
