// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Checks that the synaptic word layout fits its bit budget, the timing is
//! consistent with the delay field, and the memory budgets are usable.

use crate::{ConfigError, ConfigResult, NeuromapConfig};

/// Bits of the control half-word shared by index, type and delay
const CONTROL_BITS: u32 = 16;

/// Matrix addresses are multiples of this many bytes
const BUDGET_ALIGNMENT: usize = 16;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    BitBudget { used: u32, available: u32 },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BitBudget { used, available } => write!(
                f,
                "synapse index, type and delay use {} bits but only {} are available",
                used, available
            ),
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &NeuromapConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_synapse(config, &mut errors);
    validate_timing(config, &mut errors);
    validate_memory(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }
    Ok(())
}

fn validate_synapse(config: &NeuromapConfig, errors: &mut Vec<ConfigValidationError>) {
    let synapse = &config.synapse;
    let used = synapse.n_index_bits + synapse.n_type_bits + synapse.n_delay_bits;
    if used > CONTROL_BITS {
        errors.push(ConfigValidationError::BitBudget {
            used,
            available: CONTROL_BITS,
        });
    }
    if synapse.n_delay_bits == 0 {
        errors.push(invalid("synapse.n_delay_bits", "must be at least 1"));
    }

    if synapse.weight_scales.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "synapse.weight_scales".to_string(),
        });
    }
    if synapse
        .weight_scales
        .iter()
        .any(|scale| !(scale.is_finite() && *scale > 0.0))
    {
        errors.push(invalid("synapse.weight_scales", "every scale must be positive"));
    }
    if synapse.n_type_bits < u32::BITS
        && synapse.weight_scales.len() as u64 > 1u64 << synapse.n_type_bits
    {
        errors.push(invalid(
            "synapse.weight_scales",
            format!(
                "{} scales but {} type bits",
                synapse.weight_scales.len(),
                synapse.n_type_bits
            ),
        ));
    }
    if synapse.plastic_half_words_per_synapse == 0 {
        errors.push(invalid(
            "synapse.plastic_half_words_per_synapse",
            "must be at least 1",
        ));
    }
}

fn validate_timing(config: &NeuromapConfig, errors: &mut Vec<ConfigValidationError>) {
    let timing = &config.timing;
    if !(timing.ticks_per_ms.is_finite() && timing.ticks_per_ms > 0.0) {
        errors.push(invalid("timing.ticks_per_ms", "must be positive"));
    }
    let delay_bits = config.synapse.n_delay_bits.min(CONTROL_BITS);
    let max_delay = (1u32 << delay_bits) - 1;
    if timing.max_delay_per_stage == 0 || timing.max_delay_per_stage > max_delay {
        errors.push(invalid(
            "timing.max_delay_per_stage",
            format!(
                "must be between 1 and {} for {} delay bits",
                max_delay, config.synapse.n_delay_bits
            ),
        ));
    }
}

fn validate_memory(config: &NeuromapConfig, errors: &mut Vec<ConfigValidationError>) {
    let memory = &config.memory;
    for (field, value) in [
        ("memory.synaptic_budget_bytes", memory.synaptic_budget_bytes),
        ("memory.direct_budget_bytes", memory.direct_budget_bytes),
    ] {
        if value % BUDGET_ALIGNMENT != 0 {
            errors.push(invalid(
                field,
                format!("must be a multiple of {} bytes", BUDGET_ALIGNMENT),
            ));
        }
    }
    if memory.synaptic_budget_bytes + memory.direct_budget_bytes > memory.core_capacity_bytes {
        errors.push(invalid(
            "memory.core_capacity_bytes",
            "must hold both the synaptic and direct budgets",
        ));
    }
    if memory.n_synapse_cores == 0 {
        errors.push(invalid("memory.n_synapse_cores", "must be at least 1"));
    }
}

fn validate_logging(config: &NeuromapConfig, errors: &mut Vec<ConfigValidationError>) {
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(invalid(
            "logging.level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if config.logging.log_to_file && config.logging.log_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "logging.log_dir".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let result = validate_config(&NeuromapConfig::default());
        if let Err(e) = &result {
            eprintln!("Validation error: {}", e);
        }
        assert!(result.is_ok());
    }

    #[test]
    fn test_bit_budget() {
        let mut config = NeuromapConfig::default();
        config.synapse.n_index_bits = 12;
        config.synapse.n_delay_bits = 4;

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("17 bits")),
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_stage_delay_must_fit_delay_field() {
        let mut config = NeuromapConfig::default();
        config.timing.max_delay_per_stage = 16;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(ref msg)) if msg.contains("max_delay_per_stage")));

        config.timing.max_delay_per_stage = 15;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = NeuromapConfig::default();
        config.timing.ticks_per_ms = 0.0;
        config.memory.direct_budget_bytes = 100;
        config.synapse.weight_scales = vec![256.0, -1.0];
        config.logging.level = "loud".to_string();

        let Err(ConfigError::ValidationError(msg)) = validate_config(&config) else {
            panic!("expected a validation error");
        };
        assert!(msg.contains("timing.ticks_per_ms"));
        assert!(msg.contains("memory.direct_budget_bytes"));
        assert!(msg.contains("synapse.weight_scales"));
        assert!(msg.contains("logging.level"));
    }
}
