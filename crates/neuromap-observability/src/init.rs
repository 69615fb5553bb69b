// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output always; with `file-logging`, also a timestamped run folder:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       ├── neuromap-connectivity.log
//!       ├── neuromap-config.log
//!       └── neuromap.log (combined)
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::LoggingOptions;

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Keeps file writers alive; logs are flushed when it is dropped
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    run_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Folder of this run's log files, if file logging is on
    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(filter: EnvFilter) -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter)
        .boxed()
}

/// Install the global subscriber
///
/// Fails if the run folder cannot be created or a subscriber is already set.
pub fn init_logging(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> Result<LoggingGuard> {
    let filter = debug_flags.to_filter_string(&options.level);
    let env_filter = EnvFilter::try_new(&filter)
        .with_context(|| format!("Invalid log filter: {}", filter))?;

    let mut layers = vec![console_layer(env_filter.clone())];

    #[cfg(feature = "file-logging")]
    let (file_guards, run_dir) = if options.log_to_file {
        let (mut file_layers, guards, run_dir) = file_layers(options, env_filter)?;
        layers.append(&mut file_layers);
        (guards, Some(run_dir))
    } else {
        (Vec::new(), None)
    };
    #[cfg(not(feature = "file-logging"))]
    let run_dir = if options.log_to_file {
        return Err(anyhow!("file logging requested but the file-logging feature is off"));
    } else {
        None
    };

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: file_guards,
        run_dir,
    })
}

#[cfg(feature = "file-logging")]
fn file_layers(
    options: &LoggingOptions,
    env_filter: EnvFilter,
) -> Result<(
    Vec<BoxedLayer>,
    Vec<tracing_appender::non_blocking::WorkerGuard>,
    PathBuf,
)> {
    use tracing_appender::rolling;

    let run_dir = options
        .log_dir
        .join(format!("{}{}", RUN_PREFIX, Utc::now().format(RUN_TIMESTAMP)));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create log directory: {}", run_dir.display()))?;
    cleanup_old_logs(
        &options.log_dir,
        options.retention_days,
        options.retention_runs,
        Utc::now(),
    )?;

    let mut layers = Vec::new();
    let mut guards = Vec::new();
    for crate_name in crate::KNOWN_CRATES {
        let appender = rolling::never(&run_dir, format!("{}.log", crate_name));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_filter(EnvFilter::new(format!("{}=debug,off", crate_name)))
                .boxed(),
        );
    }

    let combined = rolling::never(&run_dir, "neuromap.log");
    let (writer, guard) = tracing_appender::non_blocking(combined);
    guards.push(guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed(),
    );
    Ok((layers, guards, run_dir))
}

fn run_time(dir_name: &str) -> Option<DateTime<Utc>> {
    let stamp = dir_name.strip_prefix(RUN_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, RUN_TIMESTAMP)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Remove run folders older than `retention_days`, then all but the newest `retention_runs`
///
/// Returns the number of folders removed. Folders that fail to delete are skipped.
pub fn cleanup_old_logs(
    base_log_dir: &Path,
    retention_days: u64,
    retention_runs: usize,
    now: DateTime<Utc>,
) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }
    let cutoff = now - chrono::Duration::days(retention_days as i64);

    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(time) = path.file_name().and_then(|n| n.to_str()).and_then(run_time) {
            runs.push((path, time));
        }
    }
    // Newest first
    runs.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (index, (path, time)) in runs.iter().enumerate() {
        if index < retention_runs && *time >= cutoff {
            continue;
        }
        match std::fs::remove_dir_all(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!(
                "Warning: Failed to remove old log directory {}: {}",
                path.display(),
                e
            ),
        }
    }
    Ok(removed)
}

/// Console-only logging at the configured level
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingOptions::default())
}
