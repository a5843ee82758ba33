//! telemetry.rs
//!
//! Operational logging and a JSONL telemetry sink for h2qra.
//!
//! Human-facing messages are single stderr lines with a bracketed scope,
//! e.g. `[cut_set] WARN: ...`. Machine-facing records go to a JSONL file,
//! one object per line.
//!
//! # Environment variables
//!
//! - `H2QRA_TELEMETRY_MODE`: `"off"` (default) disables telemetry,
//!   `"jsonl"` writes JSONL to `H2QRA_TELEMETRY_PATH`.
//! - `H2QRA_TELEMETRY_PATH`: Path to the JSONL file. Required when mode is
//!   `"jsonl"`.
//! - `H2QRA_TELEMETRY_APPEND`: When `"1"`/`"true"`/`"yes"`, appends to an
//!   existing file instead of truncating.
//!
//! Every record carries `"schema_version": 1`; [`TelemetrySink::log_json`]
//! inserts it via [`ensure_schema_v1`] when a producer leaves it out.
//!
//! The sink never fails the analysis: when the file cannot be opened or a
//! write fails, telemetry turns itself off for the rest of the process.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde_json::{json, Value as JsonValue};

use crate::analysis::QraResult;
use crate::risk::RiskMetrics;
use crate::uncertainty::UncertaintyResult;

/// Current telemetry schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Print a one-line warning to stderr under `scope`.
pub fn log_warn(scope: &str, message: &str) {
    eprintln!("[{}] WARN: {}", scope, message);
}

/// Print a one-line informational message to stderr under `scope`.
pub fn log_info(scope: &str, message: &str) {
    eprintln!("[{}] {}", scope, message);
}

/// Ensure a JSON record has `schema_version`. Existing values are kept.
pub fn ensure_schema_v1(record: &mut JsonValue) {
    match record {
        JsonValue::Object(map) => {
            map.entry("schema_version")
                .or_insert_with(|| JsonValue::Number(SCHEMA_VERSION.into()));
        }
        _ => {
            debug_assert!(
                false,
                "ensure_schema_v1: telemetry records should be JSON objects, got {:?}",
                record
            );
        }
    }
}

/// Telemetry mode, controlled by H2QRA_TELEMETRY_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    Jsonl,
}

impl TelemetryMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "jsonl" => TelemetryMode::Jsonl,
            // Unknown values disable telemetry.
            _ => TelemetryMode::Off,
        }
    }

    /// Parse mode from environment. Defaults to Off.
    pub fn from_env() -> Self {
        env::var("H2QRA_TELEMETRY_MODE")
            .map(|s| Self::parse(&s))
            .unwrap_or(TelemetryMode::Off)
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl TelemetryConfig {
    pub fn off() -> Self {
        TelemetryConfig {
            mode: TelemetryMode::Off,
            path: None,
            append: false,
        }
    }

    /// JSONL output to `path`, truncating.
    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        TelemetryConfig {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append: false,
        }
    }

    /// - mode = H2QRA_TELEMETRY_MODE (default Off)
    /// - path = H2QRA_TELEMETRY_PATH (required if mode == Jsonl)
    pub fn from_env() -> Self {
        let mode = TelemetryMode::from_env();
        let path = if mode == TelemetryMode::Jsonl {
            env::var("H2QRA_TELEMETRY_PATH").ok().map(PathBuf::from)
        } else {
            None
        };
        TelemetryConfig {
            mode,
            path,
            append: Self::append_from_env(),
        }
    }

    pub fn append_from_env() -> bool {
        env::var("H2QRA_TELEMETRY_APPEND")
            .ok()
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}

/// A JSONL telemetry sink.
///
/// When mode == Off, all methods are no-ops. When mode == Jsonl the file is
/// opened lazily on first use.
pub struct TelemetrySink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
}

impl TelemetrySink {
    /// Never fails: an invalid configuration logs nothing.
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        TelemetrySink {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == TelemetryMode::Jsonl
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }

        if self.writer.is_none() {
            let path = match &self.path {
                Some(p) => p.clone(),
                None => {
                    log_warn("telemetry", "mode jsonl without H2QRA_TELEMETRY_PATH; disabled");
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            };

            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            let mut options = OpenOptions::new();
            options.create(true).write(true);
            if self.append {
                options.append(true);
            } else {
                options.truncate(true);
            }

            let file = match options.open(&path) {
                Ok(f) => f,
                Err(e) => {
                    log_warn(
                        "telemetry",
                        &format!("cannot open {}: {}; disabled", path.display(), e),
                    );
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            };

            log_info("telemetry", &format!("writing jsonl to {}", path.display()));
            self.writer = Some(BufWriter::new(file));
        }

        self.writer.as_mut()
    }

    /// Log a JSON value as a single line. Write errors disable the sink.
    pub fn log_json(&mut self, value: &JsonValue) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }

        let writer = match self.ensure_writer() {
            Some(w) => w,
            None => return,
        };

        let mut record = value.clone();
        ensure_schema_v1(&mut record);
        let line = match serde_json::to_string(&record) {
            Ok(s) => s,
            Err(_) => return,
        };

        if writeln!(writer, "{}", line).is_err() {
            self.mode = TelemetryMode::Off;
            self.writer = None;
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

// ============================================================================
// Record builders
// ============================================================================

fn metrics_json(m: &RiskMetrics) -> JsonValue {
    json!({ "pll": m.pll, "far": m.far, "air": m.air })
}

/// One record for a deterministic evaluation.
pub fn result_record(result: &QraResult) -> JsonValue {
    let leaks: Vec<JsonValue> = result
        .leaks
        .iter()
        .map(|l| {
            json!({
                "leak_size": l.leak_size.label(),
                "total_frequency": l.cut_set.total,
                "source": l.cut_set.source,
                "release_rate": l.release.mass_flow,
                "ignition_bin": l.event_tree.ignition_bin,
                "frequencies": l.event_tree.frequencies,
                "pll": l.pll,
            })
        })
        .collect();
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "qra_result",
        "metrics": metrics_json(&result.metrics()),
        "leaks": leaks,
    })
}

/// One record per Monte Carlo iteration.
pub fn iteration_record(index: usize, seed: u64, metrics: &RiskMetrics) -> JsonValue {
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "uncertainty_iteration",
        "iteration": index,
        "seed": seed,
        "metrics": metrics_json(metrics),
    })
}

/// Summary record of a completed sweep.
pub fn uncertainty_summary_record(result: &UncertaintyResult) -> JsonValue {
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": "uncertainty_summary",
        "samples": result.samples,
        "base_seed": result.base_seed,
        "pll": result.pll,
        "far": result.far,
        "air": result.air,
    })
}

/// Write the per-iteration records and the summary of a sweep.
pub fn log_uncertainty(sink: &mut TelemetrySink, result: &UncertaintyResult) {
    if !sink.is_enabled() {
        return;
    }
    for it in &result.iterations {
        sink.log_json(&iteration_record(it.index, it.seed, &it.metrics));
    }
    sink.log_json(&uncertainty_summary_record(result));
}
