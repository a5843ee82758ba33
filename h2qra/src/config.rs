// src/config.rs
//
// Run configuration for the QRA harness: whether to run the uncertainty
// sweep and how (sample count, base seed, worker threads).
//
// Layering (highest to lowest):
// 1. CLI flags
// 2. Environment (H2QRA_UNCERTAINTY, H2QRA_SAMPLES, H2QRA_SEED, H2QRA_THREADS)
// 3. Study file `analysis:` section
// 4. Defaults
//
// Every env override is echoed to stderr as
// `[config] NAME = value (overrode default)`; unparseable values are
// ignored with a `[config] WARN:` line.

use std::fmt::Display;
use std::str::FromStr;

use crate::uncertainty::UncertaintySettings;

pub const ENV_UNCERTAINTY: &str = "H2QRA_UNCERTAINTY";
pub const ENV_SAMPLES: &str = "H2QRA_SAMPLES";
pub const ENV_SEED: &str = "H2QRA_SEED";
pub const ENV_THREADS: &str = "H2QRA_THREADS";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Run the Monte Carlo sweep after the deterministic pass.
    pub uncertainty_enabled: bool,
    pub uncertainty: UncertaintySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            uncertainty_enabled: false,
            uncertainty: UncertaintySettings::default(),
        }
    }
}

/// Parse a boolean flag ("1"/"true"/"yes"/"on" and their negatives).
pub fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn override_from<T, F>(lookup: &F, name: &str, slot: &mut T)
where
    T: FromStr + Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(v) => {
                *slot = v;
                eprintln!("[config] {} = {} (overrode default)", name, slot);
            }
            Err(_) => {
                eprintln!(
                    "[config] WARN: could not parse {} = {:?}; using {}",
                    name, raw, slot
                );
            }
        }
    }
}

impl Config {
    /// Defaults with environment overrides applied.
    pub fn from_env_or_default() -> Self {
        let mut cfg = Config::default();
        cfg.apply_env();
        cfg
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_UNCERTAINTY) {
            match parse_flag(&raw) {
                Some(v) => {
                    self.uncertainty_enabled = v;
                    eprintln!("[config] {} = {} (overrode default)", ENV_UNCERTAINTY, v);
                }
                None => eprintln!(
                    "[config] WARN: could not parse {} = {:?} as a flag; using {}",
                    ENV_UNCERTAINTY, raw, self.uncertainty_enabled
                ),
            }
        }

        override_from(&lookup, ENV_SAMPLES, &mut self.uncertainty.samples);
        override_from(&lookup, ENV_SEED, &mut self.uncertainty.base_seed);
        override_from(&lookup, ENV_THREADS, &mut self.uncertainty.threads);

        if self.uncertainty.threads == 0 {
            eprintln!("[config] WARN: {} = 0; using 1 worker", ENV_THREADS);
            self.uncertainty.threads = 1;
        }
    }

    /// One-line summary for startup logs.
    pub fn log_startup(&self) {
        eprintln!(
            "h2qra_config version={} uncertainty={} samples={} seed={} threads={}",
            self.version,
            self.uncertainty_enabled,
            self.uncertainty.samples,
            self.uncertainty.base_seed,
            self.uncertainty.threads
        );
    }
}
