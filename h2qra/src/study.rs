// src/study.rs
//
// Study file parsing and validation.
//
// A study describes one facility analysis:
// - study_id + study_version for tracking
// - analysis settings (uncertainty flag, samples, seed, threads)
// - component inventory and fueling demand
// - optional replacements for the default catalogs and ignition table
// - per-leak-size frequency overrides
// - release model (orifice estimate or table), harm table, exposure
//
// Sections left out fall back to the built-in hydrogen defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::QraSession;
use crate::components::{ComponentInventory, ComponentLeakCatalog};
use crate::config::Config;
use crate::consequence::{HarmModel, TabulatedHarm, TabulatedRelease};
use crate::cut_set::FrequencySpec;
use crate::error::QraError;
use crate::failures::{FailureModeCatalog, FuelingDemand};
use crate::ignition::IgnitionTable;
use crate::risk::{Exposure, OccupantGroup};
use crate::types::LeakSize;

/// Current study schema version.
pub const STUDY_SCHEMA_VERSION: u32 = 1;

/// `analysis:` section. Absent keys keep the configured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    #[serde(default)]
    pub uncertainty: Option<bool>,
    #[serde(default)]
    pub samples: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub threads: Option<usize>,
}

impl AnalysisSection {
    pub fn apply_to(&self, cfg: &mut Config) {
        if let Some(v) = self.uncertainty {
            cfg.uncertainty_enabled = v;
        }
        if let Some(v) = self.samples {
            cfg.uncertainty.samples = v;
        }
        if let Some(v) = self.seed {
            cfg.uncertainty.base_seed = v;
        }
        if let Some(v) = self.threads {
            cfg.uncertainty.threads = v;
        }
    }
}

/// Choked-orifice release estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrificeSpec {
    /// Pipe inner diameter, m.
    pub pipe_diameter: f64,
    /// Stagnation pressure, Pa.
    pub pressure: f64,
    /// Stagnation temperature, K.
    pub temperature: f64,
    #[serde(default = "default_discharge_coefficient")]
    pub discharge_coefficient: f64,
}

fn default_discharge_coefficient() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseSpec {
    Orifice(OrificeSpec),
    Table(TabulatedRelease),
}

impl ReleaseSpec {
    fn build(&self) -> Result<TabulatedRelease, QraError> {
        match self {
            ReleaseSpec::Orifice(o) => Ok(TabulatedRelease::choked_orifice(
                o.pipe_diameter,
                o.pressure,
                o.temperature,
                o.discharge_coefficient,
            )?),
            ReleaseSpec::Table(t) => Ok(t.clone()),
        }
    }
}

/// One facility analysis as read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySpec {
    pub study_id: String,
    pub study_version: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub inventory: Option<ComponentInventory>,
    #[serde(default)]
    pub demand: Option<FuelingDemand>,
    #[serde(default)]
    pub components: Option<ComponentLeakCatalog>,
    #[serde(default)]
    pub failure_modes: Option<FailureModeCatalog>,
    #[serde(default)]
    pub ignition: Option<IgnitionTable>,
    /// Total frequency per leak size, replacing the computed value.
    #[serde(default)]
    pub frequency_overrides: BTreeMap<LeakSize, f64>,
    #[serde(default)]
    pub release: Option<ReleaseSpec>,
    #[serde(default)]
    pub harm: Option<TabulatedHarm>,
    #[serde(default)]
    pub exposure: Option<Vec<OccupantGroup>>,
}

impl StudySpec {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, StudyError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| StudyError::IoError {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, StudyError> {
        let spec: StudySpec = serde_yaml::from_str(yaml).map_err(|e| StudyError::ParseError {
            source: e.to_string(),
        })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), StudyError> {
        if self.study_id.trim().is_empty() {
            return Err(invalid("study_id", "study_id cannot be empty"));
        }
        if self.study_version == 0 || self.study_version > STUDY_SCHEMA_VERSION {
            return Err(invalid(
                "study_version",
                &format!("study_version must be in 1..={}", STUDY_SCHEMA_VERSION),
            ));
        }
        if self.analysis.samples == Some(0) {
            return Err(invalid("analysis.samples", "samples must be >= 1"));
        }
        if self.analysis.threads == Some(0) {
            return Err(invalid("analysis.threads", "threads must be >= 1"));
        }

        if let Some(d) = &self.demand {
            for (field, v) in [
                ("demand.vehicles", d.vehicles),
                ("demand.fuelings_per_day", d.fuelings_per_day),
                ("demand.operating_days", d.operating_days),
            ] {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(field, &format!("must be finite and >= 0, got {}", v)));
                }
            }
        }

        if let Some(inv) = &self.inventory {
            for (kind, count) in inv.iter() {
                if !count.is_finite() || count < 0.0 {
                    return Err(invalid(
                        &format!("inventory.{}", kind),
                        &format!("count must be finite and >= 0, got {}", count),
                    ));
                }
            }
        }

        for (size, &v) in &self.frequency_overrides {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(
                    &format!("frequency_overrides.{}", size),
                    &format!("must be finite and >= 0, got {}", v),
                ));
            }
        }

        if let Some(harm) = &self.harm {
            for e in &harm.entries {
                let field = format!("harm.{}.{}", e.leak_size, e.outcome);
                if !e.outcome.is_ignitable() {
                    return Err(invalid(&field, "only jetfire and explosion carry harm"));
                }
                if e.p_fatal.len() != harm.positions() {
                    return Err(invalid(
                        &field,
                        &format!(
                            "{} probabilities for {} positions",
                            e.p_fatal.len(),
                            harm.positions()
                        ),
                    ));
                }
                if let Some(p) = e.p_fatal.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                    return Err(invalid(&field, &format!("probability {} outside [0, 1]", p)));
                }
            }
        }

        if let Some(groups) = &self.exposure {
            for g in groups {
                if !g.count.is_finite() || g.count < 0.0 {
                    return Err(invalid(
                        &format!("exposure.{}", g.name),
                        "count must be finite and >= 0",
                    ));
                }
                if !g.hours_per_year.is_finite() || !(0.0..=8784.0).contains(&g.hours_per_year) {
                    return Err(invalid(
                        &format!("exposure.{}", g.name),
                        "hours_per_year must be within [0, 8784]",
                    ));
                }
            }
            let hours: f64 = groups.iter().map(|g| g.count * g.hours_per_year).sum();
            if hours <= 0.0 {
                return Err(invalid("exposure", "total exposed person-hours must be > 0"));
            }
        }

        Ok(())
    }

    /// Apply the `analysis:` section beneath whatever `cfg` already holds
    /// from defaults. Call before environment and CLI overrides.
    pub fn apply_analysis(&self, cfg: &mut Config) {
        self.analysis.apply_to(cfg);
    }

    /// Session seeded with defaults and every section this study provides.
    pub fn build_session(&self) -> Result<QraSession, QraError> {
        let mut session = QraSession::default();
        if let Some(c) = &self.components {
            session.set_components(c.clone());
        }
        if let Some(f) = &self.failure_modes {
            session.set_failures(f.clone());
        }
        if let Some(inv) = &self.inventory {
            session.set_inventory(inv.clone());
        }
        if let Some(d) = self.demand {
            session.set_demand(d);
        }
        if let Some(t) = &self.ignition {
            session.set_ignition(t.clone());
        }
        for (&size, &value) in &self.frequency_overrides {
            session.set_frequency(size, FrequencySpec::Overridden(value))?;
        }
        if let Some(r) = &self.release {
            session.set_release_model(Arc::new(r.build()?));
        }
        if let Some(h) = &self.harm {
            session.set_harm_model(Arc::new(h.clone()));
        }
        if let Some(groups) = &self.exposure {
            session.set_exposure(Exposure::new(groups.clone()));
        }
        Ok(session)
    }
}

fn invalid(field: &str, message: &str) -> StudyError {
    StudyError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Errors that can occur when loading a study.
#[derive(Debug, Clone, PartialEq)]
pub enum StudyError {
    IoError { path: String, source: String },
    ParseError { source: String },
    ValidationError { field: String, message: String },
}

impl std::fmt::Display for StudyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudyError::IoError { path, source } => {
                write!(f, "Failed to read study file '{}': {}", path, source)
            }
            StudyError::ParseError { source } => {
                write!(f, "Failed to parse study YAML: {}", source)
            }
            StudyError::ValidationError { field, message } => {
                write!(f, "Study validation error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for StudyError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EvaluateOptions;
    use crate::components::ComponentKind;

    const MINIMAL: &str = r#"
study_id: minimal
study_version: 1
"#;

    const FULL: &str = r#"
study_id: dispenser_a
study_version: 1
description: Single dispenser, two operators
analysis:
  uncertainty: true
  samples: 200
  seed: 11
inventory:
  valve: 4
  hose: 1
  pipe: 15.5
demand:
  vehicles: 10
  fuelings_per_day: 1
  operating_days: 300
ignition:
  thresholds: [1.0, 10.0]
  immediate: [0.008, 0.05, 0.5]
  delayed: [0.2, 0.5, 0.7]
frequency_overrides:
  "100%": 1.0e-3
release:
  table:
    "0.01%": { mass_flow: 0.0001, diameter: 0.0001 }
    "0.1%": { mass_flow: 0.001, diameter: 0.0003 }
    "1%": { mass_flow: 0.01, diameter: 0.001 }
    "10%": { mass_flow: 2.0, diameter: 0.003 }
    "100%": { mass_flow: 20.0, diameter: 0.0095 }
harm:
  positions: [dispenser, kiosk]
  entries:
    - { leak_size: "100%", outcome: jetfire, p_fatal: [0.9, 0.1] }
    - { leak_size: "100%", outcome: explosion, p_fatal: [0.5, 0.05] }
exposure:
  - { name: operators, count: 2, hours_per_year: 2000 }
"#;

    #[test]
    fn minimal_study_uses_defaults() {
        let spec = StudySpec::from_yaml_str(MINIMAL).unwrap();
        assert!(spec.components.is_none());
        let session = spec.build_session().unwrap();
        assert_eq!(session.ignition(), &IgnitionTable::default_hydrogen());
        assert!(session.evaluate(EvaluateOptions::default()).is_ok());
    }

    #[test]
    fn full_study_parses_and_builds() {
        let spec = StudySpec::from_yaml_str(FULL).unwrap();
        assert_eq!(spec.study_id, "dispenser_a");
        assert_eq!(spec.inventory.as_ref().unwrap().count(ComponentKind::Pipe), 15.5);
        assert_eq!(spec.frequency_overrides.get(&LeakSize::Full), Some(&1.0e-3));

        let session = spec.build_session().unwrap();
        assert_eq!(
            session.frequency_spec(LeakSize::Full),
            FrequencySpec::Overridden(1.0e-3)
        );
        let r = session.evaluate(EvaluateOptions::default()).unwrap();
        let full = r.leak(LeakSize::Full).unwrap();
        assert_eq!(full.cut_set.total, 1.0e-3);
        // 20 kg/s falls into the top bin.
        assert_eq!(full.event_tree.p_immediate, 0.5);
        assert!(r.total_pll > 0.0);
    }

    #[test]
    fn analysis_section_layers_under_config() {
        let spec = StudySpec::from_yaml_str(FULL).unwrap();
        let mut cfg = Config::default();
        spec.apply_analysis(&mut cfg);
        assert!(cfg.uncertainty_enabled);
        assert_eq!(cfg.uncertainty.samples, 200);
        assert_eq!(cfg.uncertainty.base_seed, 11);
        assert_eq!(cfg.uncertainty.threads, 1, "absent key keeps the default");
    }

    #[test]
    fn validation_errors_name_the_field() {
        let cases = [
            ("study_id: ''\nstudy_version: 1\n", "study_id"),
            ("study_id: x\nstudy_version: 0\n", "study_version"),
            (
                "study_id: x\nstudy_version: 1\nanalysis: { samples: 0 }\n",
                "analysis.samples",
            ),
            (
                "study_id: x\nstudy_version: 1\nfrequency_overrides: { \"10%\": -1.0 }\n",
                "frequency_overrides.10%",
            ),
            (
                "study_id: x\nstudy_version: 1\nexposure: [{ name: a, count: 0, hours_per_year: 100 }]\n",
                "exposure",
            ),
            (
                "study_id: x\nstudy_version: 1\nharm: { positions: [a], entries: [{ leak_size: \"1%\", outcome: jetfire, p_fatal: [1.5] }] }\n",
                "harm.1%.jetfire",
            ),
            (
                "study_id: x\nstudy_version: 1\nharm: { positions: [a], entries: [{ leak_size: \"1%\", outcome: shutdown, p_fatal: [0.1] }] }\n",
                "harm.1%.shutdown",
            ),
        ];
        for (yaml, field) in cases {
            match StudySpec::from_yaml_str(yaml) {
                Err(StudyError::ValidationError { field: got, .. }) => {
                    assert_eq!(got, field, "yaml: {yaml}")
                }
                other => panic!("expected ValidationError({field}), got {other:?}"),
            }
        }
    }

    #[test]
    fn bad_catalog_values_fail_to_parse() {
        let yaml = r#"
study_id: x
study_version: 1
ignition:
  thresholds: [5.0, 1.0]
  immediate: [0.1, 0.2, 0.3]
  delayed: [0.1, 0.2, 0.3]
"#;
        assert!(matches!(
            StudySpec::from_yaml_str(yaml),
            Err(StudyError::ParseError { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = StudySpec::from_yaml_file("/nonexistent/study.yaml").unwrap_err();
        assert!(matches!(err, StudyError::IoError { .. }));
        assert!(err.to_string().contains("/nonexistent/study.yaml"));
    }
}
