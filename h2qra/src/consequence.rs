// src/consequence.rs
//
// Seams to the external physics and harm models.
//
// The QRA core never computes flame or overpressure physics. It asks a
// `ReleaseModel` for the mass flow and diameter of each leak size and a
// `HarmModel` for per-position fatality probabilities of each ignitable
// outcome. Tabulated implementations cover study files and tests; a
// choked-orifice estimate gives a usable default release table.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{KgPerSecond, LeakSize, Outcome};

/// Hydrogen specific gas constant, J/(kg K).
const R_H2: f64 = 4124.2;
/// Hydrogen heat capacity ratio.
const GAMMA_H2: f64 = 1.41;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReleaseConditions {
    pub mass_flow: KgPerSecond,
    /// Leak diameter in metres.
    pub diameter: f64,
}

/// Release physics for each leak size.
pub trait ReleaseModel {
    fn release(&self, leak_size: LeakSize) -> Result<ReleaseConditions, ConsequenceError>;
}

/// Fatality probabilities per occupant position.
pub trait HarmModel {
    /// Number of occupant positions every result vector covers.
    fn positions(&self) -> usize;

    /// One probability per position for an ignitable outcome.
    fn fatality_probabilities(
        &self,
        leak_size: LeakSize,
        outcome: Outcome,
    ) -> Result<Vec<f64>, ConsequenceError>;
}

/// Release conditions looked up from a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabulatedRelease {
    entries: BTreeMap<LeakSize, ReleaseConditions>,
}

impl TabulatedRelease {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, leak_size: LeakSize, mass_flow: KgPerSecond, diameter: f64) -> Self {
        self.entries.insert(
            leak_size,
            ReleaseConditions {
                mass_flow,
                diameter,
            },
        );
        self
    }

    /// Choked flow of an ideal gas through each leak orifice. The leak
    /// area is the bucket's fraction of the pipe flow area.
    pub fn choked_orifice(
        pipe_diameter: f64,
        pressure_pa: f64,
        temperature_k: f64,
        discharge_coefficient: f64,
    ) -> Result<Self, ConsequenceError> {
        for (field, value) in [
            ("pipe_diameter", pipe_diameter),
            ("pressure", pressure_pa),
            ("temperature", temperature_k),
            ("discharge_coefficient", discharge_coefficient),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConsequenceError::InvalidParameter { field, value });
            }
        }

        let g = GAMMA_H2;
        let flux_factor =
            (g / (R_H2 * temperature_k) * (2.0 / (g + 1.0)).powf((g + 1.0) / (g - 1.0))).sqrt();

        let mut table = Self::new();
        for size in LeakSize::ALL {
            let diameter = pipe_diameter * size.area_fraction().sqrt();
            let area = std::f64::consts::PI * diameter * diameter / 4.0;
            let mass_flow = discharge_coefficient * area * pressure_pa * flux_factor;
            table = table.with(size, mass_flow, diameter);
        }
        Ok(table)
    }

    /// 9.52 mm (3/8") tubing at 35 MPa and 288 K.
    pub fn default_dispenser() -> Self {
        let table = Self::choked_orifice(0.009_525, 35.0e6, 288.15, 1.0);
        table.unwrap_or_default()
    }

    pub fn get(&self, leak_size: LeakSize) -> Option<&ReleaseConditions> {
        self.entries.get(&leak_size)
    }
}

impl ReleaseModel for TabulatedRelease {
    fn release(&self, leak_size: LeakSize) -> Result<ReleaseConditions, ConsequenceError> {
        let rc = self
            .entries
            .get(&leak_size)
            .copied()
            .ok_or(ConsequenceError::MissingRelease { leak_size })?;
        for (field, value) in [("mass_flow", rc.mass_flow), ("diameter", rc.diameter)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConsequenceError::InvalidRelease {
                    leak_size,
                    field,
                    value,
                });
            }
        }
        Ok(rc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmEntry {
    pub leak_size: LeakSize,
    pub outcome: Outcome,
    pub p_fatal: Vec<f64>,
}

/// Fatality probabilities looked up from a table. Absent (leak size,
/// outcome) pairs are harmless at every position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabulatedHarm {
    pub positions: Vec<String>,
    #[serde(default)]
    pub entries: Vec<HarmEntry>,
}

impl TabulatedHarm {
    pub fn new(positions: Vec<String>) -> Self {
        Self {
            positions,
            entries: Vec::new(),
        }
    }

    /// Every position fatal with the same probability for every ignitable
    /// outcome at every leak size.
    pub fn uniform(positions: usize, p_fatal: f64) -> Self {
        let names = (0..positions).map(|i| format!("position_{}", i + 1)).collect();
        let mut harm = Self::new(names);
        for size in LeakSize::ALL {
            for outcome in Outcome::IGNITABLE {
                harm = harm.with(size, outcome, vec![p_fatal; positions]);
            }
        }
        harm
    }

    /// Insert or replace the row for `(leak_size, outcome)`.
    pub fn with(mut self, leak_size: LeakSize, outcome: Outcome, p_fatal: Vec<f64>) -> Self {
        self.entries
            .retain(|e| !(e.leak_size == leak_size && e.outcome == outcome));
        self.entries.push(HarmEntry {
            leak_size,
            outcome,
            p_fatal,
        });
        self
    }
}

impl HarmModel for TabulatedHarm {
    fn positions(&self) -> usize {
        self.positions.len()
    }

    fn fatality_probabilities(
        &self,
        leak_size: LeakSize,
        outcome: Outcome,
    ) -> Result<Vec<f64>, ConsequenceError> {
        match self
            .entries
            .iter()
            .find(|e| e.leak_size == leak_size && e.outcome == outcome)
        {
            Some(e) if e.p_fatal.len() != self.positions.len() => {
                Err(ConsequenceError::PositionMismatch {
                    leak_size,
                    outcome,
                    expected: self.positions.len(),
                    got: e.p_fatal.len(),
                })
            }
            Some(e) => Ok(e.p_fatal.clone()),
            None => Ok(vec![0.0; self.positions.len()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsequenceError {
    MissingRelease {
        leak_size: LeakSize,
    },
    InvalidRelease {
        leak_size: LeakSize,
        field: &'static str,
        value: f64,
    },
    InvalidParameter {
        field: &'static str,
        value: f64,
    },
    PositionMismatch {
        leak_size: LeakSize,
        outcome: Outcome,
        expected: usize,
        got: usize,
    },
}

impl fmt::Display for ConsequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsequenceError::MissingRelease { leak_size } => {
                write!(f, "no release conditions for leak size {}", leak_size)
            }
            ConsequenceError::InvalidRelease {
                leak_size,
                field,
                value,
            } => write!(f, "leak size {}: invalid {} = {}", leak_size, field, value),
            ConsequenceError::InvalidParameter { field, value } => {
                write!(f, "release model: {} must be positive and finite, got {}", field, value)
            }
            ConsequenceError::PositionMismatch {
                leak_size,
                outcome,
                expected,
                got,
            } => write!(
                f,
                "harm table {} / {}: {} probabilities for {} positions",
                leak_size, outcome, got, expected
            ),
        }
    }
}

impl std::error::Error for ConsequenceError {}
