// src/failures.rs
//
// Failure-mode catalog: per-demand failure probabilities for the dispenser
// accident fault tree, plus the dedicated shutdown (detection + isolation)
// mode feeding the event tree.
//
// Accident-triggered releases only feed the 100% leak-size bucket.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::components::CatalogError;
use crate::distribution::{Distribution, DistributionError, DistributionFamily, DistributionStats};
use crate::types::{LeakSize, PerYear};

pub const NOZZLE_POP_OFF: &str = "nozzle_pop_off";
pub const NOZZLE_FTC: &str = "nozzle_ftc";
pub const BREAKAWAY_FTC: &str = "breakaway_ftc";
pub const PRV_FTO: &str = "prv_fto";
pub const MANUAL_VALVE_FTC: &str = "manual_valve_ftc";
pub const SOLENOID_FTC: &str = "solenoid_ftc";
pub const SOLENOID_COMMON_CAUSE: &str = "solenoid_common_cause";
pub const OVERPRESSURE: &str = "overpressure";
pub const DRIVEOFF: &str = "driveoff";
pub const DETECTION_ISOLATION: &str = "detection_isolation";

/// Names consumed by the built-in accident fault tree.
const FAULT_TREE_NAMES: [&str; 9] = [
    NOZZLE_POP_OFF,
    NOZZLE_FTC,
    BREAKAWAY_FTC,
    PRV_FTO,
    MANUAL_VALVE_FTC,
    SOLENOID_FTC,
    SOLENOID_COMMON_CAUSE,
    OVERPRESSURE,
    DRIVEOFF,
];

/// How a failure mode enters the analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureRole {
    /// Per-demand probability feeding the 100% release fault tree.
    #[default]
    AccidentRelease,
    /// Probability that a release is detected and isolated (pShutdown).
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureMode {
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub role: FailureRole,
    pub distribution: Distribution,
}

impl FailureMode {
    pub fn new(name: &str, mode: &str, role: FailureRole, distribution: Distribution) -> Self {
        Self {
            name: name.to_string(),
            mode: mode.to_string(),
            role,
            distribution,
        }
    }
}

/// Annual fueling demand driving the accident fault tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelingDemand {
    pub vehicles: f64,
    pub fuelings_per_day: f64,
    pub operating_days: f64,
}

impl Default for FuelingDemand {
    fn default() -> Self {
        Self {
            vehicles: 20.0,
            fuelings_per_day: 2.0,
            operating_days: 250.0,
        }
    }
}

impl FuelingDemand {
    /// No fueling: accident releases contribute nothing.
    pub fn none() -> Self {
        Self {
            vehicles: 0.0,
            fuelings_per_day: 0.0,
            operating_days: 0.0,
        }
    }

    /// Fueling demands per year. Non-finite or negative inputs count as zero.
    pub fn annual_demands(&self) -> f64 {
        let d = self.vehicles * self.fuelings_per_day * self.operating_days;
        if d.is_finite() {
            d.max(0.0)
        } else {
            0.0
        }
    }
}

/// Branch of the accident fault tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccidentScenario {
    DriveOff,
    NozzleRelease,
    OverpressureRupture,
    ManualValve,
    SolenoidValves,
    /// A user-defined accident mode entering as demand x probability.
    Other(String),
}

impl fmt::Display for AccidentScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccidentScenario::DriveOff => f.write_str("drive_off"),
            AccidentScenario::NozzleRelease => f.write_str("nozzle_release"),
            AccidentScenario::OverpressureRupture => f.write_str("overpressure_rupture"),
            AccidentScenario::ManualValve => f.write_str("manual_valve"),
            AccidentScenario::SolenoidValves => f.write_str("solenoid_valves"),
            AccidentScenario::Other(name) => write!(f, "other:{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccidentContribution {
    pub scenario: AccidentScenario,
    pub frequency: PerYear,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureModeStats {
    pub name: String,
    pub mode: String,
    pub role: FailureRole,
    pub family: DistributionFamily,
    pub param_a: f64,
    pub param_b: Option<f64>,
    #[serde(flatten)]
    pub stats: DistributionStats,
}

/// Named failure modes. Serialized as a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FailureMode>", into = "Vec<FailureMode>")]
pub struct FailureModeCatalog {
    modes: BTreeMap<String, FailureMode>,
}

impl TryFrom<Vec<FailureMode>> for FailureModeCatalog {
    type Error = CatalogError;

    fn try_from(modes: Vec<FailureMode>) -> Result<Self, Self::Error> {
        let mut catalog = FailureModeCatalog::new();
        for mode in modes {
            catalog.insert(mode)?;
        }
        Ok(catalog)
    }
}

impl From<FailureModeCatalog> for Vec<FailureMode> {
    fn from(catalog: FailureModeCatalog) -> Self {
        catalog.modes.into_values().collect()
    }
}

impl FailureModeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispenser failure modes of a gaseous fueling station.
    pub fn default_fueling_station() -> Self {
        use FailureRole::{AccidentRelease, Shutdown};
        let rows = [
            (
                NOZZLE_POP_OFF,
                "Nozzle pop-off",
                AccidentRelease,
                Distribution::Beta {
                    alpha: 0.5,
                    beta: 610_415.5,
                },
            ),
            (
                NOZZLE_FTC,
                "Nozzle failure to close",
                AccidentRelease,
                Distribution::ExpectedValue { value: 0.002 },
            ),
            (
                BREAKAWAY_FTC,
                "Breakaway coupling failure to close",
                AccidentRelease,
                Distribution::Beta {
                    alpha: 0.5,
                    beta: 5_031.0,
                },
            ),
            (
                PRV_FTO,
                "Pressure-relief valve failure to open",
                AccidentRelease,
                Distribution::LogNormal {
                    mu: -11.7359,
                    sigma: 0.6729,
                },
            ),
            (
                MANUAL_VALVE_FTC,
                "Manual valve failure to close",
                AccidentRelease,
                Distribution::ExpectedValue { value: 0.001 },
            ),
            (
                SOLENOID_FTC,
                "Solenoid valve failure to close",
                AccidentRelease,
                Distribution::LogNormal {
                    mu: -5.2471,
                    sigma: 0.5744,
                },
            ),
            (
                SOLENOID_COMMON_CAUSE,
                "Solenoid valves common-cause failure",
                AccidentRelease,
                Distribution::ExpectedValue { value: 1.28e-4 },
            ),
            (
                OVERPRESSURE,
                "Overpressure during fueling",
                AccidentRelease,
                Distribution::Beta {
                    alpha: 3.5,
                    beta: 310_289.5,
                },
            ),
            (
                DRIVEOFF,
                "Vehicle drive-off while connected",
                AccidentRelease,
                Distribution::Beta {
                    alpha: 31.5,
                    beta: 610_384.5,
                },
            ),
            (
                DETECTION_ISOLATION,
                "Gas detection and automatic isolation",
                Shutdown,
                Distribution::ExpectedValue { value: 0.9 },
            ),
        ];

        let modes = rows
            .into_iter()
            .map(|(name, mode, role, dist)| (name.to_string(), FailureMode::new(name, mode, role, dist)))
            .collect();
        Self { modes }
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FailureMode> {
        self.modes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FailureMode> + '_ {
        self.modes.values()
    }

    /// Insert or replace a mode after validating its distribution, its
    /// probability range and shutdown-mode uniqueness.
    pub fn insert(&mut self, mode: FailureMode) -> Result<(), CatalogError> {
        Self::check_probability(&mode.name, &mode.distribution)?;
        if mode.role == FailureRole::Shutdown {
            if let Some(existing) = self.shutdown_mode() {
                if existing.name != mode.name {
                    return Err(CatalogError::DuplicateShutdownMode {
                        existing: existing.name.clone(),
                        added: mode.name,
                    });
                }
            }
        }
        self.modes.insert(mode.name.clone(), mode);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<FailureMode> {
        self.modes.remove(name)
    }

    /// Replace the distribution (possibly switching family).
    pub fn set_distribution(&mut self, name: &str, dist: Distribution) -> Result<(), CatalogError> {
        Self::check_probability(name, &dist)?;
        self.mode_mut(name)?.distribution = dist;
        Ok(())
    }

    pub fn set_params(
        &mut self,
        name: &str,
        param_a: f64,
        param_b: Option<f64>,
    ) -> Result<(), CatalogError> {
        let mut next = self.mode_mut(name)?.distribution;
        next.set_from_mu_sigma(param_a, param_b)?;
        self.set_distribution(name, next)
    }

    pub fn set_median(&mut self, name: &str, median: f64) -> Result<(), CatalogError> {
        let mut next = self.mode_mut(name)?.distribution;
        next.set_from_median(median)?;
        self.set_distribution(name, next)
    }

    fn mode_mut(&mut self, name: &str) -> Result<&mut FailureMode, CatalogError> {
        self.modes
            .get_mut(name)
            .ok_or_else(|| CatalogError::UnknownFailureMode {
                name: name.to_string(),
            })
    }

    fn check_probability(name: &str, dist: &Distribution) -> Result<(), CatalogError> {
        let mean = dist.mean()?;
        if !(0.0..=1.0).contains(&mean) {
            return Err(CatalogError::ProbabilityOutOfRange {
                name: name.to_string(),
                mean,
            });
        }
        Ok(())
    }

    pub fn shutdown_mode(&self) -> Option<&FailureMode> {
        self.modes.values().find(|m| m.role == FailureRole::Shutdown)
    }

    /// Mean of the shutdown mode; zero when none is configured.
    pub fn shutdown_probability(&self) -> Result<f64, DistributionError> {
        match self.shutdown_mode() {
            Some(m) => m.distribution.mean(),
            None => Ok(0.0),
        }
    }

    /// Mean probability of a named mode; zero when it is absent.
    pub fn probability_or_zero(&self, name: &str) -> Result<f64, DistributionError> {
        match self.modes.get(name) {
            Some(m) => m.distribution.mean(),
            None => Ok(0.0),
        }
    }

    /// Names the fault tree references that this catalog lacks.
    pub fn missing_fault_tree_modes(&self) -> Vec<&'static str> {
        FAULT_TREE_NAMES
            .iter()
            .copied()
            .filter(|n| !self.modes.contains_key(*n))
            .collect()
    }

    /// Annual release frequency of each accident fault-tree branch.
    pub fn accident_frequencies(
        &self,
        demand: &FuelingDemand,
    ) -> Result<Vec<AccidentContribution>, DistributionError> {
        let d = demand.annual_demands();
        let p = |name: &str| self.probability_or_zero(name);

        let mut out = vec![
            AccidentContribution {
                scenario: AccidentScenario::DriveOff,
                frequency: d * p(DRIVEOFF)? * p(BREAKAWAY_FTC)?,
            },
            AccidentContribution {
                scenario: AccidentScenario::NozzleRelease,
                frequency: d * (p(NOZZLE_POP_OFF)? + p(NOZZLE_FTC)?),
            },
            AccidentContribution {
                scenario: AccidentScenario::OverpressureRupture,
                frequency: d * p(OVERPRESSURE)? * p(PRV_FTO)?,
            },
            AccidentContribution {
                scenario: AccidentScenario::ManualValve,
                frequency: d * p(MANUAL_VALVE_FTC)?,
            },
            AccidentContribution {
                scenario: AccidentScenario::SolenoidValves,
                frequency: d * (p(SOLENOID_FTC)?.powi(3) + p(SOLENOID_COMMON_CAUSE)?),
            },
        ];

        for mode in self.modes.values() {
            if mode.role == FailureRole::AccidentRelease
                && !FAULT_TREE_NAMES.contains(&mode.name.as_str())
            {
                out.push(AccidentContribution {
                    scenario: AccidentScenario::Other(mode.name.clone()),
                    frequency: d * mode.distribution.mean()?,
                });
            }
        }
        Ok(out)
    }

    /// Total accident frequency at `size`: the fault-tree sum for the 100%
    /// bucket, zero for every other size.
    pub fn total_frequency(
        &self,
        size: LeakSize,
        demand: &FuelingDemand,
    ) -> Result<PerYear, DistributionError> {
        if size != LeakSize::Full {
            return Ok(0.0);
        }
        Ok(self
            .accident_frequencies(demand)?
            .iter()
            .map(|c| c.frequency)
            .sum())
    }

    pub fn statistics(&self) -> Result<Vec<FailureModeStats>, DistributionError> {
        self.modes
            .values()
            .map(|m| {
                Ok(FailureModeStats {
                    name: m.name.clone(),
                    mode: m.mode.clone(),
                    role: m.role,
                    family: m.distribution.family(),
                    param_a: m.distribution.param_a(),
                    param_b: m.distribution.param_b(),
                    stats: m.distribution.stats()?,
                })
            })
            .collect()
    }

    /// New catalog with each probability replaced by one draw clamped to
    /// [0, 1]. `self` is left untouched.
    pub fn resample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self, DistributionError> {
        let mut modes = BTreeMap::new();
        for (name, m) in &self.modes {
            let value = m.distribution.sample(rng)?.clamp(0.0, 1.0);
            let mut drawn = m.clone();
            drawn.distribution = Distribution::ExpectedValue { value };
            modes.insert(name.clone(), drawn);
        }
        Ok(Self { modes })
    }
}
