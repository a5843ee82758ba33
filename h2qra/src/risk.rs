// src/risk.rs
//
// Headline risk metrics.
//
//   PLL = sum_{leak, ignitable outcome} f * sum_positions p_fatal
//   FAR = PLL * 1e8 / exposed person-hours per year
//   AIR = PLL / positions   (0 with no positions)
//
// Fatality probabilities come from the harm model; this module only
// validates and weights them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{LeakSize, Outcome, PerYear};

/// FAR is quoted per 10^8 exposed person-hours.
pub const FAR_HOURS: f64 = 1.0e8;

/// A group of people sharing the same annual exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupantGroup {
    pub name: String,
    pub count: f64,
    pub hours_per_year: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Exposure {
    groups: Vec<OccupantGroup>,
}

impl Default for Exposure {
    /// Two station workers on a 2000 h/yr schedule.
    fn default() -> Self {
        Self::new(vec![OccupantGroup {
            name: "station staff".to_string(),
            count: 2.0,
            hours_per_year: 2000.0,
        }])
    }
}

impl Exposure {
    pub fn new(groups: Vec<OccupantGroup>) -> Self {
        Self { groups }
    }

    pub fn person_hours(&self) -> f64 {
        self.groups.iter().map(|g| g.count * g.hours_per_year).sum()
    }
}

/// Fatality contribution of one (leak size, ignitable outcome) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskContribution {
    pub leak_size: LeakSize,
    pub outcome: Outcome,
    pub frequency: PerYear,
    /// Sum over positions of the fatality probability.
    pub expected_fatalities: f64,
    pub pll: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RiskMetrics {
    pub pll: f64,
    pub far: f64,
    pub air: f64,
}

/// Weight one outcome frequency by the per-position fatality probabilities.
pub fn contribution(
    leak_size: LeakSize,
    outcome: Outcome,
    frequency: PerYear,
    p_fatal: &[f64],
) -> Result<RiskContribution, RiskError> {
    if !frequency.is_finite() || frequency < 0.0 {
        return Err(RiskError::InvalidRiskInput {
            leak_size,
            outcome,
            field: "frequency",
            value: frequency,
        });
    }
    let mut expected_fatalities = 0.0;
    for &p in p_fatal {
        if !(0.0..=1.0).contains(&p) {
            return Err(RiskError::InvalidRiskInput {
                leak_size,
                outcome,
                field: "p_fatal",
                value: p,
            });
        }
        expected_fatalities += p;
    }
    Ok(RiskContribution {
        leak_size,
        outcome,
        frequency,
        expected_fatalities,
        pll: frequency * expected_fatalities,
    })
}

/// Roll contributions up into PLL, FAR and AIR.
pub fn aggregate(
    contributions: &[RiskContribution],
    positions: usize,
    exposure: &Exposure,
) -> Result<RiskMetrics, RiskError> {
    let person_hours = exposure.person_hours();
    if !person_hours.is_finite() || person_hours <= 0.0 {
        return Err(RiskError::InvalidExposure { person_hours });
    }

    let pll: f64 = contributions.iter().map(|c| c.pll).sum();
    let far = pll * FAR_HOURS / person_hours;
    let air = if positions == 0 {
        0.0
    } else {
        pll / positions as f64
    };
    Ok(RiskMetrics { pll, far, air })
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskError {
    InvalidRiskInput {
        leak_size: LeakSize,
        outcome: Outcome,
        field: &'static str,
        value: f64,
    },
    InvalidExposure {
        person_hours: f64,
    },
}

impl fmt::Display for RiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskError::InvalidRiskInput {
                leak_size,
                outcome,
                field,
                value,
            } => write!(
                f,
                "invalid risk input for leak size {} / {}: {} = {}",
                leak_size, outcome, field, value
            ),
            RiskError::InvalidExposure { person_hours } => write!(
                f,
                "exposure must be a positive, finite number of person-hours (got {})",
                person_hours
            ),
        }
    }
}

impl std::error::Error for RiskError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-300)
    }

    #[test]
    fn pll_far_air_from_two_contributions() {
        let c1 = contribution(LeakSize::Full, Outcome::Jetfire, 1e-4, &[0.5, 0.5]).unwrap();
        let c2 = contribution(LeakSize::Medium, Outcome::Explosion, 2e-4, &[0.25, 0.0]).unwrap();
        assert!(approx_eq(c1.pll, 1e-4, 1e-12));
        assert!(approx_eq(c2.pll, 5e-5, 1e-12));

        let exposure = Exposure::new(vec![OccupantGroup {
            name: "operators".into(),
            count: 2.0,
            hours_per_year: 2000.0,
        }]);
        let m = aggregate(&[c1, c2], 2, &exposure).unwrap();
        assert!(approx_eq(m.pll, 1.5e-4, 1e-12));
        assert!(approx_eq(m.far, 1.5e-4 * 1e8 / 4000.0, 1e-12));
        assert!(approx_eq(m.air, 7.5e-5, 1e-12));
    }

    #[test]
    fn no_positions_means_zero_air() {
        let m = aggregate(&[], 0, &Exposure::default()).unwrap();
        assert_eq!(m, RiskMetrics::default());
    }

    #[test]
    fn bad_inputs_name_leak_size_and_outcome() {
        let err = contribution(LeakSize::Small, Outcome::Explosion, f64::NAN, &[0.1]).unwrap_err();
        assert!(matches!(
            err,
            RiskError::InvalidRiskInput {
                leak_size: LeakSize::Small,
                outcome: Outcome::Explosion,
                field: "frequency",
                ..
            }
        ));
        let err = contribution(LeakSize::Tiny, Outcome::Jetfire, 1e-5, &[0.1, 1.2]).unwrap_err();
        assert!(err.to_string().contains("0.01%"), "{err}");
        assert!(contribution(LeakSize::Tiny, Outcome::Jetfire, -1e-5, &[]).is_err());
        assert!(contribution(LeakSize::Tiny, Outcome::Jetfire, 1e-5, &[-0.1]).is_err());
    }

    #[test]
    fn zero_exposure_rejected() {
        let exposure = Exposure::new(vec![]);
        assert!(matches!(
            aggregate(&[], 1, &exposure),
            Err(RiskError::InvalidExposure { .. })
        ));
    }
}
