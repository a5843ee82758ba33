// src/event_tree.rs
//
// Release event tree. A release of frequency f is either isolated
// (shutdown) or sustained; a sustained release ignites immediately
// (jetfire), ignites later (explosion) or disperses (no ignition):
//
//   f_shutdown  = f * pS
//   f'          = f - f_shutdown
//   f_jetfire   = f' * pI
//   f_explosion = f' * (1 - pI) * pD
//   f_no_ign    = f' - f_jetfire - f_explosion
//
// (pI, pD) come from the ignition table at the release rate.

use std::fmt;

use serde::Serialize;

use crate::ignition::IgnitionTable;
use crate::types::{KgPerSecond, Outcome, PerYear};

/// Relative tolerance of the conservation check.
pub const CONSERVATION_TOLERANCE: f64 = 1e-9;

/// Absolute tolerance for a total of `total`. Floored at the smallest
/// normal float so subnormal totals do not get a zero tolerance.
pub fn conservation_tolerance(total: f64) -> f64 {
    (CONSERVATION_TOLERANCE * total).max(f64::MIN_POSITIVE)
}

/// One value per terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OutcomeValues {
    pub shutdown: f64,
    pub jetfire: f64,
    pub explosion: f64,
    pub no_ignition: f64,
}

impl OutcomeValues {
    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Shutdown => self.shutdown,
            Outcome::Jetfire => self.jetfire,
            Outcome::Explosion => self.explosion,
            Outcome::NoIgnition => self.no_ignition,
        }
    }

    pub fn sum(&self) -> f64 {
        self.shutdown + self.jetfire + self.explosion + self.no_ignition
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTreeOutcome {
    pub total_frequency: PerYear,
    pub release_rate: KgPerSecond,
    pub p_shutdown: f64,
    pub p_immediate: f64,
    pub p_delayed: f64,
    /// Ignition bin the release rate fell into.
    pub ignition_bin: usize,
    pub frequencies: OutcomeValues,
    /// Frequencies divided by the total; all zero when the total is zero.
    pub probabilities: OutcomeValues,
}

/// Partition `total_frequency` over the four outcomes.
pub fn evaluate(
    total_frequency: PerYear,
    release_rate: KgPerSecond,
    p_shutdown: f64,
    ignition: &IgnitionTable,
) -> Result<EventTreeOutcome, EventTreeError> {
    if !total_frequency.is_finite() || total_frequency < 0.0 {
        return Err(EventTreeError::InvalidInput {
            field: "total_frequency",
            value: total_frequency,
        });
    }
    if !release_rate.is_finite() || release_rate < 0.0 {
        return Err(EventTreeError::InvalidInput {
            field: "release_rate",
            value: release_rate,
        });
    }
    if !(0.0..=1.0).contains(&p_shutdown) {
        return Err(EventTreeError::InvalidInput {
            field: "p_shutdown",
            value: p_shutdown,
        });
    }

    let f = total_frequency;
    let ignition_bin = ignition.bin_index(release_rate);
    let (p_immediate, p_delayed) = ignition.lookup(release_rate);

    let shutdown = f * p_shutdown;
    // Subtracting keeps shutdown + sustained == f exactly.
    let sustained = f - shutdown;
    let jetfire = sustained * p_immediate;
    let explosion = sustained * (1.0 - p_immediate) * p_delayed;
    let mut no_ignition = sustained - jetfire - explosion;

    let tol = conservation_tolerance(f);
    // Cancellation can leave a rounding-sized negative remainder.
    if no_ignition < 0.0 && -no_ignition <= tol {
        no_ignition = 0.0;
    }

    let frequencies = OutcomeValues {
        shutdown,
        jetfire,
        explosion,
        no_ignition,
    };
    check_conservation(f, &frequencies)?;

    let probabilities = if f > 0.0 {
        OutcomeValues {
            shutdown: shutdown / f,
            jetfire: jetfire / f,
            explosion: explosion / f,
            no_ignition: no_ignition / f,
        }
    } else {
        OutcomeValues::default()
    };

    Ok(EventTreeOutcome {
        total_frequency: f,
        release_rate,
        p_shutdown,
        p_immediate,
        p_delayed,
        ignition_bin,
        frequencies,
        probabilities,
    })
}

fn check_conservation(total: f64, v: &OutcomeValues) -> Result<(), EventTreeError> {
    for outcome in Outcome::ALL {
        let x = v.get(outcome);
        if x.is_nan() || x < 0.0 {
            return Err(EventTreeError::InvariantViolation {
                total,
                sum: v.sum(),
                detail: format!("{} frequency {} is negative", outcome, x),
            });
        }
    }
    let sum = v.sum();
    if (sum - total).abs() > conservation_tolerance(total) {
        return Err(EventTreeError::InvariantViolation {
            total,
            sum,
            detail: "outcome frequencies do not sum to the total".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventTreeError {
    InvalidInput { field: &'static str, value: f64 },
    /// Internal defect: outcomes failed the conservation check.
    InvariantViolation {
        total: f64,
        sum: f64,
        detail: String,
    },
}

impl fmt::Display for EventTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTreeError::InvalidInput { field, value } => {
                write!(f, "event tree: invalid {} = {}", field, value)
            }
            EventTreeError::InvariantViolation { total, sum, detail } => write!(
                f,
                "event tree invariant violated (total {}, outcome sum {}): {}",
                total, sum, detail
            ),
        }
    }
}

impl std::error::Error for EventTreeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-300)
    }

    fn table() -> IgnitionTable {
        IgnitionTable::new(&[1.0, 10.0], &[0.008, 0.05, 0.5], &[0.2, 0.5, 0.7]).unwrap()
    }

    #[test]
    fn ten_percent_leak_partitions_as_expected() {
        let out = evaluate(1e-5, 2.0, 0.1, &table()).unwrap();
        let fr = out.frequencies;
        assert!(approx_eq(fr.shutdown, 1e-6, 1e-12), "shutdown {}", fr.shutdown);
        assert!(approx_eq(fr.jetfire, 4.5e-7, 1e-12), "jetfire {}", fr.jetfire);
        assert!(approx_eq(fr.explosion, 4.275e-6, 1e-12), "explosion {}", fr.explosion);
        assert!(approx_eq(fr.no_ignition, 4.275e-6, 1e-9), "no ignition {}", fr.no_ignition);
        assert_eq!((out.p_immediate, out.p_delayed), (0.05, 0.5));
        assert_eq!(out.ignition_bin, 1);
        assert!(approx_eq(out.probabilities.shutdown, 0.1, 1e-12));
        assert!(approx_eq(out.probabilities.sum(), 1.0, 1e-9));
    }

    #[test]
    fn zero_frequency_gives_zero_everything() {
        let out = evaluate(0.0, 50.0, 0.3, &table()).unwrap();
        assert_eq!(out.frequencies, OutcomeValues::default());
        assert_eq!(out.probabilities, OutcomeValues::default());
    }

    #[test]
    fn certain_shutdown_diverts_all() {
        let out = evaluate(2e-4, 5.0, 1.0, &table()).unwrap();
        assert_eq!(out.frequencies.shutdown, 2e-4);
        assert_eq!(out.frequencies.jetfire, 0.0);
        assert_eq!(out.frequencies.explosion, 0.0);
        assert_eq!(out.frequencies.no_ignition, 0.0);
    }

    #[test]
    fn certain_ignition_leaves_no_unignited_release() {
        let t = IgnitionTable::new(&[1.0], &[0.3, 0.3], &[1.0, 1.0]).unwrap();
        let out = evaluate(1.0, 0.5, 0.0, &t).unwrap();
        assert!(out.frequencies.no_ignition >= 0.0);
        assert!(out.frequencies.no_ignition < 1e-12);
        assert!(approx_eq(out.frequencies.sum(), 1.0, 1e-12));
    }

    #[test]
    fn subnormal_frequency_is_conserved() {
        for f in [5e-324, 1e-310, f64::MIN_POSITIVE] {
            for ps in [0.0, 0.1, 0.5, 1.0] {
                let out = evaluate(f, 1.0, ps, &IgnitionTable::default_hydrogen())
                    .unwrap_or_else(|e| panic!("f = {f:e}, pS = {ps}: {e}"));
                let sum = out.frequencies.sum();
                assert!(
                    (sum - f).abs() <= conservation_tolerance(f),
                    "f = {f:e}, pS = {ps}: sum {sum:e}"
                );
            }
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let t = table();
        for (f, r, ps, field) in [
            (-1e-5, 1.0, 0.1, "total_frequency"),
            (f64::NAN, 1.0, 0.1, "total_frequency"),
            (f64::INFINITY, 1.0, 0.1, "total_frequency"),
            (1e-5, -2.0, 0.1, "release_rate"),
            (1e-5, 1.0, 1.5, "p_shutdown"),
            (1e-5, 1.0, f64::NAN, "p_shutdown"),
        ] {
            match evaluate(f, r, ps, &t) {
                Err(EventTreeError::InvalidInput { field: got, .. }) => assert_eq!(got, field),
                other => panic!("expected InvalidInput for {field}, got {other:?}"),
            }
        }
    }
}
