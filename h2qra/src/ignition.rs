// src/ignition.rs
//
// Release-rate-indexed ignition probabilities.
//
// The table is one ordered sequence of bins `{upper_bound, immediate,
// delayed}`; the last bin is unbounded. With thresholds t[0..T):
//   bin 0     : rate <  t[0]
//   bin i     : t[i-1] <= rate < t[i]
//   bin T     : rate >= t[T-1]
// Lookup is a step function. Thresholds and probabilities are only ever
// edited together, so the parallel-array views cannot drift apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::KgPerSecond;

/// One release-rate interval with its ignition probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IgnitionBin {
    /// Exclusive upper bound; `INFINITY` for the last bin.
    upper_bound: f64,
    immediate: f64,
    delayed: f64,
}

impl IgnitionBin {
    pub fn upper_bound(&self) -> Option<KgPerSecond> {
        if self.upper_bound.is_finite() {
            Some(self.upper_bound)
        } else {
            None
        }
    }

    pub fn immediate(&self) -> f64 {
        self.immediate
    }

    pub fn delayed(&self) -> f64 {
        self.delayed
    }
}

/// Parallel-array form used by study files and display layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnitionTableSpec {
    pub thresholds: Vec<f64>,
    pub immediate: Vec<f64>,
    pub delayed: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IgnitionTableSpec", into = "IgnitionTableSpec")]
pub struct IgnitionTable {
    bins: Vec<IgnitionBin>,
}

impl TryFrom<IgnitionTableSpec> for IgnitionTable {
    type Error = IgnitionError;

    fn try_from(spec: IgnitionTableSpec) -> Result<Self, Self::Error> {
        IgnitionTable::new(&spec.thresholds, &spec.immediate, &spec.delayed)
    }
}

impl From<IgnitionTable> for IgnitionTableSpec {
    fn from(t: IgnitionTable) -> Self {
        IgnitionTableSpec {
            thresholds: t.thresholds(),
            immediate: t.immediate(),
            delayed: t.delayed(),
        }
    }
}

impl Default for IgnitionTable {
    fn default() -> Self {
        Self::default_hydrogen()
    }
}

/// Clamp a finite probability into [0, 1]; NaN is rejected.
pub fn clamp_probability(p: f64) -> Result<f64, IgnitionError> {
    if p.is_nan() {
        return Err(IgnitionError::InvalidProbability { value: p });
    }
    Ok(p.clamp(0.0, 1.0))
}

impl IgnitionTable {
    /// Build from parallel arrays. Thresholds must be positive, finite and
    /// strictly increasing; both probability arrays need `T + 1` entries and
    /// are clamped into [0, 1].
    pub fn new(
        thresholds: &[f64],
        immediate: &[f64],
        delayed: &[f64],
    ) -> Result<Self, IgnitionError> {
        if thresholds.is_empty()
            || immediate.len() != thresholds.len() + 1
            || delayed.len() != thresholds.len() + 1
        {
            return Err(IgnitionError::LengthMismatch {
                thresholds: thresholds.len(),
                immediate: immediate.len(),
                delayed: delayed.len(),
            });
        }

        let mut bins = Vec::with_capacity(thresholds.len() + 1);
        let mut prev = 0.0_f64;
        for (i, &t) in thresholds.iter().enumerate() {
            check_threshold(t)?;
            if i > 0 && t <= prev {
                return Err(IgnitionError::NotIncreasing { index: i, value: t });
            }
            prev = t;
            bins.push(IgnitionBin {
                upper_bound: t,
                immediate: clamp_probability(immediate[i])?,
                delayed: clamp_probability(delayed[i])?,
            });
        }
        let last = thresholds.len();
        bins.push(IgnitionBin {
            upper_bound: f64::INFINITY,
            immediate: clamp_probability(immediate[last])?,
            delayed: clamp_probability(delayed[last])?,
        });
        Ok(Self { bins })
    }

    /// Hydrogen defaults: thresholds 0.125 and 6.25 kg/s.
    pub fn default_hydrogen() -> Self {
        Self {
            bins: vec![
                IgnitionBin {
                    upper_bound: 0.125,
                    immediate: 0.008,
                    delayed: 0.004,
                },
                IgnitionBin {
                    upper_bound: 6.25,
                    immediate: 0.053,
                    delayed: 0.027,
                },
                IgnitionBin {
                    upper_bound: f64::INFINITY,
                    immediate: 0.23,
                    delayed: 0.12,
                },
            ],
        }
    }

    pub fn bins(&self) -> &[IgnitionBin] {
        &self.bins
    }

    pub fn thresholds(&self) -> Vec<f64> {
        self.bins.iter().filter_map(IgnitionBin::upper_bound).collect()
    }

    pub fn immediate(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.immediate).collect()
    }

    pub fn delayed(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.delayed).collect()
    }

    /// Index of the bin containing `rate`.
    pub fn bin_index(&self, rate: KgPerSecond) -> usize {
        // Bounds are increasing with an infinite sentinel, so the result is
        // always a valid index.
        self.bins.partition_point(|b| b.upper_bound <= rate)
    }

    /// `(p_immediate, p_delayed)` for a release rate.
    pub fn lookup(&self, rate: KgPerSecond) -> (f64, f64) {
        let bin = &self.bins[self.bin_index(rate).min(self.bins.len() - 1)];
        (bin.immediate, bin.delayed)
    }

    /// Human-readable bin range, e.g. "< 0.125", "0.125 - 6.25", ">= 6.25".
    pub fn bin_label(&self, index: usize) -> Option<String> {
        let bin = self.bins.get(index)?;
        let lower = index.checked_sub(1).map(|i| self.bins[i].upper_bound);
        Some(match (lower, bin.upper_bound()) {
            (None, Some(hi)) => format!("< {}", hi),
            (Some(lo), Some(hi)) => format!("{} - {}", lo, hi),
            (Some(lo), None) => format!(">= {}", lo),
            (None, None) => "all".to_string(),
        })
    }

    /// Insert a threshold, splitting the bin it falls in. The new bin (below
    /// `value`) starts at zero probability; every existing bin keeps its
    /// values. Returns the new bin's index.
    pub fn insert_threshold(&mut self, value: KgPerSecond) -> Result<usize, IgnitionError> {
        check_threshold(value)?;
        if self.bins.iter().any(|b| b.upper_bound == value) {
            return Err(IgnitionError::DuplicateThreshold { value });
        }
        let index = self.bin_index(value);
        self.bins.insert(
            index,
            IgnitionBin {
                upper_bound: value,
                immediate: 0.0,
                delayed: 0.0,
            },
        );
        Ok(index)
    }

    /// Remove a threshold together with the bin it bounds from above. At
    /// least one threshold always remains. Returns the removed bin's index.
    pub fn remove_threshold(&mut self, value: KgPerSecond) -> Result<usize, IgnitionError> {
        let index = self
            .bins
            .iter()
            .position(|b| b.upper_bound == value && value.is_finite())
            .ok_or(IgnitionError::ThresholdNotFound { value })?;
        if self.bins.len() <= 2 {
            return Err(IgnitionError::LastThreshold { value });
        }
        self.bins.remove(index);
        Ok(index)
    }

    /// Set one bin's immediate-ignition probability, clamped into [0, 1].
    /// Returns the stored value.
    pub fn set_immediate(&mut self, bin: usize, p: f64) -> Result<f64, IgnitionError> {
        let p = clamp_probability(p)?;
        self.bin_mut(bin)?.immediate = p;
        Ok(p)
    }

    /// Set one bin's delayed-ignition probability, clamped into [0, 1].
    pub fn set_delayed(&mut self, bin: usize, p: f64) -> Result<f64, IgnitionError> {
        let p = clamp_probability(p)?;
        self.bin_mut(bin)?.delayed = p;
        Ok(p)
    }

    fn bin_mut(&mut self, index: usize) -> Result<&mut IgnitionBin, IgnitionError> {
        let bins = self.bins.len();
        self.bins
            .get_mut(index)
            .ok_or(IgnitionError::BinOutOfRange { index, bins })
    }
}

fn check_threshold(value: f64) -> Result<(), IgnitionError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(IgnitionError::InvalidThreshold { value });
    }
    Ok(())
}

/// Configuration errors for the ignition table. A failed edit leaves the
/// table unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum IgnitionError {
    DuplicateThreshold { value: f64 },
    LastThreshold { value: f64 },
    ThresholdNotFound { value: f64 },
    InvalidThreshold { value: f64 },
    InvalidProbability { value: f64 },
    NotIncreasing { index: usize, value: f64 },
    LengthMismatch {
        thresholds: usize,
        immediate: usize,
        delayed: usize,
    },
    BinOutOfRange { index: usize, bins: usize },
}

impl fmt::Display for IgnitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnitionError::DuplicateThreshold { value } => {
                write!(f, "ignition threshold {} kg/s already exists", value)
            }
            IgnitionError::LastThreshold { value } => write!(
                f,
                "cannot remove ignition threshold {} kg/s: at least one threshold is required",
                value
            ),
            IgnitionError::ThresholdNotFound { value } => {
                write!(f, "no ignition threshold at {} kg/s", value)
            }
            IgnitionError::InvalidThreshold { value } => write!(
                f,
                "ignition threshold {} must be a positive, finite release rate",
                value
            ),
            IgnitionError::InvalidProbability { value } => {
                write!(f, "ignition probability {} is not a number", value)
            }
            IgnitionError::NotIncreasing { index, value } => write!(
                f,
                "ignition thresholds must be strictly increasing (index {} = {})",
                index, value
            ),
            IgnitionError::LengthMismatch {
                thresholds,
                immediate,
                delayed,
            } => write!(
                f,
                "ignition table needs >= 1 threshold and {} probabilities per array; got {} thresholds, {} immediate, {} delayed",
                thresholds + 1,
                thresholds,
                immediate,
                delayed
            ),
            IgnitionError::BinOutOfRange { index, bins } => {
                write!(f, "ignition bin {} out of range (table has {} bins)", index, bins)
            }
        }
    }
}

impl std::error::Error for IgnitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> IgnitionTable {
        IgnitionTable::new(&[1.0, 10.0], &[0.008, 0.05, 0.5], &[0.2, 0.5, 0.7]).unwrap()
    }

    #[test]
    fn lookup_is_a_step_function() {
        let t = sample_table();
        assert_eq!(t.lookup(0.5), (0.008, 0.2));
        assert_eq!(t.lookup(1.0), (0.05, 0.5));
        assert_eq!(t.lookup(9.999), (0.05, 0.5));
        assert_eq!(t.lookup(10.0), (0.5, 0.7));
        assert_eq!(t.lookup(50.0), (0.5, 0.7));
        assert_eq!(t.lookup(0.0), (0.008, 0.2));
    }

    #[test]
    fn construction_validates_shape_and_order() {
        assert!(matches!(
            IgnitionTable::new(&[], &[0.1], &[0.1]),
            Err(IgnitionError::LengthMismatch { .. })
        ));
        assert!(matches!(
            IgnitionTable::new(&[1.0], &[0.1], &[0.1, 0.2]),
            Err(IgnitionError::LengthMismatch { .. })
        ));
        assert!(matches!(
            IgnitionTable::new(&[2.0, 1.0], &[0.1; 3], &[0.1; 3]),
            Err(IgnitionError::NotIncreasing { index: 1, .. })
        ));
        assert!(matches!(
            IgnitionTable::new(&[1.0, 1.0], &[0.1; 3], &[0.1; 3]),
            Err(IgnitionError::NotIncreasing { .. })
        ));
        assert!(matches!(
            IgnitionTable::new(&[-1.0], &[0.1; 2], &[0.1; 2]),
            Err(IgnitionError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn probabilities_are_clamped_on_write() {
        let t = IgnitionTable::new(&[1.0], &[-0.5, 1.5], &[0.3, 2.0]).unwrap();
        assert_eq!(t.immediate(), vec![0.0, 1.0]);
        assert_eq!(t.delayed(), vec![0.3, 1.0]);

        let mut t = sample_table();
        assert_eq!(t.set_immediate(1, 7.0).unwrap(), 1.0);
        assert_eq!(t.set_delayed(0, -3.0).unwrap(), 0.0);
        assert_eq!(t.lookup(2.0).0, 1.0);
        assert!(t.set_immediate(0, f64::NAN).is_err());
        assert!(matches!(
            t.set_delayed(9, 0.1),
            Err(IgnitionError::BinOutOfRange { index: 9, bins: 3 })
        ));
    }

    #[test]
    fn insert_splits_bin_and_keeps_neighbours() {
        let mut t = sample_table();
        let idx = t.insert_threshold(5.0).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(t.thresholds(), vec![1.0, 5.0, 10.0]);
        assert_eq!(t.immediate(), vec![0.008, 0.0, 0.05, 0.5]);
        assert_eq!(t.delayed(), vec![0.2, 0.0, 0.5, 0.7]);

        // Above every threshold: new bin goes just before the unbounded one.
        let idx = t.insert_threshold(100.0).unwrap();
        assert_eq!(idx, 3);
        assert_eq!(t.thresholds(), vec![1.0, 5.0, 10.0, 100.0]);
        assert_eq!(t.immediate(), vec![0.008, 0.0, 0.05, 0.0, 0.5]);
    }

    #[test]
    fn insert_duplicate_rejected_and_table_unchanged() {
        let mut t = sample_table();
        let before = t.clone();
        assert_eq!(
            t.insert_threshold(10.0),
            Err(IgnitionError::DuplicateThreshold { value: 10.0 })
        );
        assert_eq!(t, before);
    }

    #[test]
    fn remove_drops_matching_bin() {
        let mut t = sample_table();
        let idx = t.remove_threshold(1.0).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(t.thresholds(), vec![10.0]);
        assert_eq!(t.immediate(), vec![0.05, 0.5]);
        assert_eq!(t.delayed(), vec![0.5, 0.7]);
    }

    #[test]
    fn last_threshold_cannot_be_removed() {
        let mut t = IgnitionTable::new(&[1.0], &[0.1, 0.2], &[0.3, 0.4]).unwrap();
        let before = t.clone();
        assert_eq!(
            t.remove_threshold(1.0),
            Err(IgnitionError::LastThreshold { value: 1.0 })
        );
        assert_eq!(t, before);
        assert_eq!(
            t.remove_threshold(3.0),
            Err(IgnitionError::ThresholdNotFound { value: 3.0 })
        );
    }

    #[test]
    fn insert_then_remove_round_trips() {
        let original = sample_table();
        for v in [0.1, 1.5, 9.0, 42.0] {
            let mut t = original.clone();
            t.insert_threshold(v).unwrap();
            t.remove_threshold(v).unwrap();
            assert_eq!(t, original, "round trip through {v} changed the table");
        }
    }

    #[test]
    fn bin_labels_describe_ranges() {
        let t = sample_table();
        assert_eq!(t.bin_label(0).as_deref(), Some("< 1"));
        assert_eq!(t.bin_label(1).as_deref(), Some("1 - 10"));
        assert_eq!(t.bin_label(2).as_deref(), Some(">= 10"));
        assert_eq!(t.bin_label(3), None);
    }

    #[test]
    fn parallel_array_form_round_trips_through_json() {
        let t = IgnitionTable::default_hydrogen();
        let json = serde_json::to_string(&t).unwrap();
        let back: IgnitionTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let bad = r#"{"thresholds":[1.0],"immediate":[0.1],"delayed":[0.1,0.2]}"#;
        assert!(serde_json::from_str::<IgnitionTable>(bad).is_err());
    }
}
