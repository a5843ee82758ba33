// src/cut_set.rs
//
// Total leak frequency per leak size.
//
// Computed total = sum over the inventory of (count x component mean), plus
// for the 100% bucket the accident fault-tree frequencies. An override
// replaces the computed value outright. Catalog gaps contribute zero and are
// reported back in the cut set so the caller can warn about them once.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::components::{ComponentInventory, ComponentKind, ComponentLeakCatalog};
use crate::distribution::DistributionError;
use crate::failures::{AccidentContribution, FailureModeCatalog, FuelingDemand};
use crate::types::{LeakSize, PerYear};

/// How the total frequency of one leak size is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencySpec {
    #[default]
    Computed,
    /// User-supplied total, replacing all computed contributions.
    Overridden(PerYear),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencySource {
    Computed,
    Overridden,
}

/// Borrowed view of everything the aggregator reads.
#[derive(Debug, Clone, Copy)]
pub struct CutSetInputs<'a> {
    pub components: &'a ComponentLeakCatalog,
    pub failures: &'a FailureModeCatalog,
    pub inventory: &'a ComponentInventory,
    pub demand: &'a FuelingDemand,
    /// Also report each component's 95th-percentile frequency.
    pub with_percentiles: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentContribution {
    pub component: ComponentKind,
    pub count: f64,
    pub frequency: PerYear,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95: Option<PerYear>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutSet {
    pub leak_size: LeakSize,
    pub total: PerYear,
    pub source: FrequencySource,
    pub components: Vec<ComponentContribution>,
    pub accidents: Vec<AccidentContribution>,
    /// Inventory kinds with no catalog entry at this size.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_components: Vec<ComponentKind>,
    /// Fault-tree modes absent from the failure catalog (100% bucket only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_failure_modes: Vec<String>,
}

/// Aggregate the total leak frequency for `leak_size`.
pub fn aggregate(
    leak_size: LeakSize,
    inputs: &CutSetInputs<'_>,
    frequency: FrequencySpec,
) -> Result<CutSet, CutSetError> {
    if let FrequencySpec::Overridden(value) = frequency {
        if !value.is_finite() || value < 0.0 {
            return Err(CutSetError::InvalidOverride { leak_size, value });
        }
        return Ok(CutSet {
            leak_size,
            total: value,
            source: FrequencySource::Overridden,
            components: Vec::new(),
            accidents: Vec::new(),
            missing_components: Vec::new(),
            missing_failure_modes: Vec::new(),
        });
    }

    let mut components = Vec::new();
    let mut missing_components = Vec::new();
    for (kind, count) in inputs.inventory.iter() {
        let dist = match inputs.components.get(kind, leak_size) {
            Some(d) => d,
            None => {
                if count > 0.0 {
                    missing_components.push(kind);
                }
                continue;
            }
        };
        let p95 = if inputs.with_percentiles {
            Some(count * dist.percentile(0.95)?)
        } else {
            None
        };
        components.push(ComponentContribution {
            component: kind,
            count,
            frequency: count * dist.mean()?,
            p95,
        });
    }

    let (accidents, missing_failure_modes) = if leak_size == LeakSize::Full {
        (
            inputs.failures.accident_frequencies(inputs.demand)?,
            inputs
                .failures
                .missing_fault_tree_modes()
                .into_iter()
                .map(str::to_string)
                .collect(),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    let total = components.iter().map(|c| c.frequency).sum::<f64>()
        + accidents.iter().map(|a| a.frequency).sum::<f64>();

    Ok(CutSet {
        leak_size,
        total,
        source: FrequencySource::Computed,
        components,
        accidents,
        missing_components,
        missing_failure_modes,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum CutSetError {
    InvalidOverride { leak_size: LeakSize, value: f64 },
    Distribution(DistributionError),
}

impl From<DistributionError> for CutSetError {
    fn from(e: DistributionError) -> Self {
        CutSetError::Distribution(e)
    }
}

impl fmt::Display for CutSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutSetError::InvalidOverride { leak_size, value } => write!(
                f,
                "frequency override {} for leak size {} must be finite and >= 0",
                value, leak_size
            ),
            CutSetError::Distribution(e) => write!(f, "cut set: {}", e),
        }
    }
}

impl std::error::Error for CutSetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CutSetError::Distribution(e) => Some(e),
            CutSetError::InvalidOverride { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-300)
    }

    fn single_valve_catalog(size: LeakSize, value: f64) -> ComponentLeakCatalog {
        let mut cat = ComponentLeakCatalog::new();
        cat.insert(
            ComponentKind::Valve,
            size,
            Distribution::ExpectedValue { value },
        )
        .unwrap();
        cat
    }

    #[test]
    fn computed_total_is_count_times_mean() {
        let components = single_valve_catalog(LeakSize::Medium, 2e-6);
        let failures = FailureModeCatalog::default_fueling_station();
        let inventory = ComponentInventory::new().with(ComponentKind::Valve, 5.0);
        let demand = FuelingDemand::default();
        let inputs = CutSetInputs {
            components: &components,
            failures: &failures,
            inventory: &inventory,
            demand: &demand,
            with_percentiles: false,
        };

        let cs = aggregate(LeakSize::Medium, &inputs, FrequencySpec::Computed).unwrap();
        assert_eq!(cs.source, FrequencySource::Computed);
        assert!(approx_eq(cs.total, 1e-5, 1e-12), "total = {}", cs.total);
        assert!(cs.accidents.is_empty(), "accidents only feed the 100% bucket");
        assert_eq!(cs.components.len(), 1);
        assert_eq!(cs.components[0].p95, None);
    }

    #[test]
    fn full_bore_adds_accident_tree() {
        let components = single_valve_catalog(LeakSize::Full, 1e-6);
        let failures = FailureModeCatalog::default_fueling_station();
        let inventory = ComponentInventory::new().with(ComponentKind::Valve, 1.0);
        let demand = FuelingDemand::default();
        let inputs = CutSetInputs {
            components: &components,
            failures: &failures,
            inventory: &inventory,
            demand: &demand,
            with_percentiles: false,
        };

        let cs = aggregate(LeakSize::Full, &inputs, FrequencySpec::Computed).unwrap();
        let accident_total = failures.total_frequency(LeakSize::Full, &demand).unwrap();
        assert!(accident_total > 0.0);
        assert!(approx_eq(cs.total, 1e-6 + accident_total, 1e-12));
        assert_eq!(cs.accidents.len(), 5);
        assert!(cs.missing_failure_modes.is_empty());
    }

    #[test]
    fn override_replaces_everything() {
        let components = ComponentLeakCatalog::default_hydrogen();
        let failures = FailureModeCatalog::default_fueling_station();
        let inventory = ComponentInventory::default_dispenser();
        let demand = FuelingDemand::default();
        let inputs = CutSetInputs {
            components: &components,
            failures: &failures,
            inventory: &inventory,
            demand: &demand,
            with_percentiles: true,
        };

        let cs = aggregate(LeakSize::Full, &inputs, FrequencySpec::Overridden(0.0)).unwrap();
        assert_eq!(cs.total, 0.0, "override of zero must not be additive");
        assert_eq!(cs.source, FrequencySource::Overridden);
        assert!(cs.components.is_empty());
        assert!(cs.accidents.is_empty());

        let cs = aggregate(LeakSize::Tiny, &inputs, FrequencySpec::Overridden(3e-4)).unwrap();
        assert_eq!(cs.total, 3e-4);

        assert!(matches!(
            aggregate(LeakSize::Tiny, &inputs, FrequencySpec::Overridden(-1.0)),
            Err(CutSetError::InvalidOverride { .. })
        ));
    }

    #[test]
    fn missing_entries_contribute_zero_and_are_reported() {
        let components = single_valve_catalog(LeakSize::Small, 1e-5);
        let failures = FailureModeCatalog::new();
        let inventory = ComponentInventory::new()
            .with(ComponentKind::Valve, 1.0)
            .with(ComponentKind::Hose, 2.0)
            .with(ComponentKind::Filter, 0.0);
        let demand = FuelingDemand::default();
        let inputs = CutSetInputs {
            components: &components,
            failures: &failures,
            inventory: &inventory,
            demand: &demand,
            with_percentiles: false,
        };

        let cs = aggregate(LeakSize::Small, &inputs, FrequencySpec::Computed).unwrap();
        assert!(approx_eq(cs.total, 1e-5, 1e-12));
        assert_eq!(cs.missing_components, vec![ComponentKind::Hose]);

        let cs = aggregate(LeakSize::Full, &inputs, FrequencySpec::Computed).unwrap();
        assert_eq!(cs.total, 0.0);
        assert_eq!(cs.missing_failure_modes.len(), 9);
    }

    #[test]
    fn percentile_twin_tracks_distribution_p95() {
        let mut components = ComponentLeakCatalog::new();
        let dist = Distribution::log_normal(-12.0, 1.0).unwrap();
        components
            .insert(ComponentKind::Pipe, LeakSize::Tiny, dist.clone())
            .unwrap();
        let failures = FailureModeCatalog::new();
        let inventory = ComponentInventory::new().with(ComponentKind::Pipe, 10.0);
        let demand = FuelingDemand::none();
        let inputs = CutSetInputs {
            components: &components,
            failures: &failures,
            inventory: &inventory,
            demand: &demand,
            with_percentiles: true,
        };

        let cs = aggregate(LeakSize::Tiny, &inputs, FrequencySpec::Computed).unwrap();
        let row = &cs.components[0];
        let expected = 10.0 * dist.percentile(0.95).unwrap();
        assert!(approx_eq(row.p95.unwrap(), expected, 1e-12));
        assert!(row.p95.unwrap() > row.frequency);
    }
}
