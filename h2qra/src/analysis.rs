// src/analysis.rs
//
// One QRA evaluation pass:
//   cut set -> release conditions -> event tree -> harm weighting -> metrics
//
// `QraSession` owns the editable inputs. Evaluation always runs on a
// `SessionSnapshot`, an owned copy that is never mutated, so a Monte Carlo
// sweep can share it across threads while the session is edited.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;

use crate::components::{ComponentInventory, ComponentLeakCatalog};
use crate::consequence::{
    HarmModel, ReleaseConditions, ReleaseModel, TabulatedHarm, TabulatedRelease,
};
use crate::cut_set::{self, CutSet, CutSetError, CutSetInputs, FrequencySpec};
use crate::distribution::DistributionError;
use crate::error::QraError;
use crate::event_tree::{self, EventTreeOutcome};
use crate::failures::{FailureModeCatalog, FuelingDemand};
use crate::ignition::IgnitionTable;
use crate::risk::{self, Exposure, RiskContribution, RiskMetrics};
use crate::telemetry::log_warn;
use crate::types::{LeakSize, Outcome, PerYear};

/// Release model shared between snapshots.
pub type SharedRelease = Arc<dyn ReleaseModel + Send + Sync>;
/// Harm model shared between snapshots.
pub type SharedHarm = Arc<dyn HarmModel + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateOptions {
    /// Report 95th-percentile twins of each component frequency.
    pub with_percentiles: bool,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakResult {
    pub leak_size: LeakSize,
    pub release: ReleaseConditions,
    pub cut_set: CutSet,
    pub event_tree: EventTreeOutcome,
    /// PLL contribution of each ignitable outcome.
    pub risk: Vec<RiskContribution>,
    pub pll: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankingRow {
    pub leak_size: LeakSize,
    pub outcome: Outcome,
    pub frequency: PerYear,
    pub pll: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QraResult {
    /// One entry per leak size, smallest first.
    pub leaks: Vec<LeakResult>,
    pub total_pll: f64,
    pub far: f64,
    pub air: f64,
    /// Leak size x outcome, highest PLL contribution first.
    pub ranking: Vec<RankingRow>,
}

impl QraResult {
    pub fn metrics(&self) -> RiskMetrics {
        RiskMetrics {
            pll: self.total_pll,
            far: self.far,
            air: self.air,
        }
    }

    pub fn leak(&self, leak_size: LeakSize) -> Option<&LeakResult> {
        self.leaks.iter().find(|l| l.leak_size == leak_size)
    }

    /// Catalog gaps that contributed zero, one line each.
    pub fn catalog_gaps(&self) -> Vec<String> {
        let mut gaps = Vec::new();
        for leak in &self.leaks {
            for kind in &leak.cut_set.missing_components {
                gaps.push(format!(
                    "no leak frequency for component '{}' at {}; counted as zero",
                    kind, leak.leak_size
                ));
            }
            for name in &leak.cut_set.missing_failure_modes {
                gaps.push(format!(
                    "failure mode '{}' missing from catalog; counted as zero",
                    name
                ));
            }
        }
        gaps
    }
}

fn rank(leaks: &[LeakResult]) -> Vec<RankingRow> {
    let mut rows: Vec<RankingRow> = leaks
        .iter()
        .flat_map(|l| {
            Outcome::ALL.into_iter().map(move |outcome| RankingRow {
                leak_size: l.leak_size,
                outcome,
                frequency: l.event_tree.frequencies.get(outcome),
                pll: l
                    .risk
                    .iter()
                    .find(|c| c.outcome == outcome)
                    .map_or(0.0, |c| c.pll),
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.pll
            .total_cmp(&a.pll)
            .then_with(|| b.frequency.total_cmp(&a.frequency))
    });
    rows
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable inputs of one evaluation.
#[derive(Clone)]
pub struct SessionSnapshot {
    pub components: ComponentLeakCatalog,
    pub failures: FailureModeCatalog,
    pub inventory: ComponentInventory,
    pub demand: FuelingDemand,
    pub ignition: IgnitionTable,
    pub frequencies: BTreeMap<LeakSize, FrequencySpec>,
    pub exposure: Exposure,
    pub release: SharedRelease,
    pub harm: SharedHarm,
}

impl SessionSnapshot {
    pub fn frequency_spec(&self, leak_size: LeakSize) -> FrequencySpec {
        self.frequencies
            .get(&leak_size)
            .copied()
            .unwrap_or_default()
    }

    /// Run the full pipeline for every leak size.
    pub fn evaluate(&self, opts: EvaluateOptions) -> Result<QraResult, QraError> {
        let inputs = CutSetInputs {
            components: &self.components,
            failures: &self.failures,
            inventory: &self.inventory,
            demand: &self.demand,
            with_percentiles: opts.with_percentiles,
        };
        let p_shutdown = self.failures.shutdown_probability()?;

        let mut leaks = Vec::with_capacity(LeakSize::ALL.len());
        let mut contributions = Vec::new();
        for leak_size in LeakSize::ALL {
            let cut_set = cut_set::aggregate(leak_size, &inputs, self.frequency_spec(leak_size))?;
            let release = self.release.release(leak_size)?;
            let tree =
                event_tree::evaluate(cut_set.total, release.mass_flow, p_shutdown, &self.ignition)
                    .map_err(|e| QraError::event_tree_at(leak_size, e))?;

            let mut risk_rows = Vec::with_capacity(Outcome::IGNITABLE.len());
            for outcome in Outcome::IGNITABLE {
                let p_fatal = self.harm.fatality_probabilities(leak_size, outcome)?;
                risk_rows.push(risk::contribution(
                    leak_size,
                    outcome,
                    tree.frequencies.get(outcome),
                    &p_fatal,
                )?);
            }
            let pll = risk_rows.iter().map(|c| c.pll).sum();
            contributions.extend(risk_rows.iter().cloned());

            leaks.push(LeakResult {
                leak_size,
                release,
                cut_set,
                event_tree: tree,
                risk: risk_rows,
                pll,
            });
        }

        let metrics = risk::aggregate(&contributions, self.harm.positions(), &self.exposure)?;
        let ranking = rank(&leaks);
        Ok(QraResult {
            leaks,
            total_pll: metrics.pll,
            far: metrics.far,
            air: metrics.air,
            ranking,
        })
    }

    /// Copy with both catalogs replaced by one draw of every distribution.
    pub fn resample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self, DistributionError> {
        let mut drawn = self.clone();
        drawn.components = self.components.resample(rng)?;
        drawn.failures = self.failures.resample(rng)?;
        Ok(drawn)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Editable analysis inputs. Mutations go through validated catalog
/// operations; evaluation works on a snapshot.
#[derive(Clone)]
pub struct QraSession {
    components: ComponentLeakCatalog,
    failures: FailureModeCatalog,
    inventory: ComponentInventory,
    demand: FuelingDemand,
    ignition: IgnitionTable,
    frequencies: BTreeMap<LeakSize, FrequencySpec>,
    exposure: Exposure,
    release: SharedRelease,
    harm: SharedHarm,
}

impl Default for QraSession {
    /// Default hydrogen catalogs and a dispenser with one occupant position.
    fn default() -> Self {
        Self {
            components: ComponentLeakCatalog::default_hydrogen(),
            failures: FailureModeCatalog::default_fueling_station(),
            inventory: ComponentInventory::default_dispenser(),
            demand: FuelingDemand::default(),
            ignition: IgnitionTable::default_hydrogen(),
            frequencies: BTreeMap::new(),
            exposure: Exposure::default(),
            release: Arc::new(TabulatedRelease::default_dispenser()),
            harm: Arc::new(TabulatedHarm::uniform(1, 0.0)),
        }
    }
}

impl QraSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn components(&self) -> &ComponentLeakCatalog {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentLeakCatalog {
        &mut self.components
    }

    pub fn failures(&self) -> &FailureModeCatalog {
        &self.failures
    }

    pub fn failures_mut(&mut self) -> &mut FailureModeCatalog {
        &mut self.failures
    }

    pub fn ignition(&self) -> &IgnitionTable {
        &self.ignition
    }

    pub fn ignition_mut(&mut self) -> &mut IgnitionTable {
        &mut self.ignition
    }

    pub fn inventory(&self) -> &ComponentInventory {
        &self.inventory
    }

    pub fn set_components(&mut self, components: ComponentLeakCatalog) {
        self.components = components;
    }

    pub fn set_failures(&mut self, failures: FailureModeCatalog) {
        self.failures = failures;
    }

    pub fn set_ignition(&mut self, ignition: IgnitionTable) {
        self.ignition = ignition;
    }

    pub fn set_inventory(&mut self, inventory: ComponentInventory) {
        self.inventory = inventory;
    }

    pub fn set_demand(&mut self, demand: FuelingDemand) {
        self.demand = demand;
    }

    pub fn set_exposure(&mut self, exposure: Exposure) {
        self.exposure = exposure;
    }

    pub fn set_release_model(&mut self, release: SharedRelease) {
        self.release = release;
    }

    pub fn set_harm_model(&mut self, harm: SharedHarm) {
        self.harm = harm;
    }

    pub fn frequency_spec(&self, leak_size: LeakSize) -> FrequencySpec {
        self.frequencies
            .get(&leak_size)
            .copied()
            .unwrap_or_default()
    }

    /// Choose computed or overridden total frequency for one leak size.
    /// An invalid override is rejected and the previous setting kept.
    pub fn set_frequency(
        &mut self,
        leak_size: LeakSize,
        spec: FrequencySpec,
    ) -> Result<(), CutSetError> {
        if let FrequencySpec::Overridden(value) = spec {
            if !value.is_finite() || value < 0.0 {
                return Err(CutSetError::InvalidOverride { leak_size, value });
            }
        }
        match spec {
            FrequencySpec::Computed => {
                self.frequencies.remove(&leak_size);
            }
            FrequencySpec::Overridden(_) => {
                self.frequencies.insert(leak_size, spec);
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            components: self.components.clone(),
            failures: self.failures.clone(),
            inventory: self.inventory.clone(),
            demand: self.demand,
            ignition: self.ignition.clone(),
            frequencies: self.frequencies.clone(),
            exposure: self.exposure.clone(),
            release: Arc::clone(&self.release),
            harm: Arc::clone(&self.harm),
        }
    }

    /// Evaluate a snapshot of the current inputs and warn once about each
    /// catalog gap.
    pub fn evaluate(&self, opts: EvaluateOptions) -> Result<QraResult, QraError> {
        let result = self.snapshot().evaluate(opts)?;
        for gap in result.catalog_gaps() {
            log_warn("cut_set", &gap);
        }
        Ok(result)
    }
}
