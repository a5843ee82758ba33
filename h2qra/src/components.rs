// src/components.rs
//
// Component leak-frequency catalog and facility component inventory.
//
// One distribution per (component kind x leak size), in leaks per component
// per year (pipes: per metre per year). Iteration is BTreeMap-ordered so that
// resampling consumes random draws in a fixed order.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::distribution::{Distribution, DistributionError, DistributionFamily, DistributionStats};
use crate::types::{LeakSize, PerYear};

/// Closed set of leak-prone component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Compressor,
    Cylinder,
    Filter,
    Flange,
    Hose,
    Joint,
    /// Counted per metre.
    Pipe,
    Valve,
    Instrument,
    Exchanger,
    Vaporizer,
    Arm,
    Extra1,
    Extra2,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 14] = [
        ComponentKind::Compressor,
        ComponentKind::Cylinder,
        ComponentKind::Filter,
        ComponentKind::Flange,
        ComponentKind::Hose,
        ComponentKind::Joint,
        ComponentKind::Pipe,
        ComponentKind::Valve,
        ComponentKind::Instrument,
        ComponentKind::Exchanger,
        ComponentKind::Vaporizer,
        ComponentKind::Arm,
        ComponentKind::Extra1,
        ComponentKind::Extra2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Compressor => "compressor",
            ComponentKind::Cylinder => "cylinder",
            ComponentKind::Filter => "filter",
            ComponentKind::Flange => "flange",
            ComponentKind::Hose => "hose",
            ComponentKind::Joint => "joint",
            ComponentKind::Pipe => "pipe",
            ComponentKind::Valve => "valve",
            ComponentKind::Instrument => "instrument",
            ComponentKind::Exchanger => "exchanger",
            ComponentKind::Vaporizer => "vaporizer",
            ComponentKind::Arm => "arm",
            ComponentKind::Extra1 => "extra1",
            ComponentKind::Extra2 => "extra2",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the bulk statistics table.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentLeakStats {
    pub component: ComponentKind,
    pub leak_size: LeakSize,
    pub family: DistributionFamily,
    pub param_a: f64,
    pub param_b: Option<f64>,
    #[serde(flatten)]
    pub stats: DistributionStats,
}

/// Leak-frequency distributions keyed by component kind and leak size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentLeakCatalog {
    entries: BTreeMap<ComponentKind, BTreeMap<LeakSize, Distribution>>,
}

impl ComponentLeakCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log-normal hydrogen leak-frequency priors for every built-in kind
    /// except the two user-defined extras.
    pub fn default_hydrogen() -> Self {
        // (mu, sigma) per leak size, smallest first.
        const TABLE: [(ComponentKind, [(f64, f64); 5]); 12] = [
            (
                ComponentKind::Compressor,
                [
                    (-1.7198, 0.2143),
                    (-3.9185, 0.4841),
                    (-5.1394, 0.7898),
                    (-8.8408, 0.8381),
                    (-11.3365, 1.3689),
                ],
            ),
            (
                ComponentKind::Cylinder,
                [
                    (-13.8364, 0.6156),
                    (-14.5961, 0.6065),
                    (-15.1308, 0.7062),
                    (-15.5682, 0.9329),
                    (-15.9604, 1.1895),
                ],
            ),
            (
                ComponentKind::Filter,
                [
                    (-5.2471, 1.9849),
                    (-5.2884, 1.5180),
                    (-5.3389, 1.4806),
                    (-5.3758, 0.8918),
                    (-5.4257, 0.8918),
                ],
            ),
            (
                ComponentKind::Flange,
                [
                    (-3.9236, 1.6611),
                    (-6.1211, 1.2533),
                    (-8.3307, 2.2541),
                    (-10.5399, 0.8199),
                    (-12.7453, 1.7123),
                ],
            ),
            (
                ComponentKind::Hose,
                [
                    (-6.8061, 0.2682),
                    (-8.6394, 0.5175),
                    (-8.7740, 0.5017),
                    (-8.8926, 0.5070),
                    (-9.8600, 0.8443),
                ],
            ),
            (
                ComponentKind::Joint,
                [
                    (-9.5738, 0.1638),
                    (-12.8316, 0.7575),
                    (-11.8743, 0.4196),
                    (-12.0156, 0.4266),
                    (-12.1486, 0.4358),
                ],
            ),
            (
                ComponentKind::Pipe,
                [
                    (-11.8584, 0.6570),
                    (-12.5337, 0.6884),
                    (-13.8662, 1.1276),
                    (-14.5757, 1.1555),
                    (-15.7304, 1.7087),
                ],
            ),
            (
                ComponentKind::Valve,
                [
                    (-5.1796, 0.1728),
                    (-7.2748, 0.1738),
                    (-9.6802, 0.1931),
                    (-10.3997, 0.1697),
                    (-11.4282, 0.3339),
                ],
            ),
            (
                ComponentKind::Instrument,
                [
                    (-7.3858, 0.7120),
                    (-8.5430, 0.8546),
                    (-9.8936, 1.0601),
                    (-10.3141, 1.5017),
                    (-10.7995, 1.3807),
                ],
            ),
            (
                ComponentKind::Exchanger,
                [
                    (-4.2000, 0.8000),
                    (-5.6000, 0.9000),
                    (-6.9000, 1.1000),
                    (-8.7000, 1.2000),
                    (-10.5000, 1.3000),
                ],
            ),
            (
                ComponentKind::Vaporizer,
                [
                    (-4.4000, 0.8000),
                    (-5.8000, 0.9000),
                    (-7.1000, 1.1000),
                    (-8.9000, 1.2000),
                    (-10.7000, 1.3000),
                ],
            ),
            (
                ComponentKind::Arm,
                [
                    (-6.9000, 0.9000),
                    (-8.3000, 1.0000),
                    (-9.2000, 1.1000),
                    (-10.1000, 1.2000),
                    (-11.3000, 1.4000),
                ],
            ),
        ];

        let mut entries = BTreeMap::new();
        for (kind, params) in TABLE {
            let per_size: BTreeMap<LeakSize, Distribution> = LeakSize::ALL
                .iter()
                .zip(params)
                .map(|(&size, (mu, sigma))| (size, Distribution::LogNormal { mu, sigma }))
                .collect();
            entries.insert(kind, per_size);
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// Number of (kind, size) entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn get(&self, kind: ComponentKind, size: LeakSize) -> Option<&Distribution> {
        self.entries.get(&kind).and_then(|m| m.get(&size))
    }

    pub fn contains_kind(&self, kind: ComponentKind) -> bool {
        self.entries.get(&kind).map_or(false, |m| !m.is_empty())
    }

    /// Insert or replace an entry. The distribution is validated first.
    pub fn insert(
        &mut self,
        kind: ComponentKind,
        size: LeakSize,
        dist: Distribution,
    ) -> Result<(), CatalogError> {
        dist.validate()?;
        self.entries.entry(kind).or_default().insert(size, dist);
        Ok(())
    }

    pub fn remove(&mut self, kind: ComponentKind, size: LeakSize) -> Option<Distribution> {
        let removed = self.entries.get_mut(&kind).and_then(|m| m.remove(&size));
        if self.entries.get(&kind).map_or(false, BTreeMap::is_empty) {
            self.entries.remove(&kind);
        }
        removed
    }

    /// Apply new `param_a` / `param_b` to an existing entry.
    pub fn set_params(
        &mut self,
        kind: ComponentKind,
        size: LeakSize,
        param_a: f64,
        param_b: Option<f64>,
    ) -> Result<(), CatalogError> {
        self.entry_mut(kind, size)?
            .set_from_mu_sigma(param_a, param_b)
            .map_err(CatalogError::from)
    }

    /// Back-solve an existing entry from a new median.
    pub fn set_median(
        &mut self,
        kind: ComponentKind,
        size: LeakSize,
        median: f64,
    ) -> Result<(), CatalogError> {
        self.entry_mut(kind, size)?
            .set_from_median(median)
            .map_err(CatalogError::from)
    }

    fn entry_mut(
        &mut self,
        kind: ComponentKind,
        size: LeakSize,
    ) -> Result<&mut Distribution, CatalogError> {
        self.entries
            .get_mut(&kind)
            .and_then(|m| m.get_mut(&size))
            .ok_or(CatalogError::UnknownComponent { kind, size })
    }

    /// All entries in (kind, size) order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, LeakSize, &Distribution)> + '_ {
        self.entries
            .iter()
            .flat_map(|(&kind, m)| m.iter().map(move |(&size, d)| (kind, size, d)))
    }

    /// Sum of the mean frequency of every catalogued kind at `size`
    /// (one of each). Zero for an empty catalog.
    pub fn total_frequency(&self, size: LeakSize) -> Result<PerYear, DistributionError> {
        let mut total = 0.0;
        for (_, s, dist) in self.iter() {
            if s == size {
                total += dist.mean()?;
            }
        }
        Ok(total)
    }

    /// Recompute derived statistics for every entry.
    pub fn statistics(&self) -> Result<Vec<ComponentLeakStats>, DistributionError> {
        self.iter()
            .map(|(component, leak_size, dist)| {
                Ok(ComponentLeakStats {
                    component,
                    leak_size,
                    family: dist.family(),
                    param_a: dist.param_a(),
                    param_b: dist.param_b(),
                    stats: dist.stats()?,
                })
            })
            .collect()
    }

    /// New catalog with every distribution replaced by one point draw.
    /// `self` is left untouched.
    pub fn resample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self, DistributionError> {
        let mut entries = BTreeMap::new();
        for (&kind, per_size) in &self.entries {
            let mut drawn = BTreeMap::new();
            for (&size, dist) in per_size {
                let value = dist.sample(rng)?;
                drawn.insert(size, Distribution::ExpectedValue { value });
            }
            entries.insert(kind, drawn);
        }
        Ok(Self { entries })
    }
}

/// Facility component counts (pipes in metres).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentInventory {
    counts: BTreeMap<ComponentKind, f64>,
}

impl ComponentInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small gaseous dispenser skid.
    pub fn default_dispenser() -> Self {
        Self::new()
            .with(ComponentKind::Filter, 1.0)
            .with(ComponentKind::Flange, 2.0)
            .with(ComponentKind::Hose, 1.0)
            .with(ComponentKind::Joint, 35.0)
            .with(ComponentKind::Pipe, 20.0)
            .with(ComponentKind::Valve, 5.0)
            .with(ComponentKind::Instrument, 3.0)
    }

    pub fn with(mut self, kind: ComponentKind, count: f64) -> Self {
        self.set(kind, count);
        self
    }

    /// Negative or non-finite counts are stored as zero.
    pub fn set(&mut self, kind: ComponentKind, count: f64) {
        let count = if count.is_finite() { count.max(0.0) } else { 0.0 };
        self.counts.insert(kind, count);
    }

    pub fn count(&self, kind: ComponentKind) -> f64 {
        self.counts.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, f64)> + '_ {
        self.counts.iter().map(|(&k, &c)| (k, c))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Errors raised by controlled catalog updates.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    UnknownComponent { kind: ComponentKind, size: LeakSize },
    UnknownFailureMode { name: String },
    /// A failure mode that must be a probability has a mean outside [0, 1].
    ProbabilityOutOfRange { name: String, mean: f64 },
    DuplicateShutdownMode { existing: String, added: String },
    Distribution(DistributionError),
}

impl From<DistributionError> for CatalogError {
    fn from(e: DistributionError) -> Self {
        CatalogError::Distribution(e)
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::UnknownComponent { kind, size } => {
                write!(f, "no leak frequency for component '{}' at {}", kind, size)
            }
            CatalogError::UnknownFailureMode { name } => {
                write!(f, "unknown failure mode '{}'", name)
            }
            CatalogError::ProbabilityOutOfRange { name, mean } => write!(
                f,
                "failure mode '{}' has mean {} outside the probability range [0, 1]",
                name, mean
            ),
            CatalogError::DuplicateShutdownMode { existing, added } => write!(
                f,
                "failure mode '{}' cannot be a shutdown mode: '{}' already is",
                added, existing
            ),
            CatalogError::Distribution(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Distribution(e) => Some(e),
            _ => None,
        }
    }
}
