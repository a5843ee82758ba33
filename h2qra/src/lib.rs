//! h2qra core library.
//!
//! Quantitative risk assessment for hydrogen systems. The binary
//! (`src/main.rs`) is a thin study-file harness around these components.
//!
//! # Pipeline
//!
//! For each of the five leak sizes:
//!
//! - **Cut set** (`cut_set`): total leak frequency from the component leak
//!   catalog (`components`) times the inventory, plus the accident fault
//!   tree of the failure-mode catalog (`failures`) for full-bore releases,
//!   or a user override.
//! - **Event tree** (`event_tree`): splits that frequency into shutdown,
//!   jetfire, explosion and no ignition using the release-rate-indexed
//!   ignition table (`ignition`).
//! - **Risk** (`risk`): weights ignitable outcomes by harm-model fatality
//!   probabilities (`consequence`) into PLL, FAR and AIR.
//!
//! `analysis` wires the stages together over an immutable snapshot of a
//! `QraSession`. `uncertainty` repeats the pipeline with resampled catalogs
//! (`distribution`) and summarizes the spread by percentile (`stats`).

pub mod analysis;
pub mod components;
pub mod config;
pub mod consequence;
pub mod cut_set;
pub mod distribution;
pub mod error;
pub mod event_tree;
pub mod failures;
pub mod ignition;
pub mod risk;
pub mod stats;
pub mod study;
pub mod telemetry;
pub mod types;
pub mod uncertainty;

// --- Re-exports for ergonomic external use ---------------------------------

pub use analysis::{EvaluateOptions, LeakResult, QraResult, QraSession, RankingRow, SessionSnapshot};
pub use components::{CatalogError, ComponentInventory, ComponentKind, ComponentLeakCatalog};
pub use config::Config;
pub use consequence::{HarmModel, ReleaseConditions, ReleaseModel, TabulatedHarm, TabulatedRelease};
pub use cut_set::{CutSet, FrequencySource, FrequencySpec};
pub use distribution::{Distribution, DistributionError, DistributionFamily, DistributionStats};
pub use error::QraError;
pub use event_tree::{EventTreeError, EventTreeOutcome, OutcomeValues};
pub use failures::{FailureMode, FailureModeCatalog, FailureRole, FuelingDemand};
pub use ignition::{IgnitionBin, IgnitionError, IgnitionTable};
pub use risk::{Exposure, OccupantGroup, RiskError, RiskMetrics};
pub use stats::PercentileSummary;
pub use study::{StudyError, StudySpec};
pub use telemetry::TelemetrySink;
pub use types::{KgPerSecond, LeakSize, Outcome, PerYear};
pub use uncertainty::{CancelToken, UncertaintyError, UncertaintyResult, UncertaintySettings};
