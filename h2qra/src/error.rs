// src/error.rs
//
// Crate-level error roll-up. Each stage keeps its own error enum; `QraError`
// wraps them so a whole evaluation can be driven with `?`.

use std::fmt;

use crate::components::CatalogError;
use crate::consequence::ConsequenceError;
use crate::cut_set::CutSetError;
use crate::distribution::DistributionError;
use crate::event_tree::EventTreeError;
use crate::ignition::IgnitionError;
use crate::risk::RiskError;
use crate::study::StudyError;
use crate::types::LeakSize;
use crate::uncertainty::UncertaintyError;

#[derive(Debug)]
pub enum QraError {
    Distribution(DistributionError),
    Catalog(CatalogError),
    Ignition(IgnitionError),
    CutSet(CutSetError),
    /// Event-tree failure, tagged with the leak size when raised inside an
    /// evaluation pass.
    EventTree {
        leak_size: Option<LeakSize>,
        source: EventTreeError,
    },
    Consequence(ConsequenceError),
    Risk(RiskError),
    Uncertainty(UncertaintyError),
    Study(StudyError),
}

impl QraError {
    /// True for internal invariant violations, as opposed to bad input or
    /// configuration.
    pub fn is_defect(&self) -> bool {
        match self {
            QraError::EventTree {
                source: EventTreeError::InvariantViolation { .. },
                ..
            } => true,
            QraError::Uncertainty(e) => e.is_defect(),
            _ => false,
        }
    }
}

impl fmt::Display for QraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QraError::Distribution(e) => write!(f, "{}", e),
            QraError::Catalog(e) => write!(f, "{}", e),
            QraError::Ignition(e) => write!(f, "{}", e),
            QraError::CutSet(e) => write!(f, "{}", e),
            QraError::EventTree {
                leak_size: Some(size),
                source,
            } => write!(f, "leak size {}: {}", size, source),
            QraError::EventTree { source, .. } => write!(f, "{}", source),
            QraError::Consequence(e) => write!(f, "{}", e),
            QraError::Risk(e) => write!(f, "{}", e),
            QraError::Uncertainty(e) => write!(f, "{}", e),
            QraError::Study(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for QraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QraError::Distribution(e) => Some(e),
            QraError::Catalog(e) => Some(e),
            QraError::Ignition(e) => Some(e),
            QraError::CutSet(e) => Some(e),
            QraError::EventTree { source, .. } => Some(source),
            QraError::Consequence(e) => Some(e),
            QraError::Risk(e) => Some(e),
            QraError::Uncertainty(e) => Some(e),
            QraError::Study(e) => Some(e),
        }
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for QraError {
                fn from(e: $source) -> Self {
                    QraError::$variant(e)
                }
            }
        )*
    };
}

impl_from! {
    DistributionError => Distribution,
    CatalogError => Catalog,
    IgnitionError => Ignition,
    CutSetError => CutSet,
    ConsequenceError => Consequence,
    RiskError => Risk,
    UncertaintyError => Uncertainty,
    StudyError => Study,
}

impl From<EventTreeError> for QraError {
    fn from(source: EventTreeError) -> Self {
        QraError::EventTree {
            leak_size: None,
            source,
        }
    }
}

impl QraError {
    /// Tag an event-tree error with the leak size being evaluated.
    pub fn event_tree_at(leak_size: LeakSize, source: EventTreeError) -> Self {
        QraError::EventTree {
            leak_size: Some(leak_size),
            source,
        }
    }
}
