// src/types.rs
//
// Common shared types for the QRA core: leak-size buckets and hazard outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Annual frequency (events per system-year).
pub type PerYear = f64;

/// Release-rate unit used by the ignition table (kg/s).
pub type KgPerSecond = f64;

/// Discrete leak-size scenario, expressed as a fraction of the full bore
/// flow area of the leaking component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LeakSize {
    #[serde(rename = "0.01%")]
    Tiny,
    #[serde(rename = "0.1%")]
    VerySmall,
    #[serde(rename = "1%")]
    Small,
    #[serde(rename = "10%")]
    Medium,
    #[serde(rename = "100%")]
    Full,
}

impl LeakSize {
    /// All five buckets, smallest first. Result vectors follow this order.
    pub const ALL: [LeakSize; 5] = [
        LeakSize::Tiny,
        LeakSize::VerySmall,
        LeakSize::Small,
        LeakSize::Medium,
        LeakSize::Full,
    ];

    /// Display label, e.g. "10%".
    pub fn label(&self) -> &'static str {
        match self {
            LeakSize::Tiny => "0.01%",
            LeakSize::VerySmall => "0.1%",
            LeakSize::Small => "1%",
            LeakSize::Medium => "10%",
            LeakSize::Full => "100%",
        }
    }

    /// Leak area as a fraction of the full flow area.
    pub fn area_fraction(&self) -> f64 {
        match self {
            LeakSize::Tiny => 1e-4,
            LeakSize::VerySmall => 1e-3,
            LeakSize::Small => 1e-2,
            LeakSize::Medium => 1e-1,
            LeakSize::Full => 1.0,
        }
    }

    /// Parse a label ("10%", "10", "0.01%"). Case and whitespace insensitive.
    pub fn parse(s: &str) -> Option<LeakSize> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
        match trimmed {
            "0.01" => Some(LeakSize::Tiny),
            "0.1" => Some(LeakSize::VerySmall),
            "1" => Some(LeakSize::Small),
            "10" => Some(LeakSize::Medium),
            "100" => Some(LeakSize::Full),
            _ => None,
        }
    }
}

impl fmt::Display for LeakSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutually exclusive terminal outcomes of the release event tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Release detected and isolated before it is sustained.
    Shutdown,
    /// Immediate ignition.
    Jetfire,
    /// Delayed ignition of an accumulated cloud.
    Explosion,
    NoIgnition,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Shutdown,
        Outcome::Jetfire,
        Outcome::Explosion,
        Outcome::NoIgnition,
    ];

    /// Outcomes that carry consequences and are weighted by the harm model.
    pub const IGNITABLE: [Outcome; 2] = [Outcome::Jetfire, Outcome::Explosion];

    pub fn is_ignitable(&self) -> bool {
        matches!(self, Outcome::Jetfire | Outcome::Explosion)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Shutdown => "shutdown",
            Outcome::Jetfire => "jetfire",
            Outcome::Explosion => "explosion",
            Outcome::NoIgnition => "no_ignition",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
