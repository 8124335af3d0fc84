use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Ripeness {
    Ripe,
    Unripe,
    Overripe,
}

impl Ripeness {
    pub const ALL: [Ripeness; 3] = [Ripeness::Ripe, Ripeness::Unripe, Ripeness::Overripe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ripeness::Ripe => "Ripe",
            Ripeness::Unripe => "Unripe",
            Ripeness::Overripe => "Overripe",
        }
    }
}

impl FromStr for Ripeness {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ripeness::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or(())
    }
}

/// Mango cultivar. All three may appear on stored records; only
/// [`Variety::SELECTABLE`] can be chosen from the dashboard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Variety {
    #[default]
    Carabao,
    Pico,
    Indian,
}

impl Variety {
    pub const SELECTABLE: [Variety; 2] = [Variety::Carabao, Variety::Pico];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variety::Carabao => "Carabao",
            Variety::Pico => "Pico",
            Variety::Indian => "Indian",
        }
    }
}

impl fmt::Display for Variety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification reported by the sorting device. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortingRecord {
    /// Human-readable server-side date, e.g. "March 7, 2025".
    pub date: String,
    pub variety: Variety,
    pub ripeness: Ripeness,
    pub count: u32,
    #[serde(default)]
    pub confidence: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Formats a list of enum labels as `Carabao, Pico` for error messages.
pub fn label_list<'a>(labels: impl IntoIterator<Item = &'a str>) -> String {
    labels.into_iter().collect::<Vec<_>>().join(", ")
}
