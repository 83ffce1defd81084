use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    /// Latitude 0 belongs to the northern hemisphere.
    pub fn from_latitude(latitude: f64) -> Self {
        if latitude >= 0.0 {
            Hemisphere::North
        } else {
            Hemisphere::South
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Hemisphere::North => "north",
            Hemisphere::South => "south",
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Summer,
    Winter,
}

impl Season {
    pub const BOTH: [Season; 2] = [Season::Summer, Season::Winter];

    pub fn name(self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::Winter => "winter",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Season::Summer => Season::Winter,
            Season::Winter => Season::Summer,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Season a calendar month (1-12) belongs to, or `None` for the shoulder months.
///
/// JJA is northern summer and DJF northern winter; the south is inverted.
pub fn classify(month: u32, hemisphere: Hemisphere) -> Option<Season> {
    let northern = match month {
        6..=8 => Season::Summer,
        12 | 1 | 2 => Season::Winter,
        _ => return None,
    };

    Some(match hemisphere {
        Hemisphere::North => northern,
        Hemisphere::South => northern.other(),
    })
}

/// Convenience for per-row classification straight from a latitude value.
pub fn classify_latitude(month: u32, latitude: f64) -> Option<Season> {
    classify(month, Hemisphere::from_latitude(latitude))
}
