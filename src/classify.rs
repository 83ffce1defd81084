//! Area-weighted comparison of summer and winter slope rasters.

use crate::weights::area_weight;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlopeComparison {
    /// Winter warming faster than summer.
    WinterFaster,
    BothNegative,
    BothPositive,
    SummerPositiveWinterNegative,
    WinterPositiveSummerNegative,
}

impl SlopeComparison {
    pub const ALL: [SlopeComparison; 5] = [
        SlopeComparison::WinterFaster,
        SlopeComparison::BothNegative,
        SlopeComparison::BothPositive,
        SlopeComparison::SummerPositiveWinterNegative,
        SlopeComparison::WinterPositiveSummerNegative,
    ];

    /// NaN in either slope never qualifies.
    pub fn holds(self, summer: f64, winter: f64) -> bool {
        if summer.is_nan() || winter.is_nan() {
            return false;
        }
        match self {
            SlopeComparison::WinterFaster => winter > summer,
            SlopeComparison::BothNegative => summer < 0.0 && winter < 0.0,
            SlopeComparison::BothPositive => summer > 0.0 && winter > 0.0,
            SlopeComparison::SummerPositiveWinterNegative => summer > 0.0 && winter < 0.0,
            SlopeComparison::WinterPositiveSummerNegative => winter > 0.0 && summer < 0.0,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SlopeComparison::WinterFaster => "winter_faster",
            SlopeComparison::BothNegative => "both_negative",
            SlopeComparison::BothPositive => "both_positive",
            SlopeComparison::SummerPositiveWinterNegative => "summer_positive_winter_negative",
            SlopeComparison::WinterPositiveSummerNegative => "winter_positive_summer_negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateArea {
    pub predicate: SlopeComparison,
    pub area: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSummary {
    pub total_area: f64,
    pub predicates: Vec<PredicateArea>,
}

impl ClassificationSummary {
    /// Fold every cell of two `[latitude, longitude]` slope grids into area
    /// sums. Cell area is the raw cos(latitude) of its row; NaN cells still
    /// count towards the total.
    pub fn from_slopes(latitudes: &[f64], n_lon: usize, summer: &[f64], winter: &[f64]) -> Self {
        let zero = [0.0; SlopeComparison::ALL.len()];

        let (total_area, areas) = latitudes
            .iter()
            .enumerate()
            .flat_map(|(row, &lat)| (0..n_lon).map(move |col| (row * n_lon + col, area_weight(lat))))
            .filter(|&(k, _)| k < summer.len() && k < winter.len())
            .fold((0.0, zero), |(total, mut areas), (k, w)| {
                for (slot, predicate) in areas.iter_mut().zip(SlopeComparison::ALL) {
                    if predicate.holds(summer[k], winter[k]) {
                        *slot += w;
                    }
                }
                (total + w, areas)
            });

        let predicates = SlopeComparison::ALL
            .iter()
            .zip(areas)
            .map(|(&predicate, area)| PredicateArea {
                predicate,
                area,
                percentage: if total_area > 0.0 {
                    area / total_area * 100.0
                } else {
                    f64::NAN
                },
            })
            .collect();

        Self {
            total_area,
            predicates,
        }
    }

    pub fn get(&self, predicate: SlopeComparison) -> Option<&PredicateArea> {
        self.predicates.iter().find(|p| p.predicate == predicate)
    }

    /// `earth_area`, then `<key>_area` and `<key>_percentage` per predicate.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("earth_area".to_string(), number(self.total_area));
        for p in &self.predicates {
            map.insert(format!("{}_area", p.predicate.key()), number(p.area));
            map.insert(format!("{}_percentage", p.predicate.key()), number(p.percentage));
        }
        Value::Object(map)
    }
}

/// Non-finite numbers have no JSON form.
fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}
