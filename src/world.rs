//! World seasonal means derived from hemisphere monthly means.

use crate::output::{MonthlyHemisphereRecord, SeasonalMeanRecord};
use crate::season::{Hemisphere, Season, classify};
use crate::trend::{SeasonPair, fit_years};
use crate::units::{Quantity, TempUnit, convert};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `world.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSummary {
    pub data: Vec<SeasonalMeanRecord>,
    pub slopes: SeasonPair,
    pub intercepts: SeasonPair,
    /// Fitted change between the first and last year, °F.
    pub total_change_f: SeasonPair,
    /// The same change as a °C increment.
    pub total_change_c: SeasonPair,
}

impl WorldSummary {
    /// Regress the series from `start_year` onward.
    pub fn from_series(series: &[SeasonalMeanRecord], start_year: i32) -> Self {
        let data: Vec<SeasonalMeanRecord> = series
            .iter()
            .filter(|r| r.year >= start_year)
            .copied()
            .collect();

        let years: Vec<i32> = data.iter().map(|r| r.year).collect();
        let summer: Vec<f64> = data.iter().map(|r| r.summer).collect();
        let winter: Vec<f64> = data.iter().map(|r| r.winter).collect();
        let (slopes, intercepts) =
            SeasonPair::from_trends(fit_years(&years, &summer), fit_years(&years, &winter));

        let span = match (years.first(), years.last()) {
            (Some(first), Some(last)) => f64::from(last - first),
            _ => f64::NAN,
        };
        let total_change_f = slopes.map(|s| s * span);
        let total_change_c = total_change_f.map(|f| {
            convert(f, TempUnit::Fahrenheit, TempUnit::Celsius, Quantity::Increment).unwrap_or(f64::NAN)
        });

        Self {
            data,
            slopes,
            intercepts,
            total_change_f,
            total_change_c,
        }
    }
}

fn finite_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0u32), |(s, n), v| (s + v, n + 1));
    if n > 0 { sum / f64::from(n) } else { f64::NAN }
}

/// Per-year world summer and winter means in °F.
///
/// Each hemisphere's season is the mean of its qualifying months, where
/// winter (or southern summer) takes December from the previous year. The
/// first year on record has no previous December and is dropped. World
/// values average the hemispheres that have a value.
pub fn seasonal_means(records: &[MonthlyHemisphereRecord]) -> Vec<SeasonalMeanRecord> {
    let mut months: BTreeMap<(i32, Hemisphere), BTreeMap<u32, f64>> = BTreeMap::new();
    for r in records {
        months
            .entry((r.year, r.hemisphere))
            .or_default()
            .insert(r.month, r.temp_f);
    }

    let mut years: Vec<i32> = months.keys().map(|&(year, _)| year).collect();
    years.dedup();

    years
        .iter()
        .skip(1)
        .map(|&year| {
            let mut per_season = [Vec::new(), Vec::new()];

            for hemisphere in [Hemisphere::North, Hemisphere::South] {
                let Some(current) = months.get(&(year, hemisphere)) else {
                    continue;
                };
                let december = months
                    .get(&(year - 1, hemisphere))
                    .and_then(|prev| prev.get(&12))
                    .copied();

                for (slot, season) in per_season.iter_mut().zip(Season::BOTH) {
                    let mut values: Vec<f64> = current
                        .iter()
                        .filter(|&(&m, _)| m != 12 && classify(m, hemisphere) == Some(season))
                        .map(|(_, &v)| v)
                        .collect();
                    if classify(12, hemisphere) == Some(season) {
                        values.extend(december);
                    }
                    slot.push(finite_mean(values));
                }
            }

            let [summer, winter] = per_season;
            SeasonalMeanRecord {
                year,
                summer: finite_mean(summer),
                winter: finite_mean(winter),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(year: i32, month: u32, hemisphere: Hemisphere, temp_f: f64) -> MonthlyHemisphereRecord {
        MonthlyHemisphereRecord {
            year,
            month,
            hemisphere,
            temp_k: f64::NAN,
            temp_f,
            temp_c: f64::NAN,
        }
    }

    /// Every month of `years` for both hemispheres; north = `base + month`,
    /// south = `base - month`.
    fn records(years: std::ops::RangeInclusive<i32>, base: impl Fn(i32) -> f64) -> Vec<MonthlyHemisphereRecord> {
        let mut out = Vec::new();
        for year in years {
            for m in 1..=12 {
                out.push(month(year, m, Hemisphere::North, base(year) + f64::from(m)));
                out.push(month(year, m, Hemisphere::South, base(year) - f64::from(m)));
            }
        }
        out
    }

    #[test]
    fn test_first_year_dropped_and_december_carried() {
        let series = seasonal_means(&records(1940..=1941, |_| 50.0));
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].year, 1941);

        // North summer is JJA (56, 57, 58); south summer is Dec 1940 plus
        // Jan and Feb 1941.
        let north_summer = (56.0 + 57.0 + 58.0) / 3.0;
        let south_summer = (38.0 + 49.0 + 48.0) / 3.0;
        assert!((series[0].summer - (north_summer + south_summer) / 2.0).abs() < 1e-9);

        let north_winter = (62.0 + 51.0 + 52.0) / 3.0;
        let south_winter = (44.0 + 43.0 + 42.0) / 3.0;
        assert!((series[0].winter - (north_winter + south_winter) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_hemisphere_month_uses_remaining() {
        let mut recs = records(2000..=2001, |_| 50.0);
        recs.retain(|r| !(r.year == 2001 && r.hemisphere == Hemisphere::South));
        let series = seasonal_means(&recs);
        assert_eq!(series.len(), 1);
        assert!((series[0].summer - 57.0).abs() < 1e-9);
    }

    #[test]
    fn test_world_summary_trend() {
        let series = seasonal_means(&records(1939..=1945, |y| 50.0 + 0.5 * f64::from(y - 1939)));
        let summary = WorldSummary::from_series(&series, 1942);
        assert_eq!(summary.data.first().map(|r| r.year), Some(1942));
        assert_eq!(summary.data.len(), 4);
        assert!((summary.slopes.summer - 0.5).abs() < 1e-9);
        assert!((summary.slopes.winter - 0.5).abs() < 1e-9);

        // 1942..=1945 at 0.5 °F/yr: 1.5 °F, or 5/6 °C.
        assert!((summary.total_change_f.summer - 1.5).abs() < 1e-9);
        assert!((summary.total_change_c.winter - 1.5 * 5.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_series_has_missing_trend() {
        let series = seasonal_means(&records(2000..=2001, |_| 50.0));
        let summary = WorldSummary::from_series(&series, 2000);
        assert!(summary.slopes.summer.is_nan());
        assert!(summary.intercepts.winter.is_nan());
        assert!(summary.total_change_c.summer.is_nan());
    }
}
