//! Latitude-weighted regional means per year or per month.
//!
//! Every bucket is computed independently and reports its own outcome, so a
//! month without data or an irregular slice never stops the remaining
//! buckets from being produced.

use crate::grid::GridField;
use crate::units::{kelvin_to_celsius, kelvin_to_fahrenheit};
use crate::weights::LatitudeWeights;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// 66°34′, the latitude of the polar circles.
pub const POLAR_CIRCLE_DEG: f64 = 66.0 + 34.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Global,
    North,
    South,
    Arctic,
    Antarctic,
}

impl Region {
    pub fn contains(self, latitude: f64) -> bool {
        match self {
            Region::Global => true,
            Region::North => latitude >= 0.0,
            Region::South => latitude < 0.0,
            Region::Arctic => latitude >= POLAR_CIRCLE_DEG,
            Region::Antarctic => latitude <= -POLAR_CIRCLE_DEG,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Region::Global => "global",
            Region::North => "north",
            Region::South => "south",
            Region::Arctic => "arctic",
            Region::Antarctic => "antarctic",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeBucket {
    Year(i32),
    Month { year: i32, month: u32 },
}

impl TimeBucket {
    pub fn year(self) -> i32 {
        match self {
            TimeBucket::Year(year) | TimeBucket::Month { year, .. } => year,
        }
    }

    pub fn month(self) -> Option<u32> {
        match self {
            TimeBucket::Year(_) => None,
            TimeBucket::Month { month, .. } => Some(month),
        }
    }

    /// Every year in `first..=last`.
    pub fn years(first: i32, last: i32) -> Vec<TimeBucket> {
        (first..=last).map(TimeBucket::Year).collect()
    }

    /// Every month of every year in `first..=last`.
    pub fn months(first: i32, last: i32) -> Vec<TimeBucket> {
        (first..=last)
            .flat_map(|year| (1..=12).map(move |month| TimeBucket::Month { year, month }))
            .collect()
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBucket::Year(year) => write!(f, "{}", year),
            TimeBucket::Month { year, month } => write!(f, "{}-{:02}", year, month),
        }
    }
}

/// Why a bucket has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketFailure {
    /// No timestamps fall inside the bucket.
    NoTimestamps,
    /// The region selects no latitude rows of this grid.
    EmptyRegion,
    /// The reduction left more than one value behind.
    ResidualDimensions { remaining: usize },
    /// Every sample in the bucket is missing.
    NoFiniteData,
}

impl fmt::Display for BucketFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketFailure::NoTimestamps => f.write_str("no timestamps in bucket"),
            BucketFailure::EmptyRegion => f.write_str("region contains no latitude rows"),
            BucketFailure::ResidualDimensions { remaining } => {
                write!(f, "mean did not reduce to a single value ({} left)", remaining)
            }
            BucketFailure::NoFiniteData => f.write_str("all samples are missing"),
        }
    }
}

pub type BucketOutcome = Result<f64, BucketFailure>;

/// One regional mean for one bucket, in Kelvin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSample {
    pub bucket: TimeBucket,
    pub region: Region,
    pub outcome: BucketOutcome,
}

impl RegionSample {
    /// Kelvin value, NaN when the bucket is unavailable.
    pub fn kelvin(&self) -> f64 {
        self.outcome.unwrap_or(f64::NAN)
    }

    pub fn fahrenheit(&self) -> f64 {
        kelvin_to_fahrenheit(self.kelvin())
    }

    pub fn celsius(&self) -> f64 {
        kelvin_to_celsius(self.kelvin())
    }
}

pub struct RegionAverager<'a> {
    field: &'a GridField,
    region: Region,
    weights: Option<LatitudeWeights>,
}

impl<'a> RegionAverager<'a> {
    pub fn new(field: &'a GridField, region: Region) -> Self {
        let weights = LatitudeWeights::matching(field.latitudes(), |lat| region.contains(lat));
        Self {
            field,
            region,
            weights,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Weighted sum over latitude, then mean over longitude and time.
    pub fn bucket_mean(&self, bucket: TimeBucket) -> BucketOutcome {
        let weights = self.weights.as_ref().ok_or(BucketFailure::EmptyRegion)?;

        let indices = match bucket {
            TimeBucket::Year(year) => self.field.indices_in_year(year),
            TimeBucket::Month { year, month } => self.field.indices_in_month(year, month),
        };
        if indices.is_empty() {
            return Err(BucketFailure::NoTimestamps);
        }

        let (_, _, n_lon) = self.field.shape();

        // Latitude collapse: one value per (time, longitude).
        let mut columns = Vec::with_capacity(indices.len() * n_lon);
        for &t in &indices {
            for lon in 0..n_lon {
                let mut sum = 0.0;
                let mut weight = 0.0;
                for (row, w) in weights.iter() {
                    let v = self.field.value(t, row, lon);
                    if v.is_finite() {
                        sum += v * w;
                        weight += w;
                    }
                }
                columns.push(if weight > 0.0 { sum / weight } else { f64::NAN });
            }
        }

        let per_time = mean_groups(&columns, n_lon);
        let collapsed = mean_groups(&per_time, per_time.len());
        scalar(&collapsed)
    }

    /// All buckets, in order. Failed buckets are logged and kept as
    /// unavailable samples.
    pub fn series(&self, buckets: &[TimeBucket]) -> Vec<RegionSample> {
        buckets
            .iter()
            .map(|&bucket| {
                let outcome = self.bucket_mean(bucket);
                if let Err(reason) = outcome {
                    warn!(region = %self.region, bucket = %bucket, "{}", reason);
                }
                RegionSample {
                    bucket,
                    region: self.region,
                    outcome,
                }
            })
            .collect()
    }
}

/// Averages consecutive groups of `size` finite values. A group without
/// finite values is NaN.
fn mean_groups(values: &[f64], size: usize) -> Vec<f64> {
    if size == 0 {
        return Vec::new();
    }
    values
        .chunks(size)
        .map(|group| {
            let (sum, n) = group
                .iter()
                .filter(|v| v.is_finite())
                .fold((0.0, 0u32), |(s, n), &v| (s + v, n + 1));
            if n > 0 { sum / f64::from(n) } else { f64::NAN }
        })
        .collect()
}

fn scalar(values: &[f64]) -> BucketOutcome {
    match values {
        [v] if v.is_finite() => Ok(*v),
        [_] => Err(BucketFailure::NoFiniteData),
        [] => Err(BucketFailure::NoFiniteData),
        many => Err(BucketFailure::ResidualDimensions {
            remaining: many.len(),
        }),
    }
}

/// Computes each region over the same buckets, regions interleaved per
/// bucket (e.g. arctic then antarctic for every year).
pub fn interleaved_series(
    field: &GridField,
    regions: &[Region],
    buckets: &[TimeBucket],
) -> Vec<RegionSample> {
    let averagers: Vec<RegionAverager<'_>> =
        regions.iter().map(|&r| RegionAverager::new(field, r)).collect();

    let per_region: Vec<Vec<RegionSample>> = averagers.iter().map(|a| a.series(buckets)).collect();

    (0..buckets.len())
        .flat_map(|b| per_region.iter().map(move |series| series[b]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Latitudes [80, 60, 0, -60, -80], two longitudes, value = f(lat).
    fn field_by_latitude<F: Fn(f64) -> f64>(times: Vec<NaiveDateTime>, f: F) -> GridField {
        let lats = vec![80.0, 60.0, 0.0, -60.0, -80.0];
        let lons = vec![0.0, 180.0];
        let mut data = Vec::new();
        for _ in &times {
            for &lat in &lats {
                for _ in &lons {
                    data.push(f(lat));
                }
            }
        }
        GridField::new(times, lats, lons, data).unwrap()
    }

    #[test]
    fn test_constant_field_mean_is_constant() {
        let field = field_by_latitude(vec![ts(2000, 1, 1), ts(2000, 2, 1)], |_| 288.0);
        for region in [Region::Global, Region::North, Region::South, Region::Arctic, Region::Antarctic] {
            let v = RegionAverager::new(&field, region).bucket_mean(TimeBucket::Year(2000));
            assert!((v.unwrap() - 288.0).abs() < 1e-9, "{}", region);
        }
    }

    #[test]
    fn test_weighting_favors_low_latitudes() {
        // Global mean of 300 at the equator and 200 elsewhere.
        let field = field_by_latitude(vec![ts(2000, 1, 1)], |lat| if lat == 0.0 { 300.0 } else { 200.0 });
        let v = RegionAverager::new(&field, Region::Global)
            .bucket_mean(TimeBucket::Year(2000))
            .unwrap();

        let w80 = 80f64.to_radians().cos();
        let w60 = 60f64.to_radians().cos();
        let expected = (300.0 + 200.0 * 2.0 * (w80 + w60)) / (1.0 + 2.0 * (w80 + w60));
        assert!((v - expected).abs() < 1e-9);
    }

    #[test]
    fn test_polar_caps_select_high_latitudes() {
        let field = field_by_latitude(vec![ts(2000, 1, 1)], |lat| 250.0 + lat);
        let arctic = RegionAverager::new(&field, Region::Arctic)
            .bucket_mean(TimeBucket::Year(2000))
            .unwrap();
        let antarctic = RegionAverager::new(&field, Region::Antarctic)
            .bucket_mean(TimeBucket::Year(2000))
            .unwrap();
        assert!((arctic - 330.0).abs() < 1e-9);
        assert!((antarctic - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_month_isolated() {
        let field = field_by_latitude(vec![ts(2000, 1, 15), ts(2000, 3, 15)], |_| 280.0);
        let avg = RegionAverager::new(&field, Region::North);
        let samples = avg.series(&TimeBucket::months(2000, 2000)[..3]);

        assert_eq!(samples.len(), 3);
        assert!((samples[0].kelvin() - 280.0).abs() < 1e-9);
        assert_eq!(samples[1].outcome, Err(BucketFailure::NoTimestamps));
        assert!(samples[1].kelvin().is_nan());
        assert!((samples[2].kelvin() - 280.0).abs() < 1e-9);
    }

    #[test]
    fn test_nan_cells_are_not_zero() {
        let field = field_by_latitude(vec![ts(2000, 1, 1)], |lat| if lat == 0.0 { f64::NAN } else { 270.0 });
        let v = RegionAverager::new(&field, Region::Global)
            .bucket_mean(TimeBucket::Year(2000))
            .unwrap();
        assert!((v - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_missing_and_empty_region() {
        let field = field_by_latitude(vec![ts(2000, 1, 1)], |_| f64::NAN);
        let v = RegionAverager::new(&field, Region::Global).bucket_mean(TimeBucket::Year(2000));
        assert_eq!(v, Err(BucketFailure::NoFiniteData));

        let north_only = GridField::new(vec![ts(2000, 1, 1)], vec![10.0], vec![0.0], vec![280.0]).unwrap();
        let v = RegionAverager::new(&north_only, Region::Antarctic).bucket_mean(TimeBucket::Year(2000));
        assert_eq!(v, Err(BucketFailure::EmptyRegion));
    }

    #[test]
    fn test_interleaved_order_and_units() {
        let field = field_by_latitude(vec![ts(2000, 1, 1), ts(2001, 1, 1)], |_| 273.15);
        let samples = interleaved_series(
            &field,
            &[Region::Arctic, Region::Antarctic],
            &TimeBucket::years(2000, 2001),
        );
        let labels: Vec<(i32, Region)> = samples.iter().map(|s| (s.bucket.year(), s.region)).collect();
        assert_eq!(
            labels,
            vec![
                (2000, Region::Arctic),
                (2000, Region::Antarctic),
                (2001, Region::Arctic),
                (2001, Region::Antarctic)
            ]
        );
        assert!(samples[0].celsius().abs() < 1e-9);
        assert!((samples[0].fahrenheit() - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_scalar_collapse() {
        assert_eq!(scalar(&[1.0]), Ok(1.0));
        assert_eq!(
            scalar(&[1.0, 2.0]),
            Err(BucketFailure::ResidualDimensions { remaining: 2 })
        );
        assert_eq!(scalar(&[f64::NAN]), Err(BucketFailure::NoFiniteData));
    }
}
