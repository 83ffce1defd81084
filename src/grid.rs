//! In-memory gridded temperature field.
//!
//! Samples are stored densely in C order as `[time, latitude, longitude]`,
//! in Kelvin, with NaN marking missing data.

use crate::error::{ClimateError, ClimateResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Whole calendar years `first..=last`.
    pub fn years(first: i32, last: i32) -> Option<Self> {
        Some(Self {
            start: month_start(first, 1)?,
            end: month_start(last.checked_add(1)?, 1)?,
        })
    }

    pub fn contains(&self, t: &NaiveDateTime) -> bool {
        *t >= self.start && *t < self.end
    }
}

/// Midnight on the first day of `year-month`.
pub fn month_start(year: i32, month: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Map a longitude into [-180, 180).
pub fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}

/// Normalize a longitude axis and return it sorted ascending, together with
/// the permutation mapping each new position to its source column.
pub fn normalized_longitude_order(longitudes: &[f64]) -> ClimateResult<(Vec<f64>, Vec<usize>)> {
    let wrapped: Vec<f64> = longitudes.iter().copied().map(normalize_longitude).collect();
    let mut order: Vec<usize> = (0..wrapped.len()).collect();
    order.sort_by(|&a, &b| wrapped[a].total_cmp(&wrapped[b]));

    let sorted: Vec<f64> = order.iter().map(|&k| wrapped[k]).collect();
    if let Some(w) = sorted.windows(2).find(|w| w[1] <= w[0]) {
        return Err(ClimateError::invalid_axis(
            "longitude",
            format!(
                "duplicate longitude {} after normalization to [-180, 180)",
                w[0]
            ),
        ));
    }

    Ok((sorted, order))
}

#[derive(Debug, Clone)]
pub struct GridField {
    times: Vec<NaiveDateTime>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    data: Vec<f64>,
}

impl GridField {
    pub fn new(
        times: Vec<NaiveDateTime>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        data: Vec<f64>,
    ) -> ClimateResult<Self> {
        let expected = times
            .len()
            .checked_mul(latitudes.len())
            .and_then(|n| n.checked_mul(longitudes.len()))
            .ok_or_else(|| ClimateError::mismatch("grid field", "addressable shape", "overflow"))?;

        if data.len() != expected {
            return Err(ClimateError::mismatch(
                format!(
                    "grid field of shape [{}, {}, {}]",
                    times.len(),
                    latitudes.len(),
                    longitudes.len()
                ),
                format!("{} samples", expected),
                format!("{} samples", data.len()),
            ));
        }

        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ClimateError::invalid_axis(
                "time",
                "timestamps must be strictly increasing",
            ));
        }

        if latitudes.iter().any(|v| !v.is_finite()) {
            return Err(ClimateError::invalid_axis("latitude", "non-finite coordinate"));
        }

        if longitudes.iter().any(|v| !v.is_finite()) {
            return Err(ClimateError::invalid_axis("longitude", "non-finite coordinate"));
        }

        Ok(Self {
            times,
            latitudes,
            longitudes,
            data,
        })
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// `(time, latitude, longitude)` lengths.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.times.len(), self.latitudes.len(), self.longitudes.len())
    }

    /// Number of cells in one time slice.
    pub fn cells(&self) -> usize {
        self.latitudes.len() * self.longitudes.len()
    }

    pub fn time_slice(&self, t: usize) -> &[f64] {
        let n = self.cells();
        &self.data[t * n..(t + 1) * n]
    }

    pub fn value(&self, t: usize, lat: usize, lon: usize) -> f64 {
        self.data[(t * self.latitudes.len() + lat) * self.longitudes.len() + lon]
    }

    pub fn time_indices<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&NaiveDateTime) -> bool,
    {
        self.times
            .iter()
            .enumerate()
            .filter(|(_, t)| predicate(t))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn indices_in_window(&self, window: &TimeWindow) -> Vec<usize> {
        self.time_indices(|t| window.contains(t))
    }

    pub fn indices_in_year(&self, year: i32) -> Vec<usize> {
        self.time_indices(|t| t.year() == year)
    }

    pub fn indices_in_month(&self, year: i32, month: u32) -> Vec<usize> {
        self.time_indices(|t| t.year() == year && t.month() == month)
    }

    /// Distinct calendar years present on the time axis, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.times.iter().map(|t| t.year()).collect();
        years.dedup();
        years
    }

    /// Cell-wise mean over the given time indices, skipping NaN samples.
    /// Cells without any finite sample are NaN.
    pub fn cell_mean(&self, indices: &[usize]) -> Vec<f64> {
        let n = self.cells();
        let mut sums = vec![0.0; n];
        let mut counts = vec![0u32; n];

        for &t in indices {
            for (k, &v) in self.time_slice(t).iter().enumerate() {
                if v.is_finite() {
                    sums[k] += v;
                    counts[k] += 1;
                }
            }
        }

        sums.iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { s / f64::from(c) } else { f64::NAN })
            .collect()
    }

    /// Rewrite the longitude axis into [-180, 180), ascending, permuting the
    /// data columns to match.
    pub fn normalize_longitudes(self) -> ClimateResult<Self> {
        let (sorted, order) = normalized_longitude_order(&self.longitudes)?;

        let identity = order.iter().enumerate().all(|(k, &src)| k == src);
        if identity {
            return Ok(Self {
                longitudes: sorted,
                ..self
            });
        }

        let n_lon = self.longitudes.len();
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(n_lon.max(1)) {
            data.extend(order.iter().map(|&src| row[src]));
        }

        Ok(Self {
            times: self.times,
            latitudes: self.latitudes,
            longitudes: sorted,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_normalize_longitude() {
        assert_eq!(normalize_longitude(0.0), 0.0);
        assert_eq!(normalize_longitude(180.0), -180.0);
        assert_eq!(normalize_longitude(359.75), -0.25);
        assert_eq!(normalize_longitude(-180.0), -180.0);
        assert_eq!(normalize_longitude(540.0), -180.0);
        assert!(normalize_longitude(-1e-20) < 180.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = GridField::new(vec![ts(2000, 1, 1)], vec![0.0, 1.0], vec![0.0], vec![1.0]);
        assert!(matches!(err, Err(ClimateError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_non_increasing_time_rejected() {
        let err = GridField::new(
            vec![ts(2000, 2, 1), ts(2000, 1, 1)],
            vec![0.0],
            vec![0.0],
            vec![1.0, 2.0],
        );
        assert!(matches!(err, Err(ClimateError::InvalidAxis { .. })));
    }

    #[test]
    fn test_normalize_longitudes_permutes_columns() {
        // 0, 90, 180, 270 -> -180, -90, 0, 90
        let field = GridField::new(
            vec![ts(2000, 1, 1)],
            vec![10.0],
            vec![0.0, 90.0, 180.0, 270.0],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap()
        .normalize_longitudes()
        .unwrap();

        assert_eq!(field.longitudes(), &[-180.0, -90.0, 0.0, 90.0]);
        assert_eq!(field.data(), &[3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn test_duplicate_longitude_after_normalization() {
        let result = normalized_longitude_order(&[-180.0, 0.0, 180.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cell_mean_skips_nan() {
        let field = GridField::new(
            vec![ts(2000, 1, 1), ts(2000, 1, 2), ts(2000, 1, 3)],
            vec![0.0],
            vec![0.0, 1.0],
            vec![1.0, f64::NAN, 3.0, f64::NAN, f64::NAN, f64::NAN],
        )
        .unwrap();

        let mean = field.cell_mean(&[0, 1, 2]);
        assert_eq!(mean[0], 2.0);
        assert!(mean[1].is_nan());
    }

    #[test]
    fn test_window_selection() {
        let field = GridField::new(
            vec![ts(1999, 11, 1), ts(1999, 12, 1), ts(2000, 8, 31), ts(2000, 9, 1)],
            vec![0.0],
            vec![0.0],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();

        let window = TimeWindow::new(ts(1999, 12, 1), ts(2000, 9, 1));
        assert_eq!(field.indices_in_window(&window), vec![1, 2]);
        assert_eq!(field.years(), vec![1999, 2000]);
        assert_eq!(field.indices_in_month(2000, 8), vec![2]);
    }
}
