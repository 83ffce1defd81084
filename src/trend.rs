//! Ordinary least-squares trends over years.

use crate::season::Season;
use crate::seasonal::SeasonalArchive;
use serde::{Deserialize, Serialize};

/// Slope (units per year) and intercept of `value = slope * year + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendRecord {
    pub fn missing() -> Self {
        Self {
            slope: f64::NAN,
            intercept: f64::NAN,
        }
    }
}

/// One value per season.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonPair {
    pub summer: f64,
    pub winter: f64,
}

impl SeasonPair {
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            summer: f(self.summer),
            winter: f(self.winter),
        }
    }

    /// `(slopes, intercepts)` of a summer and a winter fit.
    pub fn from_trends(summer: TrendRecord, winter: TrendRecord) -> (Self, Self) {
        (
            Self {
                summer: summer.slope,
                winter: winter.slope,
            },
            Self {
                summer: summer.intercept,
                winter: winter.intercept,
            },
        )
    }
}

/// Fit `ys` against `xs` using only the pairs where both are finite.
///
/// Fewer than two usable pairs, or no spread in x, gives a missing record.
pub fn fit_linear(xs: &[f64], ys: &[f64]) -> TrendRecord {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect();

    if pairs.len() < 2 {
        return TrendRecord::missing();
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (sxx, sxy) = pairs.iter().fold((0.0, 0.0), |(sxx, sxy), &(x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });

    if sxx <= 0.0 {
        return TrendRecord::missing();
    }

    let slope = sxy / sxx;
    TrendRecord {
        slope,
        intercept: mean_y - slope * mean_x,
    }
}

pub fn fit_years(years: &[i32], values: &[f64]) -> TrendRecord {
    let xs: Vec<f64> = years.iter().map(|&y| f64::from(y)).collect();
    fit_linear(&xs, values)
}

/// Per-cell summer and winter slopes over an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRaster {
    pub years: Vec<i32>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Degrees per year, `[latitude, longitude]`.
    pub summer_slope: Vec<f64>,
    pub winter_slope: Vec<f64>,
}

impl TrendRaster {
    pub fn first_year(&self) -> Option<i32> {
        self.years.first().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.years.last().copied()
    }

    pub fn slopes(&self, season: Season) -> &[f64] {
        match season {
            Season::Summer => &self.summer_slope,
            Season::Winter => &self.winter_slope,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.latitudes.len(), self.longitudes.len())
    }
}

/// Regress every cell of the archive against its years.
pub fn trend_raster(archive: &SeasonalArchive) -> TrendRaster {
    let years = archive.years().to_vec();
    let n_lat = archive.latitudes().len();
    let n_lon = archive.longitudes().len();

    let mut summer_slope = Vec::with_capacity(n_lat * n_lon);
    let mut winter_slope = Vec::with_capacity(n_lat * n_lon);

    for lat in 0..n_lat {
        for lon in 0..n_lon {
            summer_slope.push(fit_years(&years, &archive.cell_series(Season::Summer, lat, lon)).slope);
            winter_slope.push(fit_years(&years, &archive.cell_series(Season::Winter, lat, lon)).slope);
        }
    }

    TrendRaster {
        years,
        latitudes: archive.latitudes().to_vec(),
        longitudes: archive.longitudes().to_vec(),
        summer_slope,
        winter_slope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seasonal::SeasonalRaster;

    #[test]
    fn test_two_points_exact() {
        let t = fit_years(&[2000, 2001], &[10.0, 12.0]);
        assert!((t.slope - 2.0).abs() < 1e-9);
        assert!((t.intercept - (10.0 - 2.0 * 2000.0)).abs() < 1e-6);
    }

    #[test]
    fn test_insufficient_data() {
        for t in [
            fit_years(&[], &[]),
            fit_years(&[2000], &[1.0]),
            fit_years(&[2000, 2001, 2002], &[f64::NAN, 5.0, f64::NAN]),
        ] {
            assert!(t.slope.is_nan());
            assert!(t.intercept.is_nan());
        }
    }

    #[test]
    fn test_nan_pairs_skipped() {
        let t = fit_years(&[2000, 2001, 2002, 2003], &[1.0, f64::NAN, 3.0, 4.0]);
        assert!((t.slope - 1.0).abs() < 1e-9);
        assert!((t.slope * 2000.0 + t.intercept - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_x() {
        let t = fit_linear(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0]);
        assert!(t.slope.is_nan());
        assert!(t.intercept.is_nan());
    }

    #[test]
    fn test_noisy_fit() {
        // y = 0.5x + 1 with symmetric noise.
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.1, 1.4, 2.1, 2.4, 3.0];
        let t = fit_linear(&xs, &ys);
        assert!((t.slope - 0.48).abs() < 1e-9);
        assert!((t.intercept - 1.04).abs() < 1e-9);
    }

    #[test]
    fn test_trend_raster_per_cell() {
        let raster = |year: i32, summer: Vec<f64>| SeasonalRaster {
            year,
            latitudes: vec![10.0],
            longitudes: vec![0.0, 90.0],
            summer,
            winter: vec![f64::NAN, f64::NAN],
        };
        let archive = SeasonalArchive::from_rasters(vec![
            raster(2000, vec![10.0, 50.0]),
            raster(2001, vec![12.0, 49.0]),
        ])
        .unwrap();

        let trend = trend_raster(&archive);
        assert_eq!(trend.shape(), (1, 2));
        assert_eq!(trend.first_year(), Some(2000));
        assert_eq!(trend.last_year(), Some(2001));
        assert!((trend.summer_slope[0] - 2.0).abs() < 1e-9);
        assert!((trend.summer_slope[1] + 1.0).abs() < 1e-9);
        assert!(trend.slopes(Season::Winter).iter().all(|s| s.is_nan()));
    }
}
