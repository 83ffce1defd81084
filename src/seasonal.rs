//! Per-year summer/winter rasters and the year-indexed archive built from them.

use crate::error::{ClimateError, ClimateResult};
use crate::grid::{GridField, TimeWindow, month_start};
use crate::season::{Season, classify_latitude};
use crate::units::kelvin_to_fahrenheit;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How several qualifying months fill one season slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SeasonStrategy {
    /// Each month overwrites the slot in month order 1..=12, so the last
    /// qualifying month present wins (December for the northern winter).
    #[default]
    LastMonth,
    /// Average of the finite monthly means that qualify for the slot.
    MonthlyMean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalRaster {
    pub year: i32,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Degrees Fahrenheit, `[latitude, longitude]`.
    pub summer: Vec<f64>,
    pub winter: Vec<f64>,
}

impl SeasonalRaster {
    pub fn season(&self, season: Season) -> &[f64] {
        match season {
            Season::Summer => &self.summer,
            Season::Winter => &self.winter,
        }
    }

    pub fn value(&self, season: Season, lat: usize, lon: usize) -> f64 {
        self.season(season)[lat * self.longitudes.len() + lon]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonalAggregator {
    strategy: SeasonStrategy,
}

impl SeasonalAggregator {
    pub fn new(strategy: SeasonStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SeasonStrategy {
        self.strategy
    }

    /// `[Dec 1 of year-1, Sep 1 of year)`: the previous December plus
    /// January through August, so DJF winters stay in one window.
    pub fn window(year: i32) -> Option<TimeWindow> {
        Some(TimeWindow::new(
            month_start(year.checked_sub(1)?, 12)?,
            month_start(year, 9)?,
        ))
    }

    pub fn aggregate_year(&self, field: &GridField, year: i32) -> ClimateResult<SeasonalRaster> {
        let window = Self::window(year)
            .ok_or_else(|| ClimateError::invalid_axis("time", format!("year {} is out of range", year)))?;

        let (_, n_lat, n_lon) = field.shape();
        let n = n_lat * n_lon;
        let in_window = field.indices_in_window(&window);

        let mut summer = SlotAccumulator::new(n, self.strategy);
        let mut winter = SlotAccumulator::new(n, self.strategy);

        for month in 1..=12u32 {
            let indices: Vec<usize> = in_window
                .iter()
                .copied()
                .filter(|&t| field.times()[t].month() == month)
                .collect();

            if indices.is_empty() {
                continue;
            }

            debug!(year, month, samples = indices.len(), "monthly mean");
            let mean_f: Vec<f64> = field
                .cell_mean(&indices)
                .into_iter()
                .map(kelvin_to_fahrenheit)
                .collect();

            for (i, &lat) in field.latitudes().iter().enumerate() {
                let slot = match classify_latitude(month, lat) {
                    Some(Season::Summer) => &mut summer,
                    Some(Season::Winter) => &mut winter,
                    None => continue,
                };
                let row = i * n_lon..(i + 1) * n_lon;
                slot.write_row(row.clone(), &mean_f[row]);
            }
        }

        Ok(SeasonalRaster {
            year,
            latitudes: field.latitudes().to_vec(),
            longitudes: field.longitudes().to_vec(),
            summer: summer.finish(),
            winter: winter.finish(),
        })
    }
}

/// One season slot across all cells, filled row by row.
struct SlotAccumulator {
    strategy: SeasonStrategy,
    values: Vec<f64>,
    counts: Vec<u32>,
}

impl SlotAccumulator {
    fn new(n: usize, strategy: SeasonStrategy) -> Self {
        let (values, counts) = match strategy {
            SeasonStrategy::LastMonth => (vec![f64::NAN; n], Vec::new()),
            SeasonStrategy::MonthlyMean => (vec![0.0; n], vec![0; n]),
        };
        Self {
            strategy,
            values,
            counts,
        }
    }

    fn write_row(&mut self, range: std::ops::Range<usize>, monthly: &[f64]) {
        match self.strategy {
            SeasonStrategy::LastMonth => {
                self.values[range].copy_from_slice(monthly);
            }
            SeasonStrategy::MonthlyMean => {
                for (k, &v) in range.zip(monthly) {
                    if v.is_finite() {
                        self.values[k] += v;
                        self.counts[k] += 1;
                    }
                }
            }
        }
    }

    fn finish(self) -> Vec<f64> {
        match self.strategy {
            SeasonStrategy::LastMonth => self.values,
            SeasonStrategy::MonthlyMean => self
                .values
                .iter()
                .zip(&self.counts)
                .map(|(&s, &c)| if c > 0 { s / f64::from(c) } else { f64::NAN })
                .collect(),
        }
    }
}

/// Seasonal rasters for many years, concatenated along a leading year axis.
#[derive(Debug, Clone)]
pub struct SeasonalArchive {
    years: Vec<i32>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    summer: Vec<f64>,
    winter: Vec<f64>,
}

impl SeasonalArchive {
    /// Concatenate rasters, ordered by year. Every raster must share the
    /// first raster's axes.
    pub fn from_rasters(mut rasters: Vec<SeasonalRaster>) -> ClimateResult<Self> {
        rasters.sort_by_key(|r| r.year);

        let Some(first) = rasters.first() else {
            return Err(ClimateError::mismatch("seasonal archive", "at least one year", "none"));
        };
        let latitudes = first.latitudes.clone();
        let longitudes = first.longitudes.clone();
        let n = latitudes.len() * longitudes.len();

        let mut years = Vec::with_capacity(rasters.len());
        let mut summer = Vec::with_capacity(rasters.len() * n);
        let mut winter = Vec::with_capacity(rasters.len() * n);

        for raster in rasters {
            if raster.latitudes != latitudes || raster.longitudes != longitudes {
                return Err(ClimateError::mismatch(
                    format!("seasonal raster for {}", raster.year),
                    format!("{}x{} grid shared by the archive", latitudes.len(), longitudes.len()),
                    format!("{}x{} grid", raster.latitudes.len(), raster.longitudes.len()),
                ));
            }
            if raster.summer.len() != n || raster.winter.len() != n {
                return Err(ClimateError::mismatch(
                    format!("seasonal raster for {}", raster.year),
                    format!("{} cells", n),
                    format!("{}/{} cells", raster.summer.len(), raster.winter.len()),
                ));
            }
            if years.last() == Some(&raster.year) {
                return Err(ClimateError::mismatch(
                    "seasonal archive",
                    "one raster per year",
                    format!("duplicate year {}", raster.year),
                ));
            }

            years.push(raster.year);
            summer.extend_from_slice(&raster.summer);
            winter.extend_from_slice(&raster.winter);
        }

        Ok(Self {
            years,
            latitudes,
            longitudes,
            summer,
            winter,
        })
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    pub fn contains_cell(&self, lat: usize, lon: usize) -> bool {
        lat < self.latitudes.len() && lon < self.longitudes.len()
    }

    /// One cell's values for every archived year.
    pub fn cell_series(&self, season: Season, lat: usize, lon: usize) -> Vec<f64> {
        let n = self.latitudes.len() * self.longitudes.len();
        let offset = lat * self.longitudes.len() + lon;
        let values = match season {
            Season::Summer => &self.summer,
            Season::Winter => &self.winter,
        };
        (0..self.years.len()).map(|y| values[y * n + offset]).collect()
    }
}
