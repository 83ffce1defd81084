//! Stage functions chaining the components over the data directory.

use crate::city::{CityGridMapping, CityPoint, city_trends, map_cities, parse_cities};
use crate::classify::ClassificationSummary;
use crate::config::{Layout, PipelineConfig};
use crate::dataset::{ArrayValues, DataVariable, Dataset};
use crate::error::{ClimateError, ClimateResult};
use crate::grid::GridField;
use crate::legacy::to_legacy;
use crate::output::{
    AnnualRecord, MonthlyHemisphereRecord, RegionAnnualRecord, RegionMonthlyRecord, read_csv, read_json,
    write_csv, write_json,
};
use crate::region::{Region, RegionAverager, TimeBucket, interleaved_series};
use crate::seasonal::{SeasonalAggregator, SeasonalArchive, SeasonalRaster};
use crate::spatial::SpatialIndex;
use crate::store::{ZarrStore, write_dataset};
use crate::trend::{TrendRaster, trend_raster};
use crate::world::{WorldSummary, seasonal_means};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ANNUAL_CSV: &str = "annual_mean_temperatures.csv";
pub const MONTHLY_CSV: &str = "monthly_mean_temperatures.csv";
pub const POLES_ANNUAL_CSV: &str = "annual_mean_temperatures_poles.csv";
pub const POLES_MONTHLY_CSV: &str = "monthly_mean_temperatures_poles.csv";
pub const SEASONAL_CSV: &str = "seasonal_mean_temperatures.csv";
pub const WORLD_JSON: &str = "world.json";
pub const PERCENTAGES_JSON: &str = "percentage-analysis.json";

/// What a stage produced and what it left out.
#[derive(Debug, Default)]
pub struct StageReport {
    pub stage: &'static str,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

impl StageReport {
    fn new(stage: &'static str) -> Self {
        Self {
            stage,
            ..Default::default()
        }
    }

    fn wrote(&mut self, path: PathBuf) {
        self.written.push(path);
    }

    fn skip(&mut self, what: impl Into<String>) {
        self.skipped.push(what.into());
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    layout: Layout,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let layout = config.layout();
        Self { config, layout }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Load the configured input variable as a normalized grid field.
    pub async fn load_input(&self) -> Result<GridField> {
        let path = self.config.input_path();
        let store = ZarrStore::new(&path).with_context(|| format!("Failed to open input grid '{}'", path.display()))?;
        let metadata = store
            .load_metadata()
            .await
            .with_context(|| format!("Failed to load Zarr store from '{}'", path.display()))?;

        let field = store
            .read_grid_field(&metadata, &self.config.variable, self.config.member.as_deref())
            .await
            .with_context(|| format!("Failed to read '{}' from '{}'", self.config.variable, path.display()))?;

        let (t, y, x) = field.shape();
        info!(input = %path.display(), times = t, latitudes = y, longitudes = x, "loaded input grid");
        Ok(field)
    }

    pub async fn run_seasons(&self) -> Result<StageReport> {
        let field = self.load_input().await?;
        self.seasons_from(&field).await
    }

    async fn seasons_from(&self, field: &GridField) -> Result<StageReport> {
        let mut report = StageReport::new("seasons");
        let aggregator = SeasonalAggregator::new(self.config.season_strategy);

        // Every configured year is written, even with an empty window.
        for year in self.config.years() {
            let has_data = SeasonalAggregator::window(year).is_some_and(|w| !field.indices_in_window(&w).is_empty());
            if !has_data {
                warn!(year, "no monthly data in the seasonal window, writing an empty raster");
            }

            let raster = aggregator.aggregate_year(field, year)?;
            let path = self.layout.seasonal_year(year);
            write_dataset(&path, &raster_dataset(&raster, aggregator)?)
                .await
                .with_context(|| format!("Failed to write seasonal raster for {}", year))?;
            info!(year, path = %path.display(), "seasonal raster written");
            report.wrote(path);
        }

        Ok(report)
    }

    /// Every available yearly raster. Missing or mismatched years are
    /// logged and left out; an archive with no year at all is an error.
    pub async fn load_archive(&self) -> Result<SeasonalArchive> {
        let mut rasters: Vec<SeasonalRaster> = Vec::new();

        for year in self.config.years() {
            let path = self.layout.seasonal_year(year);
            if !path.is_dir() {
                warn!("{}", ClimateError::MissingInput { year, path });
                continue;
            }

            let raster = read_seasonal_raster(&path, year)
                .await
                .with_context(|| format!("Failed to read seasonal raster '{}'", path.display()))?;

            if let Some(first) = rasters.first() {
                if first.latitudes != raster.latitudes || first.longitudes != raster.longitudes {
                    warn!(
                        "{}",
                        ClimateError::mismatch(
                            format!("seasonal raster for {}", year),
                            format!("{}x{} grid", first.latitudes.len(), first.longitudes.len()),
                            format!("{}x{} grid", raster.latitudes.len(), raster.longitudes.len()),
                        )
                    );
                    continue;
                }
            }
            rasters.push(raster);
        }

        if rasters.is_empty() {
            bail!(
                "No seasonal rasters found for {}-{} under '{}'. Run the 'seasons' stage first.",
                self.config.start_year,
                self.config.end_year,
                self.layout.year_dir().display()
            );
        }

        info!(years = rasters.len(), "seasonal archive loaded");
        Ok(SeasonalArchive::from_rasters(rasters)?)
    }

    pub async fn run_slopes(&self) -> Result<StageReport> {
        let mut report = StageReport::new("slopes");
        let archive = self.load_archive().await?;
        let raster = trend_raster(&archive);

        let path = self.config.slopes_path();
        write_dataset(&path, &trend_dataset(&raster)?).await?;
        info!(path = %path.display(), "trend raster written");
        report.wrote(path);
        Ok(report)
    }

    pub async fn load_trend_raster(&self) -> Result<TrendRaster> {
        let path = self.config.slopes_path();
        read_trend_raster(&path)
            .await
            .with_context(|| format!("Failed to read trend raster '{}'. Run the 'slopes' stage first.", path.display()))
    }

    pub async fn run_legacy(&self) -> Result<StageReport> {
        let mut report = StageReport::new("legacy");
        let source = self.config.slopes_path();
        let store = ZarrStore::new(&source)
            .with_context(|| format!("Failed to open trend raster '{}'", source.display()))?;
        let metadata = store.load_metadata().await?;
        let dataset = store.read_dataset(&metadata).await?;

        let (legacy, conversion) = to_legacy(&dataset);
        if conversion.is_clean() {
            debug!("every variable and attribute narrowed to 32 bits");
        } else {
            warn!(
                variables = conversion.skipped_variables.len(),
                attributes = conversion.skipped_attributes.len(),
                "legacy trend raster is missing elements"
            );
            for name in conversion.skipped_variables.iter().chain(&conversion.skipped_attributes) {
                report.skip(name.clone());
            }
        }

        let path = self.config.legacy_slopes_path();
        write_dataset(&path, &legacy).await?;
        info!(path = %path.display(), "legacy trend raster written");
        report.wrote(path);
        Ok(report)
    }

    pub async fn run_percentages(&self) -> Result<StageReport> {
        let mut report = StageReport::new("percentages");
        let raster = self.load_trend_raster().await?;
        let summary = ClassificationSummary::from_slopes(
            &raster.latitudes,
            raster.longitudes.len(),
            &raster.summer_slope,
            &raster.winter_slope,
        );

        let path = self.layout.output_file(PERCENTAGES_JSON);
        write_json(&path, &summary.to_json())?;
        report.wrote(path);
        Ok(report)
    }

    fn load_cities(&self) -> Result<Vec<CityPoint>> {
        let path = self.config.cities_path();
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read city list: {}", path.display()))?;
        parse_cities(&text).with_context(|| format!("Invalid city list in '{}'", path.display()))
    }

    pub async fn run_city_lookup(&self) -> Result<StageReport> {
        let mut report = StageReport::new("city-lookup");
        let cities = self.load_cities()?;

        let input = self.config.input_path();
        let store = ZarrStore::new(&input)?;
        let metadata = store.load_metadata().await?;
        let (latitudes, longitudes) = store.read_grid_axes(&metadata, &self.config.variable).await?;
        let index = SpatialIndex::build(&latitudes, &longitudes)?;

        let mappings = map_cities(&index, &cities);
        for city in cities.iter().filter(|c| !mappings.iter().any(|m| m.id == c.id)) {
            report.skip(city.id.clone());
        }

        let path = self.layout.city_grid_cells();
        write_json(&path, &mappings)?;
        info!(cities = mappings.len(), path = %path.display(), "city grid cells written");
        report.wrote(path);
        Ok(report)
    }

    pub async fn run_city_trends(&self) -> Result<StageReport> {
        let mut report = StageReport::new("cities");
        let cities = self.load_cities()?;
        let mappings: Vec<CityGridMapping> = read_json(&self.layout.city_grid_cells())
            .context("City grid cells are missing. Run the 'city-lookup' stage first.")?;
        let archive = self.load_archive().await?;

        for record in city_trends(&archive, &cities, &mappings) {
            if !is_safe_file_stem(&record.id) {
                warn!(city = %record.id, "city id cannot be used as a file name, skipping");
                report.skip(record.id);
                continue;
            }
            let path = self.layout.city_file(&record.id);
            write_json(&path, &record)?;
            report.wrote(path);
        }

        info!(cities = report.written.len(), dir = %self.layout.city_dir().display(), "city files written");
        Ok(report)
    }

    fn year_buckets(&self) -> Vec<TimeBucket> {
        TimeBucket::years(self.config.stats_start_year, self.config.end_year)
    }

    fn month_buckets(&self) -> Vec<TimeBucket> {
        TimeBucket::months(self.config.stats_start_year, self.config.end_year)
    }

    pub async fn run_grid_annual(&self) -> Result<StageReport> {
        let field = self.load_input().await?;
        self.grid_annual_from(&field)
    }

    fn grid_annual_from(&self, field: &GridField) -> Result<StageReport> {
        let samples = RegionAverager::new(field, Region::Global).series(&self.year_buckets());
        let records: Vec<AnnualRecord> = samples.iter().map(AnnualRecord::from).collect();
        self.write_series("grid-annual", ANNUAL_CSV, &records)
    }

    pub async fn run_grid_monthly(&self) -> Result<StageReport> {
        let field = self.load_input().await?;
        self.grid_monthly_from(&field)
    }

    fn grid_monthly_from(&self, field: &GridField) -> Result<StageReport> {
        let samples = interleaved_series(field, &[Region::North, Region::South], &self.month_buckets());
        let records: Vec<MonthlyHemisphereRecord> =
            samples.iter().filter_map(MonthlyHemisphereRecord::from_sample).collect();
        self.write_series("grid-monthly", MONTHLY_CSV, &records)
    }

    pub async fn run_poles_annual(&self) -> Result<StageReport> {
        let field = self.load_input().await?;
        self.poles_annual_from(&field)
    }

    fn poles_annual_from(&self, field: &GridField) -> Result<StageReport> {
        let samples = interleaved_series(field, &[Region::Arctic, Region::Antarctic], &self.year_buckets());
        let records: Vec<RegionAnnualRecord> = samples.iter().map(RegionAnnualRecord::from).collect();
        self.write_series("poles-annual", POLES_ANNUAL_CSV, &records)
    }

    pub async fn run_poles_monthly(&self) -> Result<StageReport> {
        let field = self.load_input().await?;
        self.poles_monthly_from(&field)
    }

    fn poles_monthly_from(&self, field: &GridField) -> Result<StageReport> {
        let samples = interleaved_series(field, &[Region::Arctic, Region::Antarctic], &self.month_buckets());
        let records: Vec<RegionMonthlyRecord> = samples.iter().map(RegionMonthlyRecord::from).collect();
        self.write_series("poles-monthly", POLES_MONTHLY_CSV, &records)
    }

    fn write_series<T: serde::Serialize>(&self, stage: &'static str, name: &str, records: &[T]) -> Result<StageReport> {
        let mut report = StageReport::new(stage);
        let path = self.layout.output_file(name);
        write_csv(&path, records)?;
        info!(rows = records.len(), path = %path.display(), "series written");
        report.wrote(path);
        Ok(report)
    }

    /// World seasonal series from the hemisphere monthly CSV.
    pub fn run_world_seasonal(&self) -> Result<StageReport> {
        let mut report = StageReport::new("world-seasonal");
        let monthly: Vec<MonthlyHemisphereRecord> = read_csv(&self.layout.output_file(MONTHLY_CSV))
            .context("Hemisphere monthly means are missing. Run the 'grid-monthly' stage first.")?;

        let series = seasonal_means(&monthly);
        let csv_path = self.layout.output_file(SEASONAL_CSV);
        write_csv(&csv_path, &series)?;
        report.wrote(csv_path);

        let summary = WorldSummary::from_series(&series, self.config.start_year);
        let json_path = self.layout.output_file(WORLD_JSON);
        write_json(&json_path, &summary)?;
        report.wrote(json_path);
        Ok(report)
    }

    /// Every stage in dependency order, loading the input grid once. The
    /// city stages are skipped when there is no city list.
    pub async fn run_all(&self) -> Result<Vec<StageReport>> {
        let field = self.load_input().await?;
        let mut reports = vec![self.seasons_from(&field).await?];

        reports.push(self.run_slopes().await?);
        reports.push(self.run_legacy().await?);
        reports.push(self.run_percentages().await?);

        if self.config.cities_path().exists() {
            reports.push(self.run_city_lookup().await?);
            reports.push(self.run_city_trends().await?);
        } else {
            warn!(path = %self.config.cities_path().display(), "no city list, skipping city stages");
        }

        reports.push(self.grid_annual_from(&field)?);
        reports.push(self.grid_monthly_from(&field)?);
        reports.push(self.poles_annual_from(&field)?);
        reports.push(self.poles_monthly_from(&field)?);
        reports.push(self.run_world_seasonal()?);
        Ok(reports)
    }
}

fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

fn degree_coordinates(raster_lats: &[f64], raster_lons: &[f64]) -> [DataVariable; 2] {
    [
        DataVariable::coordinate("latitude", raster_lats.to_vec())
            .with_attribute("units", "degrees_north")
            .with_attribute("standard_name", "latitude"),
        DataVariable::coordinate("longitude", raster_lons.to_vec())
            .with_attribute("units", "degrees_east")
            .with_attribute("standard_name", "longitude"),
    ]
}

pub fn raster_dataset(raster: &SeasonalRaster, aggregator: SeasonalAggregator) -> Result<Dataset> {
    let shape = vec![raster.latitudes.len(), raster.longitudes.len()];
    let strategy = match aggregator.strategy() {
        crate::seasonal::SeasonStrategy::LastMonth => "last-month",
        crate::seasonal::SeasonStrategy::MonthlyMean => "monthly-mean",
    };

    let mut ds = Dataset::new()
        .with_attribute("year", i64::from(raster.year))
        .with_attribute("season_strategy", strategy);
    for coord in degree_coordinates(&raster.latitudes, &raster.longitudes) {
        ds.push(coord);
    }
    for (name, values) in [("summer", &raster.summer), ("winter", &raster.winter)] {
        ds.push(
            DataVariable::new(name, &["latitude", "longitude"], shape.clone(), ArrayValues::F64(values.clone()))?
                .with_attribute("units", "degF"),
        );
    }
    Ok(ds)
}

pub async fn read_seasonal_raster(path: &Path, year: i32) -> Result<SeasonalRaster> {
    let store = ZarrStore::new(path)?;
    let metadata = store.load_metadata().await?;

    let latitudes = store.read_unpacked(&metadata, "latitude").await?;
    let longitudes = store.read_unpacked(&metadata, "longitude").await?;
    let summer = store.read_unpacked(&metadata, "summer").await?;
    let winter = store.read_unpacked(&metadata, "winter").await?;

    let cells = latitudes.len() * longitudes.len();
    for (name, values) in [("summer", &summer), ("winter", &winter)] {
        if values.len() != cells {
            return Err(ClimateError::mismatch(format!("'{}' of {}", name, path.display()), cells, values.len()).into());
        }
    }

    Ok(SeasonalRaster {
        year,
        latitudes,
        longitudes,
        summer,
        winter,
    })
}

pub fn trend_dataset(raster: &TrendRaster) -> Result<Dataset> {
    let shape = vec![raster.latitudes.len(), raster.longitudes.len()];
    let mut ds = Dataset::new();
    if let (Some(first), Some(last)) = (raster.first_year(), raster.last_year()) {
        ds = ds
            .with_attribute("start_year", i64::from(first))
            .with_attribute("end_year", i64::from(last));
    }

    for coord in degree_coordinates(&raster.latitudes, &raster.longitudes) {
        ds.push(coord);
    }
    ds.push(DataVariable::new(
        "year",
        &["year"],
        vec![raster.years.len()],
        ArrayValues::I64(raster.years.iter().map(|&y| i64::from(y)).collect()),
    )?);
    for (name, values) in [("summer_slope", &raster.summer_slope), ("winter_slope", &raster.winter_slope)] {
        ds.push(
            DataVariable::new(name, &["latitude", "longitude"], shape.clone(), ArrayValues::F64(values.clone()))?
                .with_attribute("units", "degF/year"),
        );
    }
    Ok(ds)
}

/// A stored year value, if it is a whole number in `i32` range.
fn year_from_coordinate(value: f64) -> Option<i32> {
    if value.fract() != 0.0 || value < f64::from(i32::MIN) || value > f64::from(i32::MAX) {
        return None;
    }
    Some(value as i32)
}

pub async fn read_trend_raster(path: &Path) -> Result<TrendRaster> {
    let store = ZarrStore::new(path)?;
    let metadata = store.load_metadata().await?;

    let latitudes = store.read_unpacked(&metadata, "latitude").await?;
    let longitudes = store.read_unpacked(&metadata, "longitude").await?;
    let years = store
        .read_f64(
            metadata
                .variable("year")
                .ok_or_else(|| ClimateError::MissingVariable("year".to_string()))?,
        )
        .await?
        .into_iter()
        .map(|y| {
            year_from_coordinate(y).ok_or_else(|| {
                ClimateError::mismatch(format!("'year' of {}", path.display()), "whole years", y)
            })
        })
        .collect::<ClimateResult<Vec<i32>>>()?;
    let summer_slope = store.read_unpacked(&metadata, "summer_slope").await?;
    let winter_slope = store.read_unpacked(&metadata, "winter_slope").await?;

    let cells = latitudes.len() * longitudes.len();
    if summer_slope.len() != cells || winter_slope.len() != cells {
        return Err(ClimateError::mismatch(
            format!("slopes of {}", path.display()),
            cells,
            format!("{}/{}", summer_slope.len(), winter_slope.len()),
        )
        .into());
    }

    Ok(TrendRaster {
        years,
        latitudes,
        longitudes,
        summer_slope,
        winter_slope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::season::Season;
    use crate::seasonal::SeasonStrategy;
    use chrono::{Datelike, NaiveDate};
    use tempfile::TempDir;

    /// Monthly grid for 1999-12 .. 2002-12 over lat [45, -45], lon [0, 180].
    /// Every cell warms by 1 K per year; the southern row is 10 K colder.
    async fn write_input(dir: &Path) -> PathBuf {
        write_input_until(dir, 2003, 1).await
    }

    /// Same grid, with months up to but excluding `year`-`month`.
    async fn write_input_until(dir: &Path, year: i32, month: u32) -> PathBuf {
        let start = NaiveDate::from_ymd_opt(1999, 12, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = crate::grid::month_start(year, month).unwrap();

        let mut times = Vec::new();
        let mut data = Vec::new();
        let mut t = start;
        while t < end {
            times.push((t - epoch).num_hours() as f64);
            let warming = f64::from(t.year() - 1999);
            for row in [280.0, 270.0] {
                for _ in 0..2 {
                    data.push(row + warming);
                }
            }
            t = crate::grid::month_start(
                if t.month() == 12 { t.year() + 1 } else { t.year() },
                t.month() % 12 + 1,
            )
            .unwrap();
        }

        let mut ds = Dataset::new();
        ds.push(
            DataVariable::coordinate("time", times.clone())
                .with_attribute("units", "hours since 1900-01-01 00:00:00.0")
                .with_attribute("calendar", "gregorian"),
        );
        ds.push(DataVariable::coordinate("latitude", vec![45.0, -45.0]));
        ds.push(DataVariable::coordinate("longitude", vec![0.0, 180.0]));
        ds.push(
            DataVariable::new(
                "t2m",
                &["time", "latitude", "longitude"],
                vec![times.len(), 2, 2],
                ArrayValues::F64(data),
            )
            .unwrap()
            .with_attribute("units", "K"),
        );

        let path = dir.join("input").join("grid.zarr");
        write_dataset(&path, &ds).await.unwrap();
        path
    }

    fn pipeline(dir: &Path, input: PathBuf) -> Pipeline {
        let config = PipelineConfig::load(
            None,
            ConfigOverrides {
                data_dir: Some(dir.to_path_buf()),
                input: Some(input),
                start_year: Some(2000),
                end_year: Some(2002),
                stats_start_year: Some(2000),
                ..Default::default()
            },
        )
        .unwrap();
        Pipeline::new(config)
    }

    #[tokio::test]
    async fn test_seasons_then_slopes() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let p = pipeline(dir.path(), input);

        let report = p.run_seasons().await.unwrap();
        assert_eq!(report.written.len(), 3);
        assert!(p.layout().seasonal_year(2001).join(".zmetadata").exists());

        let raster = read_seasonal_raster(&p.layout().seasonal_year(2001), 2001).await.unwrap();
        // 282 K in the north, last qualifying month wins.
        assert!((raster.value(Season::Summer, 0, 0) - crate::units::kelvin_to_fahrenheit(282.0)).abs() < 1e-9);

        p.run_slopes().await.unwrap();
        let trend = p.load_trend_raster().await.unwrap();
        assert_eq!(trend.years, vec![2000, 2001, 2002]);
        // 1 K per year is 1.8 °F per year.
        for v in trend.summer_slope.iter().chain(&trend.winter_slope) {
            assert!((v - 1.8).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_rerun_on_shorter_input_replaces_old_years() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let p = pipeline(dir.path(), input);
        p.run_seasons().await.unwrap();
        let old = read_seasonal_raster(&p.layout().seasonal_year(2002), 2002).await.unwrap();
        assert!(old.summer.iter().all(|v| v.is_finite()));

        // Ends with 2001-11, so nothing falls in the 2002 window.
        write_input_until(dir.path(), 2001, 12).await;
        let report = p.run_seasons().await.unwrap();
        assert_eq!(report.written.len(), 3);

        let replaced = read_seasonal_raster(&p.layout().seasonal_year(2002), 2002).await.unwrap();
        assert!(replaced.summer.iter().chain(&replaced.winter).all(|v| v.is_nan()));

        p.run_slopes().await.unwrap();
        let trend = p.load_trend_raster().await.unwrap();
        assert_eq!(trend.years, vec![2000, 2001, 2002]);
        for v in trend.summer_slope.iter().chain(&trend.winter_slope) {
            assert!((v - 1.8).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_fractional_trend_years_rejected() {
        let dir = TempDir::new().unwrap();
        let raster = TrendRaster {
            years: vec![2000, 2001],
            latitudes: vec![10.0],
            longitudes: vec![0.0],
            summer_slope: vec![1.0],
            winter_slope: vec![1.0],
        };
        let mut ds = trend_dataset(&raster).unwrap();
        ds.push(DataVariable::new("year", &["year"], vec![2], ArrayValues::F64(vec![2000.0, 2000.5])).unwrap());
        let path = dir.path().join("slopes.zarr");
        write_dataset(&path, &ds).await.unwrap();

        let err = read_trend_raster(&path).await.unwrap_err();
        assert!(err.to_string().contains("whole years"), "{}", err);
        assert!(err.to_string().contains("2000.5"), "{}", err);

        assert_eq!(year_from_coordinate(1940.0), Some(1940));
        assert_eq!(year_from_coordinate(f64::NAN), None);
        assert_eq!(year_from_coordinate(1e12), None);
    }

    #[tokio::test]
    async fn test_missing_year_is_skipped() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let p = pipeline(dir.path(), input);
        p.run_seasons().await.unwrap();
        fs::remove_dir_all(p.layout().seasonal_year(2001)).unwrap();

        let archive = p.load_archive().await.unwrap();
        assert_eq!(archive.years(), &[2000, 2002]);
    }

    #[tokio::test]
    async fn test_archive_without_years_is_error() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let p = pipeline(dir.path(), input);
        let err = p.load_archive().await.unwrap_err();
        assert!(err.to_string().contains("Run the 'seasons' stage first"));
    }

    #[tokio::test]
    async fn test_region_series_and_world() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let p = pipeline(dir.path(), input);

        p.run_grid_annual().await.unwrap();
        let annual: Vec<AnnualRecord> = read_csv(&p.layout().output_file(ANNUAL_CSV)).unwrap();
        assert_eq!(annual.len(), 3);
        // Equal weights at ±45: (281 + 271) / 2 in 2000.
        assert!((annual[0].temp_k - 276.0).abs() < 1e-9);

        p.run_grid_monthly().await.unwrap();
        let monthly: Vec<MonthlyHemisphereRecord> = read_csv(&p.layout().output_file(MONTHLY_CSV)).unwrap();
        assert_eq!(monthly.len(), 3 * 12 * 2);
        assert_eq!(monthly[1].hemisphere, crate::season::Hemisphere::South);

        let report = p.run_world_seasonal().unwrap();
        assert_eq!(report.written.len(), 2);
        let world: WorldSummary = read_json(&p.layout().output_file(WORLD_JSON)).unwrap();
        assert_eq!(world.data.first().map(|r| r.year), Some(2001));
        assert!(world.slopes.summer > 0.0);
    }

    #[tokio::test]
    async fn test_poles_have_no_data_on_this_grid() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let p = pipeline(dir.path(), input);

        p.run_poles_annual().await.unwrap();
        let rows: Vec<RegionAnnualRecord> = read_csv(&p.layout().output_file(POLES_ANNUAL_CSV)).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].region, Region::Arctic);
        assert_eq!(rows[1].region, Region::Antarctic);
        assert!(rows.iter().all(|r| r.temp_k.is_nan()));
    }

    #[tokio::test]
    async fn test_cities_and_legacy() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let p = pipeline(dir.path(), input);
        fs::write(
            p.config().cities_path(),
            r#"[{"id": 1, "name": "North", "lat": 40, "lon": "170"},
                {"id": "s", "name": "South", "lat": -50.0, "lon": -170.0}]"#,
        )
        .unwrap();

        p.run_seasons().await.unwrap();
        p.run_slopes().await.unwrap();

        p.run_city_lookup().await.unwrap();
        let cells: Vec<CityGridMapping> = read_json(&p.layout().city_grid_cells()).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!((cells[0].grid_lat_index, cells[0].grid_lon_index), (0, 1));
        assert_eq!((cells[1].grid_lat_index, cells[1].grid_lon_index), (1, 0));

        let report = p.run_city_trends().await.unwrap();
        assert_eq!(report.written.len(), 2);
        let north: serde_json::Value = read_json(&p.layout().city_file("1")).unwrap();
        assert_eq!(north["data"].as_array().map(Vec::len), Some(3));
        assert!((north["slopes"]["summer"].as_f64().unwrap() - 1.8).abs() < 1e-9);

        let report = p.run_legacy().await.unwrap();
        assert!(report.skipped.is_empty());
        let store = ZarrStore::new(p.config().legacy_slopes_path()).unwrap();
        let metadata = store.load_metadata().await.unwrap();
        assert_eq!(metadata.variable("summer_slope").unwrap().dtype, "<f4");
        assert_eq!(metadata.variable("year").unwrap().dtype, "<i4");

        p.run_percentages().await.unwrap();
        let pct: serde_json::Value = read_json(&p.layout().output_file(PERCENTAGES_JSON)).unwrap();
        assert!((pct["both_positive_percentage"].as_f64().unwrap() - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_monthly_mean_strategy_recorded() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path()).await;
        let mut config = pipeline(dir.path(), input).config().clone();
        config.season_strategy = SeasonStrategy::MonthlyMean;
        let p = Pipeline::new(config);
        p.run_seasons().await.unwrap();

        let store = ZarrStore::new(p.layout().seasonal_year(2000)).unwrap();
        let metadata = store.load_metadata().await.unwrap();
        assert_eq!(metadata.global_attributes["season_strategy"].as_str(), Some("monthly-mean"));
    }

    #[test]
    fn test_safe_file_stem() {
        assert!(is_safe_file_stem("5128581"));
        assert!(!is_safe_file_stem("../x"));
        assert!(!is_safe_file_stem(""));
    }
}
