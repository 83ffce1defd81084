//! Run configuration and the on-disk layout derived from it.

use crate::seasonal::SeasonStrategy;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_VARIABLE: &str = "t2m";
pub const DEFAULT_INPUT_FILE: &str = "era5_t2m_monthly.zarr";
pub const DEFAULT_START_YEAR: i32 = 1940;
pub const DEFAULT_END_YEAR: i32 = 2024;
pub const DEFAULT_STATS_START_YEAR: i32 = 1940;

/// Settings shared by every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    /// Input grid store; `<data_dir>/input/era5_t2m_monthly.zarr` when unset.
    pub input: Option<PathBuf>,
    pub variable: String,
    pub member: Option<String>,
    pub start_year: i32,
    pub end_year: i32,
    /// First year of the region series and of the world trend.
    pub stats_start_year: i32,
    pub season_strategy: SeasonStrategy,
    /// City list; `<data_dir>/input/cities.json` when unset.
    pub cities: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            input: None,
            variable: DEFAULT_VARIABLE.to_string(),
            member: None,
            start_year: DEFAULT_START_YEAR,
            end_year: DEFAULT_END_YEAR,
            stats_start_year: DEFAULT_STATS_START_YEAR,
            season_strategy: SeasonStrategy::default(),
            cities: None,
        }
    }
}

/// Values given on the command line; each one set replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub variable: Option<String>,
    pub member: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub stats_start_year: Option<i32>,
    pub season_strategy: Option<SeasonStrategy>,
    pub cities: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config JSON in '{}'", path.display()))
    }

    /// Defaults, then the optional file, then the overrides.
    pub fn load(file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, o: ConfigOverrides) {
        if let Some(v) = o.data_dir {
            self.data_dir = v;
        }
        if o.input.is_some() {
            self.input = o.input;
        }
        if let Some(v) = o.variable {
            self.variable = v;
        }
        if o.member.is_some() {
            self.member = o.member;
        }
        if let Some(v) = o.start_year {
            self.start_year = v;
        }
        if let Some(v) = o.end_year {
            self.end_year = v;
        }
        if let Some(v) = o.stats_start_year {
            self.stats_start_year = v;
        }
        if let Some(v) = o.season_strategy {
            self.season_strategy = v;
        }
        if o.cities.is_some() {
            self.cities = o.cities;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year > self.end_year {
            bail!(
                "start year {} is after end year {}",
                self.start_year,
                self.end_year
            );
        }
        if self.stats_start_year > self.end_year {
            bail!(
                "stats start year {} is after end year {}",
                self.stats_start_year,
                self.end_year
            );
        }
        if self.variable.trim().is_empty() {
            bail!("variable name must not be empty");
        }
        Ok(())
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.data_dir)
    }

    pub fn input_path(&self) -> PathBuf {
        self.input
            .clone()
            .unwrap_or_else(|| self.layout().input_dir().join(DEFAULT_INPUT_FILE))
    }

    pub fn cities_path(&self) -> PathBuf {
        self.cities
            .clone()
            .unwrap_or_else(|| self.layout().input_dir().join("cities.json"))
    }

    pub fn slopes_path(&self) -> PathBuf {
        self.layout().slopes(self.start_year, self.end_year)
    }

    pub fn legacy_slopes_path(&self) -> PathBuf {
        self.layout().legacy_slopes(self.start_year, self.end_year)
    }
}

/// File names under the data directory.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn year_dir(&self) -> PathBuf {
        self.output_dir().join("year")
    }

    pub fn city_dir(&self) -> PathBuf {
        self.output_dir().join("city")
    }

    pub fn seasonal_year(&self, year: i32) -> PathBuf {
        self.year_dir().join(format!("seasonal_temps_{}.zarr", year))
    }

    pub fn slopes(&self, start: i32, end: i32) -> PathBuf {
        self.output_dir().join(format!("seasonal_slopes_{}_{}.zarr", start, end))
    }

    pub fn legacy_slopes(&self, start: i32, end: i32) -> PathBuf {
        self.output_dir().join(format!("seasonal_slopes_{}_{}_v3.zarr", start, end))
    }

    pub fn output_file(&self, name: &str) -> PathBuf {
        self.output_dir().join(name)
    }

    pub fn city_grid_cells(&self) -> PathBuf {
        self.output_file("city_grid_cells.json")
    }

    pub fn city_file(&self, id: &str) -> PathBuf {
        self.city_dir().join(format!("{}.json", id))
    }
}
