//! Tabular and JSON artifacts.

use crate::region::{Region, RegionSample};
use crate::season::Hemisphere;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnualRecord {
    pub year: i32,
    pub temp_k: f64,
    pub temp_f: f64,
    pub temp_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyHemisphereRecord {
    pub year: i32,
    pub month: u32,
    pub hemisphere: Hemisphere,
    pub temp_k: f64,
    pub temp_f: f64,
    pub temp_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionAnnualRecord {
    pub year: i32,
    pub region: Region,
    pub temp_k: f64,
    pub temp_f: f64,
    pub temp_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionMonthlyRecord {
    pub year: i32,
    pub month: u32,
    pub region: Region,
    pub temp_k: f64,
    pub temp_f: f64,
    pub temp_c: f64,
}

/// World summer and winter means for one year, °F.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonalMeanRecord {
    pub year: i32,
    pub summer: f64,
    pub winter: f64,
}

impl From<&RegionSample> for AnnualRecord {
    fn from(s: &RegionSample) -> Self {
        Self {
            year: s.bucket.year(),
            temp_k: s.kelvin(),
            temp_f: s.fahrenheit(),
            temp_c: s.celsius(),
        }
    }
}

impl From<&RegionSample> for RegionAnnualRecord {
    fn from(s: &RegionSample) -> Self {
        Self {
            year: s.bucket.year(),
            region: s.region,
            temp_k: s.kelvin(),
            temp_f: s.fahrenheit(),
            temp_c: s.celsius(),
        }
    }
}

impl From<&RegionSample> for RegionMonthlyRecord {
    fn from(s: &RegionSample) -> Self {
        Self {
            year: s.bucket.year(),
            month: s.bucket.month().unwrap_or(0),
            region: s.region,
            temp_k: s.kelvin(),
            temp_f: s.fahrenheit(),
            temp_c: s.celsius(),
        }
    }
}

impl MonthlyHemisphereRecord {
    /// `None` for samples of regions that are not a hemisphere, or for
    /// yearly buckets.
    pub fn from_sample(s: &RegionSample) -> Option<Self> {
        let hemisphere = match s.region {
            Region::North => Hemisphere::North,
            Region::South => Hemisphere::South,
            _ => return None,
        };
        Some(Self {
            year: s.bucket.year(),
            month: s.bucket.month()?,
            hemisphere,
            temp_k: s.kelvin(),
            temp_f: s.fahrenheit(),
            temp_c: s.celsius(),
        })
    }
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    for record in records {
        wtr.serialize(record)
            .with_context(|| format!("Failed to write CSV row to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush CSV file: {}", path.display()))?;
    Ok(())
}

pub fn read_csv<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.with_context(|| format!("Invalid row {} in {}", i + 1, path.display()))
        })
        .collect()
}

/// Pretty-printed JSON. Non-finite floats are written as `null`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    fs::write(path, text).with_context(|| format!("Failed to write file: {}", path.display()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}
