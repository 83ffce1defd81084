//! Point locations mapped onto the grid and their per-city trends.

use crate::error::{ClimateError, ClimateResult};
use crate::season::Season;
use crate::seasonal::SeasonalArchive;
use crate::spatial::SpatialIndex;
use crate::trend::{SeasonPair, fit_years};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityPoint {
    #[serde(deserialize_with = "text_or_number")]
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "coordinate")]
    pub lat: f64,
    #[serde(deserialize_with = "coordinate")]
    pub lon: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(f64),
    Text(String),
}

fn coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Number(v) => Ok(v),
        Scalar::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid coordinate '{}'", s))),
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Parse a JSON array of cities, rejecting duplicate ids.
pub fn parse_cities(json: &str) -> anyhow::Result<Vec<CityPoint>> {
    let cities: Vec<CityPoint> = serde_json::from_str(json)?;
    ensure_unique_ids(&cities)?;
    Ok(cities)
}

pub fn ensure_unique_ids(cities: &[CityPoint]) -> ClimateResult<()> {
    let mut seen = HashSet::new();
    for city in cities {
        if !seen.insert(city.id.as_str()) {
            return Err(ClimateError::DuplicateId(city.id.clone()));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityGridMapping {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub grid_distance: f64,
    pub grid_index: usize,
    pub grid_lat_index: usize,
    pub grid_lon_index: usize,
}

/// Nearest cell for every city, in input order. Cities that cannot be
/// placed (non-finite coordinates, empty grid) are skipped.
pub fn map_cities(index: &SpatialIndex, cities: &[CityPoint]) -> Vec<CityGridMapping> {
    cities
        .iter()
        .filter_map(|city| match index.nearest(city.lat, city.lon) {
            Some(m) => Some(CityGridMapping {
                id: city.id.clone(),
                lat: city.lat,
                lon: city.lon,
                grid_distance: m.distance,
                grid_index: m.flat_index,
                grid_lat_index: m.lat_index,
                grid_lon_index: m.lon_index,
            }),
            None => {
                warn!(city = %city.id, lat = city.lat, lon = city.lon, "no grid cell for city");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyPoint {
    pub year: i32,
    pub summer: f64,
    pub winter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityTrendRecord {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub lat_index: usize,
    pub lon_index: usize,
    pub data: Vec<YearlyPoint>,
    pub slopes: SeasonPair,
    pub intercepts: SeasonPair,
}

/// Extract each mapped city's seasonal series from the archive and fit a
/// trend per season. A city whose id is unknown or whose cell lies outside
/// the archive is logged and skipped.
pub fn city_trends(
    archive: &SeasonalArchive,
    cities: &[CityPoint],
    mappings: &[CityGridMapping],
) -> Vec<CityTrendRecord> {
    let names: HashMap<&str, &str> = cities
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    mappings
        .iter()
        .filter_map(|mapping| {
            let Some(name) = names.get(mapping.id.as_str()) else {
                warn!(city = %mapping.id, "mapped city missing from city list");
                return None;
            };
            let (lat_index, lon_index) = (mapping.grid_lat_index, mapping.grid_lon_index);
            if !archive.contains_cell(lat_index, lon_index) {
                warn!(city = %mapping.id, lat_index, lon_index, "grid cell outside seasonal archive");
                return None;
            }

            let summer = archive.cell_series(Season::Summer, lat_index, lon_index);
            let winter = archive.cell_series(Season::Winter, lat_index, lon_index);
            let years = archive.years();
            let (slopes, intercepts) =
                SeasonPair::from_trends(fit_years(years, &summer), fit_years(years, &winter));

            Some(CityTrendRecord {
                id: mapping.id.clone(),
                name: name.to_string(),
                lat: mapping.lat,
                lon: mapping.lon,
                lat_index,
                lon_index,
                data: years
                    .iter()
                    .zip(summer.iter().zip(&winter))
                    .map(|(&year, (&summer, &winter))| YearlyPoint { year, summer, winter })
                    .collect(),
                slopes,
                intercepts,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seasonal::SeasonalRaster;

    #[test]
    fn test_parse_mixed_coordinates() {
        let json = r#"[
            {"id": "nyc", "name": "New York", "lat": "40.71", "lon": -74.0},
            {"id": 7, "name": "Sydney", "lat": -33.87, "lon": "151.21"}
        ]"#;
        let cities = parse_cities(json).unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].lat, 40.71);
        assert_eq!(cities[1].id, "7");
        assert_eq!(cities[1].lon, 151.21);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"[
            {"id": "a", "name": "A", "lat": 0, "lon": 0},
            {"id": "a", "name": "B", "lat": 1, "lon": 1}
        ]"#;
        let err = parse_cities(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate point id 'a'"));
    }

    #[test]
    fn test_bad_coordinate_rejected() {
        let json = r#"[{"id": "a", "name": "A", "lat": "north", "lon": 0}]"#;
        assert!(parse_cities(json).is_err());
    }

    fn city(id: &str, lat: f64, lon: f64) -> CityPoint {
        CityPoint {
            id: id.to_string(),
            name: id.to_uppercase(),
            lat,
            lon,
        }
    }

    #[test]
    fn test_cities_share_cells() {
        let index = SpatialIndex::build(&[10.0, -10.0], &[0.0, 90.0]).unwrap();
        let cities = vec![city("a", 9.0, 1.0), city("b", 11.0, -1.0), city("c", -8.0, 80.0)];
        let mappings = map_cities(&index, &cities);

        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[0].grid_index, 0);
        assert_eq!(mappings[1].grid_index, 0);
        assert_eq!((mappings[2].grid_lat_index, mappings[2].grid_lon_index), (1, 1));
        assert!((mappings[0].grid_distance - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_city_trends_from_archive() {
        let raster = |year: i32, v: f64| SeasonalRaster {
            year,
            latitudes: vec![10.0, -10.0],
            longitudes: vec![0.0, 90.0],
            summer: vec![v; 4],
            winter: vec![v - 20.0, f64::NAN, v - 20.0, v - 20.0],
        };
        let archive =
            SeasonalArchive::from_rasters(vec![raster(2000, 70.0), raster(2001, 72.0)]).unwrap();
        let cities = vec![city("a", 10.0, 90.0), city("b", -10.0, 0.0)];
        let index = SpatialIndex::build(archive.latitudes(), archive.longitudes()).unwrap();
        let mut mappings = map_cities(&index, &cities);
        mappings.push(CityGridMapping {
            id: "ghost".to_string(),
            lat: 0.0,
            lon: 0.0,
            grid_distance: 0.0,
            grid_index: 0,
            grid_lat_index: 0,
            grid_lon_index: 0,
        });

        let records = city_trends(&archive, &cities, &mappings);
        assert_eq!(records.len(), 2);

        let a = &records[0];
        assert_eq!(a.name, "A");
        assert_eq!(a.data.len(), 2);
        assert!((a.slopes.summer - 2.0).abs() < 1e-9);
        assert!(a.slopes.winter.is_nan());
        assert!(a.intercepts.winter.is_nan());

        let b = &records[1];
        assert!((b.slopes.winter - 2.0).abs() < 1e-9);
        assert!((b.intercepts.summer - (70.0 - 2.0 * 2000.0)).abs() < 1e-6);
    }

    #[test]
    fn test_record_json_shape() {
        let record = CityTrendRecord {
            id: "x".to_string(),
            name: "X".to_string(),
            lat: 1.0,
            lon: 2.0,
            lat_index: 3,
            lon_index: 4,
            data: vec![YearlyPoint {
                year: 2000,
                summer: 1.0,
                winter: f64::NAN,
            }],
            slopes: SeasonPair {
                summer: f64::NAN,
                winter: f64::NAN,
            },
            intercepts: SeasonPair {
                summer: f64::NAN,
                winter: f64::NAN,
            },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["lat_index"], 3);
        assert!(json["data"][0]["winter"].is_null());
        assert!(json["slopes"]["summer"].is_null());
    }
}
