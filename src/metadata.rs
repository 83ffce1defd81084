use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type Attributes = BTreeMap<String, AttributeValue>;

/// A `.zattrs` value.
///
/// Integers are tried before floats so that whole numbers keep their
/// integer type through a read/write cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Number(f64),
    String(String),
    Boolean(bool),
    Array(Vec<AttributeValue>),
    Object(BTreeMap<String, AttributeValue>),
    Null,
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Number(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Integer(v)
    }
}

/// One array of the store, as described by its `.zarray` and `.zattrs`.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub path: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub compressor: Option<String>,
    pub fill_value: Option<AttributeValue>,
    pub order: String,
    pub attributes: Attributes,
    pub dimensions: Vec<String>,
    /// Store key of the first chunk, relative to the array directory.
    pub first_chunk: String,
}

impl Variable {
    pub fn from_zarray(path: &str, zarray: ZArrayMetadata, attributes: Attributes) -> Self {
        let name = if path.is_empty() {
            "root".to_string()
        } else {
            path.split('/').next_back().unwrap_or(path).to_string()
        };

        let compressor = zarray
            .compressor
            .as_ref()
            .and_then(|c| c.get("id"))
            .and_then(|id| id.as_str())
            .map(|s| s.to_string());

        let fill_value = zarray
            .fill_value
            .as_ref()
            .map(|fv| serde_json::from_value(fv.clone()).unwrap_or(AttributeValue::Null));

        let dimensions = extract_dimension_names(&attributes, zarray.shape.len());
        let first_chunk = zarray.first_chunk_key();

        Self {
            name,
            path: path.to_string(),
            dtype: zarray.dtype,
            shape: zarray.shape,
            chunks: zarray.chunks,
            compressor,
            fill_value,
            order: zarray.order,
            attributes,
            dimensions,
            first_chunk,
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::as_str)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(AttributeValue::as_f64)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().map(|&n| n as usize).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the whole array is stored as one chunk.
    pub fn is_single_chunk(&self) -> bool {
        self.chunks.len() == self.shape.len()
            && self.chunks.iter().zip(&self.shape).all(|(c, s)| c >= s)
    }
}

/// Dimension names from `_ARRAY_DIMENSIONS`, or `dim_<i>` placeholders.
pub fn extract_dimension_names(attributes: &Attributes, ndim: usize) -> Vec<String> {
    if let Some(AttributeValue::Array(dims)) = attributes.get("_ARRAY_DIMENSIONS") {
        let names: Vec<String> = dims
            .iter()
            .filter_map(|val| val.as_str().map(str::to_string))
            .collect();
        if names.len() == ndim {
            return names;
        }
    }
    (0..ndim).map(|i| format!("dim_{}", i)).collect()
}

/// Root attributes and every array of a store, keyed by path.
#[derive(Debug, Default)]
pub struct ZarrMetadata {
    pub global_attributes: Attributes,
    pub variables: BTreeMap<String, Variable>,
}

impl ZarrMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a variable up by path, falling back to its bare name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables
            .get(name)
            .or_else(|| self.variables.values().find(|v| v.name == name))
    }
}

/// Raw Zarr array metadata from .zarray file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub compressor: Option<serde_json::Value>,
    pub fill_value: Option<serde_json::Value>,
    pub order: String,
    pub filters: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

impl ZArrayMetadata {
    /// Chunk key of the first chunk, e.g. `0.0.0`.
    pub fn first_chunk_key(&self) -> String {
        let sep = self.dimension_separator.as_deref().unwrap_or(".");
        if self.shape.is_empty() {
            "0".to_string()
        } else {
            vec!["0"; self.shape.len()].join(sep)
        }
    }
}

/// Raw Zarr group metadata from .zgroup file
#[derive(Debug, Serialize, Deserialize)]
pub struct ZGroupMetadata {
    pub zarr_format: u8,
}

/// Consolidated metadata from .zmetadata file
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsolidatedMetadata {
    pub zarr_consolidated_format: u8,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zarray(shape: Vec<u64>, chunks: Vec<u64>) -> ZArrayMetadata {
        ZArrayMetadata {
            zarr_format: 2,
            shape,
            chunks,
            dtype: "<f8".to_string(),
            compressor: None,
            fill_value: Some(serde_json::json!("NaN")),
            order: "C".to_string(),
            filters: None,
            dimension_separator: None,
        }
    }

    #[test]
    fn test_extract_dimension_names_with_array_dimensions() {
        let mut attributes = Attributes::new();
        let dims = vec![
            AttributeValue::from("time"),
            AttributeValue::from("latitude"),
            AttributeValue::from("longitude"),
        ];
        attributes.insert("_ARRAY_DIMENSIONS".to_string(), AttributeValue::Array(dims));

        let variable = Variable::from_zarray("t2m", zarray(vec![10, 20, 30], vec![5, 10, 15]), attributes);
        assert_eq!(variable.dimensions, vec!["time", "latitude", "longitude"]);
        assert_eq!(variable.name, "t2m");
        assert_eq!(variable.len(), 6000);
        assert!(!variable.is_single_chunk());
    }

    #[test]
    fn test_extract_dimension_names_default() {
        let variable = Variable::from_zarray("group/data", zarray(vec![100, 200], vec![100, 200]), Attributes::new());
        assert_eq!(variable.dimensions, vec!["dim_0", "dim_1"]);
        assert_eq!(variable.name, "data");
        assert!(variable.is_single_chunk());
        assert_eq!(variable.first_chunk, "0.0");
        assert_eq!(variable.fill_value, Some(AttributeValue::from("NaN")));
    }

    #[test]
    fn test_attribute_integers_stay_integers() {
        let attrs: Attributes =
            serde_json::from_str(r#"{"a": 3, "b": 2.5, "c": "K", "d": [1, 2], "e": null, "f": {"x": 1}}"#)
                .unwrap();
        assert_eq!(attrs["a"], AttributeValue::Integer(3));
        assert_eq!(attrs["b"], AttributeValue::Number(2.5));
        assert_eq!(attrs["c"].as_str(), Some("K"));
        assert_eq!(attrs["d"], AttributeValue::Array(vec![AttributeValue::Integer(1), AttributeValue::Integer(2)]));
        assert_eq!(attrs["e"], AttributeValue::Null);
        assert!(matches!(attrs["f"], AttributeValue::Object(_)));
        assert_eq!(attrs["a"].as_f64(), Some(3.0));
    }

    #[test]
    fn test_zarr_array_metadata_parsing() {
        let json_data = r#"{
            "zarr_format": 2,
            "shape": [100, 200],
            "chunks": [10, 20],
            "dtype": "<f8",
            "compressor": {"id": "zstd", "level": 3},
            "fill_value": null,
            "order": "C",
            "filters": [{"id": "shuffle"}]
        }"#;

        let metadata: ZArrayMetadata = serde_json::from_str(json_data).unwrap();
        assert_eq!(metadata.shape, vec![100, 200]);
        assert_eq!(metadata.dtype, "<f8");
        assert_eq!(metadata.first_chunk_key(), "0.0");

        let variable = Variable::from_zarray("t", metadata, Attributes::new());
        assert_eq!(variable.compressor.as_deref(), Some("zstd"));
    }

    #[test]
    fn test_chunk_key_separator() {
        let mut meta = zarray(vec![2, 3, 4], vec![2, 3, 4]);
        assert_eq!(meta.first_chunk_key(), "0.0.0");
        meta.dimension_separator = Some("/".to_string());
        assert_eq!(meta.first_chunk_key(), "0/0/0");
        assert_eq!(zarray(vec![], vec![]).first_chunk_key(), "0");
    }

    #[test]
    fn test_variable_lookup_by_name() {
        let mut metadata = ZarrMetadata::new();
        metadata.variables.insert(
            "grp/latitude".to_string(),
            Variable::from_zarray("grp/latitude", zarray(vec![3], vec![3]), Attributes::new()),
        );
        assert!(metadata.variable("grp/latitude").is_some());
        assert!(metadata.variable("latitude").is_some());
        assert!(metadata.variable("longitude").is_none());
    }
}
