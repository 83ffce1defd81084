use crate::axes::{self, AxisKind};
use crate::dataset::{ArrayValues, DataVariable, Dataset};
use crate::error::ClimateError;
use crate::grid::GridField;
use crate::metadata::*;
use anyhow::{Context, Result, anyhow, bail};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct ZarrStore {
    path: PathBuf,
}

impl ZarrStore {
    /// Create a new ZarrStore from a directory path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(anyhow!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(anyhow!("Path is not a directory: {}", path.display()));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load metadata from the Zarr store, attempting consolidated read first
    pub async fn load_metadata(&self) -> Result<ZarrMetadata> {
        match self.load_consolidated_metadata().await {
            Ok(metadata) => {
                debug!(store = %self.path.display(), "loaded consolidated metadata from .zmetadata");
                Ok(metadata)
            }
            Err(e) => {
                debug!(store = %self.path.display(), "consolidated metadata unavailable ({:#}), scanning", e);
                self.load_hierarchical_metadata().await
            }
        }
    }

    async fn load_consolidated_metadata(&self) -> Result<ZarrMetadata> {
        let zmetadata_path = self.path.join(".zmetadata");

        let data = fs::read(&zmetadata_path).with_context(|| {
            format!(
                "No consolidated metadata found at '{}'",
                zmetadata_path.display()
            )
        })?;

        let consolidated: ConsolidatedMetadata = serde_json::from_slice(&data).with_context(|| {
            format!(
                "Invalid consolidated metadata JSON format at '{}'",
                zmetadata_path.display()
            )
        })?;

        let mut metadata = ZarrMetadata::new();
        for (key, value) in &consolidated.metadata {
            if key == ".zattrs" {
                metadata.global_attributes = serde_json::from_value(value.clone()).unwrap_or_default();
            } else if let Some(path) = key.strip_suffix("/.zarray") {
                let zarray: ZArrayMetadata = serde_json::from_value(value.clone())
                    .with_context(|| format!("Failed to parse .zarray for {}", path))?;

                let attributes = consolidated
                    .metadata
                    .get(&format!("{}/.zattrs", path))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();

                metadata
                    .variables
                    .insert(path.to_string(), Variable::from_zarray(path, zarray, attributes));
            }
        }

        Ok(metadata)
    }

    /// Load metadata by scanning the directory tree for .zarray/.zattrs files
    async fn load_hierarchical_metadata(&self) -> Result<ZarrMetadata> {
        let mut array_paths = Vec::new();
        Self::scan_directory(&mut array_paths, "", &self.path)?;

        let mut metadata = ZarrMetadata::new();
        metadata.global_attributes = read_attributes(&self.path.join(".zattrs"));

        for path in array_paths {
            let dir = self.array_dir(&path);
            let zarray_path = dir.join(".zarray");

            let array_data = fs::read(&zarray_path).with_context(|| {
                format!("Missing .zarray file for variable '{}' at '{}'", path, zarray_path.display())
            })?;

            let zarray: ZArrayMetadata = serde_json::from_slice(&array_data).with_context(|| {
                format!(
                    "Invalid .zarray JSON format for variable '{}' at '{}'",
                    path,
                    zarray_path.display()
                )
            })?;

            let attributes = read_attributes(&dir.join(".zattrs"));
            metadata
                .variables
                .insert(path.clone(), Variable::from_zarray(&path, zarray, attributes));
        }

        if metadata.variables.is_empty() {
            bail!(
                "No Zarr arrays found in '{}'. The directory must contain .zarray or .zmetadata files to be a valid Zarr store.",
                self.path.display()
            );
        }

        Ok(metadata)
    }

    /// Recursively collect the paths of directories holding a .zarray file
    fn scan_directory(arrays: &mut Vec<String>, current_path: &str, fs_path: &Path) -> Result<()> {
        let entries = fs::read_dir(fs_path)
            .with_context(|| format!("Failed to read directory: {}", fs_path.display()))?;

        let mut children = Vec::new();
        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename == ".zarray" {
                arrays.push(current_path.to_string());
            } else if !filename.starts_with('.') && entry.path().is_dir() {
                children.push(filename);
            }
        }

        children.sort();
        for child in children {
            let child_path = if current_path.is_empty() {
                child.clone()
            } else {
                format!("{}/{}", current_path, child)
            };
            Self::scan_directory(arrays, &child_path, &fs_path.join(&child))?;
        }

        Ok(())
    }

    fn array_dir(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.path.clone()
        } else {
            self.path.join(path)
        }
    }

    /// Read a whole array in its stored type.
    pub async fn read_values(&self, variable: &Variable) -> Result<ArrayValues> {
        let bytes = match self.read_with_zarrs(variable).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(variable = %variable.path, "zarrs read failed ({:#}), reading chunk directly", e);
                self.read_single_chunk(variable)?
            }
        };

        ArrayValues::decode(&bytes, &variable.dtype, variable.len())
            .with_context(|| format!("Failed to decode variable '{}'", variable.path))
    }

    /// Read a whole array converted to f64, without unpacking.
    pub async fn read_f64(&self, variable: &Variable) -> Result<Vec<f64>> {
        Ok(self.read_values(variable).await?.to_f64())
    }

    /// Read the array named `name` and apply fill values, scale and offset.
    pub async fn read_unpacked(&self, metadata: &ZarrMetadata, name: &str) -> Result<Vec<f64>> {
        let variable = metadata
            .variable(name)
            .ok_or_else(|| ClimateError::MissingVariable(name.to_string()))?;
        let mut values = self.read_f64(variable).await?;
        axes::unpack(&mut values, variable);
        Ok(values)
    }

    async fn read_with_zarrs(&self, variable: &Variable) -> Result<Vec<u8>> {
        use zarrs::array::Array;
        use zarrs::array_subset::ArraySubset;
        use zarrs::storage::store::FilesystemStore;

        let store = FilesystemStore::new(&self.path)
            .map_err(|e| anyhow!("Failed to create zarrs FilesystemStore: {}", e))?;

        let array_path = format!("/{}", variable.path);
        let array = Array::open(std::sync::Arc::new(store), &array_path)
            .map_err(|e| anyhow!("Failed to open array '{}': {}", array_path, e))?;

        let subset = ArraySubset::new_with_shape(array.shape().to_vec());
        let array_bytes = array
            .retrieve_array_subset(&subset)
            .map_err(|e| anyhow!("Failed to read array data: {}", e))?;

        let bytes: &[u8] = match &array_bytes {
            zarrs::array::ArrayBytes::Variable(data, _offsets) => data.as_ref(),
            zarrs::array::ArrayBytes::Fixed(data) => data.as_ref(),
        };
        Ok(bytes.to_vec())
    }

    /// Fallback for uncompressed arrays stored as a single chunk
    fn read_single_chunk(&self, variable: &Variable) -> Result<Vec<u8>> {
        if let Some(compressor) = &variable.compressor {
            bail!(
                "Variable '{}' uses compression ('{}'), which could not be handled by the zarrs crate",
                variable.path,
                compressor
            );
        }

        if !variable.is_single_chunk() {
            bail!(
                "Variable '{}' spans several chunks ({:?} of {:?}) and could not be read by the zarrs crate",
                variable.path,
                variable.chunks,
                variable.shape
            );
        }

        if variable.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_path = self.array_dir(&variable.path).join(&variable.first_chunk);
        fs::read(&chunk_path).with_context(|| format!("Failed to read chunk file: {}", chunk_path.display()))
    }

    /// Every readable variable with its attributes and dimension names.
    /// Variables that fail to read are logged and left out.
    pub async fn read_dataset(&self, metadata: &ZarrMetadata) -> Result<Dataset> {
        let mut dataset = Dataset {
            attributes: metadata.global_attributes.clone(),
            variables: Vec::new(),
        };

        for variable in metadata.variables.values() {
            let values = match self.read_values(variable).await {
                Ok(values) => values,
                Err(e) => {
                    warn!(variable = %variable.path, "skipping unreadable variable: {:#}", e);
                    continue;
                }
            };

            let mut attributes = variable.attributes.clone();
            attributes.remove("_ARRAY_DIMENSIONS");

            dataset.push(DataVariable {
                name: variable.path.clone(),
                dimensions: variable.dimensions.clone(),
                shape: variable.shape.iter().map(|&n| n as usize).collect(),
                values,
                attributes,
            });
        }

        Ok(dataset)
    }

    /// Load a `[time, latitude, longitude]` field from the named variable.
    ///
    /// One extra dimension (an ensemble such as `expver`) is allowed and
    /// reduced to a single member. Longitudes come back normalized.
    pub async fn read_grid_field(
        &self,
        metadata: &ZarrMetadata,
        name: &str,
        member: Option<&str>,
    ) -> Result<GridField> {
        let variable = metadata
            .variable(name)
            .ok_or_else(|| ClimateError::MissingVariable(name.to_string()))?;

        if variable.order != "C" {
            bail!(
                "Variable '{}' has order='{}'; only C-order arrays are supported",
                variable.path,
                variable.order
            );
        }

        let layout = GridLayout::resolve(metadata, variable)?;
        let shape: Vec<usize> = variable.shape.iter().map(|&n| n as usize).collect();

        let time_var = self.coordinate(metadata, variable, layout.time, AxisKind::Time)?;
        let units = time_var
            .attr_str("units")
            .ok_or_else(|| ClimateError::TimeUnits(format!("<none> on '{}'", time_var.path)))?;
        let time_values = self.read_f64(time_var).await?;
        let times = axes::decode_times(&time_values, units, time_var.attr_str("calendar"))?;

        let lat_var = self.coordinate(metadata, variable, layout.latitude, AxisKind::Latitude)?;
        let latitudes = self.read_f64(lat_var).await?;
        let lon_var = self.coordinate(metadata, variable, layout.longitude, AxisKind::Longitude)?;
        let longitudes = self.read_f64(lon_var).await?;

        for (dim, len, kind) in [
            (layout.time, times.len(), AxisKind::Time),
            (layout.latitude, latitudes.len(), AxisKind::Latitude),
            (layout.longitude, longitudes.len(), AxisKind::Longitude),
        ] {
            if shape[dim] != len {
                return Err(ClimateError::mismatch(
                    format!("{} axis of '{}'", kind.name(), variable.path),
                    shape[dim],
                    len,
                )
                .into());
            }
        }

        let member_index = match layout.ensemble {
            Some(dim) => {
                let dim_name = &variable.dimensions[dim];
                let labels = match metadata.variable(dim_name) {
                    Some(coord) => self.read_f64(coord).await?,
                    None => (0..shape[dim]).map(|i| i as f64).collect(),
                };
                Some((dim, axes::select_member(dim_name, &labels, member)?))
            }
            None => None,
        };

        let mut raw = self.read_f64(variable).await?;
        axes::unpack(&mut raw, variable);
        let data = gather(&raw, &shape, &layout, member_index)?;

        debug!(
            variable = %variable.path,
            times = times.len(),
            latitudes = latitudes.len(),
            longitudes = longitudes.len(),
            "loaded grid field"
        );

        Ok(GridField::new(times, latitudes, longitudes, data)?.normalize_longitudes()?)
    }

    /// Latitude and longitude axes of the named variable, as stored.
    pub async fn read_grid_axes(&self, metadata: &ZarrMetadata, name: &str) -> Result<(Vec<f64>, Vec<f64>)> {
        let variable = metadata
            .variable(name)
            .ok_or_else(|| ClimateError::MissingVariable(name.to_string()))?;
        let layout = GridLayout::resolve(metadata, variable)?;

        let lat_var = self.coordinate(metadata, variable, layout.latitude, AxisKind::Latitude)?;
        let lon_var = self.coordinate(metadata, variable, layout.longitude, AxisKind::Longitude)?;
        Ok((self.read_f64(lat_var).await?, self.read_f64(lon_var).await?))
    }

    fn coordinate<'a>(
        &self,
        metadata: &'a ZarrMetadata,
        variable: &Variable,
        dim: usize,
        kind: AxisKind,
    ) -> Result<&'a Variable> {
        let dim_name = &variable.dimensions[dim];
        let coord = metadata
            .variable(dim_name)
            .ok_or_else(|| ClimateError::MissingAxis(format!("{} ({})", kind.name(), dim_name)))?;
        if coord.shape.len() != 1 {
            return Err(ClimateError::invalid_axis(
                kind.name(),
                format!("coordinate '{}' is not one-dimensional", coord.path),
            )
            .into());
        }
        Ok(coord)
    }
}

/// Positions of each role among a variable's dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayout {
    pub time: usize,
    pub latitude: usize,
    pub longitude: usize,
    pub ensemble: Option<usize>,
}

impl GridLayout {
    pub fn resolve(metadata: &ZarrMetadata, variable: &Variable) -> Result<Self> {
        let mut roles: HashMap<&'static str, usize> = HashMap::new();
        let mut extra = Vec::new();

        for (i, dim) in variable.dimensions.iter().enumerate() {
            let kind = match metadata.variable(dim) {
                Some(coord) => axes::classify_coordinate(coord),
                None => axes::classify_dimension_name(dim),
            };
            match kind {
                Some(kind) => {
                    if roles.insert(kind.name(), i).is_some() {
                        return Err(ClimateError::invalid_axis(
                            kind.name(),
                            format!("more than one {} dimension in '{}'", kind.name(), variable.path),
                        )
                        .into());
                    }
                }
                None => extra.push(i),
            }
        }

        let role = |kind: AxisKind| {
            roles
                .get(kind.name())
                .copied()
                .ok_or_else(|| ClimateError::MissingAxis(kind.name().to_string()))
        };

        let layout = Self {
            time: role(AxisKind::Time)?,
            latitude: role(AxisKind::Latitude)?,
            longitude: role(AxisKind::Longitude)?,
            ensemble: match extra.as_slice() {
                [] => None,
                [one] => Some(*one),
                many => {
                    let names: Vec<&str> = many.iter().map(|&i| variable.dimensions[i].as_str()).collect();
                    return Err(ClimateError::invalid_axis(
                        "ensemble",
                        format!("only one extra dimension is supported, found {}", names.join(", ")),
                    )
                    .into());
                }
            },
        };
        Ok(layout)
    }
}

fn compute_c_strides(shape: &[usize]) -> Result<Vec<usize>> {
    let mut strides = vec![1usize; shape.len()];
    let mut stride = 1usize;

    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride = stride
            .checked_mul(shape[i])
            .ok_or_else(|| anyhow!("Array is too large to index (overflow computing strides)."))?;
    }

    Ok(strides)
}

/// Reorder a C-order array into `[time, latitude, longitude]`, fixing the
/// ensemble dimension at one member.
fn gather(raw: &[f64], shape: &[usize], layout: &GridLayout, member: Option<(usize, usize)>) -> Result<Vec<f64>> {
    let strides = compute_c_strides(shape)?;
    let expected: usize = shape.iter().product();
    if raw.len() != expected {
        return Err(ClimateError::mismatch("array data", expected, raw.len()).into());
    }

    let (nt, nlat, nlon) = (shape[layout.time], shape[layout.latitude], shape[layout.longitude]);
    let base = member.map_or(0, |(dim, index)| index * strides[dim]);
    let (st, sy, sx) = (strides[layout.time], strides[layout.latitude], strides[layout.longitude]);

    let mut out = Vec::with_capacity(nt * nlat * nlon);
    for t in 0..nt {
        for y in 0..nlat {
            let row = base + t * st + y * sy;
            out.extend((0..nlon).map(|x| raw[row + x * sx]));
        }
    }
    Ok(out)
}

fn read_attributes(path: &Path) -> Attributes {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
        Err(_) => Attributes::new(),
    }
}

/// Write `dataset` as a Zarr v2 store of uncompressed single-chunk arrays,
/// with consolidated metadata. An existing store at `path` is replaced.
pub async fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    if path.exists() {
        if !path.join(".zgroup").exists() {
            bail!(
                "Refusing to overwrite '{}': it exists and is not a Zarr group",
                path.display()
            );
        }
        fs::remove_dir_all(path).with_context(|| format!("Failed to remove old store: {}", path.display()))?;
    }
    fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {}", path.display()))?;

    let mut consolidated: HashMap<String, serde_json::Value> = HashMap::new();

    let zgroup = serde_json::to_value(ZGroupMetadata { zarr_format: 2 })?;
    write_json_file(&path.join(".zgroup"), &zgroup)?;
    consolidated.insert(".zgroup".to_string(), zgroup);

    let root_attrs = serde_json::to_value(&dataset.attributes)?;
    write_json_file(&path.join(".zattrs"), &root_attrs)?;
    consolidated.insert(".zattrs".to_string(), root_attrs);

    for variable in &dataset.variables {
        let dir = path.join(&variable.name);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let zarray = ZArrayMetadata {
            zarr_format: 2,
            shape: variable.shape.iter().map(|&n| n as u64).collect(),
            chunks: variable.shape.iter().map(|&n| n.max(1) as u64).collect(),
            dtype: variable.values.dtype().to_string(),
            compressor: None,
            fill_value: Some(if variable.values.is_float() {
                serde_json::Value::String("NaN".to_string())
            } else {
                serde_json::Value::Null
            }),
            order: "C".to_string(),
            filters: None,
            dimension_separator: None,
        };

        let mut attributes = variable.attributes.clone();
        attributes.insert(
            "_ARRAY_DIMENSIONS".to_string(),
            AttributeValue::Array(variable.dimensions.iter().map(|d| AttributeValue::from(d.as_str())).collect()),
        );

        if !variable.values.is_empty() {
            let bytes = variable
                .values
                .encode()
                .with_context(|| format!("Failed to encode variable '{}'", variable.name))?;
            let chunk_path = dir.join(zarray.first_chunk_key());
            fs::write(&chunk_path, bytes)
                .with_context(|| format!("Failed to write chunk file: {}", chunk_path.display()))?;
        }

        let zarray_json = serde_json::to_value(&zarray)?;
        let attrs_json = serde_json::to_value(&attributes)?;
        write_json_file(&dir.join(".zarray"), &zarray_json)?;
        write_json_file(&dir.join(".zattrs"), &attrs_json)?;
        consolidated.insert(format!("{}/.zarray", variable.name), zarray_json);
        consolidated.insert(format!("{}/.zattrs", variable.name), attrs_json);
    }

    let zmetadata = ConsolidatedMetadata {
        zarr_consolidated_format: 1,
        metadata: consolidated,
    };
    write_json_file(&path.join(".zmetadata"), &serde_json::to_value(&zmetadata)?)?;

    debug!(store = %path.display(), variables = dataset.variables.len(), "wrote zarr store");
    Ok(())
}

fn write_json_file(path: &Path, value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write file: {}", path.display()))
}
