//! In-memory mirror of a stored artifact.

use crate::metadata::{AttributeValue, Attributes};
use anyhow::{Result, anyhow, bail};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Typed array contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
}

impl ArrayValues {
    /// Zarr v2 dtype string.
    pub fn dtype(&self) -> &'static str {
        match self {
            ArrayValues::F64(_) => "<f8",
            ArrayValues::F32(_) => "<f4",
            ArrayValues::I64(_) => "<i8",
            ArrayValues::I32(_) => "<i4",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValues::F64(v) => v.len(),
            ArrayValues::F32(v) => v.len(),
            ArrayValues::I64(v) => v.len(),
            ArrayValues::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ArrayValues::F64(_) | ArrayValues::F32(_))
    }

    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            ArrayValues::F64(v) => v.clone(),
            ArrayValues::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayValues::I64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayValues::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
        }
    }

    /// Little-endian bytes in element order.
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len() * 8);
        match self {
            ArrayValues::F64(v) => {
                for &x in v {
                    buf.write_f64::<LittleEndian>(x)?;
                }
            }
            ArrayValues::F32(v) => {
                for &x in v {
                    buf.write_f32::<LittleEndian>(x)?;
                }
            }
            ArrayValues::I64(v) => {
                for &x in v {
                    buf.write_i64::<LittleEndian>(x)?;
                }
            }
            ArrayValues::I32(v) => {
                for &x in v {
                    buf.write_i32::<LittleEndian>(x)?;
                }
            }
        }
        Ok(buf)
    }

    /// Decode exactly `count` little-endian elements of `dtype`.
    ///
    /// 16-bit integers, common for packed reanalysis fields, widen to i32.
    pub fn decode(bytes: &[u8], dtype: &str, count: usize) -> Result<Self> {
        let width = match dtype {
            "<f8" | "<i8" => 8,
            "<f4" | "<i4" => 4,
            "<i2" => 2,
            _ => bail!("Unsupported dtype '{}'", dtype),
        };
        if bytes.len() < count * width {
            bail!(
                "Chunk holds {} bytes but {} elements of '{}' need {}",
                bytes.len(),
                count,
                dtype,
                count * width
            );
        }

        let mut reader = Cursor::new(bytes);
        let short = |e: std::io::Error| anyhow!("Truncated chunk data: {}", e);

        Ok(match dtype {
            "<f8" => ArrayValues::F64(
                (0..count)
                    .map(|_| reader.read_f64::<LittleEndian>().map_err(short))
                    .collect::<Result<_>>()?,
            ),
            "<f4" => ArrayValues::F32(
                (0..count)
                    .map(|_| reader.read_f32::<LittleEndian>().map_err(short))
                    .collect::<Result<_>>()?,
            ),
            "<i8" => ArrayValues::I64(
                (0..count)
                    .map(|_| reader.read_i64::<LittleEndian>().map_err(short))
                    .collect::<Result<_>>()?,
            ),
            "<i4" => ArrayValues::I32(
                (0..count)
                    .map(|_| reader.read_i32::<LittleEndian>().map_err(short))
                    .collect::<Result<_>>()?,
            ),
            _ => ArrayValues::I32(
                (0..count)
                    .map(|_| reader.read_i16::<LittleEndian>().map(i32::from).map_err(short))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

/// One named array with its dimensions and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub values: ArrayValues,
    pub attributes: Attributes,
}

impl DataVariable {
    pub fn new(
        name: impl Into<String>,
        dimensions: &[&str],
        shape: Vec<usize>,
        values: ArrayValues,
    ) -> Result<Self> {
        let name = name.into();
        if dimensions.len() != shape.len() {
            bail!(
                "Variable '{}' has {} dimension names for {} axes",
                name,
                dimensions.len(),
                shape.len()
            );
        }
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            bail!(
                "Variable '{}' of shape {:?} needs {} values, got {}",
                name,
                shape,
                expected,
                values.len()
            );
        }
        Ok(Self {
            name,
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            shape,
            values,
            attributes: Attributes::new(),
        })
    }

    /// A 1-D coordinate variable named after its own dimension.
    pub fn coordinate(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dimensions: vec![name.to_string()],
            shape: vec![values.len()],
            values: ArrayValues::F64(values),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// Global attributes plus variables, in write order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub attributes: Attributes,
    pub variables: Vec<DataVariable>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn push(&mut self, variable: DataVariable) {
        self.variables.retain(|v| v.name != variable.name);
        self.variables.push(variable);
    }

    pub fn variable(&self, name: &str) -> Option<&DataVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}
