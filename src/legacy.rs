//! Re-encode a dataset using 32-bit numeric types only.

use crate::dataset::{ArrayValues, DataVariable, Dataset};
use crate::error::{ClimateError, ClimateResult};
use crate::metadata::{AttributeValue, Attributes};
use tracing::warn;

/// Elements dropped during conversion, as `variable` or `variable:attribute`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LegacyReport {
    pub skipped_variables: Vec<String>,
    pub skipped_attributes: Vec<String>,
}

impl LegacyReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_variables.is_empty() && self.skipped_attributes.is_empty()
    }
}

/// Narrow every variable and attribute. Anything that cannot be represented
/// is left out and recorded in the report.
pub fn to_legacy(dataset: &Dataset) -> (Dataset, LegacyReport) {
    let mut report = LegacyReport::default();
    let mut out = Dataset {
        attributes: narrow_attributes("", &dataset.attributes, &mut report),
        variables: Vec::with_capacity(dataset.variables.len()),
    };

    for variable in &dataset.variables {
        let values = match narrow_values(&variable.name, &variable.values) {
            Ok(values) => values,
            Err(e) => {
                warn!(variable = %variable.name, "skipping variable: {}", e);
                report.skipped_variables.push(variable.name.clone());
                continue;
            }
        };

        out.variables.push(DataVariable {
            name: variable.name.clone(),
            dimensions: variable.dimensions.clone(),
            shape: variable.shape.clone(),
            values,
            attributes: narrow_attributes(&variable.name, &variable.attributes, &mut report),
        });
    }

    (out, report)
}

pub fn narrow_values(name: &str, values: &ArrayValues) -> ClimateResult<ArrayValues> {
    let unsupported = || ClimateError::UnsupportedEncoding {
        what: format!("variable '{}'", name),
        from: values.dtype().to_string(),
    };

    Ok(match values {
        ArrayValues::F64(v) => {
            if v.iter().any(|x| x.is_finite() && x.abs() > f64::from(f32::MAX)) {
                return Err(unsupported());
            }
            ArrayValues::F32(v.iter().map(|&x| x as f32).collect())
        }
        ArrayValues::I64(v) => ArrayValues::I32(
            v.iter()
                .map(|&x| i32::try_from(x).map_err(|_| unsupported()))
                .collect::<ClimateResult<_>>()?,
        ),
        ArrayValues::F32(_) | ArrayValues::I32(_) => values.clone(),
    })
}

fn narrow_attributes(owner: &str, attributes: &Attributes, report: &mut LegacyReport) -> Attributes {
    let mut out = Attributes::new();
    for (key, value) in attributes {
        match narrow_attribute(value) {
            Some(narrowed) => {
                out.insert(key.clone(), narrowed);
            }
            None => {
                let label = if owner.is_empty() {
                    key.clone()
                } else {
                    format!("{}:{}", owner, key)
                };
                warn!(attribute = %label, "skipping attribute that has no 32-bit encoding");
                report.skipped_attributes.push(label);
            }
        }
    }
    out
}

fn narrow_scalar(value: &AttributeValue) -> Option<AttributeValue> {
    match value {
        AttributeValue::Integer(i) => i32::try_from(*i).ok().map(|v| AttributeValue::Integer(i64::from(v))),
        AttributeValue::Number(f) => Some(AttributeValue::Number(f64::from(*f as f32))),
        AttributeValue::Boolean(b) => Some(AttributeValue::Integer(i64::from(*b))),
        AttributeValue::String(s) => Some(AttributeValue::String(s.clone())),
        AttributeValue::Array(_) | AttributeValue::Object(_) | AttributeValue::Null => None,
    }
}

fn narrow_attribute(value: &AttributeValue) -> Option<AttributeValue> {
    match value {
        AttributeValue::Array(items) => items
            .iter()
            .map(narrow_scalar)
            .collect::<Option<Vec<_>>>()
            .map(AttributeValue::Array),
        other => narrow_scalar(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Dataset {
        let mut ds = Dataset::new()
            .with_attribute("title", "slopes")
            .with_attribute("history", AttributeValue::Null);
        ds.push(DataVariable::coordinate("latitude", vec![10.0, -10.0]).with_attribute("units", "degrees_north"));
        ds.push(DataVariable::new("year", &["year"], vec![2], ArrayValues::I64(vec![1940, 2023])).unwrap());
        ds.push(
            DataVariable::new("huge", &["year"], vec![2], ArrayValues::I64(vec![1, i64::from(i32::MAX) + 1])).unwrap(),
        );
        ds.push(
            DataVariable::new("summer_slope", &["latitude"], vec![2], ArrayValues::F64(vec![0.1, f64::NAN]))
                .unwrap()
                .with_attribute("valid_range", AttributeValue::Array(vec![AttributeValue::Number(-1.0), AttributeValue::Number(1.0)]))
                .with_attribute("big", AttributeValue::Integer(i64::MAX))
                .with_attribute(
                    "nested",
                    AttributeValue::Array(vec![AttributeValue::Array(vec![AttributeValue::Integer(1)])]),
                ),
        );
        ds
    }

    #[test]
    fn test_types_are_narrowed() {
        let (legacy, _) = to_legacy(&source());
        assert_eq!(legacy.variable("latitude").unwrap().values, ArrayValues::F32(vec![10.0, -10.0]));
        assert_eq!(legacy.variable("year").unwrap().values, ArrayValues::I32(vec![1940, 2023]));

        let slope = legacy.variable("summer_slope").unwrap().values.to_f64();
        assert!((slope[0] - 0.1).abs() < 1e-7);
        assert!(slope[1].is_nan());
        assert!(legacy.variables.iter().all(|v| matches!(v.values, ArrayValues::F32(_) | ArrayValues::I32(_))));
    }

    #[test]
    fn test_unrepresentable_elements_are_skipped() {
        let (legacy, report) = to_legacy(&source());
        assert!(legacy.variable("huge").is_none());
        assert_eq!(report.skipped_variables, vec!["huge"]);
        assert_eq!(
            report.skipped_attributes,
            vec!["history", "summer_slope:big", "summer_slope:nested"]
        );
        assert!(!report.is_clean());

        assert_eq!(legacy.attributes["title"].as_str(), Some("slopes"));
        let attrs = &legacy.variable("summer_slope").unwrap().attributes;
        assert!(attrs.contains_key("valid_range"));
        assert!(!attrs.contains_key("big"));
    }

    #[test]
    fn test_narrow_values_error_names_variable() {
        let err = narrow_values("x", &ArrayValues::F64(vec![1e300])).unwrap_err();
        assert!(err.to_string().contains("variable 'x'"));
        assert!(narrow_values("x", &ArrayValues::F64(vec![f64::INFINITY])).is_ok());
    }
}
