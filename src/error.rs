use std::path::PathBuf;
use thiserror::Error;

/// Domain errors raised by the grid, aggregation and trend stages.
#[derive(Error, Debug)]
pub enum ClimateError {
    #[error("Input for year {year} not found at '{}'", path.display())]
    MissingInput { year: i32, path: PathBuf },

    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("Cannot narrow {what} from '{from}' to a 32-bit legacy type")]
    UnsupportedEncoding { what: String, from: String },

    #[error("Coordinate axis '{0}' was not found in the dataset")]
    MissingAxis(String),

    #[error("Invalid {axis} axis: {reason}")]
    InvalidAxis { axis: String, reason: String },

    #[error("Unsupported time units '{0}' (expected e.g. 'hours since 1900-01-01')")]
    TimeUnits(String),

    #[error("Variable '{0}' was not found in the dataset")]
    MissingVariable(String),

    #[error("Duplicate point id '{0}'")]
    DuplicateId(String),

    #[error("Ensemble member {member} not found along '{dimension}'")]
    MissingMember { dimension: String, member: String },
}

impl ClimateError {
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn invalid_axis(axis: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAxis {
            axis: axis.into(),
            reason: reason.into(),
        }
    }
}

pub type ClimateResult<T> = Result<T, ClimateError>;
