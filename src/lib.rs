pub mod axes;
pub mod city;
pub mod classify;
pub mod config;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod legacy;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod region;
pub mod render;
pub mod season;
pub mod seasonal;
pub mod spatial;
pub mod store;
pub mod trend;
pub mod units;
pub mod weights;
pub mod world;

// Re-export commonly used types for tests
pub use dataset::{ArrayValues, DataVariable, Dataset};
pub use error::{ClimateError, ClimateResult};
pub use grid::GridField;
pub use metadata::{AttributeValue, Variable, ZarrMetadata};
pub use pipeline::Pipeline;
pub use store::{ZarrStore, write_dataset};
