pub mod cache;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;

pub use cache::{ContentKey, EdgeMapCache};
pub use crate::config::{CacheConfig, LineConfig, PreprocessConfig, SheetCounterConfig};
pub use detection::SheetCounter;
pub use detection::lines::{LineCounter, count_sheets};
pub use detection::preprocessing::{Preprocessor, edge_thresholds, median_intensity, preprocess};
pub use error::{Result, SheetCountError};
pub use models::{ImageArray, LineSegment, SheetEstimate};
pub use pipeline::{
    DebugConfig, MetadataValue, Pipeline, PipelineContext, PipelineData, PipelineStep,
};
