//! Error types for every stage of the rendering pipeline.
//!
//! Resource and per-page raster failures are absorbed where they happen;
//! only [`PipelineError`] ever reaches the caller.

use thiserror::Error;

/// Why an embedded image could not be made ready. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("timed out after {after_ms}ms waiting for '{src}'")]
    Timeout { src: String, after_ms: u128 },

    #[error("failed to fetch '{src}': {message}")]
    Fetch { src: String, message: String },

    #[error("failed to decode '{src}': {message}")]
    Decode { src: String, message: String },

    #[error("unsupported resource source: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    #[error("document has no extractable block boundaries")]
    NoBlockBoundaries,

    #[error("block {order} measured to a non-finite or negative height ({height})")]
    NonFinite { order: usize, height: f32 },

    #[error("probe layout produced {got} blocks, expected {expected}")]
    CountMismatch { expected: usize, got: usize },

    #[error("block {order} has no estimated height")]
    MissingEstimate { order: usize },
}

/// Failure to rasterize a single page. Isolated to that page.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    #[error("cannot allocate a {width}x{height} render target")]
    Surface { width: u32, height: u32 },

    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("raster task failed: {0}")]
    Task(String),
}

/// The single error surfaced by [`crate::pipeline::Pipeline::generate`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("measurement failed: {0}")]
    Measurement(#[from] MeasureError),

    #[error("PDF assembly failed: {0}")]
    Assembly(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Task(e.to_string())
    }
}
