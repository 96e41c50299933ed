//! Paged CV rendering: turn a variable-height document into A4 PDF pages
//! without cutting records across page boundaries.

pub mod blind_slice;
pub mod blocks;
pub mod budget;
pub mod config;
pub mod display;
pub mod document;
pub mod error;
pub mod flow;
pub mod font_metrics;
pub mod layout;
pub mod layout_box;
pub mod measure;
pub mod paginate;
pub mod pdf;
pub mod pipeline;
pub mod progress;
pub mod raster;
pub mod raster_backend;
pub mod resources;
pub mod server;
pub mod templates;

pub use config::{RenderConfig, RenderOptions, ServerConfig};
pub use error::PipelineError;
pub use pipeline::{DocumentSource, GeneratedPdf, Pipeline, Strategy};
pub use progress::{ProgressEvent, ProgressReporter};
