//! Ceiba - coordinate report resolution over local geodata
//!
//! This library provides the CRS registry, layer and raster readers, the
//! resolution pipeline, and the DOCX renderer used by the report binary.

pub mod crs;
pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod vector;

pub use crs::CrsRegistry;
pub use error::{GeoError, RenderError};
pub use models::{FieldValue, GeoPoint, ReportContext};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig};
