//! Error types for the resolution pipeline.
//!
//! Only [`GeoError::UnsupportedCrs`] and [`GeoError::MissingLayerCrs`] abort a
//! resolution. The availability variants are absorbed by their callers, which
//! log and continue with an absent layer or raster so the affected fields
//! degrade to "not available".

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    /// CRS code outside the supported set. Raised before any file I/O.
    #[error("unsupported CRS code: {0}")]
    UnsupportedCrs(String),

    /// Vector layer without a usable CRS; it cannot be joined safely.
    #[error("layer '{layer}' has no usable CRS: {reason}")]
    MissingLayerCrs { layer: String, reason: String },

    /// Layer archive or shapefile missing or unreadable.
    #[error("layer '{layer}' unavailable: {reason}")]
    LayerUnavailable { layer: String, reason: String },

    /// DEM file missing, unreadable, or without georeferencing.
    #[error("raster '{}' unavailable: {}", .path.display(), .reason)]
    RasterUnavailable { path: PathBuf, reason: String },

    /// Coordinate transform between two supported CRSs failed.
    #[error("transform {from} -> {to} failed: {reason}")]
    Transform {
        from: String,
        to: String,
        reason: String,
    },
}

/// Failures of the report rendering step. Rendering never falls back to the
/// unmodified template bytes; a broken render must be visible to the caller.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("template rendering failed: {0}")]
    RenderFailed(String),
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::RenderFailed(err.to_string())
    }
}

impl From<zip::result::ZipError> for RenderError {
    fn from(err: zip::result::ZipError) -> Self {
        RenderError::RenderFailed(err.to_string())
    }
}
