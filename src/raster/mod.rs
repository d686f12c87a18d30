//! Elevation rasters: GeoTIFF decoding, georeferencing, and point sampling.

mod dem;
mod transform;

pub use dem::DemRaster;
pub use transform::GeoTransform;
