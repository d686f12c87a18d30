//! Shapefile-backed vector layers and point-over-layer attribute lookup.

mod attribute;
mod index;
mod layer;

pub use attribute::{resolve_fields, FieldSpec};
pub use index::LayerIndex;
pub use layer::{epsg_from_wkt, normalize_column_name, AttrValue, Feature, VectorLayer};
