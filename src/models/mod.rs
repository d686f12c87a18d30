//! Core data models for the resolution pipeline.

pub mod context;
pub mod point;

pub use context::{FieldValue, ReportContext, NOT_AVAILABLE};
pub use point::GeoPoint;
