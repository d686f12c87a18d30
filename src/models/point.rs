//! A coordinate pair bound to its CRS.

use crate::crs::{transform_xy, Crs, CrsRegistry};
use crate::error::GeoError;

/// 2D coordinate bound to exactly one CRS.
///
/// The pair is only meaningful under [`GeoPoint::crs`]; reprojection returns
/// a new point and never mutates in place.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoPoint {
    x: f64,
    y: f64,
    crs: Crs,
}

impl GeoPoint {
    /// Bind a raw coordinate pair to a CRS resolved through the registry.
    /// Fails with [`GeoError::UnsupportedCrs`] before any I/O happens.
    pub fn build(
        x: f64,
        y: f64,
        crs_code: &str,
        registry: &CrsRegistry,
    ) -> Result<Self, GeoError> {
        let crs = registry.resolve(crs_code)?;
        Ok(Self { x, y, crs })
    }

    pub fn new(x: f64, y: f64, crs: Crs) -> Self {
        Self { x, y, crs }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Transform into `target`, returning a new point bound to it.
    /// Reprojecting into the point's own CRS is a plain copy.
    pub fn reproject(&self, target: &Crs) -> Result<Self, GeoError> {
        if self.crs == *target {
            return Ok(self.clone());
        }
        let (x, y) = transform_xy(&self.crs, target, self.x, self.y)?;
        Ok(Self {
            x,
            y,
            crs: target.clone(),
        })
    }
}
