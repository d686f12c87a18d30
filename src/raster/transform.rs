//! Affine mapping between raster grid and world coordinates.

/// North-up affine geotransform without rotation terms.
///
/// `origin` is the world position of the outer corner of cell (0, 0);
/// `pixel_height` is negative for north-up rasters, so row indices grow
/// southward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    origin_x: f64,
    origin_y: f64,
    pixel_width: f64,
    pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Compose from the GeoTIFF ModelPixelScale and ModelTiepoint tag values.
    /// The tiepoint anchors raster cell (i, j) at a world position; shifting
    /// it back by the scale gives the origin of cell (0, 0).
    pub fn from_scale_and_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        if scale[0] == 0.0 || scale[1] == 0.0 {
            return None;
        }
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        Some(Self {
            origin_x,
            origin_y,
            pixel_width: scale[0],
            pixel_height: -scale[1],
        })
    }

    /// World position of fractional cell (col, row).
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Fractional cell under a world position. Inverse of
    /// [`GeoTransform::pixel_to_world`].
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// `(min_x, min_y, max_x, max_y)` covered by a `width` x `height` grid.
    pub fn extent(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_world(0.0, 0.0);
        let (x1, y1) = self.pixel_to_world(width as f64, height as f64);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}
