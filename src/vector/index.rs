//! Bounding-box R-tree over layer rows.

use rstar::{RTree, RTreeObject, AABB};

use super::layer::Feature;

/// One indexed row: the envelope is precomputed so tree probes never touch
/// the geometry itself.
#[derive(Debug)]
struct IndexedRow {
    row: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRow {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index returning candidate row numbers for a probe point. Rows
/// with no extent (empty geometries) are left out.
#[derive(Debug)]
pub struct LayerIndex {
    tree: RTree<IndexedRow>,
}

impl LayerIndex {
    pub fn build(features: &[Feature]) -> Self {
        let rows = features
            .iter()
            .enumerate()
            .filter_map(|(row, feature)| {
                feature.bbox().map(|rect| IndexedRow {
                    row,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(rows),
        }
    }

    /// Rows whose envelope intersects the probe, sorted by row number so
    /// downstream ties resolve in file order. A positive `margin` grows the
    /// probe into a box, which is how buffered line matching reaches
    /// features the point itself misses.
    pub fn candidates(&self, x: f64, y: f64, margin: f64) -> Vec<usize> {
        let probe = if margin > 0.0 {
            AABB::from_corners([x - margin, y - margin], [x + margin, y + margin])
        } else {
            AABB::from_point([x, y])
        };
        let mut rows: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&probe)
            .map(|entry| entry.row)
            .collect();
        rows.sort_unstable();
        rows
    }
}
