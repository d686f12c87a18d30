//! Point-over-layer attribute extraction with alias fallbacks.

use geo::{Distance, Euclidean, Intersects};
use geo_types::{Geometry, Point};
use serde::Deserialize;
use tracing::warn;

use super::layer::{normalize_column_name, AttrValue, Feature, VectorLayer};
use crate::error::GeoError;
use crate::models::{FieldValue, GeoPoint};

/// An output field fed from the first alias column present in the layer.
#[derive(Clone, Debug, Deserialize)]
pub struct FieldSpec {
    /// Name the value is published under.
    pub name: String,
    /// Candidate columns, scanned in order. Empty means the field name
    /// itself is the column.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(name: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn columns(&self) -> Vec<String> {
        if self.aliases.is_empty() {
            vec![normalize_column_name(&self.name)]
        } else {
            self.aliases
                .iter()
                .map(|alias| normalize_column_name(alias))
                .collect()
        }
    }
}

/// Extract `specs` from the feature under `point`. The point is reprojected
/// into the layer CRS before matching; `buffer` (layer units) only applies
/// to line features. No matching feature yields every field as
/// [`FieldValue::NotAvailable`] rather than an error.
pub fn resolve_fields(
    layer: &VectorLayer,
    point: &GeoPoint,
    specs: &[FieldSpec],
    buffer: Option<f64>,
) -> Result<Vec<(String, FieldValue)>, GeoError> {
    let local = point.reproject(layer.crs())?;
    let probe = Point::new(local.x(), local.y());
    let margin = buffer.unwrap_or(0.0);

    let mut matched: Option<&Feature> = None;
    let mut extra = 0usize;
    for feature in layer.candidates(local.x(), local.y(), margin) {
        if feature_matches(feature, &probe, margin) {
            if matched.is_none() {
                matched = Some(feature);
            } else {
                extra += 1;
            }
        }
    }
    if extra > 0 {
        warn!(
            "Layer '{}': {} features match the point, keeping the first in file order",
            layer.name(),
            extra + 1
        );
    }

    let Some(feature) = matched else {
        return Ok(all_missing(specs));
    };
    Ok(specs
        .iter()
        .map(|spec| (spec.name.clone(), extract_field(feature, spec)))
        .collect())
}

fn all_missing(specs: &[FieldSpec]) -> Vec<(String, FieldValue)> {
    specs
        .iter()
        .map(|spec| (spec.name.clone(), FieldValue::NotAvailable))
        .collect()
}

fn feature_matches(feature: &Feature, probe: &Point<f64>, buffer: f64) -> bool {
    if feature.is_line() && buffer > 0.0 {
        return line_distance(feature.geometry(), probe)
            .map(|d| d <= buffer)
            .unwrap_or(false);
    }
    feature.geometry().intersects(probe)
}

fn line_distance(geometry: &Geometry<f64>, probe: &Point<f64>) -> Option<f64> {
    match geometry {
        Geometry::Line(line) => Some(Euclidean.distance(probe, line)),
        Geometry::LineString(line) => Some(Euclidean.distance(probe, line)),
        Geometry::MultiLineString(lines) => Some(
            lines
                .iter()
                .map(|line| Euclidean.distance(probe, line))
                .fold(f64::INFINITY, f64::min),
        ),
        _ => None,
    }
}

fn extract_field(feature: &Feature, spec: &FieldSpec) -> FieldValue {
    for column in spec.columns() {
        match feature.get(&column) {
            Some(AttrValue::Text(s)) => return FieldValue::Text(s.clone()),
            Some(AttrValue::Number(n)) => return FieldValue::Number(*n),
            // The column exists but is empty; later aliases do not apply.
            Some(AttrValue::Null) => return FieldValue::NotAvailable,
            None => continue,
        }
    }
    FieldValue::NotAvailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CrsRegistry;
    use geo_types::{LineString, MultiLineString, Polygon};
    use hashbrown::HashMap;

    fn attrs(pairs: &[(&str, AttrValue)]) -> HashMap<String, AttrValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn square(min: f64, max: f64, pairs: &[(&str, AttrValue)]) -> Feature {
        let ring = LineString::from(vec![
            (min, min),
            (min, max),
            (max, max),
            (max, min),
            (min, min),
        ]);
        Feature::new(
            Geometry::Polygon(Polygon::new(ring, vec![])),
            attrs(pairs),
        )
    }

    fn vertical_line(x: f64, pairs: &[(&str, AttrValue)]) -> Feature {
        let line = LineString::from(vec![(x, 0.0), (x, 10.0)]);
        Feature::new(
            Geometry::MultiLineString(MultiLineString::new(vec![line])),
            attrs(pairs),
        )
    }

    fn text(s: &str) -> AttrValue {
        AttrValue::Text(s.to_string())
    }

    fn point(reg: &CrsRegistry, x: f64, y: f64, crs: &str) -> GeoPoint {
        GeoPoint::build(x, y, crs, reg).unwrap()
    }

    #[test]
    fn extracts_fields_from_the_containing_polygon() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "cuencas",
            reg.resolve("5367").unwrap(),
            vec![square(0.0, 10.0, &[("NOMBRE", text("Reventazon"))])],
        );
        let fields = resolve_fields(
            &layer,
            &point(&reg, 5.0, 5.0, "5367"),
            &[FieldSpec::with_aliases("CUENCA", &["NOMBRE"])],
            None,
        )
        .unwrap();
        assert_eq!(
            fields,
            vec![("CUENCA".to_string(), FieldValue::Text("Reventazon".to_string()))]
        );
    }

    #[test]
    fn points_outside_every_feature_read_as_missing() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "cuencas",
            reg.resolve("5367").unwrap(),
            vec![square(0.0, 10.0, &[("NOMBRE", text("Reventazon"))])],
        );
        let fields = resolve_fields(
            &layer,
            &point(&reg, 50.0, 50.0, "5367"),
            &[FieldSpec::new("CUENCA"), FieldSpec::new("CUENCA_NO")],
            None,
        )
        .unwrap();
        assert_eq!(
            fields,
            vec![
                ("CUENCA".to_string(), FieldValue::NotAvailable),
                ("CUENCA_NO".to_string(), FieldValue::NotAvailable),
            ]
        );
    }

    #[test]
    fn earlier_aliases_shadow_later_ones() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "cuencas",
            reg.resolve("5367").unwrap(),
            vec![square(
                0.0,
                10.0,
                &[("NOMBRE", text("por nombre")), ("CUENCA_N", text("por numero"))],
            )],
        );
        let fields = resolve_fields(
            &layer,
            &point(&reg, 5.0, 5.0, "5367"),
            &[FieldSpec::with_aliases("CUENCA", &["NOMBRE", "CUENCA_N"])],
            None,
        )
        .unwrap();
        assert_eq!(fields[0].1, FieldValue::Text("por nombre".to_string()));
    }

    #[test]
    fn an_empty_cell_stops_the_alias_scan() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "cuencas",
            reg.resolve("5367").unwrap(),
            vec![square(
                0.0,
                10.0,
                &[("NOMBRE", AttrValue::Null), ("CUENCA_N", text("relleno"))],
            )],
        );
        let fields = resolve_fields(
            &layer,
            &point(&reg, 5.0, 5.0, "5367"),
            &[FieldSpec::with_aliases("CUENCA", &["NOMBRE", "CUENCA_N"])],
            None,
        )
        .unwrap();
        assert_eq!(fields[0].1, FieldValue::NotAvailable);
    }

    #[test]
    fn missing_columns_fall_through_to_later_aliases() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "hojas",
            reg.resolve("5367").unwrap(),
            vec![square(0.0, 10.0, &[("NUM", AttrValue::Number(3345.0))])],
        );
        let fields = resolve_fields(
            &layer,
            &point(&reg, 5.0, 5.0, "5367"),
            &[FieldSpec::with_aliases("HOJA_NUM", &["NUMERO", "NUM"])],
            None,
        )
        .unwrap();
        assert_eq!(fields[0].1, FieldValue::Number(3345.0));
    }

    #[test]
    fn buffered_lines_match_within_reach() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "rios",
            reg.resolve("5367").unwrap(),
            vec![vertical_line(5.0, &[("NOMBRE", text("Rio Grande"))])],
        );
        let probe = point(&reg, 8.0, 5.0, "5367");
        let spec = [FieldSpec::with_aliases("RIO", &["NOMBRE"])];

        let hit = resolve_fields(&layer, &probe, &spec, Some(4.0)).unwrap();
        assert_eq!(hit[0].1, FieldValue::Text("Rio Grande".to_string()));

        let miss = resolve_fields(&layer, &probe, &spec, Some(2.0)).unwrap();
        assert_eq!(miss[0].1, FieldValue::NotAvailable);

        // Without a buffer a line is only hit by exact intersection.
        let exact = resolve_fields(&layer, &probe, &spec, None).unwrap();
        assert_eq!(exact[0].1, FieldValue::NotAvailable);
    }

    #[test]
    fn ties_resolve_to_the_earliest_row() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "limites",
            reg.resolve("5367").unwrap(),
            vec![
                square(0.0, 10.0, &[("NOMBRE", text("primero"))]),
                square(0.0, 10.0, &[("NOMBRE", text("segundo"))]),
            ],
        );
        let fields = resolve_fields(
            &layer,
            &point(&reg, 5.0, 5.0, "5367"),
            &[FieldSpec::with_aliases("PROVINCIA", &["NOMBRE"])],
            None,
        )
        .unwrap();
        assert_eq!(fields[0].1, FieldValue::Text("primero".to_string()));
    }

    #[test]
    fn points_reproject_into_the_layer_crs() {
        let reg = CrsRegistry::with_defaults();
        let layer = VectorLayer::new(
            "limites",
            reg.resolve("4326").unwrap(),
            vec![Feature::new(
                Geometry::Polygon(Polygon::new(
                    LineString::from(vec![
                        (-85.0, 9.0),
                        (-85.0, 11.0),
                        (-83.0, 11.0),
                        (-83.0, 9.0),
                        (-85.0, 9.0),
                    ]),
                    vec![],
                )),
                attrs(&[("NOMBRE", text("San Jose"))]),
            )],
        );
        let fields = resolve_fields(
            &layer,
            &point(&reg, 500_000.0, 1_100_000.0, "5367"),
            &[FieldSpec::with_aliases("PROVINCIA", &["NOMBRE"])],
            None,
        )
        .unwrap();
        assert_eq!(fields[0].1, FieldValue::Text("San Jose".to_string()));
    }
}
