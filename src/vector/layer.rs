//! Shapefile-backed vector layers with normalized attribute tables.

use std::path::Path;

use geo::BoundingRect;
use geo_types::{Geometry, MultiLineString, MultiPolygon, Point, Rect};
use hashbrown::HashMap;
use regex::Regex;
use shapefile::{dbase, Reader, Shape};
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use super::index::LayerIndex;
use crate::crs::{Crs, CrsRegistry, EPSG_CRTM05, EPSG_WGS84};
use crate::error::GeoError;

/// A single attribute cell, already trimmed and typed.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    /// The column exists but holds no value.
    Null,
}

impl AttrValue {
    fn from_dbase(value: dbase::FieldValue) -> Self {
        match value {
            dbase::FieldValue::Character(Some(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    AttrValue::Null
                } else {
                    AttrValue::Text(trimmed.to_string())
                }
            }
            dbase::FieldValue::Character(None) => AttrValue::Null,
            dbase::FieldValue::Numeric(Some(n)) => AttrValue::Number(n),
            dbase::FieldValue::Numeric(None) => AttrValue::Null,
            dbase::FieldValue::Float(Some(f)) => AttrValue::Number(f64::from(f)),
            dbase::FieldValue::Float(None) => AttrValue::Null,
            dbase::FieldValue::Integer(i) => AttrValue::Number(f64::from(i)),
            dbase::FieldValue::Double(d) => AttrValue::Number(d),
            dbase::FieldValue::Currency(c) => AttrValue::Number(c),
            dbase::FieldValue::Logical(Some(b)) => AttrValue::Text(b.to_string()),
            dbase::FieldValue::Logical(None) => AttrValue::Null,
            dbase::FieldValue::Date(Some(d)) => AttrValue::Text(format!(
                "{:04}-{:02}-{:02}",
                d.year(),
                d.month(),
                d.day()
            )),
            dbase::FieldValue::Date(None) => AttrValue::Null,
            dbase::FieldValue::Memo(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    AttrValue::Null
                } else {
                    AttrValue::Text(trimmed.to_string())
                }
            }
            other => {
                debug!("Unhandled dBase value {other:?} treated as empty");
                AttrValue::Null
            }
        }
    }
}

/// One layer row: geometry in the layer CRS plus its attribute map, keyed by
/// normalized column name.
#[derive(Debug)]
pub struct Feature {
    geometry: Geometry<f64>,
    attributes: HashMap<String, AttrValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, attributes: HashMap<String, AttrValue>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    /// Look up a cell by normalized column name. `None` means the column does
    /// not exist in this layer.
    pub fn get(&self, column: &str) -> Option<&AttrValue> {
        self.attributes.get(column)
    }

    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    /// Line features take part in buffered matching; everything else matches
    /// by exact intersection.
    pub fn is_line(&self) -> bool {
        matches!(
            self.geometry,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_)
        )
    }
}

/// Fold a column name to the `[A-Z0-9_]` alphabet: NFKD-decompose, drop
/// non-ASCII marks, turn spaces into underscores, uppercase.
pub fn normalize_column_name(raw: &str) -> String {
    raw.nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Pull the EPSG code out of a `.prj` WKT string. The outermost
/// `AUTHORITY["EPSG", ...]` node is the last one in WKT1, so the last match
/// wins. ESRI-flavoured files often omit authorities, hence the name
/// fallbacks.
pub fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    let authority = Regex::new(r#"AUTHORITY\["EPSG",\s*"?(\d+)"?\]"#).unwrap();
    if let Some(code) = authority
        .captures_iter(wkt)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return Some(code);
    }
    if wkt.contains("CRTM05") {
        return Some(EPSG_CRTM05);
    }
    let trimmed = wkt.trim_start();
    if trimmed.starts_with("GEOGCS") && wkt.contains("WGS") && wkt.contains("1984") {
        return Some(EPSG_WGS84);
    }
    None
}

/// A loaded layer: features in their native CRS, with a bounding-box index
/// over the rows.
#[derive(Debug)]
pub struct VectorLayer {
    name: String,
    crs: Crs,
    features: Vec<Feature>,
    index: LayerIndex,
}

impl VectorLayer {
    pub fn new(name: impl Into<String>, crs: Crs, features: Vec<Feature>) -> Self {
        let index = LayerIndex::build(&features);
        Self {
            name: name.into(),
            crs,
            features,
            index,
        }
    }

    /// Load `<path>.shp` together with its `.dbf` table and `.prj` sidecar.
    /// A missing or unreadable `.prj` fails the layer, since attributes
    /// joined in a guessed CRS would be silently wrong.
    pub fn from_shapefile(
        name: &str,
        path: &Path,
        registry: &CrsRegistry,
    ) -> Result<Self, GeoError> {
        let prj_path = path.with_extension("prj");
        let wkt = std::fs::read_to_string(&prj_path).map_err(|e| GeoError::MissingLayerCrs {
            layer: name.to_string(),
            reason: format!("cannot read {}: {e}", prj_path.display()),
        })?;
        let epsg = epsg_from_wkt(&wkt).ok_or_else(|| GeoError::MissingLayerCrs {
            layer: name.to_string(),
            reason: format!("no EPSG code recognized in {}", prj_path.display()),
        })?;
        let crs = registry.resolve_epsg(epsg)?;

        let mut reader = Reader::from_path(path).map_err(|e| GeoError::LayerUnavailable {
            layer: name.to_string(),
            reason: e.to_string(),
        })?;

        let mut features = Vec::new();
        let mut skipped = 0usize;
        for row in reader.iter_shapes_and_records() {
            let (shape, record) = match row {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Layer '{name}': unreadable row skipped: {e}");
                    skipped += 1;
                    continue;
                }
            };
            let Some(geometry) = shape_to_geometry(shape, name) else {
                skipped += 1;
                continue;
            };
            let attributes = record
                .into_iter()
                .map(|(column, value)| {
                    (normalize_column_name(&column), AttrValue::from_dbase(value))
                })
                .collect();
            features.push(Feature::new(geometry, attributes));
        }

        info!(
            "Layer '{name}' loaded: {} feature(s) in {crs}, {skipped} skipped",
            features.len()
        );
        Ok(Self::new(name, crs, features))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features whose bounding box comes within `margin` of `(x, y)`, in row
    /// order. Coordinates are in the layer CRS.
    pub fn candidates(&self, x: f64, y: f64, margin: f64) -> Vec<&Feature> {
        self.index
            .candidates(x, y, margin)
            .into_iter()
            .map(|row| &self.features[row])
            .collect()
    }
}

fn shape_to_geometry(shape: Shape, layer: &str) -> Option<Geometry<f64>> {
    match shape {
        Shape::Point(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointM(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointZ(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::Polyline(line) => Some(Geometry::MultiLineString(MultiLineString::from(line))),
        Shape::Polygon(polygon) => Some(Geometry::MultiPolygon(MultiPolygon::from(polygon))),
        Shape::NullShape => None,
        other => {
            warn!(
                "Layer '{layer}': {} shapes are not supported, row skipped",
                other.shapetype()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CrsRegistry;
    use shapefile::dbase::{FieldValue, Record, TableWriterBuilder};
    use shapefile::{Point as ShpPoint, Polygon, PolygonRing, Writer};
    use std::path::Path;
    use tempfile::TempDir;

    const CRTM05_WKT: &str = r#"PROJCS["CR05 / CRTM05",GEOGCS["CR05",DATUM["Costa_Rica_2005",SPHEROID["WGS 84",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","5365"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",-84],PARAMETER["scale_factor",0.9999],PARAMETER["false_easting",500000],PARAMETER["false_northing",0],UNIT["metre",1],AUTHORITY["EPSG","5367"]]"#;

    fn write_square_layer(dir: &Path, stem: &str, wkt: Option<&str>) -> std::path::PathBuf {
        let shp = dir.join(format!("{stem}.shp"));
        // dBase caps field names at 10 ASCII characters.
        let table = TableWriterBuilder::new()
            .add_character_field("Nombre".try_into().unwrap(), 50)
            .add_numeric_field("CUENCA_N".try_into().unwrap(), 10, 2);
        let mut writer = Writer::from_path(&shp, table).unwrap();
        let ring = PolygonRing::Outer(vec![
            ShpPoint::new(499_000.0, 1_099_000.0),
            ShpPoint::new(499_000.0, 1_101_000.0),
            ShpPoint::new(501_000.0, 1_101_000.0),
            ShpPoint::new(501_000.0, 1_099_000.0),
            ShpPoint::new(499_000.0, 1_099_000.0),
        ]);
        let mut record = Record::default();
        record.insert(
            "Nombre".to_string(),
            FieldValue::Character(Some("Tarcoles".to_string())),
        );
        record.insert("CUENCA_N".to_string(), FieldValue::Numeric(Some(24.0)));
        writer
            .write_shape_and_record(&Polygon::new(ring), &record)
            .unwrap();
        drop(writer);
        if let Some(wkt) = wkt {
            std::fs::write(shp.with_extension("prj"), wkt).unwrap();
        }
        shp
    }

    #[test]
    fn column_names_fold_to_ascii_upper() {
        assert_eq!(normalize_column_name("Nombre Cuenca"), "NOMBRE_CUENCA");
        assert_eq!(normalize_column_name("Número"), "NUMERO");
        assert_eq!(normalize_column_name("año"), "ANO");
        assert_eq!(normalize_column_name("CUENCA_N°"), "CUENCA_N");
        assert_eq!(normalize_column_name("hoja"), "HOJA");
    }

    #[test]
    fn wkt_outermost_authority_wins() {
        assert_eq!(epsg_from_wkt(CRTM05_WKT), Some(5367));
    }

    #[test]
    fn wkt_without_authority_falls_back_to_names() {
        let esri = r#"PROJCS["CRTM05",GEOGCS["GCS_CR05",DATUM["D_Costa_Rica_2005",SPHEROID["WGS_1984",6378137.0,298.257223563]]],PROJECTION["Transverse_Mercator"]]"#;
        assert_eq!(epsg_from_wkt(esri), Some(5367));
        let geographic = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]]]"#;
        assert_eq!(epsg_from_wkt(geographic), Some(4326));
        assert_eq!(epsg_from_wkt("not well known text"), None);
    }

    #[test]
    fn loads_a_shapefile_with_normalized_columns() {
        let dir = TempDir::new().unwrap();
        let shp = write_square_layer(dir.path(), "cuencas", Some(CRTM05_WKT));
        let registry = CrsRegistry::with_defaults();
        let layer = VectorLayer::from_shapefile("cuencas", &shp, &registry).unwrap();
        assert_eq!(layer.crs().epsg(), 5367);
        assert_eq!(layer.len(), 1);
        assert!(format!("{layer:?}").contains("cuencas"));
        let hits = layer.candidates(500_000.0, 1_100_000.0, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(
            hits[0].get("NOMBRE"),
            Some(&AttrValue::Text("Tarcoles".to_string()))
        );
        assert_eq!(hits[0].get("CUENCA_N"), Some(&AttrValue::Number(24.0)));
        // The raw casing is gone after normalization.
        assert_eq!(hits[0].get("Nombre"), None);
    }

    #[test]
    fn missing_prj_fails_the_layer() {
        let dir = TempDir::new().unwrap();
        let shp = write_square_layer(dir.path(), "cuencas", None);
        let registry = CrsRegistry::with_defaults();
        let err = VectorLayer::from_shapefile("cuencas", &shp, &registry).unwrap_err();
        assert!(matches!(err, GeoError::MissingLayerCrs { .. }));
    }

    #[test]
    fn unsupported_prj_code_fails_the_layer() {
        let dir = TempDir::new().unwrap();
        let utm = r#"PROJCS["WGS 84 / UTM zone 16N",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],AUTHORITY["EPSG","32616"]]"#;
        let shp = write_square_layer(dir.path(), "cuencas", Some(utm));
        let registry = CrsRegistry::with_defaults();
        let err = VectorLayer::from_shapefile("cuencas", &shp, &registry).unwrap_err();
        assert!(matches!(err, GeoError::UnsupportedCrs(_)));
    }

    #[test]
    fn empty_and_date_cells_become_null_and_text() {
        assert_eq!(
            AttrValue::from_dbase(FieldValue::Character(Some("   ".to_string()))),
            AttrValue::Null
        );
        assert_eq!(AttrValue::from_dbase(FieldValue::Numeric(None)), AttrValue::Null);
        assert_eq!(
            AttrValue::from_dbase(FieldValue::Integer(7)),
            AttrValue::Number(7.0)
        );
        assert_eq!(
            AttrValue::from_dbase(FieldValue::Date(Some(dbase::Date::new(3, 2, 2021)))),
            AttrValue::Text("2021-02-03".to_string())
        );
    }
}
