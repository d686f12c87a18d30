//! Layer archives and DEM files on disk: discovery and extraction.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::crs::CrsRegistry;
use crate::error::GeoError;
use crate::vector::VectorLayer;

/// Raster extensions scanned when no preferred DEM name matches.
const DEM_EXTENSIONS: &[&str] = &["tif", "tiff", "img"];

/// Locate `file_name` under `<data_dir>/zips/`, falling back to the data
/// directory itself.
pub fn resolve_archive(data_dir: &Path, file_name: &str) -> Option<PathBuf> {
    let zipped = data_dir.join("zips").join(file_name);
    if zipped.is_file() {
        return Some(zipped);
    }
    let flat = data_dir.join(file_name);
    flat.is_file().then_some(flat)
}

/// Unpack `archive` under `out_dir`, creating it if needed.
pub fn extract_archive(archive: &Path, out_dir: &Path) -> Result<(), GeoError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.display().to_string());
    let unavailable = |reason: String| GeoError::LayerUnavailable {
        layer: name.clone(),
        reason,
    };

    let file = File::open(archive).map_err(|e| unavailable(e.to_string()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| unavailable(e.to_string()))?;
    std::fs::create_dir_all(out_dir).map_err(|e| unavailable(e.to_string()))?;
    zip.extract(out_dir).map_err(|e| unavailable(e.to_string()))?;
    debug!(
        "Extracted {} entries from {name} into {}",
        zip.len(),
        out_dir.display()
    );
    Ok(())
}

/// First `.shp` under `dir` by path order, skipping macOS resource-fork
/// junk that ships inside hand-built ZIPs.
pub fn find_first_shapefile(dir: &Path) -> Option<PathBuf> {
    let mut shapefiles: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, &["shp"]) && !is_archive_junk(path))
        .collect();
    shapefiles.sort();
    shapefiles.into_iter().next()
}

/// The DEM with the preferred file name if present, else the first raster
/// in the directory by name.
pub fn find_dem(dir: &Path, preferred: Option<&str>) -> Option<PathBuf> {
    if let Some(name) = preferred {
        let path = dir.join(name);
        if path.is_file() {
            return Some(path);
        }
        debug!("Preferred DEM {name} not present in {}", dir.display());
    }
    let mut rasters: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, DEM_EXTENSIONS))
        .collect();
    rasters.sort();
    rasters.into_iter().next()
}

/// Extract a layer archive and load the first shapefile inside it.
pub fn load_layer_from_archive(
    name: &str,
    archive: &Path,
    extract_root: &Path,
    registry: &CrsRegistry,
) -> Result<VectorLayer, GeoError> {
    let dest = extract_root.join(name);
    extract_archive(archive, &dest)?;
    let shp = find_first_shapefile(&dest).ok_or_else(|| GeoError::LayerUnavailable {
        layer: name.to_string(),
        reason: format!("no shapefile inside {}", archive.display()),
    })?;
    info!("Layer '{name}': using {}", shp.display());
    VectorLayer::from_shapefile(name, &shp, registry)
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .map(|ext| wanted.iter().any(|w| ext.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

fn is_archive_junk(path: &Path) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name == "__MACOSX" || name.starts_with("._")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::AttrValue;
    use shapefile::dbase::{FieldValue, Record, TableWriterBuilder};
    use shapefile::{Point as ShpPoint, Polygon, PolygonRing, Writer};
    use std::io::Write as _;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const CRTM05_WKT: &str = r#"PROJCS["CRTM05",GEOGCS["CR05",DATUM["Costa_Rica_2005",SPHEROID["GRS 1980",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],AUTHORITY["EPSG","5367"]]"#;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn write_square_shapefile(dir: &Path, with_prj: bool) -> Vec<PathBuf> {
        let shp = dir.join("capa.shp");
        let table =
            TableWriterBuilder::new().add_character_field("NOMBRE".try_into().unwrap(), 30);
        let mut writer = Writer::from_path(&shp, table).unwrap();
        let ring = PolygonRing::Outer(vec![
            ShpPoint::new(0.0, 0.0),
            ShpPoint::new(0.0, 10.0),
            ShpPoint::new(10.0, 10.0),
            ShpPoint::new(10.0, 0.0),
            ShpPoint::new(0.0, 0.0),
        ]);
        let mut record = Record::default();
        record.insert(
            "NOMBRE".to_string(),
            FieldValue::Character(Some("Central".to_string())),
        );
        writer
            .write_shape_and_record(&Polygon::new(ring), &record)
            .unwrap();
        drop(writer);

        let mut files = vec![
            shp.clone(),
            shp.with_extension("shx"),
            shp.with_extension("dbf"),
        ];
        if with_prj {
            let prj = shp.with_extension("prj");
            std::fs::write(&prj, CRTM05_WKT).unwrap();
            files.push(prj);
        }
        files
    }

    fn zip_files(archive: &Path, files: &[PathBuf]) {
        let mut writer = ZipWriter::new(File::create(archive).unwrap());
        let options = SimpleFileOptions::default();
        for file in files {
            let name = file.file_name().unwrap().to_string_lossy().into_owned();
            writer.start_file(name, options).unwrap();
            writer.write_all(&std::fs::read(file).unwrap()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn archives_resolve_from_zips_first() {
        let dir = TempDir::new().unwrap();
        let data = dir.path();
        touch(&data.join("zips/Cuencas.zip"));
        touch(&data.join("Cuencas.zip"));
        touch(&data.join("Hojas.zip"));

        assert_eq!(
            resolve_archive(data, "Cuencas.zip"),
            Some(data.join("zips/Cuencas.zip"))
        );
        assert_eq!(resolve_archive(data, "Hojas.zip"), Some(data.join("Hojas.zip")));
        assert_eq!(resolve_archive(data, "Rios.zip"), None);
    }

    #[test]
    fn the_first_shapefile_by_path_wins() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b.shp"));
        touch(&dir.path().join("a/z.shp"));
        touch(&dir.path().join("a/notes.txt"));
        touch(&dir.path().join("__MACOSX/._a.shp"));

        assert_eq!(
            find_first_shapefile(dir.path()),
            Some(dir.path().join("a/z.shp"))
        );
    }

    #[test]
    fn dem_discovery_prefers_the_configured_name() {
        let dir = TempDir::new().unwrap();
        // Sorts before MED.CR.tif, so the fallback is distinguishable.
        touch(&dir.path().join("AAA.tif"));
        touch(&dir.path().join("MED.CR.tif"));
        touch(&dir.path().join("readme.txt"));

        assert_eq!(
            find_dem(dir.path(), Some("MED.CR.tif")),
            Some(dir.path().join("MED.CR.tif"))
        );
        assert_eq!(
            find_dem(dir.path(), Some("otro.tif")),
            Some(dir.path().join("AAA.tif"))
        );
        assert_eq!(find_dem(dir.path(), None), Some(dir.path().join("AAA.tif")));
        assert_eq!(find_dem(&dir.path().join("no-such"), None), None);
    }

    #[test]
    fn loads_a_layer_from_a_zipped_shapefile() {
        let staging = TempDir::new().unwrap();
        let files = write_square_shapefile(staging.path(), true);
        let archive = staging.path().join("Capa.zip");
        zip_files(&archive, &files);

        let extract = TempDir::new().unwrap();
        let registry = CrsRegistry::with_defaults();
        let layer =
            load_layer_from_archive("capa", &archive, extract.path(), &registry).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.crs().epsg(), 5367);
        let hits = layer.candidates(5.0, 5.0, 0.0);
        assert_eq!(
            hits[0].get("NOMBRE"),
            Some(&AttrValue::Text("Central".to_string()))
        );
    }

    #[test]
    fn a_missing_prj_inside_the_archive_fails_the_layer() {
        let staging = TempDir::new().unwrap();
        let files = write_square_shapefile(staging.path(), false);
        let archive = staging.path().join("Capa.zip");
        zip_files(&archive, &files);

        let extract = TempDir::new().unwrap();
        let registry = CrsRegistry::with_defaults();
        let err = load_layer_from_archive("capa", &archive, extract.path(), &registry)
            .unwrap_err();
        assert!(matches!(err, GeoError::MissingLayerCrs { .. }));
    }

    #[test]
    fn archives_without_shapefiles_are_unavailable() {
        let staging = TempDir::new().unwrap();
        let readme = staging.path().join("leeme.txt");
        std::fs::write(&readme, "sin capas").unwrap();
        let archive = staging.path().join("Vacia.zip");
        zip_files(&archive, &[readme]);

        let extract = TempDir::new().unwrap();
        let registry = CrsRegistry::with_defaults();
        let err = load_layer_from_archive("vacia", &archive, extract.path(), &registry)
            .unwrap_err();
        assert!(matches!(err, GeoError::LayerUnavailable { .. }));
    }
}
