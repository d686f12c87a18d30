//! GeoTIFF digital elevation model: loading and best-effort point sampling.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, info, warn};

use super::GeoTransform;
use crate::crs::{Crs, CrsRegistry};
use crate::error::GeoError;
use crate::models::GeoPoint;

/// GeoKey IDs that carry the raster EPSG code.
const GEO_KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEO_KEY_PROJECTED_CRS: u16 = 3072;
/// GeoKey value meaning "user defined", i.e. no EPSG code.
const GEO_KEY_USER_DEFINED: u16 = 32767;

/// Tolerance when comparing a sample against the declared nodata sentinel.
const NODATA_EPS: f64 = 1e-3;

/// How the raster's own CRS resolved against the registry.
#[derive(Clone, Debug)]
enum RasterCrs {
    /// No CRS information in the file; sampled in the caller's CRS as-is.
    Unknown,
    /// Declared EPSG code outside the supported set.
    Unsupported(u32),
    Resolved(Crs),
}

/// An elevation grid with its geotransform, CRS and nodata sentinel.
pub struct DemRaster {
    width: usize,
    height: usize,
    bands: usize,
    data: Vec<f32>,
    transform: GeoTransform,
    crs: RasterCrs,
    nodata: Option<f64>,
}

impl DemRaster {
    /// Read a GeoTIFF DEM. Fails with [`GeoError::RasterUnavailable`] when the
    /// file is missing, undecodable, or carries no georeferencing tags.
    pub fn open(path: &Path, registry: &CrsRegistry) -> Result<Self, GeoError> {
        let unavailable = |reason: String| GeoError::RasterUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| unavailable(e.to_string()))?
            // Country-scale DEMs overrun the decoder's default buffer cap.
            .with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions().map_err(|e| unavailable(e.to_string()))?;
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 {
            return Err(unavailable("empty raster".to_string()));
        }

        let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
        let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
        let transform = match (scale, tiepoint) {
            (Some(scale), Some(tiepoint)) => GeoTransform::from_scale_and_tiepoint(&scale, &tiepoint),
            _ => None,
        }
        .ok_or_else(|| unavailable("missing or degenerate georeferencing tags".to_string()))?;

        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|raw| raw.trim_matches(char::from(0)).trim().parse::<f64>().ok());

        let crs = match read_epsg_geokey(&mut decoder) {
            Some(code) => match registry.resolve_epsg(code) {
                Ok(crs) => RasterCrs::Resolved(crs),
                Err(_) => {
                    warn!(
                        "Raster {} declares EPSG:{code}, outside the supported set",
                        path.display()
                    );
                    RasterCrs::Unsupported(code)
                }
            },
            None => RasterCrs::Unknown,
        };

        let data = match decoder.read_image().map_err(|e| unavailable(e.to_string()))? {
            DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::F32(v) => v,
            DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        };

        let bands = data.len() / (width * height);
        if bands == 0 || data.len() != bands * width * height {
            return Err(unavailable(format!(
                "decoded {} samples for a {width}x{height} grid",
                data.len()
            )));
        }

        info!(
            "Loaded DEM {} ({width}x{height}, {bands} band(s), nodata {nodata:?})",
            path.display()
        );
        Ok(Self {
            width,
            height,
            bands,
            data,
            transform,
            crs,
            nodata,
        })
    }

    /// Build a raster from an in-memory grid (row 0 at the top, matching a
    /// north-up geotransform). Single band.
    pub fn from_grid(
        data: Vec<f32>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Option<Crs>,
        nodata: Option<f64>,
    ) -> Result<Self, GeoError> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(GeoError::RasterUnavailable {
                path: PathBuf::from("<grid>"),
                reason: format!("{} samples for a {width}x{height} grid", data.len()),
            });
        }
        Ok(Self {
            width,
            height,
            bands: 1,
            data,
            transform,
            crs: crs.map(RasterCrs::Resolved).unwrap_or(RasterCrs::Unknown),
            nodata,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// EPSG code declared by the raster, if any.
    pub fn epsg(&self) -> Option<u32> {
        match &self.crs {
            RasterCrs::Unknown => None,
            RasterCrs::Unsupported(code) => Some(*code),
            RasterCrs::Resolved(crs) => Some(crs.epsg()),
        }
    }

    /// `(min_x, min_y, max_x, max_y)` in raster coordinates.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.extent(self.width, self.height)
    }

    /// Sample the elevation under `point`. Every failure mode degrades to
    /// `None`: out of coverage, nodata/NaN cells, and transforms the raster
    /// CRS makes impossible.
    pub fn sample(&self, point: &GeoPoint) -> Option<f64> {
        let (x, y) = match &self.crs {
            RasterCrs::Resolved(crs) if crs != point.crs() => match point.reproject(crs) {
                Ok(local) => (local.x(), local.y()),
                Err(err) => {
                    debug!("DEM sample skipped: {err}");
                    return None;
                }
            },
            RasterCrs::Unsupported(code) if point.crs().epsg() != *code => {
                debug!("DEM sample skipped: raster is in unsupported EPSG:{code}");
                return None;
            }
            _ => (point.x(), point.y()),
        };

        let (min_x, min_y, max_x, max_y) = self.bounds();
        if x < min_x || x > max_x || y < min_y || y > max_y {
            return None;
        }

        let (col, row) = self.transform.world_to_pixel(x, y);
        // The bounds check keeps both non-negative; the far edges clamp onto
        // the last cell.
        let col = (col.max(0.0).floor() as usize).min(self.width - 1);
        let row = (row.max(0.0).floor() as usize).min(self.height - 1);
        let value = f64::from(self.data[(row * self.width + col) * self.bands]);

        if value.is_nan() {
            return None;
        }
        if let Some(nodata) = self.nodata {
            if (value - nodata).abs() < NODATA_EPS {
                return None;
            }
        }
        Some(value)
    }
}

/// Walk the GeoKey directory for the raster EPSG code. The projected CRS key
/// wins over the geographic one when both are present, since projected
/// rasters also carry their geographic base.
fn read_epsg_geokey<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let directory = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    if directory.len() < 4 {
        return None;
    }
    let num_keys = directory[3] as usize;
    let mut geographic = None;
    for i in 0..num_keys {
        let base = 4 + i * 4;
        if base + 4 > directory.len() {
            break;
        }
        let key_id = directory[base];
        let location = directory[base + 1];
        let value = directory[base + 3];
        // location == 0 means the value is stored inline in the entry.
        if location != 0 || value == 0 || value == GEO_KEY_USER_DEFINED {
            continue;
        }
        if key_id == GEO_KEY_PROJECTED_CRS {
            return Some(u32::from(value));
        }
        if key_id == GEO_KEY_GEOGRAPHIC_TYPE {
            geographic = Some(u32::from(value));
        }
    }
    geographic
}
