//! The resolution pipeline: canonical fields, layer joins, elevation.

mod config;

pub use config::{DemConfig, LayerConfig, PipelineConfig};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::crs::{Crs, CrsRegistry, EPSG_WGS84};
use crate::error::GeoError;
use crate::models::{FieldValue, GeoPoint, ReportContext};
use crate::raster::DemRaster;
use crate::vector::{resolve_fields, FieldSpec, VectorLayer};

/// A layer slot in the pipeline. `None` for the layer means it could not be
/// loaded; its declared fields then resolve as not available.
pub struct ConfiguredLayer {
    name: String,
    layer: Option<VectorLayer>,
    fields: Vec<FieldSpec>,
    buffer: Option<f64>,
}

impl ConfiguredLayer {
    pub fn new(
        name: impl Into<String>,
        layer: Option<VectorLayer>,
        fields: Vec<FieldSpec>,
        buffer: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            layer,
            fields,
            buffer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.layer.is_some()
    }
}

pub struct PipelineBuilder<'a> {
    registry: &'a CrsRegistry,
    working_crs: String,
    layers: Vec<ConfiguredLayer>,
    raster: Option<DemRaster>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(registry: &'a CrsRegistry) -> Self {
        Self {
            registry,
            working_crs: "EPSG:5367".to_string(),
            layers: Vec::new(),
            raster: None,
        }
    }

    pub fn working_crs(mut self, code: &str) -> Self {
        self.working_crs = code.to_string();
        self
    }

    pub fn layer(mut self, layer: ConfiguredLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn raster(mut self, raster: Option<DemRaster>) -> Self {
        self.raster = raster;
        self
    }

    /// Resolving the working CRS here keeps a bad deployment from getting
    /// anywhere near a request.
    pub fn build(self) -> Result<Pipeline<'a>, GeoError> {
        let working = self.registry.resolve(&self.working_crs)?;
        Ok(Pipeline {
            registry: self.registry,
            working,
            layers: self.layers,
            raster: self.raster,
        })
    }
}

/// Where the resolved point sits, for logs and JSON output.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostics {
    pub source_x: f64,
    pub source_y: f64,
    pub source_crs: String,
    pub working_x: f64,
    pub working_y: f64,
    pub working_crs: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

#[derive(Debug)]
pub struct Resolution {
    pub context: ReportContext,
    pub diagnostics: Diagnostics,
}

/// One deployment's resolution machinery: working CRS, ordered layers, DEM.
pub struct Pipeline<'a> {
    registry: &'a CrsRegistry,
    working: Crs,
    layers: Vec<ConfiguredLayer>,
    raster: Option<DemRaster>,
}

impl<'a> Pipeline<'a> {
    pub fn working_crs(&self) -> &Crs {
        &self.working
    }

    /// Resolve a coordinate into the flat report context. Only an unknown
    /// input CRS is fatal; every data gap degrades to `N/D` fields.
    pub fn resolve(&self, x: f64, y: f64, crs_code: &str) -> Result<Resolution, GeoError> {
        let source = GeoPoint::build(x, y, crs_code, self.registry)?;
        let working = source.reproject(&self.working)?;

        let mut context = ReportContext::new();
        context.set("X", FieldValue::text(format_rounded(x, 2)));
        context.set("Y", FieldValue::text(format_rounded(y, 2)));
        context.set("CRS", FieldValue::text(source.crs().code()));
        context.set(
            "FECHA_GEN",
            FieldValue::text(Local::now().format("%Y-%m-%d %H:%M").to_string()),
        );
        context.set(
            format!("E_{}", self.working.epsg()),
            FieldValue::text(format_rounded(working.x(), 2)),
        );
        context.set(
            format!("N_{}", self.working.epsg()),
            FieldValue::text(format_rounded(working.y(), 2)),
        );

        for configured in &self.layers {
            match &configured.layer {
                Some(layer) => {
                    match resolve_fields(layer, &working, &configured.fields, configured.buffer) {
                        Ok(fields) => {
                            for (name, value) in fields {
                                context.merge_field(name, value);
                            }
                        }
                        Err(err) => {
                            warn!("Layer '{}' attribution failed: {err}", configured.name);
                            for spec in &configured.fields {
                                context.merge_field(spec.name.clone(), FieldValue::NotAvailable);
                            }
                        }
                    }
                }
                None => {
                    debug!("Layer '{}' absent, fields not available", configured.name);
                    for spec in &configured.fields {
                        context.merge_field(spec.name.clone(), FieldValue::NotAvailable);
                    }
                }
            }
        }

        let elevation = self.raster.as_ref().and_then(|dem| dem.sample(&working));
        let elevation_field = match elevation {
            Some(value) => FieldValue::text(format_rounded(value, 1)),
            None => FieldValue::NotAvailable,
        };
        context.set("ALTITUD_M", elevation_field.clone());
        context.set("ELEV_M", elevation_field);

        let (longitude, latitude) = match self.registry.resolve_epsg(EPSG_WGS84) {
            Ok(wgs84) => match working.reproject(&wgs84) {
                Ok(geographic) => (Some(geographic.x()), Some(geographic.y())),
                Err(err) => {
                    debug!("Geographic diagnostics unavailable: {err}");
                    (None, None)
                }
            },
            Err(_) => (None, None),
        };

        let diagnostics = Diagnostics {
            source_x: x,
            source_y: y,
            source_crs: source.crs().code(),
            working_x: working.x(),
            working_y: working.y(),
            working_crs: self.working.code(),
            longitude,
            latitude,
        };
        info!(
            "Resolved ({x}, {y}) {} into {} field(s)",
            diagnostics.source_crs,
            context.len()
        );
        Ok(Resolution {
            context,
            diagnostics,
        })
    }
}

/// Round to `decimals` places; values with no fractional part left collapse
/// to a bare integer, matching the historical report formatting.
pub fn format_rounded(value: f64, decimals: u32) -> String {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}
