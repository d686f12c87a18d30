//! Deployment configuration: working CRS, data locations, layers and fields.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::vector::FieldSpec;

/// One layer slot: where its archive lives and which fields it feeds.
#[derive(Clone, Debug, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Archive file name, resolved against the data directory.
    pub archive: String,
    /// Match distance for line features, in layer CRS units.
    #[serde(default)]
    pub buffer: Option<f64>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DemConfig {
    #[serde(default = "default_dem_dir")]
    pub dir: String,
    /// Raster file name tried before extension-based discovery. Kept when a
    /// partial `[dem]` section only overrides the directory.
    #[serde(default = "default_dem_preferred")]
    pub preferred: Option<String>,
}

impl Default for DemConfig {
    fn default() -> Self {
        Self {
            dir: default_dem_dir(),
            preferred: default_dem_preferred(),
        }
    }
}

/// Everything a deployment needs besides the template: CRS, data layout and
/// the ordered layer list. Layer order matters, earlier layers win field
/// name collisions.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_working_crs")]
    pub working_crs: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub dem: DemConfig,
    #[serde(rename = "layer", default)]
    pub layers: Vec<LayerConfig>,
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: PipelineConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

impl Default for PipelineConfig {
    /// The historical Costa Rica deployment: administrative boundaries,
    /// watersheds (buffered for river lines), and map sheets.
    fn default() -> Self {
        Self {
            working_crs: default_working_crs(),
            data_dir: default_data_dir(),
            dem: DemConfig::default(),
            layers: vec![
                LayerConfig {
                    name: "limites".to_string(),
                    archive: "Limites_geo.zip".to_string(),
                    buffer: None,
                    fields: vec![
                        FieldSpec::with_aliases("PROVINCIA", &["PROVINCIA"]),
                        FieldSpec::with_aliases("CANTON", &["CANTON"]),
                        FieldSpec::with_aliases("DISTRITO", &["DISTRITO"]),
                    ],
                },
                LayerConfig {
                    name: "cuencas".to_string(),
                    archive: "Cuencas.zip".to_string(),
                    buffer: Some(100.0),
                    fields: vec![
                        FieldSpec::with_aliases("CUENCA", &["NOMBRE"]),
                        FieldSpec::with_aliases("CUENCA_NO", &["CUENCA_NO", "CUENCA_N"]),
                    ],
                },
                LayerConfig {
                    name: "hojas".to_string(),
                    archive: "Hojas.zip".to_string(),
                    buffer: None,
                    fields: vec![
                        FieldSpec::with_aliases("HOJA_NOMBRE", &["NOMBRE"]),
                        FieldSpec::with_aliases("HOJA_NUM", &["NUMERO", "NUM"]),
                    ],
                },
            ],
        }
    }
}

fn default_working_crs() -> String {
    "EPSG:5367".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_dem_dir() -> String {
    "data/dem".to_string()
}

fn default_dem_preferred() -> Option<String> {
    Some("MED.CR.tif".to_string())
}
