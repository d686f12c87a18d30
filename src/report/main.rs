//! Coordinate report generator.
//!
//! Resolves a point against the configured boundary, watershed and map-sheet
//! layers, samples the DEM, and renders the fields into a DOCX template.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ceiba::crs::CrsRegistry;
use ceiba::data::{find_dem, load_layer_from_archive, resolve_archive};
use ceiba::error::GeoError;
use ceiba::pipeline::{ConfiguredLayer, LayerConfig, PipelineBuilder, PipelineConfig};
use ceiba::raster::DemRaster;
use ceiba::render::render_docx;
use ceiba::vector::VectorLayer;

#[derive(Parser, Debug)]
#[command(name = "report")]
#[command(about = "Generate a coordinate report from the configured geodata")]
struct Args {
    /// Easting or longitude of the point
    #[arg(short, long, allow_negative_numbers = true)]
    x: f64,

    /// Northing or latitude of the point
    #[arg(short, long, allow_negative_numbers = true)]
    y: f64,

    /// CRS code of the input coordinates
    #[arg(long, default_value = "5367")]
    crs: String,

    /// DOCX template with {{ FIELD }} placeholders
    #[arg(short, long)]
    template: PathBuf,

    /// Base name for the generated report
    #[arg(long, default_value = "informe")]
    output_name: String,

    /// Explicit output path (overrides --output-name)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Directory holding the layer archives
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory holding the DEM rasters
    #[arg(long)]
    dem_dir: Option<PathBuf>,

    /// Deployment configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the resolved fields as JSON to stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    // "NaN" parses as a valid f64, so clap does not catch it.
    if !args.x.is_finite() || !args.y.is_finite() {
        anyhow::bail!("Coordinates must be finite numbers");
    }

    let config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)?,
        None => PipelineConfig::default(),
    };
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data_dir));
    let dem_dir = args
        .dem_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.dem.dir));

    info!("Ceiba Report Generator");
    info!("Point: ({}, {}) in {}", args.x, args.y, args.crs);

    let registry = CrsRegistry::with_defaults();

    // Extracted archives only need to outlive layer loading.
    let extract_root = tempfile::tempdir().context("Failed to create extraction directory")?;

    let mut builder = PipelineBuilder::new(&registry).working_crs(&config.working_crs);
    for layer_config in &config.layers {
        let layer = load_layer(layer_config, &data_dir, extract_root.path(), &registry)?;
        builder = builder.layer(ConfiguredLayer::new(
            layer_config.name.as_str(),
            layer,
            layer_config.fields.clone(),
            layer_config.buffer,
        ));
    }

    let raster = load_raster(&dem_dir, config.dem.preferred.as_deref(), &registry);
    let pipeline = builder.raster(raster).build()?;

    let resolution = pipeline.resolve(args.x, args.y, &args.crs)?;
    if let (Some(lon), Some(lat)) = (
        resolution.diagnostics.longitude,
        resolution.diagnostics.latitude,
    ) {
        info!("Geographic position: lon {lon:.5}, lat {lat:.5}");
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&resolution.context.to_string_map())?
        );
    }

    let bytes = render_docx(&args.template, &resolution.context)
        .context("Failed to render the report template")?;

    let output = match args.out {
        Some(path) => path,
        None => default_output_path(&args.output_name),
    };
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Report written to {} ({} bytes)", output.display(), bytes.len());

    Ok(())
}

/// Load one configured layer. A layer that is present on disk but has no
/// usable CRS is a deployment mistake and fails the run; a missing archive
/// degrades to an absent layer whose fields read as not available.
fn load_layer(
    config: &LayerConfig,
    data_dir: &Path,
    extract_root: &Path,
    registry: &CrsRegistry,
) -> Result<Option<VectorLayer>> {
    let Some(archive) = resolve_archive(data_dir, &config.archive) else {
        warn!(
            "Layer '{}': archive {} not found under {}",
            config.name,
            config.archive,
            data_dir.display()
        );
        return Ok(None);
    };
    match load_layer_from_archive(&config.name, &archive, extract_root, registry) {
        Ok(layer) => Ok(Some(layer)),
        Err(err @ (GeoError::MissingLayerCrs { .. } | GeoError::UnsupportedCrs(_))) => {
            Err(err).with_context(|| format!("Layer '{}' is misconfigured", config.name))
        }
        Err(err) => {
            warn!("Layer '{}' unavailable: {err}", config.name);
            Ok(None)
        }
    }
}

/// Best-effort DEM: any failure degrades to elevation fields reading N/D.
fn load_raster(
    dem_dir: &Path,
    preferred: Option<&str>,
    registry: &CrsRegistry,
) -> Option<DemRaster> {
    let Some(path) = find_dem(dem_dir, preferred) else {
        warn!("No DEM found under {}", dem_dir.display());
        return None;
    };
    match DemRaster::open(&path, registry) {
        Ok(raster) => Some(raster),
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}

/// `output/<name>_<run>.docx`, tagged with the CI run id when present.
fn default_output_path(name: &str) -> PathBuf {
    let run_id = std::env::var("GITHUB_RUN_ID")
        .unwrap_or_else(|_| Local::now().format("%Y%m%d%H%M%S").to_string());
    PathBuf::from("output").join(format!("{name}_{run_id}.docx"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv.iter().copied()).unwrap()
    }

    #[test]
    fn space_separated_negative_coordinates_parse() {
        let args = parse(&[
            "report", "--x", "-84.0", "--y", "9.9", "--crs", "4326", "--template", "t.docx",
        ]);
        assert_eq!(args.x, -84.0);
        assert_eq!(args.y, 9.9);
        assert_eq!(args.crs, "4326");
    }

    #[test]
    fn short_flags_take_negative_values_too() {
        let args = parse(&["report", "-x", "-84.5", "-y", "-9.9", "-t", "t.docx"]);
        assert_eq!(args.x, -84.5);
        assert_eq!(args.y, -9.9);
        assert_eq!(args.crs, "5367");
    }

    #[test]
    fn a_missing_coordinate_is_rejected() {
        assert!(Args::try_parse_from(["report", "--x", "-84.0", "--template", "t.docx"]).is_err());
    }
}
