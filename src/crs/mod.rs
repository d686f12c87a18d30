//! Coordinate reference systems: a closed registry and point transforms.
//!
//! The supported set is explicit and offline. Every definition is an inline
//! proj string compiled once when the registry is built, so unknown codes are
//! rejected before any file I/O and no external authority database is
//! consulted at runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use proj4rs::Proj;
use tracing::debug;

use crate::error::GeoError;

/// EPSG code of geographic WGS84.
pub const EPSG_WGS84: u32 = 4326;
/// EPSG code of CRTM05, the projected metric grid used as the working CRS.
pub const EPSG_CRTM05: u32 = 5367;

const WGS84_DEF: &str = "+proj=longlat +datum=WGS84 +no_defs";
const CRTM05_DEF: &str = "+proj=tmerc +lat_0=0 +lon_0=-84 +k=0.9999 +x_0=500000 \
     +y_0=0 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs";

struct CrsDef {
    epsg: u32,
    proj: Proj,
    geographic: bool,
}

/// Immutable handle to a supported CRS. Cheap to clone and compare.
#[derive(Clone)]
pub struct Crs {
    def: Arc<CrsDef>,
}

impl Crs {
    /// Canonical code, e.g. `EPSG:5367`.
    pub fn code(&self) -> String {
        format!("EPSG:{}", self.def.epsg)
    }

    pub fn epsg(&self) -> u32 {
        self.def.epsg
    }

    /// Geographic CRSs carry lon/lat degrees; projected ones carry meters.
    pub fn is_geographic(&self) -> bool {
        self.def.geographic
    }

    fn proj(&self) -> &Proj {
        &self.def.proj
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.def.epsg == other.def.epsg
    }
}

impl Eq for Crs {}

impl fmt::Debug for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crs({})", self.code())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Registry of the supported CRSs, built once at startup and passed by
/// reference into everything that resolves or transforms coordinates.
pub struct CrsRegistry {
    by_epsg: BTreeMap<u32, Crs>,
}

impl CrsRegistry {
    /// Empty registry; callers register their own definitions at startup.
    pub fn new() -> Self {
        Self {
            by_epsg: BTreeMap::new(),
        }
    }

    /// Registry with the built-in set: EPSG:4326 and EPSG:5367.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(EPSG_WGS84, WGS84_DEF)
            .expect("built-in WGS84 definition");
        registry
            .register(EPSG_CRTM05, CRTM05_DEF)
            .expect("built-in CRTM05 definition");
        registry
    }

    /// Add a CRS to the supported set. Startup-time only; the registry is
    /// immutable once the pipeline holds a reference to it.
    pub fn register(&mut self, epsg: u32, definition: &str) -> Result<(), GeoError> {
        let proj = Proj::from_proj_string(definition)
            .map_err(|err| GeoError::UnsupportedCrs(format!("EPSG:{epsg} ({err})")))?;
        let geographic = definition.contains("+proj=longlat");
        debug!(
            "Registered EPSG:{epsg} ({})",
            if geographic { "geographic" } else { "projected" }
        );
        self.by_epsg.insert(
            epsg,
            Crs {
                def: Arc::new(CrsDef {
                    epsg,
                    proj,
                    geographic,
                }),
            },
        );
        Ok(())
    }

    /// Canonical form of a user-supplied code: trimmed, upper-cased, bare
    /// numeric codes get the EPSG authority prefix. Anything else passes
    /// through unchanged.
    pub fn normalize(code: &str) -> String {
        let trimmed = code.trim().to_uppercase();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            format!("EPSG:{trimmed}")
        } else {
            trimmed
        }
    }

    /// Resolve a user-supplied code against the supported set.
    pub fn resolve(&self, code: &str) -> Result<Crs, GeoError> {
        let canonical = Self::normalize(code);
        let epsg = canonical
            .strip_prefix("EPSG:")
            .and_then(|digits| digits.parse::<u32>().ok())
            .ok_or_else(|| GeoError::UnsupportedCrs(canonical.clone()))?;
        self.resolve_epsg(epsg)
    }

    /// Resolve a numeric EPSG code against the supported set.
    pub fn resolve_epsg(&self, epsg: u32) -> Result<Crs, GeoError> {
        self.by_epsg
            .get(&epsg)
            .cloned()
            .ok_or_else(|| GeoError::UnsupportedCrs(format!("EPSG:{epsg}")))
    }

    /// Codes in the supported set, ascending.
    pub fn supported(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_epsg.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_epsg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_epsg.is_empty()
    }
}

impl Default for CrsRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Transform a coordinate pair between two CRSs. Geographic ends are in
/// degrees on the outside, radians inside the projection library.
pub fn transform_xy(from: &Crs, to: &Crs, x: f64, y: f64) -> Result<(f64, f64), GeoError> {
    if from == to {
        return Ok((x, y));
    }
    let mut point = if from.is_geographic() {
        (x.to_radians(), y.to_radians(), 0.0)
    } else {
        (x, y, 0.0)
    };
    proj4rs::transform::transform(from.proj(), to.proj(), &mut point).map_err(|err| {
        GeoError::Transform {
            from: from.code(),
            to: to.code(),
            reason: err.to_string(),
        }
    })?;
    if to.is_geographic() {
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    } else {
        Ok((point.0, point.1))
    }
}
