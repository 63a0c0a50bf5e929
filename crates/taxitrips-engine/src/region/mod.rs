//! Point-to-region resolution
//!
//! A [`RegionIndex`] is loaded once per run from a GeoJSON feature
//! collection. Each feature is a polygonal region with an integer ID; the
//! whole collection shares one version tag. Regions are assumed disjoint:
//! when they are not, the first match in collection order wins.
//!
//! Lookups round coordinates to a fixed number of decimals (4 by default,
//! about 11 m) and memoize the outcome, hits and misses alike, in a
//! [`LookupCache`] owned by the caller. Trip data repeats the same stands and
//! intersections constantly, so most lookups never reach the polygons.

mod geometry;

pub use geometry::{BoundingBox, Point, Shape};

use crate::error::RegionError;
use geometry::GeoJsonGeometry;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of decimals kept when rounding lookup coordinates
pub const DEFAULT_PRECISION: u32 = 4;

/// Largest precision whose scaled coordinates (up to 180 * 10^p) fit an
/// `i64` key without saturating
pub const MAX_PRECISION: u32 = 15;

/// Default feature property holding the region ID
pub const DEFAULT_ID_PROPERTY: &str = "OBJECTID";

/// One polygonal region of a versioned collection
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: i64,
    pub shape: Shape,
    pub centroid: Point,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Region {
    pub fn bbox(&self) -> BoundingBox {
        self.shape.bbox()
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    version: Option<serde_json::Value>,
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
}

/// Uniform grid over the collection's extent. Each cell lists, in collection
/// order, the regions whose bounding box overlaps it.
#[derive(Debug)]
struct Grid {
    extent: BoundingBox,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<usize>>,
}

impl Grid {
    fn build(boxes: &[BoundingBox]) -> Self {
        let extent = boxes
            .iter()
            .copied()
            .reduce(|a, b| a.union(&b))
            .unwrap_or(BoundingBox {
                min_lng: 0.0,
                min_lat: 0.0,
                max_lng: 0.0,
                max_lat: 0.0,
            });
        let side = ((boxes.len() as f64).sqrt().ceil() as usize).max(1);
        let mut grid = Self {
            extent,
            cols: side,
            rows: side,
            cells: vec![Vec::new(); side * side],
        };
        for (i, b) in boxes.iter().enumerate() {
            let (c0, r0) = grid.cell_of(b.min_lng, b.min_lat);
            let (c1, r1) = grid.cell_of(b.max_lng, b.max_lat);
            for r in r0..=r1 {
                for c in c0..=c1 {
                    grid.cells[r * grid.cols + c].push(i);
                }
            }
        }
        grid
    }

    fn cell_of(&self, lng: f64, lat: f64) -> (usize, usize) {
        let frac = |v: f64, lo: f64, hi: f64, n: usize| {
            if hi <= lo {
                return 0;
            }
            let i = ((v - lo) / (hi - lo) * n as f64).floor();
            (i.max(0.0) as usize).min(n - 1)
        };
        (
            frac(lng, self.extent.min_lng, self.extent.max_lng, self.cols),
            frac(lat, self.extent.min_lat, self.extent.max_lat, self.rows),
        )
    }

    /// Candidate region indices for `p`, in collection order.
    fn candidates(&self, p: Point) -> &[usize] {
        if !self.extent.contains(p) {
            return &[];
        }
        let (c, r) = self.cell_of(p.lng, p.lat);
        &self.cells[r * self.cols + c]
    }
}

/// Versioned region collection plus its bounding-box index
#[derive(Debug)]
pub struct RegionIndex {
    version: String,
    regions: Vec<Arc<Region>>,
    grid: Grid,
    precision: u32,
}

impl RegionIndex {
    /// Parse a GeoJSON feature collection whose features carry an integer
    /// `OBJECTID` property and whose top level carries a `version`.
    pub fn load(reader: impl Read) -> Result<Self, RegionError> {
        Self::load_with(reader, DEFAULT_ID_PROPERTY)
    }

    pub fn load_path(path: impl AsRef<Path>, id_property: &str) -> Result<Self, RegionError> {
        let file = std::fs::File::open(path.as_ref())?;
        let index = Self::load_with(std::io::BufReader::new(file), id_property)?;
        info!(
            path = %path.as_ref().display(),
            regions = index.len(),
            version = %index.version,
            "Loaded region collection"
        );
        Ok(index)
    }

    pub fn load_with(reader: impl Read, id_property: &str) -> Result<Self, RegionError> {
        let collection: FeatureCollection = serde_json::from_reader(reader)?;
        let version = match collection.version {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(RegionError::MissingVersion),
        };

        let mut regions = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.into_iter().enumerate() {
            let invalid = |reason: String| RegionError::InvalidFeature { index, reason };
            let id = feature
                .properties
                .get(id_property)
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| invalid(format!("missing integer property {id_property}")))?;
            let geometry = feature
                .geometry
                .ok_or_else(|| invalid("feature has no geometry".to_string()))?;
            let shape = Shape::from_geojson(&geometry).map_err(invalid)?;
            regions.push(Arc::new(Region {
                id,
                centroid: shape.centroid(),
                shape,
                properties: feature.properties,
            }));
        }

        let boxes: Vec<BoundingBox> = regions.iter().map(|r| r.bbox()).collect();
        Ok(Self {
            version,
            grid: Grid::build(&boxes),
            regions,
            precision: DEFAULT_PRECISION,
        })
    }

    /// Change the rounding precision (decimal places), at most
    /// [`MAX_PRECISION`].
    pub fn with_precision(mut self, precision: u32) -> Result<Self, RegionError> {
        if precision > MAX_PRECISION {
            return Err(RegionError::InvalidPrecision {
                precision,
                max: MAX_PRECISION,
            });
        }
        self.precision = precision;
        Ok(self)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Arc<Region>] {
        &self.regions
    }

    /// Region containing (`lat`, `lng`), or `None` when the point is not
    /// finite or falls outside every region.
    pub fn resolve(&self, lat: f64, lng: f64, cache: &mut LookupCache) -> Option<Arc<Region>> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        let key = LookupKey {
            lat: round_key(lat, self.precision),
            lng: round_key(lng, self.precision),
            version: self.version.clone(),
        };
        if let Some(hit) = cache.entries.get(&key) {
            cache.stats.hits += 1;
            return hit.clone();
        }
        cache.stats.misses += 1;

        let scale = 10f64.powi(self.precision as i32);
        let point = Point::new(key.lng as f64 / scale, key.lat as f64 / scale);
        let found = self
            .grid
            .candidates(point)
            .iter()
            .map(|&i| &self.regions[i])
            .filter(|r| r.bbox().contains(point))
            .find(|r| {
                cache.stats.containment_tests += 1;
                r.shape.contains(point)
            })
            .cloned();

        if found.is_none() {
            debug!(lat, lng, "No region contains point");
        }
        cache.entries.insert(key, found.clone());
        found
    }
}

/// Round half away from zero at `precision` decimals, as an integer key.
fn round_key(value: f64, precision: u32) -> i64 {
    (value * 10f64.powi(precision as i32)).round() as i64
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    lat: i64,
    lng: i64,
    version: String,
}

/// Counters describing how a [`LookupCache`] has been used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    pub hits: u64,
    pub misses: u64,
    /// Exact polygon containment tests performed on misses
    pub containment_tests: u64,
}

/// Memoized lookup outcomes keyed by rounded coordinates and collection
/// version. Unbounded; create one per run.
#[derive(Debug, Default)]
pub struct LookupCache {
    entries: HashMap<LookupKey, Option<Arc<Region>>>,
    stats: LookupStats,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> LookupStats {
        self.stats
    }
}

/// A [`RegionIndex`] bundled with a shared cache, for use inside computed
/// fields. Clones share the same cache.
#[derive(Debug, Clone)]
pub struct Resolver {
    index: Arc<RegionIndex>,
    cache: Rc<RefCell<LookupCache>>,
}

impl Resolver {
    pub fn new(index: Arc<RegionIndex>) -> Self {
        Self {
            index,
            cache: Rc::new(RefCell::new(LookupCache::new())),
        }
    }

    pub fn index(&self) -> &RegionIndex {
        &self.index
    }

    pub fn resolve(&self, lat: f64, lng: f64) -> Option<Arc<Region>> {
        self.index.resolve(lat, lng, &mut self.cache.borrow_mut())
    }

    pub fn stats(&self) -> LookupStats {
        self.cache.borrow().stats()
    }
}
