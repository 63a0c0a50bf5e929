//! Planar polygon geometry in lng/lat degrees

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lng: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Axis-aligned bounding box, edges inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    fn empty() -> Self {
        Self {
            min_lng: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        }
    }

    fn extend(&mut self, p: Point) {
        self.min_lng = self.min_lng.min(p.lng);
        self.min_lat = self.min_lat.min(p.lat);
        self.max_lng = self.max_lng.max(p.lng);
        self.max_lat = self.max_lat.max(p.lat);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lng: self.min_lng.min(other.min_lng),
            min_lat: self.min_lat.min(other.min_lat),
            max_lng: self.max_lng.max(other.max_lng),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.lng >= self.min_lng && p.lng <= self.max_lng && p.lat >= self.min_lat && p.lat <= self.max_lat
    }
}

/// Closed ring; the first vertex is not repeated at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring(Vec<Point>);

impl Ring {
    fn from_positions(positions: &[Vec<f64>]) -> Option<Self> {
        let mut points: Vec<Point> = positions
            .iter()
            .map(|p| match p.as_slice() {
                [lng, lat, ..] if lng.is_finite() && lat.is_finite() => Some(Point::new(*lng, *lat)),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        (points.len() >= 3).then_some(Ring(points))
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.0.len();
        (0..n).map(move |i| (self.0[i], self.0[(i + 1) % n]))
    }

    /// Even-odd crossing test. Points exactly on an edge may go either way.
    fn contains(&self, p: Point) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let cross = a.lng + (p.lat - a.lat) / (b.lat - a.lat) * (b.lng - a.lng);
                if p.lng < cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Shoelace area (positive for counter-clockwise) and the area-weighted
    /// centroid numerators.
    fn moments(&self) -> (f64, f64, f64) {
        let (mut a2, mut cx, mut cy) = (0.0, 0.0, 0.0);
        for (p, q) in self.edges() {
            let cross = p.lng * q.lat - q.lng * p.lat;
            a2 += cross;
            cx += (p.lng + q.lng) * cross;
            cy += (p.lat + q.lat) * cross;
        }
        (a2 / 2.0, cx / 6.0, cy / 6.0)
    }
}

/// Polygon with optional holes
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
}

impl Polygon {
    fn contains(&self, p: Point) -> bool {
        self.exterior.contains(p) && !self.holes.iter().any(|h| h.contains(p))
    }

    /// (area, Σ area·x, Σ area·y) with holes subtracted
    fn moments(&self) -> (f64, f64, f64) {
        let orient = |ring: &Ring, sign: f64| {
            let (a, mx, my) = ring.moments();
            // normalise orientation so exteriors add and holes subtract
            let s = sign * a.signum();
            (a.abs() * sign, mx * s, my * s)
        };
        let mut total = orient(&self.exterior, 1.0);
        for hole in &self.holes {
            let (a, mx, my) = orient(hole, -1.0);
            total.0 += a;
            total.1 += mx;
            total.2 += my;
        }
        total
    }
}

/// GeoJSON geometry object (only polygonal types are accepted)
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub(crate) enum GeoJsonGeometry {
    Polygon(Vec<Vec<Vec<f64>>>),
    MultiPolygon(Vec<Vec<Vec<Vec<f64>>>>),
}

/// One or more polygons treated as a single shape
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    polygons: Vec<Polygon>,
    bbox: BoundingBox,
}

impl Shape {
    pub(crate) fn from_geojson(geometry: &GeoJsonGeometry) -> Result<Self, String> {
        let polygons = match geometry {
            GeoJsonGeometry::Polygon(rings) => vec![polygon(rings)?],
            GeoJsonGeometry::MultiPolygon(polys) => {
                polys.iter().map(|rings| polygon(rings)).collect::<Result<_, _>>()?
            }
        };
        if polygons.is_empty() {
            return Err("geometry has no polygons".to_string());
        }

        let mut bbox = BoundingBox::empty();
        for poly in &polygons {
            for p in &poly.exterior.0 {
                bbox.extend(*p);
            }
        }
        Ok(Self { polygons, bbox })
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bbox.contains(p) && self.polygons.iter().any(|poly| poly.contains(p))
    }

    /// Area-weighted centroid. Degenerate (zero-area) shapes fall back to
    /// the mean of their exterior vertices.
    pub fn centroid(&self) -> Point {
        let (mut area, mut mx, mut my) = (0.0, 0.0, 0.0);
        for poly in &self.polygons {
            let (a, x, y) = poly.moments();
            area += a;
            mx += x;
            my += y;
        }
        if area.abs() > f64::EPSILON * 1e-6 {
            return Point::new(mx / area, my / area);
        }

        let vertices: Vec<Point> = self.polygons.iter().flat_map(|p| p.exterior.0.iter().copied()).collect();
        let n = vertices.len() as f64;
        Point::new(
            vertices.iter().map(|p| p.lng).sum::<f64>() / n,
            vertices.iter().map(|p| p.lat).sum::<f64>() / n,
        )
    }
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon, String> {
    let mut rings = rings.iter().map(|r| {
        Ring::from_positions(r).ok_or_else(|| "ring needs at least three finite positions".to_string())
    });
    let exterior = rings.next().ok_or_else(|| "polygon has no rings".to_string())??;
    let holes = rings.collect::<Result<_, _>>()?;
    Ok(Polygon { exterior, holes })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Vec<f64>> {
        vec![
            vec![x0, y0],
            vec![x0 + size, y0],
            vec![x0 + size, y0 + size],
            vec![x0, y0 + size],
            vec![x0, y0],
        ]
    }

    #[test]
    fn test_square_contains_and_centroid() {
        let shape = Shape::from_geojson(&GeoJsonGeometry::Polygon(vec![square(0.0, 0.0, 2.0)])).unwrap();
        assert!(shape.contains(Point::new(1.0, 1.0)));
        assert!(!shape.contains(Point::new(3.0, 1.0)));
        let c = shape.centroid();
        assert!((c.lng - 1.0).abs() < 1e-12 && (c.lat - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hole_excluded() {
        let shape = Shape::from_geojson(&GeoJsonGeometry::Polygon(vec![
            square(0.0, 0.0, 4.0),
            square(1.0, 1.0, 2.0),
        ]))
        .unwrap();
        assert!(!shape.contains(Point::new(2.0, 2.0)));
        assert!(shape.contains(Point::new(0.5, 0.5)));
        // symmetric hole keeps the centroid in the middle
        let c = shape.centroid();
        assert!((c.lng - 2.0).abs() < 1e-9 && (c.lat - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_multipolygon_centroid_is_area_weighted() {
        let shape = Shape::from_geojson(&GeoJsonGeometry::MultiPolygon(vec![
            vec![square(0.0, 0.0, 1.0)],
            vec![square(10.0, 0.0, 1.0)],
        ]))
        .unwrap();
        let c = shape.centroid();
        assert!((c.lng - 5.5).abs() < 1e-9);
        assert_eq!(shape.bbox().max_lng, 11.0);
    }

    #[test]
    fn test_degenerate_ring_rejected() {
        let err = Shape::from_geojson(&GeoJsonGeometry::Polygon(vec![vec![vec![0.0, 0.0], vec![1.0, 1.0]]]));
        assert!(err.is_err());
    }
}
