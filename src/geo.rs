//! Geographic helpers for locating sources and sites.
use serde::{Deserialize, Serialize};

/// Mean radius of the Earth in km
const EARTH_RADIUS: f64 = 6371.0;

/// Approximate length of one degree of latitude in km
const KM_PER_DEGREE: f64 = 111.2;

/// A point on the Earth's surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Latitude in decimal degrees
    pub lat: f64,
}

impl Point {
    /// Create a new [`Point`]
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Whether the coordinates are valid longitude/latitude values
    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.lon) && (-90.0..=90.0).contains(&self.lat)
    }

    /// Great-circle distance to `other` in km, using the haversine formula
    pub fn distance_to(&self, other: &Point) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS * a.sqrt().asin()
    }
}

/// Whether `point` lies inside the polygon (ray casting, edges treated as inside)
pub fn polygon_contains(polygon: &[Point], point: &Point) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for (i, vi) in polygon.iter().enumerate() {
        let vj = &polygon[j];
        if (vi.lat > point.lat) != (vj.lat > point.lat) {
            let lon_cross = (vj.lon - vi.lon) * (point.lat - vi.lat) / (vj.lat - vi.lat) + vi.lon;
            if point.lon <= lon_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

/// Discretise a polygon into a regular grid of points with the given spacing in km.
///
/// Grid nodes are placed on the polygon's bounding box and only those inside the polygon are
/// kept. If the polygon is too small to contain any node, its centroid is returned instead.
pub fn discretize_polygon(polygon: &[Point], spacing: f64) -> Vec<Point> {
    let (min_lon, max_lon) = bounds(polygon.iter().map(|p| p.lon));
    let (min_lat, max_lat) = bounds(polygon.iter().map(|p| p.lat));
    let mid_lat = (min_lat + max_lat) / 2.0;
    let dlat = spacing / KM_PER_DEGREE;
    let dlon = spacing / (KM_PER_DEGREE * mid_lat.to_radians().cos().max(1e-6));

    let num_lats = ((max_lat - min_lat) / dlat).floor() as usize + 1;
    let num_lons = ((max_lon - min_lon) / dlon).floor() as usize + 1;
    let mut points = Vec::new();
    for i in 0..num_lats {
        for j in 0..num_lons {
            let point = Point::new(min_lon + j as f64 * dlon, min_lat + i as f64 * dlat);
            if polygon_contains(polygon, &point) {
                points.push(point);
            }
        }
    }

    if points.is_empty() {
        points.push(centroid(polygon));
    }

    points
}

/// The arithmetic mean of the polygon's vertices
fn centroid(polygon: &[Point]) -> Point {
    let n = polygon.len() as f64;
    Point::new(
        polygon.iter().map(|p| p.lon).sum::<f64>() / n,
        polygon.iter().map(|p| p.lat).sum::<f64>() / n,
    )
}

/// Minimum and maximum of some values
fn bounds<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}
