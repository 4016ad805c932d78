//! Planar geometry, projections and nearest-neighbour search.

use crate::models::Coordinate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ==== Projections ====

/// Maps geographic lon/lat (degrees) into the simulator's metric plane.
pub trait Projection: Send + Sync {
    fn project(&self, lon: f64, lat: f64) -> Coordinate;
}

/// Input is already in the projected system: `x` is easting, `y` northing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjection;

impl Projection for IdentityProjection {
    fn project(&self, x: f64, y: f64) -> Coordinate {
        Coordinate::new(y, x)
    }
}

/// Local tangent-plane projection around a reference point.
///
/// Good to a few metres over a city-sized area, which is all the noise grid
/// needs for placing centroids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocalTangentProjection {
    pub origin_lat: f64,
    pub origin_lon: f64,
}

impl Projection for LocalTangentProjection {
    fn project(&self, lon: f64, lat: f64) -> Coordinate {
        Coordinate::new(
            lat_to_meters(lat - self.origin_lat, self.origin_lat),
            lon_to_meters(lon - self.origin_lon, self.origin_lat),
        )
    }
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Convert degrees latitude to meters using local scaling.
pub fn lat_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lat(ref_lat_deg)
}

/// Convert degrees longitude to meters at a given latitude.
pub fn lon_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lon(ref_lat_deg)
}

// ==== Polygons ====

/// Ray-casting point-in-polygon test. `ring` is a list of `(x, y)` vertices;
/// closing the ring (first == last) is optional.
pub fn point_in_polygon(x: f64, y: f64, ring: &[(f64, f64)]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub(crate) fn segments_intersect_2d(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> bool {
    // Tolerance in metres for collinear touches.
    const EPS_M: f64 = 1e-6;

    fn orient(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }

    fn within(a: f64, b: f64, value: f64) -> bool {
        let min = a.min(b) - EPS_M;
        let max = a.max(b) + EPS_M;
        value >= min && value <= max
    }

    fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
        within(p.0, q.0, r.0) && within(p.1, q.1, r.1)
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if o1.abs() <= EPS_M && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS_M && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS_M && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS_M && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS_M && o2 < -EPS_M) || (o1 < -EPS_M && o2 > EPS_M);
    let b_crosses = (o3 > EPS_M && o4 < -EPS_M) || (o3 < -EPS_M && o4 > EPS_M);
    a_crosses && b_crosses
}

/// Axis-aligned rectangle in `(x, y)` = `(easting, northing)` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.min_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (self.min_x, self.max_y),
        ]
    }
}

/// True when the rectangle and the polygon share any area or boundary.
pub fn polygon_intersects_rect(ring: &[(f64, f64)], rect: &Rect) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let corners = rect.corners();
    if corners.iter().any(|(x, y)| point_in_polygon(*x, *y, ring)) {
        return true;
    }
    if ring.iter().any(|(x, y)| rect.contains(*x, *y)) {
        return true;
    }
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        for k in 0..4 {
            if segments_intersect_2d(a, b, corners[k], corners[(k + 1) % 4]) {
                return true;
            }
        }
    }
    false
}

/// Area centroid of a simple polygon ring (shoelace formula). Degenerate
/// rings fall back to the vertex mean.
pub fn polygon_centroid(ring: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut points = ring;
    if points.len() > 1 && points.first() == points.last() {
        points = &points[..points.len() - 1];
    }
    if points.is_empty() {
        return None;
    }

    let n = points.len();
    let mut area2 = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];
        let cross = x0 * y1 - x1 * y0;
        area2 += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }

    if area2.abs() < 1e-12 {
        let sx: f64 = points.iter().map(|p| p.0).sum();
        let sy: f64 = points.iter().map(|p| p.1).sum();
        return Some((sx / n as f64, sy / n as f64));
    }
    Some((cx / (3.0 * area2), cy / (3.0 * area2)))
}

// ==== Nearest neighbour ====

/// Static 2-D k-d tree over projected points, answering nearest-point queries.
///
/// Ties are broken towards the lowest point index so lookups are deterministic.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<Coordinate>,
    /// Point indices laid out as an implicit balanced tree.
    order: Vec<u32>,
}

impl KdTree {
    pub fn new(points: Vec<Coordinate>) -> Self {
        let mut order: Vec<u32> = (0..points.len() as u32).collect();
        build(&points, &mut order, 0);
        Self { points, order }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the point closest to `query`, or `None` for an empty tree.
    pub fn nearest(&self, query: &Coordinate) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }
        let mut best = Best {
            index: u32::MAX,
            dist_sq: f64::INFINITY,
        };
        self.search(&self.order, 0, query, &mut best);
        Some(best.index as usize)
    }

    fn search(&self, slice: &[u32], depth: usize, query: &Coordinate, best: &mut Best) {
        if slice.is_empty() {
            return;
        }
        let mid = slice.len() / 2;
        let index = slice[mid];
        let point = &self.points[index as usize];
        best.offer(index, point.distance_sq(query));

        let delta = axis_value(query, depth) - axis_value(point, depth);
        let (near, far) = if delta <= 0.0 {
            (&slice[..mid], &slice[mid + 1..])
        } else {
            (&slice[mid + 1..], &slice[..mid])
        };
        self.search(near, depth + 1, query, best);
        if delta * delta <= best.dist_sq {
            self.search(far, depth + 1, query, best);
        }
    }
}

struct Best {
    index: u32,
    dist_sq: f64,
}

impl Best {
    fn offer(&mut self, index: u32, dist_sq: f64) {
        let better = match dist_sq.total_cmp(&self.dist_sq) {
            Ordering::Less => true,
            Ordering::Equal => index < self.index,
            Ordering::Greater => false,
        };
        if better {
            self.index = index;
            self.dist_sq = dist_sq;
        }
    }
}

#[inline]
fn axis_value(point: &Coordinate, depth: usize) -> f64 {
    if depth % 2 == 0 {
        point.easting
    } else {
        point.northing
    }
}

fn build(points: &[Coordinate], slice: &mut [u32], depth: usize) {
    if slice.len() <= 1 {
        return;
    }
    let mid = slice.len() / 2;
    slice.select_nth_unstable_by(mid, |a, b| {
        axis_value(&points[*a as usize], depth)
            .total_cmp(&axis_value(&points[*b as usize], depth))
            .then_with(|| a.cmp(b))
    });
    let (left, right) = slice.split_at_mut(mid);
    build(points, left, depth + 1);
    build(points, &mut right[1..], depth + 1);
}

/// Index of the closest coordinate by linear scan (first wins on ties).
pub fn nearest_linear(points: &[Coordinate], query: &Coordinate) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, point) in points.iter().enumerate() {
        let dist_sq = point.distance_sq(query);
        match best {
            Some((_, best_sq)) if dist_sq >= best_sq => {}
            _ => best = Some((idx, dist_sq)),
        }
    }
    best.map(|(idx, _)| idx)
}
