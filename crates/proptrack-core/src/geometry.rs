//! Geometric primitives in video pixel space.
//!
//! Coordinates are `f64` pixels with the origin at the top-left corner of
//! the frame; pixel `(i, j)` covers `[i, i+1) x [j, j+1)` and its center is
//! `(i + 0.5, j + 0.5)`.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// 2D point.
pub type Point = DVec2;

/// Relative tolerance for collinearity: `|cross| <= eps * |ab| * |ac|`.
const COLLINEAR_EPS: f64 = 1e-9;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from two corners.
    pub fn from_corners(min: Point, max: Point) -> Self {
        Self {
            x: min.x,
            y: min.y,
            width: max.x - min.x,
            height: max.y - min.y,
        }
    }

    /// Smallest rectangle containing every point, or `None` for an empty set.
    pub fn bounding(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self::from_corners(min, max))
    }

    /// Minimum corner (top-left).
    #[inline]
    pub fn min(self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Maximum corner (bottom-right).
    #[inline]
    pub fn max(self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    #[inline]
    pub fn area(self) -> f64 {
        self.width * self.height
    }

    /// Check if a point is inside the rectangle.
    #[inline]
    pub fn contains(self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    /// Compute intersection with another rectangle.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x1 < x2 && y1 < y2 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Compute union with another rectangle (bounding box).
    pub fn union(self, other: Self) -> Self {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.width).max(other.x + other.width);
        let y2 = (self.y + self.height).max(other.y + other.height);
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Expand the rectangle by a margin on all sides.
    pub fn expand(self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + margin * 2.0,
            self.height + margin * 2.0,
        )
    }

    /// Integer pixel span `(x0, y0, x1, y1)` (exclusive end) clipped to a
    /// `width x height` canvas, or `None` if nothing overlaps.
    pub fn pixel_span(self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clipped = self.intersection(Self::new(0.0, 0.0, width as f64, height as f64))?;
        let x0 = clipped.x.floor().max(0.0) as u32;
        let y0 = clipped.y.floor().max(0.0) as u32;
        let x1 = (clipped.x + clipped.width).ceil().min(width as f64) as u32;
        let y1 = (clipped.y + clipped.height).ceil().min(height as f64) as u32;
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }
}

/// Four corners of a planar region, ordered top-left, top-right,
/// bottom-right, bottom-left for an upright surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point; 4],
}

impl Quad {
    pub fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// Build from a slice, which must hold exactly four points.
    pub fn try_from_slice(points: &[Point]) -> crate::Result<Self> {
        let corners: [Point; 4] = points.try_into().map_err(|_| {
            crate::ProptrackError::InvalidInput(format!(
                "expected exactly 4 corner points, got {}",
                points.len()
            ))
        })?;
        Ok(Self { corners })
    }

    /// Quad covering a `width x height` image from its outer edges.
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new([
            Point::new(0.0, 0.0),
            Point::new(width, 0.0),
            Point::new(width, height),
            Point::new(0.0, height),
        ])
    }

    pub fn bounding_box(&self) -> Rect {
        let mut min = self.corners[0];
        let mut max = self.corners[0];
        for p in &self.corners[1..] {
            min = min.min(*p);
            max = max.max(*p);
        }
        Rect::from_corners(min, max)
    }

    /// The two triangles sharing the 0-2 diagonal: (0, 1, 2) and (0, 2, 3).
    pub fn triangles(&self) -> [[Point; 3]; 2] {
        let c = self.corners;
        [[c[0], c[1], c[2]], [c[0], c[2], c[3]]]
    }

    /// Signed area (shoelace); positive for clockwise order in image space.
    pub fn signed_area(&self) -> f64 {
        let c = &self.corners;
        (0..4)
            .map(|i| {
                let a = c[i];
                let b = c[(i + 1) % 4];
                a.x * b.y - b.x * a.y
            })
            .sum::<f64>()
            * 0.5
    }

    /// True when any two corners coincide or any three are collinear.
    pub fn is_degenerate(&self) -> bool {
        const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
        TRIPLES.iter().any(|t| {
            collinear(self.corners[t[0]], self.corners[t[1]], self.corners[t[2]])
        })
    }

    /// Point-in-quad test (non-zero winding over the closed polygon).
    pub fn contains(&self, p: Point) -> bool {
        let tris = self.triangles();
        point_in_triangle(p, &tris[0]) || point_in_triangle(p, &tris[1])
    }

    /// Euclidean distance from `p` to the nearest edge of the quad.
    pub fn distance_to_boundary(&self, p: Point) -> f64 {
        (0..4)
            .map(|i| distance_to_segment(p, self.corners[i], self.corners[(i + 1) % 4]))
            .fold(f64::INFINITY, f64::min)
    }

    /// Translate every corner.
    pub fn offset(&self, delta: Point) -> Self {
        Self::new(self.corners.map(|c| c + delta))
    }
}

/// True if `a`, `b`, `c` are (numerically) collinear, including coincident points.
pub fn collinear(a: Point, b: Point, c: Point) -> bool {
    let ab = b - a;
    let ac = c - a;
    let cross = ab.perp_dot(ac).abs();
    cross <= COLLINEAR_EPS * ab.length() * ac.length()
}

/// Inclusive point-in-triangle test that tolerates either winding.
pub fn point_in_triangle(p: Point, tri: &[Point; 3]) -> bool {
    let d1 = (tri[1] - tri[0]).perp_dot(p - tri[0]);
    let d2 = (tri[2] - tri[1]).perp_dot(p - tri[1]);
    let d3 = (tri[0] - tri[2]).perp_dot(p - tri[2]);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Distance from `p` to the segment `a`-`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}
