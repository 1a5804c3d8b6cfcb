//! Four-point homography solver (Direct Linear Transform).
//!
//! Each correspondence `(x, y) -> (u, v)` contributes two rows of the
//! homogeneous system `A h = 0` with nine unknowns. The 8x9 system is
//! reduced with full pivoting, which leaves exactly one free column for a
//! non-degenerate configuration; the null vector is read off from it. Points
//! are Hartley-normalized first so the pivot threshold is scale independent.

use glam::{DMat3, DVec3};
use proptrack_core::{Point, ProptrackError, Quad, Result};
use serde::{Deserialize, Serialize};

/// Pivot threshold on the normalized system; below this the rank is < 8.
const PIVOT_EPS: f64 = 1e-10;

/// A row-major 3x3 projective transform.
///
/// Normalized so `h33 == 1` unless [`Homography::is_near_degenerate`] is
/// set, in which case `h33` was within machine epsilon of zero and the
/// matrix is returned as solved (scaled to unit max-norm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    matrix: [f64; 9],
    near_degenerate: bool,
}

impl Homography {
    pub const IDENTITY: Self = Self {
        matrix: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        near_degenerate: false,
    };

    /// Wrap a row-major matrix, normalizing by `h33` when possible.
    pub fn from_row_major(matrix: [f64; 9]) -> Self {
        normalize(matrix)
    }

    /// Row-major entries.
    pub fn matrix(&self) -> &[f64; 9] {
        &self.matrix
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.matrix[row * 3 + col]
    }

    pub fn is_near_degenerate(&self) -> bool {
        self.near_degenerate
    }

    /// Column-major glam matrix.
    pub fn to_mat3(&self) -> DMat3 {
        DMat3::from_cols_array(&self.matrix).transpose()
    }

    fn from_mat3(m: DMat3) -> Self {
        normalize(m.transpose().to_cols_array())
    }

    /// Map a point; `None` when it lands on the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point) -> Option<Point> {
        let m = &self.matrix;
        let w = m[6] * p.x + m[7] * p.y + m[8];
        if w.abs() < f64::EPSILON {
            return None;
        }
        Some(Point::new(
            (m[0] * p.x + m[1] * p.y + m[2]) / w,
            (m[3] * p.x + m[4] * p.y + m[5]) / w,
        ))
    }

    /// Map a point and also return the homogeneous `w` (its sign tells
    /// whether the point is in front of the projection).
    #[inline]
    pub fn apply_homogeneous(&self, p: Point) -> (Point, f64) {
        let m = &self.matrix;
        let w = m[6] * p.x + m[7] * p.y + m[8];
        let x = m[0] * p.x + m[1] * p.y + m[2];
        let y = m[3] * p.x + m[4] * p.y + m[5];
        (Point::new(x / w, y / w), w)
    }

    /// Map all four corners of a quad.
    pub fn apply_quad(&self, quad: &Quad) -> Option<Quad> {
        let mut corners = [Point::ZERO; 4];
        for (out, c) in corners.iter_mut().zip(quad.corners.iter()) {
            *out = self.apply(*c)?;
        }
        Some(Quad::new(corners))
    }

    /// Inverse transform, or `None` for a singular matrix.
    pub fn inverse(&self) -> Option<Self> {
        let m = self.to_mat3();
        let det = m.determinant();
        let scale = self.matrix.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if !det.is_finite() || det.abs() <= f64::EPSILON * scale.powi(3) {
            return None;
        }
        Some(Self::from_mat3(m.inverse()))
    }

    /// `self` applied after `other`.
    pub fn then(&self, other: &Self) -> Self {
        Self::from_mat3(self.to_mat3() * other.to_mat3())
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Compute `H` with `dst_i ~ H * src_i` for all four correspondences.
///
/// Fails with `DegenerateConfiguration` if either quad has a duplicate
/// corner or three collinear corners, or if the system is rank deficient.
pub fn solve(src: &Quad, dst: &Quad) -> Result<Homography> {
    if src.is_degenerate() {
        return Err(ProptrackError::DegenerateConfiguration(format!(
            "source points are collinear or duplicated: {:?}",
            src.corners
        )));
    }
    if dst.is_degenerate() {
        return Err(ProptrackError::DegenerateConfiguration(format!(
            "destination points are collinear or duplicated: {:?}",
            dst.corners
        )));
    }

    let (t_src, src_n) = hartley_normalize(&src.corners);
    let (t_dst, dst_n) = hartley_normalize(&dst.corners);

    let mut a = [[0.0f64; 9]; 8];
    for i in 0..4 {
        let (x, y) = (src_n[i].x, src_n[i].y);
        let (u, v) = (dst_n[i].x, dst_n[i].y);
        a[i * 2] = [-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u];
        a[i * 2 + 1] = [0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v];
    }

    let h = null_vector(&mut a).ok_or_else(|| {
        ProptrackError::DegenerateConfiguration("point correspondences are rank deficient".into())
    })?;

    // Undo the conditioning: H = T_dst^-1 * Hn * T_src.
    let hn = DMat3::from_cols_array(&h).transpose();
    let full = t_dst.inverse() * hn * t_src;
    Ok(Homography::from_mat3(full))
}

/// Row-reduce the 8x9 system with full pivoting and return its null vector.
fn null_vector(a: &mut [[f64; 9]; 8]) -> Option<[f64; 9]> {
    let mut pivot_cols = [0usize; 8];
    let mut used = [false; 9];

    for row in 0..8 {
        let mut best = (row, 0usize, 0.0f64);
        for (r, candidate) in a.iter().enumerate().skip(row) {
            for (c, value) in candidate.iter().enumerate() {
                if !used[c] && value.abs() > best.2 {
                    best = (r, c, value.abs());
                }
            }
        }
        let (best_row, col, magnitude) = best;
        if magnitude < PIVOT_EPS {
            return None;
        }
        a.swap(row, best_row);
        used[col] = true;
        pivot_cols[row] = col;

        let pivot = a[row][col];
        for v in a[row].iter_mut() {
            *v /= pivot;
        }
        let pivot_row = a[row];
        for (r, other) in a.iter_mut().enumerate() {
            if r == row {
                continue;
            }
            let factor = other[col];
            if factor != 0.0 {
                for (v, p) in other.iter_mut().zip(pivot_row.iter()) {
                    *v -= factor * p;
                }
            }
        }
    }

    let free = (0..9).find(|&c| !used[c])?;
    let mut h = [0.0f64; 9];
    h[free] = 1.0;
    for (row, &col) in pivot_cols.iter().enumerate() {
        h[col] = -a[row][free];
    }
    Some(h)
}

/// Translate the centroid to the origin and scale mean distance to sqrt(2).
fn hartley_normalize(points: &[Point; 4]) -> (DMat3, [Point; 4]) {
    let centroid = points.iter().copied().sum::<Point>() / 4.0;
    let mean_dist = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / 4.0;
    let s = if mean_dist > 0.0 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = DMat3::from_cols(
        DVec3::new(s, 0.0, 0.0),
        DVec3::new(0.0, s, 0.0),
        DVec3::new(-s * centroid.x, -s * centroid.y, 1.0),
    );
    (t, points.map(|p| (p - centroid) * s))
}

/// Scale so `h33 == 1`, or flag near-degenerate and scale to unit max-norm.
fn normalize(mut m: [f64; 9]) -> Homography {
    let max = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if m[8].abs() > f64::EPSILON * max.max(1.0) {
        let inv = 1.0 / m[8];
        for v in &mut m {
            *v *= inv;
        }
        Homography {
            matrix: m,
            near_degenerate: false,
        }
    } else {
        if max > 0.0 {
            for v in &mut m {
                *v /= max;
            }
        }
        Homography {
            matrix: m,
            near_degenerate: true,
        }
    }
}
