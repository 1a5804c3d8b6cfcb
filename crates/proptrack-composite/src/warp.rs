//! Perspective warping of the prop image into a destination quad.
//!
//! Two strategies produce a canvas-sized, straight-alpha raster that is
//! transparent outside the quad footprint:
//!
//! - [`WarpMethod::Perspective`] maps every destination pixel center back
//!   through `H^-1`, divides by `w` and samples the prop bilinearly.
//! - [`WarpMethod::Triangulated`] splits the quad along the 0-2 diagonal and
//!   maps each triangle with an exact affine transform. Cheaper, but shows a
//!   seam along the diagonal under strong perspective.

use glam::{DAffine2, DMat3, DVec3};
use proptrack_core::geometry::{collinear, point_in_triangle};
use proptrack_core::{FrameBuffer, Point, ProptrackError, Quad, Rect, Result};
use proptrack_tracking::solve;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Resampling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarpMethod {
    #[default]
    Perspective,
    Triangulated,
}

impl WarpMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Perspective => "perspective",
            Self::Triangulated => "triangulated",
        }
    }
}

impl fmt::Display for WarpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WarpMethod {
    type Err = ProptrackError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "perspective" => Ok(Self::Perspective),
            "triangulated" | "affine" => Ok(Self::Triangulated),
            other => Err(ProptrackError::InvalidInput(format!("unknown warp method '{other}'"))),
        }
    }
}

/// The prop resampled into canvas space.
#[derive(Debug, Clone)]
pub struct WarpedProp {
    /// Canvas-sized RGBA raster, transparent outside the footprint.
    pub raster: FrameBuffer,
    /// Destination quad the prop was mapped onto.
    pub quad: Quad,
    /// Pixel span `(x0, y0, x1, y1)` that may hold non-transparent pixels.
    pub bounds: Option<(u32, u32, u32, u32)>,
}

impl WarpedProp {
    fn blank(width: u32, height: u32, quad: Quad) -> Self {
        Self {
            raster: FrameBuffer::new(width, height),
            quad,
            bounds: None,
        }
    }

    /// True when nothing landed on the canvas.
    pub fn is_empty(&self) -> bool {
        match self.bounds {
            None => true,
            Some((x0, y0, x1, y1)) => (y0..y1).all(|y| {
                let row = self.raster.row(y);
                (x0..x1).all(|x| row[x as usize * 4 + 3] == 0)
            }),
        }
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.raster.dimensions()
    }
}

/// Warp `source` onto `dest` within a `canvas` of `(width, height)`.
pub fn warp(
    source: &FrameBuffer,
    dest: &Quad,
    canvas: (u32, u32),
    method: WarpMethod,
) -> Result<WarpedProp> {
    match method {
        WarpMethod::Perspective => warp_perspective(source, dest, canvas),
        WarpMethod::Triangulated => Ok(warp_triangulated(source, dest, canvas)),
    }
}

/// True per-pixel inverse-homography warp.
///
/// Fails with `DegenerateConfiguration` when `dest` admits no homography.
pub fn warp_perspective(source: &FrameBuffer, dest: &Quad, canvas: (u32, u32)) -> Result<WarpedProp> {
    let (width, height) = canvas;
    let mut out = WarpedProp::blank(width, height, *dest);
    if source.width == 0 || source.height == 0 {
        return Ok(out);
    }
    let src_quad = Quad::from_size(source.width as f64, source.height as f64);
    let inverse = solve(&src_quad, dest)?
        .inverse()
        .ok_or_else(|| ProptrackError::DegenerateConfiguration("homography is not invertible".into()))?;

    let Some(span) = dest.bounding_box().pixel_span(width, height) else {
        return Ok(out);
    };
    // Pixels on the far side of the horizon have w of the opposite sign.
    let centroid = dest.corners.iter().copied().sum::<Point>() / 4.0;
    let (_, w_ref) = inverse.apply_homogeneous(centroid);

    let (x0, y0, x1, y1) = span;
    for y in y0..y1 {
        let row = out.raster.row_mut(y);
        for x in x0..x1 {
            let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let (sp, w) = inverse.apply_homogeneous(center);
            if w * w_ref <= 0.0 || !sp.is_finite() {
                continue;
            }
            if let Some(rgba) = source.sample_bilinear(sp.x, sp.y) {
                write_pixel(row, x, rgba);
            }
        }
    }
    out.bounds = Some(span);
    Ok(out)
}

/// Two-triangle affine approximation.
///
/// A degenerate triangle contributes nothing; it never fails.
pub fn warp_triangulated(source: &FrameBuffer, dest: &Quad, canvas: (u32, u32)) -> WarpedProp {
    let (width, height) = canvas;
    let mut out = WarpedProp::blank(width, height, *dest);
    if source.width == 0 || source.height == 0 {
        return out;
    }
    let src_tris = Quad::from_size(source.width as f64, source.height as f64).triangles();
    let dst_tris = dest.triangles();
    let mut covered = vec![false; width as usize * height as usize];
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (src_tri, dst_tri) in src_tris.iter().zip(dst_tris.iter()) {
        let Some(to_source) = affine_from_triangles(dst_tri, src_tri) else {
            debug!(triangle = ?dst_tri, "skipping zero-area triangle");
            continue;
        };
        let Some(span) =
            Rect::bounding(dst_tri.iter().copied()).and_then(|r| r.pixel_span(width, height))
        else {
            continue;
        };
        let (x0, y0, x1, y1) = span;
        for y in y0..y1 {
            let row = out.raster.row_mut(y);
            for x in x0..x1 {
                let idx = y as usize * width as usize + x as usize;
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                // First triangle wins on the shared diagonal.
                if covered[idx] || !point_in_triangle(center, dst_tri) {
                    continue;
                }
                let sp = to_source.transform_point2(center);
                if let Some(rgba) = source.sample_bilinear(sp.x, sp.y) {
                    write_pixel(row, x, rgba);
                    covered[idx] = true;
                }
            }
        }
        bounds = Some(match bounds {
            None => span,
            Some((a, b, c, d)) => (a.min(x0), b.min(y0), c.max(x1), d.max(y1)),
        });
    }
    out.bounds = bounds;
    out
}

/// Exact affine map taking triangle `from` onto triangle `to`, or `None`
/// if either triangle has zero area.
pub fn affine_from_triangles(from: &[Point; 3], to: &[Point; 3]) -> Option<DAffine2> {
    if collinear(from[0], from[1], from[2]) || collinear(to[0], to[1], to[2]) {
        return None;
    }
    let homogeneous = |t: &[Point; 3]| {
        DMat3::from_cols(
            DVec3::new(t[0].x, t[0].y, 1.0),
            DVec3::new(t[1].x, t[1].y, 1.0),
            DVec3::new(t[2].x, t[2].y, 1.0),
        )
    };
    let m_from = homogeneous(from);
    if m_from.determinant().abs() < f64::EPSILON {
        return None;
    }
    let m = homogeneous(to) * m_from.inverse();
    Some(DAffine2::from_mat3(m))
}

#[inline]
fn write_pixel(row: &mut [u8], x: u32, rgba: [f32; 4]) {
    let i = x as usize * 4;
    for (dst, v) in row[i..i + 4].iter_mut().zip(rgba) {
        *dst = v.round().clamp(0.0, 255.0) as u8;
    }
}
