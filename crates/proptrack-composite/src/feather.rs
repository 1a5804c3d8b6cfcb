//! Edge feathering: a linear alpha ramp inside the quad boundary.

use proptrack_core::{Point, Quad};

/// Alpha multiplier for a point inside `quad`: 0 on the boundary, rising
/// linearly to 1 at `radius` pixels in. A radius of 0 is a hard edge.
#[inline]
pub fn edge_weight(quad: &Quad, p: Point, radius: f64) -> f32 {
    if radius <= 0.0 {
        return 1.0;
    }
    let d = quad.distance_to_boundary(p);
    (d / radius).min(1.0) as f32
}

/// Per-pixel feather weights for a pixel span, row-major.
#[derive(Debug, Clone)]
pub struct FeatherMask {
    pub span: (u32, u32, u32, u32),
    pub weights: Vec<f32>,
}

impl FeatherMask {
    pub fn build(quad: &Quad, span: (u32, u32, u32, u32), radius: f64) -> Self {
        let (x0, y0, x1, y1) = span;
        let mut weights = Vec::with_capacity(span_area(span));
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                weights.push(edge_weight(quad, center, radius));
            }
        }
        Self { span, weights }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        let (x0, y0, x1, y1) = self.span;
        if x < x0 || x >= x1 || y < y0 || y >= y1 {
            return 0.0;
        }
        let stride = (x1 - x0) as usize;
        self.weights[(y - y0) as usize * stride + (x - x0) as usize]
    }
}

/// Pixel count of a span, widened before multiplying.
#[inline]
pub fn span_area(span: (u32, u32, u32, u32)) -> usize {
    let (x0, y0, x1, y1) = span;
    x1.saturating_sub(x0) as usize * y1.saturating_sub(y0) as usize
}
