//! Grayscale images and multi-scale pyramids for the local point tracker.

use proptrack_core::FrameBuffer;

/// Single-channel image with intensities in `[0, 1]`.
///
/// Integer coordinates address pixel `(x, y)` directly; [`GrayImage::sample`]
/// interpolates between them.
#[derive(Debug, Clone)]
pub struct GrayImage {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl GrayImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0.0; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Build from a function of pixel coordinates.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut img = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.data[y as usize * width as usize + x as usize] = f(x, y);
            }
        }
        img
    }

    /// Rec. 601 luma of an RGBA frame.
    pub fn from_frame(frame: &FrameBuffer) -> Self {
        let mut gray = Self::new(frame.width, frame.height);
        for (out, px) in gray.data.iter_mut().zip(frame.data.chunks_exact(4)) {
            *out = (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) / 255.0;
        }
        gray
    }

    /// Clamp-to-edge pixel read.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[y * self.width as usize + x]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, val: f32) {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = val;
        }
    }

    /// Bilinear read at fractional coordinates.
    #[inline]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as i32, y0 as i32);
        let top = self.get(xi, yi) * (1.0 - fx) + self.get(xi + 1, yi) * fx;
        let bottom = self.get(xi, yi + 1) * (1.0 - fx) + self.get(xi + 1, yi + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Central-difference gradient at fractional coordinates.
    #[inline]
    pub fn gradient(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (self.sample(x + 1.0, y) - self.sample(x - 1.0, y)) * 0.5,
            (self.sample(x, y + 1.0) - self.sample(x, y - 1.0)) * 0.5,
        )
    }

    /// Box-filtered half-resolution copy.
    pub fn downsample(&self) -> Self {
        let nw = self.width.div_ceil(2).max(1);
        let nh = self.height.div_ceil(2).max(1);
        Self::from_fn(nw, nh, |x, y| {
            let sx = (x * 2) as i32;
            let sy = (y * 2) as i32;
            (self.get(sx, sy) + self.get(sx + 1, sy) + self.get(sx, sy + 1) + self.get(sx + 1, sy + 1))
                * 0.25
        })
    }

    pub fn in_bounds(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width as f32 - 1.0) && y <= (self.height as f32 - 1.0)
    }
}

/// Coarse-to-fine image pyramid; level 0 is full resolution.
#[derive(Debug, Clone)]
pub struct ImagePyramid {
    pub levels: Vec<GrayImage>,
}

impl ImagePyramid {
    /// Build up to `num_levels` levels, stopping early once a level would be
    /// smaller than `min_size` on either side.
    pub fn build(base: GrayImage, num_levels: u32, min_size: u32) -> Self {
        let mut levels = vec![base];
        while (levels.len() as u32) < num_levels.max(1) {
            let Some(prev) = levels.last() else { break };
            if prev.width / 2 < min_size || prev.height / 2 < min_size {
                break;
            }
            let next = prev.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn base(&self) -> &GrayImage {
        &self.levels[0]
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}
