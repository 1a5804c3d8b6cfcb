//! RGBA8 frame buffers in CPU memory.
//!
//! Every raster in the pipeline (decoded video frames, the prop image, the
//! warped prop) is a tightly packed, straight-alpha RGBA8 buffer.

use crate::error::{ProptrackError, Result};
use image::{ImageFormat, RgbaImage};
use std::path::Path;

/// A tightly packed RGBA8 raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Row-major RGBA8 pixel data, `width * height * 4` bytes
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a fully transparent frame buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        }
    }

    /// Create a frame buffer filled with one color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap existing RGBA8 bytes.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(ProptrackError::InvalidInput(format!(
                "RGBA buffer for {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decode any supported image file into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| {
            ProptrackError::InvalidInput(format!("cannot decode image {}: {e}", path.display()))
        })?;
        Ok(Self::from_image(img.to_rgba8()))
    }

    pub fn from_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    /// Encode as PNG (lossless, so pass-through frames survive re-saving).
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let img = RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(
            || ProptrackError::Internal("frame buffer size does not match dimensions".into()),
        )?;
        img.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Read one pixel. Panics if out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Write one pixel. Panics if out of bounds.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = self.offset(0, y);
        &self.data[start..start + self.width as usize * 4]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = self.offset(0, y);
        let end = start + self.width as usize * 4;
        &mut self.data[start..end]
    }

    /// Bilinear sample at continuous pixel coordinates (`(i + 0.5, j + 0.5)`
    /// is the center of pixel `(i, j)`).
    ///
    /// Returns `None` outside `[0, width] x [0, height]`; inside, taps past
    /// the last pixel center clamp to the edge. Channels are in `[0, 255]`.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<[f32; 4]> {
        if self.width == 0
            || self.height == 0
            || !(0.0..=self.width as f64).contains(&x)
            || !(0.0..=self.height as f64).contains(&y)
        {
            return None;
        }
        let sx = x - 0.5;
        let sy = y - 0.5;
        let x0f = sx.floor();
        let y0f = sy.floor();
        let fx = (sx - x0f) as f32;
        let fy = (sy - y0f) as f32;
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let x0 = (x0f as i64).clamp(0, max_x) as u32;
        let x1 = (x0f as i64 + 1).clamp(0, max_x) as u32;
        let y0 = (y0f as i64).clamp(0, max_y) as u32;
        let y1 = (y0f as i64 + 1).clamp(0, max_y) as u32;

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x1, y0);
        let p01 = self.pixel(x0, y1);
        let p11 = self.pixel(x1, y1);
        let mut out = [0.0f32; 4];
        for c in 0..4 {
            let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
            let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
            out[c] = top * (1.0 - fy) + bottom * fy;
        }
        Some(out)
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];
        let mut frame = Self::new(width, height);
        for y in 0..height {
            let row = frame.row_mut(y);
            for x in 0..width {
                let bar = (x as u64 * 8 / width as u64) as usize;
                let i = x as usize * 4;
                row[i..i + 4].copy_from_slice(&BARS[bar]);
            }
        }
        frame
    }
}
