//! Frame compositing: the warped prop blended over a decoded video frame.

use crate::blend::BlendMode;
use crate::feather::FeatherMask;
use crate::warp::WarpedProp;
use proptrack_core::{FrameBuffer, ProptrackError, Result};
use serde::{Deserialize, Serialize};

/// Blend parameters for one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    /// Global opacity in `[0, 1]`.
    pub opacity: f32,
    pub blend_mode: BlendMode,
    /// Width of the alpha ramp inside the quad edge, in pixels.
    pub feather_radius: f32,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            feather_radius: 0.0,
        }
    }
}

impl CompositeParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ProptrackError::InvalidInput(format!(
                "opacity must be within [0, 1], got {}",
                self.opacity
            )));
        }
        if !(self.feather_radius >= 0.0 && self.feather_radius.is_finite()) {
            return Err(ProptrackError::InvalidInput(format!(
                "feather radius must be >= 0, got {}",
                self.feather_radius
            )));
        }
        Ok(())
    }
}

/// Return a copy of `frame` with `warped` blended on top.
pub fn composite_frame(
    frame: &FrameBuffer,
    warped: &WarpedProp,
    params: &CompositeParams,
) -> Result<FrameBuffer> {
    let mut out = frame.clone();
    composite_into(&mut out, warped, params)?;
    Ok(out)
}

/// Blend `warped` onto `frame` in place.
///
/// Per channel: `out = Cb * (1 - a) + B(Cb, Cs) * a` with
/// `a = prop_alpha * opacity * feather`. Output alpha is source-over.
pub fn composite_into(
    frame: &mut FrameBuffer,
    warped: &WarpedProp,
    params: &CompositeParams,
) -> Result<()> {
    params.validate()?;
    if frame.dimensions() != warped.canvas_size() {
        let (w, h) = warped.canvas_size();
        return Err(ProptrackError::InvalidInput(format!(
            "warped prop is {w}x{h} but frame is {}x{}",
            frame.width, frame.height
        )));
    }
    let Some(span) = warped.bounds else {
        return Ok(());
    };
    if params.opacity == 0.0 {
        return Ok(());
    }
    let feather = (params.feather_radius > 0.0)
        .then(|| FeatherMask::build(&warped.quad, span, params.feather_radius as f64));

    let (x0, y0, x1, y1) = span;
    for y in y0..y1 {
        let src_row = warped.raster.row(y);
        let dst_row = frame.row_mut(y);
        for x in x0..x1 {
            let i = x as usize * 4;
            let src_alpha = src_row[i + 3];
            if src_alpha == 0 {
                continue;
            }
            let weight = feather.as_ref().map_or(1.0, |m| m.get(x, y));
            let a = src_alpha as f32 / 255.0 * params.opacity * weight;
            if a <= 0.0 {
                continue;
            }
            for c in 0..3 {
                let cb = dst_row[i + c] as f32 / 255.0;
                let cs = src_row[i + c] as f32 / 255.0;
                let blended = params.blend_mode.blend(cb, cs);
                let v = cb * (1.0 - a) + blended * a;
                dst_row[i + c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
            }
            let ab = dst_row[i + 3] as f32 / 255.0;
            let ao = a + ab * (1.0 - a);
            dst_row[i + 3] = (ao * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(())
}
