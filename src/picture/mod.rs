//! Picture buffers.
//!
//! A [`Picture`] stores red, green and blue as separate planes of 8- or 16-bit unsigned samples,
//! plus an optional alpha plane of normalized floats. A missing alpha plane means fully opaque.
//! Colour is straight (not premultiplied).

mod geometry;
mod io;
mod stack;

pub use geometry::{GeometryOp, GeometryPlan};
pub use stack::{ProcessStack, StackEntry};

use crate::foundation::error::{FramecutError, FramecutResult};

/// Sample depth of the colour planes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BitDepth {
    Eight,
    #[default]
    Sixteen,
}

impl BitDepth {
    /// Largest representable sample value.
    pub fn max_value(self) -> f32 {
        match self {
            Self::Eight => 255.0,
            Self::Sixteen => 65535.0,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }
}

/// One of the three colour planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

pub(crate) trait Sample: Copy + Default + Send + Sync + 'static {
    const MAX: f32;
    fn to_f32(self) -> f32;
    fn from_f32_rounded(v: f32) -> Self;
}

impl Sample for u8 {
    const MAX: f32 = 255.0;
    fn to_f32(self) -> f32 {
        f32::from(self)
    }
    fn from_f32_rounded(v: f32) -> Self {
        v.round().clamp(0.0, <Self as Sample>::MAX) as u8
    }
}

impl Sample for u16 {
    const MAX: f32 = 65535.0;
    fn to_f32(self) -> f32 {
        f32::from(self)
    }
    fn from_f32_rounded(v: f32) -> Self {
        v.round().clamp(0.0, <Self as Sample>::MAX) as u16
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Planes<T> {
    pub(crate) r: Vec<T>,
    pub(crate) g: Vec<T>,
    pub(crate) b: Vec<T>,
}

impl<T: Sample> Planes<T> {
    fn filled(n: usize, rgb: [T; 3]) -> Self {
        Self {
            r: vec![rgb[0]; n],
            g: vec![rgb[1]; n],
            b: vec![rgb[2]; n],
        }
    }

    fn plane(&self, ch: Channel) -> &[T] {
        match ch {
            Channel::Red => &self.r,
            Channel::Green => &self.g,
            Channel::Blue => &self.b,
        }
    }

    fn map<U>(&self, f: impl Fn(T) -> U) -> Planes<U> {
        Planes {
            r: self.r.iter().map(|&v| f(v)).collect(),
            g: self.g.iter().map(|&v| f(v)).collect(),
            b: self.b.iter().map(|&v| f(v)).collect(),
        }
    }

    fn from_normalized(planes: [Vec<f32>; 3]) -> Self {
        let [r, g, b] = planes;
        let conv = |p: Vec<f32>| {
            p.into_iter()
                .map(|v| T::from_f32_rounded(v * T::MAX))
                .collect()
        };
        Self {
            r: conv(r),
            g: conv(g),
            b: conv(b),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Samples {
    Eight(Planes<u8>),
    Sixteen(Planes<u16>),
}

/// A rectangular raster image with a diagnostic processing history.
///
/// `Clone` is a deep copy; operations that change geometry consume the picture and return a new
/// one, so a shared picture is never mutated behind another holder's back.
#[derive(Clone, Debug)]
pub struct Picture {
    width: u32,
    height: u32,
    samples: Samples,
    alpha: Option<Vec<f32>>,
    stack: ProcessStack,
}

fn check_dims(width: u32, height: u32) -> FramecutResult<usize> {
    if width == 0 || height == 0 {
        return Err(FramecutError::validation(format!(
            "picture must be non-empty, got {width}x{height}"
        )));
    }
    Ok((width as usize) * (height as usize))
}

impl Picture {
    /// Fully transparent black picture.
    pub fn transparent(width: u32, height: u32, depth: BitDepth) -> FramecutResult<Self> {
        let n = check_dims(width, height)?;
        let samples = match depth {
            BitDepth::Eight => Samples::Eight(Planes::filled(n, [0; 3])),
            BitDepth::Sixteen => Samples::Sixteen(Planes::filled(n, [0; 3])),
        };
        Ok(Self {
            width,
            height,
            samples,
            alpha: Some(vec![0.0; n]),
            stack: ProcessStack::with_step(format!("transparent {width}x{height}")),
        })
    }

    /// 16-bit picture filled with one colour. `alpha` of `None` means opaque.
    pub fn solid(width: u32, height: u32, rgb: [u16; 3], alpha: Option<f32>) -> FramecutResult<Self> {
        let n = check_dims(width, height)?;
        let alpha = match alpha {
            Some(a) if !(0.0..=1.0).contains(&a) => {
                return Err(FramecutError::validation(format!(
                    "alpha must be within [0, 1], got {a}"
                )));
            }
            Some(a) if a >= 1.0 => None,
            Some(a) => Some(vec![a; n]),
            None => None,
        };
        Ok(Self {
            width,
            height,
            samples: Samples::Sixteen(Planes::filled(n, rgb)),
            alpha,
            stack: ProcessStack::with_step(format!(
                "solid {width}x{height} #{:04x}{:04x}{:04x}",
                rgb[0], rgb[1], rgb[2]
            )),
        })
    }

    /// 8-bit picture from interleaved straight-alpha RGBA bytes.
    pub fn from_rgba8(width: u32, height: u32, data: &[u8]) -> FramecutResult<Self> {
        let n = check_dims(width, height)?;
        if data.len() != n * 4 {
            return Err(FramecutError::validation(format!(
                "rgba8 buffer holds {} bytes, expected {}",
                data.len(),
                n * 4
            )));
        }
        let mut planes = Planes::filled(n, [0u8; 3]);
        let mut alpha = Vec::with_capacity(n);
        for (i, px) in data.chunks_exact(4).enumerate() {
            planes.r[i] = px[0];
            planes.g[i] = px[1];
            planes.b[i] = px[2];
            alpha.push(f32::from(px[3]) / 255.0);
        }
        Ok(Self {
            width,
            height,
            samples: Samples::Eight(planes),
            alpha: opaque_to_none(alpha),
            stack: ProcessStack::new(),
        })
    }

    /// 16-bit picture from interleaved straight-alpha RGBA samples.
    pub fn from_rgba16(width: u32, height: u32, data: &[u16]) -> FramecutResult<Self> {
        let n = check_dims(width, height)?;
        if data.len() != n * 4 {
            return Err(FramecutError::validation(format!(
                "rgba16 buffer holds {} samples, expected {}",
                data.len(),
                n * 4
            )));
        }
        let mut planes = Planes::filled(n, [0u16; 3]);
        let mut alpha = Vec::with_capacity(n);
        for (i, px) in data.chunks_exact(4).enumerate() {
            planes.r[i] = px[0];
            planes.g[i] = px[1];
            planes.b[i] = px[2];
            alpha.push(f32::from(px[3]) / 65535.0);
        }
        Ok(Self {
            width,
            height,
            samples: Samples::Sixteen(planes),
            alpha: opaque_to_none(alpha),
            stack: ProcessStack::new(),
        })
    }

    /// Picture from normalized `[0, 1]` planes, quantized to `depth`.
    pub(crate) fn from_normalized(
        width: u32,
        height: u32,
        depth: BitDepth,
        planes: [Vec<f32>; 3],
        alpha: Option<Vec<f32>>,
        stack: ProcessStack,
    ) -> FramecutResult<Self> {
        let n = check_dims(width, height)?;
        if planes.iter().any(|p| p.len() != n) || alpha.as_ref().is_some_and(|a| a.len() != n) {
            return Err(FramecutError::evaluation(format!(
                "plane length does not match a {width}x{height} picture"
            )));
        }
        let samples = match depth {
            BitDepth::Eight => Samples::Eight(Planes::from_normalized(planes)),
            BitDepth::Sixteen => Samples::Sixteen(Planes::from_normalized(planes)),
        };
        Ok(Self {
            width,
            height,
            samples,
            alpha,
            stack,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels.
    pub fn pixels(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn bit_depth(&self) -> BitDepth {
        match self.samples {
            Samples::Eight(_) => BitDepth::Eight,
            Samples::Sixteen(_) => BitDepth::Sixteen,
        }
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }

    /// Alpha plane, if the picture is not fully opaque by construction.
    pub fn alpha(&self) -> Option<&[f32]> {
        self.alpha.as_deref()
    }

    /// Alpha plane with missing alpha expanded to all ones.
    pub fn alpha_or_opaque(&self) -> Vec<f32> {
        match &self.alpha {
            Some(a) => a.clone(),
            None => vec![1.0; self.pixels()],
        }
    }

    /// Replace the alpha plane. `None` marks the picture fully opaque.
    pub fn set_alpha(&mut self, alpha: Option<Vec<f32>>) -> FramecutResult<()> {
        if let Some(a) = &alpha {
            if a.len() != self.pixels() {
                return Err(FramecutError::validation(format!(
                    "alpha plane holds {} values, expected {}",
                    a.len(),
                    self.pixels()
                )));
            }
        }
        self.alpha = alpha;
        Ok(())
    }

    /// Channel values normalized to `[0, 1]`.
    pub fn channel_normalized(&self, ch: Channel) -> Vec<f32> {
        match &self.samples {
            Samples::Eight(p) => p.plane(ch).iter().map(|&v| f32::from(v) / 255.0).collect(),
            Samples::Sixteen(p) => p
                .plane(ch)
                .iter()
                .map(|&v| f32::from(v) / 65535.0)
                .collect(),
        }
    }

    /// RGB at (`x`, `y`) expressed on the 16-bit scale.
    pub fn rgb16_at(&self, x: u32, y: u32) -> Option<[u16; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize) * (self.width as usize) + (x as usize);
        Some(match &self.samples {
            Samples::Eight(p) => [
                u16::from(p.r[i]) * 257,
                u16::from(p.g[i]) * 257,
                u16::from(p.b[i]) * 257,
            ],
            Samples::Sixteen(p) => [p.r[i], p.g[i], p.b[i]],
        })
    }

    /// Alpha at (`x`, `y`); opaque pictures report 1.
    pub fn alpha_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize) * (self.width as usize) + (x as usize);
        Some(self.alpha.as_ref().map_or(1.0, |a| a[i]))
    }

    pub fn process_stack(&self) -> &ProcessStack {
        &self.stack
    }

    pub(crate) fn stack_mut(&mut self) -> &mut ProcessStack {
        &mut self.stack
    }

    pub(crate) fn take_stack(&mut self) -> ProcessStack {
        std::mem::take(&mut self.stack)
    }

    /// Record `label` on the processing history.
    pub fn with_step(mut self, label: impl Into<String>) -> Self {
        self.stack.push(label);
        self
    }

    /// Independent copy, used when a picture has to be handed to a second consumer.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// `true` if both pictures hold the same pixels, ignoring the processing history.
    pub fn same_pixels(&self, other: &Picture) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.samples == other.samples
            && self.alpha == other.alpha
    }

    /// Convert the colour planes to `depth`. 8 to 16 bits multiplies by 257; the reverse divides.
    pub fn to_bit_depth(self, depth: BitDepth) -> Self {
        let samples = match (self.samples, depth) {
            (Samples::Eight(p), BitDepth::Sixteen) => {
                Samples::Sixteen(p.map(|v| u16::from(v) * 257))
            }
            (Samples::Sixteen(p), BitDepth::Eight) => Samples::Eight(p.map(|v| (v / 257) as u8)),
            (s, _) => s,
        };
        Self { samples, ..self }
    }

    /// Bilinear resize. With `preserve_aspect` the result fits inside `width`x`height`.
    ///
    /// Resizing to the current size returns the picture unchanged.
    pub fn resize(self, width: u32, height: u32, preserve_aspect: bool) -> FramecutResult<Self> {
        self.apply(GeometryOp::Resize {
            width,
            height,
            preserve_aspect,
        })
    }

    /// Keep a sub-rectangle; the rectangle is clipped to the picture bounds.
    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> FramecutResult<Self> {
        self.apply(GeometryOp::Crop {
            x,
            y,
            width,
            height,
        })
    }

    /// Put the picture at (`x`, `y`) on a transparent `canvas_width`x`canvas_height` canvas.
    pub fn place(self, x: i32, y: i32, canvas_width: u32, canvas_height: u32) -> FramecutResult<Self> {
        self.apply(GeometryOp::Place {
            x,
            y,
            canvas_width,
            canvas_height,
        })
    }

    /// Apply a single geometry operation.
    pub fn apply(self, op: GeometryOp) -> FramecutResult<Self> {
        let mut plan = GeometryPlan::new(self.width, self.height);
        plan.push(op)?;
        plan.execute(self)
    }

    /// Interleaved straight-alpha RGBA bytes.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let n = self.pixels();
        let mut out = Vec::with_capacity(n * 4);
        for i in 0..n {
            let [r, g, b] = match &self.samples {
                Samples::Eight(p) => [p.r[i], p.g[i], p.b[i]],
                Samples::Sixteen(p) => [
                    (p.r[i] / 257) as u8,
                    (p.g[i] / 257) as u8,
                    (p.b[i] / 257) as u8,
                ],
            };
            let a = self.alpha.as_ref().map_or(1.0, |a| a[i]);
            out.extend_from_slice(&[r, g, b, u8::from_f32_rounded(a * 255.0)]);
        }
        out
    }

    /// Interleaved straight-alpha RGBA samples on the 16-bit scale.
    pub fn to_rgba16(&self) -> Vec<u16> {
        let n = self.pixels();
        let mut out = Vec::with_capacity(n * 4);
        for i in 0..n {
            let [r, g, b] = match &self.samples {
                Samples::Eight(p) => [
                    u16::from(p.r[i]) * 257,
                    u16::from(p.g[i]) * 257,
                    u16::from(p.b[i]) * 257,
                ],
                Samples::Sixteen(p) => [p.r[i], p.g[i], p.b[i]],
            };
            let a = self.alpha.as_ref().map_or(1.0, |a| a[i]);
            out.extend_from_slice(&[r, g, b, u16::from_f32_rounded(a * 65535.0)]);
        }
        out
    }
}

fn opaque_to_none(alpha: Vec<f32>) -> Option<Vec<f32>> {
    if alpha.iter().all(|&a| a >= 1.0) {
        None
    } else {
        Some(alpha)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/picture/picture.rs"]
mod tests;
