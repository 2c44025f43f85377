//! Separable geometry plans.
//!
//! Crop, resize and place are all per-axis affine maps from output pixel to source pixel plus a
//! validity window. Chaining them composes the maps, so any sequence of geometry operations can
//! be executed with a single bilinear pass over the source picture.

use smallvec::SmallVec;

use crate::foundation::error::{FramecutError, FramecutResult};
use crate::picture::{Picture, Planes, Sample, Samples};

/// One geometric transformation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeometryOp {
    /// Keep the `width`x`height` window starting at (`x`, `y`), clipped to the picture.
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Bilinear resize. With `preserve_aspect` the picture is fitted inside the box.
    Resize {
        width: u32,
        height: u32,
        preserve_aspect: bool,
    },
    /// Put the picture at (`x`, `y`) on a transparent canvas; out-of-canvas parts are dropped.
    Place {
        x: i32,
        y: i32,
        canvas_width: u32,
        canvas_height: u32,
    },
}

impl GeometryOp {
    pub(crate) fn label(&self) -> String {
        match *self {
            Self::Crop {
                x,
                y,
                width,
                height,
            } => format!("crop {width}x{height}+{x}+{y}"),
            Self::Resize {
                width,
                height,
                preserve_aspect,
            } => {
                if preserve_aspect {
                    format!("resize fit {width}x{height}")
                } else {
                    format!("resize {width}x{height}")
                }
            }
            Self::Place {
                x,
                y,
                canvas_width,
                canvas_height,
            } => format!("place ({x},{y}) on {canvas_width}x{canvas_height}"),
        }
    }
}

/// Output pixel `i` samples the source at `scale * i + offset`, valid only in `[lo, hi)`.
/// Sample positions are clamped to `[clamp_lo, clamp_hi]` in source coordinates, the part of
/// the source that survived every crop so far.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Axis {
    len: u32,
    scale: f64,
    offset: f64,
    lo: i64,
    hi: i64,
    clamp_lo: f64,
    clamp_hi: f64,
}

impl Axis {
    fn identity(len: u32) -> Self {
        Self {
            len,
            scale: 1.0,
            offset: 0.0,
            lo: 0,
            hi: i64::from(len),
            clamp_lo: 0.0,
            clamp_hi: f64::from(len.saturating_sub(1)),
        }
    }

    fn crop(&mut self, start: u32, size: u32) {
        let start = start.min(self.len);
        let size = size.min(self.len - start);
        let first = (self.scale * f64::from(start) + self.offset).round();
        let last = (self.scale * f64::from(start + size.saturating_sub(1)) + self.offset).round();
        self.clamp_lo = self.clamp_lo.max(first).min(self.clamp_hi);
        self.clamp_hi = self.clamp_hi.min(last).max(self.clamp_lo);
        self.offset += self.scale * f64::from(start);
        self.lo = (self.lo - i64::from(start)).max(0);
        self.hi = (self.hi - i64::from(start)).min(i64::from(size));
        self.len = size;
    }

    fn resize(&mut self, new_len: u32) {
        let r = f64::from(self.len) / f64::from(new_len);
        self.offset += self.scale * (0.5 * r - 0.5);
        self.scale *= r;
        self.lo = ((self.lo as f64) / r).floor() as i64;
        self.hi = (((self.hi as f64) / r).ceil() as i64).min(i64::from(new_len));
        self.lo = self.lo.max(0);
        self.len = new_len;
    }

    fn place(&mut self, shift: i32, canvas: u32) {
        self.offset -= self.scale * f64::from(shift);
        self.lo = (self.lo + i64::from(shift)).max(0);
        self.hi = (self.hi + i64::from(shift)).min(i64::from(canvas));
        self.len = canvas;
    }

    fn is_identity_of(&self, src_len: u32) -> bool {
        self.len == src_len
            && self.scale == 1.0
            && self.offset == 0.0
            && self.lo == 0
            && self.hi == i64::from(src_len)
            && self.clamp_lo == 0.0
            && self.clamp_hi == f64::from(src_len.saturating_sub(1))
    }

    fn covers_all(&self) -> bool {
        self.lo <= 0 && self.hi >= i64::from(self.len)
    }

    fn contains(&self, i: u32) -> bool {
        let i = i64::from(i);
        i >= self.lo && i < self.hi
    }

    /// Precomputed bilinear taps `(i0, i1, w)` for every output position, never reaching
    /// outside the clamp window.
    fn taps(&self, src_len: u32) -> Vec<(usize, usize, f32)> {
        let last = f64::from(src_len.saturating_sub(1));
        let lo = self.clamp_lo.clamp(0.0, last);
        let hi = self.clamp_hi.clamp(lo, last);
        (0..self.len)
            .map(|i| {
                let u = (self.scale * f64::from(i) + self.offset).clamp(lo, hi);
                let f = u.floor();
                let i0 = f as usize;
                let i1 = (f + 1.0).min(hi) as usize;
                let w = if i1 == i0 { 0.0 } else { (u - f) as f32 };
                (i0, i1, w)
            })
            .collect()
    }
}

/// A composed sequence of [`GeometryOp`]s, executed with one sampling pass.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryPlan {
    src_w: u32,
    src_h: u32,
    x: Axis,
    y: Axis,
    labels: SmallVec<[String; 4]>,
}

impl GeometryPlan {
    /// Empty plan for a `width`x`height` source.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            src_w: width,
            src_h: height,
            x: Axis::identity(width),
            y: Axis::identity(height),
            labels: SmallVec::new(),
        }
    }

    /// Current output size of the plan.
    pub fn output_size(&self) -> (u32, u32) {
        (self.x.len, self.y.len)
    }

    pub fn op_count(&self) -> usize {
        self.labels.len()
    }

    /// Append `op`, validating it against the plan's current output size.
    pub fn push(&mut self, op: GeometryOp) -> FramecutResult<()> {
        let (cur_w, cur_h) = self.output_size();
        match op {
            GeometryOp::Crop {
                x,
                y,
                width,
                height,
            } => {
                if width == 0 || height == 0 {
                    return Err(FramecutError::validation(format!(
                        "crop size must be non-zero, got {width}x{height}"
                    )));
                }
                if x >= cur_w || y >= cur_h {
                    return Err(FramecutError::validation(format!(
                        "crop origin ({x},{y}) lies outside a {cur_w}x{cur_h} picture"
                    )));
                }
                self.x.crop(x, width);
                self.y.crop(y, height);
            }
            GeometryOp::Resize {
                width,
                height,
                preserve_aspect,
            } => {
                let (w, h) = resize_target(cur_w, cur_h, width, height, preserve_aspect)?;
                if (w, h) == (cur_w, cur_h) {
                    return Ok(());
                }
                self.x.resize(w);
                self.y.resize(h);
            }
            GeometryOp::Place {
                x,
                y,
                canvas_width,
                canvas_height,
            } => {
                if canvas_width == 0 || canvas_height == 0 {
                    return Err(FramecutError::validation(format!(
                        "place canvas must be non-empty, got {canvas_width}x{canvas_height}"
                    )));
                }
                self.x.place(x, canvas_width);
                self.y.place(y, canvas_height);
            }
        }
        self.labels.push(op.label());
        Ok(())
    }

    fn is_identity(&self) -> bool {
        self.x.is_identity_of(self.src_w) && self.y.is_identity_of(self.src_h)
    }

    /// Run the plan against `src`, whose size must match the plan's source size.
    pub fn execute(self, src: Picture) -> FramecutResult<Picture> {
        if (src.width(), src.height()) != (self.src_w, self.src_h) {
            return Err(FramecutError::size_mismatch(
                (src.width(), src.height()),
                (self.src_w, self.src_h),
            ));
        }
        if self.is_identity() {
            let mut out = src;
            for l in self.labels {
                out.stack_mut().push(l);
            }
            return Ok(out);
        }

        let (out_w, out_h) = self.output_size();
        let xt = self.x.taps(self.src_w);
        let yt = self.y.taps(self.src_h);
        let x_mask: Vec<bool> = (0..out_w).map(|i| self.x.contains(i)).collect();
        let y_mask: Vec<bool> = (0..out_h).map(|i| self.y.contains(i)).collect();
        let full = self.x.covers_all() && self.y.covers_all();
        let grid = Grid {
            src_w: self.src_w as usize,
            out_w: out_w as usize,
            out_h: out_h as usize,
            xt: &xt,
            yt: &yt,
            x_mask: &x_mask,
            y_mask: &y_mask,
        };

        let samples = match &src.samples {
            Samples::Eight(p) => Samples::Eight(grid.sample_planes(p)),
            Samples::Sixteen(p) => Samples::Sixteen(grid.sample_planes(p)),
        };
        let alpha = match (&src.alpha, full) {
            (Some(a), _) => Some(grid.sample_alpha(Some(a))),
            (None, false) => Some(grid.sample_alpha(None)),
            (None, true) => None,
        };

        let mut stack = src.stack;
        for l in self.labels {
            stack.push(l);
        }
        Ok(Picture {
            width: out_w,
            height: out_h,
            samples,
            alpha,
            stack,
        })
    }
}

/// Final size of a resize request against a `cur_w`x`cur_h` picture.
fn resize_target(
    cur_w: u32,
    cur_h: u32,
    width: u32,
    height: u32,
    preserve_aspect: bool,
) -> FramecutResult<(u32, u32)> {
    if width == 0 || height == 0 {
        return Err(FramecutError::validation(format!(
            "resize target must be non-zero, got {width}x{height}"
        )));
    }
    if !preserve_aspect {
        return Ok((width, height));
    }
    let s = (f64::from(width) / f64::from(cur_w)).min(f64::from(height) / f64::from(cur_h));
    let w = ((f64::from(cur_w) * s).round() as u32).clamp(1, width);
    let h = ((f64::from(cur_h) * s).round() as u32).clamp(1, height);
    Ok((w, h))
}

struct Grid<'a> {
    src_w: usize,
    out_w: usize,
    out_h: usize,
    xt: &'a [(usize, usize, f32)],
    yt: &'a [(usize, usize, f32)],
    x_mask: &'a [bool],
    y_mask: &'a [bool],
}

impl Grid<'_> {
    fn sample_planes<T: Sample>(&self, p: &Planes<T>) -> Planes<T> {
        Planes {
            r: self.sample_plane(&p.r),
            g: self.sample_plane(&p.g),
            b: self.sample_plane(&p.b),
        }
    }

    fn sample_plane<T: Sample>(&self, src: &[T]) -> Vec<T> {
        let mut out = vec![T::default(); self.out_w * self.out_h];
        self.for_each_valid(|o, (x0, x1, wx), (y0, y1, wy)| {
            let k00 = src[y0 * self.src_w + x0].to_f32();
            let k01 = src[y0 * self.src_w + x1].to_f32();
            let k10 = src[y1 * self.src_w + x0].to_f32();
            let k11 = src[y1 * self.src_w + x1].to_f32();
            let top = k00 + (k01 - k00) * wx;
            let bottom = k10 + (k11 - k10) * wx;
            out[o] = T::from_f32_rounded(top + (bottom - top) * wy);
        });
        out
    }

    fn sample_alpha(&self, src: Option<&Vec<f32>>) -> Vec<f32> {
        let mut out = vec![0.0f32; self.out_w * self.out_h];
        self.for_each_valid(|o, (x0, x1, wx), (y0, y1, wy)| {
            out[o] = match src {
                None => 1.0,
                Some(a) => {
                    let k00 = a[y0 * self.src_w + x0];
                    let k01 = a[y0 * self.src_w + x1];
                    let k10 = a[y1 * self.src_w + x0];
                    let k11 = a[y1 * self.src_w + x1];
                    let top = k00 + (k01 - k00) * wx;
                    let bottom = k10 + (k11 - k10) * wx;
                    (top + (bottom - top) * wy).clamp(0.0, 1.0)
                }
            };
        });
        out
    }

    fn for_each_valid(
        &self,
        mut f: impl FnMut(usize, (usize, usize, f32), (usize, usize, f32)),
    ) {
        for (y, &ty) in self.yt.iter().enumerate() {
            if !self.y_mask[y] {
                continue;
            }
            let row = y * self.out_w;
            for (x, &tx) in self.xt.iter().enumerate() {
                if self.x_mask[x] {
                    f(row + x, tx, ty);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/picture/geometry.rs"]
mod tests;
