use std::fmt;
use std::sync::Arc;

use crate::compute::{ComputeBackend, Kernel};
use crate::effects::process_step::ProcessStep;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::foundation::math::signed_offset;
use crate::picture::{Channel, GeometryOp, Picture};

/// Everything an effect may consult while rendering one frame.
#[derive(Clone, Copy)]
pub struct EffectContext<'a> {
    pub backend: &'a dyn ComputeBackend,
    /// Output frame width.
    pub width: u32,
    /// Output frame height.
    pub height: u32,
    /// Absolute timeline frame being rendered.
    pub frame: FrameIndex,
}

impl EffectContext<'_> {
    pub fn target(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// An externally provided effect.
pub trait CustomEffect: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    fn render(&self, picture: Picture, ctx: &EffectContext<'_>) -> FramecutResult<Picture>;

    /// Release held resources at the end of a render pass.
    fn release(&self) {}
}

/// Absolute frame range a continuous effect interpolates over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressWindow {
    pub start: u64,
    pub end: u64,
}

impl ProgressWindow {
    /// Progress of `frame` through the window, clamped to `[0, 1]`. An empty window reads 0.
    pub fn progress(self, frame: FrameIndex) -> f32 {
        if self.end <= self.start {
            return 0.0;
        }
        let t = (frame.0 as f64 - self.start as f64) / (self.end - self.start) as f64;
        t.clamp(0.0, 1.0) as f32
    }
}

#[derive(Clone, Debug)]
pub enum EffectKind {
    /// Colour key on 16-bit components: pixels within `tolerance` of `(r, g, b)` get alpha `a`.
    RemoveColor {
        r: u16,
        g: u16,
        b: u16,
        a: u16,
        tolerance: u16,
    },
    Place {
        x: i32,
        y: i32,
    },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Resize {
        width: u32,
        height: u32,
        preserve_aspect: bool,
    },
    ColorCorrection {
        brightness: f32,
        contrast: f32,
    },
    ReplaceAlpha {
        alpha: f32,
    },
    /// Centred crop shrinking from the full picture to `target_width`x`target_height` as
    /// progress goes from 0 to 1, scaled back to the output size.
    ZoomIn {
        target_width: u32,
        target_height: u32,
    },
    /// Per-frame pseudo-random offset, deterministic in `(seed, frame)`.
    Jitter {
        max_offset_x: u32,
        max_offset_y: u32,
        seed: u64,
    },
    Custom(Arc<dyn CustomEffect>),
}

/// One effect instance bound to a clip for a single render pass.
#[derive(Clone, Debug)]
pub struct Effect {
    type_name: String,
    name: String,
    index: i32,
    enabled: bool,
    reference: Option<(u32, u32)>,
    window: ProgressWindow,
    kind: EffectKind,
}

impl Effect {
    pub fn new(type_name: impl Into<String>, kind: EffectKind) -> Self {
        let type_name = type_name.into();
        Self {
            name: type_name.clone(),
            type_name,
            index: 0,
            enabled: true,
            reference: None,
            window: ProgressWindow::default(),
            kind,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.index = index;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Canvas size the effect's coordinates were authored against.
    pub fn with_reference(mut self, width: u32, height: u32) -> Self {
        self.reference = (width > 0 && height > 0).then_some((width, height));
        self
    }

    pub fn with_window(mut self, start: u64, end: u64) -> Self {
        self.window = ProgressWindow { start, end };
        self
    }

    /// Give a continuous effect without an explicit window the clip's own active range.
    pub fn bind_to_clip(mut self, clip_start: u64, clip_span: u64) -> Self {
        if self.is_continuous() && self.window.start == 0 && self.window.end == 0 {
            self.window = ProgressWindow {
                start: clip_start,
                end: clip_start + clip_span,
            };
        }
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn kind(&self) -> &EffectKind {
        &self.kind
    }

    pub fn window(&self) -> ProgressWindow {
        self.window
    }

    pub fn is_continuous(&self) -> bool {
        matches!(
            self.kind,
            EffectKind::ZoomIn { .. } | EffectKind::Jitter { .. }
        )
    }

    /// `true` if the effect is pure geometry and can be deferred into a batched plan.
    pub fn yields_process_step(&self) -> bool {
        matches!(
            self.kind,
            EffectKind::Place { .. }
                | EffectKind::Crop { .. }
                | EffectKind::Resize { .. }
                | EffectKind::ZoomIn { .. }
                | EffectKind::Jitter { .. }
        )
    }

    pub fn progress(&self, frame: FrameIndex) -> f32 {
        self.window.progress(frame)
    }

    fn rescale(&self, x: f64, y: f64, target: (u32, u32)) -> (f64, f64) {
        match self.reference {
            Some((rw, rh)) if (rw, rh) != target => (
                x * f64::from(target.0) / f64::from(rw),
                y * f64::from(target.1) / f64::from(rh),
            ),
            _ => (x, y),
        }
    }

    fn rescale_size(&self, w: u32, h: u32, target: (u32, u32)) -> (u32, u32) {
        let (w, h) = self.rescale(f64::from(w), f64::from(h), target);
        ((w.round() as u32).max(1), (h.round() as u32).max(1))
    }

    /// Deferred geometry for `frame`, given the picture size at this point of the chain.
    pub fn process_steps(
        &self,
        frame: FrameIndex,
        current: (u32, u32),
        target: (u32, u32),
    ) -> FramecutResult<Vec<ProcessStep>> {
        let step = |op| ProcessStep::new(self.name.clone(), op);
        match self.kind {
            EffectKind::Place { x, y } => {
                let (x, y) = self.rescale(f64::from(x), f64::from(y), target);
                Ok(vec![step(GeometryOp::Place {
                    x: x.round() as i32,
                    y: y.round() as i32,
                    canvas_width: target.0,
                    canvas_height: target.1,
                })])
            }
            EffectKind::Crop {
                x,
                y,
                width,
                height,
            } => {
                let (x, y) = self.rescale(f64::from(x), f64::from(y), target);
                let (width, height) = self.rescale_size(width, height, target);
                Ok(vec![step(GeometryOp::Crop {
                    x: x.round() as u32,
                    y: y.round() as u32,
                    width,
                    height,
                })])
            }
            EffectKind::Resize {
                width,
                height,
                preserve_aspect,
            } => {
                let (width, height) = self.rescale_size(width, height, target);
                Ok(vec![step(GeometryOp::Resize {
                    width,
                    height,
                    preserve_aspect,
                })])
            }
            EffectKind::ZoomIn {
                target_width,
                target_height,
            } => {
                let (tw, th) = self.rescale_size(target_width, target_height, target);
                let p = f64::from(self.progress(frame));
                let (cw, ch) = (f64::from(current.0), f64::from(current.1));
                let w = ((cw + (f64::from(tw) - cw) * p).round() as u32).max(1);
                let h = ((ch + (f64::from(th) - ch) * p).round() as u32).max(1);
                Ok(vec![
                    step(GeometryOp::Crop {
                        x: current.0.saturating_sub(w) / 2,
                        y: current.1.saturating_sub(h) / 2,
                        width: w,
                        height: h,
                    }),
                    step(GeometryOp::Resize {
                        width: target.0,
                        height: target.1,
                        preserve_aspect: false,
                    }),
                ])
            }
            EffectKind::Jitter {
                max_offset_x,
                max_offset_y,
                seed,
            } => {
                let dx = signed_offset(seed, frame.0, 0, max_offset_x);
                let dy = signed_offset(seed, frame.0, 1, max_offset_y);
                let (dx, dy) = self.rescale(f64::from(dx), f64::from(dy), target);
                Ok(vec![step(GeometryOp::Place {
                    x: dx.round() as i32,
                    y: dy.round() as i32,
                    canvas_width: target.0,
                    canvas_height: target.1,
                })])
            }
            _ => Err(FramecutError::evaluation(format!(
                "effect '{}' ({}) does not yield process steps",
                self.name, self.type_name
            ))),
        }
    }

    /// Apply the effect immediately.
    pub fn render(&self, picture: Picture, ctx: &EffectContext<'_>) -> FramecutResult<Picture> {
        if self.yields_process_step() {
            let steps = self.process_steps(ctx.frame, picture.size(), ctx.target())?;
            let mut out = picture;
            for s in steps {
                out = out.apply(s.op)?;
            }
            return Ok(out);
        }
        match &self.kind {
            EffectKind::RemoveColor {
                r,
                g,
                b,
                a,
                tolerance,
            } => {
                let kernel = Kernel::ColorKey {
                    r: f32::from(*r) / 65535.0,
                    g: f32::from(*g) / 65535.0,
                    b: f32::from(*b) / 65535.0,
                    tolerance: f32::from(*tolerance) / 65535.0,
                    alpha: f32::from(*a) / 65535.0,
                };
                remove_color(picture, ctx.backend, &kernel, &self.name)
            }
            EffectKind::ColorCorrection {
                brightness,
                contrast,
            } => {
                let kernel = Kernel::ColorCorrection {
                    brightness: *brightness,
                    contrast: *contrast,
                };
                map_colour(picture, ctx.backend, &kernel, &self.name)
            }
            EffectKind::ReplaceAlpha { alpha } => {
                replace_alpha(picture, ctx.backend, *alpha, &self.name)
            }
            EffectKind::Custom(c) => c.render(picture, ctx),
            _ => Err(FramecutError::evaluation(format!(
                "effect '{}' has no direct renderer",
                self.name
            ))),
        }
    }

    /// Release resources held by externally provided effects.
    pub fn release(&self) {
        if let EffectKind::Custom(c) = &self.kind {
            c.release();
        }
    }
}

fn colour_planes(p: &Picture) -> [Vec<f32>; 3] {
    [Channel::Red, Channel::Green, Channel::Blue].map(|c| p.channel_normalized(c))
}

fn remove_color(
    mut picture: Picture,
    backend: &dyn ComputeBackend,
    kernel: &Kernel,
    label: &str,
) -> FramecutResult<Picture> {
    let [mut r, mut g, mut b] = colour_planes(&picture);
    let current = picture.alpha_or_opaque();
    let alpha = backend.compute(kernel, &[&r, &g, &b, &current])?;
    for (i, &a) in alpha.iter().enumerate() {
        if a <= 0.0 {
            r[i] = 0.0;
            g[i] = 0.0;
            b[i] = 0.0;
        }
    }
    let stack = picture.take_stack();
    Picture::from_normalized(
        picture.width(),
        picture.height(),
        picture.bit_depth(),
        [r, g, b],
        Some(alpha),
        stack,
    )
    .map(|p| p.with_step(format!("remove color ({label})")))
}

fn map_colour(
    mut picture: Picture,
    backend: &dyn ComputeBackend,
    kernel: &Kernel,
    label: &str,
) -> FramecutResult<Picture> {
    let planes = colour_planes(&picture);
    let mut out: [Vec<f32>; 3] = Default::default();
    for (dst, src) in out.iter_mut().zip(&planes) {
        *dst = backend.compute(kernel, &[src])?;
    }
    let alpha = picture.alpha().map(<[f32]>::to_vec);
    let stack = picture.take_stack();
    Picture::from_normalized(
        picture.width(),
        picture.height(),
        picture.bit_depth(),
        out,
        alpha,
        stack,
    )
    .map(|p| p.with_step(format!("{} ({label})", kernel.name())))
}

fn replace_alpha(
    mut picture: Picture,
    backend: &dyn ComputeBackend,
    alpha: f32,
    label: &str,
) -> FramecutResult<Picture> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(FramecutError::validation(format!(
            "replacement alpha must be within [0, 1], got {alpha}"
        )));
    }
    if alpha >= 1.0 {
        picture.set_alpha(None)?;
    } else {
        let current = picture.alpha_or_opaque();
        let fill = vec![alpha; current.len()];
        let next = backend.compute(&Kernel::ReplaceAlpha, &[&current, &fill])?;
        picture.set_alpha(Some(next))?;
    }
    Ok(picture.with_step(format!("replace alpha {alpha} ({label})")))
}

#[cfg(test)]
#[path = "../../tests/unit/effects/effect.rs"]
mod tests;
