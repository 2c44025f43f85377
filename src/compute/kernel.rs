use crate::foundation::error::{FramecutError, FramecutResult};

/// Largest absolute difference allowed between two backends evaluating the same kernel.
///
/// One unit of 16-bit colour resolution on normalized samples.
pub const KERNEL_EPSILON: f32 = 1.0 / 65535.0;

/// Output alpha below this is treated as fully transparent.
const ALPHA_FLOOR: f32 = 1e-6;
/// Top alpha at or below this leaves the base alpha untouched.
const ALPHA_ANTIALIAS: f32 = 0.05;

/// A per-element function `f(a, b, c, d, e, f) -> f32` over normalized samples.
///
/// Operands past the first are optional; missing or shorter operand arrays read as zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kernel {
    /// Returns `a`.
    Identity,
    /// `((a - 0.5) * contrast + 0.5) * brightness`, clamped.
    ColorCorrection { brightness: f32, contrast: f32 },
    /// Alpha plane of a colour key: `alpha` where the pixel `(a, b, c)` is within `tolerance`
    /// of `(r, g, b)` on every channel, else the current alpha `d`.
    ColorKey {
        r: f32,
        g: f32,
        b: f32,
        tolerance: f32,
        alpha: f32,
    },
    /// Returns `b`.
    ReplaceAlpha,
    /// `min(a + b, 1)`.
    Add,
    /// `max(a - b, 0)`.
    Minus,
    /// `a * b`, clamped.
    Multiply,
    /// `max(a, b)`.
    Max,
    /// Colour of `a` (top, alpha `c`) composited over `b` (base, alpha `d`).
    OverlayColor,
    /// Alpha of `a` (top) composited over `b` (base).
    OverlayAlpha,
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::ColorCorrection { .. } => "color_correction",
            Self::ColorKey { .. } => "color_key",
            Self::ReplaceAlpha => "replace_alpha",
            Self::Add => "add",
            Self::Minus => "minus",
            Self::Multiply => "multiply",
            Self::Max => "max",
            Self::OverlayColor => "overlay_color",
            Self::OverlayAlpha => "overlay_alpha",
        }
    }

    /// Number of operands the kernel reads.
    pub fn arity(&self) -> usize {
        match self {
            Self::Identity | Self::ColorCorrection { .. } => 1,
            Self::ReplaceAlpha
            | Self::Add
            | Self::Minus
            | Self::Multiply
            | Self::Max
            | Self::OverlayAlpha => 2,
            Self::ColorKey { .. } | Self::OverlayColor => 4,
        }
    }

    /// Scalar reference evaluation.
    pub fn eval(&self, a: f32, b: f32, c: f32, d: f32, _e: f32, _f: f32) -> f32 {
        match *self {
            Self::Identity => a,
            Self::ColorCorrection {
                brightness,
                contrast,
            } => (((a - 0.5) * contrast + 0.5) * brightness).clamp(0.0, 1.0),
            Self::ColorKey {
                r,
                g,
                b: kb,
                tolerance,
                alpha,
            } => {
                if (a - r).abs() <= tolerance
                    && (b - g).abs() <= tolerance
                    && (c - kb).abs() <= tolerance
                {
                    alpha
                } else {
                    d
                }
            }
            Self::ReplaceAlpha => b,
            Self::Add => (a + b).min(1.0),
            Self::Minus => (a - b).max(0.0),
            Self::Multiply => (a * b).clamp(0.0, 1.0),
            Self::Max => a.max(b),
            Self::OverlayColor => overlay_color(a, b, c, d),
            Self::OverlayAlpha => overlay_alpha(a, b),
        }
    }

    /// WGSL expression over `a`..`f` with parameters baked in.
    #[cfg_attr(not(feature = "gpu"), allow(dead_code))]
    pub(crate) fn wgsl_expr(&self) -> String {
        match *self {
            Self::Identity => "a".to_string(),
            Self::ColorCorrection {
                brightness,
                contrast,
            } => format!(
                "clamp(((a - 0.5) * {} + 0.5) * {}, 0.0, 1.0)",
                wgsl_f32(contrast),
                wgsl_f32(brightness)
            ),
            Self::ColorKey {
                r,
                g,
                b,
                tolerance,
                alpha,
            } => {
                let t = wgsl_f32(tolerance);
                format!(
                    "select(d, {}, abs(a - {}) <= {t} && abs(b - {}) <= {t} && abs(c - {}) <= {t})",
                    wgsl_f32(alpha),
                    wgsl_f32(r),
                    wgsl_f32(g),
                    wgsl_f32(b)
                )
            }
            Self::ReplaceAlpha => "b".to_string(),
            Self::Add => "min(a + b, 1.0)".to_string(),
            Self::Minus => "max(a - b, 0.0)".to_string(),
            Self::Multiply => "clamp(a * b, 0.0, 1.0)".to_string(),
            Self::Max => "max(a, b)".to_string(),
            Self::OverlayColor => "overlay_color(a, b, c, d)".to_string(),
            Self::OverlayAlpha => "overlay_alpha(a, b)".to_string(),
        }
    }

    /// Reject non-finite parameters before they reach a backend.
    pub fn validate(&self) -> FramecutResult<()> {
        let params: &[f32] = match self {
            Self::ColorCorrection {
                brightness,
                contrast,
            } => &[*brightness, *contrast],
            Self::ColorKey {
                r,
                g,
                b,
                tolerance,
                alpha,
            } => &[*r, *g, *b, *tolerance, *alpha],
            _ => &[],
        };
        if params.iter().any(|v| !v.is_finite()) {
            return Err(FramecutError::validation(format!(
                "kernel '{}' has a non-finite parameter",
                self.name()
            )));
        }
        Ok(())
    }
}

pub(crate) fn overlay_alpha(top: f32, base: f32) -> f32 {
    let out = if top >= 1.0 {
        1.0
    } else if top <= ALPHA_ANTIALIAS {
        base
    } else {
        top + base * (1.0 - top)
    };
    if out < ALPHA_FLOOR { 0.0 } else { out }
}

pub(crate) fn overlay_color(top: f32, base: f32, top_alpha: f32, base_alpha: f32) -> f32 {
    let out_alpha = overlay_alpha(top_alpha, base_alpha);
    if out_alpha < ALPHA_FLOOR {
        return 0.0;
    }
    ((top * top_alpha + base * base_alpha * (1.0 - top_alpha)) / out_alpha).clamp(0.0, 1.0)
}

#[cfg_attr(not(feature = "gpu"), allow(dead_code))]
pub(crate) const WGSL_HELPERS: &str = r#"
fn overlay_alpha(top: f32, base: f32) -> f32 {
  var res = top + base * (1.0 - top);
  if (top >= 1.0) {
    res = 1.0;
  } else if (top <= 0.05) {
    res = base;
  }
  return select(res, 0.0, res < 1e-6);
}

fn overlay_color(top: f32, base: f32, top_alpha: f32, base_alpha: f32) -> f32 {
  let out_alpha = overlay_alpha(top_alpha, base_alpha);
  if (out_alpha < 1e-6) {
    return 0.0;
  }
  return clamp((top * top_alpha + base * base_alpha * (1.0 - top_alpha)) / out_alpha, 0.0, 1.0);
}
"#;

#[cfg_attr(not(feature = "gpu"), allow(dead_code))]
fn wgsl_f32(v: f32) -> String {
    let s = format!("{v:?}");
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{s}.0")
    }
}

/// Validate operand arrays and return the output length (the length of the first operand).
pub(crate) fn check_inputs(kernel: &Kernel, inputs: &[&[f32]]) -> FramecutResult<usize> {
    kernel.validate()?;
    if inputs.is_empty() || inputs.len() > 6 {
        return Err(FramecutError::validation(format!(
            "kernel '{}' takes 1 to 6 operand arrays, got {}",
            kernel.name(),
            inputs.len()
        )));
    }
    Ok(inputs[0].len())
}

/// Operand `k` at element `i`, zero when absent or short.
#[inline]
pub(crate) fn operand(inputs: &[&[f32]], k: usize, i: usize) -> f32 {
    inputs.get(k).and_then(|s| s.get(i)).copied().unwrap_or(0.0)
}

#[inline]
pub(crate) fn eval_at(kernel: &Kernel, inputs: &[&[f32]], i: usize) -> f32 {
    kernel.eval(
        operand(inputs, 0, i),
        operand(inputs, 1, i),
        operand(inputs, 2, i),
        operand(inputs, 3, i),
        operand(inputs, 4, i),
        operand(inputs, 5, i),
    )
}

#[cfg(test)]
#[path = "../../tests/unit/compute/kernel.rs"]
mod tests;
