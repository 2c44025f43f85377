use crate::compute::{ComputeBackend, Kernel};
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::picture::{BitDepth, Channel, Picture, ProcessStack};

/// Layer blend operator.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MixtureMode {
    /// Alpha compositing of the upper layer over the lower one.
    #[default]
    Overlay,
    Add,
    Minus,
    Multiply,
}

impl MixtureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::Add => "add",
            Self::Minus => "minus",
            Self::Multiply => "multiply",
        }
    }
}

impl std::str::FromStr for MixtureMode {
    type Err = FramecutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overlay" => Ok(Self::Overlay),
            "add" => Ok(Self::Add),
            "minus" => Ok(Self::Minus),
            "multiply" => Ok(Self::Multiply),
            _ => Err(FramecutError::validation(format!(
                "mixture mode '{s}' is not supported"
            ))),
        }
    }
}

/// Blends an upper layer onto the accumulated lower layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mixture {
    mode: MixtureMode,
}

impl Mixture {
    pub fn new(mode: MixtureMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MixtureMode {
        self.mode
    }

    /// Blend `top` onto `base`. Both must have the same size; the result is 8-bit only when
    /// both inputs are.
    pub fn mix(
        &self,
        mut base: Picture,
        mut top: Picture,
        backend: &dyn ComputeBackend,
    ) -> FramecutResult<Picture> {
        if base.size() != top.size() {
            return Err(FramecutError::size_mismatch(top.size(), base.size()));
        }
        let depth = if base.bit_depth() == BitDepth::Eight && top.bit_depth() == BitDepth::Eight {
            BitDepth::Eight
        } else {
            BitDepth::Sixteen
        };
        let stack = ProcessStack::blend(self.mode.as_str(), base.take_stack(), top.take_stack());

        if self.mode == MixtureMode::Overlay && !top.has_alpha() {
            let mut out = top.to_bit_depth(depth);
            *out.stack_mut() = stack;
            return Ok(out);
        }

        let base_alpha = base.alpha_or_opaque();
        let top_alpha = top.alpha_or_opaque();
        let mut planes: [Vec<f32>; 3] = Default::default();
        for (dst, ch) in planes
            .iter_mut()
            .zip([Channel::Red, Channel::Green, Channel::Blue])
        {
            let b = base.channel_normalized(ch);
            let t = top.channel_normalized(ch);
            *dst = match self.mode {
                MixtureMode::Overlay => {
                    backend.compute(&Kernel::OverlayColor, &[&t, &b, &top_alpha, &base_alpha])?
                }
                MixtureMode::Add => backend.compute(&Kernel::Add, &[&b, &t])?,
                MixtureMode::Minus => backend.compute(&Kernel::Minus, &[&b, &t])?,
                MixtureMode::Multiply => backend.compute(&Kernel::Multiply, &[&b, &t])?,
            };
        }
        let alpha = match self.mode {
            MixtureMode::Overlay => {
                backend.compute(&Kernel::OverlayAlpha, &[&top_alpha, &base_alpha])?
            }
            _ => backend.compute(&Kernel::Max, &[&base_alpha, &top_alpha])?,
        };
        let alpha = if alpha.iter().all(|&a| a >= 1.0) {
            None
        } else {
            Some(alpha)
        };
        Picture::from_normalized(base.width(), base.height(), depth, planes, alpha, stack)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effects/mixture.rs"]
mod tests;
