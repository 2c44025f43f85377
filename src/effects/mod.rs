//! Effects applied to one clip's picture, and mixtures that blend layers.

mod effect;
mod mixture;
mod process_step;
mod registry;

pub use effect::{CustomEffect, Effect, EffectContext, EffectKind, ProgressWindow};
pub use mixture::{Mixture, MixtureMode};
pub use process_step::{ProcessStep, process_batch};
pub use registry::{EffectFactory, EffectRegistry, EffectSpec};
