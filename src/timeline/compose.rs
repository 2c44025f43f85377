use std::sync::Arc;

use crate::clip::Clip;
use crate::effects::{Effect, EffectContext, Mixture, MixtureMode};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::FramecutResult;
use crate::picture::{GeometryPlan, Picture};
use crate::render::RenderContext;
use crate::timeline::{LayerFrame, active_frames};

/// Compose every clip occupying `frame` into one opaque `width`x`height` picture.
pub fn compose_frame(
    ctx: &RenderContext,
    clips: &[Arc<Clip>],
    frame: FrameIndex,
    width: u32,
    height: u32,
) -> FramecutResult<Picture> {
    let layers = active_frames(clips, frame, width, height, false)?;
    mixture_layers(ctx, layers, frame, width, height)
}

/// Blend `layers` (bottom first) onto a transparent canvas, then flatten the result onto the
/// context's fallback background. The output is always exactly `width`x`height` and opaque.
#[tracing::instrument(level = "trace", skip_all, fields(frame = frame.0, layers = layers.len()))]
pub fn mixture_layers(
    ctx: &RenderContext,
    layers: Vec<LayerFrame>,
    frame: FrameIndex,
    width: u32,
    height: u32,
) -> FramecutResult<Picture> {
    let mut acc = Picture::transparent(width, height, ctx.bit_depth())?;
    for layer in layers {
        let clip = layer.clip;
        let label = clip.label();
        let effects = ctx.effects_for(&clip)?;
        let picture = layer.picture.to_bit_depth(ctx.bit_depth());
        let mut effected = apply_effects(ctx, &effects, picture, frame, width, height, &label)?;
        if effected.size() != (width, height) {
            effected = effected.place(0, 0, width, height)?;
        }
        let mixture = ctx.mixture_for(&clip);
        acc = timed(ctx, frame, &label, mixture.mode().as_str(), || {
            mixture.mix(acc, effected, ctx.backend())
        })?;
    }

    let fallback = ctx.blank_frame(width, height)?;
    let out = timed(ctx, frame, "", "fallback", || {
        Mixture::new(MixtureMode::Overlay).mix(fallback, acc, ctx.backend())
    })?;
    out.resize(width, height, false)
}

/// Run a clip's effect chain. Consecutive step-yielding effects are folded into one geometry
/// plan and executed together when the chain switches to a direct effect or ends.
fn apply_effects(
    ctx: &RenderContext,
    effects: &[Effect],
    picture: Picture,
    frame: FrameIndex,
    width: u32,
    height: u32,
    label: &str,
) -> FramecutResult<Picture> {
    let ectx = EffectContext {
        backend: ctx.backend(),
        width,
        height,
        frame,
    };
    let mut picture = picture;
    let mut batch: Option<GeometryPlan> = None;

    for effect in effects {
        if effect.yields_process_step() {
            let plan = batch.get_or_insert_with(|| GeometryPlan::new(picture.width(), picture.height()));
            match extend_plan(plan, effect, frame, (width, height)) {
                Ok(extended) => {
                    *plan = extended;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        clip = label,
                        effect = effect.name(),
                        frame = frame.0,
                        error = %e,
                        "process step generation failed, rendering effect directly"
                    );
                }
            }
            picture = flush(ctx, batch.take(), picture, frame, label)?;
        } else {
            picture = flush(ctx, batch.take(), picture, frame, label)?;
        }
        picture = timed(ctx, frame, label, effect.name(), || effect.render(picture, &ectx))?;
    }
    flush(ctx, batch, picture, frame, label)
}

/// `plan` with `effect`'s steps appended; `plan` itself is left untouched on failure.
fn extend_plan(
    plan: &GeometryPlan,
    effect: &Effect,
    frame: FrameIndex,
    target: (u32, u32),
) -> FramecutResult<GeometryPlan> {
    let mut next = plan.clone();
    for step in effect.process_steps(frame, next.output_size(), target)? {
        next.push(step.op)?;
    }
    Ok(next)
}

fn flush(
    ctx: &RenderContext,
    plan: Option<GeometryPlan>,
    picture: Picture,
    frame: FrameIndex,
    label: &str,
) -> FramecutResult<Picture> {
    match plan {
        Some(plan) if plan.op_count() > 0 => {
            timed(ctx, frame, label, "process steps", || plan.execute(picture))
        }
        _ => Ok(picture),
    }
}

fn timed<T>(
    ctx: &RenderContext,
    frame: FrameIndex,
    clip: &str,
    step: &str,
    f: impl FnOnce() -> T,
) -> T {
    match ctx.diagnostics() {
        Some(d) => d.time(frame.0, clip, step, f),
        None => f(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/compose.rs"]
mod tests;
