use crate::foundation::error::FramecutResult;
use crate::picture::{GeometryOp, GeometryPlan, Picture};

/// A deferred geometry transform yielded by an effect, executed later in a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessStep {
    /// Name of the effect that produced the step.
    pub effect: String,
    pub op: GeometryOp,
}

impl ProcessStep {
    pub fn new(effect: impl Into<String>, op: GeometryOp) -> Self {
        Self {
            effect: effect.into(),
            op,
        }
    }
}

/// Run `steps` against `picture` with a single sampling pass.
pub fn process_batch(steps: &[ProcessStep], picture: Picture) -> FramecutResult<Picture> {
    if steps.is_empty() {
        return Ok(picture);
    }
    let mut plan = GeometryPlan::new(picture.width(), picture.height());
    for s in steps {
        plan.push(s.op)?;
    }
    plan.execute(picture)
}

#[cfg(test)]
#[path = "../../tests/unit/effects/process_step.rs"]
mod tests;
