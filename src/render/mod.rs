//! Render passes: the per-pass context, the frame scheduler and its diagnostics.

mod cancel;
mod context;
mod diagnostics;
mod scheduler;

pub use cancel::CancellationToken;
pub use context::RenderContext;
pub use diagnostics::{DiagnosticsReport, StepTiming};
pub use scheduler::{
    PassPlan, PassState, RenderOutcome, RenderStats, Renderer, RendererOpts, default_max_threads,
};
