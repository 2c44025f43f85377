//! Frame-rendering core of a non-linear video editor.
//!
//! A timeline is a list of [`Clip`]s placed on layers. For every output frame the compositor
//! decodes the clips that occupy it, runs their effect chains and blends the layers bottom-up
//! onto an opaque background. A [`Renderer`] schedules that work over a thread pool and hands
//! the frames, strictly in order, to an [`Encoder`]; the [`AudioComposer`] mixes the matching
//! soundtrack.
//!
//! - Describe a timeline in code or load a [`Project`] file
//! - Compose single frames with [`compose_frame`]
//! - Render a range with [`Renderer::render`] into any [`Encoder`]
#![forbid(unsafe_code)]

mod foundation;

pub mod audio;
pub mod clip;
pub mod compute;
pub mod effects;
pub mod encode;
pub mod media;
pub mod picture;
pub mod project;
pub mod render;
pub mod timeline;

pub use crate::foundation::core::{Canvas, Fps, FrameIndex, FrameRange};
pub use crate::foundation::error::{FrameFailure, FramecutError, FramecutResult};

pub use crate::audio::{AudioBuffer, AudioComposer, AudioSource, SoundTrack};
pub use crate::clip::{Clip, ClipInfo, ClipKind, ClipSource, TextEntry};
pub use crate::compute::{ComputeBackend, ComputeBackendKind, Kernel, create_backend};
pub use crate::effects::{Effect, EffectRegistry, EffectSpec, Mixture, MixtureMode};
pub use crate::encode::{
    Encoder, EncoderConfig, FfmpegEncoder, FfmpegEncoderOpts, InMemoryEncoder,
    PngSequenceEncoder, VideoBuilder, VideoBuilderOpts,
};
pub use crate::picture::{BitDepth, Picture};
pub use crate::project::{ClipSpec, Project};
pub use crate::render::{
    CancellationToken, DiagnosticsReport, RenderContext, RenderStats, Renderer, RendererOpts,
};
pub use crate::timeline::{compose_frame, find_overlaps, frame_hash};
