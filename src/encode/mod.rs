//! Frame encoders and the sequential output writer.
//!
//! Encoders consume composed frames strictly in output order. [`VideoBuilder`] sits in front of
//! an encoder, accepts frames in any order from many producers, and releases them one index at a
//! time.

mod builder;
mod encoder;
mod ffmpeg;
mod png;

pub use builder::{FrameStatus, VideoBuilder, VideoBuilderOpts, MIN_PREVIEW_INTERVAL};
pub use encoder::{AudioInput, Encoder, EncoderConfig, InMemoryEncoder};
pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderOpts, encode_audio_file, ensure_parent_dir};
pub use png::PngSequenceEncoder;
