use std::path::PathBuf;

use crate::foundation::core::Fps;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::picture::{BitDepth, Picture};

/// Stream parameters handed to an [`Encoder`] before the first frame.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    /// Sample depth written to the encoder input.
    pub bit_depth: BitDepth,
    /// Optional raw PCM track muxed next to the video.
    pub audio: Option<AudioInput>,
}

impl EncoderConfig {
    pub fn new(width: u32, height: u32, fps: Fps) -> Self {
        Self {
            width,
            height,
            fps,
            bit_depth: BitDepth::Sixteen,
            audio: None,
        }
    }

    pub fn with_bit_depth(mut self, depth: BitDepth) -> Self {
        self.bit_depth = depth;
        self
    }

    pub fn with_audio(mut self, audio: AudioInput) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Reject a frame whose dimensions differ from the configured stream.
    pub fn check_frame(&self, frame: &Picture) -> FramecutResult<()> {
        if frame.size() != (self.width, self.height) {
            return Err(FramecutError::size_mismatch(
                frame.size(),
                (self.width, self.height),
            ));
        }
        Ok(())
    }
}

/// Interleaved `f32le` PCM file fed to the encoder as a second input.
#[derive(Clone, Debug)]
pub struct AudioInput {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Sink for composed frames.
///
/// `append` receives frames in output order, one call per index, and must reject frames whose
/// size does not match the configured stream.
pub trait Encoder: Send {
    /// Called once before any frame is appended.
    fn initialize(&mut self, cfg: EncoderConfig) -> FramecutResult<()>;
    /// Write the next frame.
    fn append(&mut self, frame: &Picture) -> FramecutResult<()>;
    /// Flush and close the output.
    fn finish(&mut self) -> FramecutResult<()>;
    /// Short name of the output format, e.g. `libx264`.
    fn codec_name(&self) -> &str;
}

impl<E: Encoder + ?Sized> Encoder for &mut E {
    fn initialize(&mut self, cfg: EncoderConfig) -> FramecutResult<()> {
        (**self).initialize(cfg)
    }

    fn append(&mut self, frame: &Picture) -> FramecutResult<()> {
        (**self).append(frame)
    }

    fn finish(&mut self) -> FramecutResult<()> {
        (**self).finish()
    }

    fn codec_name(&self) -> &str {
        (**self).codec_name()
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn initialize(&mut self, cfg: EncoderConfig) -> FramecutResult<()> {
        (**self).initialize(cfg)
    }

    fn append(&mut self, frame: &Picture) -> FramecutResult<()> {
        (**self).append(frame)
    }

    fn finish(&mut self) -> FramecutResult<()> {
        (**self).finish()
    }

    fn codec_name(&self) -> &str {
        (**self).codec_name()
    }
}

/// Keeps every appended frame in memory, in append order.
#[derive(Debug, Default)]
pub struct InMemoryEncoder {
    cfg: Option<EncoderConfig>,
    frames: Vec<Picture>,
    finished: bool,
}

impl InMemoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder already initialized for a `width`x`height` stream.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            cfg: Some(EncoderConfig::new(width, height, Fps::default())),
            ..Self::default()
        }
    }

    pub fn config(&self) -> Option<&EncoderConfig> {
        self.cfg.as_ref()
    }

    pub fn frames(&self) -> &[Picture] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Picture> {
        self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Encoder for InMemoryEncoder {
    fn initialize(&mut self, cfg: EncoderConfig) -> FramecutResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.finished = false;
        Ok(())
    }

    fn append(&mut self, frame: &Picture) -> FramecutResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| FramecutError::evaluation("in-memory encoder not initialized"))?;
        if self.finished {
            return Err(FramecutError::evaluation("in-memory encoder is already finished"));
        }
        cfg.check_frame(frame)?;
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> FramecutResult<()> {
        self.finished = true;
        Ok(())
    }

    fn codec_name(&self) -> &str {
        "memory"
    }
}
