use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::encode::encoder::{Encoder, EncoderConfig};
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::picture::{BitDepth, Picture};

/// Writes every frame as a 16-bit RGBA PNG named `NNNNNN.png` inside a directory.
#[derive(Debug)]
pub struct PngSequenceEncoder {
    dir: PathBuf,
    cfg: Option<EncoderConfig>,
    next: u64,
}

impl PngSequenceEncoder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cfg: None,
            next: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the frame with output index `index` is written to.
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{index:06}.png"))
    }
}

impl Encoder for PngSequenceEncoder {
    fn initialize(&mut self, cfg: EncoderConfig) -> FramecutResult<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create output directory '{}'", self.dir.display()))?;
        self.cfg = Some(cfg);
        self.next = 0;
        Ok(())
    }

    fn append(&mut self, frame: &Picture) -> FramecutResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| FramecutError::evaluation("png sequence encoder not initialized"))?;
        cfg.check_frame(frame)?;
        let path = self.frame_path(self.next);
        frame.clone().to_bit_depth(BitDepth::Sixteen).save_png(&path)?;
        self.next += 1;
        Ok(())
    }

    fn finish(&mut self) -> FramecutResult<()> {
        tracing::debug!(frames = self.next, dir = %self.dir.display(), "png sequence written");
        self.cfg = None;
        Ok(())
    }

    fn codec_name(&self) -> &str {
        "png16"
    }
}
