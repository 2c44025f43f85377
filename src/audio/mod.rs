//! PCM buffers, per-clip audio sources and the timeline audio mixer.

mod composer;
mod source;

use std::io::Write;
use std::path::Path;

use crate::foundation::error::{FramecutError, FramecutResult};

pub use composer::AudioComposer;
pub use source::{AudioSource, FfmpegAudioSource, MemoryAudioSource};

/// Planar `f32` PCM, nominally within `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Silent buffer of `samples` frames per channel.
    pub fn silent(channels: u16, samples: usize, sample_rate: u32) -> FramecutResult<Self> {
        check_format(channels, sample_rate)?;
        Ok(Self {
            sample_rate,
            channels: vec![vec![0.0; samples]; channels as usize],
        })
    }

    pub fn from_planar(channels: Vec<Vec<f32>>, sample_rate: u32) -> FramecutResult<Self> {
        check_format(u16::try_from(channels.len()).unwrap_or(0), sample_rate)?;
        let len = channels[0].len();
        if channels.iter().any(|c| c.len() != len) {
            return Err(FramecutError::validation(
                "audio channels must hold the same number of samples",
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn from_interleaved(data: &[f32], channels: u16, sample_rate: u32) -> FramecutResult<Self> {
        check_format(channels, sample_rate)?;
        let n = channels as usize;
        if data.len() % n != 0 {
            return Err(FramecutError::validation(format!(
                "interleaved audio of {} samples does not divide into {n} channels",
                data.len()
            )));
        }
        let mut planar = vec![Vec::with_capacity(data.len() / n); n];
        for frame in data.chunks_exact(n) {
            for (ch, &s) in frame.iter().enumerate() {
                planar[ch].push(s);
            }
        }
        Ok(Self {
            sample_rate,
            channels: planar,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples per channel.
    pub fn sample_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub(crate) fn channel_mut(&mut self, index: usize) -> Option<&mut Vec<f32>> {
        self.channels.get_mut(index)
    }

    /// Samples `[start, start + len)` of every channel, clipped to the buffer.
    pub fn slice(&self, start: usize, len: Option<usize>) -> Self {
        let total = self.sample_count();
        let start = start.min(total);
        let end = len.map_or(total, |l| start.saturating_add(l).min(total));
        Self {
            sample_rate: self.sample_rate,
            channels: self
                .channels
                .iter()
                .map(|c| c[start..end].to_vec())
                .collect(),
        }
    }

    /// Linear-interpolation resample to `target_rate`.
    pub fn resample(&self, target_rate: u32) -> FramecutResult<Self> {
        check_format(self.channel_count(), target_rate)?;
        if target_rate == self.sample_rate {
            return Ok(self.clone());
        }
        let len = ((self.sample_count() as u128 * u128::from(target_rate))
            / u128::from(self.sample_rate)) as usize;
        let step = f64::from(self.sample_rate) / f64::from(target_rate);
        Ok(Self {
            sample_rate: target_rate,
            channels: self
                .channels
                .iter()
                .map(|c| lerp_resample(c, len, step))
                .collect(),
        })
    }

    /// Stretch playback time by `ratio` (no pitch correction): the result holds
    /// `round(samples * ratio)` samples at the same rate.
    pub fn stretch(&self, ratio: f64) -> Self {
        if !ratio.is_finite() || ratio <= 0.0 || (ratio - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        let len = ((self.sample_count() as f64) * ratio).round() as usize;
        Self {
            sample_rate: self.sample_rate,
            channels: self
                .channels
                .iter()
                .map(|c| lerp_resample(c, len, 1.0 / ratio))
                .collect(),
        }
    }

    /// Interleave channels frame by frame.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let n = self.sample_count();
        let mut out = Vec::with_capacity(n * self.channels.len());
        for i in 0..n {
            for c in &self.channels {
                out.push(c[i]);
            }
        }
        out
    }

    /// Write interleaved little-endian `f32` PCM, the raw input format of the encoder.
    pub fn write_f32le(&self, path: &Path) -> FramecutResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                FramecutError::evaluation(format!("create audio output dir: {e}"))
            })?;
        }
        let file = std::fs::File::create(path)
            .map_err(|e| FramecutError::evaluation(format!("create '{}': {e}", path.display())))?;
        let mut w = std::io::BufWriter::new(file);
        for s in self.to_interleaved() {
            w.write_all(&s.to_le_bytes())
                .map_err(|e| FramecutError::evaluation(format!("write audio: {e}")))?;
        }
        w.flush()
            .map_err(|e| FramecutError::evaluation(format!("flush audio: {e}")))?;
        Ok(())
    }
}

fn check_format(channels: u16, sample_rate: u32) -> FramecutResult<()> {
    if channels == 0 {
        return Err(FramecutError::validation("audio needs at least one channel"));
    }
    if sample_rate == 0 {
        return Err(FramecutError::validation("audio sample rate must be > 0"));
    }
    Ok(())
}

fn lerp_resample(src: &[f32], len: usize, step: f64) -> Vec<f32> {
    if src.is_empty() {
        return vec![0.0; len];
    }
    let last = src.len() - 1;
    (0..len)
        .map(|i| {
            let pos = (i as f64) * step;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (pos - i0 as f64).clamp(0.0, 1.0) as f32;
            src[i0] + (src[i1] - src[i0]) * t
        })
        .collect()
}

/// Mixer bus a clip can be bound to.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SoundTrack {
    pub id: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

impl SoundTrack {
    pub fn new(id: impl Into<String>, volume: f32) -> Self {
        Self {
            id: id.into(),
            volume,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/buffer.rs"]
mod tests;
