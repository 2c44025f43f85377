use std::collections::HashMap;
use std::sync::Arc;

use crate::audio::{AudioBuffer, SoundTrack};
use crate::clip::Clip;
use crate::foundation::core::Fps;
use crate::foundation::error::FramecutResult;

/// Mixes the audio of every clip into one timeline-length buffer.
#[derive(Clone, Debug)]
pub struct AudioComposer {
    fps: Fps,
    sample_rate: u32,
    channels: u16,
    total_frames: Option<u64>,
}

impl AudioComposer {
    pub fn new(fps: Fps, sample_rate: u32, channels: u16) -> Self {
        Self {
            fps,
            sample_rate,
            channels,
            total_frames: None,
        }
    }

    /// Fix the output length instead of deriving it from the furthest clip end.
    pub fn with_total_frames(mut self, frames: u64) -> Self {
        self.total_frames = Some(frames);
        self
    }

    /// Compose the timeline. Clips without audio are ignored and clips whose audio fails to
    /// decode are skipped with a warning.
    #[tracing::instrument(level = "debug", skip_all, fields(clips = clips.len()))]
    pub fn compose(
        &self,
        clips: &[Arc<Clip>],
        sound_tracks: &[SoundTrack],
    ) -> FramecutResult<AudioBuffer> {
        let total_frames = self.total_frames.unwrap_or_else(|| {
            clips
                .iter()
                .filter_map(|c| c.info().end_frame())
                .max()
                .unwrap_or(0)
        });
        let total_samples = self.fps.frames_to_samples(total_frames, self.sample_rate) as usize;
        let mut out = AudioBuffer::silent(self.channels, total_samples, self.sample_rate)?;

        let volumes: HashMap<&str, f32> = sound_tracks
            .iter()
            .map(|t| (t.id.as_str(), t.volume))
            .collect();

        for clip in clips {
            let Some(source) = clip.audio_source() else {
                continue;
            };
            let info = clip.info();
            let duration = (info.duration > 0).then_some(info.duration);
            let samples = match source
                .samples(info.relative_start_frame, duration, self.fps)
                .and_then(|b| b.resample(self.sample_rate))
            {
                Ok(b) => b.stretch(info.ratio()),
                Err(e) => {
                    tracing::warn!(clip = %clip.label(), error = %e, "skipping clip audio");
                    continue;
                }
            };
            source.release();
            if samples.sample_count() == 0 {
                continue;
            }

            let volume = match info.bound_sound_track.as_deref() {
                Some(track) => volumes.get(track).copied().unwrap_or_else(|| {
                    tracing::debug!(clip = %clip.label(), track, "unknown sound track, volume 1.0");
                    1.0
                }),
                None => 1.0,
            };
            let offset = self.fps.frames_to_samples(info.start_frame, self.sample_rate) as usize;
            mix_into(&mut out, &samples, offset, volume);
        }

        for ch in 0..out.channel_count() as usize {
            if let Some(c) = out.channel_mut(ch) {
                for s in c.iter_mut() {
                    *s = s.clamp(-1.0, 1.0);
                }
            }
        }
        Ok(out)
    }
}

/// Add `src * volume` into `dst` from `offset`. Output channel `c` reads source channel
/// `min(c, src_channels - 1)`, which also broadcasts mono to every channel.
fn mix_into(dst: &mut AudioBuffer, src: &AudioBuffer, offset: usize, volume: f32) {
    let src_channels = src.channel_count() as usize;
    for ch in 0..dst.channel_count() as usize {
        let Some(from) = src.channel(ch.min(src_channels - 1)) else {
            continue;
        };
        let Some(to) = dst.channel_mut(ch) else {
            continue;
        };
        if offset >= to.len() {
            continue;
        }
        for (d, s) in to[offset..].iter_mut().zip(from) {
            *d += s * volume;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/composer.rs"]
mod tests;
