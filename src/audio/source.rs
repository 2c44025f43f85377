use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::AudioBuffer;
use crate::foundation::core::Fps;
use crate::foundation::error::FramecutResult;
use crate::media;

/// Audio decode contract for one clip.
pub trait AudioSource: Send + Sync + fmt::Debug {
    /// Samples covering `duration` source frames from `relative_start`, both counted at
    /// `fps`. `None` reads to the end of the source.
    fn samples(
        &self,
        relative_start: u64,
        duration: Option<u64>,
        fps: Fps,
    ) -> FramecutResult<AudioBuffer>;

    /// Release decoded data.
    fn release(&self) {}
}

fn window(buffer: &AudioBuffer, relative_start: u64, duration: Option<u64>, fps: Fps) -> AudioBuffer {
    let rate = buffer.sample_rate();
    let start = fps.frames_to_samples(relative_start, rate) as usize;
    let len = duration.map(|d| fps.frames_to_samples(d, rate) as usize);
    buffer.slice(start, len)
}

/// Audio held in memory.
#[derive(Clone, Debug)]
pub struct MemoryAudioSource {
    buffer: AudioBuffer,
}

impl MemoryAudioSource {
    pub fn new(buffer: AudioBuffer) -> Self {
        Self { buffer }
    }
}

impl AudioSource for MemoryAudioSource {
    fn samples(
        &self,
        relative_start: u64,
        duration: Option<u64>,
        fps: Fps,
    ) -> FramecutResult<AudioBuffer> {
        Ok(window(&self.buffer, relative_start, duration, fps))
    }
}

const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_CHANNELS: u16 = 2;

/// First audio stream of a media file, decoded once at its native format via `ffmpeg`.
#[derive(Debug)]
pub struct FfmpegAudioSource {
    path: PathBuf,
    decoded: Mutex<Option<Arc<AudioBuffer>>>,
}

impl FfmpegAudioSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            decoded: Mutex::new(None),
        }
    }

    fn decoded(&self) -> FramecutResult<Arc<AudioBuffer>> {
        let mut slot = self.decoded.lock();
        if let Some(b) = slot.as_ref() {
            return Ok(Arc::clone(b));
        }
        let info = media::probe(&self.path)?;
        let rate = info.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let channels = info.channels.filter(|&c| c > 0).unwrap_or(DEFAULT_CHANNELS);
        let pcm = media::decode_audio_f32(&self.path, rate, channels)?;
        let buffer = Arc::new(AudioBuffer::from_interleaved(
            &pcm.interleaved,
            pcm.channels,
            pcm.sample_rate,
        )?);
        tracing::debug!(
            path = %self.path.display(),
            sample_rate = rate,
            channels,
            samples = buffer.sample_count(),
            "decoded clip audio"
        );
        *slot = Some(Arc::clone(&buffer));
        Ok(buffer)
    }
}

impl AudioSource for FfmpegAudioSource {
    fn samples(
        &self,
        relative_start: u64,
        duration: Option<u64>,
        fps: Fps,
    ) -> FramecutResult<AudioBuffer> {
        let buffer = self.decoded()?;
        Ok(window(&buffer, relative_start, duration, fps))
    }

    fn release(&self) {
        self.decoded.lock().take();
    }
}
