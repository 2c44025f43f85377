use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clip::ClipSource;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::media::{self, MediaInfo};
use crate::picture::Picture;

/// One colour over the whole render target.
#[derive(Clone, Debug, PartialEq)]
pub struct SolidColorSource {
    rgb: [u16; 3],
    alpha: Option<f32>,
}

impl SolidColorSource {
    /// 16-bit colour components; `None` alpha is opaque.
    pub fn new(rgb: [u16; 3], alpha: Option<f32>) -> Self {
        Self { rgb, alpha }
    }
}

impl ClipSource for SolidColorSource {
    fn kind_name(&self) -> &str {
        "solid_color"
    }

    fn frame_at(&self, _relative: u64, width: u32, height: u32) -> FramecutResult<Picture> {
        Picture::solid(width, height, self.rgb, self.alpha)
    }

    fn describe(&self) -> String {
        format!(
            "solid_color:{},{},{}:{:?}",
            self.rgb[0], self.rgb[1], self.rgb[2], self.alpha
        )
    }
}

/// A still image, decoded once and held at its native size.
#[derive(Clone, Debug)]
pub struct PhotoSource {
    path: PathBuf,
    cached: Arc<Mutex<Option<Picture>>>,
}

impl PhotoSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Source backed by an already decoded picture.
    pub fn from_picture(path: impl Into<PathBuf>, picture: Picture) -> Self {
        Self {
            path: path.into(),
            cached: Arc::new(Mutex::new(Some(picture))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClipSource for PhotoSource {
    fn kind_name(&self) -> &str {
        "photo"
    }

    fn frame_at(&self, _relative: u64, _width: u32, _height: u32) -> FramecutResult<Picture> {
        let mut cached = self.cached.lock();
        if let Some(p) = cached.as_ref() {
            return Ok(p.clone());
        }
        let picture = Picture::load(&self.path)
            .map_err(|e| FramecutError::decode(format!("{}: {e}", self.path.display())))?;
        *cached = Some(picture.clone());
        Ok(picture)
    }

    fn describe(&self) -> String {
        format!("photo:{}", self.path.display())
    }

    fn reinit(&self) -> FramecutResult<()> {
        let picture = Picture::load(&self.path)
            .map_err(|e| FramecutError::decode(format!("{}: {e}", self.path.display())))?;
        *self.cached.lock() = Some(picture);
        Ok(())
    }

    fn release(&self) {
        self.cached.lock().take();
    }
}

const VIDEO_CACHE_CAPACITY: usize = 64;
const VIDEO_PREFETCH_FRAMES: u32 = 12;

/// Video file decoded through the system `ffmpeg`.
///
/// Frames are decoded in aligned batches and kept in a small LRU cache, which suits the
/// ascending access pattern of the preparer.
#[derive(Clone, Debug)]
pub struct VideoSource {
    path: PathBuf,
    frame_time: f64,
    state: Arc<Mutex<VideoState>>,
}

#[derive(Debug, Default)]
struct VideoState {
    info: Option<MediaInfo>,
    frames: HashMap<u64, Picture>,
    lru: VecDeque<u64>,
}

impl VideoState {
    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.lru.iter().position(|&k| k == key) {
            self.lru.remove(pos);
        }
        self.lru.push_back(key);
    }

    fn insert(&mut self, key: u64, picture: Picture) {
        self.frames.insert(key, picture);
        self.touch(key);
        while self.lru.len() > VIDEO_CACHE_CAPACITY {
            if let Some(old) = self.lru.pop_front() {
                self.frames.remove(&old);
            }
        }
    }

    fn clear(&mut self) {
        self.info = None;
        self.frames.clear();
        self.lru.clear();
    }
}

impl VideoSource {
    /// `frame_time` is seconds per source frame; 0 uses the probed frame rate.
    pub fn new(path: impl Into<PathBuf>, frame_time: f64) -> Self {
        Self {
            path: path.into(),
            frame_time,
            state: Arc::new(Mutex::new(VideoState::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seconds_per_frame(&self, info: &MediaInfo) -> f64 {
        if self.frame_time.is_finite() && self.frame_time > 0.0 {
            return self.frame_time;
        }
        match info.frame_rate {
            Some(fps) if fps > 0.0 => 1.0 / fps,
            _ => 1.0 / 30.0,
        }
    }
}

impl ClipSource for VideoSource {
    fn kind_name(&self) -> &str {
        "video"
    }

    fn frame_at(&self, relative: u64, _width: u32, _height: u32) -> FramecutResult<Picture> {
        let mut state = self.state.lock();
        if let Some(p) = state.frames.get(&relative).cloned() {
            state.touch(relative);
            return Ok(p);
        }

        let info = match &state.info {
            Some(info) => info.clone(),
            None => {
                let info = media::probe(&self.path)?;
                state.info = Some(info.clone());
                info
            }
        };
        let (w, h) = info.video_size.ok_or_else(|| {
            FramecutError::decode(format!("'{}' has no video stream", self.path.display()))
        })?;

        let spf = self.seconds_per_frame(&info);
        let batch_start = relative - relative % u64::from(VIDEO_PREFETCH_FRAMES);
        let frames = media::decode_video_frames_rgba8(
            &info,
            (batch_start as f64) * spf,
            VIDEO_PREFETCH_FRAMES,
        )?;
        tracing::debug!(
            path = %self.path.display(),
            batch_start,
            decoded = frames.len(),
            "decoded video batch"
        );
        for (offset, rgba) in frames.iter().enumerate() {
            let picture = Picture::from_rgba8(w, h, rgba)?
                .with_step(format!("video {} #{}", self.path.display(), batch_start + offset as u64));
            state.insert(batch_start + offset as u64, picture);
        }

        state.frames.get(&relative).cloned().ok_or_else(|| {
            FramecutError::decode(format!(
                "'{}' has no frame {relative}",
                self.path.display()
            ))
        })
    }

    fn source_length(&self) -> Option<u64> {
        let state = self.state.lock();
        let info = state.info.as_ref()?;
        let secs = info.duration_secs?;
        Some((secs / self.seconds_per_frame(info)).floor() as u64)
    }

    fn describe(&self) -> String {
        format!("video:{}:{}", self.path.display(), self.frame_time)
    }

    fn reinit(&self) -> FramecutResult<()> {
        let info = media::probe(&self.path)?;
        let mut state = self.state.lock();
        state.clear();
        state.info = Some(info);
        Ok(())
    }

    fn release(&self) {
        self.state.lock().clear();
    }
}
