//! Timeline clips: placement in timeline space plus a concrete frame source.

mod sources;
mod text;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::audio::{AudioSource, FfmpegAudioSource};
use crate::effects::{EffectSpec, MixtureMode};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::foundation::hash::StableHasher;
use crate::picture::Picture;

pub use sources::{PhotoSource, SolidColorSource, VideoSource};
pub use text::{TextEntry, TextSource};

/// Placement and playback properties shared by every clip variant.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ClipInfo {
    pub id: String,
    pub name: String,
    /// Higher layers are drawn later, on top.
    pub layer_index: u32,
    pub start_frame: u64,
    /// In-point inside the source, in source frames.
    pub relative_start_frame: u64,
    /// Length in source frames; 0 means unbounded.
    pub duration: u64,
    /// Seconds per source frame; 0 lets the source decide.
    pub frame_time: f64,
    /// Playback-speed multiplier. The clip covers `duration * ratio` timeline frames.
    pub second_per_frame_ratio: f64,
    pub mixture_mode: MixtureMode,
    pub mixture_args: BTreeMap<String, serde_json::Value>,
    pub effects: Vec<EffectSpec>,
    pub bound_sound_track: Option<String>,
    pub file_path: Option<PathBuf>,
}

impl Default for ClipInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            layer_index: 0,
            start_frame: 0,
            relative_start_frame: 0,
            duration: 0,
            frame_time: 0.0,
            second_per_frame_ratio: 1.0,
            mixture_mode: MixtureMode::Overlay,
            mixture_args: BTreeMap::new(),
            effects: Vec::new(),
            bound_sound_track: None,
            file_path: None,
        }
    }
}

impl ClipInfo {
    pub fn new(id: impl Into<String>, layer_index: u32, start_frame: u64, duration: u64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            layer_index,
            start_frame,
            duration,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.second_per_frame_ratio = ratio;
        self
    }

    pub fn with_relative_start(mut self, frame: u64) -> Self {
        self.relative_start_frame = frame;
        self
    }

    pub fn with_mixture(mut self, mode: MixtureMode) -> Self {
        self.mixture_mode = mode;
        self
    }

    pub fn with_effect(mut self, spec: EffectSpec) -> Self {
        self.effects.push(spec);
        self
    }

    pub fn with_sound_track(mut self, track: impl Into<String>) -> Self {
        self.bound_sound_track = Some(track.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Effective speed ratio; non-positive or non-finite values read as 1.
    pub fn ratio(&self) -> f64 {
        let r = self.second_per_frame_ratio;
        if r.is_finite() && r > 0.0 { r } else { 1.0 }
    }

    /// Timeline frames covered by the clip, `None` when unbounded.
    pub fn span(&self) -> Option<u64> {
        if self.duration == 0 {
            return None;
        }
        Some(((self.duration as f64) * self.ratio()).round() as u64)
    }

    /// Exclusive timeline end, `None` when unbounded.
    pub fn end_frame(&self) -> Option<u64> {
        self.span().map(|s| self.start_frame.saturating_add(s))
    }

    /// `"id (name)"`, used in error messages and diagnostics.
    pub fn label(&self) -> String {
        format!("{} ({})", self.id, self.name)
    }
}

/// Source decode contract: produce the frame at a source-relative index.
///
/// Implementations must not remap or range-check the index; [`Clip`] owns that.
pub trait ClipSource: Send + Sync + fmt::Debug {
    /// Short variant name, e.g. `"video"`.
    fn kind_name(&self) -> &str;

    /// Frame at `relative`. `width`/`height` is the render target; sources may return any size.
    fn frame_at(&self, relative: u64, width: u32, height: u32) -> FramecutResult<Picture>;

    /// Number of frames the source can produce, `None` when unbounded or unknown.
    fn source_length(&self) -> Option<u64> {
        None
    }

    /// Structural description folded into frame hashes.
    fn describe(&self) -> String {
        self.kind_name().to_string()
    }

    /// Re-open the underlying source. Idempotent.
    fn reinit(&self) -> FramecutResult<()> {
        Ok(())
    }

    /// Drop decoder handles and caches.
    fn release(&self) {}
}

#[derive(Clone, Debug)]
pub enum ClipKind {
    SolidColor(SolidColorSource),
    Text(TextSource),
    Photo(PhotoSource),
    Video(VideoSource),
    /// Audio-only clip; never drawn.
    Audio,
    Plugin(Arc<dyn ClipSource>),
}

impl ClipKind {
    pub fn name(&self) -> &str {
        match self {
            Self::SolidColor(s) => s.kind_name(),
            Self::Text(s) => s.kind_name(),
            Self::Photo(s) => s.kind_name(),
            Self::Video(s) => s.kind_name(),
            Self::Audio => "audio",
            Self::Plugin(s) => s.kind_name(),
        }
    }

    fn source(&self) -> Option<&dyn ClipSource> {
        match self {
            Self::SolidColor(s) => Some(s),
            Self::Text(s) => Some(s),
            Self::Photo(s) => Some(s),
            Self::Video(s) => Some(s),
            Self::Audio => None,
            Self::Plugin(s) => Some(s.as_ref()),
        }
    }
}

/// One timeline element. Immutable for the duration of a render pass.
#[derive(Clone, Debug)]
pub struct Clip {
    info: ClipInfo,
    kind: ClipKind,
    audio: Option<Arc<dyn AudioSource>>,
}

impl Clip {
    pub fn new(info: ClipInfo, kind: ClipKind) -> Self {
        Self {
            info,
            kind,
            audio: None,
        }
    }

    pub fn solid_color(info: ClipInfo, rgb: [u16; 3], alpha: Option<f32>) -> Self {
        Self::new(info, ClipKind::SolidColor(SolidColorSource::new(rgb, alpha)))
    }

    pub fn plugin(info: ClipInfo, source: Arc<dyn ClipSource>) -> Self {
        Self::new(info, ClipKind::Plugin(source))
    }

    /// Attach an explicit audio source, replacing the file-based default.
    pub fn with_audio(mut self, audio: Arc<dyn AudioSource>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn info(&self) -> &ClipInfo {
        &self.info
    }

    pub fn kind(&self) -> &ClipKind {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn layer(&self) -> u32 {
        self.info.layer_index
    }

    pub fn label(&self) -> String {
        self.info.label()
    }

    /// `true` when the clip is drawable (not audio-only).
    pub fn is_visual(&self) -> bool {
        self.kind.source().is_some()
    }

    /// `start <= frame <= start + span`. The inclusive end tolerates rounding of the span.
    pub fn is_active(&self, frame: FrameIndex) -> bool {
        frame.0 >= self.info.start_frame && self.info.end_frame().is_none_or(|end| frame.0 <= end)
    }

    /// `true` when the clip contributes a picture at `frame`, i.e. `start <= frame < start + span`.
    pub fn occupies(&self, frame: FrameIndex) -> bool {
        frame.0 >= self.info.start_frame && self.info.end_frame().is_none_or(|end| frame.0 < end)
    }

    /// Map a timeline frame to a source-relative frame.
    ///
    /// Returns `Ok(None)` exactly on the one-past-end boundary and an out-of-range error for
    /// any other frame outside the clip.
    pub fn relative_frame_index(&self, target: FrameIndex) -> FramecutResult<Option<u64>> {
        let info = &self.info;
        let offset = target.0 as i128 - info.start_frame as i128;
        let span = info.span();
        if span.is_some_and(|s| offset == s as i128) {
            return Ok(None);
        }
        if offset < 0 || span.is_some_and(|s| offset > s as i128) {
            return Err(FramecutError::FrameOutOfRange {
                clip: info.label(),
                target: target.0,
                start: info.start_frame,
                end: info.end_frame().unwrap_or(u64::MAX),
            });
        }
        let local = ((offset as f64) / info.ratio()).round() as u64;
        Ok(Some(info.relative_start_frame.saturating_add(local)))
    }

    /// Picture for `target`, or `None` on the boundary frame and for audio-only clips.
    pub fn frame(
        &self,
        target: FrameIndex,
        width: u32,
        height: u32,
        force_resize: bool,
    ) -> FramecutResult<Option<Picture>> {
        let Some(source) = self.kind.source() else {
            return Ok(None);
        };
        let Some(relative) = self.relative_frame_index(target)? else {
            return Ok(None);
        };
        let picture = source.frame_at(relative, width, height)?;
        if force_resize && picture.size() != (width, height) {
            return picture.resize(width, height, false).map(Some);
        }
        Ok(Some(picture))
    }

    /// Frames the source can produce, `None` when unbounded.
    pub fn clip_length(&self) -> Option<u64> {
        match self.kind.source() {
            Some(source) => source.source_length(),
            None => None,
        }
    }

    /// Audio for this clip: an attached source, else the clip's media file for audio and
    /// video clips.
    pub fn audio_source(&self) -> Option<Arc<dyn AudioSource>> {
        if let Some(a) = &self.audio {
            return Some(Arc::clone(a));
        }
        match (&self.kind, &self.info.file_path) {
            (ClipKind::Audio | ClipKind::Video(_), Some(path)) => {
                Some(Arc::new(FfmpegAudioSource::new(path.clone())))
            }
            _ => None,
        }
    }

    pub fn reinit(&self) -> FramecutResult<()> {
        match self.kind.source() {
            Some(source) => source.reinit(),
            None => Ok(()),
        }
    }

    pub fn release(&self) {
        if let Some(source) = self.kind.source() {
            source.release();
        }
        if let Some(a) = &self.audio {
            a.release();
        }
    }

    /// Fold the structural description of this clip into `h`. Pixel data is never read.
    pub(crate) fn hash_into(&self, h: &mut StableHasher) -> FramecutResult<()> {
        let info = serde_json::to_vec(&self.info)
            .map_err(|e| FramecutError::evaluation(format!("clip serialization failed: {e}")))?;
        h.write_str(self.kind.name());
        h.write_u64(info.len() as u64);
        h.write_bytes(&info);
        if let Some(source) = self.kind.source() {
            h.write_str(&source.describe());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/clip/clip.rs"]
mod tests;
