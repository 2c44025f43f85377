//! JSON project files: canvas settings, the clip list and sound tracks.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::{AudioComposer, SoundTrack};
use crate::clip::{Clip, ClipInfo, ClipKind, PhotoSource, TextEntry, TextSource, VideoSource};
use crate::effects::EffectRegistry;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{FramecutError, FramecutResult};

/// Opaque or translucent colour behind the text of a text clip.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Backdrop {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    #[serde(default = "opaque")]
    pub a: f32,
}

fn opaque() -> f32 {
    1.0
}

/// One clip as written in a project file.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClipSpec {
    SolidColor {
        common: ClipInfo,
        r: u16,
        g: u16,
        b: u16,
        #[serde(default)]
        a: Option<f32>,
    },
    Text {
        common: ClipInfo,
        entries: Vec<TextEntry>,
        #[serde(default)]
        backdrop: Option<Backdrop>,
    },
    /// Still image read from `common.file_path`.
    Photo { common: ClipInfo },
    /// Video read from `common.file_path`; its audio is mixed as well.
    Video { common: ClipInfo },
    /// Audio read from `common.file_path`; never drawn.
    Audio { common: ClipInfo },
}

impl ClipSpec {
    pub fn common(&self) -> &ClipInfo {
        match self {
            Self::SolidColor { common, .. }
            | Self::Text { common, .. }
            | Self::Photo { common }
            | Self::Video { common }
            | Self::Audio { common } => common,
        }
    }

    fn common_mut(&mut self) -> &mut ClipInfo {
        match self {
            Self::SolidColor { common, .. }
            | Self::Text { common, .. }
            | Self::Photo { common }
            | Self::Video { common }
            | Self::Audio { common } => common,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SolidColor { .. } => "solid_color",
            Self::Text { .. } => "text",
            Self::Photo { .. } => "photo",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
        }
    }

    fn needs_file(&self) -> bool {
        matches!(
            self,
            Self::Photo { .. } | Self::Video { .. } | Self::Audio { .. }
        )
    }

    /// Build the runtime clip.
    pub fn to_clip(&self) -> FramecutResult<Clip> {
        let info = self.common().clone();
        let file = || {
            info.file_path.clone().ok_or_else(|| {
                FramecutError::validation(format!(
                    "{} clip '{}' needs a file_path",
                    self.type_name(),
                    info.label()
                ))
            })
        };
        let kind = match self {
            Self::SolidColor { r, g, b, a, .. } => {
                return Ok(Clip::solid_color(info, [*r, *g, *b], *a));
            }
            Self::Text {
                entries, backdrop, ..
            } => {
                let mut source = TextSource::new(entries.clone());
                if let Some(bd) = backdrop {
                    source = source.with_backdrop([bd.r, bd.g, bd.b], bd.a);
                }
                ClipKind::Text(source)
            }
            Self::Photo { .. } => ClipKind::Photo(PhotoSource::new(file()?)),
            Self::Video { .. } => ClipKind::Video(VideoSource::new(file()?, info.frame_time)),
            Self::Audio { .. } => {
                file()?;
                ClipKind::Audio
            }
        };
        Ok(Clip::new(info, kind))
    }
}

fn default_fps() -> Fps {
    Fps::default()
}

/// A complete, render-ready project.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: Fps,
    /// Frames to render; `None` renders up to the end of the last bounded clip.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub clips: Vec<ClipSpec>,
    #[serde(default)]
    pub sound_tracks: Vec<SoundTrack>,
}

impl Project {
    /// Parse a project from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> FramecutResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| FramecutError::validation(format!("parse project JSON: {e}")))
    }

    pub fn from_json(s: &str) -> FramecutResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| FramecutError::validation(format!("parse project JSON: {e}")))
    }

    /// Parse a project file; relative clip paths are resolved against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> FramecutResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            FramecutError::validation(format!("open project JSON '{}': {e}", path.display()))
        })?;
        let mut project = Self::from_reader(BufReader::new(f))?;
        if let Some(dir) = path.parent() {
            project.resolve_paths(dir);
        }
        Ok(project)
    }

    /// Make relative `file_path`s absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for spec in &mut self.clips {
            let common = spec.common_mut();
            if let Some(p) = common.file_path.as_ref()
                && p.is_relative()
            {
                common.file_path = Some(base.join(p));
            }
        }
    }

    pub fn canvas(&self) -> FramecutResult<Canvas> {
        Canvas::new(self.width, self.height)
    }

    /// Check sizes, clip ids, file references, sound-track bindings and every effect descriptor.
    pub fn validate(&self, registry: &EffectRegistry) -> FramecutResult<()> {
        self.canvas()?;
        Fps::new(self.fps.num, self.fps.den)?;
        let tracks: HashSet<&str> = self.sound_tracks.iter().map(|t| t.id.as_str()).collect();
        let mut ids = HashSet::new();
        for spec in &self.clips {
            let info = spec.common();
            if info.id.is_empty() {
                return Err(FramecutError::validation(format!(
                    "{} clip without an id",
                    spec.type_name()
                )));
            }
            if !ids.insert(info.id.as_str()) {
                return Err(FramecutError::validation(format!(
                    "duplicate clip id '{}'",
                    info.id
                )));
            }
            if spec.needs_file() && info.file_path.is_none() {
                return Err(FramecutError::validation(format!(
                    "{} clip '{}' needs a file_path",
                    spec.type_name(),
                    info.label()
                )));
            }
            if let Some(track) = info.bound_sound_track.as_deref()
                && !tracks.contains(track)
            {
                return Err(FramecutError::validation(format!(
                    "clip '{}' is bound to unknown sound track '{track}'",
                    info.label()
                )));
            }
            for effect in &info.effects {
                registry.validate(effect).map_err(|e| {
                    FramecutError::validation(format!(
                        "clip '{}' effect '{}': {e}",
                        info.label(),
                        effect.type_name
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Runtime clips in file order.
    pub fn build_clips(&self) -> FramecutResult<Vec<Arc<Clip>>> {
        self.clips
            .iter()
            .map(|spec| spec.to_clip().map(Arc::new))
            .collect()
    }

    pub fn clip_infos(&self) -> impl Iterator<Item = &ClipInfo> {
        self.clips.iter().map(ClipSpec::common)
    }

    /// Audio composer matching the project frame rate and duration.
    pub fn audio_composer(&self, sample_rate: u32, channels: u16) -> AudioComposer {
        let composer = AudioComposer::new(self.fps, sample_rate, channels);
        match self.duration {
            Some(d) => composer.with_total_frames(d),
            None => composer,
        }
    }

    /// Every file a clip reads from.
    pub fn referenced_files(&self) -> Vec<PathBuf> {
        self.clip_infos()
            .filter_map(|c| c.file_path.clone())
            .collect()
    }
}
