//! Frame compositor: which clips occupy a frame, how their layers blend, and the structural
//! identity of a frame.

mod compose;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clip::{Clip, ClipInfo};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::foundation::hash::StableHasher;
use crate::picture::Picture;

pub use compose::{compose_frame, mixture_layers};

/// Hash of a frame no clip occupies.
pub const NULL_FRAME_HASH: &str = "nullframe";

/// Default tolerance of [`find_overlaps`], in frames.
pub const DEFAULT_ALLOWED_OVERLAP: u64 = 5;

/// One clip's picture for one frame, before effects.
#[derive(Clone, Debug)]
pub struct LayerFrame {
    pub clip: Arc<Clip>,
    pub picture: Picture,
}

/// Drawable clips occupying `frame`, ascending by layer. Layer conflicts are not checked.
pub fn clips_at(clips: &[Arc<Clip>], frame: FrameIndex) -> Vec<Arc<Clip>> {
    let mut out: Vec<Arc<Clip>> = clips
        .iter()
        .filter(|c| c.is_visual() && c.occupies(frame))
        .cloned()
        .collect();
    out.sort_by_key(|c| c.layer());
    out
}

/// Reject two clips sharing a layer. `clips` must be sorted by layer.
pub fn check_layers(clips: &[Arc<Clip>], frame: FrameIndex) -> FramecutResult<()> {
    for pair in clips.windows(2) {
        if pair[0].layer() == pair[1].layer() {
            return Err(FramecutError::SameLayer {
                layer: pair[0].layer(),
                frame: frame.0,
                first: pair[0].label(),
                second: pair[1].label(),
            });
        }
    }
    Ok(())
}

/// Pictures of every clip occupying `frame`, bottom layer first.
pub fn active_frames(
    clips: &[Arc<Clip>],
    frame: FrameIndex,
    width: u32,
    height: u32,
    force_resize: bool,
) -> FramecutResult<Vec<LayerFrame>> {
    let occupying = clips_at(clips, frame);
    check_layers(&occupying, frame)?;
    let mut out = Vec::with_capacity(occupying.len());
    for clip in occupying {
        if let Some(picture) = clip.frame(frame, width, height, force_resize)? {
            out.push(LayerFrame { clip, picture });
        }
    }
    Ok(out)
}

/// Structural hash of what occupies `frame`: clip placement, layering, source description and
/// effect parameters. Pixel data is never read.
pub fn frame_hash(clips: &[Arc<Clip>], frame: FrameIndex) -> FramecutResult<String> {
    let occupying = clips_at(clips, frame);
    check_layers(&occupying, frame)?;
    if occupying.is_empty() {
        return Ok(NULL_FRAME_HASH.to_string());
    }
    let mut h = StableHasher::new();
    h.write_u64(occupying.len() as u64);
    for clip in &occupying {
        clip.hash_into(&mut h)?;
        // Continuous effects make the content depend on the position inside the clip.
        let relative = clip.relative_frame_index(frame)?;
        h.write_u64(relative.map_or(u64::MAX, |r| r));
    }
    Ok(h.finish().to_hex())
}

/// Two clips on one layer overlapping by more than the tolerance.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct OverlapInfo {
    /// `"id (name)"` of the earlier clip.
    pub clip_a: String,
    pub clip_b: String,
    pub overlap_frames: u64,
    pub layer: u32,
}

impl std::fmt::Display for OverlapInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "layer {}: {} overlaps {} by {} frame(s)",
            self.layer, self.clip_a, self.clip_b, self.overlap_frames
        )
    }
}

/// Advisory check over draft data: per layer, clips sorted by start whose ranges overlap by
/// more than `allowed` frames.
pub fn find_overlaps<'a>(
    clips: impl IntoIterator<Item = &'a ClipInfo>,
    allowed: u64,
) -> Vec<OverlapInfo> {
    let mut layers: BTreeMap<u32, Vec<&ClipInfo>> = BTreeMap::new();
    for c in clips {
        layers.entry(c.layer_index).or_default().push(c);
    }

    let mut out = Vec::new();
    for (layer, mut group) in layers {
        group.sort_by_key(|c| c.start_frame);
        for (i, a) in group.iter().enumerate() {
            let a_end = a.end_frame().unwrap_or(u64::MAX);
            for b in &group[i + 1..] {
                if b.start_frame >= a_end {
                    break;
                }
                let b_end = b.end_frame().unwrap_or(u64::MAX);
                let overlap = a_end.min(b_end) - b.start_frame;
                if overlap > allowed {
                    out.push(OverlapInfo {
                        clip_a: a.label(),
                        clip_b: b.label(),
                        overlap_frames: overlap,
                        layer,
                    });
                }
            }
        }
    }
    out
}

pub fn has_overlap<'a>(clips: impl IntoIterator<Item = &'a ClipInfo>, allowed: u64) -> bool {
    !find_overlaps(clips, allowed).is_empty()
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/timeline.rs"]
mod tests;
