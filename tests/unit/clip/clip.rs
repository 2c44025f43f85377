use super::*;
use crate::foundation::hash::StableHasher;

fn solid(info: ClipInfo) -> Clip {
    Clip::solid_color(info, [1000, 2000, 3000], None)
}

#[derive(Debug)]
struct IndexEcho;

impl ClipSource for IndexEcho {
    fn kind_name(&self) -> &str {
        "echo"
    }

    // Encodes the relative index in the red channel so tests can read the mapping back.
    fn frame_at(&self, relative: u64, _width: u32, _height: u32) -> FramecutResult<Picture> {
        Picture::solid(3, 2, [relative as u16, 0, 0], None)
    }
}

#[test]
fn span_scales_duration_by_ratio() {
    let info = ClipInfo::new("a", 0, 10, 100).with_ratio(1.5);
    assert_eq!(info.span(), Some(150));
    assert_eq!(info.end_frame(), Some(160));
    assert_eq!(ClipInfo::new("b", 0, 10, 0).span(), None);
    assert_eq!(ClipInfo::new("c", 0, 0, 10).with_ratio(0.0).ratio(), 1.0);
}

#[test]
fn activity_includes_the_boundary_but_occupancy_does_not() {
    let clip = solid(ClipInfo::new("a", 0, 10, 20));
    assert!(!clip.is_active(FrameIndex(9)));
    assert!(clip.is_active(FrameIndex(10)));
    assert!(clip.is_active(FrameIndex(30)));
    assert!(!clip.is_active(FrameIndex(31)));
    assert!(clip.occupies(FrameIndex(29)));
    assert!(!clip.occupies(FrameIndex(30)));

    let unbounded = solid(ClipInfo::new("u", 0, 5, 0));
    assert!(unbounded.occupies(FrameIndex(1_000_000)));
}

#[test]
fn relative_index_maps_offset_and_in_point() {
    let clip = solid(ClipInfo::new("a", 0, 10, 20).with_relative_start(7));
    assert_eq!(clip.relative_frame_index(FrameIndex(10)).unwrap(), Some(7));
    assert_eq!(clip.relative_frame_index(FrameIndex(29)).unwrap(), Some(26));
    assert_eq!(clip.relative_frame_index(FrameIndex(30)).unwrap(), None);
}

#[test]
fn relative_index_divides_by_ratio_and_rounds() {
    let clip = solid(ClipInfo::new("a", 0, 0, 10).with_ratio(2.0));
    assert_eq!(clip.relative_frame_index(FrameIndex(0)).unwrap(), Some(0));
    assert_eq!(clip.relative_frame_index(FrameIndex(3)).unwrap(), Some(2));
    assert_eq!(clip.relative_frame_index(FrameIndex(19)).unwrap(), Some(10));
    assert_eq!(clip.relative_frame_index(FrameIndex(20)).unwrap(), None);
}

#[test]
fn out_of_range_targets_are_data_errors() {
    let clip = solid(ClipInfo::new("a", 0, 10, 20).with_name("Intro"));
    let before = clip.relative_frame_index(FrameIndex(9)).unwrap_err();
    assert!(before.is_data_error());
    assert!(before.to_string().contains("a (Intro)"));
    let after = clip.relative_frame_index(FrameIndex(31)).unwrap_err();
    assert!(matches!(
        after,
        FramecutError::FrameOutOfRange {
            target: 31,
            start: 10,
            end: 30,
            ..
        }
    ));
}

#[test]
fn frame_uses_source_and_optional_resize() {
    let clip = Clip::plugin(
        ClipInfo::new("p", 0, 100, 50).with_relative_start(4),
        Arc::new(IndexEcho),
    );
    let native = clip.frame(FrameIndex(105), 8, 6, false).unwrap().unwrap();
    assert_eq!(native.size(), (3, 2));
    assert_eq!(native.rgb16_at(0, 0), Some([9, 0, 0]));

    let resized = clip.frame(FrameIndex(105), 8, 6, true).unwrap().unwrap();
    assert_eq!(resized.size(), (8, 6));

    assert!(clip.frame(FrameIndex(150), 8, 6, false).unwrap().is_none());
    assert!(clip.frame(FrameIndex(151), 8, 6, false).is_err());
}

#[test]
fn solid_color_fills_the_target() {
    let clip = solid(ClipInfo::new("bg", 0, 0, 10));
    let p = clip.frame(FrameIndex(3), 4, 3, false).unwrap().unwrap();
    assert_eq!(p.size(), (4, 3));
    assert_eq!(p.rgb16_at(3, 2), Some([1000, 2000, 3000]));
    assert!(!p.has_alpha());
}

#[test]
fn audio_clips_are_never_drawn() {
    let clip = Clip::new(
        ClipInfo::new("music", 0, 0, 10).with_file("song.wav"),
        ClipKind::Audio,
    );
    assert!(!clip.is_visual());
    assert!(clip.frame(FrameIndex(2), 4, 4, false).unwrap().is_none());
    assert!(clip.audio_source().is_some());

    let silent = solid(ClipInfo::new("bg", 0, 0, 10));
    assert!(silent.audio_source().is_none());
}

#[test]
fn hash_tracks_structure_not_identity() {
    let digest = |clip: &Clip| {
        let mut h = StableHasher::new();
        clip.hash_into(&mut h).unwrap();
        h.finish()
    };
    let a = solid(ClipInfo::new("a", 1, 0, 10));
    let b = solid(ClipInfo::new("a", 1, 0, 10));
    assert_eq!(digest(&a), digest(&b));

    let moved = solid(ClipInfo::new("a", 2, 0, 10));
    assert_ne!(digest(&a), digest(&moved));

    let recolored = Clip::solid_color(ClipInfo::new("a", 1, 0, 10), [1, 2, 3], None);
    assert_ne!(digest(&a), digest(&recolored));
}

#[test]
fn clip_info_deserializes_with_defaults() {
    let info: ClipInfo = serde_json::from_str(
        r#"{ "id": "t", "layer_index": 2, "start_frame": 5, "duration": 30,
             "mixture_mode": "add",
             "effects": [{ "type": "Place", "params": { "StartX": 4, "StartY": 2 } }] }"#,
    )
    .unwrap();
    assert_eq!(info.layer_index, 2);
    assert_eq!(info.second_per_frame_ratio, 1.0);
    assert_eq!(info.mixture_mode, MixtureMode::Add);
    assert_eq!(info.effects.len(), 1);
    assert!(info.bound_sound_track.is_none());
}

#[test]
fn photo_source_reports_missing_files_as_decode_errors() {
    let clip = Clip::new(
        ClipInfo::new("img", 0, 0, 10),
        ClipKind::Photo(PhotoSource::new("/definitely/not/here.png")),
    );
    let err = clip.frame(FrameIndex(0), 4, 4, false).unwrap_err();
    assert!(matches!(err, FramecutError::Decode(_)));
}

#[test]
fn photo_source_serves_a_preloaded_picture_at_native_size() {
    let picture = Picture::solid(5, 7, [9, 9, 9], None).unwrap();
    let clip = Clip::new(
        ClipInfo::new("img", 0, 0, 10),
        ClipKind::Photo(PhotoSource::from_picture("mem.png", picture)),
    );
    let p = clip.frame(FrameIndex(4), 20, 20, false).unwrap().unwrap();
    assert_eq!(p.size(), (5, 7));
}
