use super::*;
use crate::compute::CpuBackend;
use crate::picture::BitDepth;

fn ctx(backend: &CpuBackend, frame: u64) -> EffectContext<'_> {
    EffectContext {
        backend,
        width: 8,
        height: 8,
        frame: FrameIndex(frame),
    }
}

#[test]
fn progress_clamps_and_handles_empty_window() {
    let w = ProgressWindow { start: 10, end: 20 };
    assert_eq!(w.progress(FrameIndex(5)), 0.0);
    assert_eq!(w.progress(FrameIndex(15)), 0.5);
    assert_eq!(w.progress(FrameIndex(25)), 1.0);
    let empty = ProgressWindow { start: 7, end: 7 };
    assert_eq!(empty.progress(FrameIndex(100)), 0.0);
}

#[test]
fn continuous_effects_default_to_clip_range() {
    let e = Effect::new(
        "ZoomIn",
        EffectKind::ZoomIn {
            target_width: 4,
            target_height: 4,
        },
    )
    .bind_to_clip(30, 60);
    assert_eq!(e.window(), ProgressWindow { start: 30, end: 90 });

    let explicit = Effect::new(
        "ZoomIn",
        EffectKind::ZoomIn {
            target_width: 4,
            target_height: 4,
        },
    )
    .with_window(5, 9)
    .bind_to_clip(30, 60);
    assert_eq!(explicit.window(), ProgressWindow { start: 5, end: 9 });
}

#[test]
fn place_coordinates_scale_with_reference_canvas() {
    let e = Effect::new("Place", EffectKind::Place { x: 10, y: 5 }).with_reference(20, 10);
    let steps = e.process_steps(FrameIndex(0), (4, 4), (40, 20)).unwrap();
    assert_eq!(
        steps[0].op,
        GeometryOp::Place {
            x: 20,
            y: 10,
            canvas_width: 40,
            canvas_height: 20
        }
    );
}

#[test]
fn zoom_in_interpolates_crop_size() {
    let e = Effect::new(
        "ZoomIn",
        EffectKind::ZoomIn {
            target_width: 4,
            target_height: 2,
        },
    )
    .with_window(0, 10);
    let steps = e.process_steps(FrameIndex(5), (8, 6), (8, 6)).unwrap();
    assert_eq!(
        steps[0].op,
        GeometryOp::Crop {
            x: 1,
            y: 1,
            width: 6,
            height: 4
        }
    );
    assert!(matches!(
        steps[1].op,
        GeometryOp::Resize {
            width: 8,
            height: 6,
            ..
        }
    ));
}

#[test]
fn jitter_is_deterministic_per_frame() {
    let e = Effect::new(
        "Jitter",
        EffectKind::Jitter {
            max_offset_x: 6,
            max_offset_y: 3,
            seed: 42,
        },
    );
    let a = e.process_steps(FrameIndex(7), (8, 8), (8, 8)).unwrap();
    let b = e.process_steps(FrameIndex(7), (8, 8), (8, 8)).unwrap();
    assert_eq!(a, b);
    match a[0].op {
        GeometryOp::Place { x, y, .. } => {
            assert!((-6..=6).contains(&x));
            assert!((-3..=3).contains(&y));
        }
        other => panic!("unexpected step {other:?}"),
    }
}

#[test]
fn non_geometry_effects_do_not_yield_steps() {
    let e = Effect::new("ReplaceAlpha", EffectKind::ReplaceAlpha { alpha: 0.5 });
    assert!(!e.yields_process_step());
    assert!(e.process_steps(FrameIndex(0), (1, 1), (1, 1)).is_err());
}

#[test]
fn remove_color_keys_matching_pixels() {
    let backend = CpuBackend;
    let data = [0u8, 255, 0, 255, 200, 10, 10, 255];
    let p = Picture::from_rgba8(2, 1, &data).unwrap();
    let e = Effect::new(
        "RemoveColor",
        EffectKind::RemoveColor {
            r: 0,
            g: 65535,
            b: 0,
            a: 0,
            tolerance: 1000,
        },
    );
    let out = e.render(p, &ctx(&backend, 0)).unwrap();
    assert_eq!(out.bit_depth(), BitDepth::Eight);
    assert_eq!(out.alpha_at(0, 0), Some(0.0));
    assert_eq!(out.rgb16_at(0, 0), Some([0, 0, 0]));
    assert_eq!(out.alpha_at(1, 0), Some(1.0));
    assert_eq!(out.rgb16_at(1, 0), Some([200 * 257, 10 * 257, 10 * 257]));
}

#[test]
fn color_correction_keeps_alpha() {
    let backend = CpuBackend;
    let p = Picture::solid(2, 2, [32768, 0, 65535], Some(0.25)).unwrap();
    let e = Effect::new(
        "ColorCorrection",
        EffectKind::ColorCorrection {
            brightness: 0.5,
            contrast: 1.0,
        },
    );
    let out = e.render(p, &ctx(&backend, 0)).unwrap();
    assert_eq!(out.alpha_at(0, 0), Some(0.25));
    assert_eq!(out.rgb16_at(0, 0), Some([16384, 0, 32768]));
}

#[test]
fn replace_alpha_sets_and_clears_plane() {
    let backend = CpuBackend;
    let p = Picture::solid(2, 2, [1, 1, 1], None).unwrap();
    let half = Effect::new("ReplaceAlpha", EffectKind::ReplaceAlpha { alpha: 0.5 })
        .render(p, &ctx(&backend, 0))
        .unwrap();
    assert_eq!(half.alpha_at(1, 1), Some(0.5));
    let full = Effect::new("ReplaceAlpha", EffectKind::ReplaceAlpha { alpha: 1.0 })
        .render(half, &ctx(&backend, 0))
        .unwrap();
    assert!(!full.has_alpha());
}

#[test]
fn direct_render_of_geometry_matches_steps() {
    let backend = CpuBackend;
    let p = Picture::solid(4, 4, [5, 6, 7], None).unwrap();
    let e = Effect::new("Place", EffectKind::Place { x: 2, y: 2 });
    let out = e.render(p, &ctx(&backend, 0)).unwrap();
    assert_eq!(out.size(), (8, 8));
    assert_eq!(out.alpha_at(1, 1), Some(0.0));
    assert_eq!(out.rgb16_at(3, 3), Some([5, 6, 7]));
}
