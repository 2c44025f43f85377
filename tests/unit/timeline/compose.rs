use super::*;
use crate::clip::ClipInfo;
use crate::compute::CpuBackend;
use crate::effects::{EffectRegistry, EffectSpec};
use crate::picture::BitDepth;
use crate::render::DiagnosticsReport;

fn context() -> RenderContext {
    RenderContext::new(Arc::new(CpuBackend), Arc::new(EffectRegistry::new()))
}

fn solid(info: ClipInfo, rgb: [u16; 3], alpha: Option<f32>) -> Arc<Clip> {
    Arc::new(Clip::solid_color(info, rgb, alpha))
}

#[test]
fn empty_timeline_is_the_fallback_background() {
    let ctx = context().with_fallback([10, 20, 30]);
    let out = compose_frame(&ctx, &[], FrameIndex(0), 6, 4).unwrap();
    assert_eq!(out.size(), (6, 4));
    assert!(!out.has_alpha());
    assert_eq!(out.rgb16_at(5, 3), Some([10, 20, 30]));
}

#[test]
fn opaque_top_layer_hides_the_layers_below() {
    let ctx = context();
    let clips = vec![
        solid(ClipInfo::new("bg", 0, 0, 10), [0, 0, 65535], None),
        solid(ClipInfo::new("fg", 1, 0, 10), [65535, 0, 0], None),
    ];
    let out = compose_frame(&ctx, &clips, FrameIndex(2), 4, 4).unwrap();
    assert_eq!(out.rgb16_at(1, 1), Some([65535, 0, 0]));
}

#[test]
fn transparent_top_layer_leaves_base_unchanged() {
    let ctx = context();
    let clips = vec![
        solid(ClipInfo::new("bg", 0, 0, 10), [0, 0, 65535], None),
        solid(ClipInfo::new("fg", 1, 0, 10), [65535, 0, 0], Some(0.0)),
    ];
    let out = compose_frame(&ctx, &clips, FrameIndex(2), 4, 4).unwrap();
    assert_eq!(out.rgb16_at(0, 0), Some([0, 0, 65535]));
}

#[test]
fn half_transparent_top_layer_blends() {
    let ctx = context();
    let clips = vec![
        solid(ClipInfo::new("bg", 0, 0, 10), [0, 0, 65535], None),
        solid(ClipInfo::new("fg", 1, 0, 10), [65535, 0, 0], Some(0.5)),
    ];
    let out = compose_frame(&ctx, &clips, FrameIndex(2), 4, 4).unwrap();
    let [r, g, b] = out.rgb16_at(2, 2).unwrap();
    assert!((i32::from(r) - 32768).abs() <= 1, "r = {r}");
    assert_eq!(g, 0);
    assert!((i32::from(b) - 32768).abs() <= 1, "b = {b}");
    assert!(!out.has_alpha());
}

#[test]
fn small_layers_are_placed_at_the_origin_not_stretched() {
    let ctx = context().with_fallback([0, 0, 0]);
    let clip = solid(
        ClipInfo::new("chip", 0, 0, 10).with_effect(
            EffectSpec::new("Crop")
                .param("StartX", 0)
                .param("StartY", 0)
                .param("Width", 2)
                .param("Height", 2),
        ),
        [65535, 65535, 65535],
        None,
    );
    let out = compose_frame(&ctx, &[clip], FrameIndex(0), 6, 6).unwrap();
    assert_eq!(out.size(), (6, 6));
    assert_eq!(out.rgb16_at(1, 1), Some([65535, 65535, 65535]));
    assert_eq!(out.rgb16_at(4, 4), Some([0, 0, 0]));
}

#[test]
fn batched_geometry_matches_stepwise_effects() {
    let ctx = context();
    let effects = vec![
        EffectSpec::new("Crop")
            .param("StartX", 1)
            .param("StartY", 1)
            .param("Width", 4)
            .param("Height", 4)
            .with_index(0),
        EffectSpec::new("Place")
            .param("StartX", 2)
            .param("StartY", 1)
            .with_index(1),
    ];
    let mut info = ClipInfo::new("c", 0, 0, 10);
    info.effects = effects;
    let clip = Arc::new(Clip::solid_color(info, [500, 600, 700], Some(0.8)));

    let source = clip.frame(FrameIndex(0), 8, 8, false).unwrap().unwrap();
    let batched = apply_effects(
        &ctx,
        &ctx.effects_for(&clip).unwrap(),
        source.clone(),
        FrameIndex(0),
        8,
        8,
        "c",
    )
    .unwrap();
    let stepwise = source.crop(1, 1, 4, 4).unwrap().place(2, 1, 8, 8).unwrap();
    assert!(batched.same_pixels(&stepwise));
}

#[test]
fn effects_run_in_index_order() {
    let ctx = context();
    let mut info = ClipInfo::new("c", 0, 0, 10);
    info.effects = vec![
        EffectSpec::new("Place")
            .param("StartX", 4)
            .param("StartY", 0)
            .with_index(2),
        EffectSpec::new("Crop")
            .param("StartX", 0)
            .param("StartY", 0)
            .param("Width", 2)
            .param("Height", 2)
            .with_index(1),
    ];
    let clip = solid(info, [65535, 0, 0], None);
    let out = compose_frame(&ctx, &[clip], FrameIndex(0), 8, 4).unwrap();
    assert_eq!(out.rgb16_at(0, 0), Some([0, 0, 0]));
    assert_eq!(out.rgb16_at(5, 1), Some([65535, 0, 0]));
}

#[test]
fn failing_effects_surface_instead_of_being_dropped() {
    let ctx = context();
    let clip = solid(
        ClipInfo::new("c", 0, 0, 10).with_effect(
            EffectSpec::new("Crop")
                .param("StartX", 50)
                .param("StartY", 0)
                .param("Width", 2)
                .param("Height", 2),
        ),
        [1, 1, 1],
        None,
    );
    assert!(compose_frame(&ctx, &[clip], FrameIndex(0), 4, 4).is_err());
}

#[test]
fn output_depth_follows_the_context() {
    let ctx = context().with_bit_depth(BitDepth::Eight);
    let out = compose_frame(&ctx, &[], FrameIndex(0), 2, 2).unwrap();
    assert_eq!(out.bit_depth(), BitDepth::Eight);
}

#[test]
fn diagnostics_record_each_composited_step() {
    let report = Arc::new(DiagnosticsReport::new());
    let ctx = context().with_diagnostics(Arc::clone(&report));
    let clips = vec![solid(ClipInfo::new("bg", 0, 0, 10), [1, 2, 3], None)];
    compose_frame(&ctx, &clips, FrameIndex(4), 2, 2).unwrap();
    let steps: Vec<String> = report.rows().into_iter().map(|r| r.step).collect();
    assert_eq!(steps, vec!["overlay".to_string(), "fallback".to_string()]);
    assert!(report.rows().iter().all(|r| r.frame == 4));
}
