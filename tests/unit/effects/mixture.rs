use super::*;
use crate::compute::CpuBackend;

fn solid(rgb: [u16; 3], alpha: Option<f32>) -> Picture {
    Picture::solid(4, 2, rgb, alpha).unwrap()
}

#[test]
fn opaque_top_replaces_base() {
    let base = solid([10, 20, 30], None);
    let top = solid([40000, 50000, 60000], None);
    let out = Mixture::new(MixtureMode::Overlay)
        .mix(base, top, &CpuBackend)
        .unwrap();
    assert_eq!(out.rgb16_at(3, 1), Some([40000, 50000, 60000]));
    assert_eq!(out.alpha_at(0, 0), Some(1.0));
}

#[test]
fn transparent_top_leaves_base_unchanged() {
    let base = solid([1000, 2000, 3000], Some(0.6));
    let top = solid([65535, 65535, 65535], Some(0.0));
    let out = Mixture::new(MixtureMode::Overlay)
        .mix(base.clone(), top, &CpuBackend)
        .unwrap();
    assert!(out.same_pixels(&base));
}

#[test]
fn half_alpha_top_blends_by_formula() {
    let base = solid([0, 0, 0], None);
    let top = solid([65535, 0, 0], Some(0.5));
    let out = Mixture::new(MixtureMode::Overlay)
        .mix(base, top, &CpuBackend)
        .unwrap();
    let [r, g, _] = out.rgb16_at(0, 0).unwrap();
    assert!((i32::from(r) - 32768).abs() <= 1);
    assert_eq!(g, 0);
    assert_eq!(out.alpha_at(0, 0), Some(1.0));
}

#[test]
fn size_mismatch_is_a_data_error() {
    let base = Picture::solid(4, 4, [0; 3], None).unwrap();
    let top = Picture::solid(2, 2, [0; 3], None).unwrap();
    let err = Mixture::new(MixtureMode::Overlay)
        .mix(base, top, &CpuBackend)
        .unwrap_err();
    assert!(err.is_data_error());
}

#[test]
fn arithmetic_modes_take_max_alpha() {
    let base = solid([30000, 30000, 30000], Some(0.2));
    let top = solid([40000, 10000, 0], Some(0.7));
    let add = Mixture::new(MixtureMode::Add)
        .mix(base.clone(), top.clone(), &CpuBackend)
        .unwrap();
    assert_eq!(add.rgb16_at(0, 0), Some([65535, 40000, 30000]));
    assert!((add.alpha_at(0, 0).unwrap() - 0.7).abs() < 1e-6);
    let minus = Mixture::new(MixtureMode::Minus)
        .mix(base, top, &CpuBackend)
        .unwrap();
    assert_eq!(minus.rgb16_at(0, 0), Some([0, 20000, 30000]));
}

#[test]
fn eight_bit_inputs_stay_eight_bit() {
    let base = Picture::from_rgba8(1, 1, &[10, 10, 10, 255]).unwrap();
    let top = Picture::from_rgba8(1, 1, &[200, 0, 0, 128]).unwrap();
    let out = Mixture::new(MixtureMode::Overlay)
        .mix(base.clone(), top, &CpuBackend)
        .unwrap();
    assert_eq!(out.bit_depth(), BitDepth::Eight);
    let mixed16 = Mixture::new(MixtureMode::Overlay)
        .mix(base, solid([0; 3], None).crop(0, 0, 1, 1).unwrap(), &CpuBackend)
        .unwrap();
    assert_eq!(mixed16.bit_depth(), BitDepth::Sixteen);
}

#[test]
fn blend_history_keeps_both_inputs() {
    let base = solid([0; 3], None).with_step("base-step");
    let top = solid([0; 3], Some(0.5)).with_step("top-step");
    let out = Mixture::new(MixtureMode::Overlay)
        .mix(base, top, &CpuBackend)
        .unwrap();
    let labels = out.process_stack().labels();
    assert!(labels.contains(&"base-step".to_string()));
    assert!(labels.contains(&"top-step".to_string()));
    assert_eq!(labels.last().map(String::as_str), Some("overlay"));
}

#[test]
fn unknown_mode_name_is_rejected() {
    assert_eq!("Overlay".parse::<MixtureMode>().unwrap(), MixtureMode::Overlay);
    assert!("screen".parse::<MixtureMode>().is_err());
}
