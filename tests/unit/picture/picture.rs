use super::*;

fn gradient16(w: u32, h: u32) -> Picture {
    let mut data = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            data.extend_from_slice(&[(x * 1000) as u16, (y * 1000) as u16, 500, 65535]);
        }
    }
    Picture::from_rgba16(w, h, &data).unwrap()
}

#[test]
fn empty_pictures_are_rejected() {
    assert!(Picture::transparent(0, 4, BitDepth::Eight).is_err());
    assert!(Picture::solid(4, 0, [0; 3], None).is_err());
    assert!(Picture::from_rgba8(2, 2, &[0; 15]).is_err());
}

#[test]
fn solid_alpha_is_validated_and_opaque_is_implicit() {
    assert!(Picture::solid(2, 2, [1, 2, 3], Some(1.5)).is_err());
    let opaque = Picture::solid(2, 2, [1, 2, 3], Some(1.0)).unwrap();
    assert!(!opaque.has_alpha());
    let half = Picture::solid(2, 2, [1, 2, 3], Some(0.5)).unwrap();
    assert_eq!(half.alpha_at(1, 1), Some(0.5));
    assert_eq!(half.rgb16_at(0, 0), Some([1, 2, 3]));
    assert_eq!(half.bit_depth(), BitDepth::Sixteen);
}

#[test]
fn rgba8_with_full_alpha_drops_the_plane() {
    let p = Picture::from_rgba8(1, 2, &[10, 20, 30, 255, 40, 50, 60, 255]).unwrap();
    assert!(!p.has_alpha());
    assert_eq!(p.rgb16_at(0, 1), Some([40 * 257, 50 * 257, 60 * 257]));
    let q = Picture::from_rgba8(1, 1, &[10, 20, 30, 0]).unwrap();
    assert_eq!(q.alpha_at(0, 0), Some(0.0));
}

#[test]
fn bit_depth_conversion_scales_by_257() {
    let p = Picture::from_rgba8(1, 1, &[255, 128, 0, 255]).unwrap();
    let deep = p.to_bit_depth(BitDepth::Sixteen);
    assert_eq!(deep.rgb16_at(0, 0), Some([65535, 128 * 257, 0]));
    let back = deep.to_bit_depth(BitDepth::Eight);
    assert_eq!(back.to_rgba8(), vec![255, 128, 0, 255]);
}

#[test]
fn resize_to_same_size_is_identity() {
    let p = gradient16(7, 5);
    let q = p.clone().resize(7, 5, false).unwrap();
    assert!(p.same_pixels(&q));
    let q = p.clone().resize(7, 5, true).unwrap();
    assert!(p.same_pixels(&q));
}

#[test]
fn resize_rejects_zero_target() {
    assert!(gradient16(4, 4).resize(0, 4, false).is_err());
}

#[test]
fn resize_preserving_aspect_fits_inside_box() {
    let p = Picture::solid(200, 100, [9, 9, 9], None).unwrap();
    let q = p.resize(50, 50, true).unwrap();
    assert_eq!(q.size(), (50, 25));
    let r = Picture::solid(3, 1000, [0; 3], None)
        .unwrap()
        .resize(10, 10, true)
        .unwrap();
    assert_eq!(r.size(), (1, 10));
}

#[test]
fn upscaling_a_solid_stays_solid() {
    let p = Picture::solid(3, 3, [1234, 40000, 7], None).unwrap();
    let q = p.resize(10, 8, false).unwrap();
    assert_eq!(q.size(), (10, 8));
    for y in 0..8 {
        for x in 0..10 {
            assert_eq!(q.rgb16_at(x, y), Some([1234, 40000, 7]));
        }
    }
    assert!(!q.has_alpha());
}

#[test]
fn downscale_by_two_averages_pixel_pairs() {
    let data: Vec<u8> = [0u8, 100, 200, 50]
        .iter()
        .flat_map(|&v| [v, v, v, 255])
        .collect();
    let p = Picture::from_rgba8(4, 1, &data).unwrap();
    let q = p.resize(2, 1, false).unwrap();
    assert_eq!(q.to_rgba8(), vec![50, 50, 50, 255, 125, 125, 125, 255]);
}

#[test]
fn crop_clips_to_bounds_and_copies_exactly() {
    let p = gradient16(6, 6);
    let c = p.clone().crop(4, 1, 10, 2).unwrap();
    assert_eq!(c.size(), (2, 2));
    assert_eq!(c.rgb16_at(0, 0), p.rgb16_at(4, 1));
    assert_eq!(c.rgb16_at(1, 1), p.rgb16_at(5, 2));
    assert!(p.clone().crop(6, 0, 1, 1).is_err());
    assert!(p.crop(0, 0, 0, 1).is_err());
}

#[test]
fn place_pads_with_transparency() {
    let p = Picture::solid(2, 2, [100, 200, 300], None).unwrap();
    let placed = p.place(1, -1, 4, 3).unwrap();
    assert_eq!(placed.size(), (4, 3));
    assert_eq!(placed.alpha_at(0, 0), Some(0.0));
    assert_eq!(placed.rgb16_at(0, 0), Some([0, 0, 0]));
    assert_eq!(placed.alpha_at(1, 0), Some(1.0));
    assert_eq!(placed.rgb16_at(2, 0), Some([100, 200, 300]));
    assert_eq!(placed.alpha_at(1, 1), Some(0.0));
}

#[test]
fn place_fully_off_canvas_is_transparent() {
    let p = Picture::solid(2, 2, [1, 1, 1], None).unwrap();
    let placed = p.place(10, 10, 4, 4).unwrap();
    assert!(placed.alpha().unwrap().iter().all(|&a| a == 0.0));
}

#[test]
fn operations_are_recorded_on_the_stack() {
    let p = Picture::solid(4, 4, [0; 3], None)
        .unwrap()
        .crop(0, 0, 2, 2)
        .unwrap()
        .with_step("note");
    let labels = p.process_stack().labels();
    assert_eq!(labels.len(), 3);
    assert!(labels[1].starts_with("crop"));
    assert_eq!(labels[2], "note");
}

#[test]
fn png_roundtrip_keeps_sixteen_bit_samples() {
    let dir = std::env::temp_dir().join(format!("framecut-picture-{}", std::process::id()));
    let path = dir.join("gradient.png");
    let p = gradient16(5, 3);
    p.save_png(&path).unwrap();
    let loaded = Picture::load(&path).unwrap();
    assert_eq!(loaded.bit_depth(), BitDepth::Sixteen);
    assert!(p.same_pixels(&loaded));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn decode_rejects_garbage() {
    let err = Picture::decode(b"not an image").unwrap_err();
    assert!(err.to_string().contains("decode error"));
}
