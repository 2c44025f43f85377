use super::*;

#[test]
fn frame_range_rejects_inverted_bounds() {
    assert!(FrameRange::new(FrameIndex(5), FrameIndex(2)).is_err());
    let r = FrameRange::new(FrameIndex(2), FrameIndex(5)).unwrap();
    assert_eq!(r.len_frames(), 3);
    assert!(r.contains(FrameIndex(2)));
    assert!(!r.contains(FrameIndex(5)));
    assert_eq!(
        r.iter().collect::<Vec<_>>(),
        vec![FrameIndex(2), FrameIndex(3), FrameIndex(4)]
    );
}

#[test]
fn fps_validates_and_converts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    let fps = Fps::integer(30).unwrap();
    assert!((fps.frames_to_secs(15) - 0.5).abs() < 1e-12);
    assert_eq!(fps.frames_to_samples(10, 48_000), 16_000);
}

#[test]
fn fps_samples_use_rational_rate() {
    let fps = Fps::new(30_000, 1001).unwrap();
    let samples = fps.frames_to_samples(300, 48_000);
    assert!(samples > 470_000 && samples < 490_000);
}

#[test]
fn canvas_rejects_empty() {
    assert!(Canvas::new(0, 10).is_err());
    assert_eq!(Canvas::new(4, 3).unwrap().pixels(), 12);
}
