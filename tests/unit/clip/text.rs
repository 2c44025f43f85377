use super::*;

fn system_font() -> Option<PathBuf> {
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.is_file())
}

#[test]
fn unpremultiply_restores_straight_colour() {
    let mut px = vec![64, 32, 0, 128, 10, 10, 10, 0, 200, 100, 50, 255];
    unpremultiply_rgba8(&mut px);
    assert_eq!(&px[0..4], &[128, 64, 0, 128]);
    assert_eq!(&px[4..8], &[0, 0, 0, 0]);
    assert_eq!(&px[8..12], &[200, 100, 50, 255]);
}

#[test]
fn entries_without_a_usable_font_leave_a_transparent_canvas() {
    let source = TextSource::new(vec![
        TextEntry::new("no font", 0.0, 0.0),
        TextEntry::new("bad font", 0.0, 0.0).with_font("/definitely/not/a/font.ttf", 20.0),
    ]);
    let p = source.frame_at(0, 16, 8).unwrap();
    assert_eq!(p.size(), (16, 8));
    assert_eq!(p.alpha_at(5, 5), Some(0.0));
}

#[test]
fn backdrop_fills_the_canvas() {
    let source = TextSource::new(Vec::new()).with_backdrop([u16::MAX, 0, 0], 1.0);
    let p = source.frame_at(0, 4, 4).unwrap();
    assert_eq!(p.rgb16_at(2, 2), Some([u16::MAX, 0, 0]));
    assert_eq!(p.alpha_at(2, 2), Some(1.0));
}

#[test]
fn invalid_font_size_is_rejected() {
    let source =
        TextSource::new(vec![TextEntry::new("x", 0.0, 0.0).with_font("font.ttf", f32::NAN)]);
    assert!(source.frame_at(0, 4, 4).is_err());
}

#[test]
fn text_draws_opaque_glyph_pixels() {
    let Some(font) = system_font() else {
        return;
    };
    let source = TextSource::new(vec![
        TextEntry::new("HHHH", 2.0, 2.0)
            .with_font(font, 40.0)
            .with_color([u16::MAX, u16::MAX, u16::MAX], None),
    ]);
    let p = source.frame_at(0, 120, 60).unwrap();
    let covered = (0..60)
        .flat_map(|y| (0..120).map(move |x| (x, y)))
        .filter(|&(x, y)| p.alpha_at(x, y).is_some_and(|a| a > 0.99))
        .count();
    assert!(covered > 50, "expected glyph coverage, got {covered} pixels");

    let again = source.frame_at(7, 120, 60).unwrap();
    assert!(p.same_pixels(&again));
}

#[test]
fn describe_changes_with_entry_content() {
    let a = TextSource::new(vec![TextEntry::new("a", 0.0, 0.0)]);
    let b = TextSource::new(vec![TextEntry::new("b", 0.0, 0.0)]);
    assert_ne!(a.describe(), b.describe());
}
