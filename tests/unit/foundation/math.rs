use super::*;

#[test]
fn signed_offset_stays_in_bounds() {
    for frame in 0..500 {
        let v = signed_offset(7, frame, 1, 12);
        assert!((-12..=12).contains(&v));
    }
    assert_eq!(signed_offset(7, 3, 1, 0), 0);
}

#[test]
fn signed_offset_is_deterministic_and_varies() {
    assert_eq!(signed_offset(42, 10, 0, 30), signed_offset(42, 10, 0, 30));
    let distinct: std::collections::HashSet<i32> =
        (0..64).map(|f| signed_offset(42, f, 0, 30)).collect();
    assert!(distinct.len() > 8);
}
