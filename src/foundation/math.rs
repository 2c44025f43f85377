/// SplitMix64 finalizer; good avalanche for small sequential inputs like frame indices.
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Deterministic integer in `[-max, max]` derived from `(seed, frame, salt)`.
pub(crate) fn signed_offset(seed: u64, frame: u64, salt: u64, max: u32) -> i32 {
    if max == 0 {
        return 0;
    }
    let h = splitmix64(seed ^ splitmix64(frame.wrapping_add(salt.rotate_left(32))));
    let span = u64::from(max) * 2 + 1;
    (h % span) as i32 - max as i32
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
