//! Compact-target expansion and retarget arithmetic.
//!
//! A compact target is four bytes: one exponent byte (the size of the target
//! in bytes) followed by a three-byte coefficient (the leading target bytes).

use crate::constants::MAX_DIFFICULTY;

/// Expand compact bits into the full 32-byte big-endian target.
///
/// The coefficient's most significant byte lands at position `32 - exponent`;
/// exponents below 3 truncate the coefficient at the end of the buffer, and
/// exponents above 32 are clamped.
///
/// Example: `0x04aabbcc` expands to 28 zero bytes followed by
/// `aa bb cc 00`.
pub fn expand_bits(bits: u32) -> [u8; 32] {
    let mut target = [0u8; 32];
    let exponent = ((bits >> 24) as usize).min(32);
    let coefficient = [(bits >> 16) as u8, (bits >> 8) as u8, bits as u8];
    let start = 32 - exponent;
    let len = exponent.min(3);
    target[start..start + len].copy_from_slice(&coefficient[..len]);
    target
}

/// Apply a retarget coefficient to a compact previous target, clamping the
/// coefficient to [0.25, 4] so a single retarget cannot swing difficulty by
/// more than 4x either way. The result never exceeds [`MAX_DIFFICULTY`].
pub fn apply_coeff_to_target(coeff: f64, prev_target: u32) -> u32 {
    let coeff = coeff.clamp(0.25, 4.0);

    // The exponent is split off; the coefficient is shifted left one byte so
    // the multiplication keeps sub-byte precision.
    let raw_bits = (u64::from(prev_target) & 0x00ff_ffff) << 8;
    let mut exponent = prev_target >> 24;

    let mut new_target = (raw_bits as f64 * coeff) as u64;

    if new_target & 0xff_0000_0000 != 0 {
        // Overflowed into a fifth byte: keep the top three, bump the exponent.
        exponent += 1;
        new_target >>= 16;
    } else if new_target & 0xff != 0 {
        if new_target & 0xff00_0000 != 0 {
            // The low byte only carried precision.
            new_target >>= 8;
        } else if exponent != 0 {
            // The low byte is significant; make room by shrinking the exponent.
            exponent -= 1;
        } else {
            new_target >>= 8;
        }
    } else {
        new_target >>= 8;
    }

    let compact = (u64::from(exponent) << 24) | new_target;
    if compact as u32 > MAX_DIFFICULTY {
        MAX_DIFFICULTY
    } else {
        compact as u32
    }
}
