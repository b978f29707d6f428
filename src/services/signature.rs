//! Bit-packing and checksum of perturbation flips.
//!
//! The checksum is a CRC-32 (the zlib/IEEE polynomial). It catches crashes,
//! stale state and worker bugs that would otherwise apply a report to the
//! wrong perturbation. It is not a security primitive: anyone can forge a
//! matching checksum, so never rely on it against a hostile worker.

use crate::domain::models::Flip;

/// Pack flips one bit each, most significant bit first (`1` is `+1`).
///
/// The last byte is zero-padded.
pub fn pack_flips(flips: &[Flip]) -> Vec<u8> {
    flips
        .chunks(8)
        .map(|chunk| {
            chunk.iter().enumerate().fold(0u8, |byte, (bit, flip)| match flip {
                Flip::Plus => byte | (0x80 >> bit),
                Flip::Minus => byte,
            })
        })
        .collect()
}

/// Inverse of [`pack_flips`], truncated or padded with `-1` to `len`.
pub fn unpack_flips(packed: &[u8], len: usize) -> Vec<Flip> {
    (0..len)
        .map(|i| {
            let set = packed
                .get(i / 8)
                .is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0);
            if set {
                Flip::Plus
            } else {
                Flip::Minus
            }
        })
        .collect()
}

/// Integrity checksum of packed flips.
pub fn signature(packed: &[u8]) -> u32 {
    crc32fast::hash(packed)
}
