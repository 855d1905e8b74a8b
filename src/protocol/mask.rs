//! Payload masking (RFC 6455 Section 5.3).
//!
//! Client frames XOR every payload byte with `key[i % 4]`. XOR is its own
//! inverse, so the same routine masks and unmasks.

/// Byte-by-byte XOR masking. Reference implementation.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// XOR masking processing one machine word (4 bytes) per step.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_word = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(word ^ mask_word).to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// XOR masking for a chunk that starts `offset` bytes into the frame payload.
///
/// A frame's payload reaches the caller in several reads; the key position
/// must carry across chunk boundaries.
#[inline]
pub fn apply_mask_offset(data: &mut [u8], mask: [u8; 4], offset: usize) {
    let rotated = [
        mask[offset % 4],
        mask[(offset + 1) % 4],
        mask[(offset + 2) % 4],
        mask[(offset + 3) % 4],
    ];
    apply_mask_fast(data, rotated);
}
