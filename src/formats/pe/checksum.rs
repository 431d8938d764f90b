//! PE image checksum recomputation.
//!
//! Same algorithm the Windows loader and `pefile` use: 32-bit little-endian
//! words summed with end-around carry, the stored checksum field skipped,
//! folded to 16 bits and added to the file length.

/// Offset of `CheckSum` from `e_lfanew`: signature (4) + COFF header (20) + 0x40.
pub const CHECKSUM_FIELD_OFFSET: usize = 0x58;

/// Recompute the image checksum of `data` whose NT headers start at `e_lfanew`.
pub fn generate_checksum(data: &[u8], e_lfanew: usize) -> u32 {
    let checksum_offset = e_lfanew.saturating_add(CHECKSUM_FIELD_OFFSET);
    let skip_word = checksum_offset / 4;

    let mut sum: u64 = 0;
    for (i, chunk) in data.chunks(4).enumerate() {
        if i == skip_word {
            continue;
        }
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum += u32::from_le_bytes(word) as u64;
        if sum > 0xffff_ffff {
            sum = (sum & 0xffff_ffff) + (sum >> 32);
        }
    }

    sum = (sum & 0xffff) + (sum >> 16);
    sum += sum >> 16;
    sum &= 0xffff;
    (sum as u32).wrapping_add(data.len() as u32)
}
