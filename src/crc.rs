//! Wrapper around the opaque CRC32C primitive used both as content
//! fingerprint and as the chunker's deterministic PRNG.
//!
//! blockalign's wire format fixes the CRC32C (iSCSI/Castagnoli) polynomial
//! `0x82F63B78` with init/final XOR `0xFFFFFFFF` — this is part of the
//! on-disk contract, not an implementation detail, so the crate providing it
//! was picked to match that polynomial exactly rather than "any CRC crate".

/// Continue (or start, with `crc = 0`) a CRC32C computation over `data`.
#[inline]
pub fn crc32c(crc: u32, data: &[u8]) -> u32 {
    crc32c::crc32c_append(crc, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaining_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let one_shot = crc32c::crc32c(data);
        let (a, b) = data.split_at(17);
        let chained = crc32c(crc32c(0, a), b);
        assert_eq!(one_shot, chained);
    }

    #[test]
    fn empty_tail_is_a_no_op() {
        let seed = 0xDEAD_BEEFu32;
        assert_eq!(crc32c(seed, &[]), seed);
    }
}
