//! Content-defined chunker (component C1).
//!
//! Boundaries are chosen by a CRC-seeded pseudo-random walk with a
//! truncated-geometric acceptance probability, guaranteeing a boundary by
//! `BLOCKSIZE_MAX` while keeping the expected length near `BLOCKSIZE_AVG`.
//! Determinism over the input bytes is the entire point: two runs over
//! equivalent content must choose identical boundaries so their
//! fingerprints — and therefore their offsets — line up.

use crate::constants::{BLOCKSIZE_MAX, BLOCKSIZE_MIN};
use crate::crc::crc32c;

/// Chunk the next block out of `buf`, starting at `buf[0]`.
///
/// Returns `(length, chash)` with `1 <= length <= buf.len().min(BLOCKSIZE_MAX)`.
/// Infallible over any non-empty slice.
pub fn next_block(buf: &[u8]) -> (usize, u32) {
    debug_assert!(!buf.is_empty());
    let buffer_len = buf.len();

    if buffer_len < BLOCKSIZE_MIN {
        let chash = crc32c(0, buf);
        tracing::trace!(length = buffer_len, chash, "short tail below BLOCKSIZE_MIN");
        return (buffer_len, chash);
    }

    let chash_prefix = crc32c(0, &buf[..BLOCKSIZE_MIN]);
    let mut rnd = crc32c(37, &buf[..BLOCKSIZE_MIN]);
    let mut prop: f64 = 1.0 / (BLOCKSIZE_MAX - BLOCKSIZE_MIN) as f64;

    let upper = buffer_len.min(BLOCKSIZE_MAX);
    for i in BLOCKSIZE_MIN..upper {
        rnd = crc32c(rnd, &buf[i..i + 1]);

        if (rnd as f64) / (u32::MAX as f64) <= prop {
            let chash = crc32c(chash_prefix, &buf[BLOCKSIZE_MIN..i]);
            tracing::trace!(length = i, chash, "chunk boundary found");
            return (i, chash);
        }

        prop /= 1.0 - prop;
    }

    let length = if buffer_len >= BLOCKSIZE_MAX { BLOCKSIZE_MAX } else { buffer_len };
    let chash = crc32c(chash_prefix, &buf[BLOCKSIZE_MIN..length]);
    tracing::trace!(length, chash, "chunk boundary forced");
    (length, chash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_tail_below_minimum_takes_everything() {
        let data = b"The quick brown.";
        assert_eq!(data.len(), 16);
        let (len, chash) = next_block(data);
        assert_eq!(len, 16);
        assert_eq!(chash, crc32c(0, data));
    }

    #[test]
    fn exactly_blocksize_min_forces_full_length() {
        let data = [0u8; BLOCKSIZE_MIN];
        let (len, _chash) = next_block(&data);
        assert_eq!(len, BLOCKSIZE_MIN);
    }

    #[test]
    fn never_exceeds_blocksize_max() {
        let data = vec![7u8; BLOCKSIZE_MAX * 4];
        let (len, _) = next_block(&data);
        assert!((1..=BLOCKSIZE_MAX).contains(&len));
    }

    #[test]
    fn deterministic_over_identical_bytes() {
        let data = vec![0xABu8; 4096];
        let (l1, c1) = next_block(&data[..2048]);
        let (l2, c2) = next_block(&data[..2048]);
        assert_eq!(l1, l2);
        assert_eq!(c1, c2);
    }

    proptest::proptest! {
        #[test]
        fn chunk_length_always_in_range(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..8192)) {
            let (len, _) = next_block(&data);
            proptest::prop_assert!(len >= 1 && len <= data.len());
            proptest::prop_assert!(len <= BLOCKSIZE_MAX);
        }
    }
}
