//! On-disk and algorithmic constants. Every value here is part of the wire
//! format contract (spec.md §3–§4) and must not change independently of the
//! format version.

/// Shortest possible block, and the width of the chunker's fixed prefix.
pub const BLOCKSIZE_MIN: usize = 64;
/// Longest possible block; the chunker always forces a boundary by here.
pub const BLOCKSIZE_MAX: usize = 1024;

/// `blocksize_min + (blocksize_max - blocksize_min)/2 + sizeof(u16)`.
/// The `+2` is the width of the per-record length prefix; it is baked into
/// the on-disk format and must be reproduced exactly.
pub const BLOCKSIZE_AVG: u32 = (BLOCKSIZE_MIN + (BLOCKSIZE_MAX - BLOCKSIZE_MIN) / 2 + 2) as u32;

/// Per-block cap on sidecar entries scanned by `HashDb::find`.
pub const HASH_SEARCH_LIMIT: usize = 10_000;

/// Width of the length prefix in bytes; also the "snug fit" slack unit used
/// by `OutputBuffer::best_fit` during normal packing.
pub const FIT_OFF: usize = 2;

/// Relaxed slack used when forcibly shrinking the backlog or draining at
/// end of input.
pub const FIT_OFF_FORCE: usize = 6;

/// Distance beyond which a targeted placement is re-verified before being
/// trusted (the "late rejection" check in the encoder's main loop).
pub const DOUBLE_CHECK_LIM: i64 = 100 * 1024;

/// Upper bound on buffered-but-unwritten block payload (Invariant O2).
pub const MAX_BACKLOG: usize = 10 * 1024 * 1024;

/// Fixed 12-byte header magic, no trailing NUL.
pub const MAGIC: &[u8; 12] = b"BLOCKALIGN#1";

/// Rolling input-read buffer capacity: `BLOCKSIZE_MAX * 20`.
pub const BUFFER_CAPACITY: usize = BLOCKSIZE_MAX * 20;
/// Number of blocks chunked before the rolling buffer is compacted forward.
pub const BUFFER_RESET: usize = 20;

/// Block-map sentinel marking a zero-fill record rather than content.
pub const ZERO_FILL_MARK: i32 = i32::MAX;

/// Nominal offset of block `n`: the position it would occupy if every
/// block consumed exactly `blocksize_avg` bytes of output.
#[inline]
pub fn avg_offset(n: u64, blocksize_avg: u32) -> i64 {
    n as i64 * blocksize_avg as i64
}
