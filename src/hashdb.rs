//! Positional index over the previous encode run's sidecar (component C2).
//!
//! The sidecar is a flat sequence of `(u32 chash, i32 pos_delta)` pairs in
//! little-endian byte order (spec.md §6.2). It is memory-mapped read-only
//! for the whole encode and never mutated.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::constants::{avg_offset, BLOCKSIZE_AVG, HASH_SEARCH_LIMIT};

pub struct HashDb {
    mmap: Option<Mmap>,
    num_pairs: usize,
    next_idx: usize,
    has_error: bool,
}

impl HashDb {
    /// Open `path` read-only and memory-map it. A missing file, an empty
    /// file, or a failed mmap are all folded into one degrade path: `has_error()
    /// == true`, zero entries, every lookup returns `None`. This matches
    /// spec.md §4.2/§7 — logical failure in the sidecar path never aborts
    /// the encode, it just means "no prior knowledge".
    pub fn open(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return Self::errored(),
        };
        let len = match file.metadata() {
            Ok(m) => m.len() as usize,
            Err(_) => return Self::errored(),
        };
        if len == 0 {
            return Self { mmap: None, num_pairs: 0, next_idx: 0, has_error: false };
        }
        match unsafe { Mmap::map(&file) } {
            Ok(mmap) => {
                let num_pairs = mmap.len() / 8;
                Self { mmap: Some(mmap), num_pairs, next_idx: 0, has_error: false }
            }
            Err(_) => Self::errored(),
        }
    }

    fn errored() -> Self {
        Self { mmap: None, num_pairs: 0, next_idx: 0, has_error: true }
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    #[inline]
    pub fn set_next_idx(&mut self, idx: usize) {
        self.next_idx = idx;
    }

    fn slot_u32(&self, slot: usize) -> u32 {
        let mmap = self.mmap.as_ref().expect("slot access without a mapped sidecar");
        let off = slot * 4;
        u32::from_le_bytes(mmap[off..off + 4].try_into().unwrap())
    }

    fn slot_i32(&self, slot: usize) -> i32 {
        self.slot_u32(slot) as i32
    }

    fn offset_at(&self, chash_slot: usize) -> i64 {
        let nblock = (chash_slot / 2) as u64;
        avg_offset(nblock, BLOCKSIZE_AVG) + self.slot_i32(chash_slot + 1) as i64
    }

    /// Scan forward from the rolling cursor for up to `HASH_SEARCH_LIMIT`
    /// entries, returning the first match at or after `min_offset`. The
    /// search is forward-only and bounded by design (spec.md §4.2): a miss
    /// does not rewind and does not retry past the limit.
    pub fn find(&self, chash: u32, min_offset: i64) -> Option<(i64, usize)> {
        if self.has_error || self.mmap.is_none() {
            return None;
        }
        let total_slots = self.num_pairs * 2;
        let limit = HASH_SEARCH_LIMIT * 2;
        let end = self.next_idx.saturating_add(limit).min(total_slots);

        let mut i = self.next_idx;
        while i < end {
            if self.slot_u32(i) == chash {
                let offset = self.offset_at(i);
                if offset >= 0 && offset >= min_offset {
                    tracing::debug!(chash, offset, "sidecar hit");
                    return Some((offset, i));
                }
            }
            i += 2;
        }
        tracing::debug!(chash, min_offset, "sidecar miss");
        None
    }

    /// Scan the whole sidecar from slot 0, ignoring the cursor and any
    /// minimum offset. Used only for telemetry (how many emitted blocks had
    /// any prior incarnation anywhere in the sidecar), never for placement.
    pub fn find_all(&self, chash: u32) -> Option<(i64, usize)> {
        if self.has_error || self.mmap.is_none() {
            return None;
        }
        let total_slots = self.num_pairs * 2;
        let mut i = 0;
        while i < total_slots {
            if self.slot_u32(i) == chash {
                let offset = self.offset_at(i);
                if offset >= 0 {
                    return Some((offset, i));
                }
            }
            i += 2;
        }
        None
    }
}
