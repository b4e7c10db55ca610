//! The out-of-order scheduling buffer (component C3).
//!
//! Two independent stores share one byte-size counter (Invariant O2):
//! `targeted`, blocks with a known desired output offset learned from the
//! sidecar, and `anywhere`, blocks whose target is unknown or unreachable
//! and that get packed into the output opportunistically.

use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone)]
pub struct Item {
    pub chash: u32,
    pub data: Vec<u8>,
    /// Position in the *original input* stream — carried through to the
    /// block map when this item is finally written.
    pub input_pos: i64,
}

#[derive(Default)]
pub struct OutputBuffer {
    targeted: BTreeMap<i64, VecDeque<Item>>,
    anywhere: Vec<Item>,
    buffer_size: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, offset: i64, chash: u32, data: Vec<u8>, input_pos: i64) {
        self.buffer_size += data.len();
        self.targeted.entry(offset).or_default().push_back(Item { chash, data, input_pos });
    }

    pub fn add_anywhere(&mut self, chash: u32, data: Vec<u8>, input_pos: i64) {
        self.buffer_size += data.len();
        self.anywhere.push(Item { chash, data, input_pos });
    }

    /// Offset of the lowest-keyed targeted item at or after `cursor`, if any.
    pub fn next_offset(&self, cursor: i64) -> Option<i64> {
        self.targeted.range(cursor..).next().map(|(&k, _)| k)
    }

    /// Length of the item at the front of the FIFO queue scheduled for `offset`.
    pub fn peek_len_at(&self, offset: i64) -> Option<usize> {
        self.targeted.get(&offset).and_then(|q| q.front()).map(|i| i.data.len())
    }

    /// Remove the front item scheduled for exactly `offset`.
    pub fn take_at(&mut self, offset: i64) -> Option<Item> {
        let (now_empty, item) = {
            let q = self.targeted.get_mut(&offset)?;
            let item = q.pop_front();
            (q.is_empty(), item)
        };
        if now_empty {
            self.targeted.remove(&offset);
        }
        if let Some(ref item) = item {
            self.buffer_size -= item.data.len();
        }
        item
    }

    /// Remove and return the lowest-keyed item at or after `cursor`
    /// (`std::multimap::lower_bound` semantics — the key need not equal
    /// `cursor` exactly).
    pub fn take_next(&mut self, cursor: i64) -> Option<Item> {
        let offset = self.next_offset(cursor)?;
        self.take_at(offset)
    }

    /// Find the best-fitting `anywhere` item for `available_space` bytes,
    /// per the asymmetric fit rule in spec.md §4.3: a snug fit (leaves
    /// exactly one length-prefix's worth of slack) or enough room for two
    /// framing overheads, ties broken by largest size. `None` for
    /// `available_space` means no upper bound.
    pub fn best_fit(&self, available_space: Option<usize>, fit_off: usize) -> Option<usize> {
        if let Some(avail) = available_space {
            if avail < fit_off {
                return None;
            }
        }

        let mut best: Option<usize> = None;
        for (idx, item) in self.anywhere.iter().enumerate() {
            let len = item.data.len();
            let fits = match available_space {
                None => true,
                Some(avail) => len == avail - fit_off || len + fit_off * 2 <= avail,
            };
            if fits {
                let better = best.map_or(true, |b| len > self.anywhere[b].data.len());
                if better {
                    best = Some(idx);
                }
            }
        }
        tracing::trace!(?available_space, backlog = self.anywhere.len(), found = best.is_some(), "buffer best-fit scan");
        best
    }

    pub fn take_anywhere(&mut self, idx: usize) -> Item {
        let item = self.anywhere.remove(idx);
        self.buffer_size -= item.data.len();
        item
    }

    pub fn size(&self) -> usize {
        self.buffer_size
    }

    pub fn is_empty(&self) -> bool {
        self.targeted.is_empty() && self.anywhere.is_empty()
    }
}
