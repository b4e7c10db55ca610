//! Encoder pipeline (component C4): drives the chunker, consults the
//! previous-run sidecar, schedules blocks through the `OutputBuffer`, and
//! emits framed records plus the trailing block map (spec.md §4.4).

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::chunker;
use crate::constants::*;
use crate::error::{BlockAlignError, Result};
use crate::hashdb::HashDb;
use crate::output_buffer::OutputBuffer;

/// Block-count / byte-count telemetry, threaded explicitly through the
/// encoder rather than kept as module-level mutable state (spec.md §9).
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub total_block_size: u64,
    pub n_total_blocks: u64,
    pub hashes_found: u64,
    pub hashes_total: u64,
}

impl Stats {
    /// Average block size, including the 2-byte length prefix.
    pub fn avg_block_size(&self) -> f64 {
        if self.n_total_blocks == 0 {
            return 0.0;
        }
        self.total_block_size as f64 / self.n_total_blocks as f64 + FIT_OFF as f64
    }

    /// Percentage of chunked blocks that had a matching fingerprint
    /// anywhere in the prior sidecar.
    pub fn hit_percent(&self) -> f64 {
        if self.hashes_total == 0 {
            return 0.0;
        }
        self.hashes_found as f64 * 100.0 / self.hashes_total as f64
    }
}

fn sidecar_new_path(hashfile: &Path) -> PathBuf {
    let mut s = hashfile.as_os_str().to_owned();
    s.push(".new");
    PathBuf::from(s)
}

fn fill_buffer(input: &mut impl Read, buf: &mut [u8], toread: usize) -> io::Result<usize> {
    let mut read = 0;
    while read < toread {
        let n = input.read(&mut buf[read..toread])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok(read)
}

struct Encoder<W: Write> {
    out: W,
    sidecar: BufWriter<File>,
    hashdb: HashDb,
    buf: OutputBuffer,
    output_pos: i64,
    nblock: u64,
    blockmap: Vec<i32>,
    stats: Stats,
    zero_buf: Vec<u8>,
}

impl<W: Write> Encoder<W> {
    fn write_item(&mut self, chash: u32, data: &[u8], input_pos: i64) -> io::Result<()> {
        debug_assert!(!data.is_empty());
        let avg_pos = avg_offset(self.nblock, BLOCKSIZE_AVG);

        // The block map stores the INPUT-position delta (where this block
        // originally lived), so the decoder can reconstruct the original
        // stream. The sidecar below stores the OUTPUT-position delta, so a
        // future encode run can find where this block landed this time.
        let pos_offset_input = (input_pos - avg_pos) as i32;
        self.blockmap.push(pos_offset_input);

        let blen = data.len() as u16;
        self.out.write_all(&blen.to_le_bytes())?;
        self.out.write_all(data)?;

        let pos_offset_output = (self.output_pos - avg_pos) as i32;
        self.sidecar.write_all(&chash.to_le_bytes())?;
        self.sidecar.write_all(&pos_offset_output.to_le_bytes())?;

        self.output_pos += FIT_OFF as i64 + data.len() as i64;
        self.nblock += 1;
        Ok(())
    }

    /// Zero-fill from `output_pos` up to `target`. Always advances by at
    /// least `FIT_OFF` bytes per iteration, so it terminates even when
    /// `target - output_pos` is smaller than the minimum frame. This is the
    /// documented resolution of the reference's degenerate-gap edge case
    /// (spec.md §9): overshoot by the minimum quantum rather than emit a
    /// record whose length field understates the true gap.
    fn write_zeroes(&mut self, target: i64) -> io::Result<()> {
        while self.output_pos < target {
            let gap = target - self.output_pos;
            let payload = gap - FIT_OFF as i64;
            let blen: u16 = if payload <= 0 { 0 } else { payload.min(u16::MAX as i64) as u16 };

            self.out.write_all(&blen.to_le_bytes())?;
            self.out.write_all(&self.zero_buf[..blen as usize])?;

            self.output_pos += FIT_OFF as i64 + blen as i64;
            self.blockmap.push(ZERO_FILL_MARK);
            self.nblock += 1;
        }
        Ok(())
    }

    /// Pack `anywhere` items into the gap before the next targeted item (or
    /// before `blocklength` more bytes, if there is none), snug-fit first.
    fn fill_with_backlog(&mut self, blocklength: usize) -> io::Result<()> {
        loop {
            let available = match self.buf.next_offset(self.output_pos) {
                Some(off) => (off - self.output_pos).max(0) as usize,
                None => blocklength,
            };
            if available == 0 {
                break;
            }
            match self.buf.best_fit(Some(available), FIT_OFF) {
                Some(idx) => {
                    let item = self.buf.take_anywhere(idx);
                    self.write_item(item.chash, &item.data, item.input_pos)?;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Write one placeable item, preferring the lowest-keyed targeted item
    /// over an unbounded best-fit from `anywhere`. Returns whether any
    /// progress was made.
    fn flush_one(&mut self) -> io::Result<bool> {
        if let Some(item) = self.buf.take_next(self.output_pos) {
            self.write_item(item.chash, &item.data, item.input_pos)?;
            return Ok(true);
        }
        match self.buf.best_fit(None, FIT_OFF_FORCE) {
            Some(idx) => {
                let item = self.buf.take_anywhere(idx);
                self.write_item(item.chash, &item.data, item.input_pos)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn enforce_buffer_size(&mut self) -> io::Result<()> {
        if self.buf.size() > MAX_BACKLOG {
            tracing::debug!(buffer_size = self.buf.size(), "forcing buffer drain over MAX_BACKLOG");
        }
        while self.buf.size() > MAX_BACKLOG {
            if self.flush_one()? {
                continue;
            }
            match self.buf.next_offset(self.output_pos) {
                Some(target) => self.write_zeroes(target)?,
                None => return Ok(()),
            }
        }
        Ok(())
    }

    fn process_block(&mut self, chash: u32, data: &[u8], input_pos: i64) -> io::Result<()> {
        let mut can_write = true;

        if let Some(item_offset) = self.buf.next_offset(self.output_pos) {
            let mut write_curr_item = true;

            if !self.hashdb.has_error() && item_offset - self.output_pos > DOUBLE_CHECK_LIM {
                let found = self.hashdb.find(chash, self.output_pos);
                let accept = match found {
                    Some((offset, _)) => {
                        let item_len = self.buf.peek_len_at(item_offset).unwrap_or(0) as i64;
                        offset == item_offset + item_len + FIT_OFF as i64
                    }
                    None => false,
                };

                if accept {
                    let (_, idx) = found.expect("accept implies found");
                    self.hashdb.set_next_idx(idx);
                    self.fill_with_backlog(data.len())?;
                } else {
                    if let Some(item) = self.buf.take_at(item_offset) {
                        self.buf.add_anywhere(item.chash, item.data, item.input_pos);
                    }
                    write_curr_item = false;
                }
            }

            if write_curr_item {
                self.write_zeroes(item_offset)?;
                if let Some(item) = self.buf.take_at(item_offset) {
                    self.write_item(item.chash, &item.data, item.input_pos)?;
                }
            }
        }

        if !self.hashdb.has_error() {
            if let Some((offset, idx)) = self.hashdb.find(chash, self.output_pos) {
                if offset == self.output_pos && can_write {
                    self.hashdb.set_next_idx(idx);
                    self.write_item(chash, data, input_pos)?;
                    return Ok(());
                }
                self.buf.add(offset, chash, data.to_vec(), input_pos);
                if offset - self.output_pos > DOUBLE_CHECK_LIM {
                    can_write = false;
                }
            } else {
                self.buf.add_anywhere(chash, data.to_vec(), input_pos);
                can_write = false;
            }
        } else {
            self.write_item(chash, data, input_pos)?;
            can_write = false;
        }

        if can_write {
            self.fill_with_backlog(data.len())?;
        } else {
            self.enforce_buffer_size()?;
        }
        Ok(())
    }
}

/// Encode `input` into `output`, using (and then replacing) the sidecar at
/// `hashfile`. On success, `<hashfile>.new` is renamed onto `hashfile`; on
/// failure the partial output and `.new` sidecar are left in place for
/// inspection (spec.md §7). Returns block-count/hit-rate telemetry; callers
/// decide whether and how to report it.
pub fn encode<R: Read, W: Write>(mut input: R, output: W, hashfile: &Path) -> Result<Stats> {
    let mut out = output;
    out.write_all(MAGIC)?;
    out.write_all(&BLOCKSIZE_AVG.to_le_bytes())?;

    let new_sidecar_path = sidecar_new_path(hashfile);
    let sidecar = BufWriter::new(File::create(&new_sidecar_path)?);
    let hashdb = HashDb::open(hashfile);

    let mut enc = Encoder {
        out,
        sidecar,
        hashdb,
        buf: OutputBuffer::new(),
        output_pos: 0,
        nblock: 0,
        blockmap: Vec::new(),
        stats: Stats::default(),
        zero_buf: vec![0u8; u16::MAX as usize],
    };

    let mut buffer = vec![0u8; BUFFER_CAPACITY];
    let mut buffer_start = 0usize;
    let mut buffer_offset = 0usize;
    let mut reset_counter = 0usize;
    let mut input_pos: i64 = 0;

    loop {
        let mut toread = BLOCKSIZE_MAX;
        if buffer_offset > buffer_start {
            let have = buffer_offset - buffer_start;
            if have < toread {
                toread -= have;
            } else {
                toread = 0;
            }
        }

        let read = if toread > 0 {
            fill_buffer(&mut input, &mut buffer[buffer_offset..buffer_offset + toread], toread)?
        } else {
            0
        };
        buffer_offset += read;

        if buffer_offset > buffer_start {
            let (blocklength, chash) = chunker::next_block(&buffer[buffer_start..buffer_offset]);
            record_stats(&mut enc, chash, blocklength);

            enc.process_block(chash, &buffer[buffer_start..buffer_start + blocklength], input_pos)?;

            input_pos += blocklength as i64;
            buffer_start += blocklength;
        }

        if buffer_start == buffer_offset {
            buffer_start = 0;
            buffer_offset = 0;
            reset_counter = 0;
        } else {
            reset_counter += 1;
        }

        if reset_counter == BUFFER_RESET {
            let len = buffer_offset - buffer_start;
            buffer.copy_within(buffer_start..buffer_offset, 0);
            buffer_start = 0;
            buffer_offset = len;
            reset_counter = 0;
        }

        if read < toread {
            break;
        }
    }

    while buffer_start < buffer_offset {
        let (blocklength, chash) = chunker::next_block(&buffer[buffer_start..buffer_offset]);
        record_stats(&mut enc, chash, blocklength);
        enc.process_block(chash, &buffer[buffer_start..buffer_start + blocklength], input_pos)?;
        input_pos += blocklength as i64;
        buffer_start += blocklength;
    }

    // End-of-input drain: keep flushing until the buffer is empty. Each
    // iteration must make progress; two consecutive stalls abort rather
    // than loop forever (spec.md §9 Open Question #1).
    let mut stalled = false;
    while !enc.buf.is_empty() {
        if enc.flush_one()? {
            stalled = false;
        } else if stalled {
            return Err(BlockAlignError::StalledDrain);
        } else {
            stalled = true;
        }
    }

    if enc.output_pos % 4 != 0 {
        let base = enc.output_pos + FIT_OFF as i64;
        let target = base + (8 - base % 4);
        enc.write_zeroes(target)?;
    }

    for &entry in &enc.blockmap {
        enc.out.write_all(&entry.to_le_bytes())?;
    }
    let bmsize = enc.blockmap.len() as i64;
    enc.out.write_all(&bmsize.to_le_bytes())?;
    enc.out.flush()?;

    enc.sidecar.flush()?;
    drop(enc.sidecar);
    std::fs::rename(&new_sidecar_path, hashfile)?;

    Ok(enc.stats)
}

fn record_stats<W: Write>(enc: &mut Encoder<W>, chash: u32, blocklength: usize) {
    enc.stats.n_total_blocks += 1;
    enc.stats.total_block_size += blocklength as u64;
    enc.stats.hashes_total += 1;
    if enc.hashdb.find_all(chash).is_some() {
        enc.stats.hashes_found += 1;
    }
}
