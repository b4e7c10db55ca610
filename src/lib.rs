//! # blockalign — stream block-alignment pre-processor
//!
//! Rewrites a byte stream so that, on a later run over mostly-unchanged
//! content, identical logical blocks reappear at identical byte offsets in
//! the output. Downstream block-level deduplicating storage (backup
//! targets, content-addressed stores, rsync-like transports) can then match
//! more blocks across runs than it would against the raw, unaligned stream.
//!
//! Format guarantees:
//! - Every on-disk integer is little-endian.
//! - The chunker is a deterministic function of the input bytes alone —
//!   same content, same boundaries, same fingerprints, every run.
//! - The block map is the only thing `--restore` needs; it is self-
//!   contained at the end of the file, found by seeking to the last 8 bytes.
//! - The sidecar is advisory: a missing, empty, or corrupt sidecar degrades
//!   to "no prior knowledge" rather than failing the encode.
//! - Output is written strictly forward; an encode never seeks backward.

pub mod chunker;
pub mod constants;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod hashdb;
pub mod output_buffer;

pub use constants::{BLOCKSIZE_AVG, BLOCKSIZE_MAX, BLOCKSIZE_MIN, MAGIC};
pub use decoder::decode;
pub use encoder::{encode, Stats};
pub use error::{BlockAlignError, Result};
