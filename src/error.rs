//! Closed error surface for the library. Every fallible operation returns
//! `Result<T>`; the binary is the only place `anyhow` shows up.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockAlignError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a blockalign stream: bad or truncated header")]
    BadMagic,

    #[error("invalid blockalign header: {0}")]
    InvalidHeader(String),

    #[error("record length {0} exceeds BLOCKSIZE_MAX")]
    RecordTooLarge(usize),

    #[error("block at offset {block_pos} would overlap already-written output (cursor at {output_offset})")]
    Overlap { block_pos: i64, output_offset: i64 },

    #[error("{0} buffered output record(s) never reached their target offset")]
    UnflushedBuffers(usize),

    #[error("end-of-input drain made no progress; refusing to loop forever")]
    StalledDrain,

    #[error("restore from stdin is not supported; provide a seekable file")]
    UnseekableRestore,
}

pub type Result<T> = std::result::Result<T, BlockAlignError>;
