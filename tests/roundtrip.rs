use std::collections::HashMap;
use std::fs;
use std::io::Cursor;

use rand::{RngCore, SeedableRng};
use tempfile::tempdir;

use blockalign::{decoder, encoder};

fn encode_to_vec(input: &[u8], hashfile: &std::path::Path) -> (Vec<u8>, encoder::Stats) {
    let mut out = Vec::new();
    let stats = encoder::encode(Cursor::new(input), &mut out, hashfile).unwrap();
    (out, stats)
}

fn decode_to_vec(encoded: &[u8], dir: &std::path::Path, name: &str) -> Vec<u8> {
    let path = dir.join(name);
    fs::write(&path, encoded).unwrap();
    let mut out = Vec::new();
    decoder::decode(&path, &mut out).unwrap();
    out
}

#[test]
fn empty_input_round_trips() {
    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    let (encoded, stats) = encode_to_vec(b"", &hashfile);

    assert_eq!(&encoded[..12], blockalign::MAGIC);
    assert_eq!(&encoded[12..16], &blockalign::BLOCKSIZE_AVG.to_le_bytes());
    assert_eq!(stats.n_total_blocks, 0);

    let decoded = decode_to_vec(&encoded, dir.path(), "out.bin");
    assert_eq!(decoded, b"");
}

#[test]
fn sixteen_byte_short_tail_round_trips() {
    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    let data = b"The quick brown.";

    let (encoded, stats) = encode_to_vec(data, &hashfile);
    assert_eq!(stats.n_total_blocks, 1);

    let decoded = decode_to_vec(&encoded, dir.path(), "out.bin");
    assert_eq!(decoded, data);
}

#[test]
fn exactly_blocksize_min_round_trips() {
    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    let data = vec![0u8; blockalign::BLOCKSIZE_MIN];

    let (encoded, stats) = encode_to_vec(&data, &hashfile);
    assert_eq!(stats.n_total_blocks, 1);

    let decoded = decode_to_vec(&encoded, dir.path(), "out.bin");
    assert_eq!(decoded, data);
}

#[test]
fn exactly_blocksize_max_round_trips() {
    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    let mut rng = rand::rngs::StdRng::seed_from_u64(5);
    let mut data = vec![0u8; blockalign::BLOCKSIZE_MAX];
    rng.fill_bytes(&mut data);

    let (encoded, _stats) = encode_to_vec(&data, &hashfile);
    let decoded = decode_to_vec(&encoded, dir.path(), "out.bin");
    assert_eq!(decoded, data);
}

#[test]
fn large_pseudorandom_round_trips() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut data = vec![0u8; 64 * 1024 * 1024];
    rng.fill_bytes(&mut data);

    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    let (encoded, _stats) = encode_to_vec(&data, &hashfile);
    let decoded = decode_to_vec(&encoded, dir.path(), "out.bin");
    assert_eq!(decoded, data);
}

#[test]
fn long_run_of_identical_bytes_round_trips() {
    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    let data = vec![0x41u8; 500_000];

    let (encoded, _stats) = encode_to_vec(&data, &hashfile);
    let decoded = decode_to_vec(&encoded, dir.path(), "out.bin");
    assert_eq!(decoded, data);
}

#[test]
fn reencoding_identical_input_is_byte_identical() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let mut data = vec![0u8; 1024 * 1024];
    rng.fill_bytes(&mut data);

    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");

    let (encoded1, _) = encode_to_vec(&data, &hashfile);
    let (encoded2, _) = encode_to_vec(&data, &hashfile);
    assert_eq!(encoded1, encoded2);
}

#[test]
fn re_encode_with_prior_sidecar_round_trips_after_prepend() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut b1 = vec![0u8; 3 * 1024 * 1024];
    rng.fill_bytes(&mut b1);

    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");

    let (_encoded1, _stats1) = encode_to_vec(&b1, &hashfile);
    assert!(hashfile.exists());

    let mut b2 = vec![1u8, 2, 3];
    b2.extend_from_slice(&b1);

    let (encoded2, _stats2) = encode_to_vec(&b2, &hashfile);
    let decoded2 = decode_to_vec(&encoded2, dir.path(), "out.bin");
    assert_eq!(decoded2, b2);
}

/// Scenario 4: encoding shifted-but-mostly-unchanged content against a
/// prior sidecar should reproduce the same absolute output offset for the
/// large majority of blocks shared between the two runs.
#[test]
fn shift_invariance_high_overlap_at_same_offsets() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(123);
    let mut b1 = vec![0u8; 3 * 1024 * 1024];
    rng.fill_bytes(&mut b1);

    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");

    let (_encoded1, _stats1) = encode_to_vec(&b1, &hashfile);
    let sidecar1 = fs::read(&hashfile).unwrap();

    let mut b2 = vec![1u8, 2, 3];
    b2.extend_from_slice(&b1);
    let (_encoded2, _stats2) = encode_to_vec(&b2, &hashfile);
    let sidecar2 = fs::read(&hashfile).unwrap();

    let parse = |bytes: &[u8]| -> Vec<(u32, i64)> {
        bytes
            .chunks(8)
            .enumerate()
            .map(|(i, pair)| {
                let chash = u32::from_le_bytes(pair[0..4].try_into().unwrap());
                let delta = i32::from_le_bytes(pair[4..8].try_into().unwrap());
                let avg = i as i64 * blockalign::BLOCKSIZE_AVG as i64;
                (chash, avg + delta as i64)
            })
            .collect()
    };
    let p1 = parse(&sidecar1);
    let p2 = parse(&sidecar2);

    let mut by_hash: HashMap<u32, Vec<i64>> = HashMap::new();
    for (h, off) in &p1 {
        by_hash.entry(*h).or_default().push(*off);
    }

    let mut shared = 0usize;
    let mut matched = 0usize;
    for (h, off) in &p2 {
        if let Some(offs) = by_hash.get(h) {
            shared += 1;
            if offs.contains(off) {
                matched += 1;
            }
        }
    }

    assert!(shared > 0, "expected at least some blocks shared between the two runs");
    let pct = matched as f64 / shared as f64 * 100.0;
    assert!(pct > 95.0, "expected over 95% of shared blocks at identical offsets, got {pct:.1}%");
}

/// Scenario 6: a zero-sized (or otherwise unusable) prior sidecar degrades
/// to "no prior knowledge" rather than failing the encode.
#[test]
fn zero_sized_sidecar_degrades_gracefully() {
    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    fs::write(&hashfile, b"").unwrap();

    let data = vec![9u8; 200_000];
    let mut out = Vec::new();
    let stats = encoder::encode(Cursor::new(&data), &mut out, &hashfile).unwrap();
    assert!(stats.n_total_blocks > 0);
    assert_eq!(stats.hashes_found, 0);

    let decoded = decode_to_vec(&out, dir.path(), "out.bin");
    assert_eq!(decoded, data);
}

#[test]
fn block_map_starts_four_byte_aligned() {
    let dir = tempdir().unwrap();
    let hashfile = dir.path().join("hashes");
    let data = b"not aligned by accident, needs padding to reach a multiple of four!".repeat(13);

    let (encoded, _stats) = encode_to_vec(&data, &hashfile);

    let bmsize = i64::from_le_bytes(encoded[encoded.len() - 8..].try_into().unwrap());
    let blockmap_start = encoded.len() - 8 - (bmsize as usize) * 4;
    assert_eq!(blockmap_start % 4, 0);
}

#[test]
fn decode_rejects_truncated_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("too_small.bin");
    fs::write(&path, vec![0u8; 4]).unwrap();

    let mut out = Vec::new();
    let err = decoder::decode(&path, &mut out).unwrap_err();
    assert!(matches!(err, blockalign::BlockAlignError::BadMagic));
}
