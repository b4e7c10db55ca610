use criterion::{black_box, criterion_group, criterion_main, Criterion};

use blockalign::chunker::next_block;

fn bench_uniform(c: &mut Criterion) {
    let data = vec![0x5Au8; 4 * 1024 * 1024];
    c.bench_function("chunk_4mib_uniform", |b| {
        b.iter(|| {
            let mut offset = 0usize;
            while offset < data.len() {
                let (len, _chash) = next_block(black_box(&data[offset..]));
                offset += len;
            }
        })
    });
}

fn bench_pseudorandom(c: &mut Criterion) {
    use rand::{RngCore, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let mut data = vec![0u8; 4 * 1024 * 1024];
    rng.fill_bytes(&mut data);

    c.bench_function("chunk_4mib_pseudorandom", |b| {
        b.iter(|| {
            let mut offset = 0usize;
            while offset < data.len() {
                let (len, _chash) = next_block(black_box(&data[offset..]));
                offset += len;
            }
        })
    });
}

criterion_group!(benches, bench_uniform, bench_pseudorandom);
criterion_main!(benches);
