use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use arena_protocol::config::{DEFAULT_CIPHER_KEY, DEFAULT_CIPHER_NONCE};
use arena_protocol::utils::cipher::{CipherPair, StreamCipher};

#[allow(clippy::unwrap_used)]
fn bench_keying(c: &mut Criterion) {
    c.bench_function("cipher_pair_keying", |b| {
        b.iter(|| {
            CipherPair::new(
                black_box(DEFAULT_CIPHER_KEY.as_bytes()),
                black_box(DEFAULT_CIPHER_NONCE.as_bytes()),
            )
            .unwrap()
        })
    });
}

#[allow(clippy::unwrap_used)]
fn bench_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("cipher_process");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}b"), |b| {
            let mut cipher =
                StreamCipher::new(DEFAULT_CIPHER_KEY.as_bytes(), DEFAULT_CIPHER_NONCE.as_bytes())
                    .unwrap();
            b.iter_batched(
                || vec![0x5Au8; size],
                |mut data| {
                    cipher.process(&mut data);
                    data
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_keying, bench_process);
criterion_main!(benches);
