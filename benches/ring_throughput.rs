//! Frame ring and metadata pool benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fringe::buffer::BufferConfig;
use fringe::metadata::MetadataPool;

fn bench_spsc_ring_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_ring_cycle");

    for frame_size in [4 * 1024, 256 * 1024, 4 * 1024 * 1024] {
        let buf = BufferConfig::new("bench", frame_size, 4).build().unwrap();
        buf.register_producer("p").unwrap();
        buf.register_consumer("c").unwrap();

        let mut slot = 0usize;
        group.throughput(Throughput::Bytes(frame_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frame_size), &buf, |b, buf| {
            b.iter(|| {
                let mut frame = buf.wait_for_empty("p", slot).unwrap();
                frame.as_mut_slice()[0] = 1;
                buf.mark_full("p", slot);

                let frame = buf.wait_for_full("c", slot).unwrap();
                std::hint::black_box(frame.as_slice()[0]);
                buf.mark_empty("c", slot);

                slot = (slot + 1) % 4;
            });
        });
    }

    group.finish();
}

fn bench_metadata_request_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_pool");

    for capacity in [16, 256] {
        let pool = MetadataPool::new(capacity, 256, "bench_pool");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &pool, |b, pool| {
            b.iter(|| {
                let meta = pool.request().expect("pool not exhausted");
                drop(meta);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_spsc_ring_cycle,
    bench_metadata_request_release
);
criterion_main!(benches);
