//! Stob sink benchmarks.

use addb_bench::{bench_data, framed_sequence};
use addb_core::{locate_resume_point, FramedRecord, Geometry, SinkConfig, StobSink};
use addb_storage::{FileStore, MemoryStore};
use addb_testkit::{circular_layout, repository_with_sequences};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tempfile::TempDir;

fn memory_sink(segment_size: u64, segments: u64) -> StobSink {
    let config = SinkConfig::new()
        .segment_size(segment_size)
        .stob_size(segment_size * segments);
    StobSink::configure(Arc::new(MemoryStore::new()), config).unwrap()
}

/// Benchmark single-record appends into a memory repository.
fn bench_append_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_record");

    for size in [16, 64, 256, 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let sink = memory_sink(64 * 1024, 16);
            let payload = bench_data(size);

            b.iter(|| {
                let result = sink.append_record(&FramedRecord::new(black_box(&payload)));
                black_box(result).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark pre-encoded sequence appends.
fn bench_append_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_sequence");

    for count in [4usize, 32, 128].iter() {
        let sequence = framed_sequence(*count, 64);
        group.throughput(Throughput::Bytes(sequence.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &sequence, |b, sequence| {
            let sink = memory_sink(64 * 1024, 16);

            b.iter(|| {
                black_box(sink.append_sequence(black_box(sequence))).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark appends through the file store's I/O thread.
///
/// Appends that find every buffer busy are dropped, as in production; the
/// benchmark measures the caller-side cost either way.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    group.sample_size(20);

    for size in [64, 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let store = Arc::new(FileStore::open(&temp_dir.path().join("stob.dat")).unwrap());
            let config = SinkConfig::new()
                .segment_size(64 * 1024)
                .stob_size(64 * 1024 * 64)
                .pool_buffers(2, 8);
            let sink = StobSink::configure(store, config).unwrap();
            let payload = bench_data(size);

            b.iter(|| {
                let _ = black_box(sink.append_record(&FramedRecord::new(&payload)));
            });

            sink.close().unwrap();
        });
    }

    group.finish();
}

/// Benchmark concurrent appends from several threads.
fn bench_contended_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_append");
    group.sample_size(20);

    for threads in [2usize, 4].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            let sink = memory_sink(64 * 1024, 16);
            let payload = bench_data(64);

            b.iter(|| {
                std::thread::scope(|scope| {
                    for _ in 0..threads {
                        let sink = sink.acquire();
                        let payload = &payload;
                        scope.spawn(move || {
                            for _ in 0..250 {
                                let _ = sink.append_record(&FramedRecord::new(payload));
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

/// Benchmark locating the resume point over rings of different sizes.
fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_resume_point");

    for &segments in [16u64, 256, 4096].iter() {
        // newest segment in the middle of the ring
        let layout = circular_layout(segments, segments + segments / 2);
        let store = repository_with_sequences(512, &layout);
        let geometry = Geometry::new(512, 512 * segments).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(segments), &geometry, |b, &geometry| {
            b.iter(|| {
                let point = locate_resume_point(store.as_ref(), black_box(geometry)).unwrap();
                black_box(point);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append_record,
    bench_append_sequence,
    bench_file_append,
    bench_contended_append,
    bench_locate,
);

criterion_main!(benches);
