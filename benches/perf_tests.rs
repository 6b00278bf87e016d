use criterion::{black_box, criterion_group, criterion_main, Criterion};
use event_trace::transport::{ring_channel, FifoReader};
use event_trace::{log_format, LockedWriter, Merger, NamedReader, Reader, Writer};

const RING_SIZE: usize = 1 << 20;
const ENTRIES_PER_SNAPSHOT: usize = 1000;

fn bench_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("producer");

    let (fifo, mut source) = ring_channel(RING_SIZE);
    let writer = Writer::new(fifo);
    group.bench_function("log_format_unlocked", |b| {
        b.iter(|| log_format!(writer, "cycle %d took %f ms on %s", black_box(42), black_box(0.7f32), "mixer"))
    });

    let (fifo, _locked_source) = ring_channel(RING_SIZE);
    let locked = LockedWriter::locked(fifo);
    group.bench_function("log_format_locked", |b| {
        b.iter(|| log_format!(locked, "cycle %d took %f ms on %s", black_box(42), black_box(0.7f32), "mixer"))
    });

    group.bench_function("log_integer", |b| b.iter(|| writer.log_integer(black_box(7))));

    // keep the ring from reporting losses on later groups
    let mut scratch = Vec::new();
    source.obtain(&mut scratch);
    source.release(scratch.len());
    group.finish();
}

fn bench_consumer(c: &mut Criterion) {
    let mut group = c.benchmark_group("consumer");
    group.sample_size(20);

    group.bench_function("snapshot_and_render", |b| {
        let (fifo, source) = ring_channel(RING_SIZE);
        let writer = Writer::new(fifo);
        let mut reader = Reader::new(source);
        b.iter(|| {
            for i in 0..ENTRIES_PER_SNAPSHOT as i32 {
                log_format!(writer, "entry %d", i);
            }
            let snapshot = reader.get_snapshot();
            black_box(reader.render_lines(&snapshot, 0).len())
        })
    });

    group.bench_function("merge_two_sources", |b| {
        let (fifo_a, source_a) = ring_channel(RING_SIZE);
        let (fifo_b, source_b) = ring_channel(RING_SIZE);
        let (merged_fifo, mut merged_source) = ring_channel(RING_SIZE * 2);
        let a = Writer::new(fifo_a);
        let b_writer = Writer::new(fifo_b);
        let mut merger = Merger::new(merged_fifo);
        merger.add_reader(NamedReader::new(Reader::new(source_a), "a"));
        merger.add_reader(NamedReader::new(Reader::new(source_b), "b"));
        let mut drained = Vec::new();
        b.iter(|| {
            for i in 0..(ENTRIES_PER_SNAPSHOT / 2) as i32 {
                log_format!(a, "a %d", i);
                log_format!(b_writer, "b %d", i);
            }
            let merged = merger.merge();
            drained.clear();
            merged_source.obtain(&mut drained);
            merged_source.release(drained.len());
            black_box(merged)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_producer, bench_consumer);
criterion_main!(benches);
