//! Demo: two producers logging into their own rings, merged in the
//! background and dumped to stdout.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use event_trace::transport::ring_channel;
use event_trace::{
    log_format, LockedWriter, MergeThread, Merger, NamedReader, Reader, Timestamp, TraceConfig, Writer,
};
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    let (stdout, _guard) = tracing_appender::non_blocking(io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(stdout)
        .init();

    let config = TraceConfig::from_env();
    info!("Starting event trace demo with {:?}", config);

    let (mixer_fifo, mixer_source) = ring_channel(config.buffer_size);
    let (capture_fifo, capture_source) = ring_channel(config.buffer_size);
    let (merged_fifo, merged_source) = ring_channel(config.buffer_size * 4);

    let mut merger = Merger::new(merged_fifo);
    merger.add_reader(NamedReader::new(Reader::new(mixer_source), "mixer"));
    merger.add_reader(NamedReader::new(Reader::new(capture_source), "capture"));
    let mut merged = Reader::for_merged(merged_source, merger.author_names());
    let merger = Arc::new(Mutex::new(merger));

    let merge_thread = MergeThread::from_config(merger.clone(), &config)?;
    merge_thread.wakeup();

    let mixer = thread::spawn(move || {
        let writer = Writer::new(mixer_fifo);
        for cycle in 0..8 {
            log_format!(writer, "mix cycle %d took %f ms", cycle, 0.4f32 + cycle as f32 / 10.0);
            thread::sleep(Duration::from_millis(5));
        }
        log_format!(writer, "mixer %p done at %t", Timestamp::now());
    });

    let capture = Arc::new(LockedWriter::locked(capture_fifo));
    let workers: Vec<_> = (0..2)
        .map(|id| {
            let writer = Arc::clone(&capture);
            thread::spawn(move || {
                for frame in 0..4 {
                    log_format!(writer, "capture worker %d frame %d", id, frame);
                    thread::sleep(Duration::from_millis(7));
                }
            })
        })
        .collect();

    let _ = mixer.join();
    for worker in workers {
        let _ = worker.join();
    }

    drop(merge_thread);
    merger.lock().merge();

    let snapshot = merged.get_snapshot();
    merged.dump(&mut io::stdout().lock(), config.dump_indent, &snapshot)?;
    info!("Merged log: {} bytes lost, {} skipped", snapshot.lost(), snapshot.skipped());
    Ok(())
}
