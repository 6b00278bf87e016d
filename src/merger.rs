use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::{debug, warn};

use crate::efficient_clock::Timestamp;
use crate::reader::{AuthorNames, FormatEntries, NamedReader, Snapshot};
use crate::format_entry::FormatEntry;
use crate::transport::FifoWriter;
use crate::writer::Writer;

/// Heap key for one source during a merge pass.
///
/// Ordered by timestamp, then by source index, so equal timestamps come out
/// in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MergeItem {
    pub ts: Timestamp,
    pub index: usize,
}

/// Interleaves the entries of several readers into one FIFO by timestamp.
///
/// Each source's snapshot is already in timestamp order, so a pass is a
/// k-way merge. Every copied entry gains an `Author` record holding the
/// index of the source it came from; [`Merger::author_names`] maps those
/// indices back to reader names.
///
/// # Examples
///
/// ```
/// # use event_trace::{log_format, Merger, NamedReader, Reader, Writer};
/// # use event_trace::transport::ring_channel;
/// let (fifo_a, source_a) = ring_channel(4096);
/// let (merged_fifo, merged_source) = ring_channel(8192);
///
/// let writer = Writer::new(fifo_a);
/// let mut merger = Merger::new(merged_fifo);
/// merger.add_reader(NamedReader::new(Reader::new(source_a), "mixer"));
///
/// log_format!(writer, "underrun");
/// merger.merge();
///
/// let mut out = Reader::for_merged(merged_source, merger.author_names());
/// let snapshot = out.get_snapshot();
/// assert!(out.render_lines(&snapshot, 0)[0].ends_with("mixer: underrun"));
/// ```
pub struct Merger {
    readers: Vec<NamedReader>,
    authors: AuthorNames,
    writer: Writer,
}

impl Merger {
    pub fn new(fifo: impl FifoWriter + 'static) -> Self {
        Self {
            readers: Vec::new(),
            authors: AuthorNames::default(),
            writer: Writer::new(fifo),
        }
    }

    /// Registers a source. Its author index is its registration position.
    pub fn add_reader(&mut self, reader: NamedReader) {
        self.authors.push(reader.name().to_string());
        self.readers.push(reader);
    }

    pub fn named_readers(&self) -> &[NamedReader] {
        &self.readers
    }

    /// Shared view of the source names, for [`Reader::for_merged`].
    ///
    /// [`Reader::for_merged`]: crate::reader::Reader::for_merged
    pub fn author_names(&self) -> AuthorNames {
        self.authors.clone()
    }

    /// Runs one merge pass and returns the number of entries copied.
    ///
    /// Takes one snapshot per source, then repeatedly copies the entry with
    /// the smallest `(timestamp, index)` until every snapshot is drained.
    /// Entries without a decodable timestamp are skipped.
    pub fn merge(&mut self) -> usize {
        let snapshots: Vec<Snapshot> = self
            .readers
            .iter_mut()
            .map(|named| named.reader_mut().get_snapshot())
            .collect();
        let mut sources: Vec<FormatEntries<'_>> = snapshots.iter().map(|s| s.entries()).collect();

        let mut heap = BinaryHeap::with_capacity(sources.len());
        let mut heads: Vec<Option<FormatEntry<'_>>> = sources
            .iter_mut()
            .enumerate()
            .map(|(index, entries)| advance(entries, index, &mut heap))
            .collect();

        let mut merged = 0;
        while let Some(Reverse(item)) = heap.pop() {
            let Some(entry) = heads[item.index].take() else {
                continue;
            };
            match entry.copy_with_author(&self.writer, item.index as i32) {
                Ok(_) => merged += 1,
                Err(err) => warn!("Merger failed to copy entry from source {}: {}", item.index, err),
            }
            heads[item.index] = advance(&mut sources[item.index], item.index, &mut heap);
        }

        if merged > 0 {
            debug!("Merged {} entries from {} sources", merged, self.readers.len());
        }
        merged
    }
}

// Pulls the next timestamped entry of one source and queues its key.
fn advance<'a>(
    entries: &mut FormatEntries<'a>,
    index: usize,
    heap: &mut BinaryHeap<Reverse<MergeItem>>,
) -> Option<FormatEntry<'a>> {
    for entry in entries.by_ref() {
        match entry.timestamp() {
            Some(ts) => {
                heap.push(Reverse(MergeItem { ts, index }));
                return Some(entry);
            }
            None => warn!("Merger skipping entry without timestamp from source {}", index),
        }
    }
    None
}
