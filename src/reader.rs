//! Consumer side of the event log.
//!
//! A [`Reader`] copies the unread bytes of its FIFO into a private
//! [`Snapshot`], trims both ends back to whole formatted entries, and
//! releases exactly the bytes it could fully account for. Whatever follows
//! the last `EndFormat` stays in the FIFO and is offered again, together
//! with newer bytes, on the next call.

use std::io;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::format_entry::FormatEntry;
use crate::record::{find_last_of_kind, EventKind, RecordCursor};
use crate::transport::FifoReader;

/// Longest reader name kept, in bytes.
pub const MAX_READER_NAME: usize = 31;

/// A private copy of unread FIFO bytes with repaired boundaries.
///
/// `begin..end` spans only complete formatted entries. Bytes before
/// `begin` are an incomplete prefix (usually the tail of an entry whose
/// head was overwritten); they are counted by [`Snapshot::skipped`].
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    data: Vec<u8>,
    lost: usize,
    begin: usize,
    end: usize,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every byte copied out of the FIFO, including the unreleased tail.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes the FIFO overwrote before they could be read.
    pub fn lost(&self) -> usize {
        self.lost
    }

    /// Bytes in front of the first complete entry.
    pub fn skipped(&self) -> usize {
        self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Cursor on the first complete entry. Cursors from a snapshot never
    /// see bytes past [`Snapshot::end`].
    pub fn begin(&self) -> RecordCursor<'_> {
        RecordCursor::new(self.complete(), self.begin)
    }

    /// Cursor one past the last `EndFormat`.
    pub fn end(&self) -> RecordCursor<'_> {
        RecordCursor::new(self.complete(), self.end)
    }

    fn complete(&self) -> &[u8] {
        &self.data[..self.end]
    }

    /// The complete entries in write order.
    ///
    /// # Examples
    ///
    /// ```
    /// # use event_trace::{log_format, Reader, Writer};
    /// # use event_trace::transport::ring_channel;
    /// let (fifo, source) = ring_channel(4096);
    /// let writer = Writer::new(fifo);
    /// let mut reader = Reader::new(source);
    ///
    /// log_format!(writer, "volume %d", 7);
    /// writer.log_start("not finished");
    ///
    /// let snapshot = reader.get_snapshot();
    /// let bodies: Vec<_> = snapshot.entries().map(|e| e.render()).collect();
    /// assert_eq!(bodies, vec!["volume <7>"]);
    /// ```
    pub fn entries(&self) -> FormatEntries<'_> {
        FormatEntries {
            cursor: self.begin(),
        }
    }
}

/// Iterator over the formatted entries of a [`Snapshot`].
///
/// Records between entries that are not `StartFormat` are skipped. The
/// iteration ends early at the first record that does not decode.
pub struct FormatEntries<'a> {
    cursor: RecordCursor<'a>,
}

impl<'a> Iterator for FormatEntries<'a> {
    type Item = FormatEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.cursor.buffer();
        while self.cursor.offset() < buf.len() {
            let record = match self.cursor.record() {
                Ok(record) => record,
                Err(err) => {
                    debug!("Stopping entry iteration: {}", err);
                    self.cursor = RecordCursor::back(buf);
                    return None;
                }
            };
            if record.is(EventKind::StartFormat) {
                let entry = FormatEntry::new(self.cursor);
                return match entry.end() {
                    Ok(next) => {
                        self.cursor = next;
                        Some(entry)
                    }
                    Err(err) => {
                        debug!("Stopping entry iteration at unterminated entry: {}", err);
                        self.cursor = RecordCursor::back(buf);
                        None
                    }
                };
            }
            self.cursor = match self.cursor.next() {
                Ok(next) => next,
                Err(_) => RecordCursor::back(buf),
            };
        }
        None
    }
}

/// Display names of the sources a merger reads, indexed by author.
///
/// Shared between a [`Merger`](crate::merger::Merger) and the readers of its
/// output, so names registered later show up in later dumps.
#[derive(Debug, Clone, Default)]
pub struct AuthorNames {
    names: Arc<RwLock<Vec<String>>>,
}

impl AuthorNames {
    pub fn get(&self, author: i32) -> Option<String> {
        let index = usize::try_from(author).ok()?;
        self.names.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.read().clone()
    }

    pub(crate) fn push(&self, name: String) {
        self.names.write().push(name);
    }
}

/// Reads snapshots from one FIFO and renders them as text.
///
/// A reader bound to [`AuthorNames`] (see [`Reader::for_merged`]) prefixes
/// each entry that carries an `Author` record with the source's name.
pub struct Reader {
    fifo: Option<Box<dyn FifoReader>>,
    authors: Option<AuthorNames>,
}

impl Reader {
    pub fn new(fifo: impl FifoReader + 'static) -> Self {
        Self {
            fifo: Some(Box::new(fifo)),
            authors: None,
        }
    }

    /// A reader with nothing behind it. Every snapshot is empty.
    pub fn disabled() -> Self {
        Self {
            fifo: None,
            authors: None,
        }
    }

    /// A reader for a merger's output.
    pub fn for_merged(fifo: impl FifoReader + 'static, authors: AuthorNames) -> Self {
        Self {
            fifo: Some(Box::new(fifo)),
            authors: Some(authors),
        }
    }

    /// Takes a snapshot of every unread byte and releases the complete
    /// prefix.
    ///
    /// The snapshot ends after the last `EndFormat` and begins at the
    /// furthest-back `StartFormat` reachable from it by stepping backwards
    /// over consistent records. Without an `EndFormat` the snapshot is empty
    /// and nothing is released.
    pub fn get_snapshot(&mut self) -> Snapshot {
        let Some(fifo) = self.fifo.as_mut() else {
            return Snapshot::empty();
        };

        let mut data = Vec::with_capacity(fifo.capacity());
        let lost = fifo.obtain(&mut data);
        if data.is_empty() {
            return Snapshot::empty();
        }
        if lost > 0 {
            debug!("Reader lost {} bytes to overwrite", lost);
        }

        let (begin, end) = match find_last_of_kind(&data, 0, data.len(), EventKind::EndFormat) {
            None => (0, 0),
            Some(last_end) => {
                let end = RecordCursor::new(&data, last_end)
                    .next()
                    .map(|c| c.offset())
                    .unwrap_or(data.len());
                let mut first_start = None;
                let mut probe = last_end;
                while let Some(start) = find_last_of_kind(&data, 0, probe, EventKind::StartFormat) {
                    first_start = Some(start);
                    probe = start;
                }
                (first_start.unwrap_or(end), end)
            }
        };

        fifo.release(end);
        Snapshot {
            data,
            lost,
            begin,
            end,
        }
    }

    /// Renders `snapshot` to text lines.
    ///
    /// Each line is `indent` spaces, the entry timestamp, a space, and the
    /// body. If anything was lost or skipped the first line says how many
    /// bytes, with an empty timestamp.
    pub fn render_lines(&self, snapshot: &Snapshot, indent: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut timestamp = String::new();
        let mut body = String::new();

        let lost = snapshot.lost() + snapshot.skipped();
        if lost > 0 {
            body.push_str(&format!("warning: lost {} bytes worth of events", lost));
            lines.push(dump_line(indent, &timestamp, &body));
            body.clear();
        }

        let end = snapshot.end().offset();
        let mut it = snapshot.begin();
        while it.offset() < end {
            let record = match it.record() {
                Ok(record) => record,
                Err(err) => {
                    warn!("Dump stopped on undecodable record: {}", err);
                    break;
                }
            };
            let next = match record.kind() {
                Some(EventKind::StartFormat) => {
                    let entry = FormatEntry::new(it);
                    timestamp = entry.timestamp().map(|ts| ts.to_string()).unwrap_or_default();
                    if let Some(author) = entry.author() {
                        self.append_author(author, &mut body);
                    }
                    body.push_str(&entry.render());
                    entry.end()
                }
                Some(EventKind::EndFormat) => {
                    body.push_str("warning: got to end format event");
                    it.next()
                }
                _ => {
                    body.push_str(&format!("warning: unexpected event {}", record.tag()));
                    it.next()
                }
            };

            if !body.is_empty() {
                lines.push(dump_line(indent, &timestamp, &body));
                body.clear();
            }
            it = match next {
                Ok(next) => next,
                Err(err) => {
                    warn!("Dump stopped: {}", err);
                    break;
                }
            };
        }
        lines
    }

    fn append_author(&self, author: i32, body: &mut String) {
        let Some(authors) = &self.authors else {
            return;
        };
        match authors.get(author) {
            Some(name) => body.push_str(&format!("{}: ", name)),
            None => body.push_str(&format!("<author {}>: ", author)),
        }
    }

    /// Writes the rendered lines of `snapshot` to `out`.
    pub fn dump(&self, out: &mut dyn io::Write, indent: usize, snapshot: &Snapshot) -> io::Result<()> {
        for line in self.render_lines(snapshot, indent) {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    /// Takes a snapshot and writes it to `out`.
    pub fn dump_current(&mut self, out: &mut dyn io::Write, indent: usize) -> io::Result<()> {
        let snapshot = self.get_snapshot();
        self.dump(out, indent, &snapshot)
    }

    /// Sends the rendered lines of `snapshot` to the `tracing` sink at
    /// info level.
    pub fn log_dump(&self, indent: usize, snapshot: &Snapshot) {
        for line in self.render_lines(snapshot, indent) {
            info!(target: "event_trace::dump", "{}", line);
        }
    }
}

fn dump_line(indent: usize, timestamp: &str, body: &str) -> String {
    format!("{:indent$}{} {}", "", timestamp, body, indent = indent)
}

/// A reader registered with a merger under a display name.
pub struct NamedReader {
    reader: Reader,
    name: String,
}

impl NamedReader {
    /// Names longer than 31 bytes are cut at the last character boundary
    /// that fits.
    pub fn new(reader: Reader, name: &str) -> Self {
        let mut len = name.len().min(MAX_READER_NAME);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        Self {
            reader,
            name: name[..len].to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut Reader {
        &mut self.reader
    }
}
