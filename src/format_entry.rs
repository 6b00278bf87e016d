//! Formatted entries: the logical events built out of several records.
//!
//! A formatted entry is the run
//!
//! ```text
//! StartFormat(fmt) Timestamp [Author] arg* EndFormat
//! ```
//!
//! written by one `log_format` call (or by hand with `log_start`, the typed
//! calls, and `log_end`). The writer appends those records one at a time, so
//! a reader may see any prefix of the run; [`Reader`](crate::reader::Reader)
//! only hands out entries whose `EndFormat` it has already seen.
//!
//! `Author` is never written by producers. The merger inserts it with
//! [`FormatEntry::copy_with_author`] to remember which source an entry came
//! from.

use tracing::warn;

use crate::efficient_clock::Timestamp;
use crate::error::Result;
use crate::process_tag::ProcessTag;
use crate::record::{EventKind, Record, RecordCursor};
use crate::writer::{LockPolicy, Writer};

/// A formatted entry starting at a `StartFormat` record.
#[derive(Debug, Clone, Copy)]
pub struct FormatEntry<'a> {
    begin: RecordCursor<'a>,
}

impl<'a> FormatEntry<'a> {
    /// Wraps the entry starting at `begin`.
    ///
    /// A cursor that does not sit on a `StartFormat` record is accepted with
    /// a warning; accessors on such an entry return `None` or errors rather
    /// than reading garbage as a format string.
    pub fn new(begin: RecordCursor<'a>) -> Self {
        match begin.record() {
            Ok(record) if record.is(EventKind::StartFormat) => {}
            Ok(record) => warn!("Created format entry with invalid event type {}", record.tag()),
            Err(err) => warn!("Created format entry on undecodable record: {}", err),
        }
        Self { begin }
    }

    pub fn begin(&self) -> RecordCursor<'a> {
        self.begin
    }

    fn start_record(&self) -> Option<Record<'a>> {
        self.begin.record().ok().filter(|r| r.is(EventKind::StartFormat))
    }

    /// Raw format string bytes, at most 255 of them.
    pub fn format_string(&self) -> &'a [u8] {
        self.start_record().map(|r| r.payload()).unwrap_or(&[])
    }

    /// Timestamp of the entry: the payload of the record right after
    /// `StartFormat`, which must be a `Timestamp`.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.start_record()?;
        let record = self.begin.next().ok()?.record().ok()?;
        if !record.is(EventKind::Timestamp) {
            return None;
        }
        Timestamp::decode(record.payload())
    }

    /// Source index recorded by the merger, if the entry carries one.
    pub fn author(&self) -> Option<i32> {
        let record = self.begin.next().ok()?.next().ok()?.record().ok()?;
        if !record.is(EventKind::Author) {
            return None;
        }
        Some(i32::from_le_bytes(record.payload().get(..4)?.try_into().ok()?))
    }

    /// Cursor on the first argument record, past the format string, the
    /// timestamp and the author if present.
    pub fn args(&self) -> Result<RecordCursor<'a>> {
        let it = self.begin.next()?.next()?;
        if it.record()?.is(EventKind::Author) {
            return it.next();
        }
        Ok(it)
    }

    /// Cursor one past the `EndFormat` record that closes this entry.
    pub fn end(&self) -> Result<RecordCursor<'a>> {
        let mut it = self.begin.next()?;
        loop {
            let record = it.record()?;
            it = it.next()?;
            if record.is(EventKind::EndFormat) {
                return Ok(it);
            }
        }
    }

    /// Re-emits this entry into `dst` with an `Author` record carrying
    /// `author` inserted after the timestamp.
    ///
    /// `StartFormat`, `Timestamp`, the arguments and `EndFormat` are copied
    /// byte for byte. An `Author` record already present in the source is
    /// replaced. Returns the cursor one past the source `EndFormat`.
    ///
    /// Nothing is written unless the whole entry, up to and including its
    /// `EndFormat`, decodes inside the source buffer.
    pub fn copy_with_author<L: LockPolicy>(&self, dst: &Writer<L>, author: i32) -> Result<RecordCursor<'a>> {
        let end = self.end()?;

        let mut it = self.begin;
        dst.write_raw(it.raw()?);
        it = it.next()?;
        dst.write_raw(it.raw()?);
        dst.log_author(author);

        it = it.next()?;
        while it.offset() < end.offset() {
            if !it.record()?.is(EventKind::Author) {
                dst.write_raw(it.raw()?);
            }
            it = it.next()?;
        }
        Ok(end)
    }

    /// Renders the format string against the argument records.
    ///
    /// Each `%s`, `%t`, `%d`, `%f` or `%p` consumes one argument record and
    /// appends it to the returned body; `%%` is a literal percent and a
    /// trailing `%` is ignored. Specifiers whose argument record has the
    /// wrong kind are warned about, and the record is consumed anyway.
    pub fn render(&self) -> String {
        let mut body = String::new();
        let fmt = self.format_string();
        let mut arg = match self.args() {
            Ok(arg) => arg,
            Err(err) => {
                warn!("Format entry without arguments section: {}", err);
                body.push_str(&String::from_utf8_lossy(fmt));
                return body;
            }
        };

        let mut i = 0;
        let mut literal_start = 0;
        let mut stopped = false;
        while i < fmt.len() {
            if fmt[i] != b'%' {
                i += 1;
                continue;
            }
            body.push_str(&String::from_utf8_lossy(&fmt[literal_start..i]));
            i += 1;
            literal_start = i;
            let Some(&spec) = fmt.get(i) else {
                break;
            };
            i += 1;
            literal_start = i;
            if spec == b'%' {
                body.push('%');
                continue;
            }
            let Some(expected) = specifier_kind(spec) else {
                warn!("Reader encountered unknown format specifier {}", spec as char);
                continue;
            };

            let record = match arg.record() {
                Ok(record) if !record.is(EventKind::EndFormat) => record,
                Ok(_) => {
                    stopped = true;
                    break;
                }
                Err(err) => {
                    warn!("Format argument undecodable: {}", err);
                    stopped = true;
                    break;
                }
            };
            append_argument(&mut body, spec, expected, &record);
            arg = match arg.next() {
                Ok(next) => next,
                Err(_) => {
                    stopped = true;
                    break;
                }
            };
        }
        if !stopped {
            body.push_str(&String::from_utf8_lossy(&fmt[literal_start.min(fmt.len())..]));
        }

        if let Ok(record) = arg.record() {
            if !record.is(EventKind::EndFormat) {
                warn!("Expected end of format, got {}", record.tag());
            }
        }
        body
    }
}

/// Record kind each conversion specifier consumes.
pub(crate) fn specifier_kind(spec: u8) -> Option<EventKind> {
    match spec {
        b's' => Some(EventKind::String),
        b't' => Some(EventKind::Timestamp),
        b'd' => Some(EventKind::Integer),
        b'f' => Some(EventKind::Float),
        b'p' => Some(EventKind::Pid),
        _ => None,
    }
}

fn append_argument(body: &mut String, spec: u8, expected: EventKind, record: &Record<'_>) {
    if !record.is(expected) {
        warn!(
            "Incompatible event {} for specifier %{} (expected {:?})",
            record.tag(),
            spec as char,
            expected
        );
    }

    let payload = record.payload();
    let rendered = match expected {
        EventKind::String => Some(String::from_utf8_lossy(payload).into_owned()),
        EventKind::Timestamp => Timestamp::decode(payload).map(|ts| ts.to_string()),
        EventKind::Integer => payload
            .get(..4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(|b| format!("<{}>", i32::from_le_bytes(b))),
        EventKind::Float => payload
            .get(..4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(|b| format!("<{:.6}>", f32::from_le_bytes(b))),
        _ => ProcessTag::decode(payload).map(|tag| tag.to_string()),
    };
    body.push_str(rendered.as_deref().unwrap_or("<?>"));
}
