//! Record codec: the smallest self-describing unit of the event log.
//!
//! Every record is laid out as
//!
//! ```text
//! [kind: u8][length: u8][payload: length bytes][length: u8]
//! ```
//!
//! The trailing copy of `length` is what makes the log walkable backwards
//! without a side index: given the offset one past a record, the byte just
//! before it says how far back the record starts. Readers rely on this to
//! find the last complete formatted entry in an arbitrary window of a
//! circular buffer.
//!
//! All traversal goes through explicit `(buffer, offset)` pairs. Nothing here
//! ever reads outside the slice it was handed; out-of-bounds conditions come
//! back as [`RecordError`] values.

use std::fmt;

use crate::error::{RecordError, Result};

/// Largest payload a single record can carry.
pub const MAX_PAYLOAD: usize = 255;

/// Bytes added around the payload: kind, leading length, trailing length.
pub const OVERHEAD: usize = 3;

/// Largest encoded record.
pub const MAX_RECORD_SIZE: usize = MAX_PAYLOAD + OVERHEAD;

/// Stable numeric tags for record kinds. These values are part of the wire
/// format and must never be renumbered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Reserved = 0,
    /// Raw string bytes, not NUL terminated.
    String = 1,
    /// Monotonic clock reading: seconds and nanoseconds.
    Timestamp = 2,
    /// 4-byte signed integer.
    Integer = 3,
    /// 4-byte IEEE-754 float.
    Float = 4,
    /// 4-byte pid followed by the raw process name.
    Pid = 5,
    /// 4-byte signed source index, only present in merged logs.
    Author = 6,
    /// Starts a formatted entry; payload is the format string.
    StartFormat = 7,
    /// Ends a formatted entry; empty payload.
    EndFormat = 8,
}

impl EventKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => EventKind::Reserved,
            1 => EventKind::String,
            2 => EventKind::Timestamp,
            3 => EventKind::Integer,
            4 => EventKind::Float,
            5 => EventKind::Pid,
            6 => EventKind::Author,
            7 => EventKind::StartFormat,
            8 => EventKind::EndFormat,
            _ => return None,
        })
    }
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> u8 {
        kind as u8
    }
}

/// A decoded record borrowing its payload from the buffer it was read from.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    tag: u8,
    payload: &'a [u8],
}

impl<'a> Record<'a> {
    /// Raw kind byte as found on the wire.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// The decoded kind, or `None` for tags this version does not know.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_u8(self.tag)
    }

    pub fn is(&self, kind: EventKind) -> bool {
        self.tag == kind as u8
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Size of the record on the wire.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + OVERHEAD
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("kind", &self.kind().map_or_else(|| format!("Unknown({})", self.tag), |k| format!("{:?}", k)))
            .field("len", &self.payload.len())
            .finish()
    }
}

/// An encoded record held in a fixed stack buffer.
///
/// Producers build one of these per log call, so encoding never allocates.
#[derive(Clone)]
pub struct EncodedRecord {
    bytes: [u8; MAX_RECORD_SIZE],
    len: usize,
}

impl EncodedRecord {
    /// Encodes `payload` under `kind`.
    ///
    /// Fails with [`RecordError::PayloadTooLong`] if the payload does not fit
    /// in a one-byte length.
    pub fn new(kind: EventKind, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(RecordError::PayloadTooLong(payload.len()));
        }
        let len = payload.len() + OVERHEAD;
        let mut bytes = [0u8; MAX_RECORD_SIZE];
        bytes[0] = kind as u8;
        bytes[1] = payload.len() as u8;
        bytes[2..2 + payload.len()].copy_from_slice(payload);
        bytes[len - 1] = payload.len() as u8;
        Ok(Self { bytes, len })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encodes one record. Nothing is produced for payloads over 255 bytes.
pub fn append(kind: EventKind, payload: &[u8]) -> Result<EncodedRecord> {
    EncodedRecord::new(kind, payload)
}

/// Decodes the record at the front of `span` and returns it together with
/// the bytes that follow it.
pub fn decode_next(span: &[u8]) -> Result<(Record<'_>, &[u8])> {
    if span.len() < 2 {
        return Err(RecordError::Truncated {
            needed: 2,
            available: span.len(),
        });
    }
    let length = span[1] as usize;
    let needed = length + OVERHEAD;
    if span.len() < needed {
        return Err(RecordError::Truncated {
            needed,
            available: span.len(),
        });
    }
    let record = Record {
        tag: span[0],
        payload: &span[2..2 + length],
    };
    Ok((record, &span[needed..]))
}

/// Decodes the record that ends just before `cursor` and returns it together
/// with the offset where it starts.
///
/// The trailing length byte at `cursor - 1` determines the candidate start.
/// A start before the front of `span` is [`RecordError::OutOfRange`]; a
/// leading length that disagrees with the trailing one is
/// [`RecordError::Inconsistent`].
pub fn decode_prev(span: &[u8], cursor: usize) -> Result<(Record<'_>, usize)> {
    if cursor == 0 || cursor > span.len() {
        return Err(RecordError::OutOfRange { offset: cursor });
    }
    let trailing = span[cursor - 1];
    let start = cursor
        .checked_sub(trailing as usize + OVERHEAD)
        .ok_or(RecordError::OutOfRange { offset: cursor })?;
    let leading = span[start + 1];
    if leading != trailing {
        return Err(RecordError::Inconsistent {
            offset: start,
            leading,
            trailing,
        });
    }
    let record = Record {
        tag: span[start],
        payload: &span[start + 2..cursor - 1],
    };
    Ok((record, start))
}

/// Checks that the leading and trailing length bytes of the record at the
/// front of `record_span` agree. Truncated spans are never consistent.
pub fn is_consistent(record_span: &[u8]) -> bool {
    if record_span.len() < 2 {
        return false;
    }
    let leading = record_span[1];
    let trailer = leading as usize + OVERHEAD - 1;
    record_span.get(trailer) == Some(&leading)
}

/// A bounds-checked position on a record boundary inside a byte buffer.
///
/// Cursors are cheap to copy. Moving one never panics: stepping off either
/// end of the buffer, or onto bytes that do not form a record, returns an
/// error and leaves the original cursor untouched.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecordCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> RecordCursor<'a> {
    pub fn new(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, offset }
    }

    /// Cursor at the first byte of `buf`.
    pub fn front(buf: &'a [u8]) -> Self {
        Self::new(buf, 0)
    }

    /// Cursor one past the last byte of `buf`.
    pub fn back(buf: &'a [u8]) -> Self {
        Self::new(buf, buf.len())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    fn rest(&self) -> Result<&'a [u8]> {
        self.buf
            .get(self.offset..)
            .ok_or(RecordError::OutOfRange { offset: self.offset })
    }

    /// The record starting at this cursor.
    pub fn record(&self) -> Result<Record<'a>> {
        decode_next(self.rest()?).map(|(record, _)| record)
    }

    /// The full encoded bytes of the record at this cursor, header and
    /// trailer included.
    pub fn raw(&self) -> Result<&'a [u8]> {
        let record = self.record()?;
        Ok(&self.buf[self.offset..self.offset + record.encoded_len()])
    }

    /// Cursor on the record after this one.
    pub fn next(&self) -> Result<Self> {
        let (record, _) = decode_next(self.rest()?)?;
        Ok(Self::new(self.buf, self.offset + record.encoded_len()))
    }

    /// Cursor on the record before this one.
    pub fn prev(&self) -> Result<Self> {
        let (_, start) = decode_prev(self.buf, self.offset)?;
        Ok(Self::new(self.buf, start))
    }

    pub fn has_consistent_length(&self) -> bool {
        self.rest().map(is_consistent).unwrap_or(false)
    }
}

impl fmt::Debug for RecordCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCursor")
            .field("offset", &self.offset)
            .field("buffer_len", &self.buf.len())
            .finish()
    }
}

/// Walks backwards from `back` towards `front` and returns the offset of the
/// closest record of `kind`.
///
/// `back` must sit on a record boundary. The walk stops with `None` at the
/// front of the window, or at the first step that lands out of range or on
/// an inconsistent record.
pub fn find_last_of_kind(buf: &[u8], front: usize, back: usize, kind: EventKind) -> Option<usize> {
    let window = buf.get(front..back)?;
    let mut cursor = window.len();
    while cursor > 0 {
        let (record, start) = decode_prev(window, cursor).ok()?;
        if record.is(kind) {
            return Some(front + start);
        }
        cursor = start;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let rec = append(EventKind::Integer, &7i32.to_le_bytes()).unwrap();
        assert_eq!(rec.as_bytes(), &[3, 4, 7, 0, 0, 0, 4]);
        assert_eq!(rec.len(), 7);
    }

    #[test]
    fn test_payload_too_long() {
        let payload = [0u8; 256];
        assert_eq!(
            append(EventKind::String, &payload).err(),
            Some(RecordError::PayloadTooLong(256))
        );
        assert!(append(EventKind::String, &payload[..255]).is_ok());
    }

    #[test]
    fn test_empty_payload() {
        let rec = append(EventKind::EndFormat, &[]).unwrap();
        assert_eq!(rec.as_bytes(), &[8, 0, 0]);
        let (decoded, rest) = decode_next(rec.as_bytes()).unwrap();
        assert!(decoded.is(EventKind::EndFormat));
        assert!(decoded.payload().is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(
            decode_next(&[1]).err(),
            Some(RecordError::Truncated { needed: 2, available: 1 })
        );
        assert_eq!(
            decode_next(&[1, 4, b'a']).err(),
            Some(RecordError::Truncated { needed: 7, available: 3 })
        );
    }

    #[test]
    fn test_prev_out_of_range() {
        // trailing byte claims a record longer than the span
        let span = [1, 1, b'x', 9];
        assert_eq!(decode_prev(&span, 4).err(), Some(RecordError::OutOfRange { offset: 4 }));
        assert_eq!(decode_prev(&span, 0).err(), Some(RecordError::OutOfRange { offset: 0 }));
        assert_eq!(decode_prev(&span, 5).err(), Some(RecordError::OutOfRange { offset: 5 }));
    }

    #[test]
    fn test_prev_inconsistent() {
        let span = [1, 2, b'x', b'y', 1];
        // trailing 1 puts the start at offset 1, whose length byte is 'x'
        assert!(matches!(decode_prev(&span, 5), Err(RecordError::Inconsistent { .. })));
        assert!(!is_consistent(&[1, 2, b'x', b'y', 1]));
        assert!(is_consistent(&[1, 2, b'x', b'y', 2]));
        assert!(!is_consistent(&[1, 2, b'x']));
    }

    #[test]
    fn test_unknown_tag_decodes() {
        let span = [42, 1, 0xff, 1];
        let (rec, _) = decode_next(&span).unwrap();
        assert_eq!(rec.tag(), 42);
        assert_eq!(rec.kind(), None);
    }

    #[test]
    fn test_cursor_walk() {
        let mut buf = Vec::new();
        buf.extend_from_slice(append(EventKind::StartFormat, b"%d").unwrap().as_bytes());
        buf.extend_from_slice(append(EventKind::Integer, &1i32.to_le_bytes()).unwrap().as_bytes());
        buf.extend_from_slice(append(EventKind::EndFormat, &[]).unwrap().as_bytes());

        let front = RecordCursor::front(&buf);
        let second = front.next().unwrap();
        assert_eq!(second.offset(), 5);
        assert!(second.record().unwrap().is(EventKind::Integer));
        let third = second.next().unwrap();
        assert_eq!(third.next().unwrap(), RecordCursor::back(&buf));
        assert!(RecordCursor::back(&buf).next().is_err());

        let back = RecordCursor::back(&buf);
        assert_eq!(back.prev().unwrap(), third);
        assert_eq!(third.prev().unwrap().prev().unwrap(), front);
        assert!(front.prev().is_err());
        assert_eq!(third.raw().unwrap(), &[8, 0, 0]);
    }

    #[test]
    fn test_find_last_of_kind() {
        let mut buf = Vec::new();
        for kind in [EventKind::StartFormat, EventKind::EndFormat, EventKind::StartFormat, EventKind::Integer] {
            buf.extend_from_slice(append(kind, &[1]).unwrap().as_bytes());
        }
        assert_eq!(find_last_of_kind(&buf, 0, buf.len(), EventKind::EndFormat), Some(4));
        assert_eq!(find_last_of_kind(&buf, 0, buf.len(), EventKind::StartFormat), Some(8));
        assert_eq!(find_last_of_kind(&buf, 0, 8, EventKind::StartFormat), Some(0));
        assert_eq!(find_last_of_kind(&buf, 4, 8, EventKind::StartFormat), None);
        assert_eq!(find_last_of_kind(&buf, 0, buf.len(), EventKind::Pid), None);
        assert_eq!(find_last_of_kind(&buf, 0, buf.len() + 1, EventKind::Pid), None);
    }
}
