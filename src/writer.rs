//! Producer side of the event log.
//!
//! A [`Writer`] appends records to a [`FifoWriter`] without ever waiting
//! for the reader, so it is safe to call from real-time threads. Every call
//! writes exactly one record; a formatted entry is several calls
//! (`log_start`, `log_timestamp`, arguments, `log_end`) and nothing makes
//! that sequence atomic. Readers repair around incomplete sequences instead.

use std::cell::Cell;
use std::fmt::{self, Write as _};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::efficient_clock::{monotonic_now, Timestamp};
use crate::process_tag::ProcessTag;
use crate::record::{EncodedRecord, EventKind, MAX_PAYLOAD};
use crate::transport::FifoWriter;

/// How a [`Writer`] serializes concurrent callers.
///
/// The lock covers one record append. It never spans a multi-record
/// sequence such as [`Writer::log_format`], so entries from two threads
/// sharing a [`Locked`] writer can still interleave record by record; the
/// reader's boundary repair tolerates that.
pub trait LockPolicy: Default + Send {
    fn critical<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// No locking. The writer is not `Sync`, so the compiler keeps it on one
/// thread at a time.
#[derive(Default)]
pub struct Unlocked {
    _not_sync: PhantomData<Cell<()>>,
}

impl LockPolicy for Unlocked {
    #[inline(always)]
    fn critical<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }
}

/// One mutex acquisition per record append.
#[derive(Default)]
pub struct Locked {
    lock: Mutex<()>,
}

impl LockPolicy for Locked {
    fn critical<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        f()
    }
}

/// An argument to [`Writer::log_format`].
///
/// Usually built implicitly by the [`log_format!`](crate::log_format) macro.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormatArg<'a> {
    Str(&'a str),
    Timestamp(Timestamp),
    Integer(i32),
    Float(f32),
}

impl<'a> From<&'a str> for FormatArg<'a> {
    fn from(s: &'a str) -> Self {
        FormatArg::Str(s)
    }
}

impl<'a> From<&'a String> for FormatArg<'a> {
    fn from(s: &'a String) -> Self {
        FormatArg::Str(s.as_str())
    }
}

impl From<Timestamp> for FormatArg<'_> {
    fn from(ts: Timestamp) -> Self {
        FormatArg::Timestamp(ts)
    }
}

impl From<i32> for FormatArg<'_> {
    fn from(x: i32) -> Self {
        FormatArg::Integer(x)
    }
}

impl From<f32> for FormatArg<'_> {
    fn from(x: f32) -> Self {
        FormatArg::Float(x)
    }
}

impl FormatArg<'_> {
    fn kind(&self) -> EventKind {
        match self {
            FormatArg::Str(_) => EventKind::String,
            FormatArg::Timestamp(_) => EventKind::Timestamp,
            FormatArg::Integer(_) => EventKind::Integer,
            FormatArg::Float(_) => EventKind::Float,
        }
    }
}

/// Appends event records to a FIFO.
///
/// A writer built without a FIFO ([`Writer::disabled`]) is permanently
/// disabled and every call is a no-op. Failures are never reported to the
/// caller: payloads that do not fit a record are dropped, and a write the
/// FIFO loses is simply never read.
///
/// # Thread Safety
///
/// `Writer<Unlocked>` (the default) is `Send` but not `Sync`: one thread
/// writes. For several threads sharing one FIFO use [`LockedWriter`].
///
/// # Examples
///
/// ```
/// # use event_trace::{log_format, Writer};
/// # use event_trace::transport::ring_channel;
/// let (fifo, _reader) = ring_channel(4096);
/// let writer = Writer::new(fifo);
///
/// log_format!(writer, "underrun %d frames on %s", 128, "speaker");
/// writer.log("plain string");
/// ```
pub struct Writer<L: LockPolicy = Unlocked> {
    fifo: Option<Box<dyn FifoWriter>>,
    enabled: AtomicBool,
    // cached Pid payload for %p
    pid_tag: Vec<u8>,
    policy: L,
}

/// A writer safe for several threads to call at once.
pub type LockedWriter = Writer<Locked>;

impl Writer<Unlocked> {
    /// Creates a single-threaded writer on `fifo`.
    pub fn new(fifo: impl FifoWriter + 'static) -> Self {
        Self::with_policy(fifo)
    }
}

impl Writer<Locked> {
    /// Creates a writer that serializes each record append.
    pub fn locked(fifo: impl FifoWriter + 'static) -> Self {
        Self::with_policy(fifo)
    }
}

impl<L: LockPolicy> Writer<L> {
    pub fn with_policy(fifo: impl FifoWriter + 'static) -> Self {
        Self::build(Some(Box::new(fifo)))
    }

    /// A writer with no FIFO behind it. It cannot be enabled.
    pub fn disabled() -> Self {
        Self::build(None)
    }

    fn build(fifo: Option<Box<dyn FifoWriter>>) -> Self {
        let pid_tag = ProcessTag::current().encode();
        Self {
            enabled: AtomicBool::new(fifo.is_some()),
            fifo,
            pid_tag,
            policy: L::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.critical(|| self.enabled.load(Ordering::Relaxed))
    }

    /// Turns logging on or off and returns the previous state. A writer
    /// without a FIFO stays disabled.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.policy.critical(|| {
            self.enabled
                .swap(enabled && self.fifo.is_some(), Ordering::Relaxed)
        })
    }

    pub fn enable(&self) -> bool {
        self.set_enabled(true)
    }

    pub fn disable(&self) -> bool {
        self.set_enabled(false)
    }

    /// Logs a plain string record, truncated to 255 bytes.
    pub fn log(&self, s: &str) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.log_event(EventKind::String, truncate(s.as_bytes())));
    }

    /// Formats `args` into a 255-byte stack buffer and logs the result as a
    /// string record. Longer output is truncated.
    pub fn log_fmt(&self, args: fmt::Arguments<'_>) {
        if !self.is_enabled() {
            return;
        }
        let mut buf = StackBuf::new();
        let _ = buf.write_fmt(args);
        self.policy.critical(|| self.log_event(EventKind::String, buf.as_bytes()));
    }

    /// Logs the current monotonic time.
    pub fn log_timestamp(&self) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| {
            self.log_event(EventKind::Timestamp, &monotonic_now().encode());
        });
    }

    pub fn log_timestamp_at(&self, ts: Timestamp) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.log_event(EventKind::Timestamp, &ts.encode()));
    }

    pub fn log_integer(&self, x: i32) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.log_event(EventKind::Integer, &x.to_le_bytes()));
    }

    pub fn log_float(&self, x: f32) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.log_event(EventKind::Float, &x.to_le_bytes()));
    }

    /// Logs the cached pid and process name.
    pub fn log_pid(&self) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.log_event(EventKind::Pid, &self.pid_tag));
    }

    /// Opens a formatted entry. The format string is truncated to 255 bytes.
    pub fn log_start(&self, fmt: &str) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.log_event(EventKind::StartFormat, truncate(fmt.as_bytes())));
    }

    /// Closes a formatted entry.
    pub fn log_end(&self) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.append(EventKind::EndFormat, &[]));
    }

    /// Logs a complete formatted entry: `log_start`, `log_timestamp`, one
    /// record per conversion specifier in `fmt`, then `log_end`.
    ///
    /// `%s`, `%t`, `%d` and `%f` each consume the next argument, `%p` logs the
    /// process tag without consuming one, `%%` is a literal, and a trailing
    /// `%` ends parsing. An argument whose type does not match its specifier
    /// is logged as its own type.
    ///
    /// Each record is a separate append. Under [`Locked`] the lock is taken
    /// per record, not for the whole entry.
    pub fn log_format(&self, fmt: &str, args: &[FormatArg<'_>]) {
        if !self.is_enabled() {
            return;
        }
        self.log_start(fmt);
        self.log_timestamp();

        let mut args = args.iter();
        let mut bytes = truncate(fmt.as_bytes()).iter();
        while let Some(&c) = bytes.next() {
            if c != b'%' {
                continue;
            }
            let Some(&spec) = bytes.next() else {
                break;
            };
            match spec {
                b's' | b't' | b'd' | b'f' => match args.next() {
                    Some(arg) => self.log_arg(spec, arg),
                    None => warn!("Writer missing argument for specifier %{}", spec as char),
                },
                b'p' => self.log_pid(),
                b'%' => {}
                other => warn!("Writer parsed invalid format specifier: {}", other as char),
            }
        }
        if args.next().is_some() {
            warn!("Writer got more arguments than specifiers in {:?}", fmt);
        }
        self.log_end();
    }

    fn log_arg(&self, spec: u8, arg: &FormatArg<'_>) {
        if crate::format_entry::specifier_kind(spec) != Some(arg.kind()) {
            warn!("Writer argument {:?} does not match specifier %{}", arg, spec as char);
        }
        match *arg {
            FormatArg::Str(s) => self.log(s),
            FormatArg::Timestamp(ts) => self.log_timestamp_at(ts),
            FormatArg::Integer(x) => self.log_integer(x),
            FormatArg::Float(x) => self.log_float(x),
        }
    }

    /// Writes an `Author` record. Only the merger tags entries.
    pub(crate) fn log_author(&self, author: i32) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| self.append(EventKind::Author, &author.to_le_bytes()));
    }

    /// Copies an already encoded record verbatim.
    pub(crate) fn write_raw(&self, bytes: &[u8]) {
        if !self.is_enabled() {
            return;
        }
        self.policy.critical(|| {
            if let Some(fifo) = &self.fifo {
                fifo.write(bytes);
            }
        });
    }

    // Public entry point for data records: markers and author tags have
    // dedicated paths.
    fn log_event(&self, kind: EventKind, payload: &[u8]) {
        match kind {
            EventKind::String
            | EventKind::Timestamp
            | EventKind::Integer
            | EventKind::Float
            | EventKind::Pid
            | EventKind::StartFormat => self.append(kind, payload),
            _ => trace!("Dropping record of reserved kind {:?}", kind),
        }
    }

    fn append(&self, kind: EventKind, payload: &[u8]) {
        let Some(fifo) = &self.fifo else {
            return;
        };
        match EncodedRecord::new(kind, payload) {
            Ok(record) => fifo.write(record.as_bytes()),
            Err(err) => trace!("Dropping {:?} record: {}", kind, err),
        }
    }
}

fn truncate(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(MAX_PAYLOAD)]
}

/// Fixed-capacity formatting target; output past 255 bytes is dropped.
struct StackBuf {
    buf: [u8; MAX_PAYLOAD],
    len: usize,
}

impl StackBuf {
    fn new() -> Self {
        Self {
            buf: [0u8; MAX_PAYLOAD],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for StackBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(MAX_PAYLOAD - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Logs a complete formatted entry.
///
/// Expands to [`Writer::log_format`] with every argument converted through
/// [`FormatArg::from`]. Supported argument types are `&str`, `&String`,
/// `i32`, `f32` and [`Timestamp`].
///
/// # Examples
///
/// ```
/// # use event_trace::{log_format, Writer};
/// # use event_trace::transport::ring_channel;
/// # let (fifo, _reader) = ring_channel(4096);
/// # let writer = Writer::new(fifo);
/// log_format!(writer, "no arguments");
/// log_format!(writer, "gain %f on track %d (%p)", 0.5, 3);
/// ```
#[macro_export]
macro_rules! log_format {
    ($writer:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        $writer.log_format($fmt, &[$($crate::writer::FormatArg::from($arg)),*])
    };
}

/// Logs a printf-free formatted string record using `format_args!` syntax.
#[macro_export]
macro_rules! log_string {
    ($writer:expr, $($arg:tt)*) => {
        $writer.log_fmt(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{decode_next, Record};
    use crate::transport::{ring_channel, FifoReader};

    fn drain(reader: &mut impl FifoReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.obtain(&mut out);
        reader.release(out.len());
        out
    }

    fn records(buf: &[u8]) -> Vec<Record<'_>> {
        let mut out = Vec::new();
        let mut rest = buf;
        while !rest.is_empty() {
            let (record, next) = decode_next(rest).unwrap();
            out.push(record);
            rest = next;
        }
        out
    }

    #[test]
    fn test_disabled_writer_is_noop() {
        let writer: Writer = Writer::disabled();
        assert!(!writer.is_enabled());
        assert!(!writer.enable());
        assert!(!writer.is_enabled());
        writer.log("ignored");
    }

    #[test]
    fn test_set_enabled_returns_previous() {
        let (fifo, mut reader) = ring_channel(1024);
        let writer = Writer::new(fifo);
        assert!(writer.disable());
        writer.log_integer(1);
        assert!(drain(&mut reader).is_empty());
        assert!(!writer.enable());
        writer.log_integer(1);
        assert_eq!(drain(&mut reader).len(), 7);
    }

    #[test]
    fn test_string_truncated() {
        let (fifo, mut reader) = ring_channel(1024);
        let writer = Writer::new(fifo);
        writer.log(&"x".repeat(300));
        let buf = drain(&mut reader);
        let recs = records(&buf);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].payload().len(), MAX_PAYLOAD);
    }

    #[test]
    fn test_log_fmt_stack_buffer() {
        let (fifo, mut reader) = ring_channel(1024);
        let writer = Writer::new(fifo);
        log_string!(writer, "{}-{}", 1, "a");
        writer.log_fmt(format_args!("{}", "y".repeat(400)));
        let buf = drain(&mut reader);
        let recs = records(&buf);
        assert_eq!(recs[0].payload(), b"1-a");
        assert_eq!(recs[1].payload().len(), MAX_PAYLOAD);
    }

    #[test]
    fn test_log_format_sequence() {
        let (fifo, mut reader) = ring_channel(4096);
        let writer = Writer::new(fifo);
        log_format!(writer, "%s %d %f %p %% %t", "a", 2, 1.5, Timestamp::new(1, 0));
        let buf = drain(&mut reader);
        let kinds: Vec<_> = records(&buf).iter().map(|r| r.kind().unwrap()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::StartFormat,
                EventKind::Timestamp,
                EventKind::String,
                EventKind::Integer,
                EventKind::Float,
                EventKind::Pid,
                EventKind::Timestamp,
                EventKind::EndFormat,
            ]
        );
    }

    #[test]
    fn test_log_format_missing_args() {
        let (fifo, mut reader) = ring_channel(4096);
        let writer = Writer::new(fifo);
        writer.log_format("%d %d %", &[FormatArg::Integer(1)]);
        let buf = drain(&mut reader);
        assert_eq!(records(&buf).len(), 4);
    }

    #[test]
    fn test_author_only_through_trusted_path() {
        let (fifo, mut reader) = ring_channel(1024);
        let writer = Writer::new(fifo);
        writer.log_event(EventKind::Author, &[0, 0, 0, 0]);
        writer.log_event(EventKind::Reserved, &[]);
        writer.log_event(EventKind::EndFormat, &[]);
        assert!(drain(&mut reader).is_empty());
        writer.log_author(2);
        let buf = drain(&mut reader);
        assert!(records(&buf)[0].is(EventKind::Author));
    }
}
