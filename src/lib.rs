//! # Event Trace
//!
//! A non-blocking event log for real-time code. Producers append small
//! binary records to a circular FIFO and never wait; readers copy the FIFO
//! out later, repair the edges of what they copied, and render it as text.
//!
//! ## Key Features
//!
//! * Producer calls never block, never allocate on the logging path, and
//!   never report errors to the caller
//! * Records carry their length at both ends, so buffers can be walked
//!   backwards from the newest byte
//! * Readers tolerate overwritten, torn and half-written data and report
//!   how many bytes were lost
//! * Several logs can be merged into one by timestamp, each entry tagged
//!   with its source
//!
//! ## Main Components
//!
//! * `record`: the record codec and bounds-checked cursors
//! * `format_entry`: formatted entries built from several records
//! * `Writer`: the producer, unlocked or locked per call
//! * `Reader`: snapshots, rendering and dumps
//! * `Merger` and `MergeThread`: timestamp merge of several logs
//! * `transport`: the FIFO contract and an in-process ring
//!
//! ## Quick Start
//!
//! ```
//! use event_trace::{log_format, Reader, Writer};
//! use event_trace::transport::ring_channel;
//!
//! let (fifo, source) = ring_channel(16 * 1024);
//! let writer = Writer::new(fifo);
//! let mut reader = Reader::new(source);
//!
//! log_format!(writer, "track %d gain %f", 2, 0.5f32);
//! log_format!(writer, "stream %s started by %p", "music");
//!
//! let mut out = Vec::new();
//! reader.dump_current(&mut out, 0).unwrap();
//! assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
//! ```

pub mod config;
pub mod efficient_clock;
pub mod error;
pub mod format_entry;
pub mod merge_thread;
pub mod merger;
pub mod process_tag;
pub mod reader;
pub mod record;
pub mod transport;
pub mod writer;

pub use config::TraceConfig;
pub use efficient_clock::Timestamp;
pub use error::{RecordError, Result};
pub use format_entry::FormatEntry;
pub use merge_thread::{MergeStep, MergeThread};
pub use merger::Merger;
pub use reader::{AuthorNames, NamedReader, Reader, Snapshot};
pub use record::{EventKind, Record, RecordCursor};
pub use writer::{FormatArg, Locked, LockedWriter, LockPolicy, Unlocked, Writer};
