//! The byte FIFO that carries records from a writer to a reader.
//!
//! The event log itself never allocates, maps or sizes the shared buffer; it
//! only needs the two halves of a single-producer, single-consumer circular
//! FIFO whose writer never waits for the reader:
//!
//! * [`FifoWriter::write`] appends bytes and advances a monotonic rear
//!   index, overwriting the oldest bytes when the buffer is full.
//! * [`FifoReader::obtain`] copies out everything between the reader's
//!   front and the rear, reporting how many bytes were overwritten before
//!   they could be read.
//! * [`FifoReader::release`] advances the front past bytes the reader is
//!   done with.
//!
//! [`ring_channel`] is an in-process implementation of that contract used
//! by tests, benches and the demo binary. A cross-process transport only has
//! to implement the two traits.

use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::record::MAX_RECORD_SIZE;

/// Writing half of the FIFO.
///
/// Implementations must not block. Writes are at-most-once: there is no
/// acknowledgment and a failed write is simply never observed.
pub trait FifoWriter: Send + Sync {
    fn write(&self, bytes: &[u8]);
}

/// Reading half of the FIFO.
pub trait FifoReader: Send {
    /// Appends every unread byte, oldest first, to `dst` without consuming
    /// them. Returns the number of bytes lost to overwrite since the last
    /// call.
    fn obtain(&mut self, dst: &mut Vec<u8>) -> usize;

    /// Marks `count` bytes at the front of the last obtained range as read.
    fn release(&mut self, count: usize);

    fn capacity(&self) -> usize;
}

/// Bytes in front of the ring for the rear index.
pub const SHARED_HEADER_SIZE: usize = std::mem::size_of::<u64>();

/// Bytes of shared memory a ring of `size` bytes occupies: the header plus
/// the size rounded up to a power of two.
pub fn shared_size(size: usize) -> usize {
    SHARED_HEADER_SIZE + size.max(1).next_power_of_two()
}

struct RingShared {
    buf: Box<[AtomicU8]>,
    mask: u64,
    // one byte past the most recently written byte, never wraps
    rear: AtomicU64,
}

impl RingShared {
    fn capacity(&self) -> u64 {
        self.mask + 1
    }
}

/// Creates an in-process ring of at least `capacity` bytes.
///
/// # Examples
///
/// ```
/// # use event_trace::transport::{ring_channel, FifoReader, FifoWriter};
/// let (writer, mut reader) = ring_channel(64);
/// writer.write(b"abc");
///
/// let mut out = Vec::new();
/// let lost = reader.obtain(&mut out);
/// assert_eq!((out.as_slice(), lost), (&b"abc"[..], 0));
/// reader.release(out.len());
/// ```
pub fn ring_channel(capacity: usize) -> (RingWriter, RingReader) {
    let capacity = capacity.max(1).next_power_of_two();
    let buf = (0..capacity).map(|_| AtomicU8::new(0)).collect::<Vec<_>>();
    let shared = Arc::new(RingShared {
        buf: buf.into_boxed_slice(),
        mask: capacity as u64 - 1,
        rear: AtomicU64::new(0),
    });
    (
        RingWriter {
            shared: shared.clone(),
        },
        RingReader { shared, front: 0 },
    )
}

/// Producer half of [`ring_channel`].
///
/// The ring is single-producer: two threads writing at once interleave
/// bytes. Writers that share one ring across threads must serialize their
/// calls.
pub struct RingWriter {
    shared: Arc<RingShared>,
}

impl FifoWriter for RingWriter {
    fn write(&self, bytes: &[u8]) {
        let shared = &self.shared;
        let rear = shared.rear.load(Ordering::Relaxed);
        for (i, &b) in bytes.iter().enumerate() {
            let slot = ((rear + i as u64) & shared.mask) as usize;
            shared.buf[slot].store(b, Ordering::Relaxed);
        }
        shared.rear.store(rear + bytes.len() as u64, Ordering::Release);
    }
}

/// Consumer half of [`ring_channel`].
pub struct RingReader {
    shared: Arc<RingShared>,
    front: u64,
}

impl FifoReader for RingReader {
    fn obtain(&mut self, dst: &mut Vec<u8>) -> usize {
        let shared = &self.shared;
        let capacity = shared.capacity();
        let rear = shared.rear.load(Ordering::Acquire);

        let mut lost = 0u64;
        if rear - self.front > capacity {
            lost = rear - self.front - capacity;
            self.front = rear - capacity;
        }

        let start = dst.len();
        dst.extend((self.front..rear).map(|i| shared.buf[(i & shared.mask) as usize].load(Ordering::Relaxed)));
        fence(Ordering::Acquire);

        // Best effort: anything the writer reached while we were copying is
        // counted as lost, plus one record of slack if it was active.
        let rear_after = shared.rear.load(Ordering::Relaxed);
        let in_flight = if rear_after != rear { MAX_RECORD_SIZE as u64 } else { 0 };
        let clobbered = (rear_after + in_flight).saturating_sub(capacity);
        if clobbered > self.front {
            let torn = (clobbered - self.front).min(rear - self.front);
            dst.drain(start..start + torn as usize);
            lost += torn;
            self.front += torn;
        }

        lost as usize
    }

    fn release(&mut self, count: usize) {
        let rear = self.shared.rear.load(Ordering::Acquire);
        self.front = (self.front + count as u64).min(rear);
    }

    fn capacity(&self) -> usize {
        self.shared.capacity() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_size() {
        assert_eq!(shared_size(1000), 8 + 1024);
        assert_eq!(shared_size(4096), 8 + 4096);
        assert_eq!(shared_size(0), 8 + 1);
    }

    #[test]
    fn test_release_partial() {
        let (writer, mut reader) = ring_channel(1024);
        writer.write(b"hello world");

        let mut out = Vec::new();
        assert_eq!(reader.obtain(&mut out), 0);
        assert_eq!(out, b"hello world");
        reader.release(6);

        out.clear();
        reader.obtain(&mut out);
        assert_eq!(out, b"world");
    }

    #[test]
    fn test_wraparound_reports_lost() {
        let (writer, mut reader) = ring_channel(1024);
        let chunk = [7u8; 100];
        for _ in 0..20 {
            writer.write(&chunk);
        }
        let mut out = Vec::new();
        let lost = reader.obtain(&mut out);
        assert_eq!(lost, 2000 - 1024);
        assert_eq!(out.len(), 1024);
        assert!(out.iter().all(|&b| b == 7));

        reader.release(out.len());
        out.clear();
        assert_eq!(reader.obtain(&mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_release_clamped_to_rear() {
        let (writer, mut reader) = ring_channel(1024);
        writer.write(b"abc");
        reader.release(100);
        writer.write(b"d");
        let mut out = Vec::new();
        reader.obtain(&mut out);
        assert_eq!(out, b"d");
    }
}
