//! Error types for the record codec.
//!
//! Codec errors never leave the consumer side of the crate: the reader and
//! merger turn every one of them into "no further complete record found"
//! and keep going. They are public so callers walking raw buffers with
//! [`RecordCursor`](crate::record::RecordCursor) can tell the cases apart.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecordError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Fewer bytes remain than the record header claims.
    #[error("record truncated: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A backward step would land before the front of the span.
    #[error("record boundary out of range at offset {offset}")]
    OutOfRange { offset: usize },

    /// Leading and trailing length bytes disagree.
    #[error("inconsistent record lengths at offset {offset}: leading {leading}, trailing {trailing}")]
    Inconsistent {
        offset: usize,
        leading: u8,
        trailing: u8,
    },

    #[error("payload of {0} bytes exceeds the 255 byte limit")]
    PayloadTooLong(usize),
}
