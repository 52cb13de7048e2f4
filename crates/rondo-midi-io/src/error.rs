//! Error types for the MIDI I/O subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure reported by the underlying multimedia driver, tagged with
    /// the operation that produced it.
    #[error("driver {op} failed: {detail}")]
    Driver { op: &'static str, detail: String },

    /// Exact-name lookup found no matching device.
    #[error("no MIDI device named {0:?}")]
    DeviceNotFound(String),

    /// Index-based lookup fell outside the enumerated directory.
    #[error("device index {index} out of range ({count} devices)")]
    InvalidIndex { index: usize, count: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The caller's buffer cannot hold the pending message.
    #[error("receive buffer too small: message is {needed} bytes, buffer holds {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The transport was closed while (or before) the call was waiting.
    #[error("device closed")]
    Closed,
}

impl Error {
    pub(crate) fn driver(op: &'static str, detail: impl Into<String>) -> Self {
        Error::Driver {
            op,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
