//! Transport layer for I/O abstraction
//!
//! The meter only ever talks; nothing is written back, so the trait is
//! read-only.

use crate::error::Result;

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Byte source for the dispatch pipeline
pub trait Transport: Send {
    /// Read available bytes into `buffer`
    ///
    /// Returns `Ok(0)` when the read timed out with nothing received.
    /// End of stream is reported as [`Error::Disconnected`](crate::error::Error::Disconnected).
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;
}
