//! Frame decoding
//!
//! The assembler and extractor only see the [`FrameDecoder`] and [`RawFrame`]
//! traits. [`SmlDecoder`] is the implementation for meters speaking SML
//! (Smart Message Language) over transport v1:
//!
//! ```text
//! 1B 1B 1B 1B 01 01 01 01   start sequence
//! ...payload...             4-byte aligned, 1B1B1B1B doubled when it occurs
//! 1B 1B 1B 1B 1A PP C1 C2   end: PP = padding count, C1 C2 = CRC-16/X-25 (LE)
//! ```

pub mod builder;
pub mod crc;
pub mod element;
mod transport;

pub use element::SmlElement;
pub use transport::{SmlDecoder, SmlFrame};

use std::fmt;

/// A decoded scalar value from a frame entry
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// One `(identifier, value)` entry as found in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    /// OBIS address as lowercase hex
    pub identifier: String,
    pub value: FieldValue,
}

/// A complete, validated protocol message
pub trait RawFrame {
    /// Unescaped message bytes
    fn payload(&self) -> &[u8];

    /// Entries in frame order, decoded on each call
    fn entries(&self) -> Vec<RawEntry>;
}

/// A frame located inside a buffer
#[derive(Debug)]
pub struct FrameMatch<F> {
    pub frame: F,
    /// Offset of the first byte of the frame
    pub start: usize,
    /// Offset one past the last byte of the frame
    pub end: usize,
}

/// Boundary detection for a byte-oriented meter protocol
pub trait FrameDecoder: Send {
    type Frame: RawFrame + Send;

    /// Locate the first complete, well-formed frame in `buffer`
    ///
    /// Returns `None` when the buffer holds only a partial frame or garbage.
    /// Must not panic on arbitrary input.
    fn try_extract_frame(&self, buffer: &[u8]) -> Option<FrameMatch<Self::Frame>>;
}
