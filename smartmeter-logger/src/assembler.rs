//! Frame assembler
//!
//! Accumulates transport chunks until the decoder recognises a complete
//! frame. Chunk boundaries are dictated by the serial driver and carry no
//! meaning; the buffer is what makes assembly insensitive to them.
//!
//! On success the whole buffer is cleared, including any bytes after the
//! frame, unless `retain_trailing_bytes` is set. Malformed input never fails:
//! it stays buffered until the decoder skips past it or the size cap trims it.

use crate::hexdump::hex_dump;
use crate::sml::{FrameDecoder, FrameMatch};

/// Default cap on buffered bytes (16 KiB)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 16 * 1024;

/// Assembler tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Keep bytes after a frame's end for the next `feed` instead of clearing
    pub retain_trailing_bytes: bool,
    /// Keep at most this many bytes while no frame is found (0 = unbounded)
    pub max_buffer_bytes: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            retain_trailing_bytes: false,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Result of feeding one chunk
#[derive(Debug)]
pub enum Feed<F> {
    /// A complete frame; the buffer has been reset
    Frame(F),
    /// No complete frame yet; bytes are retained
    Incomplete,
}

impl<F> Feed<F> {
    pub fn is_frame(&self) -> bool {
        matches!(self, Feed::Frame(_))
    }

    pub fn into_frame(self) -> Option<F> {
        match self {
            Feed::Frame(f) => Some(f),
            Feed::Incomplete => None,
        }
    }
}

/// Buffers a byte stream and cuts it into frames
pub struct FrameAssembler<D: FrameDecoder> {
    decoder: D,
    buffer: Vec<u8>,
    config: AssemblerConfig,
}

impl<D: FrameDecoder> FrameAssembler<D> {
    pub fn new(decoder: D) -> Self {
        Self::with_config(decoder, AssemblerConfig::default())
    }

    pub fn with_config(decoder: D, config: AssemblerConfig) -> Self {
        Self {
            decoder,
            buffer: Vec::new(),
            config,
        }
    }

    /// Append `chunk` and try to extract one frame
    pub fn feed(&mut self, chunk: &[u8]) -> Feed<D::Frame> {
        self.buffer.extend_from_slice(chunk);

        match self.decoder.try_extract_frame(&self.buffer) {
            Some(FrameMatch { frame, start, end }) => {
                if start > 0 {
                    log::debug!("Skipped {} bytes before frame start", start);
                }
                if self.config.retain_trailing_bytes {
                    self.buffer.drain(..end.min(self.buffer.len()));
                } else {
                    if end < self.buffer.len() {
                        log::debug!(
                            "Discarding {} bytes after frame end",
                            self.buffer.len() - end
                        );
                    }
                    self.buffer.clear();
                }
                Feed::Frame(frame)
            }
            None => {
                self.enforce_cap();
                Feed::Incomplete
            }
        }
    }

    fn enforce_cap(&mut self) {
        let cap = self.config.max_buffer_bytes;
        if cap == 0 || self.buffer.len() <= cap {
            return;
        }
        let excess = self.buffer.len() - cap;
        log::warn!(
            "No frame found in {} buffered bytes, dropping oldest {}",
            self.buffer.len(),
            excess
        );
        self.buffer.drain(..excess);
    }

    /// Number of bytes currently buffered
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Buffered bytes
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Hex dump of the buffered bytes, for diagnostics
    pub fn hex_dump(&self) -> String {
        hex_dump(&self.buffer)
    }

    /// Drop all buffered bytes
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sml::builder::FrameBuilder;
    use crate::sml::{FieldValue, RawFrame, SmlDecoder, SmlElement, SmlFrame};

    fn meter_frame(value: u64) -> Vec<u8> {
        FrameBuilder::new()
            .entry("0100010800ff", SmlElement::UInt(value))
            .build()
            .unwrap()
    }

    fn first_value(frame: &SmlFrame) -> FieldValue {
        frame.entries()[0].value.clone()
    }

    #[test]
    fn test_garbage_is_incomplete() {
        let mut assembler = FrameAssembler::new(SmlDecoder);
        assert!(!assembler.feed(&[0x13, 0x37, 0x42]).is_frame());
        assert_eq!(assembler.buffer_len(), 3);
        assert_eq!(assembler.hex_dump(), "0x13 0x37 0x42");
    }

    #[test]
    fn test_empty_chunk() {
        let mut assembler = FrameAssembler::new(SmlDecoder);
        assert!(!assembler.feed(&[]).is_frame());
        assert_eq!(assembler.buffer_len(), 0);
    }

    #[test]
    fn test_buffer_empty_after_frame() {
        let mut assembler = FrameAssembler::new(SmlDecoder);
        let frame = assembler.feed(&meter_frame(7)).into_frame().unwrap();
        assert_eq!(first_value(&frame), FieldValue::UInt(7));
        assert_eq!(assembler.buffer_len(), 0);
    }

    #[test]
    fn test_every_split_point_yields_same_frame() {
        let bytes = meter_frame(12345);
        let whole = FrameAssembler::new(SmlDecoder)
            .feed(&bytes)
            .into_frame()
            .unwrap();

        for split in 0..=bytes.len() {
            let mut assembler = FrameAssembler::new(SmlDecoder);
            let first = assembler.feed(&bytes[..split]);
            let frame = match first {
                Feed::Frame(f) => {
                    assert_eq!(split, bytes.len());
                    f
                }
                Feed::Incomplete => assembler.feed(&bytes[split..]).into_frame().unwrap(),
            };
            assert_eq!(frame, whole, "split at {}", split);
            assert_eq!(assembler.buffer_len(), 0);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = meter_frame(99);
        let mut assembler = FrameAssembler::new(SmlDecoder);
        let mut frames = Vec::new();
        for b in &bytes {
            if let Feed::Frame(f) = assembler.feed(std::slice::from_ref(b)) {
                frames.push(f);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(first_value(&frames[0]), FieldValue::UInt(99));
    }

    #[test]
    fn test_recovers_after_lost_byte() {
        let mut broken = meter_frame(0);
        broken.remove(20);

        let mut assembler = FrameAssembler::new(SmlDecoder);
        assert!(!assembler.feed(&broken).is_frame());

        let mut values = Vec::new();
        for value in 1..=10 {
            if let Feed::Frame(f) = assembler.feed(&meter_frame(value)) {
                values.push(first_value(&f));
            }
        }
        let expected: Vec<_> = (1..=10).map(FieldValue::UInt).collect();
        assert_eq!(values, expected);
        assert_eq!(assembler.buffer_len(), 0);
    }

    #[test]
    fn test_trailing_bytes_discarded_by_default() {
        let mut bytes = meter_frame(1);
        bytes.extend_from_slice(&meter_frame(2)[..10]);
        let mut assembler = FrameAssembler::new(SmlDecoder);
        assert!(assembler.feed(&bytes).is_frame());
        assert_eq!(assembler.buffer_len(), 0);
    }

    #[test]
    fn test_trailing_bytes_retained_when_configured() {
        let second = meter_frame(2);
        let mut bytes = meter_frame(1);
        bytes.extend_from_slice(&second[..10]);

        let config = AssemblerConfig {
            retain_trailing_bytes: true,
            ..AssemblerConfig::default()
        };
        let mut assembler = FrameAssembler::with_config(SmlDecoder, config);
        let frame = assembler.feed(&bytes).into_frame().unwrap();
        assert_eq!(first_value(&frame), FieldValue::UInt(1));
        assert_eq!(assembler.buffered(), &second[..10]);

        let frame = assembler.feed(&second[10..]).into_frame().unwrap();
        assert_eq!(first_value(&frame), FieldValue::UInt(2));
        assert_eq!(assembler.buffer_len(), 0);
    }

    #[test]
    fn test_garbage_then_frame() {
        let mut assembler = FrameAssembler::new(SmlDecoder);
        assert!(!assembler.feed(&[0xFF; 50]).is_frame());
        let frame = assembler.feed(&meter_frame(3)).into_frame().unwrap();
        assert_eq!(first_value(&frame), FieldValue::UInt(3));
        assert_eq!(assembler.buffer_len(), 0);
    }

    #[test]
    fn test_buffer_cap_keeps_newest_bytes() {
        let config = AssemblerConfig {
            max_buffer_bytes: 8,
            ..AssemblerConfig::default()
        };
        let mut assembler = FrameAssembler::with_config(SmlDecoder, config);
        assembler.feed(&[0u8; 6]);
        assembler.feed(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(assembler.buffered(), &[0, 0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_reset() {
        let mut assembler = FrameAssembler::new(SmlDecoder);
        assembler.feed(&[1, 2, 3]);
        assembler.reset();
        assert_eq!(assembler.buffer_len(), 0);
    }
}
