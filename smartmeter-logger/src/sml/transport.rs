//! SML transport v1 framing
//!
//! Finds `1B1B1B1B 01010101`, walks the payload in 4-byte blocks undoing
//! escape doubling, and stops at `1B1B1B1B 1A PP C1 C2`. A CRC mismatch or an
//! unknown escape sequence discards that start sequence only; the scan then
//! resumes at the next one.
//!
//! A frame that lost a byte on the line is no longer 4-byte aligned and its
//! end sequence never shows up. Once another start sequence follows it, the
//! broken frame is given up instead of waiting for more input.

use super::crc::crc16_x25;
use super::{FrameDecoder, FrameMatch, RawEntry, RawFrame, element};

pub(crate) const ESCAPE: [u8; 4] = [0x1B; 4];
pub(crate) const START: [u8; 8] = [0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01];
pub(crate) const END_MARKER: u8 = 0x1A;

/// One SML file (sequence of messages) with transport framing removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmlFrame {
    payload: Vec<u8>,
}

impl SmlFrame {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

impl RawFrame for SmlFrame {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn entries(&self) -> Vec<RawEntry> {
        element::list_entries(&self.payload)
    }
}

enum Scan {
    Complete { payload: Vec<u8>, end: usize },
    /// Ran out of input; `escaped` holds offsets of doubled escape blocks
    Partial { escaped: Vec<usize> },
    Invalid,
}

/// Stateless SML transport v1 decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct SmlDecoder;

impl SmlDecoder {
    pub fn new() -> Self {
        Self
    }

    fn scan(buffer: &[u8], start: usize) -> Scan {
        let mut pos = start + START.len();
        let mut payload = Vec::new();
        let mut escaped = Vec::new();

        loop {
            let Some(block) = buffer.get(pos..pos + 4) else {
                return Scan::Partial { escaped };
            };
            if block != ESCAPE {
                payload.extend_from_slice(block);
                pos += 4;
                continue;
            }

            let Some(next) = buffer.get(pos + 4..pos + 8) else {
                return Scan::Partial { escaped };
            };
            if next == ESCAPE {
                escaped.push(pos + 4);
                payload.extend_from_slice(&ESCAPE);
                pos += 8;
                continue;
            }
            if next[0] != END_MARKER {
                log::debug!(
                    "Unexpected escape sequence {:02X?} at offset {}",
                    next,
                    pos + 4
                );
                return Scan::Invalid;
            }

            let padding = next[1] as usize;
            let received = u16::from_le_bytes([next[2], next[3]]);
            let calculated = crc16_x25(&buffer[start..pos + 6]);
            if received != calculated {
                log::debug!(
                    "Frame CRC mismatch: received=0x{:04X}, calculated=0x{:04X}, len={}",
                    received,
                    calculated,
                    pos + 8 - start
                );
                return Scan::Invalid;
            }
            if padding > 3 || padding > payload.len() {
                log::debug!("Invalid padding count {}", padding);
                return Scan::Invalid;
            }

            payload.truncate(payload.len() - padding);
            return Scan::Complete {
                payload,
                end: pos + 8,
            };
        }
    }
}

fn find_start(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(START.len())
        .position(|w| w == START)
        .map(|i| from + i)
}

/// Next start sequence at or after `from` that is not escaped payload data
fn find_resync(buffer: &[u8], mut from: usize, escaped: &[usize]) -> Option<usize> {
    while let Some(start) = find_start(buffer, from) {
        if !escaped.contains(&start) {
            return Some(start);
        }
        from = start + 1;
    }
    None
}

impl FrameDecoder for SmlDecoder {
    type Frame = SmlFrame;

    fn try_extract_frame(&self, buffer: &[u8]) -> Option<FrameMatch<SmlFrame>> {
        let mut from = 0;
        while let Some(start) = find_start(buffer, from) {
            match Self::scan(buffer, start) {
                Scan::Complete { payload, end } => {
                    return Some(FrameMatch {
                        frame: SmlFrame::new(payload),
                        start,
                        end,
                    });
                }
                Scan::Partial { escaped } => {
                    let next = find_resync(buffer, start + 1, &escaped)?;
                    log::debug!(
                        "Frame at offset {} never ended, resyncing at {}",
                        start,
                        next
                    );
                    from = next;
                }
                Scan::Invalid => from = start + 1,
            }
        }
        None
    }
}
