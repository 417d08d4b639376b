//! SML frame encoding for simulators and tests
//!
//! Produces the same framing [`SmlDecoder`](super::SmlDecoder) expects: an
//! open response, one `GetList.Res` carrying the configured entries, and a
//! close response, wrapped in transport v1 escape sequences.

use super::SmlElement;
use super::crc::crc16_x25;
use super::element::{
    TAG_GET_LIST_RESPONSE, TYPE_BOOL, TYPE_INT, TYPE_LIST, TYPE_OCTETS, TYPE_UINT,
};
use super::transport::{END_MARKER, ESCAPE, START};
use crate::error::{Error, Result};

const TAG_OPEN_RESPONSE: u64 = 0x0101;
const TAG_CLOSE_RESPONSE: u64 = 0x0201;

fn nibble_count(mut value: usize) -> usize {
    let mut n = 1;
    while value > 0x0F {
        value >>= 4;
        n += 1;
    }
    n
}

fn write_tl(kind: u8, len: usize, width: usize, out: &mut Vec<u8>) {
    for i in 0..width {
        let shift = 4 * (width - 1 - i);
        let mut b = ((len >> shift) & 0x0F) as u8;
        if i == 0 {
            b |= kind;
        }
        if i + 1 < width {
            b |= 0x80;
        }
        out.push(b);
    }
}

fn write_sized(kind: u8, body: &[u8], out: &mut Vec<u8>) {
    // the length field counts its own TL bytes
    let mut width = 1;
    while nibble_count(width + body.len()) > width {
        width += 1;
    }
    write_tl(kind, width + body.len(), width, out);
    out.extend_from_slice(body);
}

fn unsigned_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

fn signed_bytes(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut skip = 0;
    while skip < 7 {
        let redundant = (bytes[skip] == 0x00 && bytes[skip + 1] & 0x80 == 0)
            || (bytes[skip] == 0xFF && bytes[skip + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        skip += 1;
    }
    bytes[skip..].to_vec()
}

/// Append the TLV encoding of `element`
pub fn encode_element(element: &SmlElement, out: &mut Vec<u8>) {
    match element {
        SmlElement::EndOfMessage => out.push(0x00),
        SmlElement::Absent => out.push(0x01),
        SmlElement::Octets(bytes) => write_sized(TYPE_OCTETS, bytes, out),
        SmlElement::Bool(v) => write_sized(TYPE_BOOL, &[*v as u8], out),
        SmlElement::Int(v) => write_sized(TYPE_INT, &signed_bytes(*v), out),
        SmlElement::UInt(v) => write_sized(TYPE_UINT, &unsigned_bytes(*v), out),
        SmlElement::List(items) => {
            write_tl(TYPE_LIST, items.len(), nibble_count(items.len()), out);
            for item in items {
                encode_element(item, out);
            }
        }
    }
}

/// Encode one message with its checksum and end marker
pub fn encode_message(transaction_id: &[u8], tag: u64, body: SmlElement, out: &mut Vec<u8>) {
    let mut message = Vec::new();
    write_tl(TYPE_LIST, 6, 1, &mut message);
    encode_element(&SmlElement::Octets(transaction_id.to_vec()), &mut message);
    encode_element(&SmlElement::UInt(0), &mut message);
    encode_element(&SmlElement::UInt(0), &mut message);
    encode_element(
        &SmlElement::List(vec![SmlElement::UInt(tag), body]),
        &mut message,
    );
    let crc = crc16_x25(&message);
    message.push(TYPE_UINT | 0x03);
    message.extend_from_slice(&crc.to_be_bytes());
    message.push(0x00);
    out.extend_from_slice(&message);
}

/// Wrap a payload in transport v1 start/end sequences
///
/// The payload is zero-padded to a multiple of four and any aligned
/// `1B1B1B1B` block is doubled.
pub fn wrap_transport(payload: &[u8]) -> Vec<u8> {
    let padding = (4 - payload.len() % 4) % 4;
    let mut padded = payload.to_vec();
    padded.resize(payload.len() + padding, 0x00);

    let mut out = START.to_vec();
    for block in padded.chunks(4) {
        if block == ESCAPE {
            out.extend_from_slice(&ESCAPE);
        }
        out.extend_from_slice(block);
    }
    out.extend_from_slice(&ESCAPE);
    out.push(END_MARKER);
    out.push(padding as u8);
    let crc = crc16_x25(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Builds a complete meter frame
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    server_id: Vec<u8>,
    entries: Vec<SmlElement>,
    invalid: Option<String>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            server_id: vec![0x0A, 0x01, 0x45, 0x4D, 0x48, 0x00, 0x00, 0x00, 0x00, 0x01],
            entries: Vec::new(),
            invalid: None,
        }
    }

    pub fn server_id(mut self, server_id: &[u8]) -> Self {
        self.server_id = server_id.to_vec();
        self
    }

    /// Add an entry without unit or scaler
    pub fn entry(self, identifier: &str, value: SmlElement) -> Self {
        self.push_entry(identifier, value, SmlElement::Absent, SmlElement::Absent)
    }

    /// Add an entry with unit code and decimal scaler
    pub fn scaled_entry(self, identifier: &str, value: SmlElement, unit: u8, scaler: i8) -> Self {
        self.push_entry(
            identifier,
            value,
            SmlElement::UInt(unit as u64),
            SmlElement::Int(scaler as i64),
        )
    }

    fn push_entry(
        mut self,
        identifier: &str,
        value: SmlElement,
        unit: SmlElement,
        scaler: SmlElement,
    ) -> Self {
        let obj_name = match hex::decode(identifier) {
            Ok(bytes) => bytes,
            Err(e) => {
                if self.invalid.is_none() {
                    self.invalid = Some(format!("object name {:?}: {}", identifier, e));
                }
                return self;
            }
        };
        self.entries.push(SmlElement::List(vec![
            SmlElement::Octets(obj_name),
            SmlElement::Absent,
            SmlElement::Absent,
            unit,
            scaler,
            value,
            SmlElement::Absent,
        ]));
        self
    }

    /// Unescaped SML file: open, get-list and close responses
    ///
    /// Fails if an entry was added with an object name that is not hex.
    pub fn payload(&self) -> Result<Vec<u8>> {
        if let Some(reason) = &self.invalid {
            return Err(Error::InvalidFrame(reason.clone()));
        }
        let mut out = Vec::new();
        encode_message(
            &[0x01],
            TAG_OPEN_RESPONSE,
            SmlElement::List(vec![
                SmlElement::Absent,
                SmlElement::Absent,
                SmlElement::Octets(vec![0x00, 0x01]),
                SmlElement::Octets(self.server_id.clone()),
                SmlElement::Absent,
                SmlElement::Absent,
            ]),
            &mut out,
        );
        encode_message(
            &[0x02],
            TAG_GET_LIST_RESPONSE,
            SmlElement::List(vec![
                SmlElement::Absent,
                SmlElement::Octets(self.server_id.clone()),
                SmlElement::Absent,
                SmlElement::Absent,
                SmlElement::List(self.entries.clone()),
                SmlElement::Absent,
                SmlElement::Absent,
            ]),
            &mut out,
        );
        encode_message(
            &[0x03],
            TAG_CLOSE_RESPONSE,
            SmlElement::List(vec![SmlElement::Absent]),
            &mut out,
        );
        Ok(out)
    }

    /// Framed bytes as sent on the wire
    pub fn build(&self) -> Result<Vec<u8>> {
        Ok(wrap_transport(&self.payload()?))
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
