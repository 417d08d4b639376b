//! SML element (TLV) parsing and list entry extraction
//!
//! Type-length byte layout: `E TTT LLLL`. `E` set means another length nibble
//! follows in the next byte. For lists the length is the element count; for
//! everything else it is the total size including the TL bytes.

use super::{FieldValue, RawEntry};
use crate::error::{Error, Result};

pub(crate) const TYPE_OCTETS: u8 = 0x00;
pub(crate) const TYPE_BOOL: u8 = 0x40;
pub(crate) const TYPE_INT: u8 = 0x50;
pub(crate) const TYPE_UINT: u8 = 0x60;
pub(crate) const TYPE_LIST: u8 = 0x70;

/// Message body tag of `SML_GetList.Res`
pub const TAG_GET_LIST_RESPONSE: u64 = 0x0701;

const MAX_DEPTH: usize = 16;

/// One parsed SML element
#[derive(Debug, Clone, PartialEq)]
pub enum SmlElement {
    /// `0x00`, terminates a message
    EndOfMessage,
    /// `0x01`, optional field not set
    Absent,
    Octets(Vec<u8>),
    Bool(bool),
    Int(i64),
    UInt(u64),
    List(Vec<SmlElement>),
}

/// Cursor over an SML message stream
pub struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Parse the next element
    pub fn next_element(&mut self) -> Result<SmlElement> {
        self.element(0)
    }

    fn element(&mut self, depth: usize) -> Result<SmlElement> {
        if depth > MAX_DEPTH {
            return Err(Error::InvalidFrame(format!(
                "nesting deeper than {} at offset {}",
                MAX_DEPTH, self.pos
            )));
        }

        let offset = self.pos;
        let first = self.byte()?;
        match first {
            0x00 => return Ok(SmlElement::EndOfMessage),
            0x01 => return Ok(SmlElement::Absent),
            _ => {}
        }

        let kind = first & 0x70;
        let mut len = (first & 0x0F) as usize;
        let mut tl_len = 1;
        let mut more = first & 0x80 != 0;
        while more {
            let b = self.byte()?;
            if b & 0x70 != 0 {
                return Err(Error::InvalidFrame(format!(
                    "bad TL continuation 0x{:02X} at offset {}",
                    b,
                    self.pos - 1
                )));
            }
            len = (len << 4) | (b & 0x0F) as usize;
            tl_len += 1;
            more = b & 0x80 != 0;
        }

        if kind == TYPE_LIST {
            let mut items = Vec::with_capacity(len.min(32));
            for _ in 0..len {
                items.push(self.element(depth + 1)?);
            }
            return Ok(SmlElement::List(items));
        }

        let Some(body_len) = len.checked_sub(tl_len) else {
            return Err(Error::InvalidFrame(format!(
                "length {} shorter than TL header at offset {}",
                len, offset
            )));
        };
        let body = self.take(body_len)?;

        match kind {
            TYPE_OCTETS => Ok(SmlElement::Octets(body.to_vec())),
            TYPE_BOOL => Ok(SmlElement::Bool(body.iter().any(|&b| b != 0))),
            TYPE_INT => Ok(SmlElement::Int(decode_signed(body, offset)?)),
            TYPE_UINT => Ok(SmlElement::UInt(decode_unsigned(body, offset)?)),
            _ => Err(Error::InvalidFrame(format!(
                "unsupported type 0x{:02X} at offset {}",
                first, offset
            ))),
        }
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.truncated())?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.truncated())?;
        let slice = self.data.get(self.pos..end).ok_or_else(|| self.truncated())?;
        self.pos = end;
        Ok(slice)
    }

    fn truncated(&self) -> Error {
        Error::InvalidFrame(format!("truncated element at offset {}", self.pos))
    }
}

fn decode_unsigned(body: &[u8], offset: usize) -> Result<u64> {
    if body.is_empty() || body.len() > 8 {
        return Err(Error::InvalidFrame(format!(
            "unsigned of {} bytes at offset {}",
            body.len(),
            offset
        )));
    }
    Ok(body.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

fn decode_signed(body: &[u8], offset: usize) -> Result<i64> {
    if body.is_empty() || body.len() > 8 {
        return Err(Error::InvalidFrame(format!(
            "integer of {} bytes at offset {}",
            body.len(),
            offset
        )));
    }
    let init: i64 = if body[0] & 0x80 != 0 { -1 } else { 0 };
    Ok(body.iter().fold(init, |acc, &b| (acc << 8) | b as i64))
}

/// Parse every top-level element of a frame payload
///
/// Stops at the first malformed element and returns what was parsed up to
/// that point together with the error.
pub fn parse_all(payload: &[u8]) -> (Vec<SmlElement>, Option<Error>) {
    let mut parser = Parser::new(payload);
    let mut elements = Vec::new();
    while !parser.is_empty() {
        match parser.next_element() {
            Ok(SmlElement::EndOfMessage) => {}
            Ok(element) => elements.push(element),
            Err(e) => return (elements, Some(e)),
        }
    }
    (elements, None)
}

/// Body of a message if it is a `GetList.Res`, i.e. its value list
fn get_list_values(message: &SmlElement) -> Option<&[SmlElement]> {
    // message: [transactionId, groupNo, abortOnError, body, crc, end]
    let SmlElement::List(fields) = message else {
        return None;
    };
    let SmlElement::List(body) = fields.get(3)? else {
        return None;
    };
    let (SmlElement::UInt(tag), Some(SmlElement::List(response))) = (body.first()?, body.get(1))
    else {
        return None;
    };
    if *tag != TAG_GET_LIST_RESPONSE {
        return None;
    }
    // response: [clientId, serverId, listName, actSensorTime, valList, listSignature, actGatewayTime]
    match response.get(4)? {
        SmlElement::List(values) => Some(values.as_slice()),
        _ => None,
    }
}

/// Convert one `SML_ListEntry` into a raw entry
///
/// Entry layout: `[objName, status, valTime, unit, scaler, value, valueSignature]`.
fn list_entry(entry: &SmlElement) -> Option<RawEntry> {
    let SmlElement::List(fields) = entry else {
        return None;
    };
    let SmlElement::Octets(obj_name) = fields.first()? else {
        return None;
    };
    let scaler = match fields.get(4) {
        Some(SmlElement::Int(s)) => *s,
        _ => 0,
    };
    let value = scaled_value(fields.get(5)?, scaler)?;

    Some(RawEntry {
        identifier: hex::encode(obj_name),
        value,
    })
}

fn scaled_value(value: &SmlElement, scaler: i64) -> Option<FieldValue> {
    let exp = scaler.clamp(-64, 64) as i32;
    let scale = |v: f64| {
        if exp < 0 {
            v / 10f64.powi(-exp)
        } else {
            v * 10f64.powi(exp)
        }
    };
    match value {
        SmlElement::Int(v) if scaler != 0 => Some(FieldValue::Float(scale(*v as f64))),
        SmlElement::UInt(v) if scaler != 0 => Some(FieldValue::Float(scale(*v as f64))),
        SmlElement::Int(v) => Some(FieldValue::Int(*v)),
        SmlElement::UInt(v) => Some(FieldValue::UInt(*v)),
        SmlElement::Bool(v) => Some(FieldValue::Bool(*v)),
        SmlElement::Octets(bytes) => Some(FieldValue::Text(hex::encode(bytes))),
        SmlElement::Absent | SmlElement::EndOfMessage | SmlElement::List(_) => None,
    }
}

/// All list entries of all `GetList.Res` messages in a payload, in order
pub fn list_entries(payload: &[u8]) -> Vec<RawEntry> {
    let (messages, error) = parse_all(payload);
    if let Some(e) = error {
        log::debug!("Stopped decoding frame after {} messages: {}", messages.len(), e);
    }

    messages
        .iter()
        .filter_map(get_list_values)
        .flat_map(|values| values.iter().filter_map(list_entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        // unsigned8 5, integer16 -2, octets "ab", bool true
        let data = [0x62, 0x05, 0x53, 0xFF, 0xFE, 0x03, b'a', b'b', 0x42, 0x01];
        let (elements, error) = parse_all(&data);
        assert!(error.is_none());
        assert_eq!(
            elements,
            vec![
                SmlElement::UInt(5),
                SmlElement::Int(-2),
                SmlElement::Octets(b"ab".to_vec()),
                SmlElement::Bool(true),
            ]
        );
    }

    #[test]
    fn test_parse_nested_list() {
        let data = [0x72, 0x62, 0x01, 0x71, 0x01];
        let mut parser = Parser::new(&data);
        assert_eq!(
            parser.next_element().unwrap(),
            SmlElement::List(vec![
                SmlElement::UInt(1),
                SmlElement::List(vec![SmlElement::Absent]),
            ])
        );
        assert!(parser.is_empty());
    }

    #[test]
    fn test_multi_byte_length() {
        // octet string with 20 bytes body: total 22 = 0x16 -> TL 0x81 0x06
        let mut data = vec![0x81, 0x06];
        data.extend_from_slice(&[0xAA; 20]);
        let mut parser = Parser::new(&data);
        assert_eq!(
            parser.next_element().unwrap(),
            SmlElement::Octets(vec![0xAA; 20])
        );
    }

    #[test]
    fn test_truncated_is_error() {
        let data = [0x65, 0x00, 0x01];
        let (elements, error) = parse_all(&data);
        assert!(elements.is_empty());
        assert!(matches!(error, Some(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_unsupported_type_is_error() {
        let (_, error) = parse_all(&[0x32, 0x00]);
        assert!(error.is_some());
    }

    #[test]
    fn test_scaler_applied() {
        assert_eq!(
            scaled_value(&SmlElement::Int(12345), -1),
            Some(FieldValue::Float(1234.5))
        );
        assert_eq!(
            scaled_value(&SmlElement::UInt(7), 0),
            Some(FieldValue::UInt(7))
        );
        assert_eq!(
            scaled_value(&SmlElement::Octets(vec![0x0a, 0x01]), 0),
            Some(FieldValue::Text("0a01".to_string()))
        );
        assert_eq!(scaled_value(&SmlElement::Absent, 0), None);
    }
}
