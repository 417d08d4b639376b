//! InfluxDB line protocol encoding
//!
//! `measurement field=value[,field=value...] timestamp`

use super::Point;
use crate::error::{Error, Result};
use crate::sml::FieldValue;
use std::fmt::Write;

fn escape_measurement(name: &str, out: &mut String) {
    for c in name.chars() {
        if matches!(c, ',' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_key(key: &str, out: &mut String) {
    for c in key.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Append the encoded value, or return false if it cannot be represented
fn write_value(value: &FieldValue, out: &mut String) -> bool {
    match value {
        FieldValue::Int(v) => {
            let _ = write!(out, "{}i", v);
        }
        FieldValue::UInt(v) => {
            let _ = write!(out, "{}u", v);
        }
        FieldValue::Float(v) => {
            if !v.is_finite() {
                return false;
            }
            let _ = write!(out, "{}", v);
            if v.fract() == 0.0 {
                out.push_str(".0");
            }
        }
        FieldValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        FieldValue::Text(s) => {
            out.push('"');
            for c in s.chars() {
                if matches!(c, '"' | '\\') {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
    true
}

/// Encode one point as a single line (no trailing newline)
///
/// Non-finite floats are left out. A point with no representable field is
/// rejected.
pub fn encode(point: &Point) -> Result<String> {
    let mut line = String::new();
    escape_measurement(&point.measurement, &mut line);

    let mut written = 0;
    for (key, value) in &point.fields {
        let mark = line.len();
        line.push(if written == 0 { ' ' } else { ',' });
        escape_key(key, &mut line);
        line.push('=');
        if write_value(value, &mut line) {
            written += 1;
        } else {
            log::debug!("Skipping non-finite field {}", key);
            line.truncate(mark);
        }
    }

    if written == 0 {
        return Err(Error::Store(format!(
            "point for {} has no writable fields",
            point.measurement
        )));
    }

    let _ = write!(line, " {}", point.timestamp_us);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(fields: Vec<(&str, FieldValue)>) -> Point {
        Point {
            measurement: "mainelectricmeter".to_string(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            timestamp_us: 1_700_000_000_000_000,
        }
    }

    #[test]
    fn test_value_types() {
        let line = encode(&point(vec![
            ("a", FieldValue::Int(-5)),
            ("b", FieldValue::UInt(12345)),
            ("c", FieldValue::Float(1.5)),
            ("d", FieldValue::Float(3.0)),
            ("e", FieldValue::Bool(true)),
            ("f", FieldValue::Text("0a01".to_string())),
        ]))
        .unwrap();
        assert_eq!(
            line,
            "mainelectricmeter a=-5i,b=12345u,c=1.5,d=3.0,e=true,f=\"0a01\" 1700000000000000"
        );
    }

    #[test]
    fn test_escaping() {
        let text = FieldValue::Text("say \"hi\" \\".to_string());
        let mut p = point(vec![("key with,=", text)]);
        p.measurement = "main meter,1".to_string();
        assert_eq!(
            encode(&p).unwrap(),
            "main\\ meter\\,1 key\\ with\\,\\==\"say \\\"hi\\\" \\\\\" 1700000000000000"
        );
    }

    #[test]
    fn test_non_finite_float_skipped() {
        let line = encode(&point(vec![
            ("nan", FieldValue::Float(f64::NAN)),
            ("ok", FieldValue::UInt(1)),
        ]))
        .unwrap();
        assert_eq!(line, "mainelectricmeter ok=1u 1700000000000000");
    }

    #[test]
    fn test_no_fields_is_error() {
        assert!(matches!(encode(&point(vec![])), Err(Error::Store(_))));
        assert!(encode(&point(vec![("x", FieldValue::Float(f64::INFINITY))])).is_err());
    }
}
