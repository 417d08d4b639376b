//! InfluxDB v2 write client
//!
//! One blocking request per point through a shared [`ureq::Agent`]:
//!
//! ```text
//! POST /api/v2/write?org=..&bucket=..&precision=us HTTP/1.1
//! Authorization: Token ...
//!
//! mainelectricmeter ZAEHLERSTAND_TOTAL_BEZUG=12345u 1700000000000000
//! ```
//!
//! Both `http://` and `https://` endpoints are accepted; TLS is handled by
//! ureq's rustls backend.

use super::{Point, PointWriter, line_protocol};
use crate::config::InfluxConfig;
use crate::error::{Error, Result};
use std::io::Read;
use std::time::Duration;

const MAX_ERROR_BODY: u64 = 512;

/// Strip trailing slashes and check the scheme and host
fn base_url(url: &str) -> Result<&str> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| Error::InvalidUrl(format!("{} (expected http:// or https://)", url)))?;
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(Error::InvalidUrl(format!("{} (missing host)", url)));
    }
    let port = authority
        .rsplit_once(':')
        .map(|(_, port)| port)
        .filter(|port| !port.ends_with(']'));
    if let Some(port) = port {
        port.parse::<u16>()
            .map_err(|_| Error::InvalidUrl(format!("{} (bad port {})", url, port)))?;
    }
    Ok(url.trim_end_matches('/'))
}

/// Percent-encode a query parameter value
fn query_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Writes points to an InfluxDB v2 bucket
pub struct InfluxWriter {
    agent: ureq::Agent,
    write_url: String,
    token: Option<String>,
}

impl InfluxWriter {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let base = base_url(&config.url)?;
        let write_url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=us",
            base,
            query_escape(&config.org),
            query_escape(&config.bucket)
        );
        log::info!(
            "InfluxDB endpoint {}, org {}, bucket {}",
            base,
            config.org,
            config.bucket
        );

        let timeout = Duration::from_millis(config.timeout_ms.max(1));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();

        Ok(Self {
            agent,
            write_url,
            token: Some(config.token.clone()).filter(|t| !t.is_empty()),
        })
    }
}

impl PointWriter for InfluxWriter {
    fn write(&self, point: &Point) -> Result<()> {
        let body = line_protocol::encode(point)?;

        let mut request = self
            .agent
            .post(&self.write_url)
            .set("Content-Type", "text/plain; charset=utf-8");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Token {}", token));
        }

        match request.send_string(&body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => {
                let status = format!("{} {}", code, response.status_text());
                let mut detail = String::new();
                let _ = response
                    .into_reader()
                    .take(MAX_ERROR_BODY)
                    .read_to_string(&mut detail);
                Err(Error::Store(format!("{}: {}", status, detail.trim())))
            }
            Err(ureq::Error::Transport(transport)) => Err(Error::Store(transport.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sml::FieldValue;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    fn config(url: &str) -> InfluxConfig {
        InfluxConfig {
            url: url.to_string(),
            token: "s3cr3t".to_string(),
            ..InfluxConfig::default()
        }
    }

    fn point() -> Point {
        Point {
            measurement: "mainelectricmeter".to_string(),
            fields: vec![(
                "ZAEHLERSTAND_TOTAL_BEZUG".to_string(),
                FieldValue::UInt(12345),
            )],
            timestamp_us: 1_700_000_000_000_000,
        }
    }

    /// Accept one request, reply with `response`, hand back (head, body)
    fn serve_once(response: &'static str) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" {
                    break;
                }
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            (&stream).write_all(response.as_bytes()).unwrap();
            tx.send((head, String::from_utf8(body).unwrap())).unwrap();
        });

        (url, rx)
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            base_url("http://localhost:8086").unwrap(),
            "http://localhost:8086"
        );
        assert_eq!(
            base_url("https://influx.lan/proxy/").unwrap(),
            "https://influx.lan/proxy"
        );
        assert_eq!(base_url("http://[::1]:8086").unwrap(), "http://[::1]:8086");
        assert_eq!(base_url("http://[::1]").unwrap(), "http://[::1]");
    }

    #[test]
    fn test_base_url_rejects_bad_urls() {
        assert!(matches!(
            base_url("ftp://localhost:8086"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(base_url("localhost:8086").is_err());
        assert!(base_url("http://").is_err());
        assert!(base_url("https:///api").is_err());
        assert!(base_url("http://host:notaport").is_err());
    }

    #[test]
    fn test_query_escape() {
        assert_eq!(query_escape("home"), "home");
        assert_eq!(query_escape("my org&x"), "my%20org%26x");
    }

    #[test]
    fn test_https_write_url() {
        let writer = InfluxWriter::new(&config("https://eu-central-1.cloud.example/")).unwrap();
        assert_eq!(
            writer.write_url,
            "https://eu-central-1.cloud.example/api/v2/write?org=schwalle&bucket=home&precision=us"
        );
        assert_eq!(writer.token.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_empty_token_sends_no_authorization() {
        let (url, rx) = serve_once("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n");
        let mut cfg = config(&url);
        cfg.token.clear();
        let writer = InfluxWriter::new(&cfg).unwrap();
        assert!(writer.token.is_none());
        writer.write(&point()).unwrap();

        let (head, _) = rx.recv().unwrap();
        assert!(!head.to_ascii_lowercase().contains("authorization"));
    }

    #[test]
    fn test_write_posts_line_protocol() {
        let (url, rx) = serve_once("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n");
        let writer = InfluxWriter::new(&config(&url)).unwrap();
        writer.write(&point()).unwrap();

        let (head, body) = rx.recv().unwrap();
        assert!(head.starts_with(
            "POST /api/v2/write?org=schwalle&bucket=home&precision=us HTTP/1.1\r\n"
        ));
        assert!(head.contains("Authorization: Token s3cr3t\r\n"));
        assert_eq!(
            body,
            "mainelectricmeter ZAEHLERSTAND_TOTAL_BEZUG=12345u 1700000000000000"
        );
    }

    #[test]
    fn test_error_status_is_store_error() {
        let (url, _rx) = serve_once(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 12\r\n\r\nunauthorized",
        );
        let writer = InfluxWriter::new(&config(&url)).unwrap();
        match writer.write(&point()) {
            Err(Error::Store(msg)) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("unauthorized"));
            }
            other => panic!("expected store error, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let writer = InfluxWriter::new(&config(&url)).unwrap();
        assert!(matches!(writer.write(&point()), Err(Error::Store(_))));
    }

    #[test]
    fn test_tls_handshake_failure_is_store_error() {
        // Plain TCP peer that hangs up instead of answering the ClientHello
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("https://{}", listener.local_addr().unwrap());
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let writer = InfluxWriter::new(&config(&url)).unwrap();
        assert!(matches!(writer.write(&point()), Err(Error::Store(_))));
    }
}
