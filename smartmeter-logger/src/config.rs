//! Configuration for the smart meter logger
//!
//! Loaded from a TOML file. Every key has a default, so an empty file (or a
//! file holding only `[influx] token = "..."`) is a valid configuration.

use crate::assembler::{AssemblerConfig, DEFAULT_MAX_BUFFER_BYTES};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Config file used when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub influx: InfluxConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial line settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// `none`, `odd` or `even`
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// `none`, `software` or `hardware`
    #[serde(default = "default_flow_control")]
    pub flow_control: String,
    /// Read timeout; a read that times out yields no bytes and is retried
    #[serde(default = "default_serial_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_flow_control() -> String {
    "none".to_string()
}

fn default_serial_timeout_ms() -> u64 {
    1000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            flow_control: default_flow_control(),
            timeout_ms: default_serial_timeout_ms(),
        }
    }
}

/// InfluxDB v2 connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InfluxConfig {
    /// Base URL, `http://host:port` or `https://host[:port][/path]`
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_org")]
    pub org: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// API token sent as `Authorization: Token ...`; empty sends no header
    #[serde(default)]
    pub token: String,
    /// Measurement name every point is written under
    #[serde(default = "default_measurement")]
    pub measurement: String,
    /// Connect and read timeout per write
    #[serde(default = "default_influx_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_org() -> String {
    "schwalle".to_string()
}

fn default_bucket() -> String {
    "home".to_string()
}

fn default_measurement() -> String {
    "mainelectricmeter".to_string()
}

fn default_influx_timeout_ms() -> u64 {
    10_000
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            org: default_org(),
            bucket: default_bucket(),
            token: String::new(),
            measurement: default_measurement(),
            timeout_ms: default_influx_timeout_ms(),
        }
    }
}

/// Fields recorded per frame
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldsConfig {
    /// Registry display names or OBIS identifiers
    #[serde(default = "default_record")]
    pub record: Vec<String>,
}

fn default_record() -> Vec<String> {
    vec![
        "ZAEHLERSTAND_TOTAL_BEZUG".to_string(),
        "ZAEHLERSTAND_TOTAL_EINSPEISUNG".to_string(),
    ]
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            record: default_record(),
        }
    }
}

/// Dispatch pipeline tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Submissions waiting for a sink worker before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_sink_workers")]
    pub sink_workers: usize,
    /// Assembler buffer cap (0 = unbounded)
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
    /// Keep bytes after a frame for the next one instead of discarding them
    #[serde(default)]
    pub retain_trailing_bytes: bool,
    /// Size of a single transport read
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_sink_workers() -> usize {
    1
}

fn default_max_buffer_bytes() -> usize {
    DEFAULT_MAX_BUFFER_BYTES
}

fn default_read_chunk_bytes() -> usize {
    512
}

impl PipelineConfig {
    pub fn assembler(&self) -> AssemblerConfig {
        AssemblerConfig {
            retain_trailing_bytes: self.retain_trailing_bytes,
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            sink_workers: default_sink_workers(),
            max_buffer_bytes: default_max_buffer_bytes(),
            retain_trailing_bytes: false,
            read_chunk_bytes: default_read_chunk_bytes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.serial.parity, "none");
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.influx.org, "schwalle");
        assert_eq!(config.influx.bucket, "home");
        assert_eq!(config.influx.measurement, "mainelectricmeter");
        assert_eq!(
            config.fields.record,
            vec!["ZAEHLERSTAND_TOTAL_BEZUG", "ZAEHLERSTAND_TOTAL_EINSPEISUNG"]
        );
        assert_eq!(config.pipeline.queue_capacity, 64);
        assert_eq!(config.pipeline.sink_workers, 1);
        assert!(!config.pipeline.retain_trailing_bytes);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.influx.url, "http://localhost:8086");
        assert_eq!(config.pipeline.max_buffer_bytes, 16 * 1024);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[serial]
baud_rate = 115200
parity = "even"

[influx]
url = "http://influx.local:8086"
token = "secret"
bucket = "meters"

[fields]
record = ["AKTUELLE_WIRKLEISTUNG", "0100010800ff"]

[pipeline]
queue_capacity = 8
sink_workers = 2
retain_trailing_bytes = true

[logging]
level = "debug"
"#;

        let config = Config::parse(toml_content).unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.parity, "even");
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.influx.url, "http://influx.local:8086");
        assert_eq!(config.influx.token, "secret");
        assert_eq!(config.influx.bucket, "meters");
        assert_eq!(config.influx.org, "schwalle");
        assert_eq!(config.fields.record.len(), 2);
        assert_eq!(config.pipeline.queue_capacity, 8);
        assert_eq!(config.pipeline.sink_workers, 2);
        assert!(config.pipeline.assembler().retain_trailing_bytes);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = Config::parse("[serial]\nbaud_rate = \"fast\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[influx]\norg = \"home-org\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.influx.org, "home-org");
        assert_eq!(config.serial.baud_rate, 9600);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Config::load("/nonexistent/smartmeter/config.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
