//! Serial transport implementation

use super::Transport;
use crate::config::SerialConfig;
use crate::error::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Read;
use std::time::Duration;

/// Serial transport for the meter's optical/IR head
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0")
    /// * `config` - Line settings; meters usually run 9600 8N1
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(path, config.baud_rate)
            .data_bits(data_bits(config.data_bits)?)
            .parity(parity(&config.parity)?)
            .stop_bits(stop_bits(config.stop_bits)?)
            .flow_control(flow_control(&config.flow_control)?)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()?;

        log::info!(
            "Opened serial port: {} at {} baud, {} data bits, parity {}, {} stop bits",
            path,
            config.baud_rate,
            config.data_bits,
            config.parity,
            config.stop_bits
        );

        Ok(SerialTransport { port })
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(Error::Config(format!("unsupported data bits: {}", other))),
    }
}

fn parity(name: &str) -> Result<Parity> {
    match name.to_ascii_lowercase().as_str() {
        "none" | "n" => Ok(Parity::None),
        "odd" | "o" => Ok(Parity::Odd),
        "even" | "e" => Ok(Parity::Even),
        other => Err(Error::Config(format!("unsupported parity: {}", other))),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(Error::Config(format!("unsupported stop bits: {}", other))),
    }
}

fn flow_control(name: &str) -> Result<FlowControl> {
    match name.to_ascii_lowercase().as_str() {
        "none" => Ok(FlowControl::None),
        "software" | "xonxoff" => Ok(FlowControl::Software),
        "hardware" | "rtscts" => Ok(FlowControl::Hardware),
        other => Err(Error::Config(format!("unsupported flow control: {}", other))),
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(0) => Err(Error::Disconnected),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(Error::Disconnected),
            Err(e) => Err(e.into()),
        }
    }
}
