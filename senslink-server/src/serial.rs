//! Serial line source: device handle, auto-detection, reconnection.
//!
//! The protocol is receive-only: nothing is ever written toward the device.
//! Decoding is permissive UTF-8 (invalid byte sequences are dropped, never
//! fatal) and partial reads are accumulated across timeouts until a newline
//! arrives.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortType, SerialStream, StopBits};

use senslink_common::error::{Error, Result};

use crate::config::SerialConfig;

/// Auto-detection confidence for a candidate port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

// USB vendor IDs of the common microcontroller bridges: Arduino, WCH CH340,
// Silicon Labs CP210x, FTDI.
const KNOWN_VENDOR_IDS: [u16; 4] = [0x2341, 0x1a86, 0x10c4, 0x0403];

const MICRO_KEYWORDS: [&str; 10] = [
    "arduino",
    "esp32",
    "esp8266",
    "teensy",
    "ch340",
    "cp210",
    "ftdi",
    "usb serial",
    "silicon labs",
    "prolific",
];

/// Owns the physical device connection and produces complete decoded lines.
pub struct SerialLineSource {
    config: SerialConfig,
    port: Option<SerialStream>,
    acc: Vec<u8>,
}

impl SerialLineSource {
    /// Create a source. No I/O happens here; the port is opened lazily on
    /// the first read so a missing device is a retried condition, not a
    /// startup failure.
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            port: None,
            acc: Vec::new(),
        }
    }

    /// Whether the device handle is currently open.
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        match &self.config.port {
            Some(port) => format!("serial ({port})"),
            None => "serial (auto-detect)".to_string(),
        }
    }

    /// Read one newline-terminated line.
    ///
    /// Returns `Ok(None)` when the read timeout elapses without completing a
    /// line (the partial bytes stay buffered), `Err` on an I/O failure. The
    /// returned line is trimmed; invalid UTF-8 sequences have been dropped.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.port.is_none() {
            self.open()?;
        }

        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let Some(port) = self.port.as_mut() else {
            return Err(Error::serial("port not open"));
        };

        let mut buf = [0u8; 256];
        match tokio::time::timeout(self.config.read_timeout(), port.read(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                self.close();
                Err(Error::serial("device closed the stream"))
            }
            Ok(Ok(n)) => {
                self.acc.extend_from_slice(&buf[..n]);
                Ok(self.take_line())
            }
            Ok(Err(e)) => {
                self.close();
                Err(Error::serial(format!("read failed: {e}")))
            }
        }
    }

    /// Close the handle, wait the flat reconnect delay, and try to reopen.
    /// Callers retry indefinitely until the bridge is stopped.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.close();
        tokio::time::sleep(self.config.reconnect_delay()).await;
        self.open()
    }

    fn open(&mut self) -> Result<()> {
        let path = match &self.config.port {
            Some(port) => port.clone(),
            None => detect_port()?,
        };

        let builder = tokio_serial::new(&path, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None);

        let stream = SerialStream::open(&builder)
            .map_err(|e| Error::serial(format!("failed to open {path}: {e}")))?;

        tracing::info!(port = %path, baud = self.config.baud_rate, "Serial port opened");
        self.acc.clear();
        self.port = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("Serial port closed");
        }
        self.acc.clear();
    }

    /// Pop the first complete line out of the accumulator, if any.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.acc.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.acc.drain(..=pos).collect();
        Some(decode_lossy(&raw))
    }
}

/// Permissive UTF-8 decoding: invalid sequences are dropped, surrounding
/// whitespace (including the line terminator) is trimmed.
fn decode_lossy(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.contains('\u{FFFD}') {
        tracing::debug!(bytes = raw.len(), "Dropped invalid UTF-8 in serial line");
    }
    text.chars()
        .filter(|&c| c != '\u{FFFD}')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Scan candidate ports and pick the highest-confidence device.
pub fn detect_port() -> Result<String> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::serial(format!("port enumeration failed: {e}")))?;

    let mut best: Option<(Confidence, String)> = None;
    for info in ports {
        let Some(confidence) = score_port(&info.port_type) else {
            continue;
        };
        tracing::debug!(port = %info.port_name, ?confidence, "Candidate serial port");
        if best.as_ref().is_none_or(|(c, _)| confidence > *c) {
            best = Some((confidence, info.port_name));
        }
    }

    match best {
        Some((confidence, port)) => {
            tracing::info!(port = %port, ?confidence, "Auto-detected serial device");
            Ok(port)
        }
        None => Err(Error::NoDeviceFound),
    }
}

/// Score a candidate by vendor/product identity. Ports that cannot be the
/// device (Bluetooth, PCI modems) do not qualify.
fn score_port(port_type: &SerialPortType) -> Option<Confidence> {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            if KNOWN_VENDOR_IDS.contains(&usb.vid) {
                return Some(Confidence::High);
            }
            let text = format!(
                "{} {}",
                usb.product.as_deref().unwrap_or(""),
                usb.manufacturer.as_deref().unwrap_or("")
            )
            .to_lowercase();
            if MICRO_KEYWORDS.iter().any(|kw| text.contains(kw)) {
                Some(Confidence::High)
            } else {
                Some(Confidence::Medium)
            }
        }
        SerialPortType::Unknown => Some(Confidence::Low),
        SerialPortType::PciPort | SerialPortType::BluetoothPort => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_serial::UsbPortInfo;

    fn usb(vid: u16, product: Option<&str>) -> SerialPortType {
        SerialPortType::UsbPort(UsbPortInfo {
            vid,
            pid: 0x0042,
            serial_number: None,
            manufacturer: None,
            product: product.map(str::to_string),
        })
    }

    #[test]
    fn test_known_vendor_scores_high() {
        assert_eq!(score_port(&usb(0x2341, None)), Some(Confidence::High));
        assert_eq!(score_port(&usb(0x1a86, None)), Some(Confidence::High));
    }

    #[test]
    fn test_keyword_product_scores_high() {
        assert_eq!(
            score_port(&usb(0x9999, Some("Arduino Uno R3"))),
            Some(Confidence::High)
        );
        assert_eq!(
            score_port(&usb(0x9999, Some("USB Serial Converter"))),
            Some(Confidence::High)
        );
    }

    #[test]
    fn test_generic_usb_scores_medium() {
        assert_eq!(
            score_port(&usb(0x9999, Some("Widget Modem"))),
            Some(Confidence::Medium)
        );
    }

    #[test]
    fn test_non_usb_ports() {
        assert_eq!(score_port(&SerialPortType::Unknown), Some(Confidence::Low));
        assert_eq!(score_port(&SerialPortType::PciPort), None);
        assert_eq!(score_port(&SerialPortType::BluetoothPort), None);
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }

    #[test]
    fn test_decode_lossy_drops_invalid_bytes() {
        let raw = b"temp\xFF\xFE:25.5\r\n";
        assert_eq!(decode_lossy(raw), "temp:25.5");
    }

    #[test]
    fn test_decode_lossy_plain_line() {
        assert_eq!(decode_lossy(b"temperature:25.6\n"), "temperature:25.6");
    }

    #[test]
    fn test_take_line_accumulates_partials() {
        let mut source = SerialLineSource::new(SerialConfig::default());
        source.acc.extend_from_slice(b"temperat");
        assert_eq!(source.take_line(), None);

        source.acc.extend_from_slice(b"ure:25.6\nnext");
        assert_eq!(source.take_line(), Some("temperature:25.6".to_string()));
        assert_eq!(source.take_line(), None);
        assert_eq!(source.acc, b"next");
    }
}
