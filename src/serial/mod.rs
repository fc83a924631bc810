//! # Serial Communication Module
//!
//! Hosts an SRXL bus on a Linux UART.
//!
//! This module handles:
//! - Opening the serial port at 115200 baud, 8N1
//! - Reading raw bus bytes with a timeout
//! - Writing queued engine frames and applying baud changes

pub mod outbox;
pub mod port_trait;

pub use outbox::SerialOutbox;
pub use port_trait::{SerialPortIO, TokioSerialPort};

use crate::error::{Result, SrxlError};
use tokio::time::{timeout, Duration};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Baud rate every SRXL bus starts at
pub const SRXL_DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default UART device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters
    "/dev/ttyAMA0", // Raspberry Pi primary UART
];

/// SRXL Serial Port Handler
///
/// Owns the UART a bus runs on.
pub struct SrxlSerial<P = TokioSerialPort> {
    /// Serial port handle
    port: P,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    baud_rate: u32,
}

impl<P> std::fmt::Debug for SrxlSerial<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrxlSerial")
            .field("device_path", &self.device_path)
            .field("baud_rate", &self.baud_rate)
            .finish_non_exhaustive()
    }
}

impl SrxlSerial<TokioSerialPort> {
    /// Open the bus UART
    ///
    /// Auto-detects the device by trying common paths.
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use srxl_bus::serial::SrxlSerial;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let serial = SrxlSerial::open()?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open() -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, SRXL_DEFAULT_BAUD_RATE)
    }

    /// Open the bus UART with custom device paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Initial line speed
    ///
    /// # Returns
    ///
    /// * `Result<SrxlSerial>` - Connected serial port or error
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened SRXL bus at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port: TokioSerialPort::new(port),
                        device_path: path.to_string(),
                        baud_rate,
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(SrxlError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with SRXL line settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| SrxlError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl<P: SerialPortIO> SrxlSerial<P> {
    /// Wrap an already opened port
    pub fn with_port(port: P, device_path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port,
            device_path: device_path.into(),
            baud_rate,
        }
    }

    /// Send one complete SRXL frame
    ///
    /// # Arguments
    ///
    /// * `packet` - Complete frame (header, type, length, payload, CRC)
    pub async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port
            .write_all(packet)
            .await
            .map_err(|e| SrxlError::Serial(format!("Failed to write packet: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| SrxlError::Serial(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent SRXL packet ({} bytes)", packet.len());
        Ok(())
    }

    /// Read bus bytes, waiting at most `timeout_ms`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(n))` - `n` bytes were read into `buf`
    /// * `Ok(None)` - The line stayed idle for the whole timeout
    ///
    /// A zero-length read means the port went away and is an error.
    pub async fn read_with_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<Option<usize>> {
        match timeout(Duration::from_millis(timeout_ms as u64), self.port.read(buf)).await {
            Ok(Ok(0)) => Err(SrxlError::Serial(format!("{} closed", self.device_path))),
            Ok(Ok(n)) => Ok(Some(n)),
            Ok(Err(e)) => Err(SrxlError::Serial(format!("Failed to read: {}", e))),
            Err(_) => Ok(None),
        }
    }

    /// Change the line speed
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        if baud_rate == self.baud_rate {
            return Ok(());
        }

        self.port
            .set_baud_rate(baud_rate)
            .map_err(|e| SrxlError::Serial(format!("Failed to set baud rate {}: {}", baud_rate, e)))?;

        info!("{} now at {} baud", self.device_path, baud_rate);
        self.baud_rate = baud_rate;
        Ok(())
    }

    /// Write everything the engine queued, then apply a pending baud change
    ///
    /// Frames go out at the old rate; a handshake announcing a new rate must
    /// reach the bus before the switch.
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of frames written
    pub async fn flush_outbox(&mut self, outbox: &mut SerialOutbox) -> Result<usize> {
        let mut written = 0;
        while let Some(frame) = outbox.pop_frame() {
            self.send_packet(&frame).await?;
            written += 1;
        }

        if let Some(baud) = outbox.take_baud() {
            self.set_baud_rate(baud)?;
        }

        Ok(written)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[cfg(test)]
mod tests {
    use super::port_trait::mocks::MockSerialPort;
    use super::*;
    use crate::srxl::encoder::encode_channel_frame;
    use crate::srxl::Transport;

    fn mock_serial() -> (SrxlSerial<MockSerialPort>, MockSerialPort) {
        let mock = MockSerialPort::new();
        let serial = SrxlSerial::with_port(mock.clone(), "/dev/mock0", SRXL_DEFAULT_BAUD_RATE);
        (serial, mock)
    }

    #[test]
    fn test_constants() {
        assert_eq!(SRXL_DEFAULT_BAUD_RATE, 115_200);
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyUSB0");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = SrxlSerial::open_with_paths(invalid_paths, SRXL_DEFAULT_BAUD_RATE);

        match result {
            Err(SrxlError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let empty_paths: &[&str] = &[];
        let result = SrxlSerial::open_with_paths(empty_paths, SRXL_DEFAULT_BAUD_RATE);
        assert!(matches!(result, Err(SrxlError::SerialPortNotFound(_))));
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = SrxlSerial::open_port("/dev/nonexistent_serial_device_12345", SRXL_DEFAULT_BAUD_RATE);

        match result {
            Err(SrxlError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_send_packet_writes_frame() {
        let (mut serial, mock) = mock_serial();
        let frame = encode_channel_frame(false, 0, -40, 0, 0b1, &[1500]);

        serial.send_packet(frame.as_bytes()).await.unwrap();

        assert_eq!(mock.get_written_data(), vec![frame.as_bytes().to_vec()]);
    }

    #[tokio::test]
    async fn test_send_packet_write_error() {
        let (mut serial, mock) = mock_serial();
        mock.set_write_error(std::io::ErrorKind::BrokenPipe);

        let result = serial.send_packet(&[0xA6]).await;
        assert!(matches!(result, Err(SrxlError::Serial(msg)) if msg.contains("write")));
    }

    #[tokio::test]
    async fn test_send_packet_flush_error() {
        let (mut serial, mock) = mock_serial();
        mock.set_flush_error(std::io::ErrorKind::TimedOut);

        let result = serial.send_packet(&[0xA6]).await;
        assert!(matches!(result, Err(SrxlError::Serial(msg)) if msg.contains("flush")));
    }

    #[tokio::test]
    async fn test_read_with_timeout_returns_bytes() {
        let (mut serial, mock) = mock_serial();
        mock.queue_read(&[0xA6, 0xCD]);

        let mut buf = [0u8; 16];
        let n = serial.read_with_timeout(&mut buf, 10).await.unwrap();
        assert_eq!(n, Some(2));
        assert_eq!(&buf[..2], &[0xA6, 0xCD]);
    }

    #[tokio::test]
    async fn test_read_with_timeout_on_idle_line() {
        let (mut serial, _mock) = mock_serial();

        let mut buf = [0u8; 16];
        assert_eq!(serial.read_with_timeout(&mut buf, 5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_with_timeout_on_closed_port() {
        let (mut serial, mock) = mock_serial();
        mock.queue_read(&[]);

        let mut buf = [0u8; 16];
        let result = serial.read_with_timeout(&mut buf, 10).await;
        assert!(matches!(result, Err(SrxlError::Serial(msg)) if msg.contains("closed")));
    }

    #[tokio::test]
    async fn test_flush_outbox_writes_frames_before_baud_change() {
        let (mut serial, mock) = mock_serial();
        let mut outbox = SerialOutbox::new();
        outbox.transmit(&[1, 2, 3]);
        outbox.set_baud(400_000);
        outbox.transmit(&[4, 5]);

        let written = serial.flush_outbox(&mut outbox).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(mock.get_written_data(), vec![vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(mock.get_baud_changes(), vec![400_000]);
        assert_eq!(serial.baud_rate(), 400_000);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_set_same_baud_is_noop() {
        let (mut serial, mock) = mock_serial();
        serial.set_baud_rate(SRXL_DEFAULT_BAUD_RATE).unwrap();
        assert!(mock.get_baud_changes().is_empty());
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_open_with_real_hardware() {
        match SrxlSerial::open() {
            Ok(serial) => println!("Opened SRXL bus at: {}", serial.device_path()),
            Err(_) => println!("No UART detected (this is OK for CI/CD)"),
        }
    }
}
