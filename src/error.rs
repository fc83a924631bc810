//! # Error Types
//!
//! Custom error types for the SRXL bus engine using `thiserror`.

use thiserror::Error;

use crate::srxl::bind::BindPhase;

/// Reasons a frame is rejected before its checksum is looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    /// First byte is not the SRXL header
    #[error("invalid header byte: 0x{0:02X}")]
    BadHeader(u8),

    /// Frame is shorter than header + type + length + checksum
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    /// Frame exceeds the maximum SRXL frame size
    #[error("frame too long: {0} bytes")]
    TooLong(usize),

    /// Declared length byte disagrees with the number of bytes supplied
    #[error("declared length {declared} does not match frame length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Packet type byte is not part of the protocol
    #[error("unknown packet type: 0x{0:02X}")]
    UnknownPacketType(u8),

    /// Length is wrong for the packet type
    #[error("invalid length {length} for packet type 0x{packet_type:02X}")]
    InvalidPacketLength { packet_type: u8, length: usize },

    /// Number of channel values does not match the presence mask
    #[error("mask 0x{mask:08X} announces {expected} values, payload carries {actual}")]
    ChannelCountMismatch { mask: u32, expected: usize, actual: usize },

    /// A field holds a value outside its defined set
    #[error("invalid {field} value: 0x{value:02X}")]
    InvalidField { field: &'static str, value: u8 },
}

/// Handshake and device-identity failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArbitrationError {
    /// Advertised priority is outside 1..=100
    #[error("device 0x{device_id:02X} advertised invalid priority {priority}")]
    InvalidPriority { device_id: u8, priority: u8 },

    /// Device id 0x00 or 0xFF used as a source
    #[error("reserved device id 0x{0:02X}")]
    ReservedDeviceId(u8),

    /// Two different unique ids claim the same device id
    #[error("device id 0x{device_id:02X} claimed by unique ids 0x{known:08X} and 0x{claimed:08X}")]
    DuplicateIdentity { device_id: u8, known: u32, claimed: u32 },

    /// Peer table is full
    #[error("too many devices on bus (max {0})")]
    TooManyDevices(usize),

    /// Master proposed a baud rate this device does not support
    #[error("unsupported baud rate code {0}")]
    UnsupportedBaud(u8),
}

/// Engine setup failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("bus index {index} out of range (max {max})")]
    BusIndexOutOfRange { index: usize, max: usize },

    #[error("bus {0} is already initialized")]
    BusAlreadyInitialized(usize),

    #[error("bus {0} is not initialized")]
    BusNotInitialized(usize),

    #[error("local device must be initialized before any bus")]
    DeviceNotInitialized,

    #[error("local device cannot change once a bus is running")]
    DeviceInUse,

    #[error("invalid device id 0x{0:02X}")]
    InvalidDeviceId(u8),

    #[error("invalid device priority {0} (must be 1-100)")]
    InvalidPriority(u8),
}

/// Main error type for the SRXL bus engine and node
#[derive(Debug, Error)]
pub enum SrxlError {
    /// Frame structure errors
    #[error("SRXL framing error: {0}")]
    Framing(#[from] FramingError),

    /// Checksum mismatch
    #[error("SRXL checksum mismatch: expected 0x{expected:04X}, got 0x{received:04X}")]
    Checksum { expected: u16, received: u16 },

    /// Handshake arbitration errors
    #[error("SRXL arbitration error: {0}")]
    Arbitration(#[from] ArbitrationError),

    /// Engine setup errors
    #[error("SRXL configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No bind acknowledgement arrived before the deadline
    #[error("bind timed out before acknowledgement")]
    BindTimeout,

    /// Bind requested while another bind is in progress
    #[error("bind request rejected while {0:?}")]
    BindRejected(BindPhase),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial device could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Channel recorder errors
    #[error("Recorder error: {0}")]
    Recorder(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the SRXL bus engine
pub type Result<T> = std::result::Result<T, SrxlError>;
