//! # SRXL Protocol Constants and Types
//!
//! Core protocol definitions for SRXL2 bus communication.

use crate::error::FramingError;

/// SRXL frame header byte (always 0xA6)
pub const SRXL_HEADER: u8 = 0xA6;

/// Handshake packet type
pub const SRXL_PACKET_HANDSHAKE: u8 = 0x21;

/// Bind info packet type
pub const SRXL_PACKET_BIND: u8 = 0x41;

/// Parameter configuration packet type (accepted, not interpreted)
pub const SRXL_PACKET_PARAMETER: u8 = 0x50;

/// Signal quality packet type (accepted, not interpreted)
pub const SRXL_PACKET_SIGNAL_QUALITY: u8 = 0x55;

/// Telemetry sensor data packet type
pub const SRXL_PACKET_TELEMETRY: u8 = 0x80;

/// Control data packet type
pub const SRXL_PACKET_CONTROL: u8 = 0xCD;

/// Control data commands
pub const SRXL_CTRL_CMD_CHANNEL: u8 = 0x00;
pub const SRXL_CTRL_CMD_CHANNEL_FS: u8 = 0x01;
pub const SRXL_CTRL_CMD_VTX: u8 = 0x02;
pub const SRXL_CTRL_CMD_FWD_PGM: u8 = 0x03;

/// Bind info requests
pub const SRXL_BIND_REQ_ENTER: u8 = 0xEB;
pub const SRXL_BIND_REQ_STATUS: u8 = 0xB5;
pub const SRXL_BIND_REQ_BOUND_DATA: u8 = 0xDB;
pub const SRXL_BIND_REQ_SET_BIND: u8 = 0x5B;

/// Destination id addressing every device on the bus
pub const SRXL_BROADCAST_ID: u8 = 0xFF;

/// Maximum SRXL frame size
/// Frame structure: header(1) + type(1) + length(1) + payload(N) + crc(2)
pub const SRXL_MAX_FRAME_SIZE: usize = 80;

/// Minimum frame size (no payload)
pub const SRXL_MIN_FRAME_SIZE: usize = 5;

/// Bytes before the payload: header + type + length
pub const SRXL_HEADER_SIZE: usize = 3;

/// Trailing checksum size
pub const SRXL_CRC_SIZE: usize = 2;

/// Handshake frame length
pub const SRXL_HANDSHAKE_FRAME_LENGTH: usize = 14;

/// Bind info frame length
pub const SRXL_BIND_FRAME_LENGTH: usize = 21;

/// Telemetry frame length
pub const SRXL_TELEMETRY_FRAME_LENGTH: usize = 22;

/// Control frame length with zero channel values
/// header(3) + cmd(1) + reply id(1) + rssi(1) + frame losses(2) + mask(4) + crc(2)
pub const SRXL_CONTROL_BASE_LENGTH: usize = 14;

/// Telemetry payload size
pub const SRXL_TELEMETRY_PAYLOAD_SIZE: usize = 16;

/// Number of logical channels (one per mask bit)
pub const SRXL_MAX_CHANNELS: usize = 32;

/// Number of buses a single engine can drive
pub const SRXL_MAX_BUSES: usize = 4;

/// Number of peer devices remembered per bus
pub const SRXL_MAX_DEVICES: usize = 16;

/// Device priority range
pub const SRXL_PRIORITY_MIN: u8 = 1;
pub const SRXL_PRIORITY_MAX: u8 = 100;

/// Channel value center (16-bit resolution)
pub const SRXL_CHANNEL_VALUE_CENTER: u16 = 32768;

/// Logical channel table
pub type ChannelValues = [u16; SRXL_MAX_CHANNELS];

/// Role of the local device on one bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// No handshake seen since start or last resync
    #[default]
    Unresolved,
    Master,
    Slave,
}

/// Bus protocol generation; decides cycle length and telemetry slot policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVariant {
    /// Legacy SRXL: no handshake, one telemetry device
    #[default]
    Srxl,
    /// SRXL2: handshake negotiated, telemetry polled by reply id
    Srxl2,
}

/// How a device decides whether the current cycle's telemetry slot is its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetrySlot {
    /// Reply after every control frame
    Fixed,
    /// Reply only when the control frame's reply id names this device
    RoundRobin,
}

impl ProtocolVariant {
    /// Telemetry slot policy of this variant
    pub fn telemetry_slot(self) -> TelemetrySlot {
        match self {
            ProtocolVariant::Srxl => TelemetrySlot::Fixed,
            ProtocolVariant::Srxl2 => TelemetrySlot::RoundRobin,
        }
    }
}

/// Baud rates an SRXL2 bus can run at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum BaudRate {
    #[default]
    Baud115200,
    Baud400000,
}

impl BaudRate {
    /// Rate in bits per second
    pub fn bps(self) -> u32 {
        match self {
            BaudRate::Baud115200 => 115_200,
            BaudRate::Baud400000 => 400_000,
        }
    }

    /// Code carried in a broadcast handshake
    pub fn code(self) -> u8 {
        match self {
            BaudRate::Baud115200 => 0,
            BaudRate::Baud400000 => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BaudRate::Baud115200),
            1 => Some(BaudRate::Baud400000),
            _ => None,
        }
    }

    pub fn from_bps(bps: u32) -> Option<Self> {
        match bps {
            115_200 => Some(BaudRate::Baud115200),
            400_000 => Some(BaudRate::Baud400000),
            _ => None,
        }
    }
}

/// Set of supported baud rates as carried in a handshake
///
/// Bit 0 marks 400000 baud. 115200 is always supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BaudSet(u8);

impl BaudSet {
    /// Only the mandatory 115200 baud
    pub const BASE: BaudSet = BaudSet(0);

    /// 115200 and 400000 baud
    pub const ALL: BaudSet = BaudSet(0x01);

    /// Build from the raw handshake field; unknown bits are dropped
    pub fn from_bits(bits: u8) -> Self {
        BaudSet(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, rate: BaudRate) -> bool {
        match rate {
            BaudRate::Baud115200 => true,
            BaudRate::Baud400000 => self.0 & 0x01 != 0,
        }
    }

    pub fn with(self, rate: BaudRate) -> Self {
        match rate {
            BaudRate::Baud115200 => self,
            BaudRate::Baud400000 => BaudSet(self.0 | 0x01),
        }
    }

    pub fn intersect(self, other: BaudSet) -> Self {
        BaudSet(self.0 & other.0)
    }

    /// Fastest rate in the set
    pub fn fastest(self) -> BaudRate {
        if self.contains(BaudRate::Baud400000) {
            BaudRate::Baud400000
        } else {
            BaudRate::Baud115200
        }
    }
}

/// Bind protocol and frame rate requested from a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    Dsm2Frame22ms,
    Dsm2Frame11ms,
    DsmxFrame22ms,
    DsmxFrame11ms,
    SurfaceDsm2Frame16ms,
    DsmrFrame11ms22ms,
    DsmrFrame5ms,
}

impl BindType {
    pub fn code(self) -> u8 {
        match self {
            BindType::Dsm2Frame22ms => 0x01,
            BindType::Dsm2Frame11ms => 0x12,
            BindType::DsmxFrame22ms => 0xA2,
            BindType::DsmxFrame11ms => 0xB2,
            BindType::SurfaceDsm2Frame16ms => 0x63,
            BindType::DsmrFrame11ms22ms => 0xE2,
            BindType::DsmrFrame5ms => 0xE4,
        }
    }

    /// Parse a configuration name such as `"dsmx_11ms"`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dsm2_22ms" => Some(BindType::Dsm2Frame22ms),
            "dsm2_11ms" => Some(BindType::Dsm2Frame11ms),
            "dsmx_22ms" => Some(BindType::DsmxFrame22ms),
            "dsmx_11ms" => Some(BindType::DsmxFrame11ms),
            "surface_dsm2_16_5ms" => Some(BindType::SurfaceDsm2Frame16ms),
            "dsmr_11ms_22ms" => Some(BindType::DsmrFrame11ms22ms),
            "dsmr_5_5ms" => Some(BindType::DsmrFrame5ms),
            _ => None,
        }
    }
}

impl TryFrom<u8> for BindType {
    type Error = FramingError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(BindType::Dsm2Frame22ms),
            0x12 => Ok(BindType::Dsm2Frame11ms),
            0xA2 => Ok(BindType::DsmxFrame22ms),
            0xB2 => Ok(BindType::DsmxFrame11ms),
            0x63 => Ok(BindType::SurfaceDsm2Frame16ms),
            0xE2 => Ok(BindType::DsmrFrame11ms22ms),
            0xE4 => Ok(BindType::DsmrFrame5ms),
            value => Err(FramingError::InvalidField { field: "bind type", value }),
        }
    }
}

/// Bind request carried by a bind info packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindRequest {
    /// Ask the receiver to enter bind mode
    Enter,
    /// Ask for the current bind information
    Status,
    /// Report of the bind the receiver holds; acknowledges a bind
    BoundData,
    /// Install bind information directly; acknowledges a bind
    SetBindInfo,
}

impl BindRequest {
    pub fn code(self) -> u8 {
        match self {
            BindRequest::Enter => SRXL_BIND_REQ_ENTER,
            BindRequest::Status => SRXL_BIND_REQ_STATUS,
            BindRequest::BoundData => SRXL_BIND_REQ_BOUND_DATA,
            BindRequest::SetBindInfo => SRXL_BIND_REQ_SET_BIND,
        }
    }

    /// Whether this request completes a pending bind
    pub fn is_acknowledgement(self) -> bool {
        matches!(self, BindRequest::BoundData | BindRequest::SetBindInfo)
    }
}

impl TryFrom<u8> for BindRequest {
    type Error = FramingError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            SRXL_BIND_REQ_ENTER => Ok(BindRequest::Enter),
            SRXL_BIND_REQ_STATUS => Ok(BindRequest::Status),
            SRXL_BIND_REQ_BOUND_DATA => Ok(BindRequest::BoundData),
            SRXL_BIND_REQ_SET_BIND => Ok(BindRequest::SetBindInfo),
            value => Err(FramingError::InvalidField { field: "bind request", value }),
        }
    }
}

/// Identity of the local device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device id; upper nibble is the device type, lower nibble the unit
    pub id: u8,

    /// Arbitration and telemetry priority (1-100)
    pub priority: u8,

    /// Opaque capability byte advertised in handshakes
    pub info: u8,

    /// Random or serial-derived id used to break priority ties
    pub unique_id: u32,
}

/// Decoded handshake packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub src_id: u8,
    pub dest_id: u8,
    pub priority: u8,
    /// Supported set in a directed handshake, chosen rate code in a broadcast
    pub baud: u8,
    pub info: u8,
    pub unique_id: u32,
}

/// Bind information exchanged in bind packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindInfo {
    pub bind_type: BindType,
    pub options: u8,
    /// Transmitter GUID
    pub guid: u64,
    /// Unique id of the bound receiver
    pub unique_id: u32,
}

/// Decoded bind info packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPacket {
    pub request: BindRequest,
    pub device_id: u8,
    pub info: BindInfo,
}

/// Telemetry payload (16 bytes, byte 0 is the sensor id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryData {
    pub raw: [u8; SRXL_TELEMETRY_PAYLOAD_SIZE],
}

impl TelemetryData {
    pub fn sensor_id(&self) -> u8 {
        self.raw[0]
    }

    pub fn set_sensor_id(&mut self, sensor_id: u8) {
        self.raw[0] = sensor_id;
    }
}

/// Decoded telemetry packet sent by another device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryPacket {
    pub dest_id: u8,
    pub data: TelemetryData,
}

/// Kind of control data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Channel,
    Failsafe,
    /// VTX or forward-programming data; validated but not interpreted
    Other(u8),
}

/// Decoded control data packet
///
/// `values[..count]` holds the compacted channel values in ascending mask-bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPacket {
    pub command: ControlCommand,
    pub reply_id: u8,
    pub rssi: i8,
    pub frame_losses: u16,
    pub mask: u32,
    pub values: ChannelValues,
    pub count: usize,
}

impl ControlPacket {
    /// Compacted channel values
    pub fn compacted(&self) -> &[u16] {
        &self.values[..self.count]
    }
}

/// A validated SRXL packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    Control(ControlPacket),
    Telemetry(TelemetryPacket),
    Bind(BindPacket),
    Handshake(Handshake),
    /// Known packet type the engine does not act upon
    Ignored { packet_type: u8 },
}

/// Timing parameters of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrxlTiming {
    /// Inactivity after which a frame loss is counted and the bus resyncs
    pub frame_loss_threshold_ms: u32,

    /// Time allowed for a bind acknowledgement
    pub bind_timeout_ms: u32,

    /// Legacy SRXL cycle, also its telemetry window
    pub srxl_cycle_ms: u32,

    /// SRXL2 cycle, also its telemetry window
    pub srxl2_cycle_ms: u32,
}

impl Default for SrxlTiming {
    fn default() -> Self {
        Self {
            frame_loss_threshold_ms: 50,
            bind_timeout_ms: 5000,
            srxl_cycle_ms: 22,
            srxl2_cycle_ms: 11,
        }
    }
}

impl SrxlTiming {
    /// Telemetry window opened by a control frame
    pub fn telemetry_window_ms(&self, variant: ProtocolVariant) -> u32 {
        match variant {
            ProtocolVariant::Srxl => self.srxl_cycle_ms,
            ProtocolVariant::Srxl2 => self.srxl2_cycle_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(SRXL_HEADER, 0xA6);
        assert_eq!(SRXL_MAX_FRAME_SIZE, 80);
        assert_eq!(SRXL_HANDSHAKE_FRAME_LENGTH, SRXL_HEADER_SIZE + 9 + SRXL_CRC_SIZE);
        assert_eq!(SRXL_BIND_FRAME_LENGTH, SRXL_HEADER_SIZE + 16 + SRXL_CRC_SIZE);
        assert_eq!(
            SRXL_TELEMETRY_FRAME_LENGTH,
            SRXL_HEADER_SIZE + 1 + SRXL_TELEMETRY_PAYLOAD_SIZE + SRXL_CRC_SIZE
        );
        // A full 32-channel control frame still fits
        assert!(SRXL_CONTROL_BASE_LENGTH + 2 * SRXL_MAX_CHANNELS <= SRXL_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_baud_set_always_contains_115200() {
        assert!(BaudSet::BASE.contains(BaudRate::Baud115200));
        assert!(!BaudSet::BASE.contains(BaudRate::Baud400000));
        assert!(BaudSet::ALL.contains(BaudRate::Baud400000));
        assert_eq!(BaudSet::from_bits(0xFF), BaudSet::ALL);
    }

    #[test]
    fn test_baud_set_fastest_of_intersection() {
        assert_eq!(BaudSet::ALL.intersect(BaudSet::ALL).fastest(), BaudRate::Baud400000);
        assert_eq!(BaudSet::ALL.intersect(BaudSet::BASE).fastest(), BaudRate::Baud115200);
        assert_eq!(BaudSet::BASE.with(BaudRate::Baud400000), BaudSet::ALL);
    }

    #[test]
    fn test_baud_rate_codes() {
        for rate in [BaudRate::Baud115200, BaudRate::Baud400000] {
            assert_eq!(BaudRate::from_code(rate.code()), Some(rate));
            assert_eq!(BaudRate::from_bps(rate.bps()), Some(rate));
        }
        assert_eq!(BaudRate::from_code(7), None);
        assert_eq!(BaudRate::from_bps(9600), None);
    }

    #[test]
    fn test_bind_type_codes() {
        assert_eq!(BindType::try_from(0xB2), Ok(BindType::DsmxFrame11ms));
        assert_eq!(BindType::DsmxFrame11ms.code(), 0xB2);
        assert_eq!(BindType::from_name("dsmx_11ms"), Some(BindType::DsmxFrame11ms));
        assert!(BindType::try_from(0x00).is_err());
        assert_eq!(BindType::from_name("fhss"), None);
    }

    #[test]
    fn test_bind_request_acknowledgement() {
        assert!(BindRequest::BoundData.is_acknowledgement());
        assert!(BindRequest::SetBindInfo.is_acknowledgement());
        assert!(!BindRequest::Enter.is_acknowledgement());
        assert!(!BindRequest::Status.is_acknowledgement());
        assert_eq!(BindRequest::try_from(0xEB), Ok(BindRequest::Enter));
    }

    #[test]
    fn test_variant_slot_policy() {
        assert_eq!(ProtocolVariant::Srxl.telemetry_slot(), TelemetrySlot::Fixed);
        assert_eq!(ProtocolVariant::Srxl2.telemetry_slot(), TelemetrySlot::RoundRobin);

        let timing = SrxlTiming::default();
        assert_eq!(timing.telemetry_window_ms(ProtocolVariant::Srxl), 22);
        assert_eq!(timing.telemetry_window_ms(ProtocolVariant::Srxl2), 11);
    }

    #[test]
    fn test_telemetry_sensor_id_is_first_byte() {
        let mut telemetry = TelemetryData::default();
        telemetry.set_sensor_id(0x7E);
        assert_eq!(telemetry.raw[0], 0x7E);
        assert_eq!(telemetry.sensor_id(), 0x7E);
    }
}
