//! # SRXL Packet Decoder
//!
//! Validates complete SRXL frames and decodes them into [`Packet`] values.
//! Nothing is decoded until header, length and checksum have all passed.

use super::crc::crc16;
use super::protocol::*;
use crate::error::{FramingError, Result, SrxlError};

/// Check header, length and checksum of a complete frame
///
/// # Errors
///
/// Returns error if:
/// - Frame is shorter than 5 or longer than 80 bytes
/// - Header byte is incorrect
/// - Declared length differs from the frame length
/// - Checksum does not match
pub fn validate_frame(frame: &[u8]) -> Result<()> {
    if frame.len() < SRXL_MIN_FRAME_SIZE {
        return Err(FramingError::TooShort(frame.len()).into());
    }

    if frame.len() > SRXL_MAX_FRAME_SIZE {
        return Err(FramingError::TooLong(frame.len()).into());
    }

    if frame[0] != SRXL_HEADER {
        return Err(FramingError::BadHeader(frame[0]).into());
    }

    let declared = frame[2] as usize;
    if declared != frame.len() {
        return Err(FramingError::LengthMismatch {
            declared,
            actual: frame.len(),
        }
        .into());
    }

    let crc_offset = frame.len() - SRXL_CRC_SIZE;
    let received = u16::from_be_bytes([frame[crc_offset], frame[crc_offset + 1]]);
    let expected = crc16(&frame[..crc_offset]);

    if expected != received {
        return Err(SrxlError::Checksum { expected, received });
    }

    Ok(())
}

/// Decode a complete SRXL frame
///
/// # Arguments
///
/// * `frame` - Complete frame bytes (header, type, length, payload, checksum)
///
/// # Returns
///
/// * `Result<Packet>` - Decoded packet, or error if invalid
pub fn decode_frame(frame: &[u8]) -> Result<Packet> {
    validate_frame(frame)?;

    let packet_type = frame[1];
    let payload = &frame[SRXL_HEADER_SIZE..frame.len() - SRXL_CRC_SIZE];

    let packet = match packet_type {
        SRXL_PACKET_HANDSHAKE => {
            expect_length(packet_type, frame.len(), SRXL_HANDSHAKE_FRAME_LENGTH)?;
            Packet::Handshake(decode_handshake(payload))
        }
        SRXL_PACKET_BIND => {
            expect_length(packet_type, frame.len(), SRXL_BIND_FRAME_LENGTH)?;
            Packet::Bind(decode_bind(payload)?)
        }
        SRXL_PACKET_TELEMETRY => {
            expect_length(packet_type, frame.len(), SRXL_TELEMETRY_FRAME_LENGTH)?;
            Packet::Telemetry(decode_telemetry(payload))
        }
        SRXL_PACKET_CONTROL => Packet::Control(decode_control(payload)?),
        SRXL_PACKET_PARAMETER | SRXL_PACKET_SIGNAL_QUALITY => Packet::Ignored { packet_type },
        other => return Err(FramingError::UnknownPacketType(other).into()),
    };

    Ok(packet)
}

fn expect_length(packet_type: u8, length: usize, expected: usize) -> Result<()> {
    if length != expected {
        return Err(FramingError::InvalidPacketLength { packet_type, length }.into());
    }
    Ok(())
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn decode_handshake(payload: &[u8]) -> Handshake {
    Handshake {
        src_id: payload[0],
        dest_id: payload[1],
        priority: payload[2],
        baud: payload[3],
        info: payload[4],
        unique_id: read_u32_le(&payload[5..9]),
    }
}

fn decode_bind(payload: &[u8]) -> Result<BindPacket> {
    let request = BindRequest::try_from(payload[0])?;
    let bind_type = BindType::try_from(payload[2])?;

    let mut guid = [0u8; 8];
    guid.copy_from_slice(&payload[4..12]);

    Ok(BindPacket {
        request,
        device_id: payload[1],
        info: BindInfo {
            bind_type,
            options: payload[3],
            guid: u64::from_le_bytes(guid),
            unique_id: read_u32_le(&payload[12..16]),
        },
    })
}

fn decode_telemetry(payload: &[u8]) -> TelemetryPacket {
    let mut data = TelemetryData::default();
    data.raw.copy_from_slice(&payload[1..1 + SRXL_TELEMETRY_PAYLOAD_SIZE]);

    TelemetryPacket {
        dest_id: payload[0],
        data,
    }
}

/// Decode a control data payload
///
/// Layout: cmd(1) + reply id(1) + rssi(1) + frame losses(2, LE) + mask(4, LE) + values(2 each, LE).
/// VTX and forward-programming commands are accepted without interpretation.
fn decode_control(payload: &[u8]) -> Result<ControlPacket> {
    let fixed = SRXL_CONTROL_BASE_LENGTH - SRXL_HEADER_SIZE - SRXL_CRC_SIZE;
    if payload.is_empty() {
        return Err(FramingError::InvalidPacketLength {
            packet_type: SRXL_PACKET_CONTROL,
            length: SRXL_HEADER_SIZE + SRXL_CRC_SIZE,
        }
        .into());
    }

    let command = match payload[0] {
        SRXL_CTRL_CMD_CHANNEL => ControlCommand::Channel,
        SRXL_CTRL_CMD_CHANNEL_FS => ControlCommand::Failsafe,
        other => ControlCommand::Other(other),
    };

    let mut packet = ControlPacket {
        command,
        reply_id: payload.get(1).copied().unwrap_or(0),
        rssi: 0,
        frame_losses: 0,
        mask: 0,
        values: [0u16; SRXL_MAX_CHANNELS],
        count: 0,
    };

    if let ControlCommand::Other(_) = command {
        return Ok(packet);
    }

    if payload.len() < fixed {
        return Err(FramingError::InvalidPacketLength {
            packet_type: SRXL_PACKET_CONTROL,
            length: payload.len() + SRXL_HEADER_SIZE + SRXL_CRC_SIZE,
        }
        .into());
    }

    packet.rssi = payload[2] as i8;
    packet.frame_losses = u16::from_le_bytes([payload[3], payload[4]]);
    packet.mask = read_u32_le(&payload[5..9]);

    let value_bytes = &payload[fixed..];
    let expected = packet.mask.count_ones() as usize;
    if value_bytes.len() != expected * 2 {
        return Err(FramingError::ChannelCountMismatch {
            mask: packet.mask,
            expected,
            actual: value_bytes.len() / 2,
        }
        .into());
    }

    for (slot, pair) in packet.values.iter_mut().zip(value_bytes.chunks_exact(2)) {
        *slot = u16::from_le_bytes([pair[0], pair[1]]);
    }
    packet.count = expected;

    Ok(packet)
}
