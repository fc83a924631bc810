//! # SRXL Packet Encoder
//!
//! Builds outgoing SRXL frames into fixed-size buffers. Every builder writes
//! the header, type and length bytes, the payload, then the big-endian checksum.

use super::crc::crc16;
use super::protocol::*;

/// A complete outgoing frame stored without heap allocation
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FrameBuf {
    bytes: [u8; SRXL_MAX_FRAME_SIZE],
    len: usize,
}

impl std::fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FrameBuf").field(&self.as_bytes()).finish()
    }
}

impl FrameBuf {
    /// Start a frame of the given type; length and checksum are filled by [`FrameBuf::finish`]
    fn begin(packet_type: u8) -> Self {
        let mut bytes = [0u8; SRXL_MAX_FRAME_SIZE];
        bytes[0] = SRXL_HEADER;
        bytes[1] = packet_type;
        Self {
            bytes,
            len: SRXL_HEADER_SIZE,
        }
    }

    fn push(&mut self, byte: u8) {
        self.bytes[self.len] = byte;
        self.len += 1;
    }

    fn extend(&mut self, data: &[u8]) {
        self.bytes[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
    }

    fn finish(mut self) -> Self {
        self.bytes[2] = (self.len + SRXL_CRC_SIZE) as u8;
        let crc = crc16(&self.bytes[..self.len]);
        self.extend(&crc.to_be_bytes());
        self
    }

    /// Frame bytes ready for the transport
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encode a handshake frame
///
/// # Arguments
///
/// * `src_id` - Sending device id
/// * `dest_id` - Addressed device id, or [`SRXL_BROADCAST_ID`]
/// * `priority` - Sender priority (1-100)
/// * `baud` - Supported set bits, or the chosen rate code when broadcasting
/// * `info` - Opaque capability byte
/// * `unique_id` - Sender unique id
pub fn encode_handshake_frame(
    src_id: u8,
    dest_id: u8,
    priority: u8,
    baud: u8,
    info: u8,
    unique_id: u32,
) -> FrameBuf {
    let mut frame = FrameBuf::begin(SRXL_PACKET_HANDSHAKE);
    frame.push(src_id);
    frame.push(dest_id);
    frame.push(priority);
    frame.push(baud);
    frame.push(info);
    frame.extend(&unique_id.to_le_bytes());
    frame.finish()
}

/// Encode a bind info frame
pub fn encode_bind_frame(request: BindRequest, device_id: u8, info: &BindInfo) -> FrameBuf {
    let mut frame = FrameBuf::begin(SRXL_PACKET_BIND);
    frame.push(request.code());
    frame.push(device_id);
    frame.push(info.bind_type.code());
    frame.push(info.options);
    frame.extend(&info.guid.to_le_bytes());
    frame.extend(&info.unique_id.to_le_bytes());
    frame.finish()
}

/// Encode a telemetry frame
pub fn encode_telemetry_frame(dest_id: u8, telemetry: &TelemetryData) -> FrameBuf {
    let mut frame = FrameBuf::begin(SRXL_PACKET_TELEMETRY);
    frame.push(dest_id);
    frame.extend(&telemetry.raw);
    frame.finish()
}

/// Encode a channel (or failsafe) control frame from compacted values
///
/// Values are written in the order given; the caller keeps them in ascending
/// mask-bit order. At most [`SRXL_MAX_CHANNELS`] values are written.
///
/// # Examples
///
/// ```
/// use srxl_bus::srxl::encoder::encode_channel_frame;
///
/// let frame = encode_channel_frame(false, 0x00, -50, 0, 0b11, &[1000, 2000]);
/// assert_eq!(frame.len(), 18);
/// assert_eq!(frame.as_bytes()[2], 18);
/// ```
pub fn encode_channel_frame(
    failsafe: bool,
    reply_id: u8,
    rssi: i8,
    frame_losses: u16,
    mask: u32,
    values: &[u16],
) -> FrameBuf {
    let mut frame = FrameBuf::begin(SRXL_PACKET_CONTROL);
    frame.push(if failsafe {
        SRXL_CTRL_CMD_CHANNEL_FS
    } else {
        SRXL_CTRL_CMD_CHANNEL
    });
    frame.push(reply_id);
    frame.push(rssi as u8);
    frame.extend(&frame_losses.to_le_bytes());
    frame.extend(&mask.to_le_bytes());
    for value in values.iter().take(SRXL_MAX_CHANNELS) {
        frame.extend(&value.to_le_bytes());
    }
    frame.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_handshake_frame_structure() {
        let frame = encode_handshake_frame(0x30, 0xFF, 10, 0x01, 0x00, 0x12345678);
        let bytes = frame.as_bytes();

        assert_eq!(bytes.len(), SRXL_HANDSHAKE_FRAME_LENGTH);
        assert_eq!(bytes[0], SRXL_HEADER);
        assert_eq!(bytes[1], SRXL_PACKET_HANDSHAKE);
        assert_eq!(bytes[2], SRXL_HANDSHAKE_FRAME_LENGTH as u8);
        assert_eq!(&bytes[3..8], &[0x30, 0xFF, 10, 0x01, 0x00]);
        assert_eq!(&bytes[8..12], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_encode_telemetry_frame_length() {
        let mut telemetry = TelemetryData::default();
        telemetry.set_sensor_id(0x7E);

        let frame = encode_telemetry_frame(0x21, &telemetry);
        let bytes = frame.as_bytes();

        assert_eq!(bytes.len(), SRXL_TELEMETRY_FRAME_LENGTH);
        assert_eq!(bytes[3], 0x21);
        assert_eq!(bytes[4], 0x7E);
    }

    #[test]
    fn test_encode_bind_frame_length() {
        let info = BindInfo {
            bind_type: BindType::DsmxFrame11ms,
            options: 0,
            guid: 0,
            unique_id: 0,
        };
        let frame = encode_bind_frame(BindRequest::Enter, 0x21, &info);

        assert_eq!(frame.len(), SRXL_BIND_FRAME_LENGTH);
        assert_eq!(frame.as_bytes()[3], SRXL_BIND_REQ_ENTER);
        assert_eq!(frame.as_bytes()[5], 0xB2);
    }

    #[test]
    fn test_encode_channel_frame_structure() {
        let frame = encode_channel_frame(true, 0x40, -70, 0x0102, 0x0000_0005, &[100, 200]);
        let bytes = frame.as_bytes();

        assert_eq!(bytes.len(), SRXL_CONTROL_BASE_LENGTH + 4);
        assert_eq!(bytes[3], SRXL_CTRL_CMD_CHANNEL_FS);
        assert_eq!(bytes[4], 0x40);
        assert_eq!(bytes[5] as i8, -70);
        assert_eq!(&bytes[6..8], &[0x02, 0x01]);
        assert_eq!(&bytes[8..12], &[0x05, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[12..16], &[100, 0, 200, 0]);
    }

    #[test]
    fn test_encode_full_channel_frame_fits() {
        let values = [SRXL_CHANNEL_VALUE_CENTER; SRXL_MAX_CHANNELS];
        let frame = encode_channel_frame(false, 0, 0, 0, u32::MAX, &values);

        assert_eq!(frame.len(), SRXL_CONTROL_BASE_LENGTH + 2 * SRXL_MAX_CHANNELS);
        assert!(frame.len() <= SRXL_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_encode_checksum_is_big_endian() {
        let frame = encode_handshake_frame(0x21, 0x30, 50, 0, 0, 1);
        let bytes = frame.as_bytes();
        let crc = crc16(&bytes[..bytes.len() - 2]);

        assert_eq!(bytes[bytes.len() - 2], (crc >> 8) as u8);
        assert_eq!(bytes[bytes.len() - 1], crc as u8);
    }

    #[test]
    fn test_different_data_different_crc() {
        let frame1 = encode_channel_frame(false, 0, 0, 0, 0x1, &[1000]);
        let frame2 = encode_channel_frame(false, 0, 0, 0, 0x1, &[1500]);

        assert_ne!(&frame1.as_bytes()[14..], &frame2.as_bytes()[14..]);
    }
}
