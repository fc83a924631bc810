//! Collaborator traits the engine is driven through.

use super::channels::ChannelData;
use super::protocol::TelemetryData;

/// Byte-level UART access for one bus
///
/// Both calls must return promptly; the engine calls them from inside
/// `parse_packet` and `run`.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Switch the UART to a new baud rate (bits per second)
    fn set_baud(&mut self, baud: u32);

    /// Queue or send one complete frame
    fn transmit(&mut self, frame: &[u8]);
}

/// Application side of the bus
pub trait SrxlHandler {
    /// A channel or failsafe frame was applied to `data`
    fn on_channel_data(&mut self, bus: usize, data: &ChannelData, failsafe: bool);

    /// Fill the telemetry reply for this cycle; byte 0 is the sensor id
    fn fill_telemetry(&mut self, bus: usize, telemetry: &mut TelemetryData);

    /// The bus went silent past the loss threshold; `data` is now stale
    fn on_link_lost(&mut self, _bus: usize, _data: &ChannelData) {}
}
