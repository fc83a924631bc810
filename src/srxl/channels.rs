//! # Channel Data Multiplexer
//!
//! Maps compacted wire values onto the logical channel table.
//!
//! A control frame carries a 32-bit presence mask followed by one value per
//! set bit. Values are consumed in ascending bit order and each lands in the
//! slot equal to its bit index, not its position in the compacted array:
//!
//! ```text
//! mask   = 0b1010_0001
//! values = [a, b, c]
//! slot 0 = a, slot 5 = b, slot 7 = c, every other slot unchanged
//! ```

use super::protocol::{ChannelValues, ControlCommand, ControlPacket, SRXL_CHANNEL_VALUE_CENTER, SRXL_MAX_CHANNELS};

/// Iterator over the set bit indices of a mask, lowest first
///
/// # Examples
///
/// ```
/// use srxl_bus::srxl::channels::MaskBits;
///
/// let bits: Vec<usize> = MaskBits::new(0b1010_0001).collect();
/// assert_eq!(bits, vec![0, 5, 7]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MaskBits(u32);

impl MaskBits {
    pub fn new(mask: u32) -> Self {
        Self(mask)
    }
}

impl Iterator for MaskBits {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros() as usize;
        // Clear lowest set bit
        self.0 &= self.0 - 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.0.count_ones() as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MaskBits {}

/// Scatter compacted values into `table` by mask bit
///
/// Returns the number of slots written. Extra values beyond the mask's set
/// bits are ignored, as are set bits without a value.
pub fn scatter_channels(table: &mut ChannelValues, mask: u32, compacted: &[u16]) -> usize {
    let mut written = 0;
    for (slot, &value) in MaskBits::new(mask).zip(compacted) {
        table[slot] = value;
        written += 1;
    }
    written
}

/// Channel state of one bus, as seen by the channel-consumption collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelData {
    /// Presence mask of the most recent channel frame
    pub mask: u32,

    /// Logical channel table; slots keep their value until a frame sets them
    pub values: ChannelValues,

    /// RSSI reported by the master (negative dBm or positive percent)
    pub rssi: i8,

    /// Frame-loss counter: master-reported, plus local timeouts
    pub frame_losses: u16,

    /// Losses detected locally by the bus timeout
    pub local_losses: u16,

    /// Last frame was failsafe data
    pub failsafe: bool,

    /// No frame within the loss threshold; values are the last ones received
    pub stale: bool,
}

impl Default for ChannelData {
    fn default() -> Self {
        Self {
            mask: 0,
            values: [SRXL_CHANNEL_VALUE_CENTER; SRXL_MAX_CHANNELS],
            rssi: 0,
            frame_losses: 0,
            local_losses: 0,
            failsafe: false,
            stale: false,
        }
    }
}

impl ChannelData {
    /// Apply a decoded channel or failsafe frame
    ///
    /// Returns `false` for control commands that carry no channel data.
    pub fn apply(&mut self, packet: &ControlPacket) -> bool {
        let failsafe = match packet.command {
            ControlCommand::Channel => false,
            ControlCommand::Failsafe => true,
            ControlCommand::Other(_) => return false,
        };

        scatter_channels(&mut self.values, packet.mask, packet.compacted());
        self.mask = packet.mask;
        self.rssi = packet.rssi;
        self.frame_losses = packet.frame_losses.saturating_add(self.local_losses);
        self.failsafe = failsafe;
        self.stale = false;
        true
    }

    /// Count a locally detected frame loss and flag the data stale
    pub fn mark_lost(&mut self) {
        self.local_losses = self.local_losses.saturating_add(1);
        self.frame_losses = self.frame_losses.saturating_add(1);
        self.stale = true;
    }

    /// Value of a logical channel
    pub fn channel(&self, index: usize) -> Option<u16> {
        self.values.get(index).copied()
    }
}
