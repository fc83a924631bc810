//! # Telemetry Scheduler
//!
//! Decides when this device owns the telemetry slot of a bus cycle and
//! frames the reply.
//!
//! Every control frame starts a receive cycle and opens a window as long as
//! the variant's cycle. Whether the slot belongs to this device is decided by
//! the variant's [`TelemetrySlot`] policy. At most one reply leaves per cycle.

use tracing::debug;

use super::encoder::{encode_telemetry_frame, FrameBuf};
use super::protocol::{ProtocolVariant, SrxlTiming, TelemetryData, TelemetrySlot};

#[derive(Debug, Clone, Default)]
pub struct TelemetryScheduler {
    /// A reply is due in the current cycle
    pending: bool,
    /// Device the reply is addressed to
    dest_id: u8,
    window_remaining_ms: u32,
    replied_this_cycle: bool,
    sent: u32,
    dropped: u32,
}

impl TelemetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new receive cycle after a control frame
    ///
    /// # Arguments
    ///
    /// * `variant` - Negotiated protocol variant of the bus
    /// * `timing` - Cycle lengths used as the telemetry window
    /// * `reply_id` - Device the master polled in this frame
    /// * `local_id` - Local device id
    /// * `dest_id` - Device the reply goes to (the master)
    pub fn on_control_frame(
        &mut self,
        variant: ProtocolVariant,
        timing: &SrxlTiming,
        reply_id: u8,
        local_id: u8,
        dest_id: u8,
    ) {
        self.replied_this_cycle = false;
        self.window_remaining_ms = timing.telemetry_window_ms(variant);
        self.dest_id = dest_id;
        self.pending = match variant.telemetry_slot() {
            TelemetrySlot::Fixed => true,
            TelemetrySlot::RoundRobin => reply_id == local_id,
        };
    }

    /// Advance the window and emit the reply if it is due
    ///
    /// `fill` is only called when a reply will actually be sent.
    pub fn poll<F>(&mut self, elapsed_ms: u32, fill: F) -> Option<FrameBuf>
    where
        F: FnOnce(&mut TelemetryData),
    {
        self.window_remaining_ms = self.window_remaining_ms.saturating_sub(elapsed_ms);

        if !self.pending || self.replied_this_cycle {
            return None;
        }

        if self.window_remaining_ms == 0 {
            self.pending = false;
            self.dropped = self.dropped.wrapping_add(1);
            debug!("Telemetry window closed before reply, dropping");
            return None;
        }

        let mut telemetry = TelemetryData::default();
        fill(&mut telemetry);

        self.pending = false;
        self.replied_this_cycle = true;
        self.sent = self.sent.wrapping_add(1);

        Some(encode_telemetry_frame(self.dest_id, &telemetry))
    }

    /// Forget the current cycle (bus resync)
    pub fn reset(&mut self) {
        self.pending = false;
        self.replied_this_cycle = false;
        self.window_remaining_ms = 0;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn window_remaining_ms(&self) -> u32 {
        self.window_remaining_ms
    }

    /// Replies sent since start
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Replies dropped because the window closed
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}
