//! # Bus State and Tick Driver
//!
//! One [`Bus`] per UART: transport handle, negotiated link parameters, the
//! partial-frame accumulator and the per-bus protocol state. [`Bus::tick`]
//! is the timeout driver behind `Srxl::run`.

use tracing::{info, warn};

use super::arbitration::Arbiter;
use super::channels::ChannelData;
use super::encoder::FrameBuf;
use super::framer::FrameAccumulator;
use super::protocol::{BaudRate, BaudSet, ProtocolVariant, Role};
use super::telemetry::TelemetryScheduler;
use super::traits::Transport;

/// Frame counters of one bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Frames parsed and applied
    pub good_frames: u32,
    /// Frames rejected by framing, checksum or arbitration
    pub bad_frames: u32,
    /// Loss-threshold crossings
    pub link_losses: u32,
}

pub struct Bus<T> {
    index: usize,
    transport: T,
    supported: BaudSet,
    baud: BaudRate,
    role: Role,
    master_id: Option<u8>,
    variant: ProtocolVariant,
    clock_ms: u64,
    last_activity_ms: u64,
    inactivity_ms: u32,
    loss_latched: bool,
    stats: BusStats,
    pub(crate) accumulator: FrameAccumulator,
    pub(crate) channels: ChannelData,
    pub(crate) arbiter: Arbiter,
    pub(crate) telemetry: TelemetryScheduler,
}

impl<T> std::fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("index", &self.index)
            .field("baud", &self.baud)
            .field("role", &self.role)
            .field("variant", &self.variant)
            .field("inactivity_ms", &self.inactivity_ms)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Bus<T> {
    /// New bus at 115200 baud with no role resolved
    pub fn new(index: usize, transport: T, supported: BaudSet) -> Self {
        Self {
            index,
            transport,
            supported,
            baud: BaudRate::Baud115200,
            role: Role::Unresolved,
            master_id: None,
            variant: ProtocolVariant::Srxl,
            clock_ms: 0,
            last_activity_ms: 0,
            inactivity_ms: 0,
            loss_latched: false,
            stats: BusStats::default(),
            accumulator: FrameAccumulator::new(),
            channels: ChannelData::default(),
            arbiter: Arbiter::new(),
            telemetry: TelemetryScheduler::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn supported_bauds(&self) -> BaudSet {
        self.supported
    }

    pub fn baud(&self) -> BaudRate {
        self.baud
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn master_id(&self) -> Option<u8> {
        self.master_id
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn channels(&self) -> &ChannelData {
        &self.channels
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    pub fn inactivity_ms(&self) -> u32 {
        self.inactivity_ms
    }

    /// Bus clock at the last accepted frame
    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    /// Advance the bus clock by `elapsed_ms`
    ///
    /// Returns `true` exactly once per crossing of `loss_threshold_ms`; the
    /// crossing counts a frame loss, marks channel data stale and resyncs the
    /// bus. The latch clears on the next accepted frame.
    pub fn tick(&mut self, elapsed_ms: u32, loss_threshold_ms: u32) -> bool {
        self.clock_ms = self.clock_ms.saturating_add(elapsed_ms as u64);
        self.inactivity_ms = self.inactivity_ms.saturating_add(elapsed_ms);

        if self.inactivity_ms <= loss_threshold_ms || self.loss_latched {
            return false;
        }

        self.loss_latched = true;
        self.channels.mark_lost();
        self.stats.link_losses = self.stats.link_losses.wrapping_add(1);
        warn!(
            "Bus {}: no frame for {} ms, frame losses now {}",
            self.index, self.inactivity_ms, self.channels.frame_losses
        );
        self.resync();
        true
    }

    /// Record an accepted frame
    pub(crate) fn mark_activity(&mut self) {
        self.inactivity_ms = 0;
        self.loss_latched = false;
        self.last_activity_ms = self.clock_ms;
        self.stats.good_frames = self.stats.good_frames.wrapping_add(1);
    }

    pub(crate) fn mark_rejected(&mut self) {
        self.stats.bad_frames = self.stats.bad_frames.wrapping_add(1);
    }

    /// Fall out of sync: forget peers and role, return to 115200 baud
    pub(crate) fn resync(&mut self) {
        if self.role != Role::Unresolved {
            info!("Bus {}: resynchronizing, role {:?} released", self.index, self.role);
        }
        self.role = Role::Unresolved;
        self.master_id = None;
        self.variant = ProtocolVariant::Srxl;
        self.arbiter.reset();
        self.telemetry.reset();
        self.accumulator.reset();
        self.switch_baud(BaudRate::Baud115200);
    }

    /// Record the arbitration result
    pub(crate) fn set_role(&mut self, role: Role, master_id: u8) {
        if self.role != role || self.master_id != Some(master_id) {
            info!(
                "Bus {}: role {:?}, master 0x{:02X}",
                self.index, role, master_id
            );
        }
        self.role = role;
        self.master_id = Some(master_id);
        self.variant = ProtocolVariant::Srxl2;
    }

    pub(crate) fn switch_baud(&mut self, rate: BaudRate) {
        if rate == self.baud {
            return;
        }
        info!("Bus {}: switching to {} baud", self.index, rate.bps());
        self.baud = rate;
        self.transport.set_baud(rate.bps());
    }

    pub(crate) fn transmit(&mut self, frame: &FrameBuf) {
        self.transport.transmit(frame.as_bytes());
    }
}
