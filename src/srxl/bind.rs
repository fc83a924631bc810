//! # Bind State Machine
//!
//! ```text
//! Idle --request--> BindRequested --ack--> BindActive --tick--> Idle (bound)
//!                         |
//!                         +--deadline--> BindTimeout --tick--> Idle (failed)
//! ```
//!
//! Deadlines count down on the ticks of the bus the bind was issued on.

use tracing::{debug, info, warn};

use super::protocol::{BindInfo, BindPacket, BindType, SRXL_BROADCAST_ID};
use crate::error::{Result, SrxlError};

/// Bind phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindPhase {
    #[default]
    Idle,
    BindRequested,
    BindActive,
    BindTimeout,
}

/// How the last bind attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Bound(BindInfo),
    TimedOut,
}

#[derive(Debug, Clone, Default)]
pub struct BindMachine {
    phase: BindPhase,
    bind_type: Option<BindType>,
    remaining_ms: u32,
    bus: usize,
    /// Device the request went to; broadcast accepts any other device
    target: u8,
    acknowledged: Option<BindInfo>,
    last_outcome: Option<BindOutcome>,
}

impl BindMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BindPhase {
        self.phase
    }

    /// Requested bind type while a bind is in progress
    pub fn bind_type(&self) -> Option<BindType> {
        self.bind_type
    }

    /// Bus the bind runs on
    pub fn bus(&self) -> usize {
        self.bus
    }

    pub fn remaining_ms(&self) -> u32 {
        self.remaining_ms
    }

    /// Requested or acknowledged but not yet committed
    pub fn is_active(&self) -> bool {
        matches!(self.phase, BindPhase::BindRequested | BindPhase::BindActive)
    }

    pub fn last_outcome(&self) -> Option<BindOutcome> {
        self.last_outcome
    }

    /// Bind information of the most recent successful bind
    pub fn bound_info(&self) -> Option<BindInfo> {
        match self.last_outcome {
            Some(BindOutcome::Bound(info)) => Some(info),
            _ => None,
        }
    }

    /// Enter BindRequested
    ///
    /// # Errors
    ///
    /// Returns [`SrxlError::BindRejected`] unless the machine is Idle; nothing changes in that case.
    pub fn request(&mut self, bus: usize, bind_type: BindType, target: u8, timeout_ms: u32) -> Result<()> {
        if self.phase != BindPhase::Idle {
            return Err(SrxlError::BindRejected(self.phase));
        }

        self.phase = BindPhase::BindRequested;
        self.bind_type = Some(bind_type);
        self.remaining_ms = timeout_ms;
        self.bus = bus;
        self.target = target;
        self.acknowledged = None;
        self.last_outcome = None;

        info!("Bind requested on bus {} ({:?}, {} ms)", bus, bind_type, timeout_ms);
        Ok(())
    }

    /// Offer a validated bind packet as acknowledgement
    ///
    /// Only bound-data or set-bind-info packets from the request's target
    /// count. Packets carrying `local_id` are our own replies echoed back.
    /// Returns `true` if it moved the machine to BindActive.
    pub fn acknowledge(&mut self, bus: usize, packet: &BindPacket, local_id: u8) -> bool {
        if self.phase != BindPhase::BindRequested || bus != self.bus || !packet.request.is_acknowledgement() {
            return false;
        }

        if packet.device_id == local_id {
            return false;
        }

        if self.target != SRXL_BROADCAST_ID && packet.device_id != self.target {
            debug!(
                "Ignoring bind data from 0x{:02X}, waiting for 0x{:02X}",
                packet.device_id, self.target
            );
            return false;
        }

        self.phase = BindPhase::BindActive;
        self.acknowledged = Some(packet.info);
        info!("Bind acknowledged by device 0x{:02X}", packet.device_id);
        true
    }

    /// Advance the deadline and settle finished binds; one transition per tick
    pub fn tick(&mut self, bus: usize, elapsed_ms: u32) {
        if bus != self.bus {
            return;
        }

        match self.phase {
            BindPhase::Idle => {}
            BindPhase::BindRequested => {
                self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);
                if self.remaining_ms == 0 {
                    warn!("Bind on bus {} timed out", bus);
                    self.phase = BindPhase::BindTimeout;
                    self.last_outcome = Some(BindOutcome::TimedOut);
                }
            }
            BindPhase::BindActive => {
                if let Some(info) = self.acknowledged.take() {
                    self.last_outcome = Some(BindOutcome::Bound(info));
                }
                self.finish();
            }
            BindPhase::BindTimeout => self.finish(),
        }
    }

    fn finish(&mut self) {
        self.phase = BindPhase::Idle;
        self.bind_type = None;
        self.remaining_ms = 0;
    }

    /// Result of the last bind attempt
    ///
    /// # Errors
    ///
    /// Returns [`SrxlError::BindTimeout`] if the last attempt timed out.
    pub fn check(&self) -> Result<Option<BindInfo>> {
        match self.last_outcome {
            Some(BindOutcome::TimedOut) => Err(SrxlError::BindTimeout),
            Some(BindOutcome::Bound(info)) => Ok(Some(info)),
            None => Ok(None),
        }
    }
}
