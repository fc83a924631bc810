//! # Device Arbitration
//!
//! Tracks the devices that announced themselves by handshake on one bus and
//! resolves which of them (local device included) is the bus master.
//!
//! The master is the device with the highest priority; equal priorities go
//! to the lower unique id. The resolution only depends on the set of devices
//! seen, never on the order their handshakes arrived in.

use std::cmp::Reverse;

use super::protocol::{BaudRate, BaudSet, DeviceInfo, Handshake, SRXL_BROADCAST_ID, SRXL_MAX_DEVICES, SRXL_PRIORITY_MAX, SRXL_PRIORITY_MIN};
use crate::error::ArbitrationError;

/// A remote device seen on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerDevice {
    pub id: u8,
    pub priority: u8,
    pub info: u8,
    pub unique_id: u32,
    pub bauds: BaudSet,
}

/// What an accepted handshake asks of the local device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Sender of the handshake
    pub src_id: u8,
    /// Our own handshake echoed back by a half-duplex line
    pub echo: bool,
    /// The handshake is addressed to the local device and wants a reply
    pub addressed_to_local: bool,
    /// Baud rate proposed by a broadcast handshake
    pub baud_proposal: Option<BaudRate>,
}

/// Arbitration key: higher wins
fn rank(priority: u8, unique_id: u32) -> (u8, Reverse<u32>) {
    (priority, Reverse(unique_id))
}

#[derive(Debug, Clone, Default)]
pub struct Arbiter {
    peers: [Option<PeerDevice>; SRXL_MAX_DEVICES],
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a handshake and record its sender
    ///
    /// Validation completes before the peer table is touched, so an error
    /// leaves the arbiter unchanged.
    ///
    /// # Errors
    ///
    /// - `ReservedDeviceId` for source ids 0x00 and 0xFF
    /// - `InvalidPriority` for priorities outside 1-100
    /// - `DuplicateIdentity` when a known id shows up with another unique id
    /// - `UnsupportedBaud` when a broadcast proposes a rate outside `local_bauds`
    /// - `TooManyDevices` when the peer table is full
    pub fn observe(
        &mut self,
        local: &DeviceInfo,
        local_bauds: BaudSet,
        handshake: &Handshake,
    ) -> Result<Observation, ArbitrationError> {
        let src_id = handshake.src_id;

        if src_id == 0x00 || src_id == SRXL_BROADCAST_ID {
            return Err(ArbitrationError::ReservedDeviceId(src_id));
        }

        if !(SRXL_PRIORITY_MIN..=SRXL_PRIORITY_MAX).contains(&handshake.priority) {
            return Err(ArbitrationError::InvalidPriority {
                device_id: src_id,
                priority: handshake.priority,
            });
        }

        if src_id == local.id {
            if handshake.unique_id != local.unique_id {
                return Err(ArbitrationError::DuplicateIdentity {
                    device_id: src_id,
                    known: local.unique_id,
                    claimed: handshake.unique_id,
                });
            }
            return Ok(Observation {
                src_id,
                echo: true,
                addressed_to_local: false,
                baud_proposal: None,
            });
        }

        let existing = self.position(src_id);
        if let Some(peer) = existing.and_then(|i| self.peers[i]) {
            if peer.unique_id != handshake.unique_id {
                return Err(ArbitrationError::DuplicateIdentity {
                    device_id: src_id,
                    known: peer.unique_id,
                    claimed: handshake.unique_id,
                });
            }
        }

        let broadcast = handshake.dest_id == SRXL_BROADCAST_ID;
        let baud_proposal = if broadcast {
            match BaudRate::from_code(handshake.baud) {
                Some(rate) if local_bauds.contains(rate) => Some(rate),
                _ => return Err(ArbitrationError::UnsupportedBaud(handshake.baud)),
            }
        } else {
            None
        };

        let bauds = match baud_proposal {
            // A broadcast carries the chosen rate, not the sender's full set
            Some(rate) => existing
                .and_then(|i| self.peers[i])
                .map_or(BaudSet::BASE, |peer| peer.bauds)
                .with(rate),
            None => BaudSet::from_bits(handshake.baud),
        };

        let slot = existing
            .or_else(|| self.peers.iter().position(Option::is_none))
            .ok_or(ArbitrationError::TooManyDevices(SRXL_MAX_DEVICES))?;

        self.peers[slot] = Some(PeerDevice {
            id: src_id,
            priority: handshake.priority,
            info: handshake.info,
            unique_id: handshake.unique_id,
            bauds,
        });

        Ok(Observation {
            src_id,
            echo: false,
            addressed_to_local: handshake.dest_id == local.id,
            baud_proposal,
        })
    }

    fn position(&self, id: u8) -> Option<usize> {
        self.peers.iter().position(|p| p.map_or(false, |p| p.id == id))
    }

    /// Device id of the master among the local device and all peers
    pub fn resolve_master(&self, local: &DeviceInfo) -> u8 {
        let mut master = (rank(local.priority, local.unique_id), local.id);
        for peer in self.peers() {
            let candidate = (rank(peer.priority, peer.unique_id), peer.id);
            if candidate.0 > master.0 {
                master = candidate;
            }
        }
        master.1
    }

    /// Fastest rate every known device supports
    pub fn negotiate_baud(&self, local_bauds: BaudSet) -> BaudRate {
        self.peers()
            .fold(local_bauds, |set, peer| set.intersect(peer.bauds))
            .fastest()
    }

    pub fn peer(&self, id: u8) -> Option<&PeerDevice> {
        self.peers().find(|p| p.id == id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerDevice> {
        self.peers.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.peers().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every peer (bus resync)
    pub fn reset(&mut self) {
        self.peers = [None; SRXL_MAX_DEVICES];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: DeviceInfo = DeviceInfo {
        id: 0x30,
        priority: 10,
        info: 0,
        unique_id: 0x5000,
    };

    fn handshake(src_id: u8, priority: u8, unique_id: u32) -> Handshake {
        Handshake {
            src_id,
            dest_id: 0x00,
            priority,
            baud: BaudSet::ALL.bits(),
            info: 0,
            unique_id,
        }
    }

    #[test]
    fn test_local_is_master_alone() {
        let arbiter = Arbiter::new();
        assert_eq!(arbiter.resolve_master(&LOCAL), LOCAL.id);
    }

    #[test]
    fn test_higher_priority_wins_regardless_of_order() {
        let a = handshake(0x21, 50, 0x9000);
        let b = handshake(0x40, 20, 0x0001);

        let mut forward = Arbiter::new();
        forward.observe(&LOCAL, BaudSet::ALL, &a).unwrap();
        forward.observe(&LOCAL, BaudSet::ALL, &b).unwrap();

        let mut backward = Arbiter::new();
        backward.observe(&LOCAL, BaudSet::ALL, &b).unwrap();
        backward.observe(&LOCAL, BaudSet::ALL, &a).unwrap();

        assert_eq!(forward.resolve_master(&LOCAL), 0x21);
        assert_eq!(backward.resolve_master(&LOCAL), 0x21);
    }

    #[test]
    fn test_equal_priority_lower_unique_id_wins() {
        let a = handshake(0x21, 10, 0x7000);
        let b = handshake(0x40, 10, 0x4000);

        for order in [[a, b], [b, a]] {
            let mut arbiter = Arbiter::new();
            for hs in order.iter() {
                arbiter.observe(&LOCAL, BaudSet::ALL, hs).unwrap();
            }
            // Local 0x5000 loses to 0x4000
            assert_eq!(arbiter.resolve_master(&LOCAL), 0x40);
        }
    }

    #[test]
    fn test_invalid_priority_rejected_without_change() {
        let mut arbiter = Arbiter::new();
        let result = arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 0, 1));
        assert_eq!(result, Err(ArbitrationError::InvalidPriority { device_id: 0x21, priority: 0 }));

        let result = arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 101, 1));
        assert!(result.is_err());
        assert!(arbiter.is_empty());
    }

    #[test]
    fn test_reserved_source_id_rejected() {
        let mut arbiter = Arbiter::new();
        assert_eq!(
            arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0xFF, 10, 1)),
            Err(ArbitrationError::ReservedDeviceId(0xFF))
        );
    }

    #[test]
    fn test_duplicate_identity() {
        let mut arbiter = Arbiter::new();
        arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 10, 1)).unwrap();

        assert_eq!(
            arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 10, 2)),
            Err(ArbitrationError::DuplicateIdentity { device_id: 0x21, known: 1, claimed: 2 })
        );
        assert_eq!(arbiter.peer(0x21).map(|p| p.unique_id), Some(1));

        // Someone else using our id
        assert!(matches!(
            arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(LOCAL.id, 10, 0x1234)),
            Err(ArbitrationError::DuplicateIdentity { .. })
        ));
    }

    #[test]
    fn test_own_echo_is_not_recorded() {
        let mut arbiter = Arbiter::new();
        let observation = arbiter
            .observe(&LOCAL, BaudSet::ALL, &handshake(LOCAL.id, LOCAL.priority, LOCAL.unique_id))
            .unwrap();

        assert!(observation.echo);
        assert!(arbiter.is_empty());
    }

    #[test]
    fn test_repeated_handshake_updates_in_place() {
        let mut arbiter = Arbiter::new();
        arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 10, 1)).unwrap();
        arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 60, 1)).unwrap();

        assert_eq!(arbiter.len(), 1);
        assert_eq!(arbiter.peer(0x21).map(|p| p.priority), Some(60));
    }

    #[test]
    fn test_peer_table_full() {
        let mut arbiter = Arbiter::new();
        for i in 0..SRXL_MAX_DEVICES {
            arbiter
                .observe(&LOCAL, BaudSet::ALL, &handshake(0x40 + i as u8, 10, 100 + i as u32))
                .unwrap();
        }

        assert_eq!(
            arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x90, 10, 1)),
            Err(ArbitrationError::TooManyDevices(SRXL_MAX_DEVICES))
        );
    }

    #[test]
    fn test_negotiate_baud_intersection() {
        let mut arbiter = Arbiter::new();
        arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 10, 1)).unwrap();
        assert_eq!(arbiter.negotiate_baud(BaudSet::ALL), BaudRate::Baud400000);
        assert_eq!(arbiter.negotiate_baud(BaudSet::BASE), BaudRate::Baud115200);

        let mut slow = handshake(0x40, 10, 2);
        slow.baud = BaudSet::BASE.bits();
        arbiter.observe(&LOCAL, BaudSet::ALL, &slow).unwrap();
        assert_eq!(arbiter.negotiate_baud(BaudSet::ALL), BaudRate::Baud115200);
    }

    #[test]
    fn test_broadcast_carries_baud_proposal() {
        let mut arbiter = Arbiter::new();
        let mut hs = handshake(0x21, 50, 1);
        hs.dest_id = SRXL_BROADCAST_ID;
        hs.baud = BaudRate::Baud400000.code();

        let observation = arbiter.observe(&LOCAL, BaudSet::ALL, &hs).unwrap();
        assert_eq!(observation.baud_proposal, Some(BaudRate::Baud400000));
        assert!(!observation.addressed_to_local);

        assert_eq!(
            arbiter.observe(&LOCAL, BaudSet::BASE, &hs),
            Err(ArbitrationError::UnsupportedBaud(1))
        );
    }

    #[test]
    fn test_reset_forgets_peers() {
        let mut arbiter = Arbiter::new();
        arbiter.observe(&LOCAL, BaudSet::ALL, &handshake(0x21, 90, 1)).unwrap();
        arbiter.reset();

        assert!(arbiter.is_empty());
        assert_eq!(arbiter.resolve_master(&LOCAL), LOCAL.id);
    }
}
