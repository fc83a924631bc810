//! Bus transport that queues engine output for the async serial port.
//!
//! The engine calls [`Transport`] synchronously from inside `parse_packet`
//! and `run`; the host drains the queue to the port afterwards.

use std::collections::VecDeque;

use crate::srxl::Transport;

/// Frames and baud changes queued by the engine for one bus
#[derive(Debug, Default)]
pub struct SerialOutbox {
    frames: VecDeque<Vec<u8>>,
    pending_baud: Option<u32>,
    frames_queued: u64,
}

impl SerialOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next frame to write, oldest first
    pub fn pop_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    /// Baud change requested since the last call; only the latest one counts
    pub fn take_baud(&mut self) -> Option<u32> {
        self.pending_baud.take()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.pending_baud.is_none()
    }

    pub fn frames_queued(&self) -> u64 {
        self.frames_queued
    }
}

impl Transport for SerialOutbox {
    fn set_baud(&mut self, baud: u32) {
        self.pending_baud = Some(baud);
    }

    fn transmit(&mut self, frame: &[u8]) {
        self.frames.push_back(frame.to_vec());
        self.frames_queued += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_drain_in_order() {
        let mut outbox = SerialOutbox::new();
        outbox.transmit(&[1, 2]);
        outbox.transmit(&[3]);

        assert_eq!(outbox.pop_frame(), Some(vec![1, 2]));
        assert_eq!(outbox.pop_frame(), Some(vec![3]));
        assert_eq!(outbox.pop_frame(), None);
        assert_eq!(outbox.frames_queued(), 2);
    }

    #[test]
    fn test_latest_baud_wins() {
        let mut outbox = SerialOutbox::new();
        outbox.set_baud(400_000);
        outbox.set_baud(115_200);

        assert!(!outbox.is_empty());
        assert_eq!(outbox.take_baud(), Some(115_200));
        assert_eq!(outbox.take_baud(), None);
        assert!(outbox.is_empty());
    }
}
