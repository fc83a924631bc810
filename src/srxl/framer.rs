//! # Frame Accumulator
//!
//! Byte-level state machine that cuts an SRXL byte stream into candidate
//! frames. It only looks at the header and length bytes; checksum and
//! payload validation belong to the decoder.

use super::protocol::{SRXL_HEADER, SRXL_MAX_FRAME_SIZE, SRXL_MIN_FRAME_SIZE};

/// Accumulator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Discarding bytes until a header byte arrives
    WaitingForHeader,
    /// Collecting bytes; `expected` is known once the length byte arrives
    AccumulatingBody { expected: Option<usize> },
    /// A complete candidate frame is buffered
    FrameReady,
}

/// Fixed-size buffer plus the state machine feeding it
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    buffer: [u8; SRXL_MAX_FRAME_SIZE],
    len: usize,
    state: FrameState,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: [0u8; SRXL_MAX_FRAME_SIZE],
            len: 0,
            state: FrameState::WaitingForHeader,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Drop any partial frame and wait for the next header byte
    pub fn reset(&mut self) {
        self.len = 0;
        self.state = FrameState::WaitingForHeader;
    }

    /// Feed one byte and return the new state
    ///
    /// A header whose length byte is out of range is dropped and the two
    /// bytes after it are scanned again. Pushing after [`FrameState::FrameReady`] discards the ready frame.
    pub fn push(&mut self, byte: u8) -> FrameState {
        if self.state == FrameState::FrameReady {
            self.reset();
        }

        match self.state {
            FrameState::WaitingForHeader => {
                if byte == SRXL_HEADER {
                    self.buffer[0] = byte;
                    self.len = 1;
                    self.state = FrameState::AccumulatingBody { expected: None };
                }
            }
            FrameState::AccumulatingBody { expected } => {
                self.buffer[self.len] = byte;
                self.len += 1;

                let expected = match expected {
                    Some(expected) => expected,
                    None if self.len == 3 => {
                        let declared = byte as usize;
                        if !(SRXL_MIN_FRAME_SIZE..=SRXL_MAX_FRAME_SIZE).contains(&declared) {
                            // Not a real header; rescan what followed it
                            let tail = [self.buffer[1], self.buffer[2]];
                            self.reset();
                            for byte in tail {
                                self.push(byte);
                            }
                            return self.state;
                        }
                        declared
                    }
                    None => {
                        return self.state;
                    }
                };

                self.state = if self.len >= expected {
                    FrameState::FrameReady
                } else {
                    FrameState::AccumulatingBody { expected: Some(expected) }
                };
            }
            FrameState::FrameReady => {}
        }

        self.state
    }

    /// The buffered frame, once ready
    pub fn frame(&self) -> Option<&[u8]> {
        match self.state {
            FrameState::FrameReady => Some(&self.buffer[..self.len]),
            _ => None,
        }
    }

    /// Copy the ready frame out and start over
    pub fn take_frame(&mut self) -> Option<([u8; SRXL_MAX_FRAME_SIZE], usize)> {
        if self.state != FrameState::FrameReady {
            return None;
        }
        let frame = (self.buffer, self.len);
        self.reset();
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srxl::encoder::encode_channel_frame;

    fn feed(acc: &mut FrameAccumulator, bytes: &[u8]) -> FrameState {
        let mut state = acc.state();
        for &byte in bytes {
            state = acc.push(byte);
        }
        state
    }

    #[test]
    fn test_ignores_noise_before_header() {
        let mut acc = FrameAccumulator::new();
        assert_eq!(feed(&mut acc, &[0x00, 0x12, 0xFF]), FrameState::WaitingForHeader);
    }

    #[test]
    fn test_assembles_complete_frame() {
        let frame = encode_channel_frame(false, 0, 0, 0, 0b11, &[1000, 2000]);
        let mut acc = FrameAccumulator::new();

        let (head, tail) = frame.as_bytes().split_at(5);
        assert_eq!(feed(&mut acc, head), FrameState::AccumulatingBody { expected: Some(18) });
        assert!(acc.frame().is_none());
        assert_eq!(feed(&mut acc, tail), FrameState::FrameReady);
        assert_eq!(acc.frame(), Some(frame.as_bytes()));
    }

    #[test]
    fn test_take_frame_resets() {
        let frame = encode_channel_frame(false, 0, 0, 0, 0b1, &[1500]);
        let mut acc = FrameAccumulator::new();
        feed(&mut acc, frame.as_bytes());

        let (buffer, len) = acc.take_frame().unwrap();
        assert_eq!(&buffer[..len], frame.as_bytes());
        assert_eq!(acc.state(), FrameState::WaitingForHeader);
        assert!(acc.take_frame().is_none());
    }

    #[test]
    fn test_rejects_impossible_length() {
        let mut acc = FrameAccumulator::new();
        assert_eq!(feed(&mut acc, &[SRXL_HEADER, 0xCD, 0x02]), FrameState::WaitingForHeader);
        assert_eq!(feed(&mut acc, &[SRXL_HEADER, 0xCD, 0xF0]), FrameState::WaitingForHeader);
    }

    #[test]
    fn test_stray_header_before_frame() {
        let frame = encode_channel_frame(false, 0, 0, 0, 0b1, &[1234]);
        let mut acc = FrameAccumulator::new();

        assert_eq!(acc.push(SRXL_HEADER), FrameState::AccumulatingBody { expected: None });
        assert_eq!(feed(&mut acc, frame.as_bytes()), FrameState::FrameReady);
        assert_eq!(acc.frame(), Some(frame.as_bytes()));
    }

    #[test]
    fn test_header_inside_bad_length_is_rescanned() {
        let mut acc = FrameAccumulator::new();
        assert_eq!(
            feed(&mut acc, &[SRXL_HEADER, SRXL_HEADER, 0xF0]),
            FrameState::AccumulatingBody { expected: None }
        );
        assert_eq!(acc.push(0x10), FrameState::AccumulatingBody { expected: Some(0x10) });
    }

    #[test]
    fn test_back_to_back_frames() {
        let first = encode_channel_frame(false, 0, 0, 0, 0b1, &[1000]);
        let second = encode_channel_frame(true, 0, 0, 0, 0b1, &[2000]);
        let mut acc = FrameAccumulator::new();

        assert_eq!(feed(&mut acc, first.as_bytes()), FrameState::FrameReady);
        acc.take_frame();
        assert_eq!(feed(&mut acc, second.as_bytes()), FrameState::FrameReady);
        assert_eq!(acc.frame(), Some(second.as_bytes()));
    }

    #[test]
    fn test_push_after_ready_discards_frame() {
        let frame = encode_channel_frame(false, 0, 0, 0, 0b1, &[1000]);
        let mut acc = FrameAccumulator::new();
        feed(&mut acc, frame.as_bytes());

        assert_eq!(acc.push(SRXL_HEADER), FrameState::AccumulatingBody { expected: None });
    }
}
