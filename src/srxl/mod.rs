//! # SRXL Protocol Module
//!
//! Implementation of the Spektrum SRXL / SRXL2 serial receiver bus.
//!
//! This module handles:
//! - Frame accumulation, validation and decoding (CRC-16/XMODEM)
//! - Channel data multiplexing by channel mask
//! - Master arbitration and baud negotiation between bus devices
//! - Telemetry slot scheduling
//! - The bind state machine
//!
//! Nothing in here performs I/O. The host application supplies a
//! [`Transport`] per bus and an [`SrxlHandler`] for channel and telemetry
//! callbacks, then drives [`Srxl`] with received frames and elapsed time.

pub mod protocol;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod framer;
pub mod channels;
pub mod telemetry;
pub mod bind;
pub mod arbitration;
pub mod bus;
pub mod traits;
pub mod engine;

pub use engine::Srxl;
pub use traits::{SrxlHandler, Transport};
