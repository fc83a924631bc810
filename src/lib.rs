//! # SRXL Bus Library
//!
//! Spektrum SRXL / SRXL2 receiver bus engine with a serial host bridge.
//!
//! The [`srxl`] module is a transport-agnostic protocol engine: it frames and
//! validates packets, arbitrates the bus master, multiplexes channel data,
//! schedules telemetry replies and runs the bind procedure. The remaining
//! modules host the engine on a Linux serial port.

pub mod config;
pub mod error;
pub mod recorder;
pub mod serial;
pub mod srxl;
