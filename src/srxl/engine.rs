//! # SRXL Bus Engine
//!
//! Owns the local device identity and every bus, and routes decoded packets
//! to the channel multiplexer, arbitration and bind logic.
//!
//! The engine never schedules itself. It is driven by two calls per bus:
//! [`Srxl::parse_packet`] (or [`Srxl::receive`] for raw bytes) when data
//! arrives and [`Srxl::run`] when time has passed.
//!
//! ## Usage
//!
//! ```
//! use srxl_bus::srxl::channels::ChannelData;
//! use srxl_bus::srxl::encoder::encode_channel_frame;
//! use srxl_bus::srxl::protocol::{BaudSet, TelemetryData};
//! use srxl_bus::srxl::{Srxl, SrxlHandler, Transport};
//!
//! struct Uart;
//! impl Transport for Uart {
//!     fn set_baud(&mut self, _baud: u32) {}
//!     fn transmit(&mut self, _frame: &[u8]) {}
//! }
//!
//! #[derive(Default)]
//! struct App { servo: u16 }
//! impl SrxlHandler for App {
//!     fn on_channel_data(&mut self, _bus: usize, data: &ChannelData, _failsafe: bool) {
//!         self.servo = data.values[0];
//!     }
//!     fn fill_telemetry(&mut self, _bus: usize, _telemetry: &mut TelemetryData) {}
//! }
//!
//! let mut srxl = Srxl::new(App::default());
//! srxl.init_device(0x30, 10, 0, 0x1234_5678)?;
//! srxl.init_bus(0, Uart, BaudSet::ALL)?;
//!
//! let frame = encode_channel_frame(false, 0x00, -40, 0, 0b1, &[1500]);
//! srxl.parse_packet(0, frame.as_bytes())?;
//! assert_eq!(srxl.handler().servo, 1500);
//! # Ok::<(), srxl_bus::error::SrxlError>(())
//! ```

use tracing::debug;

use super::bind::{BindMachine, BindOutcome, BindPhase};
use super::bus::{Bus, BusStats};
use super::channels::ChannelData;
use super::decoder::decode_frame;
use super::encoder::{encode_bind_frame, encode_handshake_frame};
use super::protocol::*;
use super::traits::{SrxlHandler, Transport};
use crate::error::{ConfigError, Result, SrxlError};

pub struct Srxl<T, H> {
    device: Option<DeviceInfo>,
    buses: [Option<Bus<T>>; SRXL_MAX_BUSES],
    handler: H,
    bind: BindMachine,
    timing: SrxlTiming,
}

impl<T, H> std::fmt::Debug for Srxl<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Srxl")
            .field("device", &self.device)
            .field("bind", &self.bind)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, H: SrxlHandler> Srxl<T, H> {
    /// Create an engine with default timing
    pub fn new(handler: H) -> Self {
        Self::with_timing(handler, SrxlTiming::default())
    }

    pub fn with_timing(handler: H, timing: SrxlTiming) -> Self {
        Self {
            device: None,
            buses: std::array::from_fn(|_| None),
            handler,
            bind: BindMachine::new(),
            timing,
        }
    }

    /// Register the local device identity used in arbitration
    ///
    /// # Errors
    ///
    /// - `InvalidDeviceId` for 0x00 and 0xFF
    /// - `InvalidPriority` outside 1-100
    /// - `DeviceInUse` once any bus is initialized
    pub fn init_device(&mut self, id: u8, priority: u8, info: u8, unique_id: u32) -> Result<()> {
        if id == 0x00 || id == SRXL_BROADCAST_ID {
            return Err(ConfigError::InvalidDeviceId(id).into());
        }

        if !(SRXL_PRIORITY_MIN..=SRXL_PRIORITY_MAX).contains(&priority) {
            return Err(ConfigError::InvalidPriority(priority).into());
        }

        if self.buses.iter().any(Option::is_some) {
            return Err(ConfigError::DeviceInUse.into());
        }

        self.device = Some(DeviceInfo {
            id,
            priority,
            info,
            unique_id,
        });
        debug!("Local device 0x{:02X} registered (priority {})", id, priority);
        Ok(())
    }

    /// Register a bus
    ///
    /// # Errors
    ///
    /// - `BusIndexOutOfRange` if `index >= SRXL_MAX_BUSES`
    /// - `BusAlreadyInitialized` on a second call for the same index
    /// - `DeviceNotInitialized` before [`Srxl::init_device`]
    pub fn init_bus(&mut self, index: usize, transport: T, supported: BaudSet) -> Result<()> {
        if index >= SRXL_MAX_BUSES {
            return Err(ConfigError::BusIndexOutOfRange {
                index,
                max: SRXL_MAX_BUSES,
            }
            .into());
        }

        if self.buses[index].is_some() {
            return Err(ConfigError::BusAlreadyInitialized(index).into());
        }

        if self.device.is_none() {
            return Err(ConfigError::DeviceNotInitialized.into());
        }

        self.buses[index] = Some(Bus::new(index, transport, supported));
        debug!("Bus {} initialized (bauds 0x{:02X})", index, supported.bits());
        Ok(())
    }

    fn local(&self) -> Result<DeviceInfo> {
        self.device.ok_or_else(|| ConfigError::DeviceNotInitialized.into())
    }

    fn bus_mut(&mut self, index: usize) -> Result<&mut Bus<T>> {
        if index >= SRXL_MAX_BUSES {
            return Err(ConfigError::BusIndexOutOfRange {
                index,
                max: SRXL_MAX_BUSES,
            }
            .into());
        }
        self.buses[index]
            .as_mut()
            .ok_or_else(|| ConfigError::BusNotInitialized(index).into())
    }

    /// Validate and apply one complete frame
    ///
    /// On success the bus inactivity timer restarts and any telemetry reply
    /// due in this cycle is transmitted. On failure nothing but the bus's
    /// rejected-frame counter changes; the caller discards the bytes.
    ///
    /// # Errors
    ///
    /// Framing, checksum and arbitration errors for the frame; configuration
    /// errors for an unknown bus.
    pub fn parse_packet(&mut self, bus_index: usize, frame: &[u8]) -> Result<()> {
        let local = self.local()?;
        self.bus_mut(bus_index)?;

        let packet = match decode_frame(frame) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Bus {}: rejected frame: {}", bus_index, e);
                self.bus_mut(bus_index)?.mark_rejected();
                return Err(e);
            }
        };

        if let Err(e) = self.dispatch(bus_index, &local, &packet) {
            debug!("Bus {}: rejected packet: {}", bus_index, e);
            self.bus_mut(bus_index)?.mark_rejected();
            return Err(e);
        }

        self.bus_mut(bus_index)?.mark_activity();
        self.service_telemetry(bus_index, 0)
    }

    /// Feed raw transport bytes and parse every frame they complete
    ///
    /// A frame that fails to decode is dropped and the bytes after its
    /// header are scanned again. Returns the number of frames accepted.
    pub fn receive(&mut self, bus_index: usize, bytes: &[u8]) -> Result<usize> {
        let mut accepted = 0;
        for &byte in bytes {
            accepted += self.receive_byte(bus_index, byte)?;
        }
        Ok(accepted)
    }

    fn receive_byte(&mut self, bus_index: usize, byte: u8) -> Result<usize> {
        let bus = self.bus_mut(bus_index)?;
        bus.accumulator.push(byte);

        let (buffer, len) = match bus.accumulator.take_frame() {
            Some(frame) => frame,
            None => return Ok(0),
        };

        match self.parse_packet(bus_index, &buffer[..len]) {
            Ok(()) => Ok(1),
            Err(SrxlError::Config(e)) => Err(e.into()),
            Err(SrxlError::Framing(_) | SrxlError::Checksum { .. }) => {
                let mut accepted = 0;
                for &byte in &buffer[1..len] {
                    accepted += self.receive_byte(bus_index, byte)?;
                }
                Ok(accepted)
            }
            Err(_) => Ok(0),
        }
    }

    fn dispatch(&mut self, bus_index: usize, local: &DeviceInfo, packet: &Packet) -> Result<()> {
        match packet {
            Packet::Control(control) => {
                self.on_control(bus_index, local, control)?;
            }
            Packet::Handshake(handshake) => {
                self.on_handshake(bus_index, local, handshake)?;
            }
            Packet::Bind(bind) => {
                self.on_bind(bus_index, local, bind)?;
            }
            Packet::Telemetry(telemetry) => {
                debug!(
                    "Bus {}: telemetry for 0x{:02X} (sensor 0x{:02X})",
                    bus_index,
                    telemetry.dest_id,
                    telemetry.data.sensor_id()
                );
            }
            Packet::Ignored { packet_type } => {
                debug!("Bus {}: ignoring packet type 0x{:02X}", bus_index, packet_type);
            }
        }
        Ok(())
    }

    fn on_control(&mut self, bus_index: usize, local: &DeviceInfo, control: &ControlPacket) -> Result<()> {
        let timing = self.timing;
        let bus = self.buses[bus_index]
            .as_mut()
            .ok_or(ConfigError::BusNotInitialized(bus_index))?;

        if !bus.channels.apply(control) {
            return Ok(());
        }

        let variant = bus.variant();
        let dest_id = bus.master_id().unwrap_or(SRXL_BROADCAST_ID);
        bus.telemetry
            .on_control_frame(variant, &timing, control.reply_id, local.id, dest_id);

        let failsafe = control.command == ControlCommand::Failsafe;
        self.handler.on_channel_data(bus_index, &bus.channels, failsafe);
        Ok(())
    }

    fn on_handshake(&mut self, bus_index: usize, local: &DeviceInfo, handshake: &Handshake) -> Result<()> {
        let bus = self.buses[bus_index]
            .as_mut()
            .ok_or(ConfigError::BusNotInitialized(bus_index))?;

        let supported = bus.supported_bauds();
        let observation = bus.arbiter.observe(local, supported, handshake)?;
        if observation.echo {
            return Ok(());
        }

        let was_master = bus.role() == Role::Master;
        let master_id = bus.arbiter.resolve_master(local);
        let role = if master_id == local.id { Role::Master } else { Role::Slave };
        bus.set_role(role, master_id);

        if observation.addressed_to_local {
            let reply = encode_handshake_frame(
                local.id,
                observation.src_id,
                local.priority,
                supported.bits(),
                local.info,
                local.unique_id,
            );
            bus.transmit(&reply);
        }

        match role {
            Role::Master => {
                let rate = bus.arbiter.negotiate_baud(supported);
                if !was_master || rate != bus.baud() {
                    let proposal = encode_handshake_frame(
                        local.id,
                        SRXL_BROADCAST_ID,
                        local.priority,
                        rate.code(),
                        local.info,
                        local.unique_id,
                    );
                    bus.transmit(&proposal);
                    bus.switch_baud(rate);
                }
            }
            _ => {
                if let Some(rate) = observation.baud_proposal {
                    if observation.src_id == master_id {
                        bus.switch_baud(rate);
                    } else {
                        debug!(
                            "Bus {}: ignoring baud proposal from non-master 0x{:02X}",
                            bus_index, observation.src_id
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn on_bind(&mut self, bus_index: usize, local: &DeviceInfo, packet: &BindPacket) -> Result<()> {
        if self.bind.acknowledge(bus_index, packet, local.id) {
            return Ok(());
        }

        if packet.device_id == local.id && packet.request.is_acknowledgement() {
            debug!("Bus {}: ignoring echo of own bind data", bus_index);
            return Ok(());
        }

        let addressed = packet.device_id == local.id || packet.device_id == SRXL_BROADCAST_ID;
        if !addressed {
            return Ok(());
        }

        match packet.request {
            BindRequest::Enter => {
                let target = self.bind_target(bus_index, local)?;
                if let Err(e) = self.bind.request(bus_index, packet.info.bind_type, target, self.timing.bind_timeout_ms) {
                    debug!("Bus {}: remote bind request ignored: {}", bus_index, e);
                }
            }
            BindRequest::Status => {
                let info = self.bind.bound_info().unwrap_or(BindInfo {
                    bind_type: packet.info.bind_type,
                    options: 0,
                    guid: 0,
                    unique_id: local.unique_id,
                });
                let reply = encode_bind_frame(BindRequest::BoundData, local.id, &info);
                self.bus_mut(bus_index)?.transmit(&reply);
            }
            BindRequest::BoundData | BindRequest::SetBindInfo => {
                debug!("Bus {}: unsolicited bind data from 0x{:02X}", bus_index, packet.device_id);
            }
        }

        Ok(())
    }

    /// Remote master of a bus, or broadcast while unresolved or local
    fn bind_target(&mut self, bus_index: usize, local: &DeviceInfo) -> Result<u8> {
        let bus = self.bus_mut(bus_index)?;
        Ok(bus.master_id().filter(|&id| id != local.id).unwrap_or(SRXL_BROADCAST_ID))
    }

    fn service_telemetry(&mut self, bus_index: usize, elapsed_ms: u32) -> Result<()> {
        let bus = self.buses[bus_index]
            .as_mut()
            .ok_or(ConfigError::BusNotInitialized(bus_index))?;

        let handler = &mut self.handler;
        if let Some(frame) = bus
            .telemetry
            .poll(elapsed_ms, |telemetry| handler.fill_telemetry(bus_index, telemetry))
        {
            bus.transmit(&frame);
        }
        Ok(())
    }

    /// Tell the engine that `elapsed_ms` passed on a bus
    ///
    /// Drives frame-loss detection, the bind deadline and the telemetry window.
    /// `run(bus, 0)` never changes channel data.
    pub fn run(&mut self, bus_index: usize, elapsed_ms: u32) -> Result<()> {
        let threshold = self.timing.frame_loss_threshold_ms;
        let bus = self.bus_mut(bus_index)?;

        if bus.tick(elapsed_ms, threshold) {
            let data = *bus.channels();
            self.handler.on_link_lost(bus_index, &data);
        }

        self.bind.tick(bus_index, elapsed_ms);
        self.service_telemetry(bus_index, elapsed_ms)
    }

    /// Request bind mode from the bus master
    ///
    /// The request goes out on the lowest initialized bus, addressed to its
    /// master (broadcast while unresolved).
    ///
    /// # Errors
    ///
    /// - [`crate::error::SrxlError::BindRejected`] unless the bind machine is Idle
    /// - `BusNotInitialized` when no bus exists
    pub fn enter_bind(&mut self, bind_type: BindType) -> Result<()> {
        let local = self.local()?;
        let bus_index = self
            .buses
            .iter()
            .position(Option::is_some)
            .ok_or(ConfigError::BusNotInitialized(0))?;

        let dest_id = self.bind_target(bus_index, &local)?;
        self.bind.request(bus_index, bind_type, dest_id, self.timing.bind_timeout_ms)?;

        let bus = self.bus_mut(bus_index)?;
        let request = encode_bind_frame(
            BindRequest::Enter,
            dest_id,
            &BindInfo {
                bind_type,
                options: 0,
                guid: 0,
                unique_id: local.unique_id,
            },
        );
        bus.transmit(&request);
        Ok(())
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn timing(&self) -> &SrxlTiming {
        &self.timing
    }

    pub fn bus(&self, index: usize) -> Option<&Bus<T>> {
        self.buses.get(index).and_then(Option::as_ref)
    }

    pub fn channel_data(&self, bus_index: usize) -> Option<&ChannelData> {
        self.bus(bus_index).map(Bus::channels)
    }

    pub fn role(&self, bus_index: usize) -> Option<Role> {
        self.bus(bus_index).map(Bus::role)
    }

    pub fn master_id(&self, bus_index: usize) -> Option<u8> {
        self.bus(bus_index).and_then(Bus::master_id)
    }

    pub fn baud(&self, bus_index: usize) -> Option<BaudRate> {
        self.bus(bus_index).map(Bus::baud)
    }

    pub fn variant(&self, bus_index: usize) -> Option<ProtocolVariant> {
        self.bus(bus_index).map(Bus::variant)
    }

    pub fn bus_stats(&self, bus_index: usize) -> Option<BusStats> {
        self.bus(bus_index).map(Bus::stats)
    }

    pub fn transport(&self, bus_index: usize) -> Option<&T> {
        self.bus(bus_index).map(Bus::transport)
    }

    pub fn transport_mut(&mut self, bus_index: usize) -> Option<&mut T> {
        self.buses
            .get_mut(bus_index)
            .and_then(Option::as_mut)
            .map(Bus::transport_mut)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn bind_state(&self) -> BindPhase {
        self.bind.phase()
    }

    /// A bind is requested or acknowledged but not yet committed
    pub fn is_bind_active(&self) -> bool {
        self.bind.is_active()
    }

    pub fn last_bind_outcome(&self) -> Option<BindOutcome> {
        self.bind.last_outcome()
    }

    /// Result of the last bind attempt
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SrxlError::BindTimeout`] if it timed out.
    pub fn check_bind(&self) -> Result<Option<BindInfo>> {
        self.bind.check()
    }
}
