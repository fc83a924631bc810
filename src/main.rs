//! # SRXL Bus Node
//!
//! Joins a Spektrum SRXL / SRXL2 bus on a Linux UART as a slave device.
//!
//! The node takes part in handshake arbitration, follows baud negotiation,
//! tracks channel data, answers its telemetry slot and can enter bind mode.

use anyhow::{Context, Result};
use srxl_bus::config::Config;
use srxl_bus::recorder::ChannelRecorder;
use srxl_bus::serial::{SerialOutbox, SrxlSerial};
use srxl_bus::srxl::channels::ChannelData;
use srxl_bus::srxl::protocol::{TelemetryData, SRXL_MAX_FRAME_SIZE};
use srxl_bus::srxl::{Srxl, SrxlHandler};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default configuration file path
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// The node drives a single bus
const BUS: usize = 0;

/// Number of channel frames between status log messages
const LOG_INTERVAL_FRAMES: u64 = 1000;

/// Application side of the bus
struct BusNode {
    recorder: Option<ChannelRecorder>,
    channel_frames: u64,
    failsafe_frames: u64,
}

impl BusNode {
    fn new(recorder: Option<ChannelRecorder>) -> Self {
        Self {
            recorder,
            channel_frames: 0,
            failsafe_frames: 0,
        }
    }
}

impl SrxlHandler for BusNode {
    fn on_channel_data(&mut self, bus: usize, data: &ChannelData, failsafe: bool) {
        self.channel_frames += 1;
        if failsafe {
            self.failsafe_frames += 1;
        }

        if self.channel_frames % LOG_INTERVAL_FRAMES == 0 {
            info!(
                "Received {} channel frames (rssi {}, losses {}, ch1 {})",
                self.channel_frames, data.rssi, data.frame_losses, data.values[0]
            );
        }

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(bus, data) {
                warn!("Channel recorder failed, disabling: {}", e);
                self.recorder = None;
            }
        }
    }

    fn fill_telemetry(&mut self, _bus: usize, _telemetry: &mut TelemetryData) {
        // No sensors attached; an all-zero reply keeps the slot alive
    }

    fn on_link_lost(&mut self, bus: usize, data: &ChannelData) {
        warn!("Bus {} lost, holding last channel values (losses {})", bus, data.frame_losses);
    }
}

/// Main entry point for the SRXL bus node
///
/// # Control Flow
///
/// 1. Load configuration (first argument or `config/default.toml`)
/// 2. Register the device and bus 0, open the UART at 115200 baud
/// 3. Loop: read bytes with a timeout and feed the engine, advance the
///    engine clock, write queued frames then apply baud changes
/// 4. `SIGUSR1` enters bind mode; Ctrl+C shuts down and logs statistics
#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .with_writer(writer)
        .init();

    info!("SRXL Bus v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    let bind_type = config.bind_type()?;

    let recorder = if config.recorder.enabled {
        Some(ChannelRecorder::new(
            &config.recorder.log_dir,
            config.recorder.max_records_per_file,
            config.recorder.max_files_to_keep,
        )?)
    } else {
        None
    };

    let mut srxl = Srxl::with_timing(BusNode::new(recorder), config.timing());
    srxl.init_device(
        config.device.id,
        config.device.priority,
        config.device.info,
        config.device.unique_id,
    )?;
    srxl.init_bus(BUS, SerialOutbox::new(), config.baud_set())?;

    let mut serial = SrxlSerial::open_with_paths(&[config.serial.port.as_str()], srxl_bus::serial::SRXL_DEFAULT_BAUD_RATE)?;
    info!(
        "Device 0x{:02X} (priority {}) on {}",
        config.device.id,
        config.device.priority,
        serial.device_path()
    );

    let mut bind_signal = signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    info!("Send SIGUSR1 to enter bind ({}), Ctrl+C to exit", config.protocol.bind_type);

    let read_timeout_ms = config.serial.read_timeout_ms;
    let mut buf = [0u8; SRXL_MAX_FRAME_SIZE];
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            read = serial.read_with_timeout(&mut buf, read_timeout_ms) => {
                match read? {
                    Some(n) => {
                        let accepted = srxl.receive(BUS, &buf[..n])?;
                        if accepted > 0 {
                            debug!("Accepted {} frame(s)", accepted);
                        }
                    }
                    None => debug!("Bus idle for {} ms", read_timeout_ms),
                }
            }

            _ = bind_signal.recv() => {
                match srxl.enter_bind(bind_type) {
                    Ok(()) => info!("Bind requested ({:?})", bind_type),
                    Err(e) => warn!("Cannot enter bind: {}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }

        let elapsed_ms = last_tick.elapsed().as_millis() as u32;
        if elapsed_ms > 0 {
            last_tick += std::time::Duration::from_millis(elapsed_ms as u64);
            srxl.run(BUS, elapsed_ms)?;
        }

        if let Some(outbox) = srxl.transport_mut(BUS) {
            serial.flush_outbox(outbox).await?;
        }
    }

    if let Some(stats) = srxl.bus_stats(BUS) {
        info!(
            "Frames accepted: {}, rejected: {}, link losses: {}",
            stats.good_frames, stats.bad_frames, stats.link_losses
        );
    }
    info!(
        "Channel frames: {} ({} failsafe), last bind: {:?}",
        srxl.handler().channel_frames,
        srxl.handler().failsafe_frames,
        srxl.last_bind_outcome()
    );

    Ok(())
}
