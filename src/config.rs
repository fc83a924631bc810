//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{Result, SrxlError};
use crate::srxl::protocol::{
    BaudRate, BaudSet, BindType, SrxlTiming, SRXL_BROADCAST_ID, SRXL_PRIORITY_MAX, SRXL_PRIORITY_MIN,
};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub device: DeviceConfig,
    pub bus: BusConfig,
    pub protocol: ProtocolConfig,
    pub recorder: RecorderConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u32,
}

/// Local device identity on the bus
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub id: u8,

    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub info: u8,

    #[serde(default = "default_unique_id")]
    pub unique_id: u32,
}

/// Bus link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_supported_baud_rates")]
    pub supported_baud_rates: Vec<u32>,
}

/// Protocol timing and bind configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolConfig {
    #[serde(default = "default_frame_loss_threshold_ms")]
    pub frame_loss_threshold_ms: u32,

    #[serde(default = "default_bind_timeout_ms")]
    pub bind_timeout_ms: u32,

    #[serde(default = "default_srxl_cycle_ms")]
    pub srxl_cycle_ms: u32,

    #[serde(default = "default_srxl2_cycle_ms")]
    pub srxl2_cycle_ms: u32,

    #[serde(default = "default_bind_type")]
    pub bind_type: String,
}

/// Channel recorder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default = "default_recorder_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_read_timeout_ms() -> u32 { 5 }

fn default_device_id() -> u8 { 0x30 }
fn default_priority() -> u8 { 10 }
fn default_unique_id() -> u32 { 0x5352_584C }

fn default_supported_baud_rates() -> Vec<u32> { vec![115200, 400000] }

fn default_frame_loss_threshold_ms() -> u32 { 50 }
fn default_bind_timeout_ms() -> u32 { 5000 }
fn default_srxl_cycle_ms() -> u32 { 22 }
fn default_srxl2_cycle_ms() -> u32 { 11 }
fn default_bind_type() -> String { "dsmx_11ms".to_string() }

fn default_recorder_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn invalid(message: impl std::fmt::Display) -> SrxlError {
    SrxlError::ConfigFile(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use srxl_bus::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > 1000 {
            return Err(invalid("read_timeout_ms must be between 1 and 1000"));
        }

        // Device id 0x00 and 0xFF are reserved on the wire
        if self.device.id == 0x00 || self.device.id == SRXL_BROADCAST_ID {
            return Err(invalid(format!("device id 0x{:02X} is reserved", self.device.id)));
        }

        if !(SRXL_PRIORITY_MIN..=SRXL_PRIORITY_MAX).contains(&self.device.priority) {
            return Err(invalid("device priority must be between 1 and 100"));
        }

        for &rate in &self.bus.supported_baud_rates {
            if BaudRate::from_bps(rate).is_none() {
                return Err(invalid(format!("unsupported bus baud rate {}", rate)));
            }
        }

        if !self.bus.supported_baud_rates.contains(&115200) {
            return Err(invalid("supported_baud_rates must include 115200"));
        }

        if self.protocol.frame_loss_threshold_ms == 0 || self.protocol.frame_loss_threshold_ms > 10000 {
            return Err(invalid("frame_loss_threshold_ms must be between 1 and 10000"));
        }

        if self.protocol.bind_timeout_ms == 0 || self.protocol.bind_timeout_ms > 60000 {
            return Err(invalid("bind_timeout_ms must be between 1 and 60000"));
        }

        for (name, value) in [
            ("srxl_cycle_ms", self.protocol.srxl_cycle_ms),
            ("srxl2_cycle_ms", self.protocol.srxl2_cycle_ms),
        ] {
            if value == 0 || value > 100 {
                return Err(invalid(format!("{} must be between 1 and 100", name)));
            }
        }

        if BindType::from_name(&self.protocol.bind_type).is_none() {
            return Err(invalid(format!("unknown bind_type '{}'", self.protocol.bind_type)));
        }

        if self.recorder.enabled && self.recorder.log_dir.is_empty() {
            return Err(invalid("recorder log_dir cannot be empty when enabled"));
        }

        if self.recorder.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.recorder.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }

    /// Protocol timing for the engine
    pub fn timing(&self) -> SrxlTiming {
        SrxlTiming {
            frame_loss_threshold_ms: self.protocol.frame_loss_threshold_ms,
            bind_timeout_ms: self.protocol.bind_timeout_ms,
            srxl_cycle_ms: self.protocol.srxl_cycle_ms,
            srxl2_cycle_ms: self.protocol.srxl2_cycle_ms,
        }
    }

    /// Baud rates this node advertises in handshakes
    pub fn baud_set(&self) -> BaudSet {
        self.bus
            .supported_baud_rates
            .iter()
            .filter_map(|&bps| BaudRate::from_bps(bps))
            .fold(BaudSet::BASE, BaudSet::with)
    }

    /// Bind type used when a bind is triggered
    ///
    /// # Errors
    ///
    /// Returns error if the configured name is unknown
    pub fn bind_type(&self) -> Result<BindType> {
        BindType::from_name(&self.protocol.bind_type)
            .ok_or_else(|| invalid(format!("unknown bind_type '{}'", self.protocol.bind_type)))
    }
}
