// src/settings.rs
//
// Scanner settings, loaded from a TOML file. Every field has a default so a
// partial (or missing) file is fine; CLI flags are applied on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::serial::codec::FrameDecoder;
use crate::io::serial::port::{Parity, SerialOptions};
use crate::io::serial::reader::{ScanConfig, DEFAULT_STATS_INTERVAL};
use crate::io::serial::wire::{MacOrder, WireFormat, WireVariant, DEFAULT_MAX_DEVICES};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScannerSettings {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Stop after this many seconds (unset = run until cancelled)
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub variant: WireVariant,
    /// Overrides the variant's MAC byte order
    #[serde(default)]
    pub mac_order: Option<MacOrder>,
    /// Headers declaring more devices are dropped (0 = no limit)
    #[serde(default = "default_max_devices")]
    pub max_devices: u8,
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_file_logging")]
    pub file_logging: bool,
    /// JSON lines output file (unset = log only)
    #[serde(default)]
    pub output: Option<String>,
}

fn default_port() -> String {
    if cfg!(windows) {
        "COM3".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_max_devices() -> u8 {
    DEFAULT_MAX_DEVICES
}

fn default_stats_interval() -> u64 {
    DEFAULT_STATS_INTERVAL
}

fn default_log_dir() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bleuart")
        .join("logs")
        .to_string_lossy()
        .to_string()
}

fn default_file_logging() -> bool {
    true
}

impl Default for ScannerSettings {
    fn default() -> Self {
        ScannerSettings {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            duration_secs: None,
            variant: WireVariant::default(),
            mac_order: None,
            max_devices: default_max_devices(),
            stats_interval: default_stats_interval(),
            log_dir: default_log_dir(),
            file_logging: default_file_logging(),
            output: None,
        }
    }
}

impl ScannerSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;
        let settings = Self::from_toml_str(&content)?;
        tlog!("[settings] Loaded {}", path.display());
        Ok(settings)
    }

    /// Load `path` if given, otherwise the default settings file if it exists,
    /// otherwise built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, String> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_settings_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        let format = WireFormat::from(self.variant);
        match self.mac_order {
            Some(order) => format.with_mac_order(order),
            None => format,
        }
    }

    pub fn decoder(&self) -> FrameDecoder {
        let decoder = FrameDecoder::new(self.wire_format());
        if self.max_devices > 0 {
            decoder.with_max_devices(self.max_devices)
        } else {
            decoder
        }
    }

    pub fn serial_options(&self) -> SerialOptions {
        SerialOptions {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            duration: self.duration_secs.map(Duration::from_secs),
            stats_interval: self.stats_interval,
        }
    }
}

/// `<config dir>/bleuart/settings.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bleuart").join("settings.toml"))
}
