// src/io/serial/wire.rs
//
// Wire format descriptors for the scanner's UART messages.
//
// Every message starts with the sync pattern 55 55 55 55. The bytes alone do
// not say which layout follows, so the receiver is told out-of-band.
//
// single (one advertisement per message):
//   [magic-4][type-1][seq-1] [mac-6][addr_type-1][adv_type-1][rssi-1][data_len-1][data-31][pad-2]
//
// buffer (deduplicated devices collected over one sampling interval):
//   [magic-4][seq-1][n_adv_raw-2 LE][n_mac-1]
//   n_mac x [mac-6][addr_type-1][adv_type-1][rssi-1][data_len-1][data-31][n_adv-1]
//
// buffer_timestamped (firmware struct layout, uptime stamps in ms):
//   [magic-4][seq-1][n_adv_raw-2 LE][n_mac-1][uptime-4 LE]
//   n_mac x [... as buffer ...][last_seen-4 LE]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

/// Sync pattern that opens every message
pub const MAGIC: [u8; 4] = [0x55, 0x55, 0x55, 0x55];
/// Capacity of the advertisement payload field
pub const ADV_DATA_CAPACITY: usize = 31;
/// Message type byte for an advertisement report (single variant)
pub const MSG_TYPE_ADV: u8 = 0x01;
/// Most devices the firmware tracks per buffer
pub const DEFAULT_MAX_DEVICES: u8 = 50;

const MAC_LEN: usize = 6;
/// addr_type + adv_type + rssi + data_len
const RECORD_FIXED_FIELDS: usize = 4;

// =============================================================================
// Types
// =============================================================================

/// Byte order of the MAC address on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacOrder {
    /// Render bytes in the order they arrive
    Stream,
    /// Render bytes last-to-first (little-endian bt_addr as sent by the controller)
    Reversed,
}

impl FromStr for MacOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" => Ok(MacOrder::Stream),
            "reversed" | "reverse" => Ok(MacOrder::Reversed),
            _ => Err(format!("Unknown MAC order: {}", s)),
        }
    }
}

/// Named wire layouts seen from the scanner firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireVariant {
    Single,
    #[default]
    Buffer,
    BufferTimestamped,
}

impl WireVariant {
    pub fn name(&self) -> &'static str {
        match self {
            WireVariant::Single => "single",
            WireVariant::Buffer => "buffer",
            WireVariant::BufferTimestamped => "buffer_timestamped",
        }
    }
}

impl fmt::Display for WireVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "single" | "a" => Ok(WireVariant::Single),
            "buffer" | "b" => Ok(WireVariant::Buffer),
            "buffer_timestamped" | "timestamped" | "c" => Ok(WireVariant::BufferTimestamped),
            _ => Err(format!("Unknown wire variant: {}", s)),
        }
    }
}

/// Field-level description of one wire layout.
///
/// The decoder is driven entirely by this struct, so layouts that differ only
/// in optional fields share one code path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFormat {
    /// Expected type byte between magic and sequence, if the layout has one
    pub message_type: Option<u8>,
    /// Header carries a u16 raw advertisement count
    pub adv_count_field: bool,
    /// Header carries a u8 device count; when false exactly one record follows
    pub device_count_field: bool,
    /// Header ends with a u32 capture timestamp
    pub header_timestamp: bool,
    /// Record carries a trailing u8 repeat counter
    pub n_adv_field: bool,
    /// Record carries a trailing u32 last-seen timestamp
    pub device_timestamp: bool,
    /// Unused bytes after each record
    pub record_padding: usize,
    pub mac_order: MacOrder,
}

impl WireFormat {
    pub fn single() -> Self {
        WireFormat {
            message_type: Some(MSG_TYPE_ADV),
            adv_count_field: false,
            device_count_field: false,
            header_timestamp: false,
            n_adv_field: false,
            device_timestamp: false,
            record_padding: 2,
            mac_order: MacOrder::Reversed,
        }
    }

    pub fn buffer() -> Self {
        WireFormat {
            message_type: None,
            adv_count_field: true,
            device_count_field: true,
            header_timestamp: false,
            n_adv_field: true,
            device_timestamp: false,
            record_padding: 0,
            mac_order: MacOrder::Stream,
        }
    }

    pub fn buffer_timestamped() -> Self {
        WireFormat {
            header_timestamp: true,
            device_timestamp: true,
            ..WireFormat::buffer()
        }
    }

    pub fn with_mac_order(mut self, order: MacOrder) -> Self {
        self.mac_order = order;
        self
    }

    /// Header length in bytes, magic included
    pub fn header_len(&self) -> usize {
        let mut len = MAGIC.len() + 1; // sequence
        if self.message_type.is_some() {
            len += 1;
        }
        if self.adv_count_field {
            len += 2;
        }
        if self.device_count_field {
            len += 1;
        }
        if self.header_timestamp {
            len += 4;
        }
        len
    }

    /// Length of one device record, padding included
    pub fn record_len(&self) -> usize {
        let mut len = MAC_LEN + RECORD_FIXED_FIELDS + ADV_DATA_CAPACITY;
        if self.n_adv_field {
            len += 1;
        }
        if self.device_timestamp {
            len += 4;
        }
        len + self.record_padding
    }

    /// Total message length for a given device count
    pub fn frame_len(&self, device_count: u8) -> usize {
        self.header_len() + self.record_len() * device_count as usize
    }
}

impl Default for WireFormat {
    fn default() -> Self {
        WireFormat::buffer()
    }
}

impl From<WireVariant> for WireFormat {
    fn from(variant: WireVariant) -> Self {
        match variant {
            WireVariant::Single => WireFormat::single(),
            WireVariant::Buffer => WireFormat::buffer(),
            WireVariant::BufferTimestamped => WireFormat::buffer_timestamped(),
        }
    }
}
