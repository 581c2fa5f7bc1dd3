// src/io/types.rs
//
// Decoded message types shared by the decoder, the scan loop and the sinks.

use chrono::{DateTime, Local};
use serde::Serialize;

use super::serial::wire::{MacOrder, ADV_DATA_CAPACITY, MAGIC};
use crate::position::Position;

// ============================================================================
// Header
// ============================================================================

/// Fixed header at the start of every message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    /// Type byte, only present in the single-advertisement layout
    pub message_type: Option<u8>,
    /// Wraps mod 256
    pub sequence: u8,
    /// Advertisements seen before deduplication (buffer layouts only)
    pub advertisement_count_raw: Option<u16>,
    /// Number of device records that follow the header
    pub device_count: u8,
    /// Scanner uptime in ms when the buffer was closed (timestamped layout only)
    pub capture_time_ms: Option<u32>,
}

impl FrameHeader {
    pub fn new(sequence: u8, device_count: u8) -> Self {
        FrameHeader {
            magic: MAGIC,
            message_type: None,
            sequence,
            advertisement_count_raw: None,
            device_count,
            capture_time_ms: None,
        }
    }
}

// ============================================================================
// Device record
// ============================================================================

/// Advertiser address type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Public,
    Random,
}

/// One observed BLE peripheral
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRecord {
    /// MAC bytes exactly as received
    pub mac: [u8; 6],
    /// How `mac` should be rendered
    pub mac_order: MacOrder,
    /// 0 = public, 1 = random
    pub addr_type: u8,
    pub adv_type: u8,
    /// dBm
    pub rssi: i8,
    /// Meaningful bytes in `data`
    pub data_len: u8,
    /// Raw payload field; bytes past `data_len` are padding
    pub data: [u8; ADV_DATA_CAPACITY],
    /// Advertisements folded into this record during the sampling interval
    pub n_adv: u8,
    /// Scanner uptime in ms of the latest advertisement (timestamped layout only)
    pub last_seen_ms: Option<u32>,
}

impl DeviceRecord {
    /// Colon-separated uppercase hex, honouring the wire byte order
    pub fn mac_string(&self) -> String {
        format_mac(&self.mac, self.mac_order)
    }

    pub fn address_kind(&self) -> AddressKind {
        if self.addr_type == 0 {
            AddressKind::Public
        } else {
            AddressKind::Random
        }
    }

    /// Payload view limited to `data_len`
    pub fn payload(&self) -> &[u8] {
        let len = (self.data_len as usize).min(ADV_DATA_CAPACITY);
        &self.data[..len]
    }
}

/// Render six MAC bytes as `AA:BB:CC:DD:EE:FF`
pub fn format_mac(mac: &[u8; 6], order: MacOrder) -> String {
    let render = |bytes: &mut dyn Iterator<Item = &u8>| {
        bytes.map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(":")
    };
    match order {
        MacOrder::Stream => render(&mut mac.iter()),
        MacOrder::Reversed => render(&mut mac.iter().rev()),
    }
}

// ============================================================================
// Buffer
// ============================================================================

/// One fully decoded message. Built only after every declared record was read.
#[derive(Clone, Debug)]
pub struct Buffer {
    /// Host wall-clock time at delivery
    pub timestamp: DateTime<Local>,
    pub header: FrameHeader,
    /// Always `header.device_count` long
    pub devices: Vec<DeviceRecord>,
    /// Most recent position fix at delivery time, possibly stale
    pub position: Option<Position>,
}

// ============================================================================
// Statistics
// ============================================================================

/// Cumulative counters for a scanning session
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScanStats {
    /// Buffers whose sequence number was observed
    pub received: u64,
    /// Buffers inferred missing from sequence gaps
    pub lost: u64,
    /// Percentage of expected buffers that never arrived
    pub loss_rate: f64,
    /// Frames abandoned because the source ran dry mid-frame
    pub truncated: u64,
    /// Frames abandoned for implausible header contents
    pub rejected: u64,
    /// Bytes discarded while hunting for the sync pattern
    pub skipped_bytes: u64,
}
