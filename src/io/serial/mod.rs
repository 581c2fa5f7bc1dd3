// src/io/serial/mod.rs
//
// UART receiver for the BLE scanner's binary messages.
//
// - wire:     layout descriptors for the supported message variants
// - sync:     magic-pattern hunter
// - codec:    fixed-offset header and device record decoding
// - sequence: loss detection from the 8-bit sequence counter
// - reader:   the scan session state machine
// - port:     serial port byte source and port discovery

pub mod codec;
pub mod port;
pub mod reader;
pub mod sequence;
pub mod sync;
pub mod wire;

pub use codec::{decode_rssi, FrameDecoder};
pub use port::{list_ports, Parity, SerialOptions, SerialPortInfo, SerialSource};
pub use reader::{ScanConfig, ScanSession, ScanState, ScanSummary, StopReason};
pub use sequence::{LossReport, SequenceTracker};
pub use sync::FrameSynchronizer;
pub use wire::{MacOrder, WireFormat, WireVariant, MAGIC};
