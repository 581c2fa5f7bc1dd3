// src/io/mod.rs
//
// Byte sources, decoded message types and the serial scan pipeline.

pub mod error;
pub mod serial;
pub mod source;
pub mod types;

pub use error::ScanError;
pub use source::{read_exact, ByteSource, ReaderSource};
pub use types::{format_mac, AddressKind, Buffer, DeviceRecord, FrameHeader, ScanStats};
