// src/lib.rs
//
// bleuart: receiver for BLE advertisement buffers streamed over UART by a
// scanner board. Synchronizes on the message magic, decodes fixed-layout
// headers and device records, tracks sequence loss and hands complete
// buffers to a record sink.

#[macro_use]
pub mod logging;

pub mod io;
pub mod position;
pub mod settings;
pub mod sink;

pub use io::serial::{FrameDecoder, ScanConfig, ScanSession, ScanSummary, StopReason, WireFormat, WireVariant};
pub use io::{Buffer, ByteSource, DeviceRecord, ReaderSource, ScanError, ScanStats};
pub use position::{Position, PositionCell};
pub use settings::ScannerSettings;
pub use sink::{CollectSink, Delivery, JsonLinesSink, LogSink, QueuedSink, RecordSink};
