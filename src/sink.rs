// src/sink.rs
//
// Record sinks: where completed buffers go.
//
// The scan loop hands every fully decoded buffer to a RecordSink together with
// its loss report and a cumulative stats snapshot. `finish` is called exactly
// once when the session ends, whatever the reason.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::Write;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use crate::io::error::ScanError;
use crate::io::serial::sequence::LossReport;
use crate::io::types::{AddressKind, Buffer, DeviceRecord, ScanStats};
use crate::position::Position;

/// One completed buffer as handed to a sink
#[derive(Clone, Debug)]
pub struct Delivery {
    pub buffer: Buffer,
    pub loss: LossReport,
    /// Counters as of this buffer
    pub stats: ScanStats,
}

pub trait RecordSink {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), ScanError>;

    /// Called once when the session ends, with the final counters
    fn finish(&mut self, _stats: &ScanStats) -> Result<(), ScanError> {
        Ok(())
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), ScanError> {
        (**self).deliver(delivery)
    }

    fn finish(&mut self, stats: &ScanStats) -> Result<(), ScanError> {
        (**self).finish(stats)
    }
}

// ============================================================================
// Log sink
// ============================================================================

/// Writes a short summary of every buffer to the log
#[derive(Debug, Default)]
pub struct LogSink {
    /// Also log one line per device
    verbose: bool,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose() -> Self {
        LogSink { verbose: true }
    }
}

impl RecordSink for LogSink {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), ScanError> {
        let header = &delivery.buffer.header;
        let raw = header
            .advertisement_count_raw
            .map(|n| format!(", {} raw adv", n))
            .unwrap_or_default();
        tlog!(
            "[sink] seq {:3} | {} devices{} | lost {}",
            header.sequence,
            header.device_count,
            raw,
            delivery.loss.lost
        );

        if self.verbose {
            for device in &delivery.buffer.devices {
                tlog!(
                    "[sink]   {} {:>4} dBm  adv_type 0x{:02X}  n_adv {:3}  data {}",
                    device.mac_string(),
                    device.rssi,
                    device.adv_type,
                    device.n_adv,
                    hex::encode_upper(device.payload())
                );
            }
        }
        Ok(())
    }

    fn finish(&mut self, stats: &ScanStats) -> Result<(), ScanError> {
        tlog!(
            "[sink] Done: {} received, {} lost ({:.2}%)",
            stats.received,
            stats.lost,
            stats.loss_rate
        );
        Ok(())
    }
}

// ============================================================================
// JSON lines sink
// ============================================================================

#[derive(Serialize)]
struct DeviceDocument {
    mac: String,
    addr_type: u8,
    address_kind: AddressKind,
    adv_type: u8,
    rssi: i8,
    data_len: u8,
    /// Payload up to data_len, lowercase hex
    data: String,
    n_adv: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_seen_ms: Option<u32>,
}

impl From<&DeviceRecord> for DeviceDocument {
    fn from(device: &DeviceRecord) -> Self {
        DeviceDocument {
            mac: device.mac_string(),
            addr_type: device.addr_type,
            address_kind: device.address_kind(),
            adv_type: device.adv_type,
            rssi: device.rssi,
            data_len: device.data_len,
            data: hex::encode(device.payload()),
            n_adv: device.n_adv,
            last_seen_ms: device.last_seen_ms,
        }
    }
}

#[derive(Serialize)]
struct Coordinates {
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize)]
struct GpsDocument {
    timestamp: DateTime<Local>,
    coordinates: Coordinates,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

impl From<&Position> for GpsDocument {
    fn from(position: &Position) -> Self {
        GpsDocument {
            timestamp: position.timestamp,
            coordinates: Coordinates {
                latitude: position.latitude,
                longitude: position.longitude,
            },
            speed: position.speed_knots,
        }
    }
}

#[derive(Serialize)]
struct BufferDocument<'a> {
    timestamp: DateTime<Local>,
    sequence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_adv_raw: Option<u16>,
    n_mac: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    capture_time_ms: Option<u32>,
    devices: Vec<DeviceDocument>,
    gps_data: Option<GpsDocument>,
    lost: u8,
    stats: &'a ScanStats,
}

impl<'a> BufferDocument<'a> {
    fn new(delivery: &'a Delivery) -> Self {
        let buffer = &delivery.buffer;
        BufferDocument {
            timestamp: buffer.timestamp,
            sequence: buffer.header.sequence,
            n_adv_raw: buffer.header.advertisement_count_raw,
            n_mac: buffer.header.device_count,
            capture_time_ms: buffer.header.capture_time_ms,
            devices: buffer.devices.iter().map(DeviceDocument::from).collect(),
            gps_data: buffer.position.as_ref().map(GpsDocument::from),
            lost: delivery.loss.lost,
            stats: &delivery.stats,
        }
    }
}

/// One JSON document per line, per buffer
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), ScanError> {
        let document = BufferDocument::new(&delivery);
        serde_json::to_writer(&mut self.writer, &document)
            .map_err(|e| ScanError::sink(format!("Failed to encode buffer: {}", e)))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| ScanError::sink(format!("Failed to write buffer: {}", e)))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, _stats: &ScanStats) -> Result<(), ScanError> {
        self.writer
            .flush()
            .map_err(|e| ScanError::sink(format!("Failed to flush output: {}", e)))
    }
}

// ============================================================================
// Queued sink
// ============================================================================

enum QueueMessage {
    Buffer(Box<Delivery>),
    Finish(ScanStats),
}

/// Hands buffers to a worker thread that owns the inner sink.
///
/// The channel is bounded: when the worker falls behind, `deliver` blocks and
/// backpressure reaches the scan loop. A worker failure surfaces on the next
/// `deliver` (as a closed channel) and in full from `finish`.
pub struct QueuedSink {
    sender: Option<SyncSender<QueueMessage>>,
    worker: Option<JoinHandle<Result<(), ScanError>>>,
}

impl QueuedSink {
    pub fn spawn<T>(inner: T, capacity: usize) -> Result<Self, String>
    where
        T: RecordSink + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let worker = std::thread::Builder::new()
            .name("bleuart-sink".to_string())
            .spawn(move || run_worker(inner, receiver))
            .map_err(|e| format!("Failed to start sink worker: {}", e))?;

        Ok(QueuedSink {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn join(&mut self) -> Result<(), ScanError> {
        // Dropping the sender lets the worker drain and exit
        self.sender = None;
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| ScanError::sink("Sink worker panicked"))?,
            None => Ok(()),
        }
    }
}

fn run_worker<T: RecordSink>(mut inner: T, receiver: Receiver<QueueMessage>) -> Result<(), ScanError> {
    let mut finished = false;
    for message in receiver {
        match message {
            QueueMessage::Buffer(delivery) => inner.deliver(*delivery)?,
            QueueMessage::Finish(stats) => {
                inner.finish(&stats)?;
                finished = true;
            }
        }
    }
    if !finished {
        inner.finish(&ScanStats::default())?;
    }
    Ok(())
}

impl RecordSink for QueuedSink {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), ScanError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ScanError::sink("Sink already finished"))?;
        if sender.send(QueueMessage::Buffer(Box::new(delivery))).is_err() {
            // Worker is gone; report its own error if it left one
            self.join()?;
            return Err(ScanError::sink("Sink worker stopped"));
        }
        Ok(())
    }

    fn finish(&mut self, stats: &ScanStats) -> Result<(), ScanError> {
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(QueueMessage::Finish(stats.clone()));
        }
        self.join()
    }
}

impl Drop for QueuedSink {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            tlog!("[sink] Worker ended with error: {}", e);
        }
    }
}

// ============================================================================
// Collecting sink
// ============================================================================

/// Keeps every delivery in memory
#[derive(Debug, Default)]
pub struct CollectSink {
    pub deliveries: Vec<Delivery>,
    /// Final stats, set by `finish`
    pub finished: Option<ScanStats>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.deliveries.iter().map(|d| &d.buffer)
    }
}

impl RecordSink for CollectSink {
    fn deliver(&mut self, delivery: Delivery) -> Result<(), ScanError> {
        self.deliveries.push(delivery);
        Ok(())
    }

    fn finish(&mut self, stats: &ScanStats) -> Result<(), ScanError> {
        self.finished = Some(stats.clone());
        Ok(())
    }
}
