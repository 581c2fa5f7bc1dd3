// tests/scan_pipeline.rs
//
// End-to-end: raw bytes in, decoded buffers out.

use std::io::Cursor;

use bleuart_lib::io::serial::wire::{MacOrder, MAGIC};
use bleuart_lib::{
    CollectSink, FrameDecoder, JsonLinesSink, ReaderSource, ScanSession, StopReason, WireFormat,
};

/// Builds scanner messages byte for byte
struct FrameBuilder {
    format: WireFormat,
    bytes: Vec<u8>,
}

impl FrameBuilder {
    fn new(format: WireFormat) -> Self {
        FrameBuilder {
            format,
            bytes: Vec::new(),
        }
    }

    fn garbage(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Append a buffer message. Each device is (mac, rssi byte, payload).
    fn buffer(mut self, sequence: u8, devices: &[([u8; 6], u8, &[u8])]) -> Self {
        self.bytes.extend_from_slice(&MAGIC);
        if let Some(kind) = self.format.message_type {
            self.bytes.push(kind);
        }
        self.bytes.push(sequence);
        if self.format.adv_count_field {
            self.bytes.extend_from_slice(&(devices.len() as u16 * 3).to_le_bytes());
        }
        if self.format.device_count_field {
            self.bytes.push(devices.len() as u8);
        }
        if self.format.header_timestamp {
            self.bytes.extend_from_slice(&60_000u32.to_le_bytes());
        }
        for (mac, rssi, payload) in devices {
            self.bytes.extend_from_slice(mac);
            self.bytes.push(0x01); // random
            self.bytes.push(0x00); // ADV_IND
            self.bytes.push(*rssi);
            self.bytes.push(payload.len() as u8);
            let mut data = [0u8; 31];
            data[..payload.len()].copy_from_slice(payload);
            self.bytes.extend_from_slice(&data);
            if self.format.n_adv_field {
                self.bytes.push(3);
            }
            if self.format.device_timestamp {
                self.bytes.extend_from_slice(&59_500u32.to_le_bytes());
            }
            self.bytes
                .extend(std::iter::repeat(0).take(self.format.record_padding));
        }
        self
    }

    fn truncate_last(mut self, n: usize) -> Self {
        let len = self.bytes.len().saturating_sub(n);
        self.bytes.truncate(len);
        self
    }

    fn session(self) -> ScanSession<ReaderSource<Cursor<Vec<u8>>>> {
        let source = ReaderSource::new(Cursor::new(self.bytes), "capture");
        ScanSession::new(source, FrameDecoder::new(self.format).with_max_devices(50))
    }
}

const FLAGS: &[u8] = &[0x02, 0x01, 0x06];
const EMPTY: &[u8] = &[];

#[test]
fn test_two_device_buffer_end_to_end() {
    let mut session = FrameBuilder::new(WireFormat::buffer())
        .buffer(
            10,
            &[
                ([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], 0xF6, FLAGS),
                ([0x11, 0x22, 0x33, 0x44, 0x55, 0x66], 0x05, EMPTY),
            ],
        )
        .session();

    let mut sink = CollectSink::new();
    let summary = session.run(&mut sink).unwrap();

    assert_eq!(summary.reason, StopReason::SourceExhausted);
    assert_eq!(sink.deliveries.len(), 1);

    let delivery = &sink.deliveries[0];
    assert_eq!(delivery.loss.lost, 0);
    assert!(delivery.loss.is_first());

    let buffer = &delivery.buffer;
    assert_eq!(buffer.header.sequence, 10);
    assert_eq!(buffer.header.device_count, 2);
    assert_eq!(buffer.header.advertisement_count_raw, Some(6));
    assert_eq!(buffer.devices[0].mac_string(), "AA:BB:CC:DD:EE:FF");
    assert_eq!(buffer.devices[0].rssi, -10);
    assert_eq!(buffer.devices[0].payload(), FLAGS);
    assert_eq!(buffer.devices[1].mac_string(), "11:22:33:44:55:66");
    assert_eq!(buffer.devices[1].rssi, 5);
    assert_eq!(buffer.devices[1].n_adv, 3);
}

#[test]
fn test_truncated_buffer_is_discarded() {
    let mut session = FrameBuilder::new(WireFormat::buffer())
        .buffer(1, &[([1; 6], 0xC0, FLAGS)])
        .buffer(2, &[([2; 6], 0xC0, FLAGS), ([3; 6], 0xC0, FLAGS)])
        .truncate_last(20)
        .session();

    let mut sink = CollectSink::new();
    let summary = session.run(&mut sink).unwrap();

    assert_eq!(summary.buffers, 1);
    assert_eq!(summary.stats.truncated, 1);
    assert_eq!(sink.deliveries[0].buffer.header.sequence, 1);
}

#[test]
fn test_resync_after_line_noise() {
    let mut session = FrameBuilder::new(WireFormat::buffer())
        .garbage(&[0x01, 0x55, 0x55, 0x00])
        .buffer(254, &[([4; 6], 0xB0, FLAGS)])
        .garbage(&[0x55, 0x55, 0x55, 0x10, 0x20])
        .buffer(255, &[([5; 6], 0xB0, FLAGS)])
        .buffer(0, &[([6; 6], 0xB0, FLAGS)])
        .buffer(4, &[([7; 6], 0xB0, FLAGS)])
        .session();

    let mut sink = CollectSink::new();
    let summary = session.run(&mut sink).unwrap();

    let seqs: Vec<u8> = sink.buffers().map(|b| b.header.sequence).collect();
    assert_eq!(seqs, vec![254, 255, 0, 4]);
    // Wrap is not loss, 0 -> 4 is three missing buffers
    assert_eq!(summary.stats.lost, 3);
    assert_eq!(summary.stats.received, 4);
    assert_eq!(summary.stats.skipped_bytes, 9);
    assert!((summary.stats.loss_rate - 300.0 / 7.0).abs() < 1e-9);
}

#[test]
fn test_single_advertisement_stream() {
    let mut session = FrameBuilder::new(WireFormat::single())
        .buffer(7, &[([0x66, 0x55, 0x44, 0x33, 0x22, 0x11], 0xC4, FLAGS)])
        .buffer(8, &[([0x01, 0x02, 0x03, 0x04, 0x05, 0x06], 0xFF, EMPTY)])
        .session();

    let mut sink = CollectSink::new();
    session.run(&mut sink).unwrap();

    assert_eq!(sink.deliveries.len(), 2);
    let first = &sink.deliveries[0].buffer.devices[0];
    assert_eq!(first.mac_order, MacOrder::Reversed);
    assert_eq!(first.mac_string(), "11:22:33:44:55:66");
    assert_eq!(first.rssi, -60);
    assert_eq!(sink.deliveries[1].buffer.devices[0].rssi, -1);
}

#[test]
fn test_timestamped_stream_to_json_lines() {
    let mut session = FrameBuilder::new(WireFormat::buffer_timestamped())
        .buffer(1, &[([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01], 0xD0, FLAGS)])
        .buffer(2, &[])
        .session();

    let mut sink = JsonLinesSink::new(Vec::new());
    let summary = session.run(&mut sink).unwrap();
    assert_eq!(summary.buffers, 2);

    let text = String::from_utf8(sink.into_inner()).unwrap();
    let docs: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["capture_time_ms"], 60_000);
    assert_eq!(docs[0]["devices"][0]["mac"], "C0:FF:EE:00:00:01");
    assert_eq!(docs[0]["devices"][0]["last_seen_ms"], 59_500);
    assert_eq!(docs[0]["devices"][0]["data"], "020106");
    // An empty buffer is still a buffer
    assert_eq!(docs[1]["n_mac"], 0);
    assert_eq!(docs[1]["devices"].as_array().map(|d| d.len()), Some(0));
}
