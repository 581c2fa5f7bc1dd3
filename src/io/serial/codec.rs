// src/io/serial/codec.rs
//
// Fixed-layout decoder for scanner messages.
//
// The decoder never scans: it reads exactly the number of bytes the wire
// format and the header's device count declare, and decodes them by offset.
// A magic-looking run inside a payload is therefore just payload.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::io::error::ScanError;
use crate::io::source::{read_exact, ByteSource};
use crate::io::types::{DeviceRecord, FrameHeader};

use super::wire::{WireFormat, ADV_DATA_CAPACITY, MAGIC};

/// Decoder for one wire layout
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    format: WireFormat,
    /// Upper bound on the header device count, if enforced
    max_devices: Option<u8>,
}

impl FrameDecoder {
    pub fn new(format: WireFormat) -> Self {
        FrameDecoder {
            format,
            max_devices: None,
        }
    }

    /// Reject headers that declare more records than this.
    /// A corrupted count would otherwise swallow many frames' worth of bytes.
    pub fn with_max_devices(mut self, max: u8) -> Self {
        self.max_devices = Some(max);
        self
    }

    pub fn format(&self) -> &WireFormat {
        &self.format
    }

    // ========================================================================
    // Stream reads
    // ========================================================================

    /// Read and decode the header fields that follow an already-consumed magic.
    pub fn read_header<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<FrameHeader, ScanError> {
        let mut body = vec![0u8; self.format.header_len() - MAGIC.len()];
        read_exact(source, &mut body)?;
        self.decode_header(&body)
    }

    /// Read and decode one device record.
    pub fn read_device<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<DeviceRecord, ScanError> {
        let mut raw = vec![0u8; self.format.record_len()];
        read_exact(source, &mut raw)?;
        self.decode_device(&raw)
    }

    /// Read exactly `count` records. Any failure discards everything read so far.
    pub fn read_devices<S: ByteSource + ?Sized>(
        &self,
        source: &mut S,
        count: u8,
    ) -> Result<Vec<DeviceRecord>, ScanError> {
        let mut devices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            devices.push(self.read_device(source)?);
        }
        Ok(devices)
    }

    // ========================================================================
    // Fixed-width decoding
    // ========================================================================

    /// Decode header fields from the bytes after the magic.
    pub fn decode_header(&self, body: &[u8]) -> Result<FrameHeader, ScanError> {
        let needed = self.format.header_len() - MAGIC.len();
        if body.len() < needed {
            return Err(ScanError::truncated(needed, body.len()));
        }

        let mut cursor = Cursor::new(body);
        let short = |_| ScanError::truncated(needed, body.len());

        let message_type = match self.format.message_type {
            Some(expected) => {
                let got = cursor.read_u8().map_err(short)?;
                if got != expected {
                    return Err(ScanError::UnknownMessageType { expected, got });
                }
                Some(got)
            }
            None => None,
        };

        let sequence = cursor.read_u8().map_err(short)?;

        let advertisement_count_raw = if self.format.adv_count_field {
            Some(cursor.read_u16::<LittleEndian>().map_err(short)?)
        } else {
            None
        };

        let device_count = if self.format.device_count_field {
            cursor.read_u8().map_err(short)?
        } else {
            1
        };

        if let Some(max) = self.max_devices {
            if device_count > max {
                return Err(ScanError::DeviceCountTooLarge {
                    count: device_count,
                    max,
                });
            }
        }

        let capture_time_ms = if self.format.header_timestamp {
            Some(cursor.read_u32::<LittleEndian>().map_err(short)?)
        } else {
            None
        };

        Ok(FrameHeader {
            magic: MAGIC,
            message_type,
            sequence,
            advertisement_count_raw,
            device_count,
            capture_time_ms,
        })
    }

    /// Decode one fixed-size device record.
    pub fn decode_device(&self, raw: &[u8]) -> Result<DeviceRecord, ScanError> {
        let needed = self.format.record_len();
        if raw.len() < needed {
            return Err(ScanError::truncated(needed, raw.len()));
        }

        let mut cursor = Cursor::new(raw);
        let short = |_| ScanError::truncated(needed, raw.len());

        let mut mac = [0u8; 6];
        cursor.read_exact(&mut mac).map_err(short)?;
        let addr_type = cursor.read_u8().map_err(short)?;
        let adv_type = cursor.read_u8().map_err(short)?;
        let rssi = decode_rssi(cursor.read_u8().map_err(short)?);
        let data_len = cursor.read_u8().map_err(short)?;
        let mut data = [0u8; ADV_DATA_CAPACITY];
        cursor.read_exact(&mut data).map_err(short)?;

        let n_adv = if self.format.n_adv_field {
            cursor.read_u8().map_err(short)?
        } else {
            1
        };

        let last_seen_ms = if self.format.device_timestamp {
            Some(cursor.read_u32::<LittleEndian>().map_err(short)?)
        } else {
            None
        };

        Ok(DeviceRecord {
            mac,
            mac_order: self.format.mac_order,
            addr_type,
            adv_type,
            rssi,
            data_len,
            data,
            n_adv,
            last_seen_ms,
        })
    }
}

/// RSSI byte to dBm: two's complement, so anything above 127 is `byte - 256`
pub fn decode_rssi(byte: u8) -> i8 {
    byte as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::wire::{MacOrder, MSG_TYPE_ADV};
    use crate::io::source::ReaderSource;

    /// Encode a device record the way the scanner firmware lays it out
    fn encode_device(format: &WireFormat, mac: [u8; 6], rssi: u8, payload: &[u8], n_adv: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(format.record_len());
        out.extend_from_slice(&mac);
        out.push(1); // random address
        out.push(0x03); // ADV_SCAN_IND
        out.push(rssi);
        out.push(payload.len() as u8);
        let mut data = [0xA5u8; ADV_DATA_CAPACITY];
        data[..payload.len()].copy_from_slice(payload);
        out.extend_from_slice(&data);
        if format.n_adv_field {
            out.push(n_adv);
        }
        if format.device_timestamp {
            out.extend_from_slice(&123_456u32.to_le_bytes());
        }
        out.extend(std::iter::repeat(0).take(format.record_padding));
        out
    }

    fn cursor_source(bytes: Vec<u8>) -> ReaderSource<Cursor<Vec<u8>>> {
        ReaderSource::new(Cursor::new(bytes), "test")
    }

    #[test]
    fn test_rssi_decoding() {
        assert_eq!(decode_rssi(0xFF), -1);
        assert_eq!(decode_rssi(0x00), 0);
        assert_eq!(decode_rssi(0x80), -128);
        assert_eq!(decode_rssi(0x7F), 127);
        assert_eq!(decode_rssi(0xF6), -10);
    }

    #[test]
    fn test_buffer_header_fields() {
        let decoder = FrameDecoder::new(WireFormat::buffer());
        // seq=10, n_adv_raw=0x0203 (LE), n_mac=2
        let header = decoder.decode_header(&[0x0A, 0x03, 0x02, 0x02]).unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.sequence, 10);
        assert_eq!(header.advertisement_count_raw, Some(0x0203));
        assert_eq!(header.device_count, 2);
        assert_eq!(header.message_type, None);
        assert_eq!(header.capture_time_ms, None);
    }

    #[test]
    fn test_timestamped_header_fields() {
        let decoder = FrameDecoder::new(WireFormat::buffer_timestamped());
        let mut body = vec![0xFF, 0x10, 0x00, 0x05];
        body.extend_from_slice(&5_000u32.to_le_bytes());
        let header = decoder.decode_header(&body).unwrap();
        assert_eq!(header.sequence, 255);
        assert_eq!(header.advertisement_count_raw, Some(16));
        assert_eq!(header.device_count, 5);
        assert_eq!(header.capture_time_ms, Some(5_000));
    }

    #[test]
    fn test_single_header_checks_type() {
        let decoder = FrameDecoder::new(WireFormat::single());
        let header = decoder.decode_header(&[MSG_TYPE_ADV, 42]).unwrap();
        assert_eq!(header.message_type, Some(MSG_TYPE_ADV));
        assert_eq!(header.sequence, 42);
        assert_eq!(header.device_count, 1);

        match decoder.decode_header(&[0x09, 42]) {
            Err(ScanError::UnknownMessageType { expected, got }) => {
                assert_eq!(expected, MSG_TYPE_ADV);
                assert_eq!(got, 0x09);
            }
            other => panic!("expected UnknownMessageType, got {:?}", other),
        }
    }

    #[test]
    fn test_device_count_limit() {
        let decoder = FrameDecoder::new(WireFormat::buffer()).with_max_devices(50);
        let err = decoder.decode_header(&[0x01, 0x00, 0x00, 51]).unwrap_err();
        assert!(matches!(err, ScanError::DeviceCountTooLarge { count: 51, max: 50 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_buffer_device_fields() {
        let format = WireFormat::buffer();
        let decoder = FrameDecoder::new(format.clone());
        let payload = [0x02, 0x01, 0x06, 0x03, 0xFF, 0x4C, 0x00];
        let raw = encode_device(&format, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], 0xC4, &payload, 7);

        let device = decoder.decode_device(&raw).unwrap();
        assert_eq!(device.mac, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(device.mac_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(device.addr_type, 1);
        assert_eq!(device.adv_type, 0x03);
        assert_eq!(device.rssi, -60);
        assert_eq!(device.data_len, payload.len() as u8);
        assert_eq!(device.payload(), &payload);
        assert_eq!(device.n_adv, 7);
        assert_eq!(device.last_seen_ms, None);
        // Padding is kept but not part of the payload view
        assert_eq!(device.data[payload.len()], 0xA5);
    }

    #[test]
    fn test_single_device_reversed_mac() {
        let format = WireFormat::single();
        let decoder = FrameDecoder::new(format.clone());
        let raw = encode_device(&format, [0x66, 0x55, 0x44, 0x33, 0x22, 0x11], 0xB0, &[0x01], 0);
        assert_eq!(raw.len(), 43);

        let device = decoder.decode_device(&raw).unwrap();
        assert_eq!(device.mac_string(), "11:22:33:44:55:66");
        assert_eq!(device.rssi, -80);
        assert_eq!(device.n_adv, 1);

        let stream_order = FrameDecoder::new(format.with_mac_order(MacOrder::Stream));
        let device = stream_order.decode_device(&raw).unwrap();
        assert_eq!(device.mac_string(), "66:55:44:33:22:11");
    }

    #[test]
    fn test_timestamped_device_trailer() {
        let format = WireFormat::buffer_timestamped();
        let decoder = FrameDecoder::new(format.clone());
        let raw = encode_device(&format, [1, 2, 3, 4, 5, 6], 0x05, &[], 2);
        assert_eq!(raw.len(), 46);

        let device = decoder.decode_device(&raw).unwrap();
        assert_eq!(device.rssi, 5);
        assert_eq!(device.data_len, 0);
        assert!(device.payload().is_empty());
        assert_eq!(device.n_adv, 2);
        assert_eq!(device.last_seen_ms, Some(123_456));
    }

    #[test]
    fn test_read_device_short_read_is_truncated() {
        let format = WireFormat::buffer();
        let decoder = FrameDecoder::new(format.clone());
        let mut raw = encode_device(&format, [0; 6], 0x00, &[], 1);
        raw.truncate(30);

        let mut src = cursor_source(raw);
        match decoder.read_device(&mut src) {
            Err(ScanError::TruncatedRead { needed, got }) => {
                assert_eq!(needed, 42);
                assert_eq!(got, 30);
            }
            other => panic!("expected TruncatedRead, got {:?}", other),
        }
    }

    #[test]
    fn test_read_header_short_read_is_truncated() {
        let decoder = FrameDecoder::new(WireFormat::buffer());
        let mut src = cursor_source(vec![0x01, 0x00]);
        let err = decoder.read_header(&mut src).unwrap_err();
        assert!(matches!(err, ScanError::TruncatedRead { needed: 4, got: 2 }));
    }

    #[test]
    fn test_read_devices_respects_declared_count() {
        let format = WireFormat::buffer();
        let decoder = FrameDecoder::new(format.clone());
        let mut bytes = encode_device(&format, [1; 6], 0xF0, &[0x55, 0x55, 0x55, 0x55], 1);
        bytes.extend(encode_device(&format, [2; 6], 0xF1, &[], 1));
        bytes.extend_from_slice(&[0xDE, 0xAD]);

        let mut src = cursor_source(bytes);
        let devices = decoder.read_devices(&mut src, 2).unwrap();
        assert_eq!(devices.len(), 2);
        // Magic bytes inside the payload are just data
        assert_eq!(devices[0].payload(), &[0x55, 0x55, 0x55, 0x55]);
        assert_eq!(devices[1].mac, [2; 6]);

        // Trailing bytes are left untouched for the synchronizer
        let mut rest = [0u8; 2];
        read_exact(&mut src, &mut rest).unwrap();
        assert_eq!(rest, [0xDE, 0xAD]);
    }
}
