// src/io/error.rs
//
// Error taxonomy for the scan pipeline.
//
// Content-level errors (short reads, unexpected header values) are recoverable:
// the scan loop abandons the current frame and goes back to hunting for the
// magic pattern. Transport-level errors end the session.

use thiserror::Error;

/// Errors raised while reading and decoding the UART stream.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The source returned fewer bytes than the frame requires (timeout or underrun).
    #[error("truncated read: need {needed} bytes, got {got}")]
    TruncatedRead { needed: usize, got: usize },

    /// Single-advertisement header carried a type byte other than the expected one.
    #[error("unknown message type 0x{got:02X} (expected 0x{expected:02X})")]
    UnknownMessageType { expected: u8, got: u8 },

    /// Header declared more device records than the scanner can ever send.
    #[error("device count {count} exceeds limit of {max}")]
    DeviceCountTooLarge { count: u8, max: u8 },

    /// The byte source is gone for good.
    #[error("byte source closed")]
    SourceClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A record sink refused a buffer or failed to flush.
    #[error("sink error: {0}")]
    Sink(String),
}

impl ScanError {
    pub fn truncated(needed: usize, got: usize) -> Self {
        ScanError::TruncatedRead { needed, got }
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        ScanError::Sink(msg.into())
    }

    /// Whether the scan loop should resynchronize and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::TruncatedRead { .. }
                | ScanError::UnknownMessageType { .. }
                | ScanError::DeviceCountTooLarge { .. }
        )
    }
}
