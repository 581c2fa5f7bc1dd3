// src/io/source.rs
//
// Byte source abstraction for the scan loop.
// A source hands out whatever bytes are available; an empty read means the
// read timeout elapsed with nothing on the wire.

use std::io::{ErrorKind, Read};

use super::error::ScanError;

// ============================================================================
// Trait
// ============================================================================

/// Forward-only supplier of raw bytes.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means nothing arrived before the read timeout. Transport
    /// failures are returned as errors and end the session.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ScanError>;

    /// True once a finite source (file, capture, test cursor) has been drained.
    /// Live ports never report exhaustion; they just time out.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Short label used in log lines
    fn name(&self) -> &str;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ScanError> {
        (**self).read(buf)
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Fill `buf` completely.
///
/// Fails with `TruncatedRead` as soon as the source comes back empty, so a
/// stalled frame is never padded with made-up bytes.
pub fn read_exact<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> Result<(), ScanError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(ScanError::truncated(buf.len(), filled));
        }
        filled += n;
    }
    Ok(())
}

// ============================================================================
// Reader-backed source
// ============================================================================

/// Adapts any `Read` (capture file, in-memory cursor, pipe) into a `ByteSource`.
pub struct ReaderSource<R> {
    reader: R,
    name: String,
    exhausted: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            exhausted: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ScanError> {
        if self.exhausted || buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.reader.read(buf) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(0)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn name(&self) -> &str {
        &self.name
    }
}
