// src/io/serial/sync.rs
//
// Sync-pattern hunter for the unframed UART stream.
//
// Bytes are pushed through a 4-byte rolling window. The window only slides by
// one byte per step, so a run like 55 55 55 55 55 01 still locks onto the
// last four 0x55 bytes rather than skipping past them.

use crate::io::error::ScanError;
use crate::io::source::ByteSource;

use super::wire::MAGIC;

const WINDOW: usize = MAGIC.len();

pub struct FrameSynchronizer {
    window: [u8; WINDOW],
    filled: usize,
    skipped: u64,
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        FrameSynchronizer {
            window: [0; WINDOW],
            filled: 0,
            skipped: 0,
        }
    }

    /// Push one byte. Returns true when the last four bytes are the sync pattern.
    ///
    /// On a match the window is emptied, so the next call starts a fresh hunt.
    pub fn feed(&mut self, byte: u8) -> bool {
        if self.filled == WINDOW {
            self.window.rotate_left(1);
            self.window[WINDOW - 1] = byte;
            self.skipped += 1;
        } else {
            self.window[self.filled] = byte;
            self.filled += 1;
        }

        if self.filled == WINDOW && self.window == MAGIC {
            self.filled = 0;
            return true;
        }
        false
    }

    /// Consume bytes from `source` until the sync pattern has just been read.
    ///
    /// Returns `Ok(false)` when the source comes back empty (timeout or end of
    /// stream). Any partial match is discarded at that point; consumed bytes
    /// are never replayed.
    pub fn find_header<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<bool, ScanError> {
        let mut byte = [0u8; 1];
        loop {
            if source.read(&mut byte)? == 0 {
                self.skipped += self.filled as u64;
                self.filled = 0;
                return Ok(false);
            }
            if self.feed(byte[0]) {
                return Ok(true);
            }
        }
    }

    /// Bytes thrown away while hunting, over the synchronizer's lifetime
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
