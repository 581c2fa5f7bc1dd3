// src/io/serial/sequence.rs
//
// Loss detection from the 8-bit message sequence counter.
//
// Any sequence other than last+1 (mod 256) is counted as forward loss by
// modular subtraction. A repeated or late sequence number therefore shows up
// as a large gap (a duplicate counts as 255 lost). Detection only, no recovery.

use serde::Serialize;

/// Outcome of observing one sequence number
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LossReport {
    pub sequence: u8,
    /// None on the first frame of a session
    pub expected: Option<u8>,
    /// Frames missing between the previous and this one
    pub lost: u8,
}

impl LossReport {
    pub fn is_first(&self) -> bool {
        self.expected.is_none()
    }

    pub fn has_gap(&self) -> bool {
        self.lost > 0
    }
}

/// Session-scoped sequence state and counters
#[derive(Clone, Debug, Default)]
pub struct SequenceTracker {
    last_sequence: Option<u8>,
    received_count: u64,
    lost_count: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sequence: u8) -> LossReport {
        let expected = self.last_sequence.map(|last| last.wrapping_add(1));
        let lost = match expected {
            Some(expected) => sequence.wrapping_sub(expected),
            None => 0,
        };

        self.last_sequence = Some(sequence);
        self.received_count += 1;
        self.lost_count += lost as u64;

        LossReport {
            sequence,
            expected,
            lost,
        }
    }

    pub fn last_sequence(&self) -> Option<u8> {
        self.last_sequence
    }

    pub fn received_count(&self) -> u64 {
        self.received_count
    }

    pub fn lost_count(&self) -> u64 {
        self.lost_count
    }

    /// Lost share of all expected frames, in percent
    pub fn loss_rate(&self) -> f64 {
        let total = self.received_count + self.lost_count;
        if total == 0 {
            0.0
        } else {
            self.lost_count as f64 / total as f64 * 100.0
        }
    }
}
