// src/io/serial/reader.rs
//
// Scan session: drives a byte source through sync, header, device records and
// delivery, one buffer at a time.
//
// The loop is blocking and owns its source. Content errors (short reads,
// implausible headers) drop the current frame and go back to hunting for the
// magic; transport errors end the session. Cancellation and the duration
// bound are only checked between frames.

use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crate::io::error::ScanError;
use crate::io::source::ByteSource;
use crate::io::types::{Buffer, DeviceRecord, FrameHeader, ScanStats};
use crate::position::PositionCell;
use crate::sink::{Delivery, RecordSink};

use super::codec::FrameDecoder;
use super::sequence::SequenceTracker;
use super::sync::FrameSynchronizer;

/// Buffers between periodic statistics lines
pub const DEFAULT_STATS_INTERVAL: u64 = 100;

// ============================================================================
// Configuration and results
// ============================================================================

#[derive(Clone, Debug)]
pub struct ScanConfig {
    /// Stop once this much time has passed since `run` started
    pub duration: Option<Duration>,
    /// Log statistics every N delivered buffers (0 disables)
    pub stats_interval: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            duration: None,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

/// Why a session ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    DurationElapsed,
    SourceExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Cancelled => "cancelled",
            StopReason::DurationElapsed => "duration elapsed",
            StopReason::SourceExhausted => "source exhausted",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug)]
pub struct ScanSummary {
    pub reason: StopReason,
    pub stats: ScanStats,
    /// Buffers handed to the sink
    pub buffers: u64,
    pub elapsed: Duration,
}

/// Receiver state between steps
#[derive(Debug)]
pub enum ScanState {
    SeekingSync,
    ReadingHeader,
    ReadingDevices(FrameHeader),
    Delivering(FrameHeader, Vec<DeviceRecord>),
    Stopped(StopReason),
}

// ============================================================================
// Session
// ============================================================================

pub struct ScanSession<S: ByteSource> {
    source: S,
    synchronizer: FrameSynchronizer,
    decoder: FrameDecoder,
    tracker: SequenceTracker,
    position: Option<PositionCell>,
    cancel_flag: Arc<AtomicBool>,
    config: ScanConfig,
    truncated: u64,
    rejected: u64,
    delivered: u64,
    started: Instant,
}

impl<S: ByteSource> ScanSession<S> {
    pub fn new(source: S, decoder: FrameDecoder) -> Self {
        ScanSession {
            source,
            synchronizer: FrameSynchronizer::new(),
            decoder,
            tracker: SequenceTracker::new(),
            position: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            config: ScanConfig::default(),
            truncated: 0,
            rejected: 0,
            delivered: 0,
            started: Instant::now(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the latest-position slot merged into every delivered buffer
    pub fn with_position(mut self, position: PositionCell) -> Self {
        self.position = Some(position);
        self
    }

    /// Share an existing cancel flag (e.g. one set from a signal handler)
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = flag;
        self
    }

    /// Flag that stops the session at the next frame boundary when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Cumulative counters so far
    pub fn stats(&self) -> ScanStats {
        ScanStats {
            received: self.tracker.received_count(),
            lost: self.tracker.lost_count(),
            loss_rate: self.tracker.loss_rate(),
            truncated: self.truncated,
            rejected: self.rejected,
            skipped_bytes: self.synchronizer.skipped(),
        }
    }

    /// Run until stopped. The sink's `finish` is called on every exit path.
    pub fn run(&mut self, sink: &mut dyn RecordSink) -> Result<ScanSummary, ScanError> {
        self.started = Instant::now();
        tlog!(
            "[scan:{}] Starting ({} byte header, {} byte records{})",
            self.source.name(),
            self.decoder.format().header_len(),
            self.decoder.format().record_len(),
            self.config
                .duration
                .map(|d| format!(", {}s limit", d.as_secs()))
                .unwrap_or_default()
        );

        let mut state = ScanState::SeekingSync;
        let outcome = loop {
            match state {
                ScanState::Stopped(reason) => break Ok(reason),
                current => match self.step(current, sink) {
                    Ok(next) => state = next,
                    Err(e) => break Err(e),
                },
            }
        };

        let stats = self.stats();
        let finished = sink.finish(&stats);

        match outcome {
            Ok(reason) => {
                finished?;
                let summary = ScanSummary {
                    reason,
                    stats,
                    buffers: self.delivered,
                    elapsed: self.started.elapsed(),
                };
                self.log_summary(&summary.reason.to_string(), &summary.stats);
                Ok(summary)
            }
            Err(e) => {
                if let Err(finish_err) = finished {
                    tlog!("[scan:{}] Sink finish failed: {}", self.source.name(), finish_err);
                }
                self.log_summary(&format!("error: {}", e), &stats);
                Err(e)
            }
        }
    }

    /// Advance one state. Recoverable decode errors are absorbed here and
    /// turn into a resync; anything returned as `Err` is fatal.
    pub fn step(&mut self, state: ScanState, sink: &mut dyn RecordSink) -> Result<ScanState, ScanError> {
        match state {
            ScanState::SeekingSync => {
                if let Some(reason) = self.stop_requested() {
                    return Ok(ScanState::Stopped(reason));
                }
                if self.synchronizer.find_header(&mut self.source)? {
                    Ok(ScanState::ReadingHeader)
                } else if self.source.is_exhausted() {
                    Ok(ScanState::Stopped(StopReason::SourceExhausted))
                } else {
                    // Idle line, keep waiting
                    Ok(ScanState::SeekingSync)
                }
            }

            ScanState::ReadingHeader => match self.decoder.read_header(&mut self.source) {
                Ok(header) => Ok(ScanState::ReadingDevices(header)),
                Err(e) => self.abandon_frame(e),
            },

            ScanState::ReadingDevices(header) => {
                match self.decoder.read_devices(&mut self.source, header.device_count) {
                    Ok(devices) => Ok(ScanState::Delivering(header, devices)),
                    Err(e) => self.abandon_frame(e),
                }
            }

            ScanState::Delivering(header, devices) => {
                self.deliver(header, devices, sink)?;
                Ok(match self.stop_requested() {
                    Some(reason) => ScanState::Stopped(reason),
                    None => ScanState::SeekingSync,
                })
            }

            ScanState::Stopped(reason) => Ok(ScanState::Stopped(reason)),
        }
    }

    fn deliver(
        &mut self,
        header: FrameHeader,
        devices: Vec<DeviceRecord>,
        sink: &mut dyn RecordSink,
    ) -> Result<(), ScanError> {
        let loss = self.tracker.observe(header.sequence);
        if loss.has_gap() {
            tlog!(
                "[scan:{}] Sequence gap: expected {}, got {} ({} lost)",
                self.source.name(),
                loss.expected.unwrap_or_default(),
                loss.sequence,
                loss.lost
            );
        }

        let buffer = Buffer {
            timestamp: Local::now(),
            header,
            devices,
            position: self.position.as_ref().and_then(|cell| cell.latest()),
        };
        let stats = self.stats();
        sink.deliver(Delivery {
            buffer,
            loss,
            stats: stats.clone(),
        })?;
        self.delivered += 1;

        if self.config.stats_interval > 0 && self.delivered % self.config.stats_interval == 0 {
            tlog!(
                "[scan:{}] {} buffers: {} received, {} lost ({:.2}%), {} truncated, {} rejected",
                self.source.name(),
                self.delivered,
                stats.received,
                stats.lost,
                stats.loss_rate,
                stats.truncated,
                stats.rejected
            );
        }
        Ok(())
    }

    /// Drop the frame in progress and resync, or pass a fatal error up
    fn abandon_frame(&mut self, err: ScanError) -> Result<ScanState, ScanError> {
        if !err.is_recoverable() {
            return Err(err);
        }
        match err {
            ScanError::TruncatedRead { .. } => self.truncated += 1,
            _ => self.rejected += 1,
        }
        tlog!("[scan:{}] Dropping frame: {}", self.source.name(), err);
        Ok(ScanState::SeekingSync)
    }

    fn stop_requested(&self) -> Option<StopReason> {
        if self.cancel_flag.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        match self.config.duration {
            Some(limit) if self.started.elapsed() >= limit => Some(StopReason::DurationElapsed),
            _ => None,
        }
    }

    fn log_summary(&self, outcome: &str, stats: &ScanStats) {
        tlog!(
            "[scan:{}] Stopped ({}) after {:.1}s: {} buffers, {} received, {} lost ({:.2}%), {} truncated, {} rejected, {} bytes skipped",
            self.source.name(),
            outcome,
            self.started.elapsed().as_secs_f64(),
            self.delivered,
            stats.received,
            stats.lost,
            stats.loss_rate,
            stats.truncated,
            stats.rejected,
            stats.skipped_bytes
        );
    }
}
