// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingest loop.
//!
//! Reads relay lines, decodes ARIA frames and hands them to a
//! [`FramePublisher`]. Malformed lines and publish failures are logged
//! and counted; only a hard read error ends the loop.
//!
//! ```text
//! BufRead --line--> decode_line --bytes--> SensorFrame::decode --> FramePublisher
//! ```

use crate::config::{ChannelId, ConfigError};
use crate::frame::{FrameError, SensorFrame};
use crate::http::TransportError;
use crate::line::{decode_line, LINE_LENGTH};
use crate::token::AuthError;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP client setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Destination for decoded frames.
pub trait FramePublisher {
    type Error: std::error::Error;

    fn publish_frame(&mut self, channel: &ChannelId, frame: &SensorFrame)
        -> Result<(), Self::Error>;
}

/// Bridge counters.
#[derive(Debug)]
pub struct BridgeStats {
    /// Non-empty lines read from the relay.
    pub lines_read: AtomicU64,
    /// Lines that decoded into a frame.
    pub frames_decoded: AtomicU64,
    /// Lines dropped as malformed.
    pub frames_skipped: AtomicU64,
    /// Frames accepted by the publisher.
    pub frames_published: AtomicU64,
    /// Frames the publisher failed to deliver.
    pub publish_failures: AtomicU64,
    /// Bridge creation time.
    pub created: Instant,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs_f64(),
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeStatsSnapshot {
    pub lines_read: u64,
    pub frames_decoded: u64,
    pub frames_skipped: u64,
    pub frames_published: u64,
    pub publish_failures: u64,
    pub uptime_secs: f64,
}

/// Handle to stop a running bridge from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request the bridge to stop after the current line.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Serial-to-cloud ingest loop.
pub struct Bridge<R, P> {
    reader: R,
    publisher: P,
    channel: ChannelId,
    running: Arc<AtomicBool>,
    stats: Arc<BridgeStats>,
}

impl<R: BufRead, P: FramePublisher> Bridge<R, P> {
    pub fn new(reader: R, publisher: P, channel: ChannelId) -> Self {
        Self {
            reader,
            publisher,
            channel,
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(BridgeStats::new()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run until end of input or a stop request (blocking).
    ///
    /// Read timeouts are retried without losing a partially received line.
    pub fn run(&mut self) -> Result<BridgeStatsSnapshot, BridgeError> {
        tracing::info!(channel = %self.channel, "Starting bridge");

        let mut line = Vec::with_capacity(LINE_LENGTH + 2);
        while self.running.load(Ordering::SeqCst) {
            match self.reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    if !line.is_empty() {
                        self.process_line(&line);
                    }
                    tracing::info!("Relay input closed");
                    break;
                }
                Ok(_) => {
                    // No newline means EOF was hit mid-line; the next read returns 0.
                    if line.ends_with(b"\n") {
                        self.process_line(&line);
                        line.clear();
                    }
                }
                Err(e) if is_retryable(&e) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Relay read failed");
                    return Err(BridgeError::Io(e));
                }
            }
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            lines_read = stats.lines_read,
            frames_published = stats.frames_published,
            frames_skipped = stats.frames_skipped,
            publish_failures = stats.publish_failures,
            "Bridge stopped"
        );
        Ok(stats)
    }

    fn process_line(&mut self, raw: &[u8]) {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return;
        }
        self.stats.lines_read.fetch_add(1, Ordering::Relaxed);

        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.frames_skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, len = raw.len(), "Skipping relay line");
                return;
            }
        };
        self.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            sender = %frame.sender_serial_id,
            seq = frame.sequence_number,
            magnetism = frame.magnetism_state.as_str(),
            temperature = frame.temperature_celsius,
            humidity = frame.humidity_percent,
            "Decoded frame"
        );

        match self.publisher.publish_frame(&self.channel, &frame) {
            Ok(()) => {
                self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    sender = %frame.sender_serial_id,
                    seq = frame.sequence_number,
                    "Publish failed"
                );
            }
        }
    }
}

/// Frame one relay line and decode it.
pub fn decode_frame(line: &[u8]) -> Result<SensorFrame, FrameError> {
    let bytes = decode_line(line)?;
    SensorFrame::decode(&bytes)
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
