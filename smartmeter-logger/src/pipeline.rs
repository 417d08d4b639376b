//! Dispatch pipeline
//!
//! Glue between the transport, the frame assembler, the extractor and the
//! sink queue. One pipeline runs on one thread and exclusively owns its
//! assembler buffer.
//!
//! ```text
//! Idle --attach--> Connected --close(reason)--> Closed
//! ```
//!
//! Extracted sets are handed to the sink workers through a bounded queue
//! with `try_send`: when the store falls behind, new measurements are dropped
//! and counted instead of stalling serial reads.

use crate::assembler::{AssemblerConfig, Feed, FrameAssembler};
use crate::error::{Error, Result};
use crate::extractor::{ExtractionRequest, MeasurementSet, extract};
use crate::sml::FrameDecoder;
use crate::transport::Transport;
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default size of a single transport read
pub const DEFAULT_READ_CHUNK_BYTES: usize = 512;

/// Lifecycle of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Connected,
    Closed,
}

/// Why a pipeline moved to [`PipelineState::Closed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport reached end of stream or failed
    Transport,
    /// Shutdown was requested
    Shutdown,
    /// Every sink worker has gone away
    SinkGone,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Transport => f.write_str("transport closed"),
            CloseReason::Shutdown => f.write_str("shutdown requested"),
            CloseReason::SinkGone => f.write_str("sink workers gone"),
        }
    }
}

/// A measurement set queued for the sink
#[derive(Debug, Clone)]
pub struct Submission {
    /// Wall clock when the frame became available, microseconds since epoch
    pub timestamp_us: u64,
    pub measurements: MeasurementSet,
}

/// What happened to one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Pipeline not connected, chunk not looked at
    Ignored,
    /// No complete frame yet
    Buffered,
    /// Frame extracted and queued for the sink
    Queued,
    /// Frame extracted but the queue was full
    Dropped,
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub bytes_read: u64,
    pub frames: u64,
    pub queued: u64,
    pub dropped: u64,
}

/// Wall clock in microseconds since the Unix epoch
pub fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Feeds transport chunks through assembly and extraction into the sink queue
pub struct DispatchPipeline<D: FrameDecoder> {
    assembler: FrameAssembler<D>,
    request: ExtractionRequest,
    queue: Option<Sender<Submission>>,
    state: PipelineState,
    close_reason: Option<CloseReason>,
    stats: PipelineStats,
    read_chunk_bytes: usize,
}

impl<D: FrameDecoder> DispatchPipeline<D> {
    pub fn new(
        decoder: D,
        assembler_config: AssemblerConfig,
        request: ExtractionRequest,
        queue: Sender<Submission>,
    ) -> Self {
        Self {
            assembler: FrameAssembler::with_config(decoder, assembler_config),
            request,
            queue: Some(queue),
            state: PipelineState::Idle,
            close_reason: None,
            stats: PipelineStats::default(),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }

    /// Set the size of a single transport read in [`run`](Self::run)
    pub fn with_read_chunk_bytes(mut self, bytes: usize) -> Self {
        self.read_chunk_bytes = bytes.max(1);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn assembler(&self) -> &FrameAssembler<D> {
        &self.assembler
    }

    pub fn request(&self) -> &ExtractionRequest {
        &self.request
    }

    /// Transport is open, start accepting chunks
    pub fn attach(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(Error::Other(format!(
                "cannot attach pipeline in state {:?}",
                self.state
            )));
        }
        self.state = PipelineState::Connected;
        debug!("Pipeline connected");
        Ok(())
    }

    /// Feed one chunk from the transport
    pub fn on_chunk(&mut self, chunk: &[u8]) -> Dispatch {
        if self.state != PipelineState::Connected {
            debug!(
                "Ignoring {} bytes, pipeline is {:?}",
                chunk.len(),
                self.state
            );
            return Dispatch::Ignored;
        }
        self.stats.bytes_read += chunk.len() as u64;

        let frame = match self.assembler.feed(chunk) {
            Feed::Frame(frame) => frame,
            Feed::Incomplete => {
                if log::log_enabled!(log::Level::Trace) {
                    trace!(
                        "Incomplete frame, {} bytes buffered:\n{}",
                        self.assembler.buffer_len(),
                        self.assembler.hex_dump()
                    );
                }
                return Dispatch::Buffered;
            }
        };

        let timestamp_us = now_us();
        self.stats.frames += 1;
        let measurements = extract(&frame, &self.request);
        drop(frame);
        debug!(
            "Frame {} assembled, {} of {} field(s) found",
            self.stats.frames,
            measurements.len(),
            self.request.len()
        );

        let Some(queue) = &self.queue else {
            return Dispatch::Ignored;
        };
        match queue.try_send(Submission {
            timestamp_us,
            measurements,
        }) {
            Ok(()) => {
                self.stats.queued += 1;
                Dispatch::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped += 1;
                warn!(
                    "Sink queue full, dropped measurement ({} dropped so far)",
                    self.stats.dropped
                );
                Dispatch::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped += 1;
                error!("Sink queue disconnected");
                self.close(CloseReason::SinkGone);
                Dispatch::Dropped
            }
        }
    }

    /// Stop accepting chunks and release the sink queue
    ///
    /// Dropping the sender lets the sink workers drain what is queued and
    /// exit. Closing twice keeps the first reason.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == PipelineState::Closed {
            return;
        }
        self.state = PipelineState::Closed;
        self.close_reason = Some(reason);
        self.queue = None;
        info!("Pipeline closed: {}", reason);
    }

    /// Read from `transport` until it fails, `running` clears or the sink goes away
    ///
    /// An idle pipeline is attached first. A pipeline that is already
    /// connected keeps going; a closed one returns its close reason at once.
    pub fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        running: &AtomicBool,
    ) -> CloseReason {
        if self.state == PipelineState::Idle {
            let _ = self.attach();
        }
        let mut buf = vec![0u8; self.read_chunk_bytes];

        while self.state == PipelineState::Connected {
            if !running.load(Ordering::Relaxed) {
                self.close(CloseReason::Shutdown);
                break;
            }

            match transport.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    self.on_chunk(&buf[..n]);
                }
                Err(Error::Disconnected) => {
                    info!("Transport disconnected");
                    self.close(CloseReason::Transport);
                }
                Err(e) => {
                    error!("Transport read error: {}", e);
                    self.close(CloseReason::Transport);
                }
            }
        }

        info!(
            "Pipeline stopped: {} bytes, {} frames, {} queued, {} dropped",
            self.stats.bytes_read, self.stats.frames, self.stats.queued, self.stats.dropped
        );
        self.close_reason.unwrap_or(CloseReason::Shutdown)
    }
}
