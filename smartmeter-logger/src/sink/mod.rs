//! Measurement sink
//!
//! Turns extracted measurement sets into store points and writes them from
//! dedicated worker threads, so a slow or failing store never blocks serial
//! ingestion.

pub mod influx;
pub mod line_protocol;

pub use influx::InfluxWriter;

use crate::error::{Error, Result};
use crate::extractor::MeasurementSet;
use crate::pipeline::Submission;
use crate::sml::FieldValue;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// One timestamped store record
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub fields: Vec<(String, FieldValue)>,
    /// Microseconds since the Unix epoch
    pub timestamp_us: u64,
}

/// Store client accepting one point per call
pub trait PointWriter: Send + Sync {
    fn write(&self, point: &Point) -> Result<()>;
}

impl<W: PointWriter + ?Sized> PointWriter for Arc<W> {
    fn write(&self, point: &Point) -> Result<()> {
        (**self).write(point)
    }
}

/// Store client that needs exclusive access per write
pub trait PointWriterMut: Send {
    fn write(&mut self, point: &Point) -> Result<()>;
}

/// Shares a [`PointWriterMut`] across sink workers, one write at a time
pub struct SerializedWriter<W> {
    inner: Mutex<W>,
}

impl<W: PointWriterMut> SerializedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Run `f` with the wrapped writer locked
    pub fn with<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl<W: PointWriterMut> PointWriter for SerializedWriter<W> {
    fn write(&self, point: &Point) -> Result<()> {
        self.inner.lock().write(point)
    }
}

/// Result of one submission
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Empty measurement set, nothing written
    Skipped,
    Written,
    Failed(Error),
}

/// Converts measurement sets to points and hands them to the writer
pub struct SinkAdapter<W: PointWriter> {
    writer: W,
    measurement: String,
}

impl<W: PointWriter> SinkAdapter<W> {
    pub fn new(writer: W, measurement: impl Into<String>) -> Self {
        Self {
            writer,
            measurement: measurement.into(),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Point for a measurement set, `None` if the set is empty
    pub fn point(&self, timestamp_us: u64, set: &MeasurementSet) -> Option<Point> {
        if set.is_empty() {
            return None;
        }
        Some(Point {
            measurement: self.measurement.clone(),
            fields: set
                .iter()
                .map(|(d, v)| (d.display_name.to_string(), v.clone()))
                .collect(),
            timestamp_us,
        })
    }

    /// Write one measurement set
    pub fn submit(&self, timestamp_us: u64, set: &MeasurementSet) -> SubmitOutcome {
        let Some(point) = self.point(timestamp_us, set) else {
            return SubmitOutcome::Skipped;
        };
        match self.writer.write(&point) {
            Ok(()) => SubmitOutcome::Written,
            Err(e) => SubmitOutcome::Failed(e),
        }
    }
}

/// Counters shared by the sink workers
#[derive(Debug, Default)]
struct SinkCounters {
    written: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl SinkCounters {
    fn snapshot(&self) -> SinkStats {
        SinkStats {
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Totals reported when the workers stop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Worker threads draining the submission queue
pub struct SinkWorkers {
    handles: Vec<JoinHandle<()>>,
    counters: Arc<SinkCounters>,
}

impl SinkWorkers {
    /// Spawn `count` workers (at least one)
    ///
    /// Workers run until the queue is disconnected and empty, so every
    /// submission queued before the pipeline closes is still written.
    pub fn spawn<W>(
        count: usize,
        queue: Receiver<Submission>,
        adapter: Arc<SinkAdapter<W>>,
    ) -> Result<Self>
    where
        W: PointWriter + 'static,
    {
        let counters = Arc::new(SinkCounters::default());
        let mut handles = Vec::new();

        for id in 0..count.max(1) {
            let queue = queue.clone();
            let adapter = Arc::clone(&adapter);
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("sink-{}", id))
                .spawn(move || Self::worker_loop(id, queue, adapter, counters))?;
            handles.push(handle);
        }

        info!("Started {} sink worker(s)", handles.len());
        Ok(Self { handles, counters })
    }

    fn worker_loop<W: PointWriter>(
        id: usize,
        queue: Receiver<Submission>,
        adapter: Arc<SinkAdapter<W>>,
        counters: Arc<SinkCounters>,
    ) {
        debug!("Sink worker {} started", id);

        // recv() fails only once every sender is gone and the queue is empty
        while let Ok(submission) = queue.recv() {
            match adapter.submit(submission.timestamp_us, &submission.measurements) {
                SubmitOutcome::Written => {
                    counters.written.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "Wrote {} field(s) at {}",
                        submission.measurements.len(),
                        submission.timestamp_us
                    );
                }
                SubmitOutcome::Skipped => {
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!("No requested fields in frame, nothing written");
                }
                SubmitOutcome::Failed(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Dropping measurement at {}: {}", submission.timestamp_us, e);
                }
            }
        }

        debug!("Sink worker {} exiting", id);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn stats(&self) -> SinkStats {
        self.counters.snapshot()
    }

    /// Wait for the workers to drain the queue and exit
    ///
    /// Only returns once every sender of the queue has been dropped.
    pub fn join(self) -> SinkStats {
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("Sink worker panicked");
            }
        }
        self.counters.snapshot()
    }
}
