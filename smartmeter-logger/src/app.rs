//! Application orchestration
//!
//! Opens the meter's serial port, starts the sink workers, runs the dispatch
//! pipeline on a named thread and shuts everything down on SIGINT/SIGTERM or
//! when the port goes away.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::ExtractionRequest;
use crate::pipeline::{CloseReason, DispatchPipeline, PipelineStats, Submission};
use crate::sink::{InfluxWriter, PointWriter, SinkAdapter, SinkStats, SinkWorkers};
use crate::sml::SmlDecoder;
use crate::transport::{SerialTransport, Transport};
use log::{debug, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: CloseReason,
    pub pipeline: PipelineStats,
    pub sink: SinkStats,
}

/// Run the pipeline over `transport` until it closes, then drain the sink
///
/// Spawns the sink workers, runs the pipeline on a `dispatch` thread and
/// joins everything. Measurements queued before the pipeline closes are
/// still written.
pub fn run_pipeline<T, W>(
    mut transport: T,
    writer: W,
    config: &Config,
    request: ExtractionRequest,
    running: Arc<AtomicBool>,
) -> Result<RunSummary>
where
    T: Transport + 'static,
    W: PointWriter + 'static,
{
    let capacity = config.pipeline.queue_capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded::<Submission>(capacity);

    let adapter = Arc::new(SinkAdapter::new(writer, config.influx.measurement.clone()));
    let workers = SinkWorkers::spawn(config.pipeline.sink_workers, rx, adapter)?;

    let mut pipeline = DispatchPipeline::new(SmlDecoder, config.pipeline.assembler(), request, tx)
        .with_read_chunk_bytes(config.pipeline.read_chunk_bytes);

    let dispatch = thread::Builder::new()
        .name("dispatch".to_string())
        .spawn(move || {
            let reason = pipeline.run(&mut transport, &running);
            (reason, pipeline.stats())
        })?;

    let joined = dispatch.join();

    // Pipeline (and its queue sender) is gone; workers finish the backlog
    debug!("Waiting for sink workers to drain");
    let sink = workers.join();

    let (reason, pipeline) =
        joined.map_err(|_| Error::Other("dispatch thread panicked".to_string()))?;

    info!(
        "Sink finished: {} written, {} skipped, {} failed",
        sink.written, sink.skipped, sink.failed
    );
    Ok(RunSummary {
        reason,
        pipeline,
        sink,
    })
}

/// Set `running` to false on SIGINT or SIGTERM
pub fn setup_signal_handler(running: Arc<AtomicBool>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {:?}, initiating shutdown...", sig);
                running.store(false, Ordering::Relaxed);
            }
        })?;
    Ok(())
}

/// Smart meter logger application
pub struct SmartMeterApp {
    config: Config,
    device: String,
    request: ExtractionRequest,
    running: Arc<AtomicBool>,
}

impl SmartMeterApp {
    /// Validate configuration for reading from `device`
    pub fn new(config: Config, device: impl Into<String>) -> Result<Self> {
        let request = ExtractionRequest::from_keys(&config.fields.record)?;
        info!(
            "Recording {} field(s): {}",
            request.len(),
            request
                .fields()
                .iter()
                .map(|f| f.display_name)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            config,
            device: device.into(),
            request,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Shutdown flag shared with the pipeline
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until the serial port closes or a shutdown signal arrives
    pub fn run(self) -> Result<RunSummary> {
        let writer = InfluxWriter::new(&self.config.influx)?;
        let transport = SerialTransport::open(&self.device, &self.config.serial)?;

        setup_signal_handler(self.running())?;
        info!(
            "Logging {} to {}. Press Ctrl+C to stop",
            self.device, self.config.influx.url
        );

        let summary = run_pipeline(transport, writer, &self.config, self.request, self.running)?;

        if summary.pipeline.dropped > 0 {
            warn!(
                "{} measurement(s) dropped because the store fell behind",
                summary.pipeline.dropped
            );
        }
        info!(
            "Stopped ({}): {} frames from {} bytes",
            summary.reason, summary.pipeline.frames, summary.pipeline.bytes_read
        );
        Ok(summary)
    }
}
