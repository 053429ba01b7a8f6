//! Coulter DAQ CLI
//!
//! Replays a recorded readout stream, or runs a simulated acquisition,
//! then reports per-pixel noise over the accumulated frames.

use clap::{Parser, Subcommand};
use coulter_daq::{
    acquisition::{
        ConfigError, DetectorTrigger, FileConfig, Pipeline, PipelineSummary, RunControl, RunError,
    },
    analysis::AnalysisError,
    metrics::{MetricsError, MetricsRegistry, MetricsSnapshot},
    source::{FrameSource, MockDetector, RawFrame, RecordingSource, RecordingWriter, SourceError},
    store::SampleStore,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::task::Poll;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Leading warm-up frames excluded from the noise statistics
    #[arg(long, global = true)]
    skip: Option<usize>,

    /// Save the whole sample buffer to this .npy file
    #[arg(long, global = true)]
    save: Option<PathBuf>,

    /// Save the noise report to this TOML file
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Frames decoded per parallel batch
    #[arg(long, global = true)]
    batch: Option<usize>,

    /// Print decoder and store metrics in Prometheus text format
    #[arg(long, global = true)]
    print_metrics: bool,

    /// Keep serving /metrics after the run until interrupted
    #[arg(long, global = true)]
    serve_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a recorded readout stream
    Replay {
        /// Path to the recording
        recording: PathBuf,
    },
    /// Trigger the synthetic detector and decode its frames
    Simulate {
        /// Number of triggers to issue
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Trigger rate in Hz (0 = auto)
        #[arg(long)]
        rate: Option<u32>,

        /// Detector RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Also write the raw frames to this recording
        #[arg(long)]
        record: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("frame source failed: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Passes frames through while copying them into a recording.
struct Recorder<S> {
    inner: S,
    writer: RecordingWriter<BufWriter<File>>,
}

impl<S: FrameSource> FrameSource for Recorder<S> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let frame = self.inner.next_frame()?;
        if let Some(ref frame) = frame {
            self.writer.write_frame(frame)?;
        }
        Ok(frame)
    }

    fn try_next_frame(&mut self) -> Result<Poll<Option<RawFrame>>, SourceError> {
        let frame = self.inner.try_next_frame()?;
        if let Poll::Ready(Some(ref frame)) = frame {
            self.writer.write_frame(frame)?;
        }
        Ok(frame)
    }
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Coulter DAQ v{}", coulter_daq::VERSION);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Acquisition failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::Relaxed);
        })?;
    }

    let store = SampleStore::new(config.acquisition.store());
    let mut pipeline = Pipeline::new(store.clone());

    let summary = match &cli.command {
        Command::Replay { recording } => {
            let mut source = RecordingSource::open(recording)?;
            drain(&mut pipeline, &mut source, &config, &cancel)?
        }
        Command::Simulate { record, .. } => {
            simulate(&mut pipeline, record.as_ref(), &config, &cancel)?
        }
    };

    if summary.cancelled {
        warn!("Acquisition interrupted, analyzing frames received so far");
    }

    let stats = pipeline.stats();
    info!(
        frames = store.len(),
        transport_errors = stats.transport_errors,
        diagnostics = stats.diagnostic_frames,
        out_of_range = stats.out_of_range_records,
        "Acquisition complete"
    );

    let analysis = &config.analysis;
    let report = analysis.analyzer().analyze_with_cancel(
        &store,
        analysis.skip_leading_frames,
        analysis.output.as_deref(),
        &cancel,
    )?;
    println!("{}", report);

    if let Some(path) = &analysis.report {
        report.save(path)?;
    }

    let snapshot = MetricsSnapshot::from_components(stats, pipeline.summary(), &store);
    if cli.print_metrics {
        let registry = MetricsRegistry::new()?;
        registry.update(&snapshot);
        print!("{}", registry.encode()?);
    }

    if cli.serve_metrics {
        #[cfg(feature = "metrics")]
        serve_until_cancelled(config.output.metrics_port, &store, &snapshot, &cancel)?;
        #[cfg(not(feature = "metrics"))]
        warn!("Built without the metrics feature, not serving");
    }

    Ok(())
}

fn apply_overrides(config: &mut FileConfig, cli: &Cli) {
    if let Some(skip) = cli.skip {
        config.analysis.skip_leading_frames = skip;
    }
    if let Some(save) = &cli.save {
        config.analysis.output = Some(save.clone());
    }
    if let Some(report) = &cli.report {
        config.analysis.report = Some(report.clone());
    }
    if let Some(batch) = cli.batch {
        config.acquisition.batch_size = batch;
    }
    if let Command::Simulate {
        frames, rate, seed, ..
    } = &cli.command
    {
        if let Some(frames) = frames {
            config.acquisition.frame_count = *frames;
        }
        if let Some(rate) = rate {
            config.acquisition.rate_hz = *rate;
        }
        if let Some(seed) = seed {
            config.simulation.seed = *seed;
        }
    }
}

fn drain<S: FrameSource + ?Sized>(
    pipeline: &mut Pipeline,
    source: &mut S,
    config: &FileConfig,
    cancel: &AtomicBool,
) -> Result<PipelineSummary, SourceError> {
    match config.acquisition.batch_size {
        1 => pipeline.run(source, cancel),
        batch => pipeline.run_batched(source, batch, cancel),
    }
}

fn simulate(
    pipeline: &mut Pipeline,
    record: Option<&PathBuf>,
    config: &FileConfig,
    cancel: &AtomicBool,
) -> Result<PipelineSummary, CliError> {
    let (tx, rx) = mpsc::channel();
    let detector = MockDetector::new(config.simulation.clone());

    let mut control = RunControl::new(pipeline.store().clone(), config.acquisition.rate())
        .with_limit(config.acquisition.frame_count);
    control.start(DetectorTrigger::new(detector, tx))?;

    // The channel closes once the run loop drops the trigger.
    let summary = match record {
        Some(path) => {
            let mut source = Recorder {
                inner: rx,
                writer: RecordingWriter::create(path)?,
            };
            let summary = drain(pipeline, &mut source, config, cancel)?;
            let entries = source.writer.entries();
            source.writer.finish()?;
            info!(path = %path.display(), entries, "Recording closed");
            summary
        }
        None => {
            let mut source = rx;
            drain(pipeline, &mut source, config, cancel)?
        }
    };

    let triggers = control.stop()?;
    info!(triggers, "Simulated run finished");
    Ok(summary)
}

#[cfg(feature = "metrics")]
fn serve_until_cancelled(
    port: u16,
    store: &SampleStore,
    snapshot: &MetricsSnapshot,
    cancel: &AtomicBool,
) -> Result<(), CliError> {
    use coulter_daq::metrics::{MetricsServer, MetricsServerConfig};
    use std::time::Duration;

    if port == 0 {
        warn!("Metrics port is 0, not serving");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = MetricsServer::new(
            MetricsServerConfig::with_port(port),
            MetricsRegistry::new()?,
            store.clone(),
        );
        server.state().publish(snapshot);

        let handle = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "Metrics server failed");
            }
        });

        info!("Serving metrics, press Ctrl-C to exit");
        while !cancel.load(Ordering::Relaxed) && !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        handle.abort();
        Ok::<(), CliError>(())
    })
}
