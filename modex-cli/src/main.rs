//! modex command-line interface.
//!
//! Partitions NeXus event runs into time-window histograms, runs
//! modulation-excitation experiments and dumps per-run data.
#![allow(clippy::cast_precision_loss, clippy::too_many_lines)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use modex_algorithms::dump::{
    detector_dump_path, events_dump_path, monitor_dump_path, spectra_export_path,
};
use modex_algorithms::{
    dump_detector, dump_events, dump_monitor, export_spectra, partition, run_experiment,
    AccumulatorOptions, PartitionReport, RunTimeline, SlicePolicy, WindowSchedule,
};
use modex_core::{format_timestamp, parse_timestamp, ExperimentConfig, PostProcessingMode, Window};
use modex_io::{ContainerStore, DatasetReader, DiagnosticLog, Hdf5Store, RunFile};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ModexIo(#[from] modex_io::Error),

    #[error("{0}")]
    Core(#[from] modex_core::Error),

    #[error("configuration error: {0}")]
    Usage(String),
}

/// Accumulation mode of the `partition` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Validate the window schedule and list it without writing outputs
    None,
    /// One output per window occurrence
    Individual,
    /// All window occurrences summed into one output
    Summed,
}

/// Frame renormalisation applied before writing.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PostProcess {
    /// Leave counts as accumulated
    None,
    /// Scale monitors to the detector frame count
    ScaleMonitors,
    /// Scale detectors to the monitor frame count
    ScaleDetectors,
}

impl From<PostProcess> for PostProcessingMode {
    fn from(value: PostProcess) -> Self {
        match value {
            PostProcess::None => Self::None,
            PostProcess::ScaleMonitors => Self::ScaleMonitors,
            PostProcess::ScaleDetectors => Self::ScaleDetectors,
        }
    }
}

/// Windowed re-accumulation of neutron event data.
#[derive(Parser)]
#[command(name = "modex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition runs into repeating time windows
    Partition {
        /// Accumulation mode
        #[arg(short, long, value_enum, default_value = "individual")]
        mode: Mode,

        /// Window name, used as the output file prefix
        #[arg(long)]
        name: String,

        /// Window start, epoch seconds or YYYY-MM-DDTHH:MM:SS local time
        #[arg(long)]
        start: Option<String>,

        /// Treat --start as seconds after the first run's start
        #[arg(long)]
        relative_start: bool,

        /// Window width in seconds
        #[arg(long)]
        width: f64,

        /// Offset of the window from its start in seconds
        #[arg(long, default_value = "0.0")]
        offset: f64,

        /// Seconds between window occurrences
        #[arg(long)]
        delta: f64,

        /// Number of slices per window
        #[arg(long, default_value = "1")]
        slices: usize,

        /// Renormalisation applied to each output
        #[arg(long, value_enum, default_value = "none")]
        post_process: PostProcess,

        /// Input runs, in acquisition order
        #[arg(short, long, required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Diagnostic log path
        #[arg(long)]
        diagnostics: Option<PathBuf>,
    },

    /// Run a modulation-excitation experiment from a JSON configuration
    Experiment {
        /// Experiment configuration file
        config: PathBuf,
    },

    /// Dump every event of one detector
    DumpEvents {
        /// 1-based detector index
        #[arg(short, long)]
        detector: usize,

        /// Write to stdout instead of `<input>.events.<detector>`
        #[arg(long)]
        stdout: bool,

        /// Input runs
        #[arg(required = true)]
        input: Vec<PathBuf>,
    },

    /// Dump the stored histogram of one spectrum
    DumpDetector {
        /// Spectrum id
        #[arg(short, long)]
        spectrum: i32,

        /// Input runs
        #[arg(required = true)]
        input: Vec<PathBuf>,
    },

    /// Dump one monitor spectrum
    DumpMonitor {
        /// 1-based monitor index
        #[arg(short, long)]
        monitor: u32,

        /// Input runs
        #[arg(required = true)]
        input: Vec<PathBuf>,
    },

    /// Export per-spectrum event times to `<input>.spectra.nxs`
    ExportSpectra {
        /// Lowest spectrum id
        #[arg(long)]
        lower: i32,

        /// Highest spectrum id
        #[arg(long)]
        upper: i32,

        /// Input runs
        #[arg(required = true)]
        input: Vec<PathBuf>,
    },

    /// Show information about a run
    Info {
        /// Input run
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    let store = Hdf5Store::new();
    match command {
        Commands::Partition {
            mode,
            name,
            start,
            relative_start,
            width,
            offset,
            delta,
            slices,
            post_process,
            files,
            output_dir,
            diagnostics,
        } => {
            if slices == 0 {
                return Err(CliError::Usage("slice count must be at least 1".into()));
            }
            // Validate the window before touching any file, then place it.
            let mut schedule = WindowSchedule::periodic(Window::new(name, 0.0, width)?, offset, delta)?;
            let timeline = RunTimeline::load(&store, &files)?;
            schedule.shift(window_start(start.as_deref(), relative_start, &timeline)?);

            if mode == Mode::None {
                list_schedule(&schedule, &timeline);
                return Ok(());
            }
            if !output_dir.is_dir() {
                return Err(CliError::Usage(format!(
                    "output directory {} does not exist",
                    output_dir.display()
                )));
            }

            let policy = if mode == Mode::Summed {
                SlicePolicy::Summed
            } else {
                SlicePolicy::Individual
            };
            let options = AccumulatorOptions::new(&output_dir)
                .with_slices(slices)
                .with_policy(policy)
                .with_post_processing(post_process.into());
            let report = partition(&store, &files, schedule, &options)?;
            if let Some(path) = diagnostics {
                let mut log = DiagnosticLog::create(&path)?;
                report.write_diagnostics(&mut log)?;
            }
            print_report(&report);
        }

        Commands::Experiment { config } => {
            let config = ExperimentConfig::from_file(&config)?;
            let report = run_experiment(&store, &config)?;
            print_report(&report);
            println!("Diagnostics: {}", config.diagnostics.display());
        }

        Commands::DumpEvents {
            detector,
            stdout,
            input,
        } => {
            for path in &input {
                let written = if stdout {
                    let mut out = io::stdout().lock();
                    dump_events(&store, path, detector, &mut out)?
                } else {
                    let dest = events_dump_path(path, detector);
                    let mut out = BufWriter::new(File::create(&dest)?);
                    let written = dump_events(&store, path, detector, &mut out)?;
                    out.flush()?;
                    info!("Wrote {}", dest.display());
                    written
                };
                info!("Dumped {written} events from {}", path.display());
            }
        }

        Commands::DumpDetector { spectrum, input } => {
            for path in &input {
                let dest = detector_dump_path(path, spectrum);
                let mut out = BufWriter::new(File::create(&dest)?);
                dump_detector(&store, path, spectrum, &mut out)?;
                out.flush()?;
                info!("Wrote {}", dest.display());
            }
        }

        Commands::DumpMonitor { monitor, input } => {
            for path in &input {
                let dest = monitor_dump_path(path, monitor);
                let mut out = BufWriter::new(File::create(&dest)?);
                dump_monitor(&store, path, monitor, &mut out)?;
                out.flush()?;
                info!("Wrote {}", dest.display());
            }
        }

        Commands::ExportSpectra {
            lower,
            upper,
            input,
        } => {
            for path in &input {
                export_spectra(&store, path, lower, upper, &spectra_export_path(path))?;
            }
        }

        Commands::Info { input } => print_info(&store, &input)?,
    }

    Ok(())
}

/// Absolute window start in epoch seconds.
fn window_start(start: Option<&str>, relative: bool, timeline: &RunTimeline) -> Result<f64> {
    let Some(text) = start else {
        return Ok(timeline.experiment_start());
    };
    let value = match text.trim().parse::<f64>() {
        Ok(seconds) => seconds,
        Err(_) if relative => {
            return Err(CliError::Usage(format!(
                "relative start must be a number of seconds, got '{text}'"
            )))
        }
        Err(_) => parse_timestamp(text)? as f64,
    };
    Ok(if relative {
        timeline.experiment_start() + value
    } else {
        value
    })
}

fn list_schedule(schedule: &WindowSchedule, timeline: &RunTimeline) {
    let WindowSchedule::Periodic { window, delta } = schedule else {
        return;
    };
    let mut window = window.clone();
    let mut count = 0usize;
    while window.start() < timeline.experiment_end() {
        let bound = timeline.bind(window.clone());
        match bound.runs() {
            Some(runs) => println!("{window}  runs {}..={}", runs.start(), runs.end()),
            None => println!("{window}  no run"),
        }
        window.shift(*delta);
        count += 1;
    }
    println!("{count} windows");
}

fn print_report(report: &PartitionReport) {
    for output in &report.outputs {
        println!("{} {}", output.path.display(), output.good_frames);
    }
    println!(
        "Wrote {} outputs with {} good frames",
        report.outputs.len(),
        report.total_good_frames()
    );
    if !report.skipped.is_empty() {
        println!("Skipped {} windows", report.skipped.len());
    }
}

fn print_info<S: ContainerStore>(store: &S, input: &Path) -> Result<()> {
    let run = RunFile::load(store, input)?;
    let container = store.open(input)?;
    let spectra = container.read_i32(modex_io::nexus::SPECTRUM_INDEX)?;

    println!("File: {}", input.display());
    println!(
        "Span: {} - {} ({} s)",
        format_timestamp(run.span.start_epoch),
        format_timestamp(run.span.end_epoch),
        run.span.duration()
    );
    println!("Good frames: {}", run.good_frames);
    println!("Raw frames: {}", run.raw_frames);
    println!("Event frames: {}", run.n_frames());
    println!("Events: {}", run.n_events());
    println!("Spectra: {}", spectra.len());
    println!("TOF bins: {}", run.tof_edges.len().saturating_sub(1));
    println!("Monitors: {}", run.monitors.len());
    Ok(())
}
