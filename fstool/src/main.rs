//! # `fstool`
//!
//! A tool for detecting and repairing false sharing from memory access traces
//!
//! Example usage:
//! ```sh
//! $ fstool detect trace.csv bridge.txt --allocs allocs.csv # score cache lines
//! $ fstool repair bridge.txt layout.txt --target-threads 8 # compute relayout
//! $ fstool all trace.csv layout.txt --allocs allocs.csv    # both passes
//! ```
use fsline::analysis::AnalysisHints;
use fsline::api::{read_api, write_api};
use fsline::detect::{DetectPass, DEFAULT_THRESHOLD};
use fsline::repair::{repair, write_repair};
use trace_format::{read_allocs, read_trace};

use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Detect and repair false sharing
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Score cache lines and write the bridge file consumed by `repair`
    ///
    /// Also writes a human-readable score summary next to the trace
    /// (`trace_summary.csv` for `trace.csv`)
    Detect {
        /// Memory access trace (CSV)
        #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        trace: PathBuf,

        /// Output path for the bridge file
        #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        output: PathBuf,

        /// Reporting threshold for per-cache-line scores
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u64,

        /// Allocation metadata (CSV); without it accesses keep absolute offsets
        #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        allocs: Option<PathBuf>,
    },

    /// Compute padded relayouts from a bridge file
    Repair {
        /// Bridge file produced by `detect`
        #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        input: PathBuf,

        /// Output path for the layout file
        #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        output: PathBuf,

        /// Extrapolate linear access patterns up to this many threads
        #[arg(long)]
        target_threads: Option<u32>,

        /// Static-analysis hint file for arrays of structs
        #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        analysis: Option<PathBuf>,
    },

    /// Run both passes, writing the layout file directly
    All {
        /// Memory access trace (CSV)
        #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        trace: PathBuf,

        /// Output path for the layout file
        #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        output: PathBuf,

        /// Reporting threshold for per-cache-line scores
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u64,

        /// Allocation metadata (CSV)
        #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        allocs: Option<PathBuf>,

        /// Extrapolate linear access patterns up to this many threads
        #[arg(long)]
        target_threads: Option<u32>,

        /// Static-analysis hint file for arrays of structs
        #[arg(long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
        analysis: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    match args.command {
        Command::Detect {
            trace,
            output,
            threshold,
            allocs,
        } => {
            let pass = run_detect(&trace, threshold, allocs.as_deref())?;
            write_atomic(&summary_path(&trace), |w| pass.write_summary(w))?;
            write_atomic(&output, |w| write_api(w, &pass.api_output()))?;
        }
        Command::Repair {
            input,
            output,
            target_threads,
            analysis,
        } => {
            let file = BufReader::new(
                File::open(&input)
                    .with_context(|| format!("failed to open bridge file: {}", input.display()))?,
            );
            let allocs = read_api(file).context("failed to read bridge file")?;
            let hints = read_hints(analysis.as_deref())?;
            let result = repair(&allocs, target_threads, hints.as_ref());
            write_atomic(&output, |w| write_repair(w, &result))?;
        }
        Command::All {
            trace,
            output,
            threshold,
            allocs,
            target_threads,
            analysis,
        } => {
            let pass = run_detect(&trace, threshold, allocs.as_deref())?;
            write_atomic(&summary_path(&trace), |w| pass.write_summary(w))?;
            let hints = read_hints(analysis.as_deref())?;
            let result = repair(&pass.api_output(), target_threads, hints.as_ref());
            write_atomic(&output, |w| write_repair(w, &result))?;
        }
    }

    Ok(())
}

fn run_detect(
    trace_path: &Path,
    threshold: u64,
    alloc_path: Option<&Path>,
) -> anyhow::Result<DetectPass> {
    let trace_file = BufReader::new(
        File::open(trace_path)
            .with_context(|| format!("failed to open trace: {}", trace_path.display()))?,
    );
    let trace = read_trace(trace_file).context("failed to read trace")?;

    let allocs = match alloc_path {
        Some(path) => {
            let file = BufReader::new(File::open(path).with_context(|| {
                format!("failed to open allocation metadata: {}", path.display())
            })?);
            read_allocs(file).context("failed to read allocation metadata")?
        }
        None => Vec::new(),
    };

    Ok(DetectPass::compute(&trace, &allocs, threshold))
}

fn read_hints(path: Option<&Path>) -> anyhow::Result<Option<AnalysisHints>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let file = BufReader::new(
        File::open(path)
            .with_context(|| format!("failed to open analysis file: {}", path.display()))?,
    );
    let hints = AnalysisHints::read(file).context("failed to read analysis file")?;
    Ok(Some(hints))
}

/// `trace.csv` becomes `trace_summary.csv`
fn summary_path(trace: &Path) -> PathBuf {
    let stem = trace
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trace");
    let mut name = format!("{}_summary", stem);
    if let Some(ext) = trace.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    trace.with_file_name(name)
}

/// Write through a temp file so a failed run never leaves a partial output
fn write_atomic<F>(path: &Path, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut writer = BufWriter::new(
        File::create(&tmp)
            .with_context(|| format!("failed to create output: {}", tmp.display()))?,
    );
    write(&mut writer).with_context(|| format!("failed to write output: {}", tmp.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write output: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move output into place: {}", path.display()))?;
    Ok(())
}
