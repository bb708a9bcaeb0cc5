use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use pretty_photos::{
    CancellationToken, FallbackStrategy, Layout, PlaceMode, ProcessControl, ProcessOptions,
    ResolveConfig,
};

#[derive(Parser)]
#[command(name = "pretty-photos", version, about = "Rename photos and videos by creation time")]
struct Cli {
    /// Directory with input photos and videos
    input_dir: PathBuf,

    /// Directory for renamed output files
    #[arg(short, long)]
    output: PathBuf,

    /// JSON file with resolver settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Filename prefix of camera counter names, e.g. IMG_ for IMG_1433.JPG
    #[arg(long)]
    prefix: Option<String>,

    /// Exact number of counter digits after the prefix
    #[arg(long)]
    ordinal_digits: Option<usize>,

    /// Maximum offset in seconds when only one neighbour has a date
    #[arg(long)]
    max_jitter: Option<u32>,

    /// Time used when nothing else is known
    #[arg(long, value_enum)]
    fallback: Option<FallbackStrategy>,

    /// Fixed fallback time, "YYYY-MM-DD HH:MM:SS" or "YYYY-MM-DD"
    #[arg(long, value_parser = parse_timestamp)]
    fallback_epoch: Option<NaiveDateTime>,

    /// Output directory nesting
    #[arg(long, value_enum, default_value = "year")]
    layout: Layout,

    /// Move files instead of copying them
    #[arg(long = "move")]
    move_files: bool,

    /// Overwrite files that already exist in the output directory
    #[arg(long)]
    force: bool,

    /// Show what would be written without touching the file system
    #[arg(long)]
    dry_run: bool,

    /// Append _interpolated / _fallback to names with estimated times
    #[arg(long)]
    mark_estimated: bool,

    /// Seed for the jitter generator, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Path to the ffprobe executable
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, String> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid timestamp {s:?}, expected YYYY-MM-DD HH:MM:SS"))
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<ResolveConfig> {
        let mut config = match &self.config {
            Some(path) => ResolveConfig::load(path)?,
            None => ResolveConfig::default(),
        };
        if let Some(prefix) = &self.prefix {
            config.filename_prefix = prefix.clone();
        }
        if self.ordinal_digits.is_some() {
            config.ordinal_digits = self.ordinal_digits;
        }
        if let Some(max_jitter) = self.max_jitter {
            config.max_jitter_seconds = max_jitter;
        }
        if let Some(fallback) = self.fallback {
            config.fallback = fallback;
        }
        if let Some(epoch) = self.fallback_epoch {
            config.fallback_epoch = epoch;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut options = ProcessOptions::new(cli.input_dir.clone(), cli.output.clone());
    options.resolve = cli.resolve_config()?;
    options.layout = cli.layout;
    options.mode = if cli.move_files { PlaceMode::Move } else { PlaceMode::Copy };
    options.force = cli.force;
    options.dry_run = cli.dry_run;
    options.mark_estimated = cli.mark_estimated;
    options.seed = cli.seed;
    options.ffprobe = cli.ffprobe.clone();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling, finishing files in progress...");
        handler_token.cancel();
    })?;
    let control = ProcessControl::new().with_cancel_token(token);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {msg}")?,
    );
    let result = pretty_photos::process_with_control(&options, &control, &|stage, current, total, message| {
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(format!("{stage}: {message}"));
    });
    pb.finish_and_clear();
    let result = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if result.dry_run {
            for placed in &result.placements {
                eprintln!(
                    "{} -> {} ({:?})",
                    placed.source.display(),
                    placed.destination.display(),
                    placed.time_source
                );
            }
        }
        for conflict in &result.conflicts {
            eprintln!("conflict: {}", conflict);
        }
        for failure in &result.failures {
            eprintln!("failed: {}", failure);
        }
        eprintln!(
            "Done! {} media files: {} from metadata, {} interpolated, {} extrapolated, {} fallback; {} written, {} conflicts, {} failed ({:.2}s)",
            result.total_media,
            result.from_metadata,
            result.interpolated,
            result.extrapolated,
            result.fallback,
            result.files_written,
            result.conflicts.len(),
            result.failures.len(),
            t_total.elapsed().as_secs_f64()
        );
    }

    if !result.failures.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
