pub mod cancel;
pub mod config;
pub mod date;
pub mod error;
pub mod media;
pub mod resolve;
pub mod scan;
pub mod sequence;
pub mod writer;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use cancel::{CancellationToken, CancelledError};
pub use config::{FallbackStrategy, Layout, PlaceMode, ResolveConfig};
pub use date::{ContainerExtractor, MetadataExtractor};
pub use error::FileError;
pub use media::{Batch, MediaFile, Resolution, SequenceKey, TimeSource};
pub use resolve::resolve;
pub use sequence::SequencePattern;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub mode: PlaceMode,
    /// Overwrite existing destinations instead of reporting a conflict
    #[serde(default)]
    pub force: bool,
    /// Plan and report only, write nothing
    #[serde(default)]
    pub dry_run: bool,
    /// Tag estimated times in the file name
    #[serde(default)]
    pub mark_estimated: bool,
    /// Seed for the jitter generator; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// ffprobe executable used for video metadata
    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
    #[serde(default)]
    pub resolve: ResolveConfig,
}

impl ProcessOptions {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
            layout: Layout::default(),
            mode: PlaceMode::default(),
            force: false,
            dry_run: false,
            mark_estimated: false,
            seed: None,
            ffprobe: None,
            resolve: ResolveConfig::default(),
        }
    }
}

/// A planned or completed placement, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub time_source: TimeSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub total_media: u64,
    pub from_metadata: u64,
    pub interpolated: u64,
    pub extrapolated: u64,
    pub fallback: u64,
    pub files_written: u64,
    /// Files not written because their destination already exists
    pub conflicts: Vec<String>,
    /// Per-file write failures
    pub failures: Vec<String>,
    /// Unreadable metadata and other per-file notes
    pub warnings: Vec<String>,
    pub placements: Vec<PlacedFile>,
    pub dry_run: bool,
}

/// Control options for process execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Cancellation token for Ctrl-C support.
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn check(&self) -> Result<(), CancelledError> {
        match &self.cancel_token {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}

/// Type alias for progress callback
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        let start = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        Self {
            inner,
            last_emit: Mutex::new(start),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Run the full pipeline with progress reporting.
pub fn process(
    options: &ProcessOptions,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    process_with_control(options, &ProcessControl::default(), progress_callback)
}

/// Run the full pipeline with the default extractor (EXIF + ffprobe).
pub fn process_with_control(
    options: &ProcessOptions,
    control: &ProcessControl,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    let extractor = match &options.ffprobe {
        Some(path) => ContainerExtractor::new(path.clone()),
        None => ContainerExtractor::default(),
    };
    process_with_extractor(options, control, &extractor, progress_callback)
}

/// Run the full pipeline: scan, read metadata, resolve, then place.
/// Each stage completes before the next starts.
pub fn process_with_extractor(
    options: &ProcessOptions,
    control: &ProcessControl,
    extractor: &dyn MetadataExtractor,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);
    options.resolve.validate()?;
    let pattern = SequencePattern::from_config(&options.resolve)?;

    if !options.input_dir.is_dir() {
        anyhow::bail!("Input directory not found: {}", options.input_dir.display());
    }
    if let (Ok(input), Ok(output)) = (
        options.input_dir.canonicalize(),
        options.output_dir.canonicalize(),
    ) {
        if input == output {
            anyhow::bail!(
                "Output directory must differ from the input directory: {}",
                input.display()
            );
        }
    }
    if !options.dry_run {
        std::fs::create_dir_all(&options.output_dir)?;
    }
    control.check()?;

    // Stage 1: Scan input tree
    let scan = scan::scan_dir(&options.input_dir, Some(&options.output_dir))?;
    let mut result = ProcessResult {
        total_media: scan.files.len() as u64,
        warnings: scan.warnings,
        dry_run: options.dry_run,
        ..Default::default()
    };
    if scan.files.is_empty() {
        return Ok(result);
    }
    control.check()?;

    // Stage 2: Read metadata (parallel, no ordering dependency)
    let total = scan.files.len() as u64;
    let counter = AtomicU64::new(0);
    let extracted: Vec<(MediaFile, Option<FileError>)> = scan
        .files
        .par_iter()
        .map(|scanned| {
            let path = scanned.path.clone();
            let (mut file, error) = if control.check().is_err() {
                (MediaFile::new(path), None)
            } else {
                match extractor.extract(&path) {
                    Ok(candidates) => (MediaFile::from_candidates(path, &candidates), None),
                    Err(e) => {
                        let error = FileError::UnreadableMetadata {
                            path: path.clone(),
                            reason: e.to_string(),
                        };
                        warn!("{}", error);
                        (MediaFile::new(path), Some(error))
                    }
                }
            };
            file.sequence_key = pattern.parse(file.file_name());
            file.modified = scanned.modified;

            let current = counter.fetch_add(1, Ordering::Relaxed);
            tp.report("metadata", current, total, "Reading metadata");
            (file, error)
        })
        .collect();
    control.check()?;

    let mut files = Vec::with_capacity(extracted.len());
    for (file, error) in extracted {
        if let Some(error) = error {
            result.warnings.push(error.to_string());
        }
        if !file.is_anchored() && file.sequence_key.is_none() {
            debug!("{}", FileError::UnparseableSequenceKey { path: file.path().to_path_buf() });
        }
        files.push(file);
    }
    let found = files.iter().filter(|f| f.is_anchored()).count();
    info!("Metadata dates found: {}, missing: {}", found, files.len() - found);

    // Stage 3: Resolve timestamps for the whole batch
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let batch = resolve(Batch::new(files), &options.resolve, &mut rng);
    let summary = batch.summary();
    result.from_metadata = summary.metadata;
    result.interpolated = summary.interpolated;
    result.extrapolated = summary.extrapolated;
    result.fallback = summary.fallback;
    tp.report("resolve", total - 1, total, "Timestamps resolved");
    control.check()?;

    // Stage 4: Plan destinations, then write
    let plan = writer::plan_output(
        batch.files(),
        &options.output_dir,
        options.layout,
        options.mark_estimated,
        options.force,
    );
    for conflict in &plan.conflicts {
        warn!("{}", conflict);
        result.conflicts.push(conflict.to_string());
    }
    result.placements = plan
        .placements
        .iter()
        .map(|p| PlacedFile {
            source: p.path.clone(),
            destination: p.dest.clone(),
            time_source: p.resolution.source,
        })
        .collect();

    if options.dry_run {
        info!("Dry run: {} files planned, nothing written", plan.placements.len());
        return Ok(result);
    }

    let write = writer::place_files(
        &plan.placements,
        options.mode,
        options.force,
        &tp,
        control.cancel_token.as_ref(),
    );
    result.files_written = write.files_written;
    result
        .conflicts
        .extend(write.conflicts.iter().map(|e| e.to_string()));
    result.failures = write.failures.iter().map(|e| e.to_string()).collect();
    result
        .warnings
        .extend(write.warnings.iter().map(|e| e.to_string()));
    if write.cancelled {
        return Err(CancelledError.into());
    }

    info!(
        "Wrote {} files to {} ({} conflicts, {} failures)",
        result.files_written,
        options.output_dir.display(),
        result.conflicts.len(),
        result.failures.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::exif::tests::jpeg_with_date;
    use crate::error::MetadataError;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn noop(_: &str, _: u64, _: u64, _: &str) {}

    /// Serves metadata from a map keyed by file name.
    struct MapExtractor(HashMap<&'static str, Result<&'static str, &'static str>>);

    impl MetadataExtractor for MapExtractor {
        fn extract(&self, path: &Path) -> Result<Vec<String>, MetadataError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            match self.0.get(name) {
                Some(Ok(date)) => Ok(vec![date.to_string()]),
                Some(Err(reason)) => Err(MetadataError::Probe(reason.to_string())),
                None => Ok(Vec::new()),
            }
        }
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name.as_bytes()).unwrap();
    }

    #[test]
    fn test_process_end_to_end_with_exif() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("IMG_0001.JPG"), jpeg_with_date("2020:01:01 10:00:00")).unwrap();
        fs::write(input.join("IMG_0002.JPG"), [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        fs::write(input.join("IMG_0003.JPG"), jpeg_with_date("2020:01:01 10:10:00")).unwrap();
        touch(&input, "readme.txt");

        let mut options = ProcessOptions::new(input.clone(), output.clone());
        options.seed = Some(1);
        let result = process(&options, &noop).unwrap();

        assert_eq!(result.total_media, 3);
        assert_eq!(result.from_metadata, 2);
        assert_eq!(result.interpolated, 1);
        assert_eq!(result.files_written, 3);
        assert!(result.failures.is_empty());
        assert!(output.join("2020/2020-01-01_10:00:00.JPG").exists());
        assert!(output.join("2020/2020-01-01_10:05:00.JPG").exists());
        assert!(output.join("2020/2020-01-01_10:10:00.JPG").exists());
        assert!(input.join("IMG_0002.JPG").exists());

        // Second run into the same output reports conflicts instead of overwriting
        let again = process(&options, &noop).unwrap();
        assert_eq!(again.files_written, 0);
        assert_eq!(again.conflicts.len(), 3);
    }

    #[test]
    fn test_process_unreadable_metadata_and_fallback() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir_all(&input).unwrap();
        touch(&input, "DSCN0045.JPG");
        touch(&input, "IMG_0007.JPG");

        let extractor = MapExtractor(HashMap::from([("DSCN0045.JPG", Err("corrupt header"))]));
        let mut options = ProcessOptions::new(input, output.clone());
        options.resolve.fallback = FallbackStrategy::FixedEpoch;
        options.resolve.fallback_epoch = "2001-02-03T04:05:06".parse().unwrap();
        options.layout = Layout::Flat;
        options.mark_estimated = true;

        let result =
            process_with_extractor(&options, &ProcessControl::new(), &extractor, &noop).unwrap();
        assert_eq!(result.fallback, 2);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("DSCN0045.JPG"));
        // Both land on the same second
        assert!(output.join("2001-02-03_04:05:06_fallback.JPG").exists());
        assert!(output.join("2001-02-03_04:05:06_fallback(1).JPG").exists());
    }

    #[test]
    fn test_process_unreadable_metadata_between_anchors_is_interpolated() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir_all(&input).unwrap();
        touch(&input, "IMG_0001.JPG");
        touch(&input, "IMG_0002.JPG");
        touch(&input, "IMG_0003.JPG");

        let extractor = MapExtractor(HashMap::from([
            ("IMG_0001.JPG", Ok("2020:01:01 10:00:00")),
            ("IMG_0002.JPG", Err("truncated file")),
            ("IMG_0003.JPG", Ok("2020:01:01 10:10:00")),
        ]));
        let mut options = ProcessOptions::new(input, output.clone());
        options.layout = Layout::Flat;

        let result =
            process_with_extractor(&options, &ProcessControl::new(), &extractor, &noop).unwrap();
        assert_eq!(result.from_metadata, 2);
        assert_eq!(result.interpolated, 1);
        assert_eq!(result.fallback, 0);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("IMG_0002.JPG"));
        assert!(output.join("2020-01-01_10:05:00.JPG").exists());
    }

    #[test]
    fn test_process_accepts_borrowing_progress_callback() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(&input).unwrap();
        touch(&input, "IMG_0001.JPG");

        let stages = Mutex::new(Vec::new());
        let extractor = MapExtractor(HashMap::from([("IMG_0001.JPG", Ok("2020:01:01 10:00:00"))]));
        let options = ProcessOptions::new(input, dir.path().join("out"));
        let result = process_with_extractor(
            &options,
            &ProcessControl::new(),
            &extractor,
            &|stage: &str, _: u64, _: u64, _: &str| stages.lock().unwrap().push(stage.to_string()),
        )
        .unwrap();
        assert_eq!(result.files_written, 1);

        let stages = stages.into_inner().unwrap();
        assert!(stages.contains(&"metadata".to_string()));
        assert!(stages.contains(&"write".to_string()));
    }

    #[test]
    fn test_process_rejects_output_equal_to_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(&input).unwrap();
        touch(&input, "IMG_0001.JPG");

        let options = ProcessOptions::new(input.clone(), input.join("."));
        let err = process(&options, &noop).unwrap_err();
        assert!(err.to_string().contains("must differ"));
        assert!(input.join("IMG_0001.JPG").exists());
    }

    #[test]
    fn test_process_dry_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir_all(&input).unwrap();
        touch(&input, "IMG_0001.JPG");
        touch(&input, "IMG_0002.MOV");

        let extractor = MapExtractor(HashMap::from([("IMG_0001.JPG", Ok("2019:12:31 23:59:30"))]));
        let mut options = ProcessOptions::new(input, output.clone());
        options.dry_run = true;
        options.seed = Some(3);
        options.resolve.max_jitter_seconds = 10;

        let result =
            process_with_extractor(&options, &ProcessControl::new(), &extractor, &noop).unwrap();
        assert!(result.dry_run);
        assert_eq!(result.extrapolated, 1);
        assert_eq!(result.placements.len(), 2);
        assert_eq!(result.files_written, 0);
        assert!(!output.exists());
    }

    #[test]
    fn test_process_cancelled_before_start() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(&input).unwrap();
        touch(&input, "IMG_0001.JPG");

        let token = CancellationToken::new();
        token.cancel();
        let control = ProcessControl::new().with_cancel_token(token);
        let options = ProcessOptions::new(input, dir.path().join("out"));
        let err = process_with_control(&options, &control, &noop).unwrap_err();
        assert!(err.downcast_ref::<CancelledError>().is_some());
    }

    #[test]
    fn test_process_missing_input_fails() {
        let dir = tempdir().unwrap();
        let options = ProcessOptions::new(dir.path().join("missing"), dir.path().join("out"));
        assert!(process(&options, &noop).is_err());
    }

    #[test]
    fn test_throttled_progress_always_reports_completion() {
        let calls = Mutex::new(Vec::new());
        {
            let callback = |stage: &str, current: u64, total: u64, _: &str| {
                calls.lock().unwrap().push((stage.to_string(), current, total));
            };
            let tp = ThrottledProgress::new(&callback);
            for i in 0..1000 {
                tp.report("write", i, 1000, "");
            }
        }
        let calls = calls.into_inner().unwrap();
        assert!(calls.len() < 1000);
        assert_eq!(calls.last().unwrap().1, 999);
    }
}
