use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::config::{Layout, PlaceMode};
use crate::error::FileError;
use crate::media::{MediaFile, Resolution, TimeSource};
use crate::ThrottledProgress;

/// strftime format of output file names
pub const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Source file and the destination assigned to it.
#[derive(Debug, Clone)]
pub struct Placement {
    pub path: PathBuf,
    pub dest: PathBuf,
    pub resolution: Resolution,
}

/// Result of the planning phase.
#[derive(Debug, Default)]
pub struct WritePlan {
    pub placements: Vec<Placement>,
    pub conflicts: Vec<FileError>,
}

/// Result of the write phase.
#[derive(Debug, Default)]
pub struct WriteResult {
    pub files_written: u64,
    /// Destinations found occupied at write time
    pub conflicts: Vec<FileError>,
    pub failures: Vec<FileError>,
    /// Written files whose move left the source in place
    pub warnings: Vec<FileError>,
    pub cancelled: bool,
}

fn estimate_suffix(source: TimeSource) -> &'static str {
    if !source.is_estimate() {
        return "";
    }
    match source {
        TimeSource::Fallback => "_fallback",
        _ => "_interpolated",
    }
}

/// File name for a resolved timestamp, e.g. `2020-01-01_10:05:00.JPG`.
pub fn destination_name(resolution: &Resolution, ext: &str, mark_estimated: bool) -> String {
    let mut name = resolution.timestamp.format(FILE_TIME_FORMAT).to_string();
    if mark_estimated {
        name.push_str(estimate_suffix(resolution.source));
    }
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    name
}

pub fn destination_dir(output_dir: &Path, layout: Layout, timestamp: &NaiveDateTime) -> PathBuf {
    match layout {
        Layout::Flat => output_dir.to_path_buf(),
        Layout::Year => output_dir.join(timestamp.format("%Y").to_string()),
        Layout::YearMonth => output_dir
            .join(timestamp.format("%Y").to_string())
            .join(timestamp.format("%m").to_string()),
    }
}

/// Recursively collect existing files below `dir`.
fn scan_existing_files(dir: &Path) -> HashSet<PathBuf> {
    let mut files = HashSet::new();
    scan_existing_files_recursive(dir, &mut files);
    files
}

fn scan_existing_files_recursive(dir: &Path, files: &mut HashSet<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_existing_files_recursive(&path, files);
        } else {
            files.insert(path);
        }
    }
}

/// Assign destinations (sequential, needs collision tracking).
///
/// Files landing on the same second within this run get a `(n)` counter.
/// A destination that already exists on disk is a conflict and the file is
/// left out of the plan, unless `force` allows overwriting it.
pub fn plan_output(
    files: &[MediaFile],
    output_dir: &Path,
    layout: Layout,
    mark_estimated: bool,
    force: bool,
) -> WritePlan {
    let existing = if output_dir.exists() {
        scan_existing_files(output_dir)
    } else {
        HashSet::new()
    };

    let mut plan = WritePlan::default();
    let mut used_paths: HashSet<PathBuf> = HashSet::new();
    let mut name_counters: HashMap<PathBuf, u32> = HashMap::new();

    for file in files {
        let Some(resolution) = file.resolution() else {
            warn!("{} has no resolved time, not placed", file.path().display());
            continue;
        };
        let ext = file
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let sub_dir = destination_dir(output_dir, layout, &resolution.timestamp);
        let base_name = destination_name(&resolution, ext, mark_estimated);
        let base_dest = sub_dir.join(&base_name);

        let dest = if !used_paths.contains(&base_dest) {
            if existing.contains(&base_dest) && !force {
                plan.conflicts.push(FileError::PlacementConflict {
                    path: file.path().to_path_buf(),
                    dest: base_dest,
                });
                continue;
            }
            base_dest
        } else {
            let stem = Path::new(&base_name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("file")
                .to_string();
            let counter = name_counters.entry(base_dest).or_insert(0);
            loop {
                *counter += 1;
                let new_name = if ext.is_empty() {
                    format!("{}({})", stem, counter)
                } else {
                    format!("{}({}).{}", stem, counter, ext)
                };
                let candidate = sub_dir.join(&new_name);
                if !used_paths.contains(&candidate) && (force || !existing.contains(&candidate)) {
                    break candidate;
                }
            }
        };

        debug!("{} -> {}", file.path().display(), dest.display());
        used_paths.insert(dest.clone());
        plan.placements.push(Placement {
            path: file.path().to_path_buf(),
            dest,
            resolution,
        });
    }

    plan
}

/// A placement that reached its destination.
enum Placed {
    Done,
    /// Written, but the source of a move stayed behind
    SourceKept(io::Error),
}

/// Copy `src` to `dest`, failing with `AlreadyExists` instead of replacing it.
fn copy_no_clobber(src: &Path, dest: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;
    if let Err(err) = io::copy(&mut reader, &mut writer) {
        drop(writer);
        fs::remove_file(dest).ok();
        return Err(err);
    }
    Ok(())
}

fn remove_source(path: &Path) -> Placed {
    match fs::remove_file(path) {
        Ok(()) => Placed::Done,
        Err(err) => Placed::SourceKept(err),
    }
}

fn place_one(placement: &Placement, mode: PlaceMode, overwrite: bool) -> io::Result<Placed> {
    if let Some(parent) = placement.dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let (src, dest) = (placement.path.as_path(), placement.dest.as_path());
    let placed = match (mode, overwrite) {
        (PlaceMode::Copy, true) => {
            fs::copy(src, dest)?;
            Placed::Done
        }
        (PlaceMode::Copy, false) => {
            copy_no_clobber(src, dest)?;
            Placed::Done
        }
        (PlaceMode::Move, true) => {
            // rename fails across file systems
            if fs::rename(src, dest).is_err() {
                fs::copy(src, dest)?;
                remove_source(src)
            } else {
                Placed::Done
            }
        }
        (PlaceMode::Move, false) => {
            // link(2) never replaces an existing entry, unlike rename(2)
            match fs::hard_link(src, dest) {
                Ok(()) => remove_source(src),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Err(err),
                Err(_) => {
                    copy_no_clobber(src, dest)?;
                    remove_source(src)
                }
            }
        }
    };

    // NaiveDateTime is local time; convert back to UTC epoch for mtime
    if let Some(local) = placement
        .resolution
        .timestamp
        .and_local_timezone(chrono::Local)
        .earliest()
    {
        let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
        filetime::set_file_mtime(dest, ft).ok();
    }
    Ok(placed)
}

/// Copy or move planned files in parallel. Failures are collected per file;
/// cancellation stops further writes.
///
/// Unless `overwrite` is set, a destination that exists at write time is
/// left untouched and reported as a conflict, even if planning missed it.
pub fn place_files(
    placements: &[Placement],
    mode: PlaceMode,
    overwrite: bool,
    progress: &ThrottledProgress,
    cancel_token: Option<&CancellationToken>,
) -> WriteResult {
    let total = placements.len() as u64;
    let counter = AtomicU64::new(0);
    let cancelled = AtomicBool::new(false);

    let outcomes: Vec<Option<Result<Placed, FileError>>> = placements
        .par_iter()
        .map(|placement| {
            if cancel_token.is_some_and(|t| t.check().is_err()) {
                cancelled.store(true, Ordering::SeqCst);
                return None;
            }
            let outcome = place_one(placement, mode, overwrite).map_err(|err| {
                let path = placement.path.clone();
                let dest = placement.dest.clone();
                if !overwrite && err.kind() == io::ErrorKind::AlreadyExists {
                    FileError::PlacementConflict { path, dest }
                } else {
                    FileError::PlacementIo { path, dest, err }
                }
            });
            if let Err(e) = &outcome {
                warn!("{}", e);
            }
            let current = counter.fetch_add(1, Ordering::Relaxed);
            progress.report("write", current, total, "Writing files");
            Some(outcome)
        })
        .collect();

    tally(placements, outcomes, cancelled.load(Ordering::SeqCst))
}

fn tally(
    placements: &[Placement],
    outcomes: Vec<Option<Result<Placed, FileError>>>,
    cancelled: bool,
) -> WriteResult {
    let mut result = WriteResult {
        cancelled,
        ..Default::default()
    };
    for (placement, outcome) in placements.iter().zip(outcomes) {
        match outcome {
            None => {}
            Some(Ok(Placed::Done)) => result.files_written += 1,
            Some(Ok(Placed::SourceKept(err))) => {
                result.files_written += 1;
                let e = FileError::SourceNotRemoved {
                    path: placement.path.clone(),
                    dest: placement.dest.clone(),
                    err,
                };
                warn!("{}", e);
                result.warnings.push(e);
            }
            Some(Err(e @ FileError::PlacementConflict { .. })) => result.conflicts.push(e),
            Some(Err(e)) => result.failures.push(e),
        }
    }
    result
}
