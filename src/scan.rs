use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::date::media_kind;

/// A photo or video found under the input directory.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Modification time as local wall time
    pub modified: Option<NaiveDateTime>,
}

/// Result of walking the input tree
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    /// Regular files that are not photos or videos
    pub skipped: u64,
    /// Entries that could not be read
    pub warnings: Vec<String>,
}

/// Recursively collect media files under `input_dir`, sorted by path.
/// `exclude` (typically the output directory) is not descended into.
pub fn scan_dir(input_dir: &Path, exclude: Option<&Path>) -> anyhow::Result<ScanResult> {
    let root = input_dir.canonicalize()?;
    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let mut result = ScanResult::default();

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match &exclude {
            Some(ex) => entry.path() != ex.as_path(),
            None => true,
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                result.warnings.push(e.to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if media_kind(path).is_none() {
            debug!("Skipping {}: not a photo or video", path.display());
            result.skipped += 1;
            continue;
        }

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(|t| DateTime::<Local>::from(t).naive_local());

        result.files.push(ScannedFile {
            path: path.to_path_buf(),
            modified,
        });
    }

    info!(
        "Found {} media files in {} ({} other files skipped)",
        result.files.len(),
        root.display(),
        result.skipped
    );
    Ok(result)
}
