use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::date::parse_metadata_timestamp;

/// Camera counter parsed from a filename such as `IMG_0042.JPG`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceKey {
    pub prefix: String,
    pub ordinal: u64,
}

/// Where a resolved timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    /// Read directly from embedded metadata
    Metadata,
    /// Linear estimate between two anchored neighbours
    Interpolated,
    /// One-sided estimate from a single anchored neighbour plus jitter
    Extrapolated,
    /// File modification time or fixed epoch
    Fallback,
}

impl TimeSource {
    pub fn is_estimate(self) -> bool {
        self != TimeSource::Metadata
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub timestamp: NaiveDateTime,
    pub source: TimeSource,
}

#[derive(Debug, Clone)]
pub struct MediaFile {
    path: PathBuf,
    /// Trusted creation time from metadata
    pub raw_timestamp: Option<NaiveDateTime>,
    pub sequence_key: Option<SequenceKey>,
    /// File system modification time, used by the fallback strategy
    pub modified: Option<NaiveDateTime>,
    resolution: Option<Resolution>,
}

impl MediaFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            raw_timestamp: None,
            sequence_key: None,
            modified: None,
            resolution: None,
        }
    }

    /// Build a file from raw metadata candidates in priority order.
    /// The first candidate that parses wins; malformed ones are ignored.
    pub fn from_candidates(path: PathBuf, candidates: &[String]) -> Self {
        let mut file = Self::new(path);
        file.raw_timestamp = candidates
            .iter()
            .find_map(|raw| parse_metadata_timestamp(raw));
        file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    pub fn is_anchored(&self) -> bool {
        self.raw_timestamp.is_some()
    }

    /// Resolved timestamp; `None` until the batch has been resolved.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub(crate) fn set_resolution(&mut self, resolution: Resolution) {
        debug_assert!(self.resolution.is_none(), "resolution assigned twice");
        if self.resolution.is_none() {
            self.resolution = Some(resolution);
        }
    }
}

/// Per-source counts for a resolved batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveSummary {
    pub metadata: u64,
    pub interpolated: u64,
    pub extrapolated: u64,
    pub fallback: u64,
    pub unresolved: u64,
}

/// Files processed together by the resolver, ordered by sequence key where
/// present and by path otherwise.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    files: Vec<MediaFile>,
}

impl Batch {
    pub fn new(mut files: Vec<MediaFile>) -> Self {
        files.sort_by(|a, b| match (&a.sequence_key, &b.sequence_key) {
            (Some(ka), Some(kb)) => ka.cmp(kb).then_with(|| a.path.cmp(&b.path)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.path.cmp(&b.path),
        });
        Self { files }
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub(crate) fn files_mut(&mut self) -> &mut [MediaFile] {
        &mut self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn summary(&self) -> ResolveSummary {
        let mut summary = ResolveSummary::default();
        for file in &self.files {
            match file.resolution.map(|r| r.source) {
                Some(TimeSource::Metadata) => summary.metadata += 1,
                Some(TimeSource::Interpolated) => summary.interpolated += 1,
                Some(TimeSource::Extrapolated) => summary.extrapolated += 1,
                Some(TimeSource::Fallback) => summary.fallback += 1,
                None => summary.unresolved += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(path: &str, ordinal: u64) -> MediaFile {
        let mut file = MediaFile::new(PathBuf::from(path));
        file.sequence_key = Some(SequenceKey {
            prefix: "IMG_".to_string(),
            ordinal,
        });
        file
    }

    #[test]
    fn test_batch_order() {
        let batch = Batch::new(vec![
            MediaFile::new(PathBuf::from("b/DSCN0002.JPG")),
            keyed("z/IMG_0010.JPG", 10),
            MediaFile::new(PathBuf::from("a/DSCN0001.JPG")),
            keyed("a/IMG_0002.JPG", 2),
        ]);
        let names: Vec<&str> = batch.files().iter().map(|f| f.file_name()).collect();
        assert_eq!(names, ["IMG_0002.JPG", "IMG_0010.JPG", "DSCN0001.JPG", "DSCN0002.JPG"]);
    }

    #[test]
    fn test_from_candidates_skips_malformed() {
        let file = MediaFile::from_candidates(
            PathBuf::from("IMG_0001.JPG"),
            &["0000:00:00 00:00:00".to_string(), "2020:01:01 10:00:00".to_string()],
        );
        assert_eq!(file.raw_timestamp.unwrap().to_string(), "2020-01-01 10:00:00");

        let file = MediaFile::from_candidates(PathBuf::from("IMG_0002.JPG"), &["garbage".to_string()]);
        assert!(!file.is_anchored());
    }

    #[test]
    fn test_summary_counts_unresolved() {
        let batch = Batch::new(vec![keyed("IMG_0001.JPG", 1)]);
        assert_eq!(batch.summary().unresolved, 1);
    }
}
