pub mod exif;
pub mod video;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

use crate::error::MetadataError;

/// Source of raw creation-time strings for a file.
pub trait MetadataExtractor: Sync {
    /// Candidate timestamps in priority order. An empty list means the file
    /// carries no date; an error means the metadata could not be read.
    fn extract(&self, path: &Path) -> Result<Vec<String>, MetadataError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Classify a path by extension. `None` for anything that is not a photo or video.
pub fn media_kind(path: &Path) -> Option<MediaKind> {
    let is_mts = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mts"));
    if is_mts {
        return Some(MediaKind::Video);
    }

    let mime = mime_guess::from_path(path).first()?;
    if mime.type_() == mime_guess::mime::IMAGE {
        Some(MediaKind::Image)
    } else if mime.type_() == mime_guess::mime::VIDEO {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Reads EXIF from images and container tags (through ffprobe) from videos.
#[derive(Debug, Clone)]
pub struct ContainerExtractor {
    ffprobe: PathBuf,
}

impl Default for ContainerExtractor {
    fn default() -> Self {
        Self::new(PathBuf::from("ffprobe"))
    }
}

impl ContainerExtractor {
    pub fn new(ffprobe: PathBuf) -> Self {
        Self { ffprobe }
    }
}

impl MetadataExtractor for ContainerExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<String>, MetadataError> {
        match media_kind(path) {
            Some(MediaKind::Image) => exif::read_exif_dates(path),
            Some(MediaKind::Video) => video::probe_creation_times(&self.ffprobe, path),
            None => Ok(Vec::new()),
        }
    }
}

/// Parse a raw metadata timestamp.
///
/// EXIF values (`2020:01:01 10:00:00`) have no timezone and are taken as local
/// time as-is. Values carrying an offset or `Z` are converted to local time.
/// Returns `None` for blank, zeroed or otherwise malformed values.
pub fn parse_metadata_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim().trim_end_matches('\0').trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    // Drop sub-seconds and anything after them, normalise date separators
    let cleaned: String = s
        .chars()
        .take(19)
        .enumerate()
        .map(|(i, c)| match (i, c) {
            (0..=9, '-' | '/' | '\\' | '.') => ':',
            (10, 'T') => ' ',
            _ => c,
        })
        .collect();

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    let date_part = cleaned.split(' ').next()?;
    NaiveDate::parse_from_str(date_part, "%Y:%m:%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_exif_style() {
        assert_eq!(
            parse_metadata_timestamp("2020:01:01 10:00:00"),
            Some(naive("2020-01-01 10:00:00"))
        );
        assert_eq!(
            parse_metadata_timestamp("2020-01-01 10:00:00\0"),
            Some(naive("2020-01-01 10:00:00"))
        );
        assert_eq!(
            parse_metadata_timestamp("2020/01/01 10:00:00"),
            Some(naive("2020-01-01 10:00:00"))
        );
        assert_eq!(
            parse_metadata_timestamp("2020:01:01"),
            Some(naive("2020-01-01 00:00:00"))
        );
    }

    #[test]
    fn test_parse_iso_without_zone() {
        assert_eq!(
            parse_metadata_timestamp("2021-06-30T23:59:58.000000"),
            Some(naive("2021-06-30 23:59:58"))
        );
    }

    #[test]
    fn test_parse_zoned_converts_to_local() {
        let expected = DateTime::parse_from_rfc3339("2021-06-30T12:00:00Z")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parse_metadata_timestamp("2021-06-30T12:00:00.000000Z"), Some(expected));

        let expected = DateTime::parse_from_rfc3339("2021-06-30T12:00:00+02:00")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parse_metadata_timestamp("2021-06-30T12:00:00+0200"), Some(expected));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_metadata_timestamp(""), None);
        assert_eq!(parse_metadata_timestamp("0000:00:00 00:00:00"), None);
        assert_eq!(parse_metadata_timestamp("    :  :     :  :  "), None);
        assert_eq!(parse_metadata_timestamp("yesterday"), None);
        assert_eq!(parse_metadata_timestamp("2020:13:45 10:00:00"), None);
    }

    #[test]
    fn test_media_kind() {
        assert_eq!(media_kind(Path::new("IMG_0001.JPG")), Some(MediaKind::Image));
        assert_eq!(media_kind(Path::new("photo.png")), Some(MediaKind::Image));
        assert_eq!(media_kind(Path::new("IMG_0002.MOV")), Some(MediaKind::Video));
        assert_eq!(media_kind(Path::new("clip.mp4")), Some(MediaKind::Video));
        assert_eq!(media_kind(Path::new("00001.MTS")), Some(MediaKind::Video));
        assert_eq!(media_kind(Path::new("notes.txt")), None);
        assert_eq!(media_kind(Path::new("README")), None);
    }
}
