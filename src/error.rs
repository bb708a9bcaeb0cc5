use std::io;
use std::path::PathBuf;

/// Per-file problems. None of these abort a batch; they are logged and
/// collected into the run report.
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    #[error("unreadable metadata in {}: {reason}", path.display())]
    UnreadableMetadata { path: PathBuf, reason: String },

    #[error("{} carries no sequence number, using fallback time", path.display())]
    UnparseableSequenceKey { path: PathBuf },

    #[error("destination {} already exists, skipped {}", dest.display(), path.display())]
    PlacementConflict { path: PathBuf, dest: PathBuf },

    #[error("failed to place {} at {}: {err}", path.display(), dest.display())]
    PlacementIo {
        path: PathBuf,
        dest: PathBuf,
        #[source]
        err: io::Error,
    },

    #[error("placed {} at {} but could not remove the source: {err}", path.display(), dest.display())]
    SourceNotRemoved {
        path: PathBuf,
        dest: PathBuf,
        #[source]
        err: io::Error,
    },
}

/// Failure reading embedded metadata from a single file.
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),

    #[error("ffprobe error: {0}")]
    Probe(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("filename prefix must not be empty")]
    EmptyPrefix,

    #[error("filename prefix {0:?} must not contain a path separator")]
    PrefixWithSeparator(String),

    #[error("ordinal digit count must be at least 1")]
    ZeroOrdinalDigits,
}
