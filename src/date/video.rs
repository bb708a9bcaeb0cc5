use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::error::MetadataError;

/// QuickTime tag written by iOS, carries local time with offset
const APPLE_CREATION_DATE: &str = "com.apple.quicktime.creationdate";
const CREATION_TIME: &str = "creation_time";

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeSection>,
    #[serde(default)]
    streams: Vec<ProbeSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeSection {
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Run ffprobe on a video and collect its creation-time tags.
pub fn probe_creation_times(ffprobe: &Path, path: &Path) -> Result<Vec<String>, MetadataError> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()?;

    if !output.status.success() {
        return Err(MetadataError::Probe(format!(
            "{} exited with {}",
            ffprobe.display(),
            output.status
        )));
    }

    parse_probe_output(&output.stdout)
}

/// Creation-time candidates from ffprobe JSON: the Apple tag, the container
/// tag, then each stream's tag.
pub fn parse_probe_output(json: &[u8]) -> Result<Vec<String>, MetadataError> {
    let probe: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| MetadataError::Probe(e.to_string()))?;

    let format_tags = probe.format.map(|f| f.tags).unwrap_or_default();
    let mut candidates = Vec::new();
    for key in [APPLE_CREATION_DATE, CREATION_TIME] {
        if let Some(value) = format_tags.get(key) {
            candidates.push(value.clone());
        }
    }
    for stream in &probe.streams {
        if let Some(value) = stream.tags.get(CREATION_TIME) {
            if !candidates.contains(value) {
                candidates.push(value.clone());
            }
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_priority() {
        let json = br#"{
            "streams": [
                {"index": 0, "codec_type": "video", "tags": {"creation_time": "2020-01-01T09:00:00.000000Z"}},
                {"index": 1, "codec_type": "audio", "tags": {"creation_time": "2020-01-01T09:00:01.000000Z"}}
            ],
            "format": {
                "filename": "IMG_0002.MOV",
                "tags": {
                    "creation_time": "2020-01-01T09:00:00.000000Z",
                    "com.apple.quicktime.creationdate": "2020-01-01T10:00:00+0100"
                }
            }
        }"#;
        let candidates = parse_probe_output(json).unwrap();
        assert_eq!(
            candidates,
            vec![
                "2020-01-01T10:00:00+0100".to_string(),
                "2020-01-01T09:00:00.000000Z".to_string(),
                "2020-01-01T09:00:01.000000Z".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_probe_output_without_tags() {
        let json = br#"{"streams": [{"index": 0}], "format": {"filename": "clip.mp4"}}"#;
        assert!(parse_probe_output(json).unwrap().is_empty());
        assert!(parse_probe_output(b"{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_probe_output_rejects_garbage() {
        assert!(matches!(parse_probe_output(b"not json"), Err(MetadataError::Probe(_))));
    }

    #[test]
    fn test_missing_ffprobe_is_an_error() {
        let result = probe_creation_times(
            Path::new("/nonexistent/ffprobe-binary"),
            Path::new("IMG_0001.MOV"),
        );
        assert!(matches!(result, Err(MetadataError::Io(_))));
    }
}
