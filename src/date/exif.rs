use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::Path;

use exif::{In, Reader, Tag, Value};

use crate::error::MetadataError;

/// Date tags in priority order.
const DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Raw EXIF date strings from an image file. A file without an EXIF block
/// yields an empty list rather than an error.
pub fn read_exif_dates(path: &Path) -> Result<Vec<String>, MetadataError> {
    let file = File::open(path)?;
    read_dates(&mut BufReader::new(file))
}

pub(crate) fn read_dates<R: BufRead + Seek>(reader: &mut R) -> Result<Vec<String>, MetadataError> {
    let exif = match Reader::new().read_from_container(reader) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let dates = DATE_TAGS
        .iter()
        .filter_map(|tag| exif.get_field(*tag, In::PRIMARY))
        .filter_map(|field| match &field.value {
            Value::Ascii(parts) => parts
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            _ => Some(field.display_value().to_string()),
        })
        .collect();
    Ok(dates)
}
