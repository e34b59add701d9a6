/// Capture time lookup from EXIF data embedded in RAW files
///
/// RAW formats such as NEF are TIFF containers, so the EXIF reader can walk
/// them directly. Cameras disagree on where they store the date: the Exif
/// sub-IFD's DateTimeOriginal is preferred, IFD0's DateTime is the fallback.
use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::MetadataError;

/// Tags checked in priority order
const CAPTURE_TAGS: [Tag; 2] = [Tag::DateTimeOriginal, Tag::DateTime];

/// Best-effort capture time of a RAW file.
///
/// A missing timestamp is a normal outcome; read or parse failures are
/// logged and treated the same way.
pub fn capture_time(path: &Path) -> Option<NaiveDateTime> {
    match read_capture_time(path) {
        Ok(Some(captured_at)) => {
            debug!(path = %path.display(), %captured_at, "capture time");
            Some(captured_at)
        }
        Ok(None) => {
            debug!(path = %path.display(), "capture time not found in metadata");
            None
        }
        Err(MetadataError::Exif(exif::Error::NotFound(_))) => {
            debug!(path = %path.display(), "no EXIF data");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read metadata");
            None
        }
    }
}

fn read_capture_time(path: &Path) -> Result<Option<NaiveDateTime>, MetadataError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader)?;

    // An unusable value in one tag falls through to the next
    let mut malformed = None;
    for tag in CAPTURE_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        match parse_exif_datetime(&field.value) {
            Ok(captured_at) => return Ok(Some(captured_at)),
            Err(err) => {
                debug!(path = %path.display(), %tag, error = %err, "unusable capture time tag");
                malformed = Some(err);
            }
        }
    }

    malformed.map_or(Ok(None), Err)
}

/// EXIF dates are ASCII "YYYY:MM:DD HH:MM:SS"
fn parse_exif_datetime(value: &Value) -> Result<NaiveDateTime, MetadataError> {
    let Value::Ascii(parts) = value else {
        return Err(MetadataError::Malformed);
    };
    let raw = parts.first().ok_or(MetadataError::Malformed)?;
    let dt = exif::DateTime::from_ascii(raw)?;

    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())
        .and_then(|date| date.and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into()))
        .ok_or(MetadataError::Malformed)
}
