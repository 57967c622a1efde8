use camino::Utf8Path;
use chrono::NaiveDateTime;
use nom_exif::{EntryValue, ExifIter, ExifTag, MediaParser, MediaSource};
use std::io::ErrorKind;
use tracing::debug;

use crate::error::{GeotagError, Result};

/// Wall-clock capture time of a photo, read from EXIF `DateTimeOriginal`.
pub fn capture_time(path: &Utf8Path) -> Result<NaiveDateTime> {
    if !path.is_file() {
        return Err(GeotagError::MissingInputFile(path.to_path_buf()));
    }

    let mut parser = MediaParser::new();
    let ms = MediaSource::file_path(path.as_std_path())?;
    if !ms.has_exif() {
        return Err(GeotagError::MissingExifTimestamp(path.to_path_buf()));
    }

    // A JPEG without an APP1 segment, or with a truncated one, only shows up
    // as a parse failure here
    let iter = match parser.parse::<_, _, ExifIter>(ms) {
        Ok(iter) => iter,
        Err(nom_exif::Error::ParseFailed(e)) => {
            debug!("{path}: no usable EXIF block: {e}");
            return Err(GeotagError::MissingExifTimestamp(path.to_path_buf()));
        }
        Err(nom_exif::Error::IOError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
            debug!("{path}: EXIF block cut short");
            return Err(GeotagError::MissingExifTimestamp(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    for mut entry in iter.into_iter() {
        if !matches!(entry.tag(), Some(ExifTag::DateTimeOriginal)) {
            continue;
        }
        if let Ok(value) = entry.take_result() {
            debug!("{path}: DateTimeOriginal = {value:?}");
            if let Some(dt) = entry_datetime(&value) {
                return Ok(dt);
            }
        }
    }

    Err(GeotagError::MissingExifTimestamp(path.to_path_buf()))
}

fn entry_datetime(value: &EntryValue) -> Option<NaiveDateTime> {
    if let Some(time) = value.as_time() {
        // keep the camera's wall clock, drop the offset
        return Some(time.naive_local());
    }
    if let Some(text) = value.as_str() {
        return parse_exif_datetime(text);
    }

    // Offset-less times only show up through the debug representation
    let debug_str = format!("{value:?}");
    debug_str
        .strip_prefix("NaiveDateTime(")
        .and_then(|s| s.strip_suffix(')'))
        .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
}

/// EXIF datetime format: "YYYY:MM:DD HH:MM:SS"
pub fn parse_exif_datetime(datetime_str: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(datetime_str.trim_end_matches('\0').trim(), "%Y:%m:%d %H:%M:%S").ok()
}
