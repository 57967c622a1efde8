// Logger Module
// Parses CSV/TXT exports of GPS loggers: the Android "GPS Logger" app and
// Columbus V-1000 style hardware loggers.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Axis, Coordinate, TrackRecord, TrackSet};
use crate::error::{GeotagError, ParseError, Result};

/// Naive formats tried, in order, for free-form logger timestamps.
const FREE_FORM_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
    "%Y%m%dT%H%M%S",
    "%d.%m.%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%d %b %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
];

const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S%.f%z"];

const DATE_ONLY_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];

/// The CSV layouts we know how to read, resolved once per file or batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSchema {
    /// Android GPS Logger app: `type, date time, latitude, longitude, ..., altitude(m), ...`
    AppLogger,
    /// Columbus V-1000: `INDEX, TAG, DATE, TIME, LATITUDE N/S, LONGITUDE E/W, HEIGHT, ..., HEADING`
    HardwareLogger,
}

impl TrackSchema {
    pub fn detect(headers: &StringRecord) -> Result<Self> {
        let has = |key: &str| headers.iter().any(|h| clean(h) == key);

        let hardware = has("INDEX") && has("TAG");
        let app = has("type") && has("date time");

        match (hardware, app) {
            (true, false) => Ok(TrackSchema::HardwareLogger),
            (false, true) => Ok(TrackSchema::AppLogger),
            (true, true) => Err(GeotagError::AmbiguousTrackFormat(join(headers))),
            (false, false) => Err(GeotagError::UnrecognizedTrackFormat(join(headers))),
        }
    }

    fn latitude_key(self) -> &'static str {
        match self {
            TrackSchema::AppLogger => "latitude",
            TrackSchema::HardwareLogger => "LATITUDE N/S",
        }
    }

    fn longitude_key(self) -> &'static str {
        match self {
            TrackSchema::AppLogger => "longitude",
            TrackSchema::HardwareLogger => "LONGITUDE E/W",
        }
    }

    fn altitude_key(self) -> &'static str {
        match self {
            TrackSchema::AppLogger => "altitude(m)",
            TrackSchema::HardwareLogger => "HEIGHT",
        }
    }

    pub fn parse_timestamp(self, row: &Row<'_>) -> std::result::Result<NaiveDateTime, ParseError> {
        match self {
            TrackSchema::AppLogger => {
                let raw = row.required("date time")?;
                parse_free_form(raw)
                    .ok_or_else(|| ParseError::invalid("date time", raw, "unrecognized date format"))
            }
            TrackSchema::HardwareLogger => {
                hardware_datetime(row.required("DATE")?, row.required("TIME")?)
            }
        }
    }

    /// Everything except the timestamp, which is left at `NaiveDateTime::MAX`.
    pub fn parse_position(self, row: &Row<'_>) -> std::result::Result<TrackRecord, ParseError> {
        let latitude = Coordinate::parse(row.required(self.latitude_key())?, Axis::Latitude)?;
        let longitude = Coordinate::parse(row.required(self.longitude_key())?, Axis::Longitude)?;

        let mut record = TrackRecord::new(NaiveDateTime::MAX, latitude, longitude);
        record.altitude = row.optional_f64(self.altitude_key())?;
        if self == TrackSchema::HardwareLogger {
            record.heading = row.optional_f64("HEADING")?;
        }
        Ok(record)
    }

    pub fn parse_row(self, row: &Row<'_>) -> std::result::Result<TrackRecord, ParseError> {
        let mut record = self.parse_position(row)?;
        record.timestamp = self.parse_timestamp(row)?;
        Ok(record)
    }
}

/// Column lookup shared by all rows of one batch.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    columns: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(headers: &StringRecord) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (clean(h).to_string(), i))
            .collect();
        Self { columns }
    }

    pub fn row<'a>(&'a self, record: &'a StringRecord) -> Row<'a> {
        Row {
            index: self,
            record,
        }
    }
}

/// One CSV data row addressed by column name.
pub struct Row<'a> {
    index: &'a HeaderIndex,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    pub fn get(&self, key: &str) -> Option<&'a str> {
        let i = *self.index.columns.get(key)?;
        self.record.get(i).map(clean).filter(|v| !v.is_empty())
    }

    pub fn required(&self, key: &str) -> std::result::Result<&'a str, ParseError> {
        self.get(key)
            .ok_or_else(|| ParseError::MissingField(key.to_string()))
    }

    pub fn optional_f64(&self, key: &str) -> std::result::Result<Option<f64>, ParseError> {
        self.get(key)
            .map(|v| v.parse::<f64>().map_err(|e| ParseError::invalid(key, v, e)))
            .transpose()
    }
}

// Hardware loggers pad fields with NULs as well as spaces.
fn clean(field: &str) -> &str {
    field.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

fn join(headers: &StringRecord) -> String {
    headers.iter().map(clean).collect::<Vec<_>>().join(", ")
}

/// Splits a digit string into two-character groups joined by `separator`.
///
/// `"060115"` with `"-"` gives `"06-01-15"`. Odd lengths cannot be paired.
pub fn pair_digits(digits: &str, separator: &str) -> std::result::Result<String, ParseError> {
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(ParseError::OddLength(digits.to_string()));
    }
    let groups: Vec<&str> = (0..digits.len() / 2)
        .map(|i| &digits[i * 2..i * 2 + 2])
        .collect();
    Ok(groups.join(separator))
}

/// Rebuilds a timestamp from hardware logger `DATE` (`YYMMDD`) and `TIME` (`HHMMSS`) fields.
pub fn hardware_datetime(date: &str, time: &str) -> std::result::Result<NaiveDateTime, ParseError> {
    let text = format!("20{} {}", pair_digits(date, "-")?, pair_digits(time, ":")?);
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| ParseError::invalid("DATE", &format!("{date} {time}"), e))
}

/// Lenient date-time parsing for app logger exports.
///
/// Zoned inputs keep the wall-clock time as written; the offset is dropped.
pub fn parse_free_form(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in FREE_FORM_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DATE_ONLY_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// Parses a batch of rows that share one header, pushing the results to `out`.
///
/// Rows whose timestamp cannot be read are kept at `NaiveDateTime::MAX` so they
/// sort last; rows with any other broken field are skipped. Both are logged.
pub fn parse_rows<I>(schema: TrackSchema, index: &HeaderIndex, rows: I, origin: &Utf8Path, out: &mut Vec<TrackRecord>)
where
    I: IntoIterator<Item = (u64, StringRecord)>,
{
    for (line, record) in rows {
        let row = index.row(&record);
        let mut parsed = match schema.parse_position(&row) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{origin} (line {line}): skipping row: {e}");
                continue;
            }
        };
        match schema.parse_timestamp(&row) {
            Ok(ts) => parsed.timestamp = ts,
            Err(e) => warn!("{origin} (line {line}): {e}; placing row at the end"),
        }
        out.push(parsed);
    }
}

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.flexible(true).has_headers(true);
    builder
}

fn read_rows<R: Read>(reader: &mut csv::Reader<R>, origin: &Utf8Path) -> Result<Vec<(u64, StringRecord)>> {
    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                rows.push((line, record));
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => warn!("{origin}: skipping unreadable row: {e}"),
        }
    }
    Ok(rows)
}

/// Parses one CSV document, detecting its schema from the header.
pub fn from_csv_reader<R: Read>(input: R, origin: &Utf8Path) -> Result<TrackSet> {
    let mut reader = reader_builder().from_reader(input);
    let headers = reader.headers()?.clone();
    let schema = TrackSchema::detect(&headers)?;
    debug!("{origin}: detected {schema:?}");

    let index = HeaderIndex::new(&headers);
    let rows = read_rows(&mut reader, origin)?;
    let mut records = Vec::with_capacity(rows.len());
    parse_rows(schema, &index, rows, origin, &mut records);
    Ok(TrackSet::new(records))
}

pub fn from_csv_file(path: &Utf8Path) -> Result<TrackSet> {
    if !path.is_file() {
        return Err(GeotagError::MissingInputFile(path.to_path_buf()));
    }
    from_csv_reader(File::open(path)?, path)
}

fn directory_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    if !dir.is_dir() {
        return Err(GeotagError::MissingInputFile(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| GeotagError::Io(e.into()))?;
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => files.push(path),
            Err(path) => warn!("skipping non-UTF8 path: {}", path.display()),
        }
    }
    Ok(files)
}

/// Concatenates every logger file in `dir` (by file name order) into one track.
///
/// The first non-empty file fixes the header and the schema; later files with a
/// different header are skipped with a warning.
pub fn from_directory(dir: &Utf8Path) -> Result<TrackSet> {
    let mut batch: Option<(StringRecord, TrackSchema, HeaderIndex)> = None;
    let mut records = Vec::new();

    for path in directory_files(dir)? {
        let mut reader = reader_builder().from_path(&path)?;
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            warn!("Empty file skipped: {path}");
            continue;
        }

        match &batch {
            Some((accepted, _, _)) if join(accepted) != join(&headers) => {
                warn!("Skipping {path} due to mismatched header");
                continue;
            }
            Some(_) => {}
            None => {
                let schema = TrackSchema::detect(&headers)?;
                debug!("{path}: detected {schema:?} for directory {dir}");
                let index = HeaderIndex::new(&headers);
                batch = Some((headers, schema, index));
            }
        }

        if let Some((_, schema, index)) = &batch {
            let rows = read_rows(&mut reader, &path)?;
            parse_rows(*schema, index, rows, &path, &mut records);
        }
    }

    Ok(TrackSet::new(records))
}
