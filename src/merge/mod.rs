// Merge Module
// Concatenates GPS Logger CSV/TXT exports that share one fixed header and
// writes a single chronologically sorted CSV.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use csv::{Position, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::fmt;
use std::fs;
use std::io::Write;
use tracing::{debug, warn};

use crate::error::{GeotagError, Result};

pub const EXPECTED_HEADER: [&str; 13] = [
    "type",
    "date time",
    "latitude",
    "longitude",
    "accuracy(m)",
    "altitude(m)",
    "geoid_height(m)",
    "speed(m/s)",
    "bearing(deg)",
    "sat_used",
    "sat_inview",
    "name",
    "desc",
];

/// Tried in order; the first one that parses wins.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
const MAX_FRACTION_DIGITS: usize = 6;

/// A recoverable problem: the input was skipped or demoted, not lost silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeWarning {
    EmptyFile(Utf8PathBuf),
    HeaderMismatch(Utf8PathBuf),
    MalformedRow { path: Utf8PathBuf, line: u64, fields: usize },
    UnparseableDate { path: Utf8PathBuf, line: u64, value: String },
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeWarning::EmptyFile(path) => write!(f, "Empty file skipped: {path}"),
            MergeWarning::HeaderMismatch(path) => {
                write!(f, "Skipping {path} due to mismatched header")
            }
            MergeWarning::MalformedRow { path, line, fields } => write!(
                f,
                "Skipping malformed row in {path} (line {line}): {fields} fields"
            ),
            MergeWarning::UnparseableDate { path, line, value } => {
                write!(f, "Unparseable date in {path} (line {line}): '{value}'")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub rows: usize,
    pub warnings: Vec<MergeWarning>,
}

impl MergeReport {
    fn warn(&mut self, warning: MergeWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }
}

/// Parses the `date time` column, with or without fractional seconds.
///
/// Fractions are limited to microseconds; longer ones do not parse.
pub fn parse_row_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value
        .rsplit_once('.')
        .is_some_and(|(_, fraction)| fraction.len() > MAX_FRACTION_DIGITS)
    {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Line where the next read starts, and how many blank lines it will skip.
fn blank_lines_at(data: &[u8], position: &Position) -> (u64, u64) {
    let mut at = usize::try_from(position.byte()).unwrap_or(data.len()).min(data.len());
    let mut line = position.line();

    // a CRLF terminator leaves its '\n' for the next read
    if at > 0 && data[at - 1] == b'\r' && data.get(at) == Some(&b'\n') {
        at += 1;
        line += 1;
    }

    let mut blank = 0;
    loop {
        let rest = &data[at..];
        let len = if rest.starts_with(b"\r\n") {
            2
        } else if rest.starts_with(b"\n") {
            1
        } else {
            break;
        };
        at += len;
        blank += 1;
    }
    (line, blank)
}

fn header_matches(header: &StringRecord) -> bool {
    header.iter().map(str::trim).eq(EXPECTED_HEADER.iter().copied())
}

fn joined(fields: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    fields
        .into_iter()
        .map(|f| f.as_ref().trim().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

struct Collected {
    at: NaiveDateTime,
    row: StringRecord,
}

/// Reads all `files`, sorts their rows by date and writes the result to `out`.
///
/// Nothing is written unless every fatal check passes: all files exist, the
/// first non-empty file has exactly the expected header, and at least one row
/// survived. Everything else is skipped, recorded in the report and logged.
pub fn merge_and_sort<P, W>(files: &[P], out: W) -> Result<MergeReport>
where
    P: AsRef<Utf8Path>,
    W: Write,
{
    if files.is_empty() {
        return Err(GeotagError::NoInputFiles);
    }

    let mut report = MergeReport::default();
    let mut collected: Vec<Collected> = Vec::new();
    let mut first_file = true;

    for path in files {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(GeotagError::MissingInputFile(path.to_path_buf()));
        }

        let data = fs::read(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data.as_slice());
        let mut record = StringRecord::new();

        if !reader.read_record(&mut record)? {
            report.warn(MergeWarning::EmptyFile(path.to_path_buf()));
            continue;
        }

        if !header_matches(&record) {
            if first_file {
                return Err(GeotagError::HeaderMismatch {
                    path: path.to_path_buf(),
                    expected: joined(EXPECTED_HEADER),
                    got: joined(record.iter()),
                });
            }
            report.warn(MergeWarning::HeaderMismatch(path.to_path_buf()));
            continue;
        }
        first_file = false;

        loop {
            // the reader drops blank lines silently; count them from the raw bytes
            let (mut line, blank) = blank_lines_at(&data, reader.position());
            let more = reader.read_record(&mut record)?;
            for _ in 0..blank {
                report.warn(MergeWarning::MalformedRow {
                    path: path.to_path_buf(),
                    line,
                    fields: 0,
                });
                line += 1;
            }
            if !more {
                break;
            }

            if record.len() != EXPECTED_HEADER.len() {
                report.warn(MergeWarning::MalformedRow {
                    path: path.to_path_buf(),
                    line,
                    fields: record.len(),
                });
                continue;
            }

            let row: StringRecord = record.iter().map(str::trim).collect();
            let at = match parse_row_datetime(&row[1]) {
                Some(at) => at,
                None => {
                    report.warn(MergeWarning::UnparseableDate {
                        path: path.to_path_buf(),
                        line,
                        value: row[1].to_string(),
                    });
                    NaiveDateTime::MAX
                }
            };
            collected.push(Collected { at, row });
        }
        debug!("{path}: {} rows collected so far", collected.len());
    }

    if collected.is_empty() {
        return Err(GeotagError::NoValidData);
    }

    // stable: rows with equal timestamps keep their input order
    collected.sort_by_key(|c| c.at);

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(out);
    writer.write_record(EXPECTED_HEADER)?;
    for c in &collected {
        writer.write_record(&c.row)?;
    }
    writer.flush()?;

    report.rows = collected.len();
    Ok(report)
}
