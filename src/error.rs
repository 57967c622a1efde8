use camino::Utf8PathBuf;
use thiserror::Error;

/// A single raw row or entry that could not be turned into a `TrackRecord`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("invalid value {value:?} for field `{field}`: {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },
    #[error("cannot split {0:?} into two-digit groups: odd length")]
    OddLength(String),
}

impl ParseError {
    pub fn invalid(field: &str, value: &str, reason: impl ToString) -> Self {
        ParseError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum GeotagError {
    #[error("no input files provided")]
    NoInputFiles,
    #[error("file not found: {0}")]
    MissingInputFile(Utf8PathBuf),
    #[error("unexpected header in {path}\nexpected: {expected}\ngot:      {got}")]
    HeaderMismatch {
        path: Utf8PathBuf,
        expected: String,
        got: String,
    },
    #[error("unrecognized track format (header: {0})")]
    UnrecognizedTrackFormat(String),
    #[error("ambiguous track format (header: {0})")]
    AmbiguousTrackFormat(String),
    #[error("track set is empty, nothing to match against")]
    EmptyTrackSet,
    #[error("no valid data rows found in input files")]
    NoValidData,
    #[error("no EXIF capture time in {0}")]
    MissingExifTimestamp(Utf8PathBuf),
    #[error("hour shift {0} moves the query outside the representable time range")]
    ShiftOutOfRange(f64),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("EXIF error: {0}")]
    Exif(#[from] nom_exif::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GeotagError>;
