// Track Module
// Normalized in-memory representation of GPS fixes coming from phone
// location history or hardware/app logger exports.

pub mod location_history;
pub mod logger;

use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use crate::error::ParseError;

lazy_static! {
    static ref HEMISPHERE_COORD: Regex =
        Regex::new(r"^([+-]?(?:\d+(?:\.\d*)?|\.\d+))\s*([NSEWnsew])$").unwrap();
}

/// Which coordinate a value belongs to. Decides which hemisphere letters are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::Latitude => "latitude",
            Axis::Longitude => "longitude",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'N' => Some(Hemisphere::North),
            'S' => Some(Hemisphere::South),
            'E' => Some(Hemisphere::East),
            'W' => Some(Hemisphere::West),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
            Hemisphere::East => 'E',
            Hemisphere::West => 'W',
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            Hemisphere::North | Hemisphere::South => Axis::Latitude,
            Hemisphere::East | Hemisphere::West => Axis::Longitude,
        }
    }

    fn is_negative(self) -> bool {
        matches!(self, Hemisphere::South | Hemisphere::West)
    }
}

/// A latitude or longitude as delivered by the source.
///
/// Phone history and app loggers give signed decimal degrees. Hardware
/// loggers give a magnitude followed by a hemisphere letter (`"40.7128N"`).
/// The shape is fixed at parse time so dispatch never has to sniff strings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coordinate {
    DecimalSigned(f64),
    HemisphereQualified(f64, Hemisphere),
}

impl Coordinate {
    pub fn parse(raw: &str, axis: Axis) -> Result<Self, ParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseError::MissingField(axis.name().to_string()));
        }

        if let Some(caps) = HEMISPHERE_COORD.captures(raw) {
            let magnitude: f64 = caps[1]
                .parse()
                .map_err(|e| ParseError::invalid(axis.name(), raw, e))?;
            let letter = caps[2].chars().next().unwrap_or_default();
            let hemisphere = Hemisphere::from_letter(letter)
                .filter(|h| h.axis() == axis)
                .ok_or_else(|| {
                    ParseError::invalid(axis.name(), raw, "hemisphere letter does not fit axis")
                })?;
            return Ok(Coordinate::HemisphereQualified(magnitude, hemisphere));
        }

        raw.parse::<f64>()
            .map(Coordinate::DecimalSigned)
            .map_err(|e| ParseError::invalid(axis.name(), raw, e))
    }

    /// Signed decimal degrees, south and west negative.
    pub fn signed(&self) -> f64 {
        match *self {
            Coordinate::DecimalSigned(value) => value,
            Coordinate::HemisphereQualified(magnitude, h) if h.is_negative() => -magnitude.abs(),
            Coordinate::HemisphereQualified(magnitude, _) => magnitude.abs(),
        }
    }

    pub fn hemisphere(&self) -> Option<Hemisphere> {
        match self {
            Coordinate::DecimalSigned(_) => None,
            Coordinate::HemisphereQualified(_, h) => Some(*h),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coordinate::DecimalSigned(value) => write!(f, "{value}"),
            Coordinate::HemisphereQualified(magnitude, h) => write!(f, "{magnitude}{}", h.letter()),
        }
    }
}

/// One GPS observation. Built once by a parser, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    /// Naive wall-clock time in the capture frame.
    pub timestamp: NaiveDateTime,
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
}

impl TrackRecord {
    pub fn new(timestamp: NaiveDateTime, latitude: Coordinate, longitude: Coordinate) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            heading: None,
        }
    }

    /// Both coordinates carry their own hemisphere letter.
    pub fn has_native_reference(&self) -> bool {
        self.latitude.hemisphere().is_some() && self.longitude.hemisphere().is_some()
    }
}

/// Chronologically sorted track, read-only once built.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    /// Sorted ascending by `timestamp`; equal timestamps keep input order.
    records: Vec<TrackRecord>,
}

impl TrackSet {
    pub fn new(mut records: Vec<TrackRecord>) -> Self {
        // stable: same-timestamp rows keep their input order
        records.sort_by_key(|r| r.timestamp);
        Self { records }
    }

    pub fn records(&self) -> &[TrackRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<TrackRecord> for TrackSet {
    fn from_iter<I: IntoIterator<Item = TrackRecord>>(iter: I) -> Self {
        TrackSet::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    pub(crate) fn record(ts: NaiveDateTime, lat: f64, lon: f64) -> TrackRecord {
        TrackRecord::new(
            ts,
            Coordinate::DecimalSigned(lat),
            Coordinate::DecimalSigned(lon),
        )
    }

    #[test]
    fn test_parse_decimal_coordinate() {
        assert_eq!(
            Coordinate::parse(" -33.8688 ", Axis::Latitude).unwrap(),
            Coordinate::DecimalSigned(-33.8688)
        );
    }

    #[test]
    fn test_parse_hemisphere_coordinate() {
        let lat = Coordinate::parse("40.7128N", Axis::Latitude).unwrap();
        assert_eq!(lat, Coordinate::HemisphereQualified(40.7128, Hemisphere::North));

        let lon = Coordinate::parse("74.0060W", Axis::Longitude).unwrap();
        assert_eq!(lon.hemisphere(), Some(Hemisphere::West));
        assert_eq!(lon.signed(), -74.006);
        assert_eq!(lon.to_string(), "74.006W");
    }

    #[test]
    fn test_hemisphere_letter_must_match_axis() {
        assert!(Coordinate::parse("40.7128E", Axis::Latitude).is_err());
        assert!(Coordinate::parse("74.0060N", Axis::Longitude).is_err());
    }

    #[test]
    fn test_parse_coordinate_rejects_garbage() {
        assert!(matches!(
            Coordinate::parse("", Axis::Latitude),
            Err(ParseError::MissingField(_))
        ));
        assert!(matches!(
            Coordinate::parse("north", Axis::Latitude),
            Err(ParseError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_native_reference_needs_both_axes() {
        let mut rec = record(at(10, 0, 0), 1.0, 2.0);
        assert!(!rec.has_native_reference());
        rec.latitude = Coordinate::HemisphereQualified(1.0, Hemisphere::South);
        assert!(!rec.has_native_reference());
        rec.longitude = Coordinate::HemisphereQualified(2.0, Hemisphere::East);
        assert!(rec.has_native_reference());
    }

    #[test]
    fn test_track_set_sort_is_stable() {
        let set = TrackSet::new(vec![
            record(at(11, 0, 0), 3.0, 3.0),
            record(at(10, 0, 0), 1.0, 1.0),
            record(at(11, 0, 0), 4.0, 4.0),
            record(NaiveDateTime::MAX, 9.0, 9.0),
            record(at(10, 30, 0), 2.0, 2.0),
        ]);
        let lats: Vec<f64> = set.records().iter().map(|r| r.latitude.signed()).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0, 4.0, 9.0]);
    }
}
