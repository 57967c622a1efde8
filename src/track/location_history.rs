// Location History Module
// Parses phone location-history exports (Google Takeout "Records.json") into a TrackSet.

use camino::Utf8Path;
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{debug, warn};

use super::{Coordinate, TrackRecord, TrackSet};
use crate::config::EpochFrame;
use crate::error::{GeotagError, ParseError, Result};

const E7: f64 = 1e7;

#[derive(Deserialize)]
#[serde(untagged)]
enum EpochMs {
    Int(i64),
    Str(String),
}

// Deserializes a millisecond timestamp given either as a JSON string or number.
fn parse_epoch_ms<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match EpochMs::deserialize(deserializer)? {
        EpochMs::Int(ms) => Ok(ms),
        EpochMs::Str(s) => s.trim().parse::<i64>().map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
struct TakeoutRoot {
    locations: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutLocation {
    #[serde(deserialize_with = "parse_epoch_ms")]
    timestamp_ms: i64,
    latitude_e7: i64,
    longitude_e7: i64,
    altitude: Option<f64>,
}

/// Converts epoch milliseconds into naive wall-clock time in the given frame.
pub fn epoch_ms_to_naive(ms: i64, frame: EpochFrame) -> Option<NaiveDateTime> {
    match frame {
        EpochFrame::Utc => Utc.timestamp_millis_opt(ms).single().map(|t| t.naive_utc()),
        EpochFrame::Local => Local
            .timestamp_millis_opt(ms)
            .single()
            .map(|t| t.naive_local()),
    }
}

/// Turns one raw `locations[]` entry into a record.
pub fn parse_entry(entry: serde_json::Value, frame: EpochFrame) -> std::result::Result<TrackRecord, ParseError> {
    let loc: TakeoutLocation = serde_json::from_value(entry)
        .map_err(|e| ParseError::invalid("locations[]", "entry", e))?;

    let timestamp = epoch_ms_to_naive(loc.timestamp_ms, frame).ok_or_else(|| {
        ParseError::invalid("timestampMs", &loc.timestamp_ms.to_string(), "out of range")
    })?;

    Ok(TrackRecord {
        timestamp,
        latitude: Coordinate::DecimalSigned(loc.latitude_e7 as f64 / E7),
        longitude: Coordinate::DecimalSigned(loc.longitude_e7 as f64 / E7),
        altitude: loc.altitude,
        heading: None,
    })
}

/// Loads location history from any reader holding the JSON document.
pub fn from_reader<R: Read>(reader: R, frame: EpochFrame, origin: &Utf8Path) -> Result<TrackSet> {
    let root: TakeoutRoot = serde_json::from_reader(reader)?;
    let total = root.locations.len();

    let mut records = Vec::with_capacity(total);
    for (index, entry) in root.locations.into_iter().enumerate() {
        match parse_entry(entry, frame) {
            Ok(record) => records.push(record),
            Err(e) => warn!("{origin}: skipping locations[{index}]: {e}"),
        }
    }

    debug!("{origin}: {} of {total} location entries usable", records.len());
    Ok(TrackSet::new(records))
}

/// Loads location history from a Google Takeout JSON file.
pub fn from_json_file(path: &Utf8Path, frame: EpochFrame) -> Result<TrackSet> {
    if !path.is_file() {
        return Err(GeotagError::MissingInputFile(path.to_path_buf()));
    }
    let file = File::open(path)?;
    from_reader(BufReader::new(file), frame, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_from_json_file_ok() {
        let history = from_json_file(
            Utf8Path::new("test_data/location_history.json"),
            EpochFrame::Utc,
        )
        .unwrap();

        // 4 usable entries, one entry without latitudeE7 is skipped
        assert_eq!(history.len(), 4);

        let timestamps: Vec<i64> = history
            .records()
            .iter()
            .map(|r| r.timestamp.and_utc().timestamp_millis())
            .collect();
        assert_eq!(
            timestamps,
            vec![1420070400000, 1420072200000, 1420074000000, 1420075800000]
        );

        let first = &history.records()[0];
        assert_eq!(first.latitude, Coordinate::DecimalSigned(52.2296756));
        assert_eq!(first.longitude, Coordinate::DecimalSigned(21.0122287));
        assert_eq!(first.altitude, None);
        assert_eq!(history.records()[1].altitude, Some(110.0));
    }

    #[test]
    fn test_from_json_file_not_found() {
        let result = from_json_file(
            Utf8Path::new("test_data/non_existent_file.json"),
            EpochFrame::Utc,
        );
        assert!(matches!(result, Err(GeotagError::MissingInputFile(_))));
    }

    #[test]
    fn test_from_json_file_malformed() {
        let result = from_json_file(Utf8Path::new("test_data/malformed.json"), EpochFrame::Utc);
        assert!(matches!(result, Err(GeotagError::Json(_))));
    }

    #[test]
    fn test_parse_entry_scales_e7() {
        let entry = serde_json::json!({
            "timestampMs": 1000,
            "latitudeE7": -338688000,
            "longitudeE7": 1512093000
        });
        let rec = parse_entry(entry, EpochFrame::Utc).unwrap();
        assert_eq!(rec.latitude.signed(), -33.8688);
        assert_eq!(rec.longitude.signed(), 151.2093);
        assert_eq!(
            rec.timestamp,
            NaiveDate::from_ymd_opt(1970, 1, 1)
                .unwrap()
                .and_hms_milli_opt(0, 0, 1, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_entry_reports_bad_timestamp() {
        let entry = serde_json::json!({
            "timestampMs": "soon",
            "latitudeE7": 1,
            "longitudeE7": 1
        });
        assert!(parse_entry(entry, EpochFrame::Utc).is_err());
    }

    #[test]
    fn test_from_reader_empty_locations() {
        let json = br#"{"locations": []}"#;
        let set = from_reader(&json[..], EpochFrame::Utc, Utf8Path::new("mem")).unwrap();
        assert!(set.is_empty());
    }
}
