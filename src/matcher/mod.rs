// Matcher Module
// Finds the track record closest in time to a photo, optionally correcting a
// known clock offset between the camera and the GPS source.

use chrono::{NaiveDateTime, SubsecRound, TimeDelta};

use crate::config::GapAccounting;
use crate::error::{GeotagError, Result};
use crate::track::{TrackRecord, TrackSet};

const MICROS_PER_HOUR: f64 = 3_600_000_000.0;

/// Clock correction applied to track timestamps before matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourShift(f64);

impl HourShift {
    /// Shift applied to the track directly, in fractional hours.
    pub fn from_hours(hours: f64) -> Self {
        HourShift(hours)
    }

    /// The `--shift` option describes the camera-side correction, so the
    /// engine applies it with the opposite sign.
    pub fn from_user_option(user_hours: f64) -> Self {
        HourShift(-user_hours)
    }

    pub fn hours(self) -> f64 {
        self.0
    }

    /// Rounded to the microsecond.
    pub fn as_delta(self) -> TimeDelta {
        TimeDelta::microseconds((self.0 * MICROS_PER_HOUR).round() as i64)
    }
}

/// The chosen record and its absolute distance to the query, ignoring any shift.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    pub record: &'a TrackRecord,
    pub gap_hours: f64,
}

impl MatchResult<'_> {
    /// Gap reported to the user.
    ///
    /// `Double` subtracts the engine shift from the unshifted gap, `Single`
    /// reports the residual left after the shift was applied for matching.
    pub fn displayed_gap(&self, query: NaiveDateTime, shift: Option<HourShift>, accounting: GapAccounting) -> f64 {
        let Some(shift) = shift else {
            return self.gap_hours;
        };
        match accounting {
            GapAccounting::Double => self.gap_hours - shift.hours(),
            GapAccounting::Single => self
                .record
                .timestamp
                .checked_add_signed(shift.as_delta())
                .map(|shifted| time_diff_hours(shifted, query))
                .unwrap_or(f64::INFINITY),
        }
    }
}

/// Absolute difference in hours, both sides truncated to whole seconds.
pub fn time_diff_hours(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    let seconds = a
        .trunc_subsecs(0)
        .signed_duration_since(b.trunc_subsecs(0))
        .num_seconds()
        .unsigned_abs();
    seconds as f64 / 3600.0
}

// |(r + s) - q| == |r - (q - s)|, so the shift moves the query instead of every record.
fn target(query: NaiveDateTime, shift: Option<HourShift>) -> Result<NaiveDateTime> {
    match shift {
        None => Ok(query),
        Some(s) => query
            .checked_sub_signed(s.as_delta())
            .ok_or(GeotagError::ShiftOutOfRange(s.hours())),
    }
}

fn distance(record: &TrackRecord, target: NaiveDateTime) -> TimeDelta {
    record.timestamp.signed_duration_since(target).abs()
}

/// Reference scan: the first record, in iteration order, with the smallest
/// distance to the shifted query.
pub fn nearest_linear<'a>(
    records: &'a [TrackRecord],
    query: NaiveDateTime,
    shift: Option<HourShift>,
) -> Result<&'a TrackRecord> {
    let target = target(query, shift)?;
    let mut best: Option<(&TrackRecord, TimeDelta)> = None;

    for record in records {
        let d = distance(record, target);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((record, d)),
        }
    }

    best.map(|(record, _)| record)
        .ok_or(GeotagError::EmptyTrackSet)
}

impl TrackSet {
    /// Nearest record to `query` after applying `shift` to the track.
    ///
    /// Binary search over the sorted records; ties resolve exactly as
    /// `nearest_linear` does, to the earliest record in order.
    pub fn nearest(&self, query: NaiveDateTime, shift: Option<HourShift>) -> Result<MatchResult<'_>> {
        let records = self.records();
        if records.is_empty() {
            return Err(GeotagError::EmptyTrackSet);
        }
        let target = target(query, shift)?;

        // first record at or after the target
        let after = records.partition_point(|r| r.timestamp < target);

        // earliest record sharing the timestamp of the one just before the target
        let before = after.checked_sub(1).map(|i| {
            let ts = records[i].timestamp;
            records[..i].partition_point(|r| r.timestamp < ts)
        });

        let index = match (before, records.get(after)) {
            (Some(b), Some(a)) if distance(a, target) < distance(&records[b], target) => after,
            (Some(b), _) => b,
            (None, _) => after,
        };

        let record = &records[index];
        Ok(MatchResult {
            record,
            gap_hours: time_diff_hours(record.timestamp, query),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::{at, record};
    use chrono::NaiveDate;

    fn create_test_track() -> TrackSet {
        TrackSet::new(vec![
            record(at(10, 0, 0), 1.0, 1.0),
            record(at(10, 30, 0), 2.0, 2.0),
            record(at(11, 0, 0), 3.0, 3.0),
        ])
    }

    fn lat(r: &TrackRecord) -> f64 {
        r.latitude.signed()
    }

    #[test]
    fn test_nearest_between() {
        let track = create_test_track();
        let m = track.nearest(at(10, 20, 0), None).unwrap();
        assert_eq!(lat(m.record), 2.0);
        assert!((m.gap_hours - 10.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_exact() {
        let track = create_test_track();
        let m = track.nearest(at(11, 0, 0), None).unwrap();
        assert_eq!(lat(m.record), 3.0);
        assert_eq!(m.gap_hours, 0.0);
    }

    #[test]
    fn test_nearest_outside_range() {
        let track = create_test_track();
        assert_eq!(lat(track.nearest(at(6, 0, 0), None).unwrap().record), 1.0);

        let m = track.nearest(at(13, 0, 0), None).unwrap();
        assert_eq!(lat(m.record), 3.0);
        assert_eq!(m.gap_hours, 2.0);
    }

    #[test]
    fn test_tie_goes_to_earlier_record() {
        let track = create_test_track();
        let m = track.nearest(at(10, 15, 0), None).unwrap();
        assert_eq!(lat(m.record), 1.0);
    }

    #[test]
    fn test_tie_with_duplicate_timestamps_goes_to_first_in_order() {
        let track = TrackSet::new(vec![
            record(at(10, 0, 0), 1.0, 1.0),
            record(at(10, 0, 0), 2.0, 2.0),
            record(at(10, 20, 0), 3.0, 3.0),
            record(at(10, 20, 0), 4.0, 4.0),
        ]);
        assert_eq!(lat(track.nearest(at(10, 5, 0), None).unwrap().record), 1.0);
        assert_eq!(lat(track.nearest(at(10, 10, 0), None).unwrap().record), 1.0);
        assert_eq!(lat(track.nearest(at(10, 15, 0), None).unwrap().record), 3.0);
        assert_eq!(lat(track.nearest(at(10, 20, 0), None).unwrap().record), 3.0);
    }

    #[test]
    fn test_empty_track_set() {
        let track = TrackSet::default();
        assert!(matches!(
            track.nearest(at(10, 0, 0), None),
            Err(GeotagError::EmptyTrackSet)
        ));
        assert!(matches!(
            nearest_linear(&[], at(10, 0, 0), None),
            Err(GeotagError::EmptyTrackSet)
        ));
    }

    #[test]
    fn test_single_record() {
        let track = TrackSet::new(vec![record(at(10, 0, 0), 7.0, 7.0)]);
        assert_eq!(lat(track.nearest(at(1, 0, 0), None).unwrap().record), 7.0);
        assert_eq!(lat(track.nearest(at(23, 0, 0), None).unwrap().record), 7.0);
    }

    #[test]
    fn test_shift_moves_track_not_query() {
        let track = create_test_track();
        // logger clock one hour behind: 10:00 on the track is 11:00 on the camera
        let shift = HourShift::from_hours(1.0);
        let m = track.nearest(at(11, 25, 0), Some(shift)).unwrap();
        assert_eq!(lat(m.record), 2.0);
        // gap is measured from the unshifted record time
        assert!((m.gap_hours - 55.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_user_shift_is_negated() {
        assert_eq!(HourShift::from_user_option(-1.0).hours(), 1.0);
        assert_eq!(HourShift::from_user_option(2.5).hours(), -2.5);
        assert_eq!(HourShift::from_hours(0.5).as_delta(), TimeDelta::minutes(30));
    }

    #[test]
    fn test_shift_equals_offset_track() {
        let base = create_test_track();
        let shift = HourShift::from_hours(-0.75);
        let offset: TrackSet = base
            .records()
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.timestamp += shift.as_delta();
                r
            })
            .collect();

        for minute in (0..240).step_by(7) {
            let q = at(8, 0, 0) + TimeDelta::minutes(minute);
            let shifted = base.nearest(q, Some(shift)).unwrap();
            let plain = offset.nearest(q, None).unwrap();
            assert_eq!(lat(shifted.record), lat(plain.record), "query {q}");
        }
    }

    #[test]
    fn test_binary_search_agrees_with_linear_scan() {
        let times = [
            at(9, 0, 0),
            at(9, 0, 0),
            at(9, 10, 30),
            at(9, 11, 0),
            at(9, 40, 0),
            at(9, 40, 0),
            at(10, 20, 0),
            NaiveDateTime::MAX,
        ];
        let track: TrackSet = times
            .iter()
            .enumerate()
            .map(|(i, t)| record(*t, i as f64, 0.0))
            .collect();

        for shift in [None, Some(HourShift::from_hours(0.25)), Some(HourShift::from_hours(-1.5))] {
            for second in (0..3 * 3600).step_by(45) {
                let q = at(8, 30, 0) + TimeDelta::seconds(second);
                let fast = track.nearest(q, shift).unwrap().record;
                let slow = nearest_linear(track.records(), q, shift).unwrap();
                assert!(std::ptr::eq(fast, slow), "query {q} shift {shift:?}");
            }
        }
    }

    #[test]
    fn test_sentinel_records_never_win_over_real_ones() {
        let track = TrackSet::new(vec![
            record(NaiveDateTime::MAX, 9.0, 9.0),
            record(at(10, 0, 0), 1.0, 1.0),
        ]);
        let q = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(lat(track.nearest(q, None).unwrap().record), 1.0);
    }

    #[test]
    fn test_time_diff_truncates_subseconds() {
        let a = at(10, 0, 0) + TimeDelta::milliseconds(900);
        let b = at(11, 0, 0) + TimeDelta::milliseconds(100);
        assert_eq!(time_diff_hours(a, b), 1.0);
        assert_eq!(time_diff_hours(b, a), 1.0);
    }

    #[test]
    fn test_displayed_gap_accounting() {
        let track = create_test_track();
        let query = at(11, 25, 0);
        let shift = Some(HourShift::from_user_option(-1.0));
        let m = track.nearest(query, shift).unwrap();

        let double = m.displayed_gap(query, shift, GapAccounting::Double);
        assert!((double - (55.0 / 60.0 - 1.0)).abs() < 1e-12);

        let single = m.displayed_gap(query, shift, GapAccounting::Single);
        assert!((single - 5.0 / 60.0).abs() < 1e-12);

        let plain = track.nearest(query, None).unwrap();
        assert_eq!(
            plain.displayed_gap(query, None, GapAccounting::Double),
            plain.gap_hours
        );
    }
}
