use anyhow::{Context, Result};
use camino::Utf8Path;
use std::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::metadata::reverse_geocode;
use crate::track::TrackRecord;

/// What to do with a photo once its track record is known.
#[derive(Debug, Clone)]
pub enum Action {
    /// Write the coordinates into the photo with the external metadata writer.
    Tag(ExifTool),
    /// Print the match for manual verification, touching nothing.
    Display,
}

impl Action {
    pub fn execute(&self, image: &Utf8Path, record: &TrackRecord, gap_hours: f64) -> Result<()> {
        match self {
            Action::Tag(tool) => tool.write(image, record),
            Action::Display => {
                print!("{}", render_display(image, record, gap_hours, true));
                Ok(())
            }
        }
    }
}

/// GPS tag arguments for one record.
///
/// Records whose coordinates both carry a hemisphere letter get explicit
/// `Ref` tags; everything else is written as signed values and the writer
/// infers the hemisphere.
pub fn gps_args(record: &TrackRecord) -> Vec<String> {
    let mut args = match (record.latitude.hemisphere(), record.longitude.hemisphere()) {
        (Some(lat_ref), Some(lon_ref)) => vec![
            format!("-GPSLatitude={}", record.latitude.signed().abs()),
            format!("-GPSLatitudeRef={}", lat_ref.letter()),
            format!("-GPSLongitude={}", record.longitude.signed().abs()),
            format!("-GPSLongitudeRef={}", lon_ref.letter()),
        ],
        _ => vec![
            format!("-GPSLatitude*={}", record.latitude.signed()),
            format!("-GPSLongitude*={}", record.longitude.signed()),
        ],
    };
    if let Some(altitude) = record.altitude {
        args.push(format!("-GPSAltitude*={altitude}"));
    }
    args
}

/// Invocation of the external metadata writer.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: String,
    leading_args: Vec<String>,
}

impl ExifTool {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.exiftool.clone(), config.exiftool_args.clone())
    }

    pub fn command_args(&self, image: &Utf8Path, record: &TrackRecord) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend(gps_args(record));
        args.push(image.to_string());
        args
    }

    /// Runs the writer and waits for it; a non-zero exit is an error.
    pub fn write(&self, image: &Utf8Path, record: &TrackRecord) -> Result<()> {
        let args = self.command_args(image, record);
        debug!("running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} failed on {}: {}", self.program, image, stderr.trim());
        }

        Ok(())
    }
}

/// Human-readable match report with a wiki `{{location}}` snippet.
pub fn render_display(image: &Utf8Path, record: &TrackRecord, gap_hours: f64, with_place: bool) -> String {
    let altitude = record
        .altitude
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut out = String::new();
    out.push_str(&format!("{image}\n"));
    out.push_str(&format!("diff {gap_hours:.2} hours\n"));
    out.push_str(&format!("date: {}\n", record.timestamp));
    out.push_str(&format!("lat: {}\n", record.latitude));
    out.push_str(&format!("long: {}\n", record.longitude));
    out.push_str(&format!("alt: {altitude}\n"));
    if with_place {
        let place = reverse_geocode(record.latitude.signed(), record.longitude.signed());
        out.push_str(&format!("place: {place}\n"));
    }
    out.push_str(&format!(
        "wiki: {{{{location|{}|{}}}}}\n",
        record.latitude, record.longitude
    ));
    out.push_str(&"-".repeat(30));
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::{at, record};
    use crate::track::{Coordinate, Hemisphere};

    fn columbus_record() -> TrackRecord {
        let mut rec = record(at(9, 0, 0), 0.0, 0.0);
        rec.latitude = Coordinate::HemisphereQualified(50.06, Hemisphere::North);
        rec.longitude = Coordinate::HemisphereQualified(19.93, Hemisphere::West);
        rec.altitude = Some(210.0);
        rec
    }

    #[test]
    fn test_gps_args_with_native_reference() {
        assert_eq!(
            gps_args(&columbus_record()),
            vec![
                "-GPSLatitude=50.06",
                "-GPSLatitudeRef=N",
                "-GPSLongitude=19.93",
                "-GPSLongitudeRef=W",
                "-GPSAltitude*=210",
            ]
        );
    }

    #[test]
    fn test_gps_args_signed_decimal() {
        let mut rec = record(at(9, 0, 0), -33.8688, 151.2093);
        rec.altitude = Some(12.5);
        assert_eq!(
            gps_args(&rec),
            vec![
                "-GPSLatitude*=-33.8688",
                "-GPSLongitude*=151.2093",
                "-GPSAltitude*=12.5",
            ]
        );
    }

    #[test]
    fn test_gps_args_mixed_reference_uses_signed_fields() {
        let mut rec = record(at(9, 0, 0), 0.0, 19.93);
        rec.latitude = Coordinate::HemisphereQualified(50.06, Hemisphere::South);
        assert_eq!(
            gps_args(&rec),
            vec!["-GPSLatitude*=-50.06", "-GPSLongitude*=19.93"]
        );
    }

    #[test]
    fn test_command_args_layout() {
        let tool = ExifTool::new("exiftool", vec!["-m".to_string()]);
        let args = tool.command_args(Utf8Path::new("img/a.jpg"), &record(at(9, 0, 0), 1.5, 2.5));
        assert_eq!(
            args,
            vec!["-m", "-GPSLatitude*=1.5", "-GPSLongitude*=2.5", "img/a.jpg"]
        );
    }

    #[test]
    fn test_write_reports_missing_program() {
        let tool = ExifTool::new("/nonexistent/exiftool-binary", vec![]);
        let result = tool.write(Utf8Path::new("a.jpg"), &record(at(9, 0, 0), 1.0, 1.0));
        assert!(result.is_err());
    }

    #[test]
    fn test_render_display() {
        let text = render_display(Utf8Path::new("a.jpg"), &columbus_record(), 1.0 / 6.0, false);
        assert_eq!(
            text,
            "a.jpg\n\
             diff 0.17 hours\n\
             date: 2020-06-01 09:00:00\n\
             lat: 50.06N\n\
             long: 19.93W\n\
             alt: 210\n\
             wiki: {{location|50.06N|19.93W}}\n\
             ------------------------------\n"
        );
    }
}
