use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use clap::{CommandFactory, Parser, ValueEnum};
use tracing::{info, warn};

use gpstag::{
    GeotagError, HourShift, TrackSet,
    actions::{Action, ExifTool},
    config::Config,
    metadata::capture_time,
    track::{location_history, logger},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum SourceFormat {
    /// Phone location history JSON (Google Takeout)
    #[default]
    Google,
    /// GPS logger CSV/TXT export
    Csv,
}

#[derive(Parser)]
#[command(name = "gpstag")]
#[command(about = "Add GPS coordinates from a location history or GPS logger track to photos")]
struct Args {
    /// Images to tag
    #[arg(value_name = "IMAGE")]
    images: Vec<Utf8PathBuf>,

    /// Location history JSON or logger CSV file
    #[arg(short, long)]
    location: Option<Utf8PathBuf>,

    /// Image whose capture time is used instead of each image's own, for
    /// photos taken at the same place on a day without a track
    #[arg(short, long = "ref", value_name = "IMAGE")]
    reference: Option<Utf8PathBuf>,

    /// Hour shift between camera and track, e.g. -1 for summer time
    #[arg(short, long, allow_negative_numbers = true)]
    shift: Option<f64>,

    /// Track source format
    #[arg(short, long, value_enum, default_value_t = SourceFormat::Google)]
    format: SourceFormat,

    /// Directory of logger CSV fragments to concatenate (csv format)
    #[arg(long)]
    directory: Option<Utf8PathBuf>,

    /// Print the match instead of writing it to the image
    #[arg(short, long)]
    display: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

enum Outcome {
    Done,
    Skipped,
}

fn main() -> Result<()> {
    let args = Args::parse();
    gpstag::init_logging(if args.verbose { "debug" } else { "warn" });

    if (args.location.is_none() && args.directory.is_none()) || args.images.is_empty() {
        Args::command().print_help()?;
        println!();
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let track = load_track(&args, &config)?;
    if track.is_empty() {
        return Err(GeotagError::EmptyTrackSet.into());
    }
    info!("loaded {} track records", track.len());

    let shift = args.shift.map(HourShift::from_user_option);

    let reference_time = match &args.reference {
        Some(reference) => Some(
            capture_time(reference)
                .with_context(|| format!("Failed to read capture time of reference {reference}"))?,
        ),
        None => None,
    };

    let action = if args.display {
        Action::Display
    } else {
        Action::Tag(ExifTool::from_config(&config))
    };

    let mut processed = 0;
    let mut skipped = 0;
    let mut errors = 0;

    for image in &args.images {
        match process_image(image, &track, shift, reference_time, &action, &config) {
            Ok(Outcome::Done) => processed += 1,
            Ok(Outcome::Skipped) => skipped += 1,
            Err(e) => {
                errors += 1;
                eprintln!("❌ Error processing {image}: {e:#}");
            }
        }
    }

    println!("\n🎉 Summary:");
    println!("   Images processed: {processed}");
    println!("   Skipped: {skipped}");
    println!("   Errors: {errors}");

    Ok(())
}

fn load_track(args: &Args, config: &Config) -> Result<TrackSet> {
    let track = match args.format {
        SourceFormat::Google => {
            let location = args
                .location
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--format google needs --location"))?;
            location_history::from_json_file(location, config.epoch_frame)
                .with_context(|| format!("Failed to load location history {location}"))?
        }
        SourceFormat::Csv => match (&args.directory, &args.location) {
            (Some(dir), _) => logger::from_directory(dir)
                .with_context(|| format!("Failed to load logger files from {dir}"))?,
            (None, Some(location)) => logger::from_csv_file(location)
                .with_context(|| format!("Failed to load logger file {location}"))?,
            (None, None) => anyhow::bail!("--format csv needs --location or --directory"),
        },
    };
    Ok(track)
}

fn is_image(path: &Utf8Path) -> bool {
    tree_magic_mini::from_filepath(path.as_std_path())
        .map(|mime| mime.starts_with("image/"))
        .unwrap_or(false)
}

fn process_image(
    image: &Utf8Path,
    track: &TrackSet,
    shift: Option<HourShift>,
    reference_time: Option<NaiveDateTime>,
    action: &Action,
    config: &Config,
) -> Result<Outcome> {
    if !image.is_file() {
        return Err(GeotagError::MissingInputFile(image.to_path_buf()).into());
    }
    if !is_image(image) {
        warn!("{image}: not an image, skipped");
        return Ok(Outcome::Skipped);
    }

    let taken = match reference_time {
        Some(taken) => taken,
        None => match capture_time(image) {
            Ok(taken) => taken,
            Err(e @ GeotagError::MissingExifTimestamp(_)) => {
                warn!("{e}, skipped");
                return Ok(Outcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        },
    };
    info!("{image}: taken {taken}");

    let matched = track.nearest(taken, shift)?;
    let gap = matched.displayed_gap(taken, shift, config.gap_accounting);

    if let Some(max) = config.max_gap_hours {
        if gap.abs() > max {
            warn!("{image}: diff {gap:.2} hours exceeds {max} hours, SKIP");
            return Ok(Outcome::Skipped);
        }
    }

    action.execute(image, matched.record, gap)?;
    Ok(Outcome::Done)
}
