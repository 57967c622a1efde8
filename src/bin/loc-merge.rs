use camino::Utf8PathBuf;
use clap::Parser;
use std::io;
use std::process::ExitCode;

use gpstag::merge::merge_and_sort;

#[derive(Parser)]
#[command(name = "loc-merge")]
#[command(
    about = "Merge multiple GPS CSV/TXT files and sort by date time (handles formats with/without milliseconds)."
)]
struct Args {
    /// One or more input CSV/TXT files to merge
    #[arg(value_name = "FILE", required = true)]
    files: Vec<Utf8PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    gpstag::init_logging("warn");

    let stdout = io::stdout();
    match merge_and_sort(&args.files, stdout.lock()) {
        Ok(report) => {
            tracing::debug!(
                "merged {} rows with {} warnings",
                report.rows,
                report.warnings.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
