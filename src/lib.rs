pub mod actions;
pub mod config;
pub mod error;
pub mod matcher;
pub mod merge;
pub mod metadata;
pub mod track;

pub use error::{GeotagError, ParseError};
pub use matcher::{HourShift, MatchResult};
pub use track::{Coordinate, Hemisphere, TrackRecord, TrackSet};

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// Logs to stderr; `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}
