pub mod extractor;
pub mod location;

pub use extractor::capture_time;
pub use location::{Place, reverse_geocode};
