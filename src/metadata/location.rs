use reverse_geocoder::ReverseGeocoder;

lazy_static::lazy_static! {
    static ref GEOCODER: ReverseGeocoder = ReverseGeocoder::new();
}

/// Nearest populated place to a coordinate, for eyeballing a match.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub admin1: String,
    pub country_code: String,
}

impl std::fmt::Display for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.admin1.is_empty() {
            write!(f, "{}, {}", self.name, self.country_code)
        } else {
            write!(f, "{}, {}, {}", self.name, self.admin1, self.country_code)
        }
    }
}

pub fn reverse_geocode(latitude: f64, longitude: f64) -> Place {
    let result = GEOCODER.search((latitude, longitude));

    Place {
        name: result.record.name.clone(),
        admin1: result.record.admin1.clone(),
        country_code: result.record.cc.clone(),
    }
}
