use std::collections::HashMap;

use lazy_static::lazy_static;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl City {
    /// `[lat, lon]`, the order the map layer expects.
    pub fn position(&self) -> [f64; 2] {
        [self.lat, self.lon]
    }
}

pub const DEFAULT_START: &str = "Dehradun";
pub const DEFAULT_END: &str = "Haridwar";

// Selection order of the start/end pickers.
static CITIES: [City; 7] = [
    City { name: "Dehradun", lat: 30.3165, lon: 78.0322 },
    City { name: "Rishikesh", lat: 30.0869, lon: 78.2676 },
    City { name: "Kotdwar", lat: 29.7919, lon: 78.5415 },
    City { name: "Haridwar", lat: 29.9457, lon: 78.1642 },
    City { name: "Haldwani", lat: 29.2183, lon: 79.5276 },
    City { name: "Nainital", lat: 29.3919, lon: 79.4549 },
    City { name: "Almora", lat: 29.5970, lon: 79.6591 },
];

lazy_static! {
    static ref BY_NAME: HashMap<&'static str, &'static City> =
        CITIES.iter().map(|city| (city.name, city)).collect();
}

pub fn lookup(name: &str) -> Option<&'static City> {
    BY_NAME.get(name).copied()
}
