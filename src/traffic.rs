use serde::Serialize;

use crate::backend::RoadSegment;
use crate::segments::PairSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Low,
    Moderate,
    Heavy,
    Severe,
}

/// Band used when a route cannot be matched against the traffic snapshot.
pub const UNMATCHED_ROUTE_BAND: Band = Band::Severe;

impl Band {
    pub const ALL: [Band; 4] = [Band::Low, Band::Moderate, Band::Heavy, Band::Severe];

    pub fn classify(value: f64) -> Band {
        if value < 20.0 {
            Band::Low
        } else if value < 50.0 {
            Band::Moderate
        } else if value < 80.0 {
            Band::Heavy
        } else {
            Band::Severe
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Band::Low => "green",
            Band::Moderate => "yellow",
            Band::Heavy => "orange",
            Band::Severe => "red",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Low => "Low Traffic",
            Band::Moderate => "Moderate Traffic",
            Band::Heavy => "Heavy Traffic",
            Band::Severe => "Severe Traffic",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Band::Low => "low",
            Band::Moderate => "moderate",
            Band::Heavy => "heavy",
            Band::Severe => "severe",
        }
    }
}

/// Highest congestion among the segments that lie on `route`, if any do.
pub fn route_congestion<S: AsRef<str>>(route: &[S], roads: &[RoadSegment]) -> Option<f64> {
    let pairs = PairSet::from_route(route);
    roads
        .iter()
        .filter(|seg| pairs.matches(seg))
        .map(|seg| seg.congestion)
        .reduce(f64::max)
}

pub fn route_band<S: AsRef<str>>(route: &[S], roads: &[RoadSegment]) -> Band {
    route_congestion(route, roads).map_or(UNMATCHED_ROUTE_BAND, Band::classify)
}
