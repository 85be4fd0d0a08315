use std::collections::HashSet;

use itertools::Itertools;

use crate::backend::RoadSegment;

/// An unordered pair of city names, stored in canonical (sorted) order so
/// that `(A, B)` and `(B, A)` hash and compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CityPair {
    low: String,
    high: String,
}

impl CityPair {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self { low: low.to_string(), high: high.to_string() }
    }
}

/// Consecutive city pairs of one route. Rebuilt whenever the route changes.
#[derive(Debug, Clone, Default)]
pub struct PairSet {
    pairs: HashSet<CityPair>,
}

impl PairSet {
    pub fn from_route<S: AsRef<str>>(route: &[S]) -> Self {
        let pairs = route
            .iter()
            .map(|city| city.as_ref())
            .tuple_windows()
            .map(|(a, b)| CityPair::new(a, b))
            .collect();
        Self { pairs }
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&CityPair::new(a, b))
    }

    pub fn matches(&self, segment: &RoadSegment) -> bool {
        self.contains(&segment.start, &segment.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: &str, end: &str) -> RoadSegment {
        RoadSegment {
            start: start.to_string(),
            end: end.to_string(),
            ..RoadSegment::default()
        }
    }

    #[test]
    fn three_city_route_yields_two_pairs() {
        let set = PairSet::from_route(&["A", "B", "C"]);
        assert_eq!(set.pairs.len(), 2);
        assert!(set.contains("A", "B"));
        assert!(set.contains("B", "C"));
        assert!(!set.contains("A", "C"));
    }

    #[test]
    fn matching_ignores_direction() {
        let set = PairSet::from_route(&["A", "B", "C"]);
        assert!(set.matches(&segment("B", "A")));
        assert!(set.matches(&segment("C", "B")));
        assert!(!set.matches(&segment("C", "A")));
    }

    #[test]
    fn short_routes_have_no_pairs() {
        assert!(PairSet::from_route(&["Dehradun"]).pairs.is_empty());
        assert!(PairSet::from_route::<&str>(&[]).pairs.is_empty());
    }

    #[test]
    fn canonical_pair_is_order_free() {
        assert_eq!(CityPair::new("Haridwar", "Dehradun"), CityPair::new("Dehradun", "Haridwar"));
        assert_eq!(CityPair::new("Haridwar", "Dehradun").low, "Dehradun");
    }
}
