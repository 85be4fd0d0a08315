use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::backend::{Hospital, HttpBackend, RoadSegment, RouteQuery, TrafficSnapshot};
use crate::city;
use crate::config::MAPTILER_ATTRIBUTION;
use crate::geometry::{Boundary, BoundaryCache, LatLngBounds};
use crate::segments::PairSet;
use crate::session::SessionSnapshot;
use crate::traffic::{Band, route_band};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
}

impl PathStyle {
    fn banded(band: Band, weight: f64, opacity: f64) -> Self {
        Self {
            color: band.color().to_string(),
            weight,
            opacity,
            fill_opacity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polyline {
    pub positions: Vec<[f64; 2]>,
    pub band: Band,
    pub style: PathStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadLine {
    pub id: u64,
    pub name: String,
    pub on_route: bool,
    pub line: Polyline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: [f64; 2],
    pub icon: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayer {
    pub url: String,
    pub attribution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryLayer {
    pub geojson: Value,
    pub style: PathStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub band: Band,
    pub color: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapScene {
    pub tiles: Option<TileLayer>,
    pub boundary: Option<BoundaryLayer>,
    pub roads: Vec<RoadLine>,
    pub route: Option<Polyline>,
    pub markers: Vec<Marker>,
    pub fit_bounds: Option<LatLngBounds>,
    pub legend: Vec<LegendEntry>,
}

pub fn legend() -> Vec<LegendEntry> {
    Band::ALL
        .iter()
        .map(|&band| LegendEntry { band, color: band.color(), label: band.label() })
        .collect()
}

/// Reference data behind the map. Each layer is loaded independently and
/// stays empty if its source fails.
#[derive(Default)]
pub struct MapView {
    pub traffic: TrafficSnapshot,
    pub hospitals: Vec<Hospital>,
    pub boundary: Option<Arc<Boundary>>,
    pub real_route: Vec<[f64; 2]>,
    pub tile_url: Option<String>,
}

impl MapView {
    pub async fn load(
        backend: &HttpBackend,
        boundaries: &BoundaryCache,
        boundary_path: &Path,
        tile_url: Option<String>,
    ) -> Self {
        let (traffic, hospitals, boundary) = tokio::join!(
            backend.traffic(),
            backend.hospitals(),
            boundaries.get_or_load(boundary_path),
        );

        let traffic = traffic.unwrap_or_else(|err| {
            warn!(error = %err, "traffic snapshot unavailable");
            TrafficSnapshot::default()
        });
        let hospitals = hospitals.unwrap_or_else(|err| {
            warn!(error = %err, "hospital list unavailable");
            Vec::new()
        });
        let boundary = boundary
            .map_err(|err| warn!(error = %err, "boundary unavailable"))
            .ok();

        info!(
            roads = traffic.roads.len(),
            hotspots = traffic.hotspots.len(),
            hospitals = hospitals.len(),
            boundary = boundary.is_some(),
            "map reference data loaded"
        );

        Self {
            traffic,
            hospitals,
            boundary,
            real_route: Vec::new(),
            tile_url,
        }
    }

    pub async fn refresh_traffic(&mut self, backend: &HttpBackend) {
        match backend.traffic().await {
            Ok(traffic) => self.traffic = traffic,
            Err(err) => warn!(error = %err, "keeping previous traffic snapshot"),
        }
    }

    /// Fetch road geometry between the first and last city of `route`.
    pub async fn refresh_real_route(&mut self, backend: &HttpBackend, route: &[String]) {
        let [first, .., last] = route else {
            self.real_route.clear();
            return;
        };
        match backend.real_route(&RouteQuery::new(first, last)).await {
            Ok(points) => self.real_route = points,
            Err(err) => {
                warn!(start = %first, end = %last, error = %err, "real route unavailable");
                self.real_route.clear();
            }
        }
    }

    pub fn scene(&self, session: &SessionSnapshot) -> MapScene {
        let best = session.routes.best_route.as_slice();
        let on_route = PairSet::from_route(best);
        let roads = self
            .traffic
            .roads
            .iter()
            .map(|seg| road_line(seg, on_route.matches(seg)))
            .collect();

        let route = (self.real_route.len() > 1).then(|| {
            let band = route_band(best, &self.traffic.roads);
            Polyline {
                positions: self.real_route.clone(),
                band,
                style: PathStyle::banded(band, 7.0, 0.9),
            }
        });

        let mut markers = Vec::new();
        let endpoints = match best {
            [] => vec![],
            [only] => vec![only],
            [first, .., last] => vec![first, last],
        };
        for name in endpoints {
            if let Some(city) = city::lookup(name) {
                markers.push(Marker {
                    position: city.position(),
                    icon: "pin".to_string(),
                    popup: Some(city.name.to_string()),
                });
            }
        }
        markers.extend(self.hospitals.iter().filter_map(|h| {
            Some(Marker {
                position: h.coords?,
                icon: "hospital".to_string(),
                popup: Some(format!("{} ({})", h.name, h.city)),
            })
        }));
        markers.extend(self.traffic.hotspots.iter().filter_map(|spot| {
            let band = Band::classify(spot.congestion);
            let eta = spot.eta_min.map(|m| format!(", ETA {} min", m)).unwrap_or_default();
            Some(Marker {
                position: spot.coords?,
                icon: format!("hotspot-{}", band.as_str()),
                popup: Some(format!("{}: {}% congestion{}", spot.name, spot.congestion, eta)),
            })
        }));

        let fit_bounds = LatLngBounds::of_points(&self.real_route)
            .or_else(|| self.boundary.as_ref().and_then(|b| b.bounds()));

        MapScene {
            tiles: self.tile_url.clone().map(|url| TileLayer {
                url,
                attribution: MAPTILER_ATTRIBUTION.to_string(),
            }),
            boundary: self.boundary.as_ref().map(|b| BoundaryLayer {
                geojson: b.geojson().clone(),
                style: PathStyle {
                    color: "#0066ff".to_string(),
                    weight: 2.0,
                    opacity: 1.0,
                    fill_opacity: Some(0.02),
                },
            }),
            roads,
            route,
            markers,
            fit_bounds,
            legend: legend(),
        }
    }
}

fn road_line(seg: &RoadSegment, on_route: bool) -> RoadLine {
    let band = Band::classify(seg.congestion);
    RoadLine {
        id: seg.id,
        name: seg.name.clone(),
        on_route,
        line: Polyline {
            positions: seg.coords.clone(),
            band,
            style: PathStyle::banded(band, if on_route { 6.0 } else { 3.0 }, 0.8),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Hotspot;
    use crate::session::Routes;
    use serde_json::json;

    fn road(id: u64, start: &str, end: &str, congestion: f64) -> RoadSegment {
        let a = city::lookup(start).unwrap().position();
        let b = city::lookup(end).unwrap().position();
        RoadSegment {
            id,
            name: format!("{} - {}", start, end),
            start: start.to_string(),
            end: end.to_string(),
            coords: vec![a, b],
            congestion,
            ..RoadSegment::default()
        }
    }

    fn snapshot(best: &[&str]) -> SessionSnapshot {
        SessionSnapshot {
            start: best.first().unwrap_or(&"").to_string(),
            end: best.last().unwrap_or(&"").to_string(),
            routes: Routes {
                best_route: best.iter().map(|s| s.to_string()).collect(),
                best_eta: 45.0,
                main_route: Vec::new(),
                main_eta: 0.0,
            },
            auto_reroute: false,
        }
    }

    fn view() -> MapView {
        MapView {
            traffic: TrafficSnapshot {
                roads: vec![
                    road(1, "Dehradun", "Rishikesh", 12.0),
                    road(2, "Rishikesh", "Haridwar", 55.0),
                    road(8, "Dehradun", "Haridwar", 90.0),
                ],
                hotspots: vec![Hotspot {
                    id: "hs-8".to_string(),
                    name: "Dehradun - Haridwar (Direct)".to_string(),
                    coords: Some([29.9457, 78.1642]),
                    congestion: 90.0,
                    eta_min: Some(12.0),
                }],
            },
            hospitals: vec![Hospital {
                id: "1".to_string(),
                name: "AIIMS".to_string(),
                city: "Rishikesh".to_string(),
                coords: Some([30.07, 78.29]),
            }],
            real_route: vec![[30.3165, 78.0322], [30.0869, 78.2676], [29.9457, 78.1642]],
            ..MapView::default()
        }
    }

    #[test]
    fn route_is_colored_by_worst_matched_segment() {
        let scene = view().scene(&snapshot(&["Dehradun", "Rishikesh", "Haridwar"]));
        let route = scene.route.unwrap();
        assert_eq!(route.band, Band::Heavy);
        assert_eq!(route.style.color, "orange");
        assert_eq!(route.style.weight, 7.0);
        assert_eq!(route.style.opacity, 0.9);
    }

    #[test]
    fn on_route_segments_are_highlighted() {
        let scene = view().scene(&snapshot(&["Haridwar", "Rishikesh", "Dehradun"]));
        let on_route: Vec<_> = scene.roads.iter().filter(|r| r.on_route).map(|r| r.id).collect();
        assert_eq!(on_route, vec![1, 2]);
        let direct = scene.roads.iter().find(|r| r.id == 8).unwrap();
        assert_eq!(direct.line.style.color, "red");
        assert_eq!(direct.line.style.weight, 3.0);
    }

    #[test]
    fn markers_for_endpoints_hospitals_and_hotspots() {
        let scene = view().scene(&snapshot(&["Dehradun", "Rishikesh", "Haridwar"]));
        let icons: Vec<_> = scene.markers.iter().map(|m| m.icon.as_str()).collect();
        assert_eq!(icons, ["pin", "pin", "hospital", "hotspot-severe"]);
        assert_eq!(scene.markers[0].position, [30.3165, 78.0322]);
        assert_eq!(scene.markers[1].position, [29.9457, 78.1642]);
        assert_eq!(scene.markers[2].popup.as_deref(), Some("AIIMS (Rishikesh)"));
    }

    #[test]
    fn hospitals_without_coords_get_no_marker() {
        let mut v = view();
        v.hospitals.push(Hospital {
            id: "2".to_string(),
            name: "Base Hospital".to_string(),
            ..Hospital::default()
        });
        let scene = v.scene(&snapshot(&["Dehradun", "Rishikesh", "Haridwar"]));
        let hospitals = scene.markers.iter().filter(|m| m.icon == "hospital").count();
        assert_eq!(hospitals, 1);
    }

    #[test]
    fn no_route_means_no_polyline_or_pins() {
        let mut v = view();
        v.real_route.clear();
        let scene = v.scene(&snapshot(&[]));
        assert!(scene.route.is_none());
        assert!(scene.markers.iter().all(|m| m.icon != "pin"));
        assert!(scene.fit_bounds.is_none());
    }

    #[test]
    fn fit_falls_back_to_boundary() {
        let mut v = view();
        v.real_route.clear();
        v.boundary = Some(Arc::new(Boundary::from_geojson(&json!({
            "type": "Polygon",
            "coordinates": [[[77.5, 28.7], [81.1, 28.7], [81.1, 31.5], [77.5, 28.7]]]
        }))));
        let scene = v.scene(&snapshot(&["Dehradun", "Haridwar"]));
        let bounds = scene.fit_bounds.unwrap();
        assert_eq!(bounds.south_west, [28.7, 77.5]);
        assert_eq!(bounds.north_east, [31.5, 81.1]);
        assert_eq!(scene.boundary.unwrap().style.fill_opacity, Some(0.02));
    }

    #[test]
    fn legend_lists_four_bands() {
        let labels: Vec<_> = legend().iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            ["Low Traffic", "Moderate Traffic", "Heavy Traffic", "Severe Traffic"]
        );
    }

    #[test]
    fn scene_serializes() {
        let scene = view().scene(&snapshot(&["Dehradun", "Haridwar"]));
        let json = serde_json::to_value(&scene).unwrap();
        assert_eq!(json["route"]["band"], "severe");
        assert!(json["tiles"].is_null());
    }
}
