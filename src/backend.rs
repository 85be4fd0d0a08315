use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::RouteError;

// --- Wire DTOs ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteQuery {
    pub start: String,
    pub end: String,
}

impl RouteQuery {
    pub fn new(start: &str, end: &str) -> Self {
        Self { start: start.to_string(), end: end.to_string() }
    }
}

/// `/route` payload. Missing or `null` fields default to an empty route and
/// a zero ETA instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RouteResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub best_route: Vec<String>,
    #[serde(default, deserialize_with = "eta")]
    pub best_eta: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub main_route: Vec<String>,
    #[serde(default, deserialize_with = "eta")]
    pub main_eta: f64,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadSegment {
    #[serde(default, deserialize_with = "nullable")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub start: String,
    #[serde(default, deserialize_with = "nullable")]
    pub end: String,
    #[serde(default, deserialize_with = "nullable")]
    pub coords: Vec<[f64; 2]>,
    #[serde(default, alias = "traffic", deserialize_with = "nullable")]
    pub congestion: f64,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub speed_kmph: Option<f64>,
    #[serde(default)]
    pub eta_min: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default)]
    pub coords: Option<[f64; 2]>,
    #[serde(default, deserialize_with = "nullable")]
    pub congestion: f64,
    #[serde(default)]
    pub eta_min: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrafficSnapshot {
    #[serde(default, deserialize_with = "nullable")]
    pub roads: Vec<RoadSegment>,
    #[serde(default, deserialize_with = "nullable")]
    pub hotspots: Vec<Hotspot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    #[serde(default, deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub city: String,
    #[serde(default)]
    pub coords: Option<[f64; 2]>,
}

#[derive(Debug, Default, Deserialize)]
struct HospitalList {
    #[serde(default, deserialize_with = "nullable")]
    hospitals: Vec<Hospital>,
}

#[derive(Debug, Default, Deserialize)]
struct RealRoute {
    #[serde(default, deserialize_with = "nullable")]
    points: Vec<[f64; 2]>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn eta<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let minutes: f64 = nullable(deserializer)?;
    Ok(minutes.max(0.0))
}

fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(n)) => n.to_string(),
        Some(RawId::Text(s)) => s,
        None => String::new(),
    })
}

// --- Backend seam ---

/// The part of the backend that route sessions and the poller depend on.
#[async_trait]
pub trait RouteBackend: Send + Sync {
    async fn route(&self, query: &RouteQuery) -> Result<RouteResponse, RouteError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RouteError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let res = self.client.get(&url).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &RouteQuery,
    ) -> Result<T, RouteError> {
        let url = self.url(path);
        debug!(%url, start = %body.start, end = %body.end, "POST");
        let res = self.client.post(&url).json(body).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn traffic(&self) -> Result<TrafficSnapshot, RouteError> {
        self.get_json("/traffic").await
    }

    pub async fn hospitals(&self) -> Result<Vec<Hospital>, RouteError> {
        let list: HospitalList = self.get_json("/hospitals").await?;
        Ok(list.hospitals)
    }

    /// Road-following geometry between two cities as `[lat, lon]` points.
    pub async fn real_route(&self, query: &RouteQuery) -> Result<Vec<[f64; 2]>, RouteError> {
        let real: RealRoute = self.post_json("/realroute", query).await?;
        Ok(real.points)
    }
}

#[async_trait]
impl RouteBackend for HttpBackend {
    async fn route(&self, query: &RouteQuery) -> Result<RouteResponse, RouteError> {
        self.post_json("/route", query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn route_response_defaults_missing_fields() {
        let res: RouteResponse = serde_json::from_value(json!({ "status": "ok" })).unwrap();
        assert!(res.best_route.is_empty());
        assert!(res.main_route.is_empty());
        assert_eq!(res.best_eta, 0.0);
        assert_eq!(res.main_eta, 0.0);
    }

    #[test]
    fn route_response_tolerates_nulls_and_negative_eta() {
        let res: RouteResponse = serde_json::from_value(json!({
            "best_route": null,
            "best_eta": null,
            "main_route": ["Dehradun", "Haridwar"],
            "main_eta": -4.0
        }))
        .unwrap();
        assert!(res.best_route.is_empty());
        assert_eq!(res.best_eta, 0.0);
        assert_eq!(res.main_route, vec!["Dehradun", "Haridwar"]);
        assert_eq!(res.main_eta, 0.0);
    }

    #[test]
    fn road_segment_accepts_traffic_alias() {
        let seg: RoadSegment = serde_json::from_value(json!({
            "id": 2,
            "start": "Rishikesh",
            "end": "Haridwar",
            "coords": [[30.0869, 78.2676], [29.9457, 78.1642]],
            "traffic": 64
        }))
        .unwrap();
        assert_eq!(seg.congestion, 64.0);
        assert_eq!(seg.coords.len(), 2);
        assert_eq!(seg.eta_min, None);
    }

    #[test]
    fn traffic_snapshot_without_hotspots() {
        let snap: TrafficSnapshot = serde_json::from_value(json!({
            "roads": [{ "id": 1, "start": "Dehradun", "end": "Rishikesh", "congestion": 12 }]
        }))
        .unwrap();
        assert_eq!(snap.roads.len(), 1);
        assert!(snap.hotspots.is_empty());
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        let list: HospitalList = serde_json::from_value(json!({
            "hospitals": [
                { "id": 7, "name": "AIIMS", "city": "Rishikesh", "coords": [30.07, 78.29] },
                { "id": "h-2", "name": "Doon Hospital", "city": "Dehradun", "coords": [30.32, 78.04] }
            ]
        }))
        .unwrap();
        assert_eq!(list.hospitals[0].id, "7");
        assert_eq!(list.hospitals[1].id, "h-2");

        let spot: Hotspot = serde_json::from_value(json!({ "id": "hs-3", "congestion": 70 })).unwrap();
        assert_eq!(spot.id, "hs-3");
        assert!(spot.coords.is_none());
    }

    #[test]
    fn partial_hospital_records_keep_the_list() {
        let list: HospitalList = serde_json::from_value(json!({
            "hospitals": [
                { "id": 1, "name": "AIIMS", "city": "Rishikesh", "coords": [30.07, 78.29] },
                { "id": 2, "name": "Base Hospital", "city": null, "coords": null },
                { "name": null, "coords": [29.94, 78.16] }
            ]
        }))
        .unwrap();
        assert_eq!(list.hospitals.len(), 3);
        assert_eq!(list.hospitals[0].coords, Some([30.07, 78.29]));
        assert_eq!(list.hospitals[1].city, "");
        assert!(list.hospitals[1].coords.is_none());
        assert_eq!(list.hospitals[2].id, "");
        assert_eq!(list.hospitals[2].name, "");
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let backend = HttpBackend::new("http://127.0.0.1:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.url("/route"), "http://127.0.0.1:8000/route");
    }
}
