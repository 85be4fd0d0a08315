use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail};

use crate::city::{DEFAULT_END, DEFAULT_START};
use crate::poller::PollerConfig;

pub const MAPTILER_ATTRIBUTION: &str = "&copy; MapTiler";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub maptiler_key: Option<String>,
    pub boundary_path: PathBuf,
    pub poll_interval: Duration,
    pub reroute_threshold: f64,
    pub request_timeout: Duration,
    pub start_city: String,
    pub end_city: String,
    pub auto_reroute: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let poll_ms: u64 = parse(&get, "POLL_INTERVAL_MS", 20_000)?;
        if poll_ms == 0 {
            bail!("POLL_INTERVAL_MS must be greater than zero");
        }

        let reroute_threshold: f64 = parse(&get, "REROUTE_THRESHOLD", 0.9)?;
        if !(reroute_threshold > 0.0 && reroute_threshold <= 1.0) {
            bail!("REROUTE_THRESHOLD must be in (0, 1], got {}", reroute_threshold);
        }

        let auto_reroute = match get("AUTO_REROUTE").as_deref().map(str::trim) {
            None => false,
            Some("1") | Some("true") | Some("TRUE") | Some("yes") => true,
            Some("0") | Some("false") | Some("FALSE") | Some("no") => false,
            Some(other) => bail!("invalid AUTO_REROUTE value: {}", other),
        };

        Ok(Config {
            backend_url: get("BACKEND_URL").unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            maptiler_key: get("MAPTILER_KEY"),
            boundary_path: get("BOUNDARY_PATH")
                .unwrap_or_else(|| "assets/Uttarakhand.geojson".to_string())
                .into(),
            poll_interval: Duration::from_millis(poll_ms),
            reroute_threshold,
            request_timeout: Duration::from_millis(parse(&get, "REQUEST_TIMEOUT_MS", 10_000)?),
            start_city: get("START_CITY").unwrap_or_else(|| DEFAULT_START.to_string()),
            end_city: get("END_CITY").unwrap_or_else(|| DEFAULT_END.to_string()),
            auto_reroute,
        })
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            threshold: self.reroute_threshold,
        }
    }

    /// Raster tile URL template, if a tile key is configured.
    pub fn tile_url(&self) -> Option<String> {
        self.maptiler_key.as_ref().map(|key| {
            format!("https://api.maptiler.com/maps/basic/{{z}}/{{x}}/{{y}}.png?key={}", key)
        })
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {} value {:?}: {}", key, raw, e)),
    }
}
