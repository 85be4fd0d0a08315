use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::backend::{RouteBackend, RouteQuery, RouteResponse};
use crate::error::RouteError;

const REROUTE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Routes {
    pub best_route: Vec<String>,
    pub best_eta: f64,
    pub main_route: Vec<String>,
    pub main_eta: f64,
}

impl Routes {
    /// A usable best route: at least one city and a positive ETA.
    pub fn has_best(&self) -> bool {
        !self.best_route.is_empty() && self.best_eta > 0.0
    }
}

impl From<RouteResponse> for Routes {
    fn from(res: RouteResponse) -> Self {
        Self {
            best_route: res.best_route,
            best_eta: res.best_eta,
            main_route: res.main_route,
            main_eta: res.main_eta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub start: String,
    pub end: String,
    pub routes: Routes,
    pub auto_reroute: bool,
}

/// What the poller needs to decide between idling and polling.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionControl {
    pub start: String,
    pub end: String,
    pub auto_reroute: bool,
    pub has_route: bool,
}

impl SessionControl {
    pub fn wants_polling(&self) -> bool {
        self.auto_reroute && self.has_route
    }

    pub fn same_pair(&self, other: &SessionControl) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// Raised when a poll finds a route fast enough to replace the displayed one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerouteEvent {
    pub start: String,
    pub end: String,
    pub previous: Routes,
    pub current: Routes,
}

impl RerouteEvent {
    pub fn minutes_saved(&self) -> f64 {
        self.previous.best_eta - self.current.best_eta
    }
}

/// Sequence token observed by a poll tick when it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    seq: u64,
}

struct SessionState {
    start: String,
    end: String,
    routes: Routes,
    auto_reroute: bool,
    // Bumped by manual requests and selections. Polls only read it, so a
    // poll can never supersede a manual request.
    seq: u64,
}

impl SessionState {
    fn control(&self) -> SessionControl {
        SessionControl {
            start: self.start.clone(),
            end: self.end.clone(),
            auto_reroute: self.auto_reroute,
            has_route: self.routes.has_best(),
        }
    }

    fn is_pair(&self, start: &str, end: &str) -> bool {
        self.start == start && self.end == end
    }
}

pub struct RouteSession<B> {
    backend: B,
    state: Mutex<SessionState>,
    control: watch::Sender<SessionControl>,
    reroutes: broadcast::Sender<RerouteEvent>,
}

impl<B: RouteBackend> RouteSession<B> {
    pub fn new(backend: B, start: &str, end: &str) -> Self {
        let state = SessionState {
            start: start.to_string(),
            end: end.to_string(),
            routes: Routes::default(),
            auto_reroute: false,
            seq: 0,
        };
        let (control, _) = watch::channel(state.control());
        let (reroutes, _) = broadcast::channel(REROUTE_CHANNEL_CAPACITY);
        Self {
            backend,
            state: Mutex::new(state),
            control,
            reroutes,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            start: state.start.clone(),
            end: state.end.clone(),
            routes: state.routes.clone(),
            auto_reroute: state.auto_reroute,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionControl> {
        self.control.subscribe()
    }

    pub fn subscribe_reroutes(&self) -> broadcast::Receiver<RerouteEvent> {
        self.reroutes.subscribe()
    }

    /// Change the start/end pair. Switching to a different pair clears the
    /// displayed routes and invalidates every request still in flight.
    pub fn select(&self, start: &str, end: &str) {
        let mut state = self.state.lock();
        self.select_locked(&mut state, start, end);
    }

    fn select_locked(&self, state: &mut SessionState, start: &str, end: &str) -> u64 {
        state.seq += 1;
        if !state.is_pair(start, end) {
            debug!(start, end, "selection changed");
            state.start = start.to_string();
            state.end = end.to_string();
            state.routes = Routes::default();
            self.control.send_replace(state.control());
        }
        state.seq
    }

    pub fn toggle_auto_reroute(&self) -> bool {
        let mut state = self.state.lock();
        let enabled = !state.auto_reroute;
        self.set_auto_locked(&mut state, enabled);
        enabled
    }

    pub fn set_auto_reroute(&self, enabled: bool) {
        let mut state = self.state.lock();
        self.set_auto_locked(&mut state, enabled);
    }

    fn set_auto_locked(&self, state: &mut SessionState, enabled: bool) {
        if state.auto_reroute != enabled {
            state.auto_reroute = enabled;
            info!(enabled, "auto-reroute toggled");
            self.control.send_replace(state.control());
        }
    }

    /// Request a route for the current selection. The pair is read and the
    /// request token taken under one lock, so a concurrent `select` is never
    /// undone by a refresh of the pair it replaced.
    pub async fn refresh(&self) -> Result<Routes, RouteError> {
        let (start, end, seq) = {
            let mut state = self.state.lock();
            validate(&state.start, &state.end)?;
            let (start, end) = (state.start.clone(), state.end.clone());
            let seq = self.select_locked(&mut state, &start, &end);
            (start, end, seq)
        };
        self.fetch_and_commit(&start, &end, seq).await
    }

    /// Select `(start, end)` and fetch its routes. Identical endpoints are
    /// allowed; the backend answers with a trivial route.
    pub async fn request_route(&self, start: &str, end: &str) -> Result<Routes, RouteError> {
        validate(start, end)?;
        let seq = {
            let mut state = self.state.lock();
            self.select_locked(&mut state, start, end)
        };
        self.fetch_and_commit(start, end, seq).await
    }

    async fn fetch_and_commit(&self, start: &str, end: &str, seq: u64) -> Result<Routes, RouteError> {
        let routes = Routes::from(self.backend.route(&RouteQuery::new(start, end)).await?);

        let mut state = self.state.lock();
        if state.seq != seq || !state.is_pair(start, end) {
            debug!(start, end, seq, latest = state.seq, "discarding superseded route response");
            return Err(RouteError::Superseded);
        }
        state.routes = routes.clone();
        self.control.send_replace(state.control());
        info!(
            start,
            end,
            best_eta = routes.best_eta,
            main_eta = routes.main_eta,
            hops = routes.best_route.len(),
            "route applied"
        );
        Ok(routes)
    }

    /// Start a poll: returns the pair to query and the ticket that must still
    /// be current when the answer comes back.
    pub fn begin_poll(&self) -> (RouteQuery, PollTicket) {
        let state = self.state.lock();
        (RouteQuery::new(&state.start, &state.end), PollTicket { seq: state.seq })
    }

    /// Apply a polled candidate if it is at least `1 - threshold` faster than
    /// the displayed best route. Observers are notified in the same critical
    /// section as the swap.
    pub fn apply_poll(
        &self,
        query: &RouteQuery,
        ticket: PollTicket,
        candidate: Routes,
        threshold: f64,
    ) -> Option<RerouteEvent> {
        let mut state = self.state.lock();
        if state.seq != ticket.seq || !state.is_pair(&query.start, &query.end) {
            debug!(start = %query.start, end = %query.end, "discarding stale poll response");
            return None;
        }
        if !state.auto_reroute || !state.routes.has_best() || !candidate.has_best() {
            return None;
        }
        if candidate.best_eta >= state.routes.best_eta * threshold {
            debug!(
                current = state.routes.best_eta,
                candidate = candidate.best_eta,
                "polled route not better enough"
            );
            return None;
        }

        let event = RerouteEvent {
            start: state.start.clone(),
            end: state.end.clone(),
            previous: std::mem::replace(&mut state.routes, candidate.clone()),
            current: candidate,
        };
        let _ = self.reroutes.send(event.clone());
        self.control.send_replace(state.control());
        Some(event)
    }
}

fn validate(start: &str, end: &str) -> Result<(), RouteError> {
    if start.trim().is_empty() || end.trim().is_empty() {
        return Err(RouteError::Validation("both start and end cities are required"));
    }
    Ok(())
}
