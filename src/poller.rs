use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::RouteBackend;
use crate::session::{RouteSession, Routes, SessionControl};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// A polled route replaces the displayed one only if
    /// `new_eta < current_eta * threshold`.
    pub threshold: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20_000),
            threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerState {
    Idle,
    Polling,
}

pub struct AutoReroutePoller<B> {
    session: Arc<RouteSession<B>>,
    config: PollerConfig,
}

/// Owns the background poll task. Dropping the handle cancels it.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to exit. No session mutation happens
    /// after this returns.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "auto-reroute poller ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<B: RouteBackend + 'static> AutoReroutePoller<B> {
    pub fn new(session: Arc<RouteSession<B>>, config: PollerConfig) -> Self {
        Self { session, config }
    }

    pub fn spawn(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        PollerHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut control = self.session.subscribe();
        let mut state = PollerState::Idle;

        loop {
            let current = control.borrow_and_update().clone();
            let next = if current.wants_polling() {
                PollerState::Polling
            } else {
                PollerState::Idle
            };
            if next != state {
                debug!(from = ?state, to = ?next, start = %current.start, end = %current.end, "poller transition");
                state = next;
            }

            let keep_going = match state {
                PollerState::Idle => wait_for_change(&mut control, &cancel).await,
                PollerState::Polling => self.poll_pair(&current, &mut control, &cancel).await,
            };
            if !keep_going {
                break;
            }
        }
        debug!("auto-reroute poller stopped");
    }

    /// Poll one (start, end) pair until the session stops asking for it.
    /// Returns false once the poller should exit.
    async fn poll_pair(
        &self,
        pair: &SessionControl,
        control: &mut watch::Receiver<SessionControl>,
        cancel: &CancellationToken,
    ) -> bool {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                changed = control.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    let latest = control.borrow_and_update().clone();
                    if !latest.same_pair(pair) || !latest.wants_polling() {
                        return true;
                    }
                }
                _ = ticker.tick() => {
                    if !self.tick(cancel).await {
                        return false;
                    }
                }
            }
        }
    }

    /// One poll round trip. Failures are logged and swallowed.
    async fn tick(&self, cancel: &CancellationToken) -> bool {
        let (query, ticket) = self.session.begin_poll();
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            res = self.session.backend().route(&query) => res,
        };

        match fetched {
            Ok(res) => {
                if cancel.is_cancelled() {
                    return false;
                }
                let candidate = Routes::from(res);
                if let Some(event) =
                    self.session
                        .apply_poll(&query, ticket, candidate, self.config.threshold)
                {
                    info!(
                        start = %event.start,
                        end = %event.end,
                        previous_eta = event.previous.best_eta,
                        new_eta = event.current.best_eta,
                        "switched to faster route"
                    );
                }
            }
            Err(err) => {
                warn!(start = %query.start, end = %query.end, error = %err, "auto-reroute poll failed");
            }
        }
        true
    }
}

async fn wait_for_change(
    control: &mut watch::Receiver<SessionControl>,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        changed = control.changed() => changed.is_ok(),
    }
}
