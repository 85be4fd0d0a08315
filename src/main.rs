use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use live_route::config::Config;
use live_route::geometry::BoundaryCache;
use live_route::view::{MapScene, MapView};
use live_route::{AutoReroutePoller, HttpBackend, RerouteEvent, RouteSession};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!(backend = %config.backend_url, "starting live route client");

    let backend = HttpBackend::new(&config.backend_url, config.request_timeout)?;
    let session = Arc::new(RouteSession::new(backend, &config.start_city, &config.end_city));

    // 1. Reference layers, fetched concurrently and only once
    let boundaries = BoundaryCache::new();
    let mut view = MapView::load(
        session.backend(),
        &boundaries,
        &config.boundary_path,
        config.tile_url(),
    )
    .await;

    // 2. Initial route for the default selection
    match session.refresh().await {
        Ok(routes) => {
            view.refresh_real_route(session.backend(), &routes.best_route).await;
        }
        Err(err) => error!(error = %err, "error fetching route"),
    }
    emit(&view.scene(&session.snapshot()))?;

    // 3. Auto-reroute runs until Ctrl-C
    session.set_auto_reroute(config.auto_reroute);
    let mut reroutes = session.subscribe_reroutes();
    let poller = AutoReroutePoller::new(session.clone(), config.poller()).spawn();

    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to listen for Ctrl-C");
        }
    };
    let handled = follow_reroutes(&session, &mut view, &mut reroutes, ctrl_c).await?;

    info!(reroutes = handled, "shutting down");
    poller.shutdown().await;
    Ok(())
}

/// Redraw the scene for every reroute until `shutdown` resolves or the
/// session goes away. Returns how many reroutes were handled.
async fn follow_reroutes<F>(
    session: &RouteSession<HttpBackend>,
    view: &mut MapView,
    reroutes: &mut broadcast::Receiver<RerouteEvent>,
    shutdown: F,
) -> anyhow::Result<usize>
where
    F: Future<Output = ()>,
{
    // Pinned once so a signal that lands while an event is handled still counts.
    tokio::pin!(shutdown);
    let mut handled = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = reroutes.recv() => match event {
                Ok(event) => {
                    warn!(
                        route = %event.current.best_route.join(" → "),
                        eta = event.current.best_eta,
                        saved = event.minutes_saved(),
                        "faster route found, switching"
                    );
                    view.refresh_traffic(session.backend()).await;
                    view.refresh_real_route(session.backend(), &event.current.best_route).await;
                    emit(&view.scene(&session.snapshot()))?;
                    handled += 1;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed reroute events"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(handled)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The scene goes to stdout as one JSON document per line for the renderer.
fn emit(scene: &MapScene) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, scene).context("serializing map scene")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
