//! Wiring: display driver, render throttler and session manager.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use dndink_display::{DisplayDriver, RenderThrottler, Renderer, build_driver};
use dndink_session::{SessionConfig, SessionManager, WsConnector};
use dndink_settings::{DisplaySettings, DndSettings};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::shutdown::{DEFAULT_SHUTDOWN_TIMEOUT, ShutdownCoordinator, wait_for_signal};

/// Run until SIGINT or SIGTERM.
pub async fn run(settings: &DndSettings) -> Result<()> {
    let stop = CancellationToken::new();
    let signal = tokio::spawn({
        let stop = stop.clone();
        async move {
            wait_for_signal().await;
            stop.cancel();
        }
    });
    let result = run_until(settings, &stop).await;
    signal.abort();
    result
}

/// Run until `stop` is cancelled or a task fails fatally.
pub async fn run_until(settings: &DndSettings, stop: &CancellationToken) -> Result<()> {
    let ha = &settings.home_assistant;
    info!(
        base_url = %ha.base_url,
        entity_id = %ha.entity_id,
        min_refresh_secs = settings.display.min_refresh_secs,
        driver = ?settings.display.driver,
        "dndink starting"
    );

    let driver = open_display(&settings.display).await?;
    let (requests, request_rx) = mpsc::unbounded_channel();
    let coordinator = ShutdownCoordinator::new(stop);

    let throttler = RenderThrottler::new(
        Duration::from_secs(settings.display.min_refresh_secs),
        Renderer::default(),
        driver,
        request_rx,
    );
    let mut throttler_task = tokio::spawn(throttler.run(coordinator.token()));

    let mut manager = SessionManager::new(SessionConfig::from_settings(settings), WsConnector, requests);
    let mut session_task = tokio::spawn({
        let token = coordinator.token();
        async move { manager.run(token).await }
    });

    // Whichever finishes first decides; the other is drained below.
    let mut session_done = None;
    let mut throttler_done = None;
    tokio::select! {
        () = coordinator.cancelled() => info!("shutting down"),
        joined = &mut session_task => session_done = Some(joined),
        joined = &mut throttler_task => throttler_done = Some(joined),
    }
    if !coordinator.is_shutting_down() {
        warn!("a daemon task stopped on its own, stopping the other");
    }
    coordinator.shutdown();

    let session = match session_done {
        Some(joined) => joined.ok(),
        None => coordinator.drain("session", session_task, DEFAULT_SHUTDOWN_TIMEOUT).await,
    };
    let throttler = match throttler_done {
        Some(joined) => joined.ok(),
        None => coordinator.drain("throttler", throttler_task, DEFAULT_SHUTDOWN_TIMEOUT).await,
    };

    session
        .ok_or_else(|| anyhow!("session task did not finish cleanly"))?
        .context("session stopped")?;
    throttler
        .ok_or_else(|| anyhow!("render task did not finish cleanly"))?
        .context("render throttler stopped")?;
    info!("shutdown complete");
    Ok(())
}

/// Connect, fetch the current state, draw it once and exit.
pub async fn run_once(settings: &DndSettings) -> Result<()> {
    let driver = open_display(&settings.display).await?;

    // Nothing listens: the single resync result is drawn directly.
    let (requests, _unused) = mpsc::unbounded_channel();
    let mut manager = SessionManager::new(SessionConfig::from_settings(settings), WsConnector, requests);
    let state = tokio::select! {
        resynced = manager.resync_once() => resynced.context("fetching current state")?,
        () = wait_for_signal() => return Ok(()),
    };
    let state = state.filter(|s| s.is_known()).ok_or_else(|| {
        anyhow!(
            "current state of {} is unknown, nothing to draw",
            settings.home_assistant.entity_id
        )
    })?;

    let renderer = Renderer::default();
    let status = renderer.status(state, &Local::now());
    let frame = renderer.compose(&status)?;
    let (written, slept) = tokio::task::spawn_blocking(move || {
        let mut driver = driver;
        let written = driver.write_bitmap(&frame);
        (written, driver.sleep())
    })
    .await
    .context("display worker failed")?;
    written.context("writing frame")?;
    if let Err(e) = slept {
        warn!(error = %e, "failed to put panel to sleep");
    }
    info!(%state, updated = %status.updated, "display updated once");
    Ok(())
}

/// Build and initialize the configured driver on the blocking pool.
async fn open_display(settings: &DisplaySettings) -> Result<Box<dyn DisplayDriver>> {
    let settings = settings.clone();
    let driver = tokio::task::spawn_blocking(move || {
        let mut driver = build_driver(&settings)?;
        driver.initialize()?;
        Ok::<_, dndink_display::RenderError>(driver)
    })
    .await
    .context("display worker failed")?
    .context("initializing display")?;
    info!(driver = driver.name(), "display ready");
    Ok(driver)
}
