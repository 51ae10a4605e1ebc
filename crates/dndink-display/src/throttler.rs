//! Render throttling.
//!
//! E-paper refreshes are slow and wear the panel, so physical writes are
//! spaced at least `min_interval` apart. Requests inside the window collapse
//! into one deferred redraw of the most recent state.
//!
//! [`ThrottleState`] is the clock-driven decision core with no I/O.
//! [`RenderThrottler`] is the task around it: it owns the driver, takes
//! requests from the session, and runs each write on the blocking pool.

use std::time::Duration;

use chrono::Local;
use dndink_core::{ObservedState, RenderRequest};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::driver::DisplayDriver;
use crate::errors::{RenderError, Result};
use crate::renderer::Renderer;

/// Shortest delay before retrying a failed write, even with a zero interval.
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What the throttler should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to draw.
    Idle,
    /// Draw this state now.
    RenderNow(ObservedState),
    /// A redraw is due at this instant.
    Wait(Instant),
}

/// Observed and rendered state plus the timing needed to space writes.
#[derive(Clone, Debug)]
pub struct ThrottleState {
    min_interval: Duration,
    current: ObservedState,
    rendered: Option<ObservedState>,
    last_render: Option<Instant>,
    retry_at: Option<Instant>,
    forced: bool,
}

impl ThrottleState {
    /// Fresh state: nothing observed, nothing rendered.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            current: ObservedState::Unknown,
            rendered: None,
            last_render: None,
            retry_at: None,
            forced: false,
        }
    }

    /// Most recently observed state.
    pub fn current(&self) -> ObservedState {
        self.current
    }

    /// State on the panel after the last successful write.
    pub fn rendered(&self) -> Option<ObservedState> {
        self.rendered
    }

    /// Time of the last successful write.
    pub fn last_render(&self) -> Option<Instant> {
        self.last_render
    }

    /// Fold a request into the state.
    pub fn apply(&mut self, request: RenderRequest) {
        if let Some(state) = request.state {
            self.on_state_changed(state);
        }
        if request.forced {
            self.on_forced_redraw();
        }
    }

    /// Record a newly observed state; it replaces any pending one.
    pub fn on_state_changed(&mut self, state: ObservedState) {
        self.current = state;
    }

    /// Ask for a redraw even if the panel already shows the current state.
    pub fn on_forced_redraw(&mut self) {
        if self.current.is_known() {
            self.forced = true;
        } else {
            debug!("forced redraw dropped, state still unknown");
        }
    }

    fn wants_redraw(&self) -> bool {
        self.current.is_known() && (self.forced || self.rendered != Some(self.current))
    }

    /// Decide at `now`. A pending redraw that became a no-op is dropped here.
    pub fn decide(&self, now: Instant) -> Decision {
        if !self.wants_redraw() {
            return Decision::Idle;
        }
        let not_before = [
            self.last_render.map(|at| at + self.min_interval),
            self.retry_at,
        ]
        .into_iter()
        .flatten()
        .max();
        match not_before {
            Some(at) if at > now => Decision::Wait(at),
            _ => Decision::RenderNow(self.current),
        }
    }

    /// Record a successful write of `state` finishing at `now`.
    pub fn mark_rendered(&mut self, state: ObservedState, now: Instant) {
        self.rendered = Some(state);
        self.last_render = Some(now);
        self.retry_at = None;
        self.forced = false;
    }

    /// Record a failed write at `now`; returns the delay until the retry.
    pub fn mark_failed(&mut self, now: Instant) -> Duration {
        let delay = self.min_interval.max(MIN_RETRY_DELAY);
        self.retry_at = Some(now + delay);
        delay
    }
}

/// Task that owns the display and serializes writes.
pub struct RenderThrottler {
    state: ThrottleState,
    renderer: Renderer,
    driver: Option<Box<dyn DisplayDriver>>,
    requests: mpsc::UnboundedReceiver<RenderRequest>,
}

impl RenderThrottler {
    /// Throttler writing to an already initialized `driver`.
    pub fn new(
        min_interval: Duration,
        renderer: Renderer,
        driver: Box<dyn DisplayDriver>,
        requests: mpsc::UnboundedReceiver<RenderRequest>,
    ) -> Self {
        Self {
            state: ThrottleState::new(min_interval),
            renderer,
            driver: Some(driver),
            requests,
        }
    }

    /// Run until cancelled or until every request sender is gone, then put
    /// the panel to sleep.
    ///
    /// Write failures are retried. Only losing the driver to a panicked
    /// worker ends the task with an error.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            min_interval_secs = self.state.min_interval.as_secs(),
            driver = self.driver.as_ref().map_or("none", |d| d.name()),
            "render throttler started"
        );

        loop {
            let due = match self.state.decide(Instant::now()) {
                Decision::RenderNow(state) => {
                    self.render(state).await?;
                    continue;
                }
                Decision::Wait(at) => {
                    let in_ms = at.saturating_duration_since(Instant::now()).as_millis() as u64;
                    trace!(in_ms, "redraw deferred");
                    Some(at)
                }
                Decision::Idle => None,
            };

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        debug!("render request channel closed");
                        break;
                    };
                    self.state.apply(request);
                    while let Ok(request) = self.requests.try_recv() {
                        self.state.apply(request);
                    }
                }
                () = sleep_until_deadline(due) => {}
            }
        }

        self.sleep_panel().await;
        info!("render throttler stopped");
        Ok(())
    }

    async fn render(&mut self, state: ObservedState) -> Result<()> {
        let status = self.renderer.status(state, &Local::now());
        let frame = match self.renderer.compose(&status) {
            Ok(frame) => frame,
            Err(e) => {
                let retry = self.state.mark_failed(Instant::now());
                error!(error = %e, %state, retry_in_secs = retry.as_secs(), "frame composition failed");
                return Ok(());
            }
        };

        let mut driver = self.driver.take().ok_or_else(|| {
            RenderError::Hardware("display driver unavailable".to_string())
        })?;
        debug!(%state, driver = driver.name(), "writing frame");
        let (driver, written, slept) = tokio::task::spawn_blocking(move || {
            let written = driver.write_bitmap(&frame);
            let slept = driver.sleep();
            (driver, written, slept)
        })
        .await
        .map_err(|e| RenderError::Hardware(format!("display worker failed: {e}")))?;
        self.driver = Some(driver);

        let now = Instant::now();
        if let Err(e) = slept {
            warn!(error = %e, "failed to put panel to sleep");
        }
        match written {
            Ok(()) => {
                self.state.mark_rendered(state, now);
                info!(%state, updated = %status.updated, "display updated");
            }
            Err(e) => {
                let retry = self.state.mark_failed(now);
                error!(error = %e, %state, retry_in_secs = retry.as_secs(), "display write failed");
            }
        }
        Ok(())
    }

    async fn sleep_panel(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || driver.sleep()).await {
            Ok(Ok(())) => debug!("panel asleep"),
            Ok(Err(e)) => warn!(error = %e, "failed to put panel to sleep"),
            Err(e) => warn!(error = %e, "display worker failed during shutdown"),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
