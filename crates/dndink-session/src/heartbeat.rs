//! Ping/pong liveness for the Home Assistant connection.
//!
//! A half-open TCP connection (router reboot, Wi-Fi drop) never produces a
//! read error on its own, so the read loop pings on a fixed period and
//! gives up after `max_missed` periods without any inbound message.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Outcome of one heartbeat period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Traffic was seen recently enough; send the next ping.
    Alive,
    /// The server stopped responding within the timeout window.
    TimedOut,
}

/// Liveness tracker driven by the read loop.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Option<Interval>,
    alive: bool,
    missed: u32,
    max_missed: u32,
}

impl Heartbeat {
    /// Heartbeat with the given period; `None` or a zero period disables it.
    ///
    /// `max_missed` is clamped to at least 1.
    pub fn new(period: Option<Duration>, max_missed: u32) -> Self {
        let interval = period.filter(|p| !p.is_zero()).map(|p| {
            let mut interval = time::interval_at(Instant::now() + p, p);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self {
            interval,
            alive: true,
            missed: 0,
            max_missed: max_missed.max(1),
        }
    }

    /// Whether pings are sent at all.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Record inbound traffic.
    pub fn mark_alive(&mut self) {
        self.alive = true;
    }

    /// Wait for the next period. Never resolves when disabled.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                let _ = interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Evaluate the period that just ended and arm the next one.
    pub fn check(&mut self) -> HeartbeatResult {
        if self.alive {
            self.missed = 0;
        } else {
            self.missed += 1;
            if self.missed >= self.max_missed {
                return HeartbeatResult::TimedOut;
            }
        }
        // Not alive until the next inbound message.
        self.alive = false;
        HeartbeatResult::Alive
    }
}
