//! The connection-resilience loop.
//!
//! One [`SessionManager`] owns at most one [`Transport`] at a time and moves
//! through an explicit state machine:
//!
//! ```text
//! Disconnected → Connecting → Authenticated → Subscribed → Receiving
//!       ↑______________________ any error ______________________|
//! any state ── cancellation ──→ Stopped
//! ```
//!
//! After every successful subscription the entity's current value is
//! fetched with `get_states`, so events missed while disconnected cannot
//! leave the panel stale.

use std::time::Duration;

use dndink_core::{BackoffConfig, ObservedState, RenderRequest};
use dndink_settings::{AccessToken, DndSettings};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{RetryClass, SessionError};
use crate::heartbeat::{Heartbeat, HeartbeatResult};
use crate::interpreter::{Interpretation, StateInterpreter};
use crate::protocol::{ClientMessage, STATE_CHANGED, ServerMessage, websocket_url};
use crate::transport::{Connector, Transport};

/// A heartbeat period with no inbound message drops the connection.
const HEARTBEAT_MAX_MISSED: u32 = 1;

/// Upper bound for sending the close frame on the way out.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; waiting to (re)connect.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Token accepted.
    Authenticated,
    /// `state_changed` subscription confirmed; resync in progress.
    Subscribed,
    /// Resynced and consuming events.
    Receiving,
    /// Cancelled. Terminal.
    Stopped,
}

/// Everything the session needs from the settings.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Base URL of the server (`http(s)://` or `ws(s)://`).
    pub base_url: String,
    /// Access credential.
    pub token: AccessToken,
    /// Entity to monitor.
    pub entity_id: String,
    /// Heartbeat period; `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// Upper bound for each handshake step.
    pub handshake_timeout: Duration,
    /// Reconnect timing.
    pub backoff: BackoffConfig,
}

impl SessionConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &DndSettings) -> Self {
        let ha = &settings.home_assistant;
        Self {
            base_url: ha.base_url.clone(),
            token: ha.token.clone(),
            entity_id: ha.entity_id.clone(),
            ping_interval: (ha.ping_interval_secs > 0)
                .then(|| Duration::from_secs(ha.ping_interval_secs)),
            handshake_timeout: Duration::from_secs(ha.handshake_timeout_secs.max(1)),
            backoff: settings.reconnect.clone(),
        }
    }
}

/// Result of a successful handshake.
#[derive(Debug)]
struct Subscription {
    id: u64,
    resynced: Option<ObservedState>,
}

/// Why the read loop ended.
enum ReadOutcome {
    Cancelled,
    Failed(SessionError),
}

/// Owns the connection to the remote event source.
pub struct SessionManager<C> {
    config: SessionConfig,
    connector: C,
    interpreter: StateInterpreter,
    requests: mpsc::UnboundedSender<RenderRequest>,
    state_tx: watch::Sender<SessionState>,
    next_id: u64,
}

impl<C: Connector> SessionManager<C> {
    /// Create a manager that sends render requests into `requests`.
    pub fn new(
        config: SessionConfig,
        connector: C,
        requests: mpsc::UnboundedSender<RenderRequest>,
    ) -> Self {
        let interpreter = StateInterpreter::new(config.entity_id.clone());
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            connector,
            interpreter,
            requests,
            state_tx,
            next_id: 1,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Returns `Ok(())` on cancellation and an error only when the
    /// configuration cannot produce a connection. Every other failure is
    /// retried: network and protocol errors with exponential backoff,
    /// rejected credentials at the slower fixed cadence.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), SessionError> {
        let url = websocket_url(&self.config.base_url)?;
        info!(%url, entity_id = %self.config.entity_id, "session manager starting");

        let mut attempt: u32 = 0;
        let result = loop {
            let failure = match self.session_once(&url, &shutdown, &mut attempt).await {
                Ok(()) => break Ok(()),
                Err(e) => e,
            };

            let delay = match failure.retry_class() {
                RetryClass::Fatal => break Err(failure),
                RetryClass::SlowFixed => {
                    let delay = self.config.backoff.auth_delay();
                    error!(
                        error = %failure,
                        retry_in_secs = delay.as_secs(),
                        "access token rejected; fix the token, retrying at the slow cadence"
                    );
                    delay
                }
                RetryClass::Backoff => {
                    let delay = self.config.backoff.network_delay(attempt);
                    warn!(
                        error = %failure,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "connection lost, reconnecting"
                    );
                    attempt = attempt.saturating_add(1);
                    delay
                }
            };

            self.set_state(SessionState::Disconnected);
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.set_state(SessionState::Stopped);
        info!("session manager stopped");
        result
    }

    /// Connect, authenticate, subscribe and resync once, then disconnect.
    ///
    /// Returns the entity's current state, or `None` when the server does
    /// not know the entity or reports an unrecognized value.
    pub async fn resync_once(&mut self) -> Result<Option<ObservedState>, SessionError> {
        let url = websocket_url(&self.config.base_url)?;
        self.set_state(SessionState::Connecting);
        let mut transport = self.open_transport(&url).await?;
        let result = self.handshake(transport.as_mut()).await;
        close_transport(transport.as_mut()).await;
        self.set_state(SessionState::Disconnected);
        result.map(|subscription| subscription.resynced)
    }

    /// One connection lifetime. `Ok(())` means cancelled.
    async fn session_once(
        &mut self,
        url: &Url,
        shutdown: &CancellationToken,
        attempt: &mut u32,
    ) -> Result<(), SessionError> {
        self.set_state(SessionState::Connecting);
        let connected = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(()),
            connected = self.open_transport(url) => connected,
        };
        let mut transport = connected?;

        let handshake = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            handshake = self.handshake(transport.as_mut()) => Some(handshake),
        };

        let outcome = match handshake {
            None => ReadOutcome::Cancelled,
            Some(Err(e)) => ReadOutcome::Failed(e),
            Some(Ok(subscription)) => {
                *attempt = 0;
                info!(
                    subscription_id = subscription.id,
                    resynced = %subscription.resynced.unwrap_or_default(),
                    "subscribed to state changes"
                );
                self.emit(RenderRequest::resync(subscription.resynced));
                self.read_loop(transport.as_mut(), subscription.id, shutdown)
                    .await
            }
        };

        close_transport(transport.as_mut()).await;
        match outcome {
            ReadOutcome::Cancelled => Ok(()),
            ReadOutcome::Failed(e) => Err(e),
        }
    }

    /// TCP connect plus HTTP upgrade, bounded like every handshake step.
    async fn open_transport(&self, url: &Url) -> Result<Box<dyn Transport>, SessionError> {
        timeout(self.config.handshake_timeout, self.connector.connect(url))
            .await
            .map_err(|_| SessionError::Network("timed out opening websocket".to_string()))?
    }

    /// Authenticate, subscribe to `state_changed`, and fetch current states.
    async fn handshake(&mut self, transport: &mut dyn Transport) -> Result<Subscription, SessionError> {
        self.next_id = 1;

        match self.recv_message(transport, "auth_required").await? {
            ServerMessage::AuthRequired { ha_version } => {
                debug!(ha_version = ha_version.as_deref().unwrap_or("unknown"), "authentication requested");
            }
            other => {
                return Err(SessionError::Protocol(format!(
                    "expected auth_required, got {}",
                    other.kind()
                )));
            }
        }

        let auth = ClientMessage::Auth {
            access_token: self.config.token.expose().to_owned(),
        };
        transport.send_text(auth.to_text()).await?;

        match self.recv_message(transport, "auth_ok").await? {
            ServerMessage::AuthOk { ha_version } => {
                info!(ha_version = ha_version.as_deref().unwrap_or("unknown"), "authenticated");
            }
            ServerMessage::AuthInvalid { message } => {
                return Err(SessionError::Auth(
                    message.unwrap_or_else(|| "invalid access token".to_string()),
                ));
            }
            other => {
                return Err(SessionError::Protocol(format!(
                    "expected auth_ok, got {}",
                    other.kind()
                )));
            }
        }
        self.set_state(SessionState::Authenticated);

        let subscription_id = self.next_command_id();
        let subscribe = ClientMessage::SubscribeEvents {
            id: subscription_id,
            event_type: STATE_CHANGED.to_string(),
        };
        transport.send_text(subscribe.to_text()).await?;

        loop {
            match self.recv_message(transport, "subscribe_events result").await? {
                ServerMessage::Result { id, success: true, .. } if id == subscription_id => break,
                ServerMessage::Result { id, error, .. } if id == subscription_id => {
                    return Err(SessionError::Protocol(format!(
                        "subscribe_events rejected: {}",
                        error.map(|e| e.message).unwrap_or_default()
                    )));
                }
                other => trace!(kind = other.kind(), "ignoring message before subscription"),
            }
        }
        self.set_state(SessionState::Subscribed);

        let states_id = self.next_command_id();
        transport
            .send_text(ClientMessage::GetStates { id: states_id }.to_text())
            .await?;

        // Events that race the get_states reply are applied in order; the
        // reply is the newer snapshot and wins.
        let resynced = loop {
            match self.recv_message(transport, "get_states result").await? {
                ServerMessage::Event { id, event } if id == subscription_id => {
                    self.dispatch_event(&event);
                }
                ServerMessage::Result {
                    id,
                    success,
                    result,
                    error,
                } if id == states_id => {
                    if success {
                        break self.resync_state(&result);
                    }
                    warn!(
                        error = error.map(|e| e.message).unwrap_or_default(),
                        "get_states failed, state not resynced"
                    );
                    break None;
                }
                other => trace!(kind = other.kind(), "ignoring message during resync"),
            }
        };

        Ok(Subscription {
            id: subscription_id,
            resynced,
        })
    }

    /// Consume messages until the transport closes, fails or is cancelled.
    async fn read_loop(
        &mut self,
        transport: &mut dyn Transport,
        subscription_id: u64,
        shutdown: &CancellationToken,
    ) -> ReadOutcome {
        self.set_state(SessionState::Receiving);
        let mut heartbeat = Heartbeat::new(self.config.ping_interval, HEARTBEAT_MAX_MISSED);
        if !heartbeat.is_enabled() {
            debug!("heartbeat disabled, relying on transport errors");
        }

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return ReadOutcome::Cancelled,
                () = heartbeat.tick() => {
                    if heartbeat.check() == HeartbeatResult::TimedOut {
                        return ReadOutcome::Failed(SessionError::Network(
                            "heartbeat timed out, no traffic from server".to_string(),
                        ));
                    }
                    let id = self.next_command_id();
                    if let Err(e) = transport.send_text(ClientMessage::Ping { id }.to_text()).await {
                        return ReadOutcome::Failed(e);
                    }
                    trace!(id, "ping sent");
                }
                received = transport.recv_text() => match received {
                    Ok(Some(text)) => {
                        heartbeat.mark_alive();
                        self.handle_message(&text, subscription_id);
                    }
                    Ok(None) => {
                        return ReadOutcome::Failed(SessionError::Network(
                            "connection closed by server".to_string(),
                        ));
                    }
                    Err(e) => return ReadOutcome::Failed(e),
                },
            }
        }
    }

    fn handle_message(&self, text: &str, subscription_id: u64) {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::Event { id, event }) if id == subscription_id => {
                self.dispatch_event(&event);
            }
            Ok(ServerMessage::Event { id, .. }) => trace!(id, "event for another subscription"),
            Ok(ServerMessage::Pong { id }) => trace!(id, "pong"),
            Ok(other) => debug!(kind = other.kind(), "ignoring message"),
            Err(e) => warn!(error = %e, "dropping malformed message"),
        }
    }

    fn dispatch_event(&self, event: &Value) {
        let entity_id = self.interpreter.entity_id();
        match self.interpreter.interpret_event(event) {
            Interpretation::State {
                state,
                raw,
                previous,
            } => {
                info!(
                    entity_id,
                    old = previous.as_deref().unwrap_or("unknown"),
                    new = %raw,
                    %state,
                    "state changed"
                );
                self.emit(RenderRequest::state(state));
            }
            Interpretation::Ignored | Interpretation::NotFound => {}
            Interpretation::Malformed(reason) => {
                warn!(entity_id, %reason, "ignoring malformed state_changed event");
            }
            Interpretation::Unrecognized(raw) => {
                warn!(entity_id, value = %raw, "unrecognized state value, keeping current state");
            }
        }
    }

    fn resync_state(&self, states: &Value) -> Option<ObservedState> {
        let entity_id = self.interpreter.entity_id();
        match self.interpreter.interpret_states(states) {
            Interpretation::State { state, raw, .. } => {
                info!(entity_id, value = %raw, %state, "resynced current state");
                Some(state)
            }
            Interpretation::NotFound => {
                warn!(entity_id, "entity not found on server, check HA_ENTITY_ID");
                None
            }
            Interpretation::Unrecognized(raw) => {
                warn!(entity_id, value = %raw, "unrecognized current value, keeping current state");
                None
            }
            Interpretation::Malformed(reason) => {
                warn!(%reason, "malformed get_states result");
                None
            }
            Interpretation::Ignored => None,
        }
    }

    async fn recv_message(
        &self,
        transport: &mut dyn Transport,
        expecting: &str,
    ) -> Result<ServerMessage, SessionError> {
        let text = timeout(self.config.handshake_timeout, transport.recv_text())
            .await
            .map_err(|_| SessionError::Network(format!("timed out waiting for {expecting}")))??
            .ok_or_else(|| {
                SessionError::Network(format!("connection closed while waiting for {expecting}"))
            })?;
        ServerMessage::parse(&text)
    }

    fn emit(&self, request: RenderRequest) {
        if let Err(rejected) = self.requests.send(request) {
            debug!(request = ?rejected.0, "render throttler stopped, dropping request");
        }
    }

    fn next_command_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "session state");
        }
    }
}

async fn close_transport(transport: &mut dyn Transport) {
    match timeout(CLOSE_TIMEOUT, transport.close()).await {
        Ok(Ok(())) => debug!("connection closed"),
        Ok(Err(e)) => debug!(error = %e, "error while closing connection"),
        Err(_) => debug!("timed out closing connection"),
    }
}
