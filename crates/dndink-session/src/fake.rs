//! Scripted in-memory server for exercising the session state machine.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use crate::error::SessionError;
use crate::transport::{Connector, Transport};

pub(crate) const ENTITY: &str = "input_boolean.dnd_status";

/// How the fake server behaves for one connection.
#[derive(Clone, Debug)]
pub(crate) struct Plan {
    pub refuse: bool,
    /// Accept the connection but never complete the upgrade.
    pub stall_connect: bool,
    pub accept_token: bool,
    pub subscribe_ok: bool,
    pub entity_state: Option<&'static str>,
    pub answer_pings: bool,
    /// Deliver a subscription event with this value just ahead of the
    /// `get_states` result.
    pub event_before_states: Option<&'static str>,
}

impl Plan {
    pub fn with_state(state: &'static str) -> Self {
        Self {
            refuse: false,
            stall_connect: false,
            accept_token: true,
            subscribe_ok: true,
            entity_state: Some(state),
            answer_pings: true,
            event_before_states: None,
        }
    }

    pub fn without_entity() -> Self {
        Self {
            entity_state: None,
            ..Self::with_state("off")
        }
    }

    pub fn refused() -> Self {
        Self {
            refuse: true,
            ..Self::with_state("off")
        }
    }

    pub fn stalled() -> Self {
        Self {
            stall_connect: true,
            ..Self::with_state("off")
        }
    }

    pub fn rejected_token() -> Self {
        Self {
            accept_token: false,
            ..Self::with_state("off")
        }
    }
}

enum Frame {
    Text(String),
    Close,
}

struct Shared {
    plans: VecDeque<Plan>,
    fallback: Plan,
    connects: usize,
    closes: usize,
    sent: Vec<String>,
    live: Option<mpsc::UnboundedSender<Frame>>,
    subscription_id: Option<u64>,
}

/// Connector whose transports answer from a [`Plan`].
#[derive(Clone)]
pub(crate) struct FakeHomeAssistant {
    shared: Arc<Mutex<Shared>>,
}

impl FakeHomeAssistant {
    /// `plans` are used for the first connections in order, then `fallback`.
    pub fn new(plans: Vec<Plan>, fallback: Plan) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                plans: plans.into(),
                fallback,
                connects: 0,
                closes: 0,
                sent: Vec::new(),
                live: None,
                subscription_id: None,
            })),
        }
    }

    pub fn connects(&self) -> usize {
        self.shared.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().closes
    }

    pub fn sent(&self) -> Vec<String> {
        self.shared.lock().sent.clone()
    }

    /// Deliver a `state_changed` event on the live connection.
    pub fn push_event(&self, entity_id: &str, old: &str, new: &str) -> bool {
        let shared = self.shared.lock();
        let (Some(live), Some(id)) = (&shared.live, shared.subscription_id) else {
            return false;
        };
        live.send(Frame::Text(state_changed(id, entity_id, old, new).to_string()))
            .is_ok()
    }

    pub fn push_raw(&self, text: &str) -> bool {
        let shared = self.shared.lock();
        shared
            .live
            .as_ref()
            .is_some_and(|live| live.send(Frame::Text(text.to_string())).is_ok())
    }

    /// Simulate the server going away.
    pub fn drop_connection(&self) {
        let mut shared = self.shared.lock();
        if let Some(live) = shared.live.take() {
            let _ = live.send(Frame::Close);
        }
        shared.subscription_id = None;
    }
}

fn state_changed(id: u64, entity_id: &str, old: &str, new: &str) -> Value {
    json!({
        "id": id,
        "type": "event",
        "event": {
            "event_type": "state_changed",
            "data": {
                "entity_id": entity_id,
                "old_state": { "entity_id": entity_id, "state": old },
                "new_state": { "entity_id": entity_id, "state": new },
            },
        },
    })
}

#[async_trait]
impl Connector for FakeHomeAssistant {
    async fn connect(&self, _url: &Url) -> Result<Box<dyn Transport>, SessionError> {
        let plan = {
            let mut shared = self.shared.lock();
            shared.connects += 1;
            shared
                .plans
                .pop_front()
                .unwrap_or_else(|| shared.fallback.clone())
        };
        if plan.stall_connect {
            std::future::pending::<()>().await;
        }
        if plan.refuse {
            return Err(SessionError::Network("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let hello = json!({ "type": "auth_required", "ha_version": "2024.6.0" });
        let _ = tx.send(Frame::Text(hello.to_string()));
        {
            let mut shared = self.shared.lock();
            shared.live = Some(tx.clone());
            shared.subscription_id = None;
        }

        Ok(Box::new(FakeTransport {
            plan,
            tx,
            rx,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeTransport {
    plan: Plan,
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<Mutex<Shared>>,
}

impl FakeTransport {
    fn reply(&self, value: &Value) {
        let _ = self.tx.send(Frame::Text(value.to_string()));
    }

    fn states(&self) -> Value {
        let mut states = vec![json!({ "entity_id": "sun.sun", "state": "above_horizon" })];
        if let Some(state) = self.plan.entity_state {
            states.push(json!({ "entity_id": ENTITY, "state": state }));
        }
        Value::Array(states)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        let value: Value = serde_json::from_str(&text).expect("client sent invalid json");
        let id = value["id"].as_u64();
        self.shared.lock().sent.push(text);

        match value["type"].as_str() {
            Some("auth") if self.plan.accept_token => {
                self.reply(&json!({ "type": "auth_ok", "ha_version": "2024.6.0" }));
            }
            Some("auth") => {
                self.reply(&json!({ "type": "auth_invalid", "message": "Invalid access token" }));
                let _ = self.tx.send(Frame::Close);
            }
            Some("subscribe_events") => {
                self.shared.lock().subscription_id = id;
                if self.plan.subscribe_ok {
                    self.reply(&json!({ "id": id, "type": "result", "success": true, "result": null }));
                } else {
                    self.reply(&json!({
                        "id": id,
                        "type": "result",
                        "success": false,
                        "error": { "code": "unknown_error", "message": "nope" },
                    }));
                }
            }
            Some("get_states") => {
                let subscription_id = self.shared.lock().subscription_id;
                if let (Some(value), Some(sub)) = (self.plan.event_before_states, subscription_id) {
                    self.reply(&state_changed(sub, ENTITY, "unknown", value));
                }
                let states = self.states();
                self.reply(&json!({ "id": id, "type": "result", "success": true, "result": states }));
            }
            Some("ping") if self.plan.answer_pings => {
                self.reply(&json!({ "id": id, "type": "pong" }));
            }
            _ => {}
        }
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>, SessionError> {
        match self.rx.recv().await {
            Some(Frame::Text(text)) => Ok(Some(text)),
            Some(Frame::Close) | None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let mut shared = self.shared.lock();
        shared.closes += 1;
        shared.live = None;
        Ok(())
    }
}
