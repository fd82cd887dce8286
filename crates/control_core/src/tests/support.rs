use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{domain::Snapshot, protocol::StateResponse};
use tokio::sync::Semaphore;

use crate::transport::ControllerTransport;

pub fn state_json(snapshot: &Snapshot) -> serde_json::Value {
    serde_json::to_value(StateResponse::from(snapshot)).expect("encode state")
}

/// Replays queued state documents; the last one repeats once the queue drains.
pub struct ScriptedTransport {
    states: Mutex<VecDeque<Result<serde_json::Value, String>>>,
    last: Mutex<Option<Result<serde_json::Value, String>>>,
    send_error: Option<String>,
    gate: Option<Arc<Semaphore>>,
    fetches: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(states: Vec<serde_json::Value>) -> Self {
        Self {
            states: Mutex::new(states.into_iter().map(Ok).collect()),
            last: Mutex::new(None),
            send_error: None,
            gate: None,
            fetches: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(snapshot: &Snapshot) -> Self {
        Self::new(vec![state_json(snapshot)])
    }

    pub fn failing_send(mut self, error: impl Into<String>) -> Self {
        self.send_error = Some(error.into());
        self
    }

    /// Every fetch waits for a permit on the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn push_state(&self, value: serde_json::Value) {
        self.states.lock().expect("states").push_back(Ok(value));
    }

    pub fn push_unreachable(&self, error: impl Into<String>) {
        self.states.lock().expect("states").push_back(Err(error.into()));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent").clone()
    }
}

#[async_trait]
impl ControllerTransport for ScriptedTransport {
    async fn fetch_state(&self) -> Result<serde_json::Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }

        let next = {
            let mut states = self.states.lock().expect("states");
            let mut last = self.last.lock().expect("last");
            match states.pop_front() {
                Some(next) => {
                    *last = Some(next.clone());
                    next
                }
                None => last
                    .clone()
                    .unwrap_or_else(|| Err("no scripted state".to_string())),
            }
        };
        next.map_err(|error| anyhow!(error))
    }

    async fn send_command(&self, cmd: &str) -> Result<()> {
        if let Some(error) = &self.send_error {
            return Err(anyhow!(error.clone()));
        }
        self.sent.lock().expect("sent").push(cmd.to_string());
        Ok(())
    }
}
