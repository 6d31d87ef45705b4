//! Edge-triggered view of the runtime's online/offline signal.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityState {
    pub online: bool,
    pub last_transition_at: DateTime<Utc>,
}

/// Point-in-time reachability check, e.g. an HTTP health endpoint.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

type TransitionCallback = Box<dyn Fn(ConnectivityState) + Send + Sync>;

pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    callbacks: Mutex<Vec<TransitionCallback>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(ConnectivityState {
            online: initially_online,
            last_transition_at: Utc::now(),
        });
        Self {
            state,
            callbacks: Mutex::new(Vec::new()),
            probe: None,
        }
    }

    pub fn with_probe(initially_online: bool, probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            probe: Some(probe),
            ..Self::new(initially_online)
        }
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Registers a callback fired once per genuine transition.
    /// Callbacks must not register further callbacks.
    pub fn on_transition<F>(&self, callback: F)
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        match self.callbacks.lock() {
            Ok(mut callbacks) => callbacks.push(Box::new(callback)),
            Err(_) => warn!("[QuizSync] Connectivity callback registry is poisoned"),
        }
    }

    /// Feeds the runtime's signal. Repeating the current state is a no-op.
    /// Returns true when a transition happened.
    pub fn set_online(&self, online: bool) -> bool {
        let mut transitioned = None;
        self.state.send_if_modified(|state| {
            if state.online == online {
                return false;
            }
            state.online = online;
            state.last_transition_at = Utc::now();
            transitioned = Some(*state);
            true
        });

        let Some(state) = transitioned else {
            return false;
        };
        if online {
            info!("[QuizSync] Connectivity: online");
        } else {
            warn!("[QuizSync] Connectivity: offline");
        }
        if let Ok(callbacks) = self.callbacks.lock() {
            for callback in callbacks.iter() {
                callback(state);
            }
        }
        true
    }

    /// Polls the probe, if any, and applies the result. Catches transitions
    /// the host signal missed.
    pub async fn refresh(&self) -> bool {
        if let Some(probe) = &self.probe {
            let online = probe.probe().await;
            self.set_online(online);
        }
        self.is_online()
    }
}
