//! Connection lifecycle tracking shared by the cache store and the database
//! provider.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle of a remote connection
///
/// `Disconnected → Connecting → Ready → (Reconnecting | Failed)`,
/// `Reconnecting → Ready | Failed`. Only `Ready` admits commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        self == ConnectionState::Ready
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Holds the current [`ConnectionState`] of one connection.
///
/// `transition` is the only way to change the state; readers either query
/// `current` or `subscribe` to be woken on every change.
#[derive(Clone)]
pub struct ConnectionTracker {
    name: &'static str,
    sender: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionTracker {
    pub fn new(name: &'static str) -> Self {
        let (sender, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            name,
            sender: Arc::new(sender),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn current(&self) -> ConnectionState {
        *self.sender.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_ready()
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&self, next: ConnectionState) -> ConnectionState {
        let previous = self.sender.send_replace(next);
        if previous != next {
            debug!("[{}] state {} -> {}", self.name, previous, next);
        }
        previous
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.sender.subscribe()
    }

    /// Wait until the connection reaches `Ready` or `Failed`
    pub async fn settled(&self) -> ConnectionState {
        let mut receiver = self.subscribe();
        match receiver
            .wait_for(|state| matches!(state, ConnectionState::Ready | ConnectionState::Failed))
            .await
        {
            Ok(state) => *state,
            Err(_) => self.current(),
        }
    }
}

impl fmt::Debug for ConnectionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTracker")
            .field("name", &self.name)
            .field("state", &self.current())
            .finish()
    }
}
