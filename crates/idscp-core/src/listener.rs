//! Upper-layer boundary.
//!
//! The connection object above the FSM receives payloads and lifecycle
//! events through a [`ConnectionListener`]. Callbacks are queued from inside
//! transitions and delivered in order by a dedicated notifier thread, so a
//! slow or reentrant listener can never stall the transition engine.

use std::{sync::Arc, thread};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::error::FsmError;

/// Callbacks from a session to the layer above it.
pub trait ConnectionListener: Send + Sync + 'static {
    /// A payload was received from the peer.
    fn on_message(&self, data: Vec<u8>);

    /// The handshake completed for the first time.
    fn on_established(&self) {}

    /// The secure channel reported an error.
    fn on_error(&self, _error: String) {}

    /// The session is closed forever. Last callback of a session.
    fn on_close(&self) {}
}

enum Notification {
    Message(Vec<u8>),
    Established,
    Error(String),
    Closed,
}

/// Queue feeding the notifier thread.
pub(crate) struct Notifier {
    tx: UnboundedSender<Notification>,
}

impl Notifier {
    pub(crate) fn spawn(listener: Arc<dyn ConnectionListener>) -> Result<Self, FsmError> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("idscp-notifier".to_string())
            .spawn(move || run(&*listener, rx))
            .map_err(|source| FsmError::Spawn { name: "idscp-notifier", source })?;
        Ok(Self { tx })
    }

    pub(crate) fn message(&self, data: Vec<u8>) {
        self.push(Notification::Message(data));
    }

    pub(crate) fn established(&self) {
        self.push(Notification::Established);
    }

    pub(crate) fn error(&self, error: String) {
        self.push(Notification::Error(error));
    }

    pub(crate) fn closed(&self) {
        self.push(Notification::Closed);
    }

    fn push(&self, notification: Notification) {
        // Receiver is gone once Closed was delivered.
        if self.tx.send(notification).is_err() {
            trace!("notification after close dropped");
        }
    }
}

fn run(listener: &dyn ConnectionListener, mut rx: UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.blocking_recv() {
        match notification {
            Notification::Message(data) => listener.on_message(data),
            Notification::Established => listener.on_established(),
            Notification::Error(error) => listener.on_error(error),
            Notification::Closed => {
                listener.on_close();
                break;
            },
        }
    }
}
