//! Error types for the protocol core.
//!
//! Transition-local outcomes are never errors: they resolve to an
//! [`FsmResultCode`](crate::FsmResultCode). The types here cover API misuse,
//! handshake failure and collaborator failures.

use std::io;

use thiserror::Error;

/// Errors surfaced by the FSM API.
#[derive(Error, Debug)]
pub enum FsmError {
    /// An event was submitted by the thread that is running a transition
    ///
    /// This indicates a driver or caller bug: the outer transition would
    /// resume on a state it no longer controls.
    #[error("reentrant transition: the current thread already holds the fsm lock")]
    ReentrantTransition,

    /// `start_handshake` was called on a session that already started
    #[error("handshake has already been started")]
    HandshakeAlreadyStarted,

    /// The session is closed forever
    #[error("fsm is locked forever")]
    FsmLocked,

    /// The handshake ended without reaching the established state
    #[error("handshake failed")]
    HandshakeFailed,

    /// A background thread could not be spawned
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name
        name: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl FsmError {
    /// Returns true if retrying the call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Errors from starting an attestation driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// No driver is registered for the mechanism
    #[error("no driver registered for mechanism '{0}'")]
    UnknownMechanism(String),

    /// The driver refused to start
    #[error("driver failed to start: {0}")]
    StartFailed(String),

    /// The driver factory or start routine panicked
    #[error("driver for mechanism '{0}' panicked during start")]
    Panicked(String),
}

/// Errors from the token service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DapsError {
    /// A token could not be issued
    #[error("token unavailable: {0}")]
    TokenUnavailable(String),

    /// The peer's token was rejected
    #[error("invalid token: {0}")]
    InvalidToken(String),
}
