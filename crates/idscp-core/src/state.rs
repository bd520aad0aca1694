//! Protocol states and transition tables.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐ start  ┌────────────────┐ Hello  ┌──────────────┐
//! │ Closed │───────>│ WaitForHello   │───────>│ WaitForRat   │
//! └────────┘        └────────────────┘        └──────────────┘
//!     ^                                      prover ok │   │ verifier ok
//!     │                                                v   v
//!     │                      ┌─────────────────────┐     ┌───────────────────┐
//!     │                      │ WaitForRatVerifier  │     │ WaitForRatProver  │
//!     │                      └─────────────────────┘     └───────────────────┘
//!     │                                  │ verifier ok        │ prover ok
//!     │                                  v                    v
//!     │  close/error     ┌─────────────┐  send  ┌────────────┐
//!     └──────────────────│ Established │<──────>│ WaitForAck │
//!                        └─────────────┘  ack   └────────────┘
//! ```
//!
//! Token expiry moves to `WaitForDatAndRat` or `WaitForDatAndRatVerifier`
//! until the peer sends a fresh token. Every state reaches `Closed` on stop,
//! error, timeout or an inbound Close.

use std::{collections::HashMap, fmt};

use tracing::trace;

use crate::{
    event::{Event, EventKind},
    fsm::Context,
};

/// The nine protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsmState {
    /// Not started, or closed forever
    Closed,
    /// Hello sent, waiting for the peer's Hello
    WaitForHello,
    /// Prover and verifier both running
    WaitForRat,
    /// Verifier done, prover still running
    WaitForRatProver,
    /// Prover done, verifier still running
    WaitForRatVerifier,
    /// Prover running, waiting for a fresh peer token
    WaitForDatAndRat,
    /// Prover done, waiting for a fresh peer token
    WaitForDatAndRatVerifier,
    /// Session established, data may flow
    Established,
    /// One Data message in flight, waiting for its Ack
    WaitForAck,
}

impl FsmState {
    /// Every state, in table order.
    pub const ALL: [Self; 9] = [
        Self::Closed,
        Self::WaitForHello,
        Self::WaitForRat,
        Self::WaitForRatProver,
        Self::WaitForRatVerifier,
        Self::WaitForDatAndRat,
        Self::WaitForDatAndRatVerifier,
        Self::Established,
        Self::WaitForAck,
    ];

    /// Position in [`FsmState::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether application data can be exchanged in this state.
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Established | Self::WaitForAck)
    }
}

/// Outcome of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsmResultCode {
    /// Transition succeeded
    Ok,
    /// No transition for this event in the current state
    UnknownTransition,
    /// The session is closed forever
    FsmLocked,
    /// The handshake was never started
    FsmNotStarted,
    /// The peer's Hello carried no token
    MissingDat,
    /// The peer's token was rejected
    InvalidDat,
    /// The secure channel failed
    IoError,
    /// An attestation driver failed or could not be started
    RatError,
    /// No common attestation mechanism
    RatNegotiationError,
    /// The request must wait until the session is established again
    WouldBlock,
    /// The session is not connected
    NotConnected,
    /// The retransmit buffer is empty while waiting for an Ack
    IdscpDataNotCached,
}

impl FsmResultCode {
    /// Human readable description.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "Action succeed.",
            Self::UnknownTransition => "No transition available for given event in current state.",
            Self::FsmLocked => "FSM is locked forever.",
            Self::FsmNotStarted => "Handshake was never started.",
            Self::MissingDat => "DAT is missing.",
            Self::InvalidDat => "DAT is invalid.",
            Self::IoError => "Secure channel not available.",
            Self::RatError => "RAT error occurred.",
            Self::RatNegotiationError => "Error during negotiation of RAT mechanisms.",
            Self::WouldBlock => "Operation would block until FSM is in state 'ESTABLISHED'.",
            Self::NotConnected => "Protocol is not in a connected state at the moment.",
            Self::IdscpDataNotCached => "IdscpData must be buffered in the 'WAIT_FOR_ACK' state.",
        }
    }
}

impl fmt::Display for FsmResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Result code and next state of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsmResult {
    /// Outcome of the transition
    pub code: FsmResultCode,
    /// State installed after the transition
    pub next: FsmState,
}

impl FsmResult {
    /// Create a result.
    pub const fn new(code: FsmResultCode, next: FsmState) -> Self {
        Self { code, next }
    }

    /// Successful transition into `next`.
    pub const fn ok(next: FsmState) -> Self {
        Self::new(FsmResultCode::Ok, next)
    }
}

/// Transition function.
pub(crate) type Transition = fn(&mut Context<'_>, &Event) -> FsmResult;

/// Entry action, run when a transition switches into the state.
pub(crate) type EntryAction = fn(&mut Context<'_>);

/// One state: transition table, entry action and default handler.
pub(crate) struct State {
    kind: FsmState,
    transitions: HashMap<EventKind, Transition>,
    entry: Option<EntryAction>,
    fallback: Transition,
}

impl State {
    pub(crate) fn new(kind: FsmState) -> Self {
        Self { kind, transitions: HashMap::new(), entry: None, fallback: unknown_transition }
    }

    pub(crate) fn on(mut self, event: impl Into<EventKind>, transition: Transition) -> Self {
        self.transitions.insert(event.into(), transition);
        self
    }

    pub(crate) fn on_entry(mut self, action: EntryAction) -> Self {
        self.entry = Some(action);
        self
    }

    pub(crate) fn otherwise(mut self, fallback: Transition) -> Self {
        self.fallback = fallback;
        self
    }

    pub(crate) fn kind(&self) -> FsmState {
        self.kind
    }

    /// Whether `event` has an explicit transition, not the fallback.
    #[cfg(test)]
    pub(crate) fn handles(&self, event: impl Into<EventKind>) -> bool {
        self.transitions.contains_key(&event.into())
    }

    pub(crate) fn feed(&self, ctx: &mut Context<'_>, event: &Event) -> FsmResult {
        match self.transitions.get(&event.kind()) {
            Some(transition) => transition(ctx, event),
            None => (self.fallback)(ctx, event),
        }
    }

    pub(crate) fn enter(&self, ctx: &mut Context<'_>) {
        if let Some(entry) = self.entry {
            entry(ctx);
        }
    }
}

/// Default handler: stay and report an unknown transition.
fn unknown_transition(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let state = ctx.state();
    trace!(?state, kind = ?event.kind(), "no transition available, staying");
    FsmResult::new(FsmResultCode::UnknownTransition, state)
}

/// All nine states, indexed by [`FsmState::index`].
pub(crate) struct StateTable {
    states: [State; 9],
}

impl StateTable {
    pub(crate) fn new(states: [State; 9]) -> Self {
        debug_assert!(states.iter().enumerate().all(|(i, s)| s.kind().index() == i));
        Self { states }
    }

    pub(crate) fn get(&self, state: FsmState) -> &State {
        &self.states[state.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_follows_all_order() {
        for (i, state) in FsmState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn connected_states() {
        let connected: Vec<_> = FsmState::ALL.into_iter().filter(|s| s.is_connected()).collect();
        assert_eq!(connected, vec![FsmState::Established, FsmState::WaitForAck]);
    }

    #[test]
    fn result_code_display_uses_description() {
        assert_eq!(FsmResultCode::FsmLocked.to_string(), "FSM is locked forever.");
        assert_eq!(FsmResultCode::Ok.to_string(), "Action succeed.");
    }
}
