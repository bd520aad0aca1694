//! IDSCP2 protocol core logic
//!
//! The protocol finite state machine: mutual remote attestation, dynamic
//! attribute token freshness and alternating-bit reliable delivery, driven by
//! three concurrent event sources (secure channel, timers, attestation
//! drivers) that are serialized through one transition lock.
//!
//! # Architecture
//!
//! Each [`FsmState`] is a table from event kind to transition function. A
//! transition receives a [`fsm::Context`](crate::fsm) holding the session
//! state and returns an [`FsmResult`]: a result code plus the next state. The
//! engine installs the next state and runs its entry action before the lock
//! is released.
//!
//! Everything outside the protocol is a collaborator behind a trait: the
//! encrypted transport ([`SecureChannel`]), the token service
//! ([`DapsDriver`]), attestation mechanisms ([`RatDriver`]) and the upper
//! layer ([`ConnectionListener`]). Upper-layer callbacks are never invoked
//! while the transition lock is held.
//!
//! # Components
//!
//! - [`fsm`]: Transition engine and public session API
//! - [`state`]: States, result codes, transition tables
//! - [`mod@event`]: Control signals and inbound message events
//! - [`timer`]: Re-armable timers with stale-expiry detection
//! - [`driver`]: Attestation driver contract and listener capability
//! - [`registry`]: Mechanism name to driver factory lookup
//! - [`negotiation`]: Attestation mechanism matching
//! - [`alternating_bit`]: Sequence bit for reliable delivery
//! - [`channel`], [`daps`], [`listener`]: Collaborator boundaries
//! - [`config`], [`error`]: Configuration and error types

pub mod alternating_bit;
pub mod channel;
pub mod config;
pub mod daps;
pub mod driver;
pub mod error;
pub mod event;
pub mod fsm;
pub mod listener;
pub mod negotiation;
pub mod registry;
pub mod state;
pub mod timer;

mod states;

#[cfg(test)]
pub(crate) mod testing;

pub use alternating_bit::AlternatingBit;
pub use channel::{SecureChannel, SecureChannelListener};
pub use config::{AttestationConfig, FsmConfig};
pub use daps::DapsDriver;
pub use driver::{DriverInstanceId, RatDriver, RatListener, RatRole, RunningDriver};
pub use error::{DapsError, DriverError, FsmError};
pub use event::{ControlSignal, Event, EventKind};
pub use fsm::{Fsm, FsmParts};
pub use listener::ConnectionListener;
pub use registry::{DriverRegistry, RatRegistries};
pub use state::{FsmResult, FsmResultCode, FsmState};
