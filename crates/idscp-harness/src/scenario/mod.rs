//! Scenario tests.
//!
//! A scenario wires two peers over a loopback channel, runs both
//! handshakes concurrently and hands the resulting [`World`] to an oracle.
//! The oracle is mandatory: a scenario cannot run without verification.

mod builder;
pub mod oracle;
mod world;

pub use builder::{PeerConfig, RunnableScenario, Scenario};
pub use world::{Peer, World};

/// Verification run against the world after the handshakes.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
