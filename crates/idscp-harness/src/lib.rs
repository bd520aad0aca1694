//! Test harness for IDSCP2 sessions.
//!
//! Runs two complete sessions against each other in one process: an
//! in-memory secure channel with fault injection connects them, dummy
//! attestation drivers run the RAT exchange and a static token service
//! issues and accepts tokens.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod daps;
pub mod drivers;
pub mod listener;
pub mod loopback;
pub mod scenario;

use std::time::{Duration, Instant};

pub use daps::StaticDaps;
pub use drivers::{DUMMY_MECHANISM, DummyProver, DummyVerifier, FailingDriver, RefusingDriver};
pub use listener::RecordingListener;
pub use loopback::{LoopbackChannel, loopback_pair};
pub use scenario::{Peer, PeerConfig, Scenario, World};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// passed. Returns the final outcome.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
