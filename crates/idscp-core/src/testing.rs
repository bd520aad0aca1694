//! Test doubles for the FSM's collaborators.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use idscp_proto::IdscpMessage;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};

use crate::{
    channel::SecureChannel,
    config::{AttestationConfig, FsmConfig},
    daps::DapsDriver,
    driver::{RatDriver, RatListener},
    error::{DapsError, DriverError},
    fsm::{Fsm, FsmParts},
    listener::ConnectionListener,
    registry::RatRegistries,
    state::FsmState,
};

pub(crate) const MECHANISM: &str = "Dummy";
pub(crate) const TOKEN: &[u8] = b"token";

/// Channel that records every frame it is asked to send.
#[derive(Default)]
pub(crate) struct RecordingChannel {
    frames: Mutex<Vec<Vec<u8>>>,
    pub(crate) fail: AtomicBool,
    pub(crate) closes: AtomicUsize,
}

impl RecordingChannel {
    pub(crate) fn sent(&self) -> Vec<IdscpMessage> {
        self.frames.lock().iter().filter_map(|frame| idscp_proto::decode(frame).ok()).collect()
    }

    pub(crate) fn last(&self) -> Option<IdscpMessage> {
        self.sent().pop()
    }

    pub(crate) fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl SecureChannel for RecordingChannel {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel down"));
        }
        self.frames.lock().push(frame.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Token service issuing [`TOKEN`] and accepting any token but the sentinel.
pub(crate) struct FixedDaps {
    pub(crate) fail_issue: AtomicBool,
    pub(crate) validity: Mutex<Duration>,
}

impl Default for FixedDaps {
    fn default() -> Self {
        Self { fail_issue: AtomicBool::new(false), validity: Mutex::new(Duration::from_secs(3600)) }
    }
}

impl DapsDriver for FixedDaps {
    fn token(&self) -> Result<Vec<u8>, DapsError> {
        if self.fail_issue.load(Ordering::SeqCst) {
            return Err(DapsError::TokenUnavailable("daps offline".to_string()));
        }
        Ok(TOKEN.to_vec())
    }

    fn verify_token(&self, token: &[u8], _: Option<&[u8]>) -> Result<Duration, DapsError> {
        if token == crate::fsm::INVALID_DAT {
            return Err(DapsError::InvalidToken("sentinel".to_string()));
        }
        Ok(*self.validity.lock())
    }
}

#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) messages: Mutex<Vec<Vec<u8>>>,
    pub(crate) established: AtomicUsize,
    pub(crate) closed: AtomicUsize,
}

impl ConnectionListener for RecordingListener {
    fn on_message(&self, data: Vec<u8>) {
        self.messages.lock().push(data);
    }

    fn on_established(&self) {
        self.established.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Driver that never reports on its own; tests report through the
/// listeners it collects.
pub(crate) struct SilentDriver {
    delegated: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RatDriver for SilentDriver {
    type Config = ();

    fn start(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn delegate(&self, message: Vec<u8>) {
        self.delegated.lock().push(message);
    }
}

/// Listeners handed to started drivers, in start order.
#[derive(Default, Clone)]
pub(crate) struct Started {
    pub(crate) listeners: Arc<Mutex<Vec<RatListener>>>,
    pub(crate) delegated: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Started {
    pub(crate) fn latest(&self, role: crate::driver::RatRole) -> Option<RatListener> {
        self.listeners.lock().iter().rev().find(|l| l.role() == role).cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Registries with a [`SilentDriver`] under [`MECHANISM`] for both roles.
pub(crate) fn silent_registries() -> (RatRegistries, Started) {
    let registries = RatRegistries::new();
    let started = Started::default();
    for registry in [&registries.provers, &registries.verifiers] {
        let started = started.clone();
        registry.register(
            MECHANISM,
            move |listener: RatListener| {
                started.listeners.lock().push(listener);
                SilentDriver { delegated: Arc::clone(&started.delegated) }
            },
            None,
        );
    }
    (registries, started)
}

/// One FSM wired to recording doubles.
pub(crate) struct TestFsm {
    pub(crate) fsm: Arc<Fsm>,
    pub(crate) channel: Arc<RecordingChannel>,
    pub(crate) daps: Arc<FixedDaps>,
    pub(crate) listener: Arc<RecordingListener>,
    pub(crate) started: Started,
    _runtime: Runtime,
}

impl TestFsm {
    pub(crate) fn new() -> Self {
        Self::with_config(FsmConfig::default())
    }

    pub(crate) fn with_config(config: FsmConfig) -> Self {
        let (registries, started) = silent_registries();
        Self::build(config, registries, started)
    }

    pub(crate) fn build(config: FsmConfig, registries: RatRegistries, started: Started) -> Self {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .expect("runtime");
        let channel = Arc::new(RecordingChannel::default());
        let daps = Arc::new(FixedDaps::default());
        let listener = Arc::new(RecordingListener::default());

        let parts = FsmParts {
            channel: Arc::clone(&channel) as Arc<dyn SecureChannel>,
            daps: Arc::clone(&daps) as Arc<dyn DapsDriver>,
            registries,
            listener: Arc::clone(&listener) as Arc<dyn ConnectionListener>,
        };
        let attestation = AttestationConfig::default()
            .with_supported_provers([MECHANISM])
            .with_expected_verifiers([MECHANISM]);
        let fsm =
            Fsm::new(parts, attestation, &config, runtime.handle().clone()).expect("fsm");

        Self { fsm, channel, daps, listener, started, _runtime: runtime }
    }

    /// Put the session into `state` as if a handshake had completed.
    pub(crate) fn force(&self, state: FsmState) {
        self.fsm.with_session(|session| {
            session.state = state;
            session.handshake_settled = true;
            session.established_once = true;
            session.prover_mechanism = Some(MECHANISM.to_string());
            session.verifier_mechanism = Some(MECHANISM.to_string());
            session.peer_dat = Some(TOKEN.to_vec());
        });
    }

    pub(crate) fn inbound(&self, message: &IdscpMessage) -> Option<crate::FsmResultCode> {
        let frame = idscp_proto::encode(message).expect("encode");
        self.fsm.on_message(&frame).expect("on_message")
    }
}

/// Poll `condition` until it holds or two seconds passed.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
