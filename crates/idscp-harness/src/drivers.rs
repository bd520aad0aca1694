//! Attestation drivers for tests.
//!
//! The dummy pair runs a minimal exchange: the prover sends a challenge
//! response, the verifier answers it and accepts, the prover accepts once
//! it saw the answer. Each instance works on its own thread and reports
//! through its [`RatListener`], never from within `start`.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use idscp_core::{DriverError, FsmError, RatDriver, RatListener, RatRegistries};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

/// Mechanism name the dummy drivers are registered under.
pub const DUMMY_MECHANISM: &str = "Dummy";

const PROVER_MESSAGE: &[u8] = b"test";
const VERIFIER_MESSAGE: &[u8] = b"test";

/// Register [`DummyProver`] and [`DummyVerifier`] under `mechanism`.
pub fn register_dummy(registries: &RatRegistries, mechanism: &str) {
    registries.provers.register(mechanism, DummyProver::new, None);
    registries.verifiers.register(mechanism, DummyVerifier::new, None);
}

/// Inbox and worker thread shared by the dummy drivers.
struct Worker {
    listener: RatListener,
    tx: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    rx: Mutex<Option<UnboundedReceiver<Vec<u8>>>>,
    interrupted: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn new(listener: RatListener) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            listener,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            interrupted: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    fn spawn(
        &self,
        name: &str,
        work: impl FnOnce(RatListener, UnboundedReceiver<Vec<u8>>, Arc<AtomicBool>)
        + Send
        + 'static,
    ) -> Result<(), DriverError> {
        let Some(rx) = self.rx.lock().take() else {
            return Err(DriverError::StartFailed(format!("{name} already started")));
        };
        let listener = self.listener.clone();
        let interrupted = Arc::clone(&self.interrupted);

        let handle = thread::Builder::new()
            .name(format!("{name}-{}", self.listener.instance()))
            .spawn(move || work(listener, rx, interrupted))
            .map_err(|err| DriverError::StartFailed(err.to_string()))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    fn delegate(&self, message: Vec<u8>) {
        match self.tx.lock().as_ref() {
            Some(tx) if tx.send(message).is_ok() => {},
            _ => trace!(instance = %self.listener.instance(), "driver stopped, message dropped"),
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        // Closing the inbox wakes a waiting worker.
        self.tx.lock().take();
    }

    fn terminate(&self) {
        self.interrupt();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!(instance = %self.listener.instance(), "driver thread panicked");
        }
    }
}

/// Log a report that did not reach the session.
fn reported(result: Result<(), FsmError>, what: &str) {
    if let Err(err) = result {
        warn!(error = %err, "cannot report {what}");
    }
}

/// Prover half of the dummy mechanism.
pub struct DummyProver {
    worker: Worker,
}

impl DummyProver {
    /// Build a prover reporting through `listener`.
    pub fn new(listener: RatListener) -> Self {
        Self { worker: Worker::new(listener) }
    }
}

impl RatDriver for DummyProver {
    type Config = ();

    fn start(&mut self) -> Result<(), DriverError> {
        self.worker.spawn("dummy-prover", |listener, mut rx, interrupted| {
            reported(listener.report_message(PROVER_MESSAGE.to_vec()), "prover message");

            let Some(answer) = rx.blocking_recv() else {
                debug!(instance = %listener.instance(), "prover interrupted");
                return;
            };
            if interrupted.load(Ordering::SeqCst) {
                return;
            }
            trace!(len = answer.len(), "prover received verifier message");
            reported(listener.report_success(None), "prover success");
        })
    }

    fn delegate(&self, message: Vec<u8>) {
        self.worker.delegate(message);
    }

    fn interrupt(&self) {
        self.worker.interrupt();
    }

    fn terminate(&self) {
        self.worker.terminate();
    }
}

/// Verifier half of the dummy mechanism.
pub struct DummyVerifier {
    worker: Worker,
}

impl DummyVerifier {
    /// Build a verifier reporting through `listener`.
    pub fn new(listener: RatListener) -> Self {
        Self { worker: Worker::new(listener) }
    }
}

impl RatDriver for DummyVerifier {
    type Config = ();

    fn start(&mut self) -> Result<(), DriverError> {
        self.worker.spawn("dummy-verifier", |listener, mut rx, interrupted| {
            let Some(evidence) = rx.blocking_recv() else {
                debug!(instance = %listener.instance(), "verifier interrupted");
                return;
            };
            if interrupted.load(Ordering::SeqCst) {
                return;
            }
            trace!(len = evidence.len(), "verifier received prover message");
            reported(listener.report_message(VERIFIER_MESSAGE.to_vec()), "verifier message");
            reported(listener.report_success(None), "verifier success");
        })
    }

    fn delegate(&self, message: Vec<u8>) {
        self.worker.delegate(message);
    }

    fn interrupt(&self) {
        self.worker.interrupt();
    }

    fn terminate(&self) {
        self.worker.terminate();
    }
}

/// Driver that starts, waits for its configured delay and reports failure.
///
/// An interrupt during the delay ends it silently.
pub struct FailingDriver {
    worker: Worker,
    delay: Duration,
}

impl FailingDriver {
    /// Build a driver that fails right after start.
    pub fn new(listener: RatListener) -> Self {
        Self { worker: Worker::new(listener), delay: Duration::ZERO }
    }
}

impl RatDriver for FailingDriver {
    type Config = Duration;

    fn set_config(&mut self, delay: Duration) {
        self.delay = delay;
    }

    fn start(&mut self) -> Result<(), DriverError> {
        let delay = self.delay;
        self.worker.spawn("failing-driver", move |listener, _rx, interrupted| {
            let deadline = Instant::now() + delay;
            while Instant::now() < deadline {
                if interrupted.load(Ordering::SeqCst) {
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
            reported(listener.report_failure(), "failure");
        })
    }

    fn delegate(&self, _message: Vec<u8>) {}

    fn interrupt(&self) {
        self.worker.interrupt();
    }

    fn terminate(&self) {
        self.worker.terminate();
    }
}

/// Driver whose start always fails.
pub struct RefusingDriver;

impl RefusingDriver {
    /// Build a refusing driver; the listener is never used.
    pub fn new(_listener: RatListener) -> Self {
        Self
    }
}

impl RatDriver for RefusingDriver {
    type Config = ();

    fn start(&mut self) -> Result<(), DriverError> {
        Err(DriverError::StartFailed("refusing driver".to_string()))
    }

    fn delegate(&self, _message: Vec<u8>) {}
}
