//! Transition engine and session API.
//!
//! # Concurrency
//!
//! Four kinds of threads feed events into a session: the secure channel's
//! delivery thread, timer expiries, attestation drivers and the user. All of
//! them go through [`Fsm::submit`]-style entry points that take one fair
//! transition lock for the whole of state lookup, transition, state swap and
//! entry action. No two transitions ever interleave.
//!
//! A thread that already runs a transition must never submit another event:
//! after the nested transition, the outer one would resume on a state it no
//! longer controls. The engine records the owning thread of the lock and
//! rejects such calls with [`FsmError::ReentrantTransition`] instead of
//! deadlocking.
//!
//! # Blocking points
//!
//! - [`Fsm::start_handshake`] blocks until the handshake settles
//! - [`Fsm::send`] and [`Fsm::repeat_rat`] block until the first handshake
//!   settled
//! - frames from the secure channel block while the session has not left
//!   `Closed` yet
//!
//! All waits release the transition lock.

mod context;
mod timers;

use std::{
    fmt,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
};

use idscp_proto::IdscpMessage;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tracing::{error, trace, warn};

pub(crate) use self::context::Context;
#[cfg(test)]
pub(crate) use self::context::INVALID_DAT;
use self::{
    context::Session,
    timers::{TimerKind, Timers},
};
use crate::{
    channel::{SecureChannel, SecureChannelListener},
    config::{AttestationConfig, FsmConfig},
    daps::DapsDriver,
    driver::{DriverInstanceId, RatRole},
    error::FsmError,
    event::{ControlSignal, Event},
    listener::{ConnectionListener, Notifier},
    registry::RatRegistries,
    state::{FsmResultCode, FsmState, StateTable},
    states,
    timer::TimerTicket,
};

/// Collaborators a session is built from.
pub struct FsmParts {
    /// Encrypted transport to the peer
    pub channel: Arc<dyn SecureChannel>,
    /// Token service
    pub daps: Arc<dyn DapsDriver>,
    /// Attestation drivers
    pub registries: RatRegistries,
    /// Receiver of payloads and lifecycle callbacks
    pub listener: Arc<dyn ConnectionListener>,
}

/// The IDSCP2 protocol state machine of one session.
///
/// Created once per secure channel and driven until it is closed forever;
/// afterwards every event is rejected and the owner drops it.
pub struct Fsm {
    this: Weak<Fsm>,
    session: Mutex<Session>,
    /// Thread currently running a transition
    owner: Mutex<Option<ThreadId>>,
    /// Signalled when the state leaves `Closed` or the session locks
    leave_closed: Condvar,
    /// Signalled once the handshake succeeded or failed
    handshake_settled: Condvar,
    /// Lock-free copies for observers
    observed_state: AtomicUsize,
    observed_locked: AtomicBool,
    table: StateTable,
    timers: Timers,
    channel: Arc<dyn SecureChannel>,
    daps: Arc<dyn DapsDriver>,
    registries: RatRegistries,
    attestation: AttestationConfig,
    notifier: Notifier,
    runtime: Handle,
    peer_certificate: OnceLock<Vec<u8>>,
}

impl Fsm {
    /// Create a session in state `Closed`.
    ///
    /// Timers and fire-and-forget work run on `runtime`. Spawns the thread
    /// that delivers upper-layer callbacks.
    pub fn new(
        parts: FsmParts,
        attestation: AttestationConfig,
        config: &FsmConfig,
        runtime: Handle,
    ) -> Result<Arc<Self>, FsmError> {
        let FsmParts { channel, daps, registries, listener } = parts;
        let notifier = Notifier::spawn(listener)?;

        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            session: Mutex::new(Session::new()),
            owner: Mutex::new(None),
            leave_closed: Condvar::new(),
            handshake_settled: Condvar::new(),
            observed_state: AtomicUsize::new(FsmState::Closed.index()),
            observed_locked: AtomicBool::new(false),
            table: states::table(),
            timers: Timers::new(&runtime, config, &attestation, this),
            channel,
            daps,
            registries,
            attestation,
            notifier,
            runtime,
            peer_certificate: OnceLock::new(),
        }))
    }

    /// Run the handshake and block until it settles.
    ///
    /// Sends Hello, negotiates attestation mechanisms and runs both drivers.
    /// Returns once the session is established, or fails with
    /// [`FsmError::HandshakeFailed`] once it is closed forever.
    pub fn start_handshake(&self) -> Result<(), FsmError> {
        self.with_lock(|locked| {
            if locked.session().state != FsmState::Closed {
                return Err(FsmError::HandshakeAlreadyStarted);
            }
            if locked.session().locked {
                return Err(FsmError::FsmLocked);
            }

            locked.feed(&Event::control(ControlSignal::StartHandshake));

            while !locked.session().handshake_settled {
                locked.wait(&self.handshake_settled);
            }

            if locked.session().established_once { Ok(()) } else { Err(FsmError::HandshakeFailed) }
        })?
    }

    /// Send application data to the peer.
    ///
    /// Blocks until the first handshake settled. Only one message may be in
    /// flight: while it is unacknowledged this returns
    /// [`FsmResultCode::WouldBlock`].
    pub fn send(&self, data: Vec<u8>) -> Result<FsmResultCode, FsmError> {
        let event = Event::with_message(ControlSignal::SendData, IdscpMessage::data(data, false));
        self.with_lock(|locked| {
            locked.wait_until_settled(&self.handshake_settled);
            locked.feed(&event)
        })
    }

    /// Re-attest the peer now.
    ///
    /// Blocks until the first handshake settled.
    pub fn repeat_rat(&self) -> Result<FsmResultCode, FsmError> {
        self.with_lock(|locked| {
            locked.wait_until_settled(&self.handshake_settled);
            locked.feed(&Event::control(ControlSignal::RepeatRat))
        })
    }

    /// Close the session, notifying the peer when connected.
    pub fn close(&self) -> Result<FsmResultCode, FsmError> {
        trace!("closing session on user request");
        self.submit(&Event::control(ControlSignal::IdscpStop))
    }

    /// Feed one frame received from the secure channel.
    ///
    /// Unparsable frames are logged and dropped. Blocks while the handshake
    /// has not been started. Returns `None` if the frame was dropped.
    pub fn on_message(&self, frame: &[u8]) -> Result<Option<FsmResultCode>, FsmError> {
        self.check_reentrancy()?;

        let message = match idscp_proto::decode(frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, len = frame.len(), "cannot parse frame, dropping");
                return Ok(None);
            },
        };

        self.with_lock(|locked| {
            while locked.session().state == FsmState::Closed {
                if locked.session().locked {
                    trace!(kind = ?message.kind(), "fsm is locked, dropping message");
                    return None;
                }
                locked.wait(&self.leave_closed);
            }
            Some(locked.feed(&Event::Message(message)))
        })
    }

    /// Current state.
    pub fn state(&self) -> FsmState {
        FsmState::ALL
            .get(self.observed_state.load(Ordering::SeqCst))
            .copied()
            .unwrap_or(FsmState::Closed)
    }

    /// Whether application data can be exchanged right now.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Whether the session is closed forever.
    pub fn is_locked(&self) -> bool {
        self.observed_locked.load(Ordering::SeqCst)
    }

    /// Token the local peer last sent.
    pub fn local_dat(&self) -> Result<Option<Vec<u8>>, FsmError> {
        self.with_lock(|locked| locked.session().local_dat.clone())
    }

    /// Last verified token of the peer.
    pub fn remote_peer_dat(&self) -> Result<Option<Vec<u8>>, FsmError> {
        self.with_lock(|locked| locked.session().peer_dat.clone())
    }

    /// Negotiated prover and verifier mechanisms.
    pub fn mechanisms(&self) -> Result<(Option<String>, Option<String>), FsmError> {
        self.with_lock(|locked| {
            let session = locked.session();
            (session.prover_mechanism.clone(), session.verifier_mechanism.clone())
        })
    }

    /// Certificate the peer presented on the secure channel.
    pub fn peer_certificate(&self) -> Option<&[u8]> {
        self.peer_certificate.get().map(Vec::as_slice)
    }

    /// Submit one event under the transition lock.
    pub(crate) fn submit(&self, event: &Event) -> Result<FsmResultCode, FsmError> {
        self.with_lock(|locked| locked.feed(event))
    }

    pub(crate) fn on_timer(&self, kind: TimerKind, ticket: TimerTicket) {
        let result = self.with_lock(|locked| {
            if !self.timers.is_current(kind, ticket) {
                trace!(?kind, "stale timer expiry dropped");
                return;
            }
            trace!(?kind, "timer expired");
            locked.feed(&Event::control(kind.signal()));
        });

        if let Err(err) = result {
            error!(?kind, error = %err, "cannot process timer expiry");
        }
    }

    pub(crate) fn on_rat_event(
        &self,
        role: RatRole,
        instance: DriverInstanceId,
        event: &Event,
    ) -> Result<(), FsmError> {
        self.with_lock(|locked| {
            let active = match role {
                RatRole::Prover => locked.session().prover.as_ref(),
                RatRole::Verifier => locked.session().verifier.as_ref(),
            }
            .map(|driver| driver.instance);

            if active != Some(instance) {
                warn!(?role, %instance, "report from superseded attestation driver dropped");
                return;
            }
            locked.feed(event);
        })
    }

    fn check_reentrancy(&self) -> Result<ThreadId, FsmError> {
        let me = thread::current().id();
        if *self.owner.lock() == Some(me) {
            error!(
                "the current thread already holds the fsm lock; a nested transition would leave \
                 the outer one on a stale state"
            );
            return Err(FsmError::ReentrantTransition);
        }
        Ok(me)
    }

    fn with_lock<R>(&self, f: impl FnOnce(&mut Locked<'_>) -> R) -> Result<R, FsmError> {
        let me = self.check_reentrancy()?;

        let mut locked = Locked { fsm: self, guard: self.session.lock() };
        *self.owner.lock() = Some(me);
        let owner = OwnerReset(&self.owner);
        let out = f(&mut locked);
        drop(owner);
        MutexGuard::unlock_fair(locked.guard);

        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.lock();
        let out = f(&mut session);
        self.observed_state.store(session.state.index(), Ordering::SeqCst);
        self.observed_locked.store(session.locked, Ordering::SeqCst);
        out
    }
}

impl SecureChannelListener for Fsm {
    fn on_bytes(&self, frame: &[u8]) {
        if let Err(err) = self.on_message(frame) {
            error!(error = %err, "cannot process inbound frame");
        }
    }

    fn on_error(&self, error: &str) {
        let result = self.with_lock(|locked| {
            if !locked.session().locked {
                self.notifier.error(error.to_string());
            }
            locked.feed(&Event::control(ControlSignal::Error))
        });

        if let Err(err) = result {
            error!(error = %err, "cannot process secure channel error");
        }
    }

    fn on_closed(&self) {
        if let Err(err) = self.submit(&Event::control(ControlSignal::IdscpStop)) {
            error!(error = %err, "cannot process secure channel closure");
        }
    }

    fn on_peer_identity(&self, certificate: Vec<u8>) {
        if self.peer_certificate.set(certificate).is_err() {
            warn!("peer certificate already set, ignoring");
        }
    }
}

impl fmt::Debug for Fsm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("state", &self.state())
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// Clears the transition owner when dropped, also while unwinding.
struct OwnerReset<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for OwnerReset<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Exclusive access to the session while a transition runs.
struct Locked<'a> {
    fsm: &'a Fsm,
    guard: MutexGuard<'a, Session>,
}

impl Locked<'_> {
    fn session(&self) -> &Session {
        &self.guard
    }

    /// Wait on `condvar`, releasing the lock meanwhile.
    fn wait(&mut self, condvar: &Condvar) {
        *self.fsm.owner.lock() = None;
        condvar.wait(&mut self.guard);
        *self.fsm.owner.lock() = Some(thread::current().id());
    }

    fn wait_until_settled(&mut self, condvar: &Condvar) {
        while !self.guard.handshake_settled {
            self.wait(condvar);
        }
    }

    /// Feed `event` to the current state, install the next state and run
    /// its entry action if the state changed.
    fn feed(&mut self, event: &Event) -> FsmResultCode {
        let fsm = self.fsm;
        let mut ctx = Context::new(fsm, &mut self.guard);

        let previous = ctx.state();
        let result = fsm.table.get(previous).feed(&mut ctx, event);
        ctx.session.state = result.next;
        fsm.observed_state.store(result.next.index(), Ordering::SeqCst);

        if result.next != previous {
            trace!(from = ?previous, to = ?result.next, code = ?result.code, "switched state");
            if previous == FsmState::Closed {
                fsm.leave_closed.notify_all();
            }
            fsm.table.get(result.next).enter(&mut ctx);
        }

        result.code
    }
}
