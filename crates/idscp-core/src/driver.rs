//! Attestation driver contract.
//!
//! A driver implements one remote attestation mechanism for one role. The
//! FSM starts a fresh driver instance for every attestation run and hands it
//! a [`RatListener`]: the only way for the driver to report progress back.
//!
//! Drivers run on their own threads. Every report goes through the
//! transition lock and is tagged with the instance id the listener was
//! created for, so reports from a driver that has since been replaced are
//! discarded.

use std::{
    fmt,
    sync::{
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use idscp_proto::{IdscpMessage, IdscpRatProver, IdscpRatVerifier};

use crate::{
    error::{DriverError, FsmError},
    event::{ControlSignal, Event},
    fsm::Fsm,
};

/// Attestation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatRole {
    /// Proves the local platform state to the peer
    Prover,
    /// Checks the peer's proof
    Verifier,
}

impl RatRole {
    /// Wrap driver output into the protocol message for this role.
    pub fn message(self, data: Vec<u8>) -> IdscpMessage {
        match self {
            Self::Prover => IdscpMessage::RatProver(IdscpRatProver { data }),
            Self::Verifier => IdscpMessage::RatVerifier(IdscpRatVerifier { data }),
        }
    }

    const fn signals(self) -> (ControlSignal, ControlSignal, ControlSignal) {
        match self {
            Self::Prover => (
                ControlSignal::RatProverMsg,
                ControlSignal::RatProverOk,
                ControlSignal::RatProverFailed,
            ),
            Self::Verifier => (
                ControlSignal::RatVerifierMsg,
                ControlSignal::RatVerifierOk,
                ControlSignal::RatVerifierFailed,
            ),
        }
    }
}

/// Identity of one started driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverInstanceId(u64);

impl DriverInstanceId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DriverInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rat-driver-{}", self.0)
    }
}

/// An attestation mechanism implementation.
///
/// The factory registered in a [`DriverRegistry`](crate::DriverRegistry)
/// builds the driver around its listener; the registry then applies the
/// stored configuration and calls [`start`](Self::start).
///
/// `start`, `delegate` and `interrupt` are called while the FSM holds its
/// transition lock. They must not block and must not report through the
/// listener synchronously; doing so fails with
/// [`FsmError::ReentrantTransition`]. Real work belongs on the driver's own
/// thread.
pub trait RatDriver: Send + Sync + 'static {
    /// Per-mechanism configuration stored at registration.
    type Config: Clone + Send + Sync + 'static;

    /// Apply configuration before start.
    fn set_config(&mut self, _config: Self::Config) {}

    /// Begin the attestation exchange.
    fn start(&mut self) -> Result<(), DriverError>;

    /// Hand over a message sent by the peer's counterpart driver.
    fn delegate(&self, message: Vec<u8>);

    /// Ask the driver to stop at the next opportunity.
    fn interrupt(&self) {}

    /// Tear the driver down. Runs on a blocking worker, may take its time.
    fn terminate(&self) {}
}

/// Type-erased handle to a started driver.
pub trait RunningDriver: Send + Sync {
    /// See [`RatDriver::delegate`].
    fn delegate(&self, message: Vec<u8>);

    /// See [`RatDriver::interrupt`].
    fn interrupt(&self);

    /// See [`RatDriver::terminate`].
    fn terminate(&self);
}

impl<D: RatDriver> RunningDriver for D {
    fn delegate(&self, message: Vec<u8>) {
        RatDriver::delegate(self, message);
    }

    fn interrupt(&self) {
        RatDriver::interrupt(self);
    }

    fn terminate(&self) {
        RatDriver::terminate(self);
    }
}

/// Capability handed to a driver instance for reporting back to the FSM.
///
/// Reports from an instance the FSM no longer considers current are
/// accepted and silently dropped.
#[derive(Clone)]
pub struct RatListener {
    role: RatRole,
    instance: DriverInstanceId,
    fsm: Weak<Fsm>,
    remote_peer_dat: Option<Vec<u8>>,
    remote_peer_certificate: Option<Vec<u8>>,
}

impl RatListener {
    pub(crate) fn new(
        role: RatRole,
        instance: DriverInstanceId,
        fsm: Weak<Fsm>,
        remote_peer_dat: Option<Vec<u8>>,
        remote_peer_certificate: Option<Vec<u8>>,
    ) -> Self {
        Self { role, instance, fsm, remote_peer_dat, remote_peer_certificate }
    }

    /// Listener that is not attached to any session; every report is dropped.
    pub fn detached(role: RatRole) -> Self {
        Self::new(role, DriverInstanceId::next(), Weak::new(), None, None)
    }

    /// Role of the driver owning this listener.
    pub fn role(&self) -> RatRole {
        self.role
    }

    /// Instance this listener reports for.
    pub fn instance(&self) -> DriverInstanceId {
        self.instance
    }

    /// Token of the peer at the time the driver was started.
    pub fn remote_peer_dat(&self) -> Option<&[u8]> {
        self.remote_peer_dat.as_deref()
    }

    /// Certificate the peer presented on the secure channel.
    pub fn remote_peer_certificate(&self) -> Option<&[u8]> {
        self.remote_peer_certificate.as_deref()
    }

    /// Send a driver message to the peer's counterpart.
    pub fn report_message(&self, message: Vec<u8>) -> Result<(), FsmError> {
        let (msg, _, _) = self.role.signals();
        self.report(Event::with_message(msg, self.role.message(message)))
    }

    /// The exchange succeeded, optionally with a final message for the peer.
    pub fn report_success(&self, message: Option<Vec<u8>>) -> Result<(), FsmError> {
        let (_, ok, _) = self.role.signals();
        let event = match message {
            Some(message) => Event::with_message(ok, self.role.message(message)),
            None => Event::control(ok),
        };
        self.report(event)
    }

    /// The exchange failed.
    pub fn report_failure(&self) -> Result<(), FsmError> {
        let (_, _, failed) = self.role.signals();
        self.report(Event::control(failed))
    }

    fn report(&self, event: Event) -> Result<(), FsmError> {
        match self.fsm.upgrade() {
            Some(fsm) => fsm.on_rat_event(self.role, self.instance, &event),
            None => Err(FsmError::FsmLocked),
        }
    }
}

impl fmt::Debug for RatListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatListener")
            .field("role", &self.role)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique() {
        let a = DriverInstanceId::next();
        let b = DriverInstanceId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn role_wraps_message() {
        assert_eq!(
            RatRole::Prover.message(vec![1]),
            IdscpMessage::RatProver(IdscpRatProver { data: vec![1] })
        );
        assert_eq!(
            RatRole::Verifier.message(vec![2]),
            IdscpMessage::RatVerifier(IdscpRatVerifier { data: vec![2] })
        );
    }

    #[test]
    fn detached_listener_reports_locked() {
        let listener = RatListener::detached(RatRole::Verifier);
        assert!(matches!(listener.report_failure(), Err(FsmError::FsmLocked)));
        assert_eq!(listener.remote_peer_dat(), None);
    }
}
