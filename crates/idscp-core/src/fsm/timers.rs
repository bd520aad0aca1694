//! The six timers of a session.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::runtime::Handle;

use super::Fsm;
use crate::{
    config::{AttestationConfig, FsmConfig},
    event::ControlSignal,
    timer::{DynamicTimer, StaticTimer, TimerCallback, TimerTicket},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Handshake,
    ProverHandshake,
    VerifierHandshake,
    Rat,
    Ack,
    Dat,
}

impl TimerKind {
    pub(crate) const fn signal(self) -> ControlSignal {
        match self {
            Self::Handshake | Self::ProverHandshake | Self::VerifierHandshake => {
                ControlSignal::Timeout
            },
            Self::Rat => ControlSignal::RepeatRat,
            Self::Ack => ControlSignal::AckTimerExpired,
            Self::Dat => ControlSignal::DatTimerExpired,
        }
    }
}

pub(crate) struct Timers {
    /// Whole handshake and each re-attestation
    pub(crate) handshake: StaticTimer,
    /// Running prover exchange
    pub(crate) prover_handshake: StaticTimer,
    /// Running verifier exchange
    pub(crate) verifier_handshake: StaticTimer,
    /// Periodic re-attestation of the peer
    pub(crate) rat: StaticTimer,
    /// Outstanding Data message
    pub(crate) ack: StaticTimer,
    /// Validity of the peer's token
    pub(crate) dat: DynamicTimer,
}

impl Timers {
    pub(crate) fn new(
        runtime: &Handle,
        config: &FsmConfig,
        attestation: &AttestationConfig,
        fsm: &Weak<Fsm>,
    ) -> Self {
        let callback = |kind: TimerKind| -> TimerCallback {
            let fsm = fsm.clone();
            Arc::new(move |ticket: TimerTicket| {
                if let Some(fsm) = fsm.upgrade() {
                    fsm.on_timer(kind, ticket);
                }
            })
        };
        let fixed = |kind: TimerKind, delay: Duration| {
            StaticTimer::new(runtime.clone(), delay, callback(kind))
        };

        Self {
            handshake: fixed(TimerKind::Handshake, config.handshake_timeout),
            prover_handshake: fixed(TimerKind::ProverHandshake, config.handshake_timeout),
            verifier_handshake: fixed(TimerKind::VerifierHandshake, config.handshake_timeout),
            rat: fixed(TimerKind::Rat, attestation.rat_timeout),
            ack: fixed(TimerKind::Ack, config.ack_timeout),
            dat: DynamicTimer::new(runtime.clone(), callback(TimerKind::Dat)),
        }
    }

    pub(crate) fn is_current(&self, kind: TimerKind, ticket: TimerTicket) -> bool {
        match kind {
            TimerKind::Handshake => self.handshake.is_current(ticket),
            TimerKind::ProverHandshake => self.prover_handshake.is_current(ticket),
            TimerKind::VerifierHandshake => self.verifier_handshake.is_current(ticket),
            TimerKind::Rat => self.rat.is_current(ticket),
            TimerKind::Ack => self.ack.is_current(ticket),
            TimerKind::Dat => self.dat.is_current(ticket),
        }
    }

    /// Cancel the session timers. Driver timers are cancelled with their
    /// drivers.
    pub(crate) fn cancel_session(&self) {
        self.dat.cancel();
        self.rat.cancel();
        self.handshake.cancel();
        self.ack.cancel();
    }
}
