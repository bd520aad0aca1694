//! Session state and the operations transitions perform on it.

use std::sync::Arc;

use idscp_proto::{
    CloseCause, IdscpAck, IdscpDat, IdscpData, IdscpHello, IdscpMessage, PROTOCOL_VERSION,
};
use tracing::{debug, error, trace, warn};

use super::{Fsm, timers::Timers};
use crate::{
    alternating_bit::AlternatingBit,
    config::AttestationConfig,
    driver::{DriverInstanceId, RatListener, RatRole, RunningDriver},
    event::Event,
    state::{FsmResult, FsmResultCode, FsmState},
};

/// Token sent when the token service cannot issue one. The peer rejects it
/// and the handshake fails on its side.
pub(crate) const INVALID_DAT: &[u8] = b"INVALID_DAT";

/// A started attestation driver and its identity.
pub(crate) struct ActiveDriver {
    pub(crate) instance: DriverInstanceId,
    pub(crate) driver: Arc<dyn RunningDriver>,
}

/// Mutable session state, only touched under the transition lock.
pub(crate) struct Session {
    pub(crate) state: FsmState,
    /// Closed forever, never cleared
    pub(crate) locked: bool,
    pub(crate) handshake_settled: bool,
    pub(crate) established_once: bool,
    /// Data awaiting its Ack; `Some` is the ack-pending flag
    pub(crate) pending_ack: Option<IdscpData>,
    pub(crate) next_send_bit: AlternatingBit,
    pub(crate) expected_bit: AlternatingBit,
    pub(crate) prover: Option<ActiveDriver>,
    pub(crate) verifier: Option<ActiveDriver>,
    pub(crate) prover_mechanism: Option<String>,
    pub(crate) verifier_mechanism: Option<String>,
    pub(crate) local_dat: Option<Vec<u8>>,
    pub(crate) peer_dat: Option<Vec<u8>>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            state: FsmState::Closed,
            locked: false,
            handshake_settled: false,
            established_once: false,
            pending_ack: None,
            next_send_bit: AlternatingBit::new(),
            expected_bit: AlternatingBit::new(),
            prover: None,
            verifier: None,
            prover_mechanism: None,
            verifier_mechanism: None,
            local_dat: None,
            peer_dat: None,
        }
    }
}

/// What a transition sees: the session plus the FSM's collaborators.
pub(crate) struct Context<'a> {
    fsm: &'a Fsm,
    pub(crate) session: &'a mut Session,
}

impl<'a> Context<'a> {
    pub(crate) fn new(fsm: &'a Fsm, session: &'a mut Session) -> Self {
        Self { fsm, session }
    }

    /// State the transition is running in.
    pub(crate) fn state(&self) -> FsmState {
        self.session.state
    }

    pub(crate) fn timers(&self) -> &'a Timers {
        &self.fsm.timers
    }

    pub(crate) fn attestation(&self) -> &'a AttestationConfig {
        &self.fsm.attestation
    }

    /// Encode and send `message`. Failures are logged and reported as
    /// `false`, never raised.
    pub(crate) fn send(&self, message: &IdscpMessage) -> bool {
        let frame = match idscp_proto::encode(message) {
            Ok(frame) => frame,
            Err(err) => {
                error!(kind = ?message.kind(), error = %err, "cannot encode message");
                return false;
            },
        };

        match self.fsm.channel.send(&frame) {
            Ok(()) => {
                trace!(kind = ?message.kind(), "sent");
                true
            },
            Err(err) => {
                warn!(kind = ?message.kind(), error = %err, "secure channel send failed");
                false
            },
        }
    }

    /// Tell the peer why we close and move to `Closed` with `code`.
    pub(crate) fn close_with(
        &self,
        cause: CloseCause,
        reason: &str,
        code: FsmResultCode,
    ) -> FsmResult {
        debug!(?cause, reason, "closing session");
        if !self.send(&IdscpMessage::close(cause, reason)) {
            trace!("close message not delivered");
        }
        FsmResult::new(code, FsmState::Closed)
    }

    /// Fetch a fresh local token.
    ///
    /// A token service failure is logged and [`INVALID_DAT`] is used
    /// instead, so the transition still completes.
    pub(crate) fn local_dat(&mut self) -> Vec<u8> {
        match self.fsm.daps.token() {
            Ok(token) => {
                self.session.local_dat = Some(token.clone());
                token
            },
            Err(err) => {
                error!(error = %err, "cannot fetch DAT, sending invalid token");
                INVALID_DAT.to_vec()
            },
        }
    }

    /// Hello carrying a fresh token and the local attestation suites.
    pub(crate) fn hello(&mut self) -> IdscpMessage {
        let token = self.local_dat();
        let attestation = self.attestation();
        IdscpMessage::Hello(IdscpHello {
            version: PROTOCOL_VERSION,
            dynamic_attribute_token: Some(IdscpDat { token }),
            supported_rat_suite: attestation.supported_provers.clone(),
            expected_rat_suite: attestation.expected_verifiers.clone(),
        })
    }

    /// Verify the peer's token, remember it and arm the token timer with
    /// its validity.
    pub(crate) fn accept_peer_dat(&mut self, dat: &IdscpDat) -> bool {
        let certificate = self.fsm.peer_certificate.get().map(Vec::as_slice);
        match self.fsm.daps.verify_token(&dat.token, certificate) {
            Ok(validity) => {
                debug!(?validity, "peer DAT verified");
                self.session.peer_dat = Some(dat.token.clone());
                self.fsm.timers.dat.start(validity);
                true
            },
            Err(err) => {
                warn!(error = %err, "peer DAT rejected");
                false
            },
        }
    }

    pub(crate) fn restart_prover(&mut self) -> bool {
        self.restart_driver(RatRole::Prover)
    }

    pub(crate) fn restart_verifier(&mut self) -> bool {
        self.restart_driver(RatRole::Verifier)
    }

    pub(crate) fn stop_prover(&mut self) {
        self.stop_driver(RatRole::Prover);
    }

    pub(crate) fn stop_verifier(&mut self) {
        self.stop_driver(RatRole::Verifier);
    }

    /// Stop the current driver of `role`, then start a new instance of the
    /// negotiated mechanism and arm its handshake timer.
    fn restart_driver(&mut self, role: RatRole) -> bool {
        self.stop_driver(role);

        let fsm = self.fsm;
        let (mechanism, registry, timer) = match role {
            RatRole::Prover => (
                self.session.prover_mechanism.clone(),
                &fsm.registries.provers,
                &fsm.timers.prover_handshake,
            ),
            RatRole::Verifier => (
                self.session.verifier_mechanism.clone(),
                &fsm.registries.verifiers,
                &fsm.timers.verifier_handshake,
            ),
        };
        let Some(mechanism) = mechanism else {
            error!(?role, "no attestation mechanism negotiated");
            return false;
        };

        let instance = DriverInstanceId::next();
        let listener = RatListener::new(
            role,
            instance,
            fsm.this.clone(),
            self.session.peer_dat.clone(),
            fsm.peer_certificate.get().cloned(),
        );

        match registry.start(&mechanism, listener) {
            Ok(driver) => {
                debug!(?role, %mechanism, %instance, "attestation driver started");
                *self.slot(role) = Some(ActiveDriver { instance, driver });
                timer.reset();
                true
            },
            Err(err) => {
                error!(?role, %mechanism, error = %err, "cannot create attestation driver");
                false
            },
        }
    }

    /// Interrupt the driver of `role` and terminate it off the lock.
    fn stop_driver(&mut self, role: RatRole) {
        match role {
            RatRole::Prover => self.fsm.timers.prover_handshake.cancel(),
            RatRole::Verifier => self.fsm.timers.verifier_handshake.cancel(),
        }

        if let Some(active) = self.slot(role).take() {
            trace!(?role, instance = %active.instance, "stopping attestation driver");
            active.driver.interrupt();
            let driver = active.driver;
            drop(self.fsm.runtime.spawn_blocking(move || driver.terminate()));
        }
    }

    fn slot(&mut self, role: RatRole) -> &mut Option<ActiveDriver> {
        match role {
            RatRole::Prover => &mut self.session.prover,
            RatRole::Verifier => &mut self.session.verifier,
        }
    }

    /// Hand a message from the peer to the local driver of `role`.
    pub(crate) fn delegate(&mut self, role: RatRole, data: Vec<u8>) {
        match self.slot(role) {
            Some(active) => active.driver.delegate(data),
            None => warn!(?role, "no active attestation driver, message dropped"),
        }
    }

    /// Send the message a driver attached to its report, if any.
    pub(crate) fn forward_attached(&self, event: &Event) -> bool {
        match event {
            Event::Control { message: Some(message), .. } => self.send(message),
            _ => true,
        }
    }

    /// Send application data with the current send bit and wait for its Ack.
    pub(crate) fn send_data(&mut self, data: &IdscpData) -> FsmResult {
        let data = IdscpData {
            data: data.data.clone(),
            alternating_bit: self.session.next_send_bit.as_bool(),
        };

        if !self.send(&IdscpMessage::Data(data.clone())) {
            warn!("cannot send data, closing session");
            return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
        }

        self.session.pending_ack = Some(data);
        self.fsm.timers.ack.start();
        FsmResult::ok(FsmState::WaitForAck)
    }

    /// Resend the buffered Data and arm the ack timer again.
    pub(crate) fn retransmit(&mut self) -> FsmResult {
        let Some(data) = self.session.pending_ack.clone() else {
            error!("ack timer expired without buffered data");
            return FsmResult::new(FsmResultCode::IdscpDataNotCached, FsmState::Closed);
        };

        trace!(bit = data.alternating_bit, "ack timeout, retransmitting data");
        if !self.send(&IdscpMessage::Data(data)) {
            return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
        }
        self.fsm.timers.ack.start();
        FsmResult::ok(FsmState::WaitForAck)
    }

    /// Process an Ack. Returns true if it confirmed the pending Data.
    pub(crate) fn recv_ack(&mut self, ack: &IdscpAck) -> bool {
        if self.session.pending_ack.is_none() {
            warn!("received unexpected ack");
            return false;
        }
        if !self.session.next_send_bit.matches(ack.alternating_bit) {
            trace!(bit = ack.alternating_bit, "ack with wrong alternating bit ignored");
            return false;
        }

        self.session.pending_ack = None;
        self.fsm.timers.ack.cancel();
        self.session.next_send_bit.alternate();
        trace!(next = self.session.next_send_bit.as_bool(), "data acknowledged");
        true
    }

    /// Process inbound Data: ack and deliver it unless it is a replay.
    pub(crate) fn recv_data(&mut self, data: &IdscpData) {
        if !self.session.expected_bit.matches(data.alternating_bit) {
            trace!(bit = data.alternating_bit, "data with unexpected bit dropped as replay");
            return;
        }

        if !self.send(&IdscpMessage::ack(data.alternating_bit)) {
            error!("cannot send ack");
        }
        self.session.expected_bit.alternate();
        self.fsm.notifier.message(data.data.clone());
    }

    /// Release `start_handshake` waiters. Fires once per session.
    pub(crate) fn settle_handshake(&mut self) {
        if !self.session.handshake_settled {
            self.session.handshake_settled = true;
            self.fsm.handshake_settled.notify_all();
        }
    }

    pub(crate) fn mark_established(&mut self) {
        if !self.session.established_once {
            debug!("session established");
            self.session.established_once = true;
            self.fsm.notifier.established();
        }
        self.settle_handshake();
    }

    /// Lock the session forever and release every resource.
    ///
    /// Idempotent. Listener notification, channel close and driver
    /// termination run off the lock.
    pub(crate) fn shutdown(&mut self) {
        if self.session.locked {
            trace!("fsm already shut down");
            return;
        }

        debug!("shutting down fsm");
        self.session.locked = true;
        self.fsm.observed_locked.store(true, std::sync::atomic::Ordering::SeqCst);

        self.fsm.notifier.closed();
        let channel = Arc::clone(&self.fsm.channel);
        drop(self.fsm.runtime.spawn_blocking(move || channel.close()));

        self.fsm.timers.cancel_session();
        self.stop_prover();
        self.stop_verifier();

        self.settle_handshake();
        self.fsm.leave_closed.notify_all();
    }
}
