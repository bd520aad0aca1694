//! `WaitForHello`: our Hello is out, the peer's is pending.

use idscp_proto::{CloseCause, IdscpMessage, MessageKind};
use tracing::debug;

use super::{closable, mismatched, not_connected};
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    negotiation,
    state::{FsmResult, FsmResultCode, FsmState, State},
};

pub(super) fn state() -> State {
    closable(State::new(FsmState::WaitForHello))
        .on(MessageKind::Hello, hello)
        .on(ControlSignal::SendData, not_connected)
        .on(ControlSignal::RepeatRat, not_connected)
}

fn hello(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let Some(IdscpMessage::Hello(hello)) = event.message() else {
        return mismatched(ctx);
    };

    let Some(dat) = &hello.dynamic_attribute_token else {
        return ctx.close_with(CloseCause::NoValidDat, "No DAT in hello", FsmResultCode::MissingDat);
    };
    if !ctx.accept_peer_dat(dat) {
        return ctx.close_with(CloseCause::NoValidDat, "Invalid DAT", FsmResultCode::InvalidDat);
    }

    let attestation = ctx.attestation();
    let Some(prover) =
        negotiation::prover_mechanism(&attestation.supported_provers, &hello.expected_rat_suite)
    else {
        return ctx.close_with(
            CloseCause::NoRatMechanismMatchProver,
            "No match for RAT prover mechanism",
            FsmResultCode::RatNegotiationError,
        );
    };
    let Some(verifier) =
        negotiation::verifier_mechanism(&attestation.expected_verifiers, &hello.supported_rat_suite)
    else {
        return ctx.close_with(
            CloseCause::NoRatMechanismMatchVerifier,
            "No match for RAT verifier mechanism",
            FsmResultCode::RatNegotiationError,
        );
    };
    debug!(%prover, %verifier, "attestation mechanisms negotiated");
    ctx.session.prover_mechanism = Some(prover);
    ctx.session.verifier_mechanism = Some(verifier);

    if !ctx.restart_verifier() {
        return ctx.close_with(
            CloseCause::RatVerifierFailed,
            "Cannot run RAT verifier",
            FsmResultCode::RatError,
        );
    }
    if !ctx.restart_prover() {
        return ctx.close_with(
            CloseCause::RatProverFailed,
            "Cannot run RAT prover",
            FsmResultCode::RatError,
        );
    }

    ctx.timers().handshake.reset();
    FsmResult::ok(FsmState::WaitForRat)
}
