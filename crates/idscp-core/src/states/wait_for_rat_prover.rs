//! `WaitForRatProver`: the peer is verified, our prover is still running.

use idscp_proto::MessageKind;

use super::{
    ack_while_attesting, attested, closable, dat_expired_in_place, forward_driver_message,
    prover_failed, re_rat_in_place, request_dat, request_re_rat, to_prover, verifier_failed,
    would_block,
};
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmResultCode, FsmState, State},
};

pub(super) fn state() -> State {
    closable(State::new(FsmState::WaitForRatProver))
        .on(ControlSignal::RatProverOk, prover_ok)
        .on(ControlSignal::RatProverFailed, prover_failed)
        .on(ControlSignal::RatVerifierFailed, verifier_failed)
        .on(ControlSignal::RatProverMsg, forward_driver_message)
        .on(ControlSignal::RepeatRat, repeat_rat)
        .on(ControlSignal::DatTimerExpired, dat_timer_expired)
        .on(ControlSignal::SendData, would_block)
        .on(MessageKind::RatVerifier, to_prover)
        .on(MessageKind::ReRat, re_rat_in_place)
        .on(MessageKind::DatExpired, dat_expired_in_place)
        .on(MessageKind::Ack, ack_while_attesting)
}

fn prover_ok(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    if !ctx.forward_attached(event) {
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }
    ctx.timers().prover_handshake.cancel();
    attested(ctx)
}

fn repeat_rat(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    request_re_rat(ctx, FsmState::WaitForRat)
}

fn dat_timer_expired(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    request_dat(ctx, FsmState::WaitForDatAndRat)
}
