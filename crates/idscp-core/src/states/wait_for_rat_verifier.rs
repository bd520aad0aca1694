//! `WaitForRatVerifier`: our prover is done, the peer is being verified.

use idscp_proto::MessageKind;

use super::{
    ack_while_attesting, answer_dat_expired, answer_re_rat, attested, closable,
    forward_driver_message, prover_failed, request_dat, to_verifier, verifier_failed, would_block,
};
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmResultCode, FsmState, State},
};

pub(super) fn state() -> State {
    closable(State::new(FsmState::WaitForRatVerifier))
        .on(ControlSignal::RatVerifierOk, verifier_ok)
        .on(ControlSignal::RatProverFailed, prover_failed)
        .on(ControlSignal::RatVerifierFailed, verifier_failed)
        .on(ControlSignal::RatVerifierMsg, forward_driver_message)
        .on(ControlSignal::DatTimerExpired, dat_timer_expired)
        .on(ControlSignal::SendData, would_block)
        .on(ControlSignal::RepeatRat, would_block)
        .on(MessageKind::RatProver, to_verifier)
        .on(MessageKind::ReRat, re_rat)
        .on(MessageKind::DatExpired, dat_expired)
        .on(MessageKind::Ack, ack_while_attesting)
}

fn verifier_ok(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    if !ctx.forward_attached(event) {
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }
    ctx.timers().verifier_handshake.cancel();
    ctx.timers().rat.reset();
    attested(ctx)
}

fn dat_timer_expired(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    ctx.stop_verifier();
    request_dat(ctx, FsmState::WaitForDatAndRatVerifier)
}

fn re_rat(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    answer_re_rat(ctx, FsmState::WaitForRat)
}

fn dat_expired(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    answer_dat_expired(ctx, FsmState::WaitForRat)
}
