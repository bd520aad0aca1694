//! `WaitForDatAndRat`: the peer owes us a fresh token, our prover is still
//! running.

use idscp_proto::MessageKind;

use super::{
    accept_fresh_dat, closable, dat_expired_in_place, forward_driver_message, prover_failed,
    re_rat_in_place, to_prover, would_block,
};
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmResultCode, FsmState, State},
};

pub(super) fn state() -> State {
    closable(State::new(FsmState::WaitForDatAndRat))
        .on(MessageKind::Dat, dat)
        .on(ControlSignal::RatProverOk, prover_ok)
        .on(ControlSignal::RatProverFailed, prover_failed)
        .on(ControlSignal::RatProverMsg, forward_driver_message)
        .on(ControlSignal::SendData, would_block)
        .on(ControlSignal::RepeatRat, would_block)
        .on(MessageKind::RatVerifier, to_prover)
        .on(MessageKind::ReRat, re_rat_in_place)
        .on(MessageKind::DatExpired, dat_expired_in_place)
}

fn dat(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    accept_fresh_dat(ctx, event, FsmState::WaitForRat)
}

fn prover_ok(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    if !ctx.forward_attached(event) {
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }
    ctx.timers().prover_handshake.cancel();
    FsmResult::ok(FsmState::WaitForDatAndRatVerifier)
}
