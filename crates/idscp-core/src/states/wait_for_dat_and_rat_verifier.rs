//! `WaitForDatAndRatVerifier`: our prover is done, the peer owes us a fresh
//! token.

use idscp_proto::MessageKind;

use super::{
    accept_fresh_dat, ack_while_attesting, answer_dat_expired, answer_re_rat, closable,
    would_block,
};
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmState, State},
};

pub(super) fn state() -> State {
    closable(State::new(FsmState::WaitForDatAndRatVerifier))
        .on(MessageKind::Dat, dat)
        .on(MessageKind::ReRat, re_rat)
        .on(MessageKind::DatExpired, dat_expired)
        .on(MessageKind::Ack, ack_while_attesting)
        .on(ControlSignal::SendData, would_block)
        .on(ControlSignal::RepeatRat, would_block)
}

fn dat(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    accept_fresh_dat(ctx, event, FsmState::WaitForRatVerifier)
}

fn re_rat(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    answer_re_rat(ctx, FsmState::WaitForDatAndRat)
}

fn dat_expired(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    answer_dat_expired(ctx, FsmState::WaitForDatAndRat)
}
