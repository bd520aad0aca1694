//! `Established`: both peers attested, data flows.

use idscp_proto::{IdscpMessage, MessageKind};
use tracing::warn;

use super::{
    answer_dat_expired, answer_re_rat, close_on_stop, mismatched, peer_closed, request_dat,
    request_re_rat, stay,
};
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmState, State},
};

pub(super) fn state() -> State {
    State::new(FsmState::Established)
        .on(ControlSignal::Error, channel_error)
        .on(ControlSignal::IdscpStop, close_on_stop)
        .on(ControlSignal::SendData, send_data)
        .on(ControlSignal::RepeatRat, repeat_rat)
        .on(ControlSignal::DatTimerExpired, dat_timer_expired)
        .on(MessageKind::ReRat, re_rat)
        .on(MessageKind::DatExpired, dat_expired)
        .on(MessageKind::Data, data)
        .on(MessageKind::Close, peer_closed)
        .on_entry(enter)
}

fn enter(ctx: &mut Context<'_>) {
    ctx.mark_established();
}

/// The channel is broken; no Close can reach the peer.
pub(super) fn channel_error(_: &mut Context<'_>, _: &Event) -> FsmResult {
    warn!("secure channel error, closing session");
    FsmResult::ok(FsmState::Closed)
}

fn send_data(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let Some(IdscpMessage::Data(data)) = event.message() else {
        return mismatched(ctx);
    };
    ctx.send_data(data)
}

pub(super) fn repeat_rat(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    request_re_rat(ctx, FsmState::WaitForRatVerifier)
}

pub(super) fn dat_timer_expired(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    request_dat(ctx, FsmState::WaitForDatAndRatVerifier)
}

pub(super) fn re_rat(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    answer_re_rat(ctx, FsmState::WaitForRatProver)
}

pub(super) fn dat_expired(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    answer_dat_expired(ctx, FsmState::WaitForRatProver)
}

pub(super) fn data(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let Some(IdscpMessage::Data(data)) = event.message() else {
        return mismatched(ctx);
    };
    ctx.recv_data(data);
    stay(ctx)
}
