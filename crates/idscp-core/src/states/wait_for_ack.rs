//! `WaitForAck`: one Data message is in flight.
//!
//! Re-attestation suspends the ack timer; the buffered message is resent
//! once both peers are attested again.

use idscp_proto::{IdscpMessage, MessageKind};

use super::{close_on_stop, established, mismatched, peer_closed, stay, would_block};
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmState, State},
};

pub(super) fn state() -> State {
    State::new(FsmState::WaitForAck)
        .on(ControlSignal::Error, established::channel_error)
        .on(ControlSignal::IdscpStop, close_on_stop)
        .on(ControlSignal::SendData, would_block)
        .on(ControlSignal::AckTimerExpired, ack_timer_expired)
        .on(ControlSignal::RepeatRat, repeat_rat)
        .on(ControlSignal::DatTimerExpired, dat_timer_expired)
        .on(MessageKind::Ack, ack)
        .on(MessageKind::ReRat, re_rat)
        .on(MessageKind::DatExpired, dat_expired)
        .on(MessageKind::Data, established::data)
        .on(MessageKind::Close, peer_closed)
}

fn ack(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let Some(IdscpMessage::Ack(ack)) = event.message() else {
        return mismatched(ctx);
    };
    if ctx.recv_ack(ack) { FsmResult::ok(FsmState::Established) } else { stay(ctx) }
}

fn ack_timer_expired(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    ctx.retransmit()
}

fn repeat_rat(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    ctx.timers().ack.cancel();
    established::repeat_rat(ctx, event)
}

fn dat_timer_expired(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    ctx.timers().ack.cancel();
    established::dat_timer_expired(ctx, event)
}

fn re_rat(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    ctx.timers().ack.cancel();
    established::re_rat(ctx, event)
}

fn dat_expired(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    ctx.timers().ack.cancel();
    established::dat_expired(ctx, event)
}
