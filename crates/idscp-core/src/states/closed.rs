//! `Closed`: before the handshake and after the session ended.

use tracing::{debug, warn};

use super::stay;
use crate::{
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmResultCode, FsmState, State},
};

pub(super) fn state() -> State {
    State::new(FsmState::Closed)
        .on(ControlSignal::StartHandshake, start_handshake)
        .on(ControlSignal::IdscpStop, stop)
        .otherwise(locked_or_not_started)
        .on_entry(enter)
}

/// Entering `Closed` ends the session for good.
fn enter(ctx: &mut Context<'_>) {
    ctx.shutdown();
}

fn start_handshake(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    if ctx.session.locked {
        return FsmResult::new(FsmResultCode::FsmLocked, FsmState::Closed);
    }

    debug!("starting handshake");
    let hello = ctx.hello();
    if !ctx.send(&hello) {
        warn!("cannot send hello, closing session");
        ctx.shutdown();
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }

    ctx.timers().handshake.start();
    FsmResult::ok(FsmState::WaitForHello)
}

fn stop(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    ctx.shutdown();
    stay(ctx)
}

fn locked_or_not_started(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    let code =
        if ctx.session.locked { FsmResultCode::FsmLocked } else { FsmResultCode::FsmNotStarted };
    FsmResult::new(code, FsmState::Closed)
}
