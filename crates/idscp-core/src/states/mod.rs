//! Transition tables of the nine protocol states.
//!
//! Each submodule builds one [`State`]. Transitions shared by several states
//! live here and are parameterized by the state to move to.

mod closed;
mod established;
mod wait_for_ack;
mod wait_for_dat_and_rat;
mod wait_for_dat_and_rat_verifier;
mod wait_for_hello;
mod wait_for_rat;
mod wait_for_rat_prover;
mod wait_for_rat_verifier;

use idscp_proto::{CloseCause, IdscpMessage, MessageKind};
use tracing::{debug, warn};

use crate::{
    driver::RatRole,
    event::{ControlSignal, Event},
    fsm::Context,
    state::{FsmResult, FsmResultCode, FsmState, State, StateTable},
};

pub(crate) fn table() -> StateTable {
    StateTable::new([
        closed::state(),
        wait_for_hello::state(),
        wait_for_rat::state(),
        wait_for_rat_prover::state(),
        wait_for_rat_verifier::state(),
        wait_for_dat_and_rat::state(),
        wait_for_dat_and_rat_verifier::state(),
        established::state(),
        wait_for_ack::state(),
    ])
}

/// Stop, error, timeout and an inbound Close end every handshake state.
fn closable(state: State) -> State {
    state
        .on(ControlSignal::Error, close_on_error)
        .on(ControlSignal::IdscpStop, close_on_stop)
        .on(ControlSignal::Timeout, close_on_timeout)
        .on(MessageKind::Close, peer_closed)
}

fn close_on_error(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    warn!("error occurred, closing session");
    ctx.close_with(CloseCause::Error, "Error occurred", FsmResultCode::Ok)
}

fn close_on_stop(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    ctx.close_with(CloseCause::UserShutdown, "User close", FsmResultCode::Ok)
}

fn close_on_timeout(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    warn!(state = ?ctx.state(), "handshake timeout, closing session");
    ctx.close_with(CloseCause::Timeout, "Handshake timeout", FsmResultCode::Ok)
}

fn peer_closed(_: &mut Context<'_>, event: &Event) -> FsmResult {
    if let Some(IdscpMessage::Close(close)) = event.message() {
        debug!(cause = ?close.cause, reason = %close.reason, "peer closed session");
    }
    FsmResult::ok(FsmState::Closed)
}

fn would_block(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    FsmResult::new(FsmResultCode::WouldBlock, ctx.state())
}

fn not_connected(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    FsmResult::new(FsmResultCode::NotConnected, ctx.state())
}

fn stay(ctx: &Context<'_>) -> FsmResult {
    FsmResult::ok(ctx.state())
}

/// Table lookup guarantees the message kind; anything else is a bug in the
/// table, reported as an unknown transition.
fn mismatched(ctx: &Context<'_>) -> FsmResult {
    warn!(state = ?ctx.state(), "event payload does not match its kind");
    FsmResult::new(FsmResultCode::UnknownTransition, ctx.state())
}

/// Send the message a driver attached to its report.
fn forward_driver_message(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    if !ctx.forward_attached(event) {
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }
    stay(ctx)
}

fn prover_failed(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    warn!("RAT prover failed");
    ctx.close_with(CloseCause::RatProverFailed, "RAT prover failed", FsmResultCode::RatError)
}

fn verifier_failed(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    warn!("RAT verifier failed");
    ctx.close_with(CloseCause::RatVerifierFailed, "RAT verifier failed", FsmResultCode::RatError)
}

/// Inbound prover message goes to the local verifier.
fn to_verifier(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let Some(IdscpMessage::RatProver(message)) = event.message() else {
        return mismatched(ctx);
    };
    ctx.delegate(RatRole::Verifier, message.data.clone());
    stay(ctx)
}

/// Inbound verifier message goes to the local prover.
fn to_prover(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let Some(IdscpMessage::RatVerifier(message)) = event.message() else {
        return mismatched(ctx);
    };
    ctx.delegate(RatRole::Prover, message.data.clone());
    stay(ctx)
}

fn ack_while_attesting(ctx: &mut Context<'_>, event: &Event) -> FsmResult {
    let Some(IdscpMessage::Ack(ack)) = event.message() else {
        return mismatched(ctx);
    };
    ctx.recv_ack(ack);
    stay(ctx)
}

/// The peer requested re-attestation: run the prover again.
fn answer_re_rat(ctx: &mut Context<'_>, next: FsmState) -> FsmResult {
    debug!("peer requested re-attestation");
    if !ctx.restart_prover() {
        return ctx.close_with(
            CloseCause::RatProverFailed,
            "Cannot run RAT prover",
            FsmResultCode::RatError,
        );
    }
    FsmResult::ok(next)
}

/// The peer's copy of our token expired: send a fresh one and attest again.
fn answer_dat_expired(ctx: &mut Context<'_>, next: FsmState) -> FsmResult {
    debug!("peer requested a new DAT followed by re-attestation");
    let token = ctx.local_dat();
    if !ctx.send(&IdscpMessage::dat(token)) {
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }
    answer_re_rat(ctx, next)
}

fn re_rat_in_place(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    let state = ctx.state();
    answer_re_rat(ctx, state)
}

fn dat_expired_in_place(ctx: &mut Context<'_>, _: &Event) -> FsmResult {
    let state = ctx.state();
    answer_dat_expired(ctx, state)
}

/// Re-attest the peer: ask it to prove again and run our verifier.
fn request_re_rat(ctx: &mut Context<'_>, next: FsmState) -> FsmResult {
    debug!("re-attestation triggered");
    ctx.timers().rat.cancel();
    if !ctx.send(&IdscpMessage::re_rat("")) {
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }
    if !ctx.restart_verifier() {
        return ctx.close_with(
            CloseCause::RatVerifierFailed,
            "Cannot run RAT verifier",
            FsmResultCode::RatError,
        );
    }
    FsmResult::ok(next)
}

/// The peer's token expired: request a fresh one within the handshake
/// timeout.
fn request_dat(ctx: &mut Context<'_>, next: FsmState) -> FsmResult {
    debug!("peer DAT expired, requesting a new one");
    ctx.timers().rat.cancel();
    if !ctx.send(&IdscpMessage::DatExpired) {
        return FsmResult::new(FsmResultCode::IoError, FsmState::Closed);
    }
    ctx.timers().handshake.reset();
    FsmResult::ok(next)
}

/// A fresh peer token arrived: verify it and run our verifier again.
fn accept_fresh_dat(ctx: &mut Context<'_>, event: &Event, next: FsmState) -> FsmResult {
    let Some(IdscpMessage::Dat(dat)) = event.message() else {
        return mismatched(ctx);
    };
    if !ctx.accept_peer_dat(dat) {
        return ctx.close_with(CloseCause::NoValidDat, "Invalid DAT", FsmResultCode::InvalidDat);
    }
    if !ctx.restart_verifier() {
        return ctx.close_with(
            CloseCause::RatVerifierFailed,
            "Cannot run RAT verifier",
            FsmResultCode::RatError,
        );
    }
    FsmResult::ok(next)
}

/// Both attestations done: resume data flow.
fn attested(ctx: &mut Context<'_>) -> FsmResult {
    ctx.timers().handshake.cancel();
    if ctx.session.pending_ack.is_some() {
        ctx.timers().ack.start();
        FsmResult::ok(FsmState::WaitForAck)
    } else {
        FsmResult::ok(FsmState::Established)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn table_is_in_state_order() {
        let table = table();
        for state in FsmState::ALL {
            assert_eq!(table.get(state).kind(), state);
        }
    }

    #[test]
    fn open_states_handle_close_inbound() {
        let table = table();
        for state in FsmState::ALL.into_iter().filter(|s| *s != FsmState::Closed) {
            assert!(
                table.get(state).handles(EventKind::Message(MessageKind::Close)),
                "{state:?} ignores an inbound Close"
            );
            assert!(
                table.get(state).handles(EventKind::Control(ControlSignal::IdscpStop)),
                "{state:?} ignores stop"
            );
        }
    }
}
