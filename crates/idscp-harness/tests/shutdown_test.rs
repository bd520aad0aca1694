//! Session teardown and transport faults.

use std::time::Duration;

use idscp_core::{FsmResultCode, FsmState};
use idscp_harness::{PeerConfig, Scenario, World, init_tracing, scenario::oracle, wait_until};
use idscp_proto::{CloseCause, IdscpMessage};

const WAIT: Duration = Duration::from_secs(3);

fn connect() -> World {
    init_tracing();
    Scenario::new("shutdown")
        .peer("alice", PeerConfig::new("a"))
        .peer("bob", PeerConfig::new("b"))
        .oracle(oracle::all_established())
        .run()
        .expect("scenario should succeed")
}

fn all_locked(world: &World) -> bool {
    world.peers().iter().all(|peer| peer.fsm().is_locked())
}

#[test]
fn close_reaches_the_peer() {
    let world = connect();
    let alice = world.peer("alice").unwrap();
    let bob = world.peer("bob").unwrap();

    assert_eq!(alice.fsm().close().unwrap(), FsmResultCode::Ok);

    assert!(wait_until(WAIT, || all_locked(&world)));
    assert!(matches!(
        alice.channel().sent_messages().last(),
        Some(IdscpMessage::Close(close)) if close.cause == CloseCause::UserShutdown
    ));
    assert_eq!(bob.state(), FsmState::Closed);
    assert!(wait_until(WAIT, || alice.channel().is_closed() && bob.channel().is_closed()));
    assert!(wait_until(WAIT, || alice.listener().close_count() == 1));
    assert!(wait_until(WAIT, || bob.listener().close_count() == 1));
}

#[test]
fn locked_session_rejects_everything() {
    let world = connect();
    let alice = world.peer("alice").unwrap();
    alice.fsm().close().unwrap();

    assert_eq!(alice.fsm().send(vec![1]).unwrap(), FsmResultCode::FsmLocked);
    assert_eq!(alice.fsm().repeat_rat().unwrap(), FsmResultCode::FsmLocked);
    assert_eq!(alice.fsm().close().unwrap(), FsmResultCode::Ok);
    assert!(alice.fsm().start_handshake().is_err());
}

#[test]
fn transport_error_closes_without_close_message() {
    let world = connect();
    let alice = world.peer("alice").unwrap();
    let bob = world.peer("bob").unwrap();
    let bob_sent = bob.channel().sent_messages().len();

    alice.channel().inject_error("connection reset");

    assert!(wait_until(WAIT, || all_locked(&world)));
    assert_eq!(bob.channel().sent_messages().len(), bob_sent);
    assert!(wait_until(WAIT, || bob.listener().errors() == vec!["connection reset".to_string()]));
}

#[test]
fn send_failure_closes_both() {
    let world = connect();
    let alice = world.peer("alice").unwrap();

    alice.channel().fail_sends(true);

    assert_eq!(alice.fsm().send(vec![1]).unwrap(), FsmResultCode::IoError);
    assert!(alice.fsm().is_locked());
    assert!(wait_until(WAIT, || all_locked(&world)));
}
