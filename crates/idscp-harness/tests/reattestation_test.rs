//! Re-attestation and token renewal on established sessions.

use std::time::Duration;

use idscp_core::{AttestationConfig, FsmResultCode, FsmState};
use idscp_harness::{
    DUMMY_MECHANISM, PeerConfig, Scenario, World, init_tracing, scenario::oracle, wait_until,
};
use idscp_proto::{IdscpMessage, MessageKind};

const WAIT: Duration = Duration::from_secs(3);

fn connect(alice: PeerConfig, bob: PeerConfig) -> World {
    init_tracing();
    Scenario::new("re-attestation")
        .peer("alice", alice)
        .peer("bob", bob)
        .oracle(oracle::all_established())
        .run()
        .expect("scenario should succeed")
}

fn count(messages: &[IdscpMessage], kind: MessageKind) -> usize {
    messages.iter().filter(|m| m.kind() == kind).count()
}

fn both_connected(world: &World) -> bool {
    world.peers().iter().all(|peer| peer.fsm().is_connected())
}

#[test]
fn repeat_rat_attests_the_peer_again() {
    let world = connect(PeerConfig::new("a"), PeerConfig::new("b"));
    let alice = world.peer("alice").unwrap();
    let bob = world.peer("bob").unwrap();
    let verifiers_before = count(&alice.channel().sent_messages(), MessageKind::RatVerifier);

    assert_eq!(alice.fsm().repeat_rat().unwrap(), FsmResultCode::Ok);

    assert!(wait_until(WAIT, || both_connected(&world)));
    let sent = alice.channel().sent_messages();
    assert_eq!(count(&sent, MessageKind::ReRat), 1);
    assert!(count(&sent, MessageKind::RatVerifier) > verifiers_before);
    assert_eq!(alice.listener().established_count(), 1);
    assert_eq!(bob.listener().established_count(), 1);
}

#[test]
fn rat_timer_repeats_attestation() {
    let periodic = AttestationConfig::default()
        .with_supported_provers([DUMMY_MECHANISM])
        .with_expected_verifiers([DUMMY_MECHANISM])
        .with_rat_timeout(Duration::from_millis(100));
    let world = connect(PeerConfig::new("a").with_attestation(periodic), PeerConfig::new("b"));
    let alice = world.peer("alice").unwrap();

    assert!(wait_until(WAIT, || count(&alice.channel().sent_messages(), MessageKind::ReRat) >= 2));
    assert!(wait_until(WAIT, || both_connected(&world)));
}

#[test]
fn expired_token_is_renewed() {
    let world = connect(
        PeerConfig::new("alice-dat"),
        PeerConfig::new("bob-dat").with_token_validity(Duration::from_millis(300)),
    );
    let alice = world.peer("alice").unwrap();
    let bob = world.peer("bob").unwrap();
    bob.daps().set_validity(Duration::from_secs(3600));

    let expired = || count(&bob.channel().sent_messages(), MessageKind::DatExpired) == 1;
    assert!(wait_until(WAIT, expired));
    assert!(wait_until(WAIT, || count(&alice.channel().sent_messages(), MessageKind::Dat) == 1));
    assert!(wait_until(WAIT, || both_connected(&world)));
    assert_eq!(bob.fsm().remote_peer_dat().unwrap(), Some(b"alice-dat".to_vec()));
}

#[test]
fn send_during_attestation_would_block() {
    let world = connect(PeerConfig::new("a"), PeerConfig::new("b"));
    let alice = world.peer("alice").unwrap();

    // Lose the ReRat so the peer never proves again.
    alice.channel().drop_next(1);
    alice.fsm().repeat_rat().unwrap();

    assert_eq!(alice.state(), FsmState::WaitForRatVerifier);
    assert_eq!(alice.fsm().send(vec![1]).unwrap(), FsmResultCode::WouldBlock);
    alice.fsm().close().unwrap();
}
