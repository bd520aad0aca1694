//! Handshake scenarios between two full sessions.

use std::time::Duration;

use idscp_core::{AttestationConfig, FsmConfig, FsmState, RatRegistries};
use idscp_harness::{
    DUMMY_MECHANISM, DummyProver, FailingDriver, PeerConfig, RefusingDriver, Scenario,
    init_tracing, scenario::oracle, wait_until,
};
use idscp_proto::{CloseCause, IdscpMessage};

const WAIT: Duration = Duration::from_secs(3);

fn close_cause(messages: &[IdscpMessage]) -> Option<CloseCause> {
    messages.iter().find_map(|message| match message {
        IdscpMessage::Close(close) => Some(close.cause),
        _ => None,
    })
}

#[test]
fn both_peers_establish() {
    init_tracing();

    let world = Scenario::new("establish")
        .peer("alice", PeerConfig::new("alice-dat"))
        .peer("bob", PeerConfig::new("bob-dat"))
        .oracle(oracle::all_of(vec![oracle::all_established(), oracle::mechanisms_agree()]))
        .run()
        .expect("scenario should succeed");

    let alice = world.peer("alice").unwrap();
    let bob = world.peer("bob").unwrap();

    assert_eq!(alice.fsm().remote_peer_dat().unwrap(), Some(b"bob-dat".to_vec()));
    assert_eq!(bob.fsm().remote_peer_dat().unwrap(), Some(b"alice-dat".to_vec()));
    assert_eq!(alice.fsm().local_dat().unwrap(), Some(b"alice-dat".to_vec()));
    assert!(wait_until(WAIT, || alice.listener().established_count() == 1));
    assert!(wait_until(WAIT, || bob.listener().established_count() == 1));

    let hello = alice.channel().sent_messages().into_iter().next();
    assert!(matches!(
        hello,
        Some(IdscpMessage::Hello(h)) if h.supported_rat_suite == [DUMMY_MECHANISM]
    ));
}

#[test]
fn peer_certificate_reaches_session() {
    init_tracing();

    let world = Scenario::new("certificate")
        .peer("alice", PeerConfig::new("a").with_peer_certificate(b"bob-cert".to_vec()))
        .peer("bob", PeerConfig::new("b"))
        .oracle(oracle::all_established())
        .run()
        .expect("scenario should succeed");

    assert_eq!(world.peer("alice").unwrap().fsm().peer_certificate(), Some(&b"bob-cert"[..]));
    assert_eq!(world.peer("bob").unwrap().fsm().peer_certificate(), None);
}

#[test]
fn no_common_mechanism_closes_both() {
    init_tracing();

    let tpm_only = AttestationConfig::default()
        .with_supported_provers(["TPM2"])
        .with_expected_verifiers([DUMMY_MECHANISM]);

    let world = Scenario::new("negotiation failure")
        .peer("alice", PeerConfig::new("a").with_attestation(tpm_only))
        .peer("bob", PeerConfig::new("b"))
        .oracle(oracle::all_closed())
        .run()
        .expect("scenario should succeed");

    let alice = world.peer("alice").unwrap();
    let bob = world.peer("bob").unwrap();
    assert_eq!(
        close_cause(&alice.channel().sent_messages()),
        Some(CloseCause::NoRatMechanismMatchProver)
    );
    assert_eq!(
        close_cause(&bob.channel().sent_messages()),
        Some(CloseCause::NoRatMechanismMatchVerifier)
    );
}

#[test]
fn rejected_token_closes_both() {
    init_tracing();

    let world = Scenario::new("invalid token")
        .peer("alice", PeerConfig::new("alice-dat"))
        .peer("bob", PeerConfig::new("bob-dat").rejecting_token("alice-dat"))
        .oracle(oracle::all_closed())
        .run()
        .expect("scenario should succeed");

    let bob = world.peer("bob").unwrap();
    assert_eq!(close_cause(&bob.channel().sent_messages()), Some(CloseCause::NoValidDat));
    assert!(wait_until(WAIT, || bob.listener().close_count() == 1));
    assert_eq!(bob.listener().established_count(), 0);
}

#[test]
fn failing_verifier_closes_both() {
    init_tracing();

    let registries = RatRegistries::new();
    registries.provers.register(DUMMY_MECHANISM, DummyProver::new, None);
    registries.verifiers.register(DUMMY_MECHANISM, FailingDriver::new, None);

    let world = Scenario::new("verifier failure")
        .peer("alice", PeerConfig::new("a"))
        .peer("bob", PeerConfig::new("b").with_registries(registries))
        .oracle(oracle::all_closed())
        .run()
        .expect("scenario should succeed");

    let bob = world.peer("bob").unwrap();
    assert_eq!(close_cause(&bob.channel().sent_messages()), Some(CloseCause::RatVerifierFailed));
}

#[test]
fn driver_that_cannot_start_closes_both() {
    init_tracing();

    let registries = RatRegistries::new();
    registries.provers.register(DUMMY_MECHANISM, RefusingDriver::new, None);
    registries.verifiers.register(DUMMY_MECHANISM, RefusingDriver::new, None);

    Scenario::new("refusing driver")
        .peer("alice", PeerConfig::new("a").with_registries(registries))
        .peer("bob", PeerConfig::new("b"))
        .oracle(oracle::all_closed())
        .run()
        .expect("scenario should succeed");
}

#[test]
fn stalled_attestation_times_out() {
    init_tracing();

    let slow = || {
        let registries = RatRegistries::new();
        let stall = Some(Duration::from_secs(10));
        registries.provers.register(DUMMY_MECHANISM, FailingDriver::new, stall);
        registries.verifiers.register(DUMMY_MECHANISM, FailingDriver::new, stall);
        registries
    };
    let fast = FsmConfig { handshake_timeout: Duration::from_millis(200), ..FsmConfig::default() };

    let world = Scenario::new("handshake timeout")
        .peer("alice", PeerConfig::new("a").with_registries(slow()).with_fsm_config(fast.clone()))
        .peer("bob", PeerConfig::new("b").with_registries(slow()).with_fsm_config(fast))
        .oracle(oracle::all_closed())
        .run()
        .expect("scenario should succeed");

    for peer in world.peers() {
        assert_eq!(peer.state(), FsmState::Closed);
        assert!(world.handshake(peer.name()).is_some_and(Result::is_err));
    }
}
