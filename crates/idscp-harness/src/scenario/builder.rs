//! Scenario builder API.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    thread,
    time::Duration,
};

use idscp_core::{
    AttestationConfig, ConnectionListener, DapsDriver, Fsm, FsmConfig, FsmParts, RatRegistries,
    SecureChannel, SecureChannelListener,
};
use tokio::runtime::Builder;
use tracing::debug;

use super::{OracleFn, Peer, World};
use crate::{DUMMY_MECHANISM, RecordingListener, StaticDaps, drivers, loopback_pair};

/// Configuration of one scenario peer.
///
/// Defaults to the dummy mechanism in both roles, default timeouts and a
/// token valid for one hour.
pub struct PeerConfig {
    token: Vec<u8>,
    token_validity: Duration,
    rejected_tokens: Vec<Vec<u8>>,
    certificate: Option<Vec<u8>>,
    attestation: AttestationConfig,
    fsm: FsmConfig,
    registries: RatRegistries,
}

impl PeerConfig {
    /// Default configuration issuing `token`.
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        let registries = RatRegistries::new();
        drivers::register_dummy(&registries, DUMMY_MECHANISM);
        Self {
            token: token.into(),
            token_validity: Duration::from_secs(3600),
            rejected_tokens: Vec::new(),
            certificate: None,
            attestation: AttestationConfig::default()
                .with_supported_provers([DUMMY_MECHANISM])
                .with_expected_verifiers([DUMMY_MECHANISM]),
            fsm: FsmConfig::default(),
            registries,
        }
    }

    /// Replace the attestation suites.
    #[must_use]
    pub fn with_attestation(mut self, attestation: AttestationConfig) -> Self {
        self.attestation = attestation;
        self
    }

    /// Replace the FSM timeouts.
    #[must_use]
    pub fn with_fsm_config(mut self, fsm: FsmConfig) -> Self {
        self.fsm = fsm;
        self
    }

    /// Replace the driver registries.
    #[must_use]
    pub fn with_registries(mut self, registries: RatRegistries) -> Self {
        self.registries = registries;
        self
    }

    /// Validity this peer's token service reports for the other's token.
    #[must_use]
    pub fn with_token_validity(mut self, validity: Duration) -> Self {
        self.token_validity = validity;
        self
    }

    /// Make this peer's token service reject `token`.
    #[must_use]
    pub fn rejecting_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.rejected_tokens.push(token.into());
        self
    }

    /// Certificate the other peer presents on the channel.
    #[must_use]
    pub fn with_peer_certificate(mut self, certificate: impl Into<Vec<u8>>) -> Self {
        self.certificate = Some(certificate.into());
        self
    }
}

/// Scenario builder.
///
/// Takes exactly two peers. Call [`oracle`](Self::oracle) to get a
/// runnable scenario.
pub struct Scenario {
    name: String,
    peers: Vec<(String, PeerConfig)>,
}

impl Scenario {
    /// Create a scenario named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), peers: Vec::new() }
    }

    /// Add a peer.
    #[must_use]
    pub fn peer(mut self, name: impl Into<String>, config: PeerConfig) -> Self {
        self.peers.push((name.into(), config));
        self
    }

    /// Set the oracle and return a runnable scenario.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with its oracle.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Connect both peers, run both handshakes concurrently and verify the
    /// world with the oracle.
    ///
    /// A failed handshake is not an error by itself: it is recorded in the
    /// world for the oracle to judge. The world is returned so tests can
    /// keep driving the sessions.
    pub fn run(self) -> Result<World, String> {
        let name = self.scenario.name;
        let [(a_name, a_config), (b_name, b_config)]: [(String, PeerConfig); 2] =
            self.scenario.peers.try_into().map_err(|peers: Vec<_>| {
                format!("Scenario '{name}': needs exactly 2 peers, got {}", peers.len())
            })?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .map_err(|err| format!("Scenario '{name}': cannot build runtime: {err}"))?;
        let (a_channel, b_channel) = loopback_pair(a_name.clone(), b_name.clone())
            .map_err(|err| format!("Scenario '{name}': cannot create loopback: {err}"))?;

        let mut peers = Vec::with_capacity(2);
        for (peer_name, config, channel) in
            [(a_name, a_config, a_channel), (b_name, b_config, b_channel)]
        {
            let daps =
                Arc::new(StaticDaps::new(config.token).with_validity(config.token_validity));
            for token in config.rejected_tokens {
                daps.reject(token);
            }
            let listener = Arc::new(RecordingListener::default());
            let parts = FsmParts {
                channel: Arc::clone(&channel) as Arc<dyn SecureChannel>,
                daps: Arc::clone(&daps) as Arc<dyn DapsDriver>,
                registries: config.registries,
                listener: Arc::clone(&listener) as Arc<dyn ConnectionListener>,
            };
            let fsm = Fsm::new(parts, config.attestation, &config.fsm, runtime.handle().clone())
                .map_err(|err| format!("Scenario '{name}': {peer_name}: {err}"))?;

            if let Some(certificate) = config.certificate {
                fsm.on_peer_identity(certificate);
            }
            let weak: Weak<Fsm> = Arc::downgrade(&fsm);
            let weak: Weak<dyn SecureChannelListener> = weak;
            channel.attach(weak);

            peers.push(Peer::new(peer_name, fsm, channel, daps, listener));
        }

        debug!(scenario = %name, "starting handshakes");
        let handshakes: HashMap<String, Result<(), String>> = thread::scope(|scope| {
            let running: Vec<_> = peers
                .iter()
                .map(|peer| (peer.name(), scope.spawn(move || peer.fsm().start_handshake())))
                .collect();
            running
                .into_iter()
                .map(|(peer_name, handle)| {
                    let outcome = match handle.join() {
                        Ok(result) => result.map_err(|err| err.to_string()),
                        Err(_) => Err("handshake thread panicked".to_string()),
                    };
                    (peer_name.to_string(), outcome)
                })
                .collect()
        });

        let world = World::new(peers, handshakes, runtime);
        (self.oracle)(&world).map_err(|err| format!("Scenario '{name}': {err}"))?;
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::oracle;

    #[test]
    fn scenario_requires_two_peers() {
        let result = Scenario::new("lonely")
            .peer("alice", PeerConfig::new("a"))
            .oracle(Box::new(|_world| Ok(())))
            .run();

        assert!(matches!(result, Err(err) if err.contains("exactly 2 peers")));
    }

    #[test]
    fn scenario_creates_both_peers() {
        let world = Scenario::new("pair")
            .peer("alice", PeerConfig::new("a"))
            .peer("bob", PeerConfig::new("b"))
            .oracle(oracle::all_established())
            .run()
            .expect("scenario should succeed");

        assert!(world.peer("alice").is_some());
        assert!(world.peer("bob").is_some());
    }
}
