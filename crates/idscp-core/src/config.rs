//! Session configuration.

use std::time::Duration;

/// Timeouts of the protocol FSM.
#[derive(Debug, Clone)]
pub struct FsmConfig {
    /// Time allowed for the handshake and each re-attestation
    pub handshake_timeout: Duration,
    /// Time to wait for an Ack before retransmitting Data
    pub ack_timeout: Duration,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self { handshake_timeout: Duration::from_secs(5), ack_timeout: Duration::from_millis(200) }
    }
}

/// Attestation suites and periodic re-attestation interval.
#[derive(Debug, Clone)]
pub struct AttestationConfig {
    /// Prover mechanisms the local peer can run, in preference order
    pub supported_provers: Vec<String>,
    /// Verifier mechanisms the local peer requires, in preference order
    pub expected_verifiers: Vec<String>,
    /// Interval after which the peer is attested again
    pub rat_timeout: Duration,
}

impl AttestationConfig {
    /// Set the supported prover suite.
    #[must_use]
    pub fn with_supported_provers<I, S>(mut self, provers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_provers = provers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expected verifier suite.
    #[must_use]
    pub fn with_expected_verifiers<I, S>(mut self, verifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_verifiers = verifiers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the re-attestation interval.
    #[must_use]
    pub fn with_rat_timeout(mut self, rat_timeout: Duration) -> Self {
        self.rat_timeout = rat_timeout;
        self
    }
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            supported_provers: Vec::new(),
            expected_verifiers: Vec::new(),
            rat_timeout: Duration::from_secs(600),
        }
    }
}
