//! Attestation mechanism negotiation.
//!
//! Prover and verifier are negotiated independently. Each picks the first
//! entry of a primary list that also appears in a secondary list, compared
//! as exact, case-sensitive strings:
//!
//! - prover: the peer's expected verifiers are primary, since the peer
//!   decides what it checks
//! - verifier: the local expected verifiers are primary, since the local
//!   peer decides what it checks

use tracing::{debug, trace, warn};

/// First entry of `primary` that also appears in `secondary`.
pub fn match_mechanism<'a>(primary: &'a [String], secondary: &[String]) -> Option<&'a str> {
    primary.iter().find(|p| secondary.contains(p)).map(String::as_str)
}

/// Negotiate the local prover mechanism.
pub fn prover_mechanism(local_supported: &[String], remote_expected: &[String]) -> Option<String> {
    if local_supported.is_empty() {
        warn!("empty local supported prover suite");
        return None;
    }
    if remote_expected.is_empty() {
        warn!("empty remote expected verifier suite");
        return None;
    }

    trace!(?local_supported, ?remote_expected, "negotiating prover mechanism");
    let matched = match_mechanism(remote_expected, local_supported).map(str::to_owned);
    debug!(mechanism = ?matched, "prover mechanism");
    matched
}

/// Negotiate the local verifier mechanism.
pub fn verifier_mechanism(
    local_expected: &[String],
    remote_supported: &[String],
) -> Option<String> {
    if local_expected.is_empty() {
        warn!("empty local expected verifier suite");
        return None;
    }
    if remote_supported.is_empty() {
        warn!("empty remote supported prover suite");
        return None;
    }

    trace!(?local_expected, ?remote_supported, "negotiating verifier mechanism");
    let matched = match_mechanism(local_expected, remote_supported).map(str::to_owned);
    debug!(mechanism = ?matched, "verifier mechanism");
    matched
}
