//! Token service boundary.

use std::time::Duration;

use crate::error::DapsError;

/// Issues the local dynamic attribute token and verifies the peer's.
pub trait DapsDriver: Send + Sync + 'static {
    /// Fetch a token for the local peer.
    fn token(&self) -> Result<Vec<u8>, DapsError>;

    /// Verify a token received from the peer.
    ///
    /// Returns the remaining validity of the token, which arms the token
    /// expiry timer.
    fn verify_token(
        &self,
        token: &[u8],
        peer_certificate: Option<&[u8]>,
    ) -> Result<Duration, DapsError>;
}
