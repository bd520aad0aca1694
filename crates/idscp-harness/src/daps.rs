//! Token service for tests.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use idscp_core::{DapsDriver, DapsError};
use parking_lot::Mutex;
use tracing::trace;

/// Issues one fixed token and accepts every token except the rejected
/// ones.
pub struct StaticDaps {
    token: Vec<u8>,
    validity: Mutex<Duration>,
    rejected: Mutex<Vec<Vec<u8>>>,
    offline: AtomicBool,
}

impl StaticDaps {
    /// Issue `token`, valid for one hour.
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
            validity: Mutex::new(Duration::from_secs(3600)),
            rejected: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Validity reported for every accepted token.
    #[must_use]
    pub fn with_validity(self, validity: Duration) -> Self {
        self.set_validity(validity);
        self
    }

    /// Change the validity reported from now on.
    pub fn set_validity(&self, validity: Duration) {
        *self.validity.lock() = validity;
    }

    /// Reject `token` on verification.
    pub fn reject(&self, token: impl Into<Vec<u8>>) {
        self.rejected.lock().push(token.into());
    }

    /// Make token issuance fail, or recover.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl DapsDriver for StaticDaps {
    fn token(&self) -> Result<Vec<u8>, DapsError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DapsError::TokenUnavailable("token service offline".to_string()));
        }
        Ok(self.token.clone())
    }

    fn verify_token(
        &self,
        token: &[u8],
        peer_certificate: Option<&[u8]>,
    ) -> Result<Duration, DapsError> {
        trace!(len = token.len(), certificate = peer_certificate.is_some(), "verifying token");
        if self.rejected.lock().iter().any(|rejected| rejected == token) {
            return Err(DapsError::InvalidToken("token rejected".to_string()));
        }
        Ok(*self.validity.lock())
    }
}
