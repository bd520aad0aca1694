//! Attestation driver registries.
//!
//! Maps a mechanism name to a factory building a driver around its
//! [`RatListener`], plus the optional configuration for that mechanism.
//! The FSM looks up the negotiated mechanism whenever it starts a prover or
//! verifier.
//!
//! Registries are plain values shared through `Arc`; a session is built with
//! the [`RatRegistries`] it should consult. Registration may happen at any
//! time, concurrently with running sessions.

use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::{
    driver::{RatDriver, RatListener, RunningDriver},
    error::DriverError,
};

type StartFn = dyn Fn(RatListener) -> Result<Arc<dyn RunningDriver>, DriverError> + Send + Sync;

/// Registry of attestation drivers for one role.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<StartFn>>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver factory and optional configuration for `mechanism`.
    ///
    /// Replaces a previous registration under the same name.
    pub fn register<D, F>(
        &self,
        mechanism: impl Into<String>,
        factory: F,
        config: Option<D::Config>,
    )
    where
        D: RatDriver,
        F: Fn(RatListener) -> D + Send + Sync + 'static,
    {
        let mechanism = mechanism.into();
        debug!(%mechanism, "registering attestation driver");

        let start = move |listener: RatListener| -> Result<Arc<dyn RunningDriver>, DriverError> {
            let mut driver = factory(listener);
            if let Some(config) = &config {
                driver.set_config(config.clone());
            }
            driver.start()?;
            Ok(Arc::new(driver))
        };

        self.drivers.write().insert(mechanism, Arc::new(start));
    }

    /// Remove the driver registered for `mechanism`.
    pub fn unregister(&self, mechanism: &str) {
        debug!(%mechanism, "unregistering attestation driver");
        self.drivers.write().remove(mechanism);
    }

    /// Whether a driver is registered for `mechanism`.
    pub fn contains(&self, mechanism: &str) -> bool {
        self.drivers.read().contains_key(mechanism)
    }

    /// Names of all registered mechanisms, sorted.
    pub fn mechanisms(&self) -> Vec<String> {
        let mut names: Vec<_> = self.drivers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Build, configure and start a driver for `mechanism`.
    ///
    /// A factory or start routine that panics is reported as
    /// [`DriverError::Panicked`]; nothing escapes the registry.
    pub fn start(
        &self,
        mechanism: &str,
        listener: RatListener,
    ) -> Result<Arc<dyn RunningDriver>, DriverError> {
        let Some(start) = self.drivers.read().get(mechanism).cloned() else {
            error!(%mechanism, role = ?listener.role(), "no attestation driver registered");
            return Err(DriverError::UnknownMechanism(mechanism.to_string()));
        };

        match panic::catch_unwind(AssertUnwindSafe(|| start(listener))) {
            Ok(Ok(driver)) => Ok(driver),
            Ok(Err(err)) => {
                error!(%mechanism, error = %err, "attestation driver failed to start");
                Err(err)
            },
            Err(_) => {
                error!(%mechanism, "attestation driver panicked during start");
                Err(DriverError::Panicked(mechanism.to_string()))
            },
        }
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry").field("mechanisms", &self.mechanisms()).finish()
    }
}

/// Prover and verifier registries consulted by a session.
#[derive(Debug, Clone, Default)]
pub struct RatRegistries {
    /// Prover drivers
    pub provers: Arc<DriverRegistry>,
    /// Verifier drivers
    pub verifiers: Arc<DriverRegistry>,
}

impl RatRegistries {
    /// Create empty registries.
    pub fn new() -> Self {
        Self::default()
    }
}
