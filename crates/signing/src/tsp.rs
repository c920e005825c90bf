//! Timestamp authority (TSP) endpoint pool and selection.
//!
//! The pool is fixed at construction and shared read-only by every request.
//! Selection is stateless: each call draws independently from an injected
//! [`RandomSource`], so a retry may fail over to a different endpoint.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::TspUrl;

/// Endpoints used when the configuration does not name any.
pub const DEFAULT_TSP_SERVERS: [&str; 3] = [
    "http://qs.cryptopro.ru/tsp/tsp.srf",
    "http://pki.tax.gov.ru/tsp/tsp.srf",
    "http://tax4.tensor.ru/tsp/tsp.srf",
];

// ---------------------------------------------------------------------------
// Randomness
// ---------------------------------------------------------------------------

/// Source of uniform random indices.
pub trait RandomSource: Send + Sync {
    /// Returns an index uniformly distributed in `0..upper`. `upper` is
    /// always at least 2 when called by [`TspPool::select`].
    fn index(&self, upper: usize) -> usize;
}

/// [`RandomSource`] backed by the thread-local OS-seeded generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn index(&self, upper: usize) -> usize {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Deterministic [`RandomSource`] for reproducible endpoint choice.
#[derive(Debug)]
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    /// Creates a generator from a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededRandom {
    fn index(&self, upper: usize) -> usize {
        let mut rng = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..upper)
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Ordered, immutable list of TSP endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TspPool {
    endpoints: Arc<[TspUrl]>,
}

impl TspPool {
    /// Creates a pool from explicit endpoints. An empty pool is allowed; it
    /// makes every timestamped request fail with a configuration error.
    pub fn new(endpoints: Vec<TspUrl>) -> Self {
        Self {
            endpoints: endpoints.into(),
        }
    }

    /// Pool of [`DEFAULT_TSP_SERVERS`].
    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_TSP_SERVERS
                .iter()
                .filter_map(|url| TspUrl::new(*url))
                .collect(),
        )
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns `true` if no endpoint is configured.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in configuration order.
    pub fn endpoints(&self) -> &[TspUrl] {
        &self.endpoints
    }

    /// Picks an endpoint.
    ///
    /// Returns `None` for an empty pool and the only entry for a
    /// single-entry pool (without consulting `rng`); otherwise a uniformly
    /// random member.
    pub fn select(&self, rng: &dyn RandomSource) -> Option<&TspUrl> {
        match self.endpoints.len() {
            0 => None,
            1 => self.endpoints.first(),
            n => self.endpoints.get(rng.index(n)),
        }
    }
}

impl Default for TspPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}
