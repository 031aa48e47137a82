// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Reverse Geocoding
//!
//! [`GeocodeResolver::resolve`] turns coordinates into a place name and
//! never fails: provider trouble degrades to [`PLACEHOLDER_LOCATION`].
//!
//! ## Resolution
//!
//! 1. canonicalize `(lat, lon)` into a cache key
//! 2. cache hit (success or placeholder) → return it
//! 3. lookup for the key already in flight → wait for its result
//! 4. otherwise register the key, wait the provider spacing, call the
//!    provider under a timeout, cache the answer (long TTL) or the
//!    placeholder (short TTL), clear the in-flight marker and publish
//!
//! Steps 2-4 start under a single lock, so two callers can never both
//! decide to call the provider for the same key. The lookup runs in its
//! own task: a caller that goes away does not cancel it, and later callers
//! still find the result in the cache.

pub mod cache;
pub mod nominatim;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, warn};

pub use cache::{Freshness, GeocodeCache};
pub use nominatim::NominatimProvider;

/// Returned when no place name is available.
pub const PLACEHOLDER_LOCATION: &str = "Unknown location";

/// Decimal places kept when building cache keys.
pub const KEY_PRECISION: usize = 4;

/// Provider failures. Absorbed by the resolver, never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocode provider unavailable: {0}")]
    Unavailable(String),

    #[error("geocode provider returned HTTP {0}")]
    Status(u16),

    #[error("geocode response has no place name")]
    MissingPlaceName,

    #[error("geocode provider timed out")]
    Timeout,
}

/// External reverse-geocoding dependency.
pub trait GeocodeProvider: Send + Sync + 'static {
    fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> impl Future<Output = Result<String, GeocodeError>> + Send;
}

/// Tunables for [`GeocodeResolver`].
#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    pub success_ttl: Duration,
    pub failure_ttl: Duration,
    /// Delay before each outbound call (provider rate policy).
    pub min_spacing: Duration,
    pub timeout: Duration,
    pub cache_capacity: usize,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            success_ttl: Duration::from_secs(60 * 60),
            failure_ttl: Duration::from_secs(5 * 60),
            min_spacing: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            cache_capacity: 1024,
        }
    }
}

/// Marker for a running lookup. The generation tells a lookup apart from a
/// later one for the same key registered after [`GeocodeState::clear`].
struct InFlight {
    generation: u64,
    sender: broadcast::Sender<String>,
}

struct Shared {
    cache: GeocodeCache,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
}

impl Shared {
    /// Remove the marker for `key` if it still belongs to `generation`.
    fn take_marker(&mut self, key: &str, generation: u64) -> Option<InFlight> {
        match self.in_flight.get(key) {
            Some(marker) if marker.generation == generation => self.in_flight.remove(key),
            _ => None,
        }
    }
}

/// Process-scoped cache and in-flight registry.
///
/// Both maps sit behind one mutex so the check-cache / check-in-flight /
/// register sequence is atomic.
pub struct GeocodeState {
    inner: Mutex<Shared>,
}

impl GeocodeState {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Shared {
                cache: GeocodeCache::new(cache_capacity),
                in_flight: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop every cached entry and in-flight marker.
    ///
    /// Waiters on a dropped marker fall back to the placeholder. Lookups
    /// still running finish without touching the cache or any marker
    /// registered after the clear.
    pub fn clear(&self) {
        let mut shared = self.lock();
        shared.cache.clear();
        shared.in_flight.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }
}

/// Removes the in-flight marker when the lookup task ends, however it ends.
struct InFlightGuard {
    state: Arc<GeocodeState>,
    key: String,
    generation: u64,
    completed: bool,
}

impl InFlightGuard {
    fn complete(mut self, value: String, freshness: Freshness, ttl: Duration) {
        self.completed = true;
        let mut shared = self.state.lock();
        let Some(marker) = shared.take_marker(&self.key, self.generation) else {
            debug!(key = %self.key, "Discarding geocode result from before clear");
            return;
        };
        shared.cache.put(self.key.clone(), value.clone(), freshness, ttl);
        // No receivers is fine: every waiter may have gone away.
        let _ = marker.sender.send(value);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.state.lock().take_marker(&self.key, self.generation);
        }
    }
}

/// Canonical cache key for a coordinate pair.
pub fn cache_key(latitude: f64, longitude: f64) -> String {
    format!("{latitude:.prec$},{longitude:.prec$}", prec = KEY_PRECISION)
}

/// Single-flight, TTL-differentiated reverse geocoder.
pub struct GeocodeResolver<P> {
    provider: Arc<P>,
    state: Arc<GeocodeState>,
    config: GeocodeConfig,
}

impl<P> Clone for GeocodeResolver<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            state: Arc::clone(&self.state),
            config: self.config.clone(),
        }
    }
}

impl<P: GeocodeProvider> GeocodeResolver<P> {
    /// Resolver with its own fresh state.
    pub fn new(provider: P, config: GeocodeConfig) -> Self {
        let state = Arc::new(GeocodeState::new(config.cache_capacity));
        Self::with_state(Arc::new(provider), state, config)
    }

    /// Resolver over injected provider and state.
    pub fn with_state(provider: Arc<P>, state: Arc<GeocodeState>, config: GeocodeConfig) -> Self {
        Self {
            provider,
            state,
            config,
        }
    }

    pub fn state(&self) -> &Arc<GeocodeState> {
        &self.state
    }

    /// Place name for the coordinates; never fails.
    pub async fn resolve(&self, latitude: f64, longitude: f64) -> String {
        let key = cache_key(latitude, longitude);

        let mut receiver = {
            let mut shared = self.state.lock();
            if let Some((value, freshness)) = shared.cache.get(&key) {
                debug!(key = %key, ?freshness, "Geocode cache hit");
                return value;
            }
            match shared.in_flight.get(&key) {
                Some(marker) => {
                    debug!(key = %key, "Joining in-flight geocode lookup");
                    marker.sender.subscribe()
                }
                None => {
                    let (sender, receiver) = broadcast::channel(1);
                    let generation = shared.next_generation;
                    shared.next_generation += 1;
                    shared
                        .in_flight
                        .insert(key.clone(), InFlight { generation, sender });
                    self.spawn_lookup(key.clone(), generation, latitude, longitude);
                    receiver
                }
            }
        };

        match receiver.recv().await {
            Ok(value) => value,
            Err(_) => {
                // The lookup task ended without publishing.
                self.state
                    .lock()
                    .cache
                    .get(&key)
                    .map(|(value, _)| value)
                    .unwrap_or_else(|| PLACEHOLDER_LOCATION.to_string())
            }
        }
    }

    fn spawn_lookup(&self, key: String, generation: u64, latitude: f64, longitude: f64) {
        let guard = InFlightGuard {
            state: Arc::clone(&self.state),
            key,
            generation,
            completed: false,
        };
        let provider = Arc::clone(&self.provider);
        let config = self.config.clone();

        tokio::spawn(async move {
            tokio::time::sleep(config.min_spacing).await;

            let outcome = match tokio::time::timeout(
                config.timeout,
                provider.reverse(latitude, longitude),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GeocodeError::Timeout),
            };

            match outcome {
                Ok(name) => guard.complete(name, Freshness::Success, config.success_ttl),
                Err(e) => {
                    warn!(key = %guard.key, error = %e, "Geocode lookup failed, caching placeholder");
                    guard.complete(
                        PLACEHOLDER_LOCATION.to_string(),
                        Freshness::Degraded,
                        config.failure_ttl,
                    );
                }
            }
        });
    }
}
