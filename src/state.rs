// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::envelope::EnvelopeService;
use crate::geocode::{GeocodeConfig, GeocodeResolver, GeocodeState, NominatimProvider};
use crate::issuance::BatchIssuer;
use crate::scan::EnvelopeRouter;
use crate::storage::RedbStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RedbStore>,
    pub issuer: Arc<BatchIssuer<RedbStore>>,
    pub router: Arc<EnvelopeRouter<RedbStore, NominatimProvider>>,
    pub geocode: Arc<GeocodeState>,
}

impl AppState {
    pub fn new(
        store: RedbStore,
        envelopes: EnvelopeService,
        provider: NominatimProvider,
        geocode_config: GeocodeConfig,
    ) -> Self {
        let store = Arc::new(store);
        let envelopes = Arc::new(envelopes);
        let geocode = Arc::new(GeocodeState::new(geocode_config.cache_capacity));
        let resolver =
            GeocodeResolver::with_state(Arc::new(provider), Arc::clone(&geocode), geocode_config);

        Self {
            issuer: Arc::new(BatchIssuer::new(Arc::clone(&store), Arc::clone(&envelopes))),
            router: Arc::new(EnvelopeRouter::new(Arc::clone(&store), envelopes, resolver)),
            store,
            geocode,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::envelope::tests::test_service;
    use crate::storage::database::tests::temp_store;
    use std::time::Duration;

    /// State over a temp database and an unreachable geocoder, so every scan
    /// resolves to the placeholder.
    pub(crate) fn test_state() -> (AppState, tempfile::TempDir) {
        let (store, dir) = temp_store();
        let provider = NominatimProvider::new(
            "http://127.0.0.1:9",
            "qr-envelope-server/test",
            Duration::from_millis(200),
        )
        .unwrap();
        let config = GeocodeConfig {
            min_spacing: Duration::from_millis(1),
            timeout: Duration::from_millis(500),
            ..GeocodeConfig::default()
        };
        (AppState::new(store, test_service(), provider, config), dir)
    }
}
