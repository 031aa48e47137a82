// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Nominatim reverse-geocoding client.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use url::Url;

use super::{GeocodeError, GeocodeProvider};

/// Public OpenStreetMap Nominatim instance.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Response field holding the human-readable place name.
const PLACE_NAME_FIELD: &str = "display_name";

/// Reverse lookups against a Nominatim-compatible endpoint.
#[derive(Debug, Clone)]
pub struct NominatimProvider {
    reverse_url: Url,
    http: Client,
}

impl NominatimProvider {
    /// Build a client for `base_url`.
    ///
    /// Nominatim's usage policy requires an identifying User-Agent.
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let reverse_url = Url::parse(base_url)
            .and_then(|base| base.join("reverse"))
            .map_err(|e| GeocodeError::Unavailable(format!("invalid base url: {e}")))?;

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| GeocodeError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { reverse_url, http })
    }

    fn lookup_url(&self, latitude: f64, longitude: f64) -> Url {
        let mut url = self.reverse_url.clone();
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &latitude.to_string())
            .append_pair("lon", &longitude.to_string());
        url
    }
}

impl GeocodeProvider for NominatimProvider {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        let response = self
            .http
            .get(self.lookup_url(latitude, longitude))
            .send()
            .await
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GeocodeError::Unavailable(e.to_string()))?;

        extract_place_name(&body)
    }
}

/// Pull the place name out of a reverse-lookup response.
pub fn extract_place_name(body: &Value) -> Result<String, GeocodeError> {
    body.get(PLACE_NAME_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or(GeocodeError::MissingPlaceName)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_display_name() {
        let body = json!({
            "place_id": 1,
            "display_name": "Rue de Rivoli, Paris, France",
            "address": {"city": "Paris"}
        });
        assert_eq!(
            extract_place_name(&body).unwrap(),
            "Rue de Rivoli, Paris, France"
        );
    }

    #[test]
    fn missing_or_blank_name_is_failure() {
        for body in [
            json!({"error": "Unable to geocode"}),
            json!({"display_name": ""}),
            json!({"display_name": 42}),
        ] {
            assert!(matches!(
                extract_place_name(&body),
                Err(GeocodeError::MissingPlaceName)
            ));
        }
    }

    #[test]
    fn lookup_url_carries_coordinates() {
        let provider = NominatimProvider::new(
            "https://geo.example.com/",
            "qr-envelope-server/test",
            Duration::from_secs(1),
        )
        .unwrap();
        let url = provider.lookup_url(48.8566, 2.3522);
        assert_eq!(url.path(), "/reverse");
        assert_eq!(
            url.query(),
            Some("format=jsonv2&lat=48.8566&lon=2.3522")
        );
    }

    #[test]
    fn invalid_base_url_rejected() {
        assert!(NominatimProvider::new("not a url", "ua", Duration::from_secs(1)).is_err());
    }
}
