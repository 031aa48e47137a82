// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read once from the environment at startup. Any invalid
//! value aborts startup with a [`ConfigError`]; nothing is validated lazily
//! at request time.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `envelopes.redb` | `./data` |
//! | `ENVELOPE_CIPHER_KEY` | AES-256 key, 64 hex characters | Required |
//! | `ENVELOPE_SIGNING_SECRET` | Token signing secret, at least 32 bytes | Required |
//! | `ENVELOPE_HMAC_SECRET` | Envelope tag secret, at least 32 bytes | Required |
//! | `GEOCODE_BASE_URL` | Nominatim-compatible endpoint | `https://nominatim.openstreetmap.org` |
//! | `GEOCODE_USER_AGENT` | User-Agent sent to the provider | `qr-envelope-server/<version>` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::envelope::{cipher, Cipher, EnvelopeGuard, EnvelopeService, TokenSigner};
use crate::geocode::nominatim::DEFAULT_BASE_URL;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// Environment variable name for the database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const CIPHER_KEY_ENV: &str = "ENVELOPE_CIPHER_KEY";
pub const SIGNING_SECRET_ENV: &str = "ENVELOPE_SIGNING_SECRET";
pub const HMAC_SECRET_ENV: &str = "ENVELOPE_HMAC_SECRET";
pub const GEOCODE_BASE_URL_ENV: &str = "GEOCODE_BASE_URL";
pub const GEOCODE_USER_AGENT_ENV: &str = "GEOCODE_USER_AGENT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Database file inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "envelopes.redb";

/// Minimum length of the signing and HMAC secrets.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0} and {1} must be different secrets")]
    SharedSecret(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub cipher_key: Vec<u8>,
    pub signing_secret: String,
    pub hmac_secret: String,
    pub geocode_base_url: String,
    pub geocode_user_agent: String,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("geocode_base_url", &self.geocode_base_url)
            .field("geocode_user_agent", &self.geocode_user_agent)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_optional)
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: PORT_ENV,
                reason: format!("'{raw}' is not a port number"),
            })?,
            None => 8080,
        };

        let cipher_key = hex::decode(required(CIPHER_KEY_ENV)?).map_err(|e| ConfigError::Invalid {
            name: CIPHER_KEY_ENV,
            reason: e.to_string(),
        })?;
        if cipher_key.len() != cipher::KEY_LEN {
            return Err(ConfigError::Invalid {
                name: CIPHER_KEY_ENV,
                reason: format!("expected {} bytes, got {}", cipher::KEY_LEN, cipher_key.len()),
            });
        }

        let signing_secret = secret(&required, SIGNING_SECRET_ENV)?;
        let hmac_secret = secret(&required, HMAC_SECRET_ENV)?;

        if signing_secret == hmac_secret {
            return Err(ConfigError::SharedSecret(SIGNING_SECRET_ENV, HMAC_SECRET_ENV));
        }
        if signing_secret.as_bytes() == cipher_key.as_slice() {
            return Err(ConfigError::SharedSecret(CIPHER_KEY_ENV, SIGNING_SECRET_ENV));
        }
        if hmac_secret.as_bytes() == cipher_key.as_slice() {
            return Err(ConfigError::SharedSecret(CIPHER_KEY_ENV, HMAC_SECRET_ENV));
        }

        let log_format = match lookup(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    reason: format!("'{other}' is neither 'json' nor 'pretty'"),
                })
            }
        };

        Ok(Self {
            host: lookup(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            data_dir: lookup(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            cipher_key,
            signing_secret,
            hmac_secret,
            geocode_base_url: lookup(GEOCODE_BASE_URL_ENV)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            geocode_user_agent: lookup(GEOCODE_USER_AGENT_ENV).unwrap_or_else(|| {
                format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            }),
            log_format,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: HOST_ENV,
                reason: format!("'{}' is not a bind address", self.host),
            })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Envelope pipeline over the three configured secrets.
    pub fn envelope_service(&self) -> Result<EnvelopeService, ConfigError> {
        let cipher = Cipher::new(&self.cipher_key).map_err(|e| ConfigError::Invalid {
            name: CIPHER_KEY_ENV,
            reason: e.to_string(),
        })?;
        Ok(EnvelopeService::new(
            cipher,
            TokenSigner::new(self.signing_secret.as_bytes()),
            EnvelopeGuard::new(self.hmac_secret.as_bytes()),
        ))
    }
}

fn secret(
    required: &impl Fn(&'static str) -> Result<String, ConfigError>,
    name: &'static str,
) -> Result<String, ConfigError> {
    let value = required(name)?;
    if value.len() < MIN_SECRET_LEN {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
        });
    }
    Ok(value)
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, String> {
        HashMap::from([
            (CIPHER_KEY_ENV, "ab".repeat(32)),
            (SIGNING_SECRET_ENV, "s".repeat(40)),
            (HMAC_SECRET_ENV, "h".repeat(40)),
        ])
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&base_vars()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.database_path(), PathBuf::from("./data/envelopes.redb"));
        assert_eq!(config.geocode_base_url, DEFAULT_BASE_URL);
        assert!(config.geocode_user_agent.starts_with("qr-envelope-server/"));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.bind_addr().is_ok());
        assert!(config.envelope_service().is_ok());
    }

    #[test]
    fn missing_secret_fails() {
        let mut vars = base_vars();
        vars.remove(HMAC_SECRET_ENV);
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing(HMAC_SECRET_ENV));
    }

    #[test]
    fn short_or_wrong_sized_keys_fail() {
        let mut vars = base_vars();
        vars.insert(CIPHER_KEY_ENV, "ab".repeat(16));
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: CIPHER_KEY_ENV, .. })
        ));

        let mut vars = base_vars();
        vars.insert(CIPHER_KEY_ENV, "zz".repeat(32));
        assert!(load(&vars).is_err());

        let mut vars = base_vars();
        vars.insert(SIGNING_SECRET_ENV, "short".to_string());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: SIGNING_SECRET_ENV, .. })
        ));
    }

    #[test]
    fn shared_secrets_rejected() {
        let mut vars = base_vars();
        vars.insert(HMAC_SECRET_ENV, "s".repeat(40));
        assert_eq!(
            load(&vars).unwrap_err(),
            ConfigError::SharedSecret(SIGNING_SECRET_ENV, HMAC_SECRET_ENV)
        );
    }

    #[test]
    fn log_format_and_port_parsed() {
        let mut vars = base_vars();
        vars.insert(LOG_FORMAT_ENV, "json".to_string());
        vars.insert(PORT_ENV, "9000".to_string());
        let config = load(&vars).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.port, 9000);

        vars.insert(PORT_ENV, "http".to_string());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: PORT_ENV, .. })
        ));

        let mut vars = base_vars();
        vars.insert(LOG_FORMAT_ENV, "xml".to_string());
        assert!(load(&vars).is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let config = load(&base_vars()).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(&"s".repeat(40)));
        assert!(!rendered.contains(&"h".repeat(40)));
    }
}
