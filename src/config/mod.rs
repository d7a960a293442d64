//! Process configuration from environment variables.

use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeocoderProvider {
    MapQuest,
}

impl FromStr for GeocoderProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mapquest" => Ok(GeocoderProvider::MapQuest),
            _ => Err(()),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub db_schema: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub geocoder_provider: GeocoderProvider,
    /// `None` disables geocoding.
    pub geocoder_api_key: Option<String>,
    pub body_limit_bytes: usize,
    pub store_ping_interval: Duration,
    /// Zero disables the store watchdog.
    pub store_max_failed_pings: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("db_schema", &self.db_schema)
            .field("db_max_connections", &self.db_max_connections)
            .field("geocoder_provider", &self.geocoder_provider)
            .field("geocoder_enabled", &self.geocoder_api_key.is_some())
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("store_ping_interval", &self.store_ping_interval)
            .field("store_max_failed_pings", &self.store_max_failed_pings)
            .finish_non_exhaustive()
    }
}

/// Load `config/config.env` then `.env` into the process environment. Missing files are skipped;
/// variables already set win.
pub fn load_env_files() {
    for path in ["config/config.env", ".env"] {
        match dotenvy::from_filename(path) {
            Ok(_) => tracing::debug!(path, "loaded environment file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(path, error = %e, "could not read environment file"),
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let geocoder_provider = match lookup("GEOCODER_PROVIDER") {
            None => GeocoderProvider::MapQuest,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "GEOCODER_PROVIDER",
                value: raw,
            })?,
        };
        Ok(AppConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "PORT", 5000)?,
            database_url: lookup("DATABASE_URL"),
            db_schema: lookup("DB_SCHEMA").unwrap_or_else(|| "public".into()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            geocoder_provider,
            geocoder_api_key: lookup("GEOCODER_API_KEY"),
            body_limit_bytes: parse_or(&lookup, "BODY_LIMIT_BYTES", 1024 * 1024)?,
            store_ping_interval: Duration::from_secs(parse_or(&lookup, "STORE_PING_INTERVAL_SECS", 30)?),
            store_max_failed_pings: parse_or(&lookup, "STORE_MAX_FAILED_PINGS", 3)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = config(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(c.bind_addr(), "0.0.0.0:5000");
        assert_eq!(c.database_url, None);
        assert_eq!(c.db_schema, "public");
        assert_eq!(c.db_max_connections, 5);
        assert_eq!(c.geocoder_provider, GeocoderProvider::MapQuest);
        assert_eq!(c.geocoder_api_key, None);
        assert_eq!(c.body_limit_bytes, 1024 * 1024);
        assert_eq!(c.store_ping_interval, Duration::from_secs(30));
        assert_eq!(c.store_max_failed_pings, 3);
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("JWT_SECRET"))));
        assert!(matches!(config(&[("JWT_SECRET", "  ")]), Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = config(&[("JWT_SECRET", "s"), ("PORT", "http")]).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for PORT: 'http'");
        let err = config(&[("JWT_SECRET", "s"), ("GEOCODER_PROVIDER", "google")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "GEOCODER_PROVIDER", .. }));
    }

    #[test]
    fn overrides_are_read() {
        let c = config(&[
            ("JWT_SECRET", "s"),
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/devcamper"),
            ("GEOCODER_API_KEY", "k"),
            ("STORE_MAX_FAILED_PINGS", "0"),
        ])
        .unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/devcamper"));
        assert_eq!(c.geocoder_api_key.as_deref(), Some("k"));
        assert_eq!(c.store_max_failed_pings, 0);
        assert!(!format!("{c:?}").contains("postgres://"));
    }
}
