//! Environment-driven configuration.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `USE_PERSISTENT_STORES` | `false` | Postgres (`true`) or in-memory stores |
//! | `DATABASE_URL` | - | Full DSN; wins over the `DB_*` parts |
//! | `DB_HOST`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_PORT` | `localhost`, `postgres`, empty, `fleamarket`, `5432` | DSN parts |
//! | `DB_MAX_CONNECTIONS` | `10` | Pool size |
//! | `BIND_ADDR` | `0.0.0.0:8080` | HTTP listen address |

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} is not valid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            reason: reason.to_string(),
        }
    }
}

/// Connection settings for the durable store.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl core::fmt::Debug for DatabaseConfig {
    // The DSN may carry a password.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `Some` when `USE_PERSISTENT_STORES=true`.
    pub database: Option<DatabaseConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", e))?;

        let use_persistent = match lookup("USE_PERSISTENT_STORES") {
            None => false,
            Some(v) => v
                .trim()
                .parse::<bool>()
                .map_err(|e| ConfigError::invalid("USE_PERSISTENT_STORES", e))?,
        };

        let database = if use_persistent {
            Some(DatabaseConfig::from_lookup(&lookup)?)
        } else {
            None
        };

        Ok(Self {
            bind_addr,
            database,
        })
    }
}

impl DatabaseConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(v) => match v.trim().parse::<u32>() {
                Ok(0) => return Err(ConfigError::invalid("DB_MAX_CONNECTIONS", "must be > 0")),
                Ok(n) => n,
                Err(e) => return Err(ConfigError::invalid("DB_MAX_CONNECTIONS", e)),
            },
        };

        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            return Ok(Self {
                url,
                max_connections,
            });
        }

        let host = lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string());
        let user = lookup("DB_USER").unwrap_or_else(|| "postgres".to_string());
        let password = lookup("DB_PASSWORD").unwrap_or_default();
        let name = lookup("DB_NAME").unwrap_or_else(|| "fleamarket".to_string());
        let port = match lookup("DB_PORT") {
            None => 5432,
            Some(p) => p
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid("DB_PORT", e))?,
        };

        let credentials = if password.is_empty() {
            user
        } else {
            format!("{user}:{password}")
        };
        Ok(Self {
            url: format!("postgres://{credentials}@{host}:{port}/{name}?sslmode=disable"),
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_in_memory_on_port_8080() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert!(cfg.database.is_none());
    }

    #[test]
    fn assembles_dsn_from_parts() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DB_HOST", "db"),
            ("DB_USER", "market"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "flea"),
            ("DB_PORT", "6543"),
        ]))
        .unwrap();
        let db = cfg.database.unwrap();
        assert_eq!(db.url, "postgres://market:secret@db:6543/flea?sslmode=disable");
        assert_eq!(db.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn database_url_wins_over_parts() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://x@y/z"),
            ("DB_HOST", "ignored"),
            ("DB_MAX_CONNECTIONS", "3"),
        ]))
        .unwrap();
        let db = cfg.database.unwrap();
        assert_eq!(db.url, "postgres://x@y/z");
        assert_eq!(db.max_connections, 3);
    }

    #[test]
    fn bad_port_is_an_error_not_a_panic() {
        let err = AppConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DB_PORT", "fivefourthreetwo"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DB_PORT", .. }));
    }

    #[test]
    fn bad_flag_and_bind_addr_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "yes")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn debug_output_hides_the_dsn() {
        let db = DatabaseConfig {
            url: "postgres://u:hunter2@h/d".into(),
            max_connections: 1,
        };
        assert!(!format!("{db:?}").contains("hunter2"));
    }
}
