//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration.

use std::path::PathBuf;

/// Which document store backs the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process store; nothing survives a restart.
    Memory,
    /// Durable SQLite store.
    Sqlite,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Document store backend.
    /// Env: `PARLEY_BACKEND` (`memory` | `sqlite`)
    /// Default: `sqlite`
    pub backend: Backend,

    /// SQLite database file.
    /// Env: `PARLEY_DB_PATH`
    /// Default: `None` (platform data directory)
    pub db_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            db_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("PARLEY_BACKEND") {
            match value.parse::<Backend>() {
                Ok(backend) => config.backend = backend,
                Err(e) => {
                    tracing::warn!(value = %value, error = %e, "Invalid PARLEY_BACKEND, using default");
                }
            }
        }

        if let Some(path) = lookup("PARLEY_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.backend, Backend::Sqlite);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PARLEY_BACKEND", " Memory "),
            ("PARLEY_DB_PATH", "/tmp/chat.db"),
        ]));
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/chat.db")));
    }

    #[test]
    fn test_invalid_backend_keeps_default() {
        let config = ClientConfig::from_lookup(lookup(&[("PARLEY_BACKEND", "postgres")]));
        assert_eq!(config.backend, Backend::Sqlite);
    }
}
