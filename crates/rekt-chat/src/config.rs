//! Service configuration
//!
//! # Environment
//! - `REKT_BIND_ADDR` - listen address (default: 127.0.0.1:3000)
//! - `REKT_DATABASE_URL` - SQLite URL (default: sqlite://rekt-chat.db)

use std::net::SocketAddr;

use anyhow::{Context, Result};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://rekt-chat.db";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = get("REKT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind.parse().with_context(|| format!("Invalid REKT_BIND_ADDR '{}'", bind))?;
        let database_url =
            get("REKT_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        if !database_url.starts_with("sqlite:") {
            anyhow::bail!("REKT_DATABASE_URL must be a sqlite: URL, got '{}'", database_url);
        }
        Ok(Self { bind_addr, database_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_overrides_and_validation() {
        let config = ServerConfig::from_lookup(|key| match key {
            "REKT_BIND_ADDR" => Some("0.0.0.0:8080".to_string()),
            "REKT_DATABASE_URL" => Some("sqlite::memory:".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);

        let bad_bind = |key: &str| (key == "REKT_BIND_ADDR").then(|| "nope".to_string());
        assert!(ServerConfig::from_lookup(bad_bind).is_err());
        assert!(ServerConfig::from_lookup(|key| {
            (key == "REKT_DATABASE_URL").then(|| "postgres://localhost/rekt".to_string())
        })
        .is_err());
    }
}
