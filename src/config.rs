// src/config.rs

use std::{env, time::Duration};

use dotenvy::dotenv;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Postgres URL of the document store. `None` runs without gamification.
    pub docstore_url: Option<String>,
    pub bind_address: String,
    pub rust_log: String,
    pub cors_origins: Vec<String>,
    pub award_max_attempts: u32,
    pub backfill_concurrency: usize,
    pub secondary_timeout: Duration,
    pub legacy_realtime_push: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            docstore_url: None,
            bind_address: "0.0.0.0:3000".to_string(),
            rust_log: "info".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            award_max_attempts: 5,
            backfill_concurrency: 4,
            secondary_timeout: Duration::from_millis(3000),
            legacy_realtime_push: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let cors_origins = match var("CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            database_url,
            docstore_url: var("DOCSTORE_URL"),
            bind_address: var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            rust_log: var("RUST_LOG").unwrap_or(defaults.rust_log),
            cors_origins,
            award_max_attempts: parse(
                "AWARD_MAX_ATTEMPTS",
                var("AWARD_MAX_ATTEMPTS"),
                defaults.award_max_attempts,
            )?,
            backfill_concurrency: parse(
                "BACKFILL_CONCURRENCY",
                var("BACKFILL_CONCURRENCY"),
                defaults.backfill_concurrency,
            )?,
            secondary_timeout: Duration::from_millis(parse(
                "SECONDARY_TIMEOUT_MS",
                var("SECONDARY_TIMEOUT_MS"),
                3000,
            )?),
            legacy_realtime_push: parse(
                "LEGACY_REALTIME_PUSH",
                var("LEGACY_REALTIME_PUSH"),
                defaults.legacy_realtime_push,
            )?,
        })
    }
}

/// Parses a positive number or a boolean, falling back to `default` when unset.
fn parse<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let invalid = || ConfigError::Invalid {
        name,
        value: raw.clone(),
    };
    let value: T = raw.trim().to_lowercase().parse().map_err(|_| invalid())?;
    // Zero attempts / workers / timeout are meaningless; `false` is fine.
    if value == T::default() && !raw.trim().eq_ignore_ascii_case("false") {
        return Err(invalid());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/quiz")]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.award_max_attempts, 5);
        assert_eq!(config.backfill_concurrency, 4);
        assert_eq!(config.secondary_timeout, Duration::from_secs(3));
        assert!(!config.legacy_realtime_push);
        assert!(config.docstore_url.is_none());
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://db/quiz"),
            ("DOCSTORE_URL", "postgres://docs/store"),
            ("AWARD_MAX_ATTEMPTS", "8"),
            ("SECONDARY_TIMEOUT_MS", "250"),
            ("LEGACY_REALTIME_PUSH", "TRUE"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.docstore_url.as_deref(), Some("postgres://docs/store"));
        assert_eq!(config.award_max_attempts, 8);
        assert_eq!(config.secondary_timeout, Duration::from_millis(250));
        assert!(config.legacy_realtime_push);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_invalid_values() {
        for (name, value) in [
            ("AWARD_MAX_ATTEMPTS", "0"),
            ("BACKFILL_CONCURRENCY", "many"),
            ("SECONDARY_TIMEOUT_MS", "-1"),
            ("LEGACY_REALTIME_PUSH", "yes"),
        ] {
            let result = config(&[("DATABASE_URL", "postgres://db/quiz"), (name, value)]);
            assert!(
                matches!(result, Err(ConfigError::Invalid { name: n, .. }) if n == name),
                "{name}={value} should be rejected"
            );
        }
    }
}
