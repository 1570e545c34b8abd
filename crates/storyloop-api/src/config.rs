//! Server configuration read from the environment.

use std::time::Duration;

use storyloop_gameplay::application::EngineSettings;

use crate::error::AppError;

/// Everything the server needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Base URL of the generation worker.
    pub generation_worker_url: String,
    pub dispatch_timeout: Duration,
    pub engine: EngineSettings,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineSettings::default();
        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 3000)?,
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            generation_worker_url: required(&lookup, "GENERATION_WORKER_URL")?,
            dispatch_timeout: Duration::from_millis(parsed(&lookup, "DISPATCH_TIMEOUT_MS", 5000)?),
            engine: EngineSettings {
                generation_limit_per_user: parsed(
                    &lookup,
                    "GENERATION_LIMIT_PER_USER",
                    defaults.generation_limit_per_user,
                )?,
                max_save_slots_per_story: parsed(
                    &lookup,
                    "MAX_SAVE_SLOTS_PER_STORY",
                    defaults.max_save_slots_per_story,
                )?,
            },
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_when_only_required_keys_are_set() {
        // Arrange
        let lookup = lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/storyloop"),
            ("GENERATION_WORKER_URL", "http://worker:8080"),
        ]);

        // Act
        let config = Config::from_lookup(lookup).unwrap();

        // Assert
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.dispatch_timeout, Duration::from_millis(5000));
        assert_eq!(config.engine, EngineSettings::default());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let lookup = lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/storyloop"),
            ("GENERATION_WORKER_URL", "http://worker:8080"),
            ("PORT", "8081"),
            ("DISPATCH_TIMEOUT_MS", "250"),
            ("GENERATION_LIMIT_PER_USER", "4"),
            ("MAX_SAVE_SLOTS_PER_STORY", "10"),
        ]);

        let config = Config::from_lookup(lookup).unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.dispatch_timeout, Duration::from_millis(250));
        assert_eq!(config.engine.generation_limit_per_user, 4);
        assert_eq!(config.engine.max_save_slots_per_story, 10);
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let lookup = lookup_from(&[("GENERATION_WORKER_URL", "http://worker:8080")]);

        let result = Config::from_lookup(lookup);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn test_unparseable_port_is_a_config_error() {
        let lookup = lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/storyloop"),
            ("GENERATION_WORKER_URL", "http://worker:8080"),
            ("PORT", "eighty"),
        ]);

        let result = Config::from_lookup(lookup);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("PORT")));
    }
}
