//! Engine configuration loaded from the environment.
//!
//! Every knob carries the dev compose stack's default, so a bare
//! `EngineConfig::from_env()` produces a working engine. Variables are
//! prefixed `FRESHET_`.

use std::time::Duration;

use crate::error::{Error, Result};

/// Message-bus connection settings (collaborator-owned transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Bootstrap address of the bus.
    pub bootstrap: String,
    /// Topic carrying intervention change events.
    pub topic: String,
}

/// Relational-store connection settings (collaborator-owned transport).
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store host.
    pub host: String,
    /// Store port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Connection user.
    pub user: String,
    /// Connection password.
    pub password: String,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Tunables for the aggregation engine and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Message-bus settings.
    pub bus: BusConfig,
    /// Relational-store settings.
    pub store: StoreConfig,
    /// Allowed out-of-order lateness before events are dropped.
    pub allowed_lateness: Duration,
    /// Quiet period after which the watermark advances without new events.
    pub idle_timeout: Duration,
    /// Inactivity window after which per-key accumulator state is evicted.
    pub state_ttl: Duration,
    /// Capacity of the fan-out and sink channels.
    pub channel_capacity: usize,
    /// Retries attempted per failed sink write before the row is dropped.
    pub sink_max_retries: u32,
    /// Initial backoff before the first sink retry (doubles per attempt).
    pub sink_initial_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig {
                bootstrap: "kafka:9092".to_string(),
                topic: "sip.interventions".to_string(),
            },
            store: StoreConfig {
                host: "db".to_string(),
                port: 5432,
                database: "sip_db".to_string(),
                user: "sip_user".to_string(),
                password: "sip_password".to_string(),
            },
            allowed_lateness: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(5),
            state_ttl: Duration::from_secs(3600),
            channel_capacity: 1024,
            sink_max_retries: 3,
            sink_initial_backoff: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable is present but does not
    /// parse (durations, ports, capacities).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            bus: BusConfig {
                bootstrap: optional_env("FRESHET_KAFKA_BOOTSTRAP")
                    .unwrap_or(defaults.bus.bootstrap),
                topic: optional_env("FRESHET_CDC_TOPIC").unwrap_or(defaults.bus.topic),
            },
            store: StoreConfig {
                host: optional_env("FRESHET_POSTGRES_HOST").unwrap_or(defaults.store.host),
                port: parsed_env("FRESHET_POSTGRES_PORT", defaults.store.port)?,
                database: optional_env("FRESHET_POSTGRES_DB").unwrap_or(defaults.store.database),
                user: optional_env("FRESHET_POSTGRES_USER").unwrap_or(defaults.store.user),
                password: optional_env("FRESHET_POSTGRES_PASSWORD")
                    .unwrap_or(defaults.store.password),
            },
            allowed_lateness: seconds_env(
                "FRESHET_ALLOWED_LATENESS_SECS",
                defaults.allowed_lateness,
            )?,
            idle_timeout: seconds_env("FRESHET_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            state_ttl: seconds_env("FRESHET_STATE_TTL_SECS", defaults.state_ttl)?,
            channel_capacity: parsed_env("FRESHET_CHANNEL_CAPACITY", defaults.channel_capacity)?,
            sink_max_retries: parsed_env("FRESHET_SINK_MAX_RETRIES", defaults.sink_max_retries)?,
            sink_initial_backoff: millis_env(
                "FRESHET_SINK_INITIAL_BACKOFF_MS",
                defaults.sink_initial_backoff,
            )?,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::configuration(format!("invalid {key}: {raw}"))),
    }
}

fn seconds_env(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_secs(parsed_env(key, default.as_secs())?))
}

fn millis_env(key: &str, default: Duration) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis())
        .map_err(|_| Error::configuration(format!("default for {key} out of range")))?;
    Ok(Duration::from_millis(parsed_env(key, default_ms)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_compose_stack() {
        let config = EngineConfig::default();
        assert_eq!(config.bus.bootstrap, "kafka:9092");
        assert_eq!(config.bus.topic, "sip.interventions");
        assert_eq!(config.store.port, 5432);
        assert_eq!(config.allowed_lateness, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.state_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn store_config_debug_redacts_password() {
        let rendered = format!("{:?}", EngineConfig::default().store);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("sip_password"));
    }

    #[test]
    fn from_env_with_nothing_set_yields_defaults() {
        // The FRESHET_* namespace is not expected in the test environment.
        let config = EngineConfig::from_env().expect("defaults should load");
        assert_eq!(config, EngineConfig::default());
    }
}
